use crate::catalog_store::CatalogStore;
use crate::server_store::ServerStore;
use crate::vote_store::VoteStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a job gets to work with.
#[derive(Clone)]
pub struct JobContext {
    pub catalog_store: Arc<dyn CatalogStore>,
    pub vote_store: Arc<dyn VoteStore>,
    pub server_store: Arc<dyn ServerStore>,
    cancellation_token: CancellationToken,
}

impl JobContext {
    pub fn new(
        catalog_store: Arc<dyn CatalogStore>,
        vote_store: Arc<dyn VoteStore>,
        server_store: Arc<dyn ServerStore>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            catalog_store,
            vote_store,
            server_store,
            cancellation_token,
        }
    }

    /// Checked by jobs between work items so shutdown does not wait for
    /// a full pass to finish.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
