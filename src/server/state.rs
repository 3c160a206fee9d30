use crate::catalog_store::CatalogStore;
use crate::server::http_layers::RequestsLoggingLevel;
use crate::server::websocket::TopicConnectionManager;
use crate::server_store::ServerStore;
use crate::vote_store::VoteStore;
use crate::votes::VoteEventHandler;
use std::sync::Arc;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct ServerState {
    pub catalog_store: Arc<dyn CatalogStore>,
    pub vote_store: Arc<dyn VoteStore>,
    pub server_store: Arc<dyn ServerStore>,
    pub connections: Arc<TopicConnectionManager>,
    pub vote_handler: Arc<VoteEventHandler>,
    pub logging_level: RequestsLoggingLevel,
}
