mod http_layers;
pub mod metrics;
pub mod server;
pub mod state;
pub mod websocket;

pub use http_layers::{log_requests, RequestsLoggingLevel};
pub use server::{make_router, run_server};
pub use state::ServerState;
