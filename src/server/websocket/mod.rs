mod connection;
mod handler;
pub mod messages;

pub use connection::TopicConnectionManager;
pub use handler::ws_handler;
