pub mod background_jobs;
pub mod broadcast;
pub mod catalog_store;
pub mod config;
pub mod server;
pub mod server_store;
pub mod vote_store;
pub mod votes;
