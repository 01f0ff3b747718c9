pub mod actors;
pub mod config;
pub mod domain;
pub mod http;
pub mod messaging;
pub mod metrics;
pub mod outbox;
pub mod store;
pub mod utils;
