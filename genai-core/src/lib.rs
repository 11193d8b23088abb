pub mod chat;
pub mod config;
pub mod content;
pub mod error;
pub mod http_client;
pub mod model;
pub mod normalize;
pub mod stream;
pub mod telemetry;
pub mod transport;
