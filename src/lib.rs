pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod health;
pub mod metrics;
pub mod ring;
pub mod sampler;
pub mod schema;
pub mod selector;
pub mod server;
pub mod source;
