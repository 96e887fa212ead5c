pub mod config;
pub mod error;
pub mod extractor;
pub mod keys;
pub mod keys_api;
pub mod routes;
pub mod schema;

pub use config::{KeyHttpConfig, KeyStoreBackend};
