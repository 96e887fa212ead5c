use axum::{routing::get, Router};

use crate::config::KeyHttpConfig;
use crate::keys_api;

pub const SERVICE_BANNER: &str = "Key HTTP API";

async fn root() -> &'static str {
    SERVICE_BANNER
}

pub fn api_routes(config: &KeyHttpConfig) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(keys_api::routes(config))
}
