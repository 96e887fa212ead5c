use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use key_http::config::{self, KeyHttpConfig, KeyStoreBackend};
use key_http::keys::{
    KeyLifecycleService, KeyStore, MemoryKeyStore, PgKeyStore, RoleAuthorizer,
    RsaKeyPairValidator,
};
use key_http::routes::api_routes;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

async fn connect_store() -> anyhow::Result<Arc<dyn KeyStore>> {
    match *config::KEY_STORE {
        KeyStoreBackend::Memory => {
            tracing::warn!("using in-memory key store; keys are lost on restart");
            Ok(Arc::new(MemoryKeyStore::new()))
        }
        KeyStoreBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(config::DATABASE_URL.as_str())
                .await?;

            if let Err(error) = sqlx::migrate!().run(&pool).await {
                if *config::ALLOW_MIGRATION_FAILURE {
                    tracing::warn!(
                        ?error,
                        "Database migrations failed but continuing due to ALLOW_MIGRATION_FAILURE"
                    );
                } else {
                    return Err(error.into());
                }
            }
            Ok(Arc::new(PgKeyStore::new(pool)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    // Fail fast if the JWT secret is missing
    let _ = config::JWT_SECRET.as_str();

    let key_config = KeyHttpConfig::from_env();
    let store = connect_store().await?;
    let service = KeyLifecycleService::new(
        store,
        Arc::new(RoleAuthorizer::new(key_config.role_policy())),
        Arc::new(RsaKeyPairValidator),
        key_config.service_config(),
    );

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .merge(api_routes(&key_config))
        .layer(prometheus_layer)
        .layer(Extension(service));

    let addr: SocketAddr =
        format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT).parse()?;
    tracing::info!(%addr, base_path = %key_config.base_path, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
