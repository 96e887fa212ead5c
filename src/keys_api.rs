use std::collections::HashMap;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};

use crate::config::KeyHttpConfig;
use crate::error::{AppError, AppResult};
use crate::extractor::{AuthUser, MaybeAuthUser};
use crate::keys::{Actor, KeyError, KeyLifecycleService, PublicKey, UpdateOutcome};
use crate::schema;

pub const JSON_LD_CONTENT_TYPE: &str = "application/ld+json";

/// key: key-http-api
/// Key lifecycle routes mounted under the configured base path, plus the legacy
/// identity-scoped paths when an identity base path is set.
pub fn routes(config: &KeyHttpConfig) -> Router {
    let base = config.base_path.as_str();
    let mut router = Router::new()
        .route(base, get(list_keys).post(add_key))
        .route(&format!("{base}/:id"), get(get_key).post(update_key));

    if let Some(identity_base) = config.identity_base_path.as_deref() {
        router = router.route(
            &format!("{identity_base}/:identity/keys/:id"),
            get(get_legacy_key).post(update_legacy_key),
        );
    }

    router.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::HEAD])
            .allow_headers(Any),
    )
}

/// JSON body served with the linked-data content type.
pub struct JsonLd<T>(pub T);

impl<T: Serialize> IntoResponse for JsonLd<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => (
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(JSON_LD_CONTENT_TYPE),
                )],
                bytes,
            )
                .into_response(),
            Err(err) => {
                tracing::error!(?err, "failed to serialize response body");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> AppResult<Value> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::MalformedRequest(rejection.body_text()))
}

async fn add_key(
    Extension(service): Extension<KeyLifecycleService>,
    AuthUser(actor): AuthUser,
    body: Result<Json<Value>, JsonRejection>,
) -> AppResult<Response> {
    let body = json_body(body)?;
    let request = schema::validate_post_keys(&body, &service.config().context_url)?;
    let key = service
        .add_key(&actor, request)
        .await
        .map_err(|err| match err {
            KeyError::DuplicateKey | KeyError::Store(_) => AppError::Key(err),
            other => AppError::AddKeyFailed(other),
        })?;
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, key.id.clone())],
        JsonLd(key),
    )
        .into_response())
}

async fn list_keys(
    Extension(service): Extension<KeyLifecycleService>,
    MaybeAuthUser(actor): MaybeAuthUser,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> AppResult<Response> {
    let Query(query) =
        query.map_err(|rejection| AppError::MalformedRequest(rejection.body_text()))?;
    let (owner, filter) = schema::validate_get_keys_query(&query)?;
    let keys = service.list_keys(actor.as_ref(), &owner, &filter).await?;
    Ok(JsonLd(keys).into_response())
}

async fn get_key(
    Extension(service): Extension<KeyLifecycleService>,
    MaybeAuthUser(actor): MaybeAuthUser,
    Path(slug): Path<String>,
) -> AppResult<Response> {
    let key_id = service.config().ids.from_slug(&slug);
    fetch_key(&service, actor.as_ref(), &key_id).await
}

async fn update_key(
    Extension(service): Extension<KeyLifecycleService>,
    AuthUser(actor): AuthUser,
    Path(slug): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> AppResult<Response> {
    let key_id = service.config().ids.from_slug(&slug);
    apply_update(&service, &actor, &key_id, json_body(body)?).await
}

async fn get_legacy_key(
    Extension(service): Extension<KeyLifecycleService>,
    MaybeAuthUser(actor): MaybeAuthUser,
    Path((identity, slug)): Path<(String, String)>,
) -> AppResult<Response> {
    let key = resolve_legacy_key(&service, actor.as_ref(), &identity, &slug).await?;
    Ok(JsonLd(key).into_response())
}

async fn update_legacy_key(
    Extension(service): Extension<KeyLifecycleService>,
    AuthUser(actor): AuthUser,
    Path((identity, slug)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> AppResult<Response> {
    let body = json_body(body)?;
    let key = resolve_legacy_key(&service, Some(&actor), &identity, &slug).await?;
    apply_update(&service, &actor, &key.id, body).await
}

/// Legacy paths address a key by slug under its owner's identity. A slug owned by
/// someone else is reported as missing.
async fn resolve_legacy_key(
    service: &KeyLifecycleService,
    actor: Option<&Actor>,
    identity: &str,
    slug: &str,
) -> AppResult<PublicKey> {
    let key_id = service.config().ids.from_slug(slug);
    let key = service.get_key(actor, &key_id).await?;
    if key.owner != identity {
        return Err(AppError::Key(KeyError::NotFound));
    }
    Ok(key)
}

async fn fetch_key(
    service: &KeyLifecycleService,
    actor: Option<&Actor>,
    key_id: &str,
) -> AppResult<Response> {
    let key = service.get_key(actor, key_id).await?;
    Ok(JsonLd(key).into_response())
}

async fn apply_update(
    service: &KeyLifecycleService,
    actor: &Actor,
    key_id: &str,
    body: Value,
) -> AppResult<Response> {
    let patch = schema::validate_post_key(&body, &service.config().context_url)?;
    match service.update_key(actor, key_id, patch).await? {
        UpdateOutcome::Revoked(key) => Ok((StatusCode::OK, JsonLd(key)).into_response()),
        UpdateOutcome::Updated => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
