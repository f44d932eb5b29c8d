use axum::{
    Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;

use super::protocol::{ENDPOINT_GET, NotifyParams, ROUTE_NOTIFY, ROUTE_SET};
use crate::register::VersionedRegister;

/// Builds the router serving the register's wire contract.
pub fn router(register: Arc<VersionedRegister>) -> Router {
    Router::new()
        .route(ENDPOINT_GET, get(handle_get))
        .route(ROUTE_SET, get(handle_set))
        .route(ROUTE_NOTIFY, post(handle_notify))
        .layer(Extension(register))
}

pub async fn handle_get(Extension(register): Extension<Arc<VersionedRegister>>) -> String {
    register.read().value.to_string()
}

pub async fn handle_set(
    Extension(register): Extension<Arc<VersionedRegister>>,
    Path(new_val): Path<String>,
) -> (StatusCode, String) {
    let new_value: i64 = match new_val.parse() {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Rejected set of {:?}: {}", new_val, e);
            return (StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let state = register.write(new_value);
    tracing::debug!("Local write: Val: {} Gen: {}", state.value, state.version);

    (StatusCode::OK, state.value.to_string())
}

/// Merges a peer push. Acceptance is never reported back: a valid push is always 200.
pub async fn handle_notify(
    Extension(register): Extension<Arc<VersionedRegister>>,
    Path((cur_val, cur_generation)): Path<(String, String)>,
    Query(params): Query<NotifyParams>,
) -> (StatusCode, String) {
    let value: i64 = match cur_val.parse() {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Rejected push value {:?}: {}", cur_val, e);
            return (StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let generation: i64 = match cur_generation.parse() {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Rejected push generation {:?}: {}", cur_generation, e);
            return (StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    // A negative generation is older than any local version.
    let Ok(version) = u64::try_from(generation) else {
        tracing::debug!("Ignored push with negative generation {}", generation);
        return (StatusCode::OK, String::new());
    };

    if register.merge_remote(value, version) {
        tracing::info!(
            "NewVal: {} Gen: {} Notifier: {}",
            value,
            version,
            params.notifier.as_deref().unwrap_or("unknown")
        );
    }

    (StatusCode::OK, String::new())
}
