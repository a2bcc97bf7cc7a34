//! RPC handlers.
//!
//! One generic handler serves every method; the task type picks the engine
//! operation.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use tracing::warn;
use uvapp_engine::error::ERRNO_NOT_FOUND;

use crate::ApiState;
use crate::messages::{Call, RpcResult};

/// POST /rpc/{Method}
pub async fn rpc<C: Call>(State(state): State<ApiState>, Json(task): Json<C>) -> Json<RpcResult<C::Output>> {
    Json(state.run(task).await)
}

/// POST /rpc/{method} for names no route claims.
pub async fn unknown_method(Path(method): Path<String>) -> Json<RpcResult<()>> {
    warn!(%method, "unknown method");
    Json(RpcResult::err(ERRNO_NOT_FOUND, format!("unknown method {method}")))
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
