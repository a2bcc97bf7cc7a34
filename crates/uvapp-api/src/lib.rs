//! uvapp-api — JSON-RPC façade for the app service.
//!
//! Every method is `POST /rpc/{Method}` with a JSON task body and answers
//! HTTP 200 with an [`RpcResult`] envelope carrying `errno`, `errmsg` and
//! `data`.
//!
//! # Methods
//!
//! | Entity | Methods |
//! |---|---|
//! | App | `AppCreate` `AppRemove` `AppSet` `AppGet` `AppQuery` |
//! | Ver | `VerCreate` `VerRemove` `VerSet` `VerGet` `VerQuery` `VerGetURL` `VerUpURL` |
//! | Container | `ContainerCreate` `ContainerRemove` `ContainerSet` `ContainerGet` `ContainerQuery` |
//! | Ac | `AcCreate` (alias `AcAdd`) `AcRemove` `AcSet` `AcGet` `AcQuery` |
//!
//! `GET /healthz` reports liveness.

pub mod handlers;
pub mod messages;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tracing::{error, warn};
use uvapp_engine::error::ERRNO_INTERNAL_SERVER;
use uvapp_engine::{Artifacts, Engine, EngineError};

pub use messages::{Call, RpcResult};

/// Everything a task needs to run.
pub struct Service {
    pub engine: Engine,
    pub artifacts: Artifacts,
}

/// Shared state for RPC handlers.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<Service>,
    /// Upper bound on a single engine call.
    pub timeout: Duration,
}

impl ApiState {
    pub fn new(service: Service, timeout: Duration) -> Self {
        Self {
            service: Arc::new(service),
            timeout,
        }
    }

    /// Run a task on the blocking pool under the request timeout and wrap
    /// the outcome in the envelope.
    ///
    /// A timed-out call keeps running to completion in the background; its
    /// writes may still land.
    pub async fn run<C: Call>(&self, task: C) -> RpcResult<C::Output> {
        let service = self.service.clone();
        let handle = tokio::task::spawn_blocking(move || task.call(&service));

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(Ok(data))) => RpcResult::ok(data),
            Ok(Ok(Err(e))) => {
                let errno = e.errno();
                match &e {
                    EngineError::Internal(_) => error!(method = C::METHOD, errno, error = %e, "call failed"),
                    _ => warn!(method = C::METHOD, errno, error = %e, "call rejected"),
                }
                RpcResult::err(errno, e.to_string())
            }
            Ok(Err(join)) => {
                error!(method = C::METHOD, error = %join, "call panicked");
                RpcResult::err(ERRNO_INTERNAL_SERVER, "internal error")
            }
            Err(_) => {
                error!(method = C::METHOD, timeout_ms = self.timeout.as_millis() as u64, "call timed out");
                RpcResult::err(ERRNO_INTERNAL_SERVER, "timeout")
            }
        }
    }
}

/// Build the RPC router.
pub fn build_router(state: ApiState) -> Router {
    use handlers::rpc;
    use messages::*;

    let rpc_routes = Router::new()
        .route("/AppCreate", post(rpc::<AppCreateTask>))
        .route("/AppRemove", post(rpc::<AppRemoveTask>))
        .route("/AppSet", post(rpc::<AppSetTask>))
        .route("/AppGet", post(rpc::<AppGetTask>))
        .route("/AppQuery", post(rpc::<AppQueryTask>))
        .route("/VerCreate", post(rpc::<VerCreateTask>))
        .route("/VerRemove", post(rpc::<VerRemoveTask>))
        .route("/VerSet", post(rpc::<VerSetTask>))
        .route("/VerGet", post(rpc::<VerGetTask>))
        .route("/VerQuery", post(rpc::<VerQueryTask>))
        .route("/VerGetURL", post(rpc::<VerGetUrlTask>))
        .route("/VerUpURL", post(rpc::<VerUpUrlTask>))
        .route("/ContainerCreate", post(rpc::<ContainerCreateTask>))
        .route("/ContainerRemove", post(rpc::<ContainerRemoveTask>))
        .route("/ContainerSet", post(rpc::<ContainerSetTask>))
        .route("/ContainerGet", post(rpc::<ContainerGetTask>))
        .route("/ContainerQuery", post(rpc::<ContainerQueryTask>))
        .route("/AcCreate", post(rpc::<AcCreateTask>))
        .route("/AcAdd", post(rpc::<AcCreateTask>))
        .route("/AcRemove", post(rpc::<AcRemoveTask>))
        .route("/AcSet", post(rpc::<AcSetTask>))
        .route("/AcGet", post(rpc::<AcGetTask>))
        .route("/AcQuery", post(rpc::<AcQueryTask>))
        .route("/{method}", post(handlers::unknown_method))
        .with_state(state);

    Router::new()
        .nest("/rpc", rpc_routes)
        .route("/healthz", get(handlers::healthz))
}
