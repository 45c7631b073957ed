//! Axum middleware enforcing the origin guards.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/tasks/send", post(send))
//!     .route_layer(axum::middleware::from_fn(task_queue_only));
//! ```

use axum::{
    extract::{Request, State},
    middleware::{from_fn, from_fn_with_state, Next},
    response::Response,
    Router,
};
use gaesecure_core::guards::{
    authorize, AdminGuard, CronGuard, Guard, GuardChain, GuardError, TaskQueueGuard,
};
use gaesecure_core::identity::AdminIdentity;
use std::sync::Arc;
use tracing::warn;

async fn enforce<G>(guard: &G, request: Request, next: Next) -> Result<Response, GuardError>
where
    G: Guard + ?Sized,
{
    // Only the head is borrowed across the check; the body is not `Sync`.
    let (parts, body) = request.into_parts();
    if let Err(e) = authorize(guard, &parts.headers).await {
        warn!(path = %parts.uri.path(), "Blocked request: {}", e);
        return Err(e);
    }
    Ok(next.run(Request::from_parts(parts, body)).await)
}

pub async fn task_queue_only(request: Request, next: Next) -> Result<Response, GuardError> {
    enforce(&TaskQueueGuard, request, next).await
}

pub async fn cron_only(request: Request, next: Next) -> Result<Response, GuardError> {
    enforce(&CronGuard, request, next).await
}

pub async fn admin_only(
    State(identity): State<Arc<dyn AdminIdentity>>,
    request: Request,
    next: Next,
) -> Result<Response, GuardError> {
    enforce(&AdminGuard::new(identity), request, next).await
}

/// Enforces any single guard, e.g.
/// `from_fn_with_state(Arc::new(CronGuard), require::<CronGuard>)`.
pub async fn require<G>(
    State(guard): State<Arc<G>>,
    request: Request,
    next: Next,
) -> Result<Response, GuardError>
where
    G: Guard + 'static,
{
    enforce(guard.as_ref(), request, next).await
}

pub async fn require_all(
    State(chain): State<GuardChain>,
    request: Request,
    next: Next,
) -> Result<Response, GuardError> {
    let (parts, body) = request.into_parts();
    if let Err(e) = chain.check_all(&parts.headers).await {
        warn!(path = %parts.uri.path(), "Blocked request: {}", e);
        return Err(e);
    }
    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Guard every route registered on a router so far.
pub trait GuardedRouter: Sized {
    fn task_queue_only(self) -> Self;
    fn cron_only(self) -> Self;
    fn admin_only(self, identity: Arc<dyn AdminIdentity>) -> Self;
    fn guarded_by(self, chain: GuardChain) -> Self;
}

impl<S> GuardedRouter for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn task_queue_only(self) -> Self {
        self.route_layer(from_fn(task_queue_only))
    }

    fn cron_only(self) -> Self {
        self.route_layer(from_fn(cron_only))
    }

    fn admin_only(self, identity: Arc<dyn AdminIdentity>) -> Self {
        self.route_layer(from_fn_with_state(identity, admin_only))
    }

    fn guarded_by(self, chain: GuardChain) -> Self {
        self.route_layer(from_fn_with_state(chain, require_all))
    }
}
