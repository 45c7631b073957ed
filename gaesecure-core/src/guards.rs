//! Request guards that only let platform-originated traffic through.
//!
//! Each guard answers a single question about the inbound request and either
//! allows it or denies it with a fixed `403 Forbidden` body. Guards never
//! call the protected handler themselves; see [`guarded`] and the service
//! middleware for that.

use crate::identity::{AdminIdentity, IdentityError};
use crate::metrics::{MetricNames, GLOBAL_METRICS};
use async_trait::async_trait;
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

pub const QUEUE_NAME_HEADER: &str = "x-appengine-queuename";
pub const CRON_HEADER: &str = "x-appengine-cron";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardKind {
    TaskQueue,
    Cron,
    Admin,
}

impl GuardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskQueue => "task_queue",
            Self::Cron => "cron",
            Self::Admin => "admin",
        }
    }

    /// Body of the forbidden response for this guard.
    pub fn denial_message(&self) -> &'static str {
        match self {
            Self::TaskQueue => "Task queue requests only.",
            Self::Cron => "Cron requests only.",
            Self::Admin => "Admin users only.",
        }
    }
}

impl fmt::Display for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("{}", .0.denial_message())]
    Denied(GuardKind),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        match self {
            Self::Denied(kind) => forbidden(kind),
            Self::Identity(e) => {
                error!("Admin identity check failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

/// The fixed plain-text `403` returned when `kind` rejects a request.
pub fn forbidden(kind: GuardKind) -> Response {
    (StatusCode::FORBIDDEN, kind.denial_message()).into_response()
}

#[async_trait]
pub trait Guard: Send + Sync {
    fn kind(&self) -> GuardKind;

    async fn check(&self, headers: &HeaderMap) -> Result<(), GuardError>;
}

fn has_marker(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .map(|value| !value.as_bytes().is_empty())
        .unwrap_or(false)
}

/// Allows requests dispatched by the platform task queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskQueueGuard;

#[async_trait]
impl Guard for TaskQueueGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::TaskQueue
    }

    async fn check(&self, headers: &HeaderMap) -> Result<(), GuardError> {
        if has_marker(headers, QUEUE_NAME_HEADER) {
            Ok(())
        } else {
            Err(GuardError::Denied(self.kind()))
        }
    }
}

/// Allows requests dispatched by the platform cron scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct CronGuard;

#[async_trait]
impl Guard for CronGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::Cron
    }

    async fn check(&self, headers: &HeaderMap) -> Result<(), GuardError> {
        if has_marker(headers, CRON_HEADER) {
            Ok(())
        } else {
            Err(GuardError::Denied(self.kind()))
        }
    }
}

/// Allows requests from application administrators. Identity failures are
/// returned as [`GuardError::Identity`], never as a denial.
#[derive(Clone)]
pub struct AdminGuard {
    identity: Arc<dyn AdminIdentity>,
}

impl AdminGuard {
    pub fn new(identity: Arc<dyn AdminIdentity>) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl Guard for AdminGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::Admin
    }

    async fn check(&self, headers: &HeaderMap) -> Result<(), GuardError> {
        if self.identity.is_current_user_admin(headers).await? {
            Ok(())
        } else {
            Err(GuardError::Denied(self.kind()))
        }
    }
}

/// Runs `guard` and records the decision.
pub async fn authorize<G>(guard: &G, headers: &HeaderMap) -> Result<(), GuardError>
where
    G: Guard + ?Sized,
{
    let kind = guard.kind();
    match guard.check(headers).await {
        Ok(()) => {
            debug!(guard = %kind, "Request allowed");
            GLOBAL_METRICS.increment(MetricNames::GUARD_ALLOWED, 1, &[("guard", kind.as_str())]);
            Ok(())
        }
        Err(GuardError::Denied(denied_by)) => {
            debug!(guard = %denied_by, "Request denied");
            GLOBAL_METRICS.increment(
                MetricNames::GUARD_DENIED,
                1,
                &[("guard", denied_by.as_str())],
            );
            Err(GuardError::Denied(denied_by))
        }
        Err(e) => Err(e),
    }
}

/// Checks `guard`, then runs `view` only if the request is allowed.
///
/// `view` receives nothing from the guard, so it may or may not take the
/// request itself.
pub async fn guarded<G, F, Fut, R>(guard: &G, headers: &HeaderMap, view: F) -> Result<R, GuardError>
where
    G: Guard + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = R>,
{
    authorize(guard, headers).await?;
    Ok(view().await)
}

/// Ordered list of guards; the first one to deny wins.
#[derive(Clone, Default)]
pub struct GuardChain {
    guards: Vec<Arc<dyn Guard>>,
}

impl GuardChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<G: Guard + 'static>(mut self, guard: G) -> Self {
        self.guards.push(Arc::new(guard));
        self
    }

    pub async fn check_all(&self, headers: &HeaderMap) -> Result<(), GuardError> {
        for guard in &self.guards {
            authorize(guard.as_ref(), headers).await?;
        }
        Ok(())
    }
}
