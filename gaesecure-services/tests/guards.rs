use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Request, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::Response,
    routing::get,
    Router,
};
use gaesecure_core::guards::{CronGuard, GuardChain, TaskQueueGuard};
use gaesecure_core::identity::{AdminIdentity, IdentityError, PlatformIdentity};
use gaesecure_services::middleware::{
    admin_only, cron_only, require, task_queue_only, GuardedRouter,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

struct FixedIdentity(bool);

#[async_trait]
impl AdminIdentity for FixedIdentity {
    async fn is_current_user_admin(&self, _: &HeaderMap) -> Result<bool, IdentityError> {
        Ok(self.0)
    }
}

struct BrokenIdentity;

#[async_trait]
impl AdminIdentity for BrokenIdentity {
    async fn is_current_user_admin(&self, _: &HeaderMap) -> Result<bool, IdentityError> {
        Err(IdentityError::Unavailable("users service down".to_string()))
    }
}

/// A router whose single handler counts its invocations.
fn counting_app(hits: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/work",
        get(move || {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                "OK"
            }
        }),
    )
}

fn request(headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().uri("/work");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn task_queue_only_blocks_requests_without_marker() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = counting_app(hits.clone()).route_layer(from_fn(task_queue_only));

    let response = app.clone().oneshot(request(&[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "Task queue requests only.");

    let response = app
        .clone()
        .oneshot(request(&[("X-AppEngine-QueueName", "")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let response = app
        .oneshot(request(&[("X-AppEngine-QueueName", "my-queue")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cron_only_blocks_requests_without_marker() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = counting_app(hits.clone()).route_layer(from_fn(cron_only));

    // A task queue marker does not satisfy the cron guard.
    let response = app
        .clone()
        .oneshot(request(&[("X-AppEngine-QueueName", "my-queue")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "Cron requests only.");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let response = app
        .oneshot(request(&[("X-AppEngine-Cron", "true")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn admin_only_follows_identity_service() {
    let hits = Arc::new(AtomicUsize::new(0));
    let admin: Arc<dyn AdminIdentity> = Arc::new(FixedIdentity(true));
    let visitor: Arc<dyn AdminIdentity> = Arc::new(FixedIdentity(false));

    let app = counting_app(hits.clone()).route_layer(from_fn_with_state(visitor, admin_only));
    let response = app.oneshot(request(&[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "Admin users only.");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let app = counting_app(hits.clone()).route_layer(from_fn_with_state(admin, admin_only));
    let response = app.oneshot(request(&[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn admin_only_with_platform_identity() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = counting_app(hits.clone()).admin_only(Arc::new(PlatformIdentity));

    let response = app
        .clone()
        .oneshot(request(&[("X-AppEngine-User-Is-Admin", "0")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(request(&[("X-AppEngine-User-Is-Admin", "1")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn identity_failures_are_server_errors() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = counting_app(hits.clone()).admin_only(Arc::new(BrokenIdentity));

    let response = app.oneshot(request(&[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn router_helpers_guard_routes() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = counting_app(hits.clone()).task_queue_only();
    let response = app.oneshot(request(&[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let app = counting_app(hits.clone()).cron_only();
    let response = app
        .oneshot(request(&[("X-AppEngine-Cron", "true")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn chain_requires_every_guard() {
    let hits = Arc::new(AtomicUsize::new(0));
    let chain = GuardChain::new().with(TaskQueueGuard).with(CronGuard);
    let app = counting_app(hits.clone()).guarded_by(chain);

    let response = app
        .clone()
        .oneshot(request(&[("X-AppEngine-QueueName", "q")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "Cron requests only.");

    let response = app
        .oneshot(request(&[
            ("X-AppEngine-QueueName", "q"),
            ("X-AppEngine-Cron", "true"),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn require_enforces_a_single_guard() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = counting_app(hits.clone())
        .route_layer(from_fn_with_state(Arc::new(CronGuard), require::<CronGuard>));

    let response = app.oneshot(request(&[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
