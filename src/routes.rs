use crate::handlers::{self, AppState};
use crate::webhook_handler;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

/// Every `/api/v1` route. `main` wraps these in the body limit and per-IP
/// rate limiting; `/health` stays outside.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Pricing
        .route("/api/v1/pricing/quote", post(handlers::pricing_quote))
        .route("/api/v1/pricing/proposal", post(handlers::pricing_proposal))
        .route("/api/v1/pricing/examples", get(handlers::pricing_examples))
        // Outreach
        .route("/api/v1/emails/generate", post(handlers::generate_emails))
        .route("/api/v1/scrapes", post(handlers::start_scrape))
        // Calendar
        .route("/api/v1/bookings", post(handlers::create_booking))
        .route("/api/v1/bookings/:id", delete(handlers::cancel_booking))
        // Reporting
        .route("/api/v1/metrics", get(handlers::get_metrics))
        .route("/api/v1/metrics/report", post(handlers::send_metrics_report))
        // Inbound webhooks
        .route("/api/v1/webhooks/apify", post(webhook_handler::apify_webhook))
        .route(
            "/api/v1/webhooks/instantly",
            post(webhook_handler::instantly_webhook),
        )
        .route(
            "/api/v1/webhooks/calendar",
            post(webhook_handler::calendar_webhook),
        )
}

/// Full router without the network-facing middleware, as used in tests.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes())
        .with_state(state)
}
