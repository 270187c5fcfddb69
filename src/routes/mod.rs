// Route modules
pub mod admin_credits;

use crate::{app_state::AppState, middleware::logging_middleware};
use axum::{http::StatusCode, middleware, routing::get, Router};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
};

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    let request_timeout = Duration::from_millis(state.config.server.request_timeout_ms);

    Router::new()
        .nest("/admin", admin_routes())
        .layer(middleware::from_fn(logging_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
        .with_state(state)
}

/// Admin tool routes. Operator authentication is handled in front of this service.
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/{user_id}/tools/credits",
            get(admin_credits::show_credits_panel).post(admin_credits::adjust_credits),
        )
        .route(
            "/users/{user_id}/tools/credits/transactions",
            get(admin_credits::list_credit_transactions),
        )
}
