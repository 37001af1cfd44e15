use crate::api::handlers::{channel_handlers, notification_handlers, payment_handlers};
use crate::app_state::AppState;
use axum::{
    body::Body,
    http::{HeaderValue, Request},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;
use uuid::Uuid;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.config.server.cors_origins);

    let api = Router::new()
        // 健康检查
        .route("/health", get(channel_handlers::health))

        // 支付相关接口
        .route("/pay", post(payment_handlers::pay))
        .route("/query", post(payment_handlers::query))
        .route("/refund", post(payment_handlers::refund))
        .route("/close", post(payment_handlers::close))

        // 通知接口
        .route("/notify/{channel}", post(notification_handlers::handle_notification))

        // 支付渠道接口
        .route("/channels", get(channel_handlers::get_channels));

    Router::new()
        .nest("/api/v1", api)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    // 透传调用方的请求ID，没有则生成
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|id| id.to_str().ok())
                        .map(str::to_string)
                        .unwrap_or_else(|| Uuid::new_v4().to_string());

                    tracing::info_span!(
                        "request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(app_state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
