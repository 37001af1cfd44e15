use crate::app_state::AppState;
use crate::domain::enums::ChannelType;
use crate::utils::error::ApiResponse;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
}

// 已注册的支付渠道
pub async fn get_channels(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<ChannelType>>> {
    Json(ApiResponse::success(state.gateway.supported_channels()))
}

// 健康检查
pub async fn health(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "UP",
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    }))
}
