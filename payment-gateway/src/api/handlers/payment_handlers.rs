use crate::api::handlers::with_deadline;
use crate::app_state::AppState;
use crate::domain::enums::{ChannelType, PayScene};
use crate::domain::models::{
    CloseRequest, QueryRequest, QueryResponse, RefundRequest, RefundResponse, UnifiedPayRequest,
    UnifiedPayResponse,
};
use crate::utils::error::{ApiResponse, PayError};
use axum::extract::State;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// 下单请求，channel 和 scene 保持字符串，由领域层解析
#[derive(Debug, Deserialize)]
pub struct PayRequestDto {
    pub channel: String,
    pub out_trade_no: String,
    pub total_amount: Decimal,
    pub subject: String,
    pub scene: String,
    pub notify_url: String,
    pub return_url: Option<String>,
    pub openid: Option<String>,   // 微信 jsapi
    pub buyer_id: Option<String>, // 支付宝 jsapi
    pub attach: Option<String>,
    pub client_ip: Option<String>,
}

impl TryFrom<PayRequestDto> for UnifiedPayRequest {
    type Error = PayError;

    fn try_from(dto: PayRequestDto) -> Result<Self, Self::Error> {
        let request = UnifiedPayRequest {
            channel: ChannelType::parse(&dto.channel)?,
            out_trade_no: dto.out_trade_no,
            total_amount: dto.total_amount,
            subject: dto.subject,
            scene: PayScene::parse(&dto.scene)?,
            notify_url: dto.notify_url,
            return_url: dto.return_url,
            payer_id: dto.openid.or(dto.buyer_id),
            attach: dto.attach,
            client_ip: dto.client_ip,
        };
        request.validate()?;
        Ok(request)
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderRefDto {
    pub channel: String,
    pub out_trade_no: Option<String>,
    pub order_id: Option<String>,
    pub txn_time: Option<String>, // 银联原交易时间
}

#[derive(Debug, Deserialize)]
pub struct RefundRequestDto {
    pub channel: String,
    pub out_trade_no: Option<String>,
    pub order_id: Option<String>,
    pub out_refund_no: String,
    pub refund_amount: Decimal,
    pub total_amount: Decimal,
    pub reason: Option<String>,
}

impl TryFrom<RefundRequestDto> for RefundRequest {
    type Error = PayError;

    fn try_from(dto: RefundRequestDto) -> Result<Self, Self::Error> {
        let request = RefundRequest {
            channel: ChannelType::parse(&dto.channel)?,
            out_trade_no: dto.out_trade_no,
            order_id: dto.order_id,
            out_refund_no: dto.out_refund_no,
            refund_amount: dto.refund_amount,
            total_amount: dto.total_amount,
            reason: dto.reason,
        };
        request.validate()?;
        Ok(request)
    }
}

#[derive(Debug, Serialize)]
pub struct CloseResponseDto {
    pub channel: ChannelType,
    pub out_trade_no: Option<String>,
    pub order_id: Option<String>,
}

// 渠道业务拒绝时，信封 code 取响应中的错误码
fn envelope<T: Serialize>(code: i32, message: &str, data: T) -> ApiResponse<T> {
    ApiResponse {
        code,
        message: message.to_string(),
        data: Some(data),
    }
}

// 统一下单
pub async fn pay(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PayRequestDto>,
) -> Result<Json<ApiResponse<UnifiedPayResponse>>, PayError> {
    let request = UnifiedPayRequest::try_from(payload)?;
    info!(
        channel = %request.channel,
        scene = %request.scene,
        out_trade_no = %request.out_trade_no,
        "API: Pay request received"
    );

    let response = with_deadline(state.config.request_timeout(), "pay", state.gateway.pay(&request))
        .await
        .map_err(|e| {
            error!(out_trade_no = %request.out_trade_no, "Failed to create payment: {}", e);
            e
        })?;

    Ok(Json(envelope(response.code, &response.message, response.clone())))
}

// 查询订单
pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OrderRefDto>,
) -> Result<Json<ApiResponse<QueryResponse>>, PayError> {
    let request = QueryRequest {
        channel: ChannelType::parse(&payload.channel)?,
        out_trade_no: payload.out_trade_no,
        order_id: payload.order_id,
        txn_time: payload.txn_time,
    };
    request.validate()?;

    let response = with_deadline(state.config.request_timeout(), "query", state.gateway.query(&request)).await?;
    Ok(Json(envelope(response.code, &response.message, response.clone())))
}

// 申请退款
pub async fn refund(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefundRequestDto>,
) -> Result<Json<ApiResponse<RefundResponse>>, PayError> {
    let request = RefundRequest::try_from(payload)?;
    info!(
        channel = %request.channel,
        out_refund_no = %request.out_refund_no,
        refund_amount = %request.refund_amount,
        "API: Refund request received"
    );

    let response = with_deadline(state.config.request_timeout(), "refund", state.gateway.refund(&request))
        .await
        .map_err(|e| {
            error!(out_refund_no = %request.out_refund_no, "Failed to refund: {}", e);
            e
        })?;

    Ok(Json(envelope(response.code, &response.message, response.clone())))
}

// 关闭订单
pub async fn close(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OrderRefDto>,
) -> Result<Json<ApiResponse<CloseResponseDto>>, PayError> {
    let request = CloseRequest {
        channel: ChannelType::parse(&payload.channel)?,
        out_trade_no: payload.out_trade_no,
        order_id: payload.order_id,
        txn_time: payload.txn_time,
    };
    request.validate()?;

    with_deadline(state.config.request_timeout(), "close", state.gateway.close(&request)).await?;
    info!(channel = %request.channel, "Order closed");

    Ok(Json(ApiResponse::success(CloseResponseDto {
        channel: request.channel,
        out_trade_no: request.out_trade_no,
        order_id: request.order_id,
    })))
}
