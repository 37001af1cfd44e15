use crate::app_state::AppState;
use crate::domain::enums::ChannelType;
use crate::domain::models::NotifyPayload;
use crate::utils::error::PayError;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::info;

// 处理渠道异步通知，渠道取自路径，响应体为渠道要求的应答格式
pub async fn handle_notification(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, PayError> {
    let channel = ChannelType::parse(&channel)?;
    info!(channel = %channel, body_len = body.len(), "Received payment notification");

    let payload = to_payload(&headers, body);
    let outcome = state.notify_manager.handle(channel, &payload).await?;

    Ok((
        outcome.status,
        [(header::CONTENT_TYPE, outcome.ack.content_type)],
        outcome.ack.body,
    )
        .into_response())
}

// header 名由 axum 统一为小写，非 ASCII 值直接丢弃
fn to_payload(headers: &HeaderMap, body: Bytes) -> NotifyPayload {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .fold(NotifyPayload::new(body.to_vec()), |payload, (name, value)| {
            payload.with_header(name, value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_headers_copied_to_payload() {
        let mut headers = HeaderMap::new();
        headers.insert("Wechatpay-Timestamp", HeaderValue::from_static("1700000000"));
        headers.insert("Wechatpay-Nonce", HeaderValue::from_static("abc"));

        let payload = to_payload(&headers, Bytes::from_static(b"{}"));
        assert_eq!(payload.header("wechatpay-timestamp"), Some("1700000000"));
        assert_eq!(payload.header("Wechatpay-Nonce"), Some("abc"));
        assert_eq!(payload.body, b"{}".to_vec());
    }
}
