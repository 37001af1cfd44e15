use std::future::Future;

use crate::utils::error::PayError;

pub mod channel_handlers;
pub mod notification_handlers;
pub mod payment_handlers;

// 所有渠道调用都受 server.request_timeout 约束，超时即丢弃渠道调用
pub(crate) async fn with_deadline<T>(
    timeout: std::time::Duration,
    operation: &str,
    fut: impl Future<Output = Result<T, PayError>>,
) -> Result<T, PayError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| PayError::Timeout(format!("{operation} exceeded {}s", timeout.as_secs())))?
}
