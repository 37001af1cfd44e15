//! 异步通知处理管道
//!
//! 适配器验签并解析通知后，按注册顺序依次执行通知处理器。给渠道的应答只取决于
//! 验签和解析是否成功，处理器失败通过日志和 `NotifyOutcome::processing` 暴露，
//! 不会让渠道重复推送。

use async_trait::async_trait;
use axum::http::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::domain::enums::ChannelType;
use crate::domain::models::{NotifyPayload, NotifyResult};
use crate::services::gateway::PaymentGateway;
use crate::utils::error::PayError;

pub mod processors;

/// 通知处理器，不能修改共享的通知结果
#[async_trait]
pub trait NotifyProcessor: Send + Sync {
    async fn process(&self, result: &NotifyResult) -> Result<(), PayError>;
}

/// 渠道要求的应答报文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyAck {
    pub content_type: &'static str,
    pub body: String,
}

/// 应答构造器，每个渠道一个
pub trait NotifyHandler: Send + Sync {
    fn success(&self) -> NotifyAck;
    fn failure(&self, message: &str) -> NotifyAck;
}

/// 默认应答：`{"code":"SUCCESS","message":"OK"}` / `{"code":"FAIL","message":...}`
#[derive(Debug, Default, Clone)]
pub struct JsonNotifyHandler;

impl NotifyHandler for JsonNotifyHandler {
    fn success(&self) -> NotifyAck {
        NotifyAck {
            content_type: "application/json",
            body: serde_json::json!({ "code": "SUCCESS", "message": "OK" }).to_string(),
        }
    }

    fn failure(&self, message: &str) -> NotifyAck {
        NotifyAck {
            content_type: "application/json",
            body: serde_json::json!({ "code": "FAIL", "message": message }).to_string(),
        }
    }
}

/// 纯文本应答，支付宝为 success/failure，银联为 ok/fail
#[derive(Debug, Clone)]
pub struct PlainTextNotifyHandler {
    success: &'static str,
    failure: &'static str,
}

impl PlainTextNotifyHandler {
    pub fn new(success: &'static str, failure: &'static str) -> Self {
        Self { success, failure }
    }

    pub fn alipay() -> Self {
        Self::new("success", "failure")
    }

    pub fn unionpay() -> Self {
        Self::new("ok", "fail")
    }
}

impl NotifyHandler for PlainTextNotifyHandler {
    fn success(&self) -> NotifyAck {
        NotifyAck { content_type: "text/plain; charset=utf-8", body: self.success.to_string() }
    }

    fn failure(&self, _message: &str) -> NotifyAck {
        NotifyAck { content_type: "text/plain; charset=utf-8", body: self.failure.to_string() }
    }
}

/// 一次通知的处理结果
#[derive(Debug)]
pub struct NotifyOutcome {
    pub status: StatusCode,
    pub ack: NotifyAck,
    /// 验签解析成功时的通知结果
    pub result: Option<NotifyResult>,
    /// 处理器执行结果，失败时带有处理器名称
    pub processing: Result<(), PayError>,
}

impl NotifyOutcome {
    pub fn is_acknowledged(&self) -> bool {
        self.status == StatusCode::OK
    }
}

type NamedProcessor = (String, Arc<dyn NotifyProcessor>);

pub struct NotifyManager {
    gateway: Arc<PaymentGateway>,
    handlers: RwLock<HashMap<ChannelType, Arc<dyn NotifyHandler>>>,
    processors: RwLock<Vec<NamedProcessor>>,
    default_handler: Arc<dyn NotifyHandler>,
}

impl NotifyManager {
    pub fn new(gateway: Arc<PaymentGateway>) -> Self {
        Self {
            gateway,
            handlers: RwLock::new(HashMap::new()),
            processors: RwLock::new(Vec::new()),
            default_handler: Arc::new(JsonNotifyHandler),
        }
    }

    /// 注册各渠道自带的应答格式，微信使用默认 JSON 应答
    pub async fn with_channel_handlers(self) -> Self {
        self.register_handler(ChannelType::Alipay, Arc::new(PlainTextNotifyHandler::alipay())).await;
        self.register_handler(ChannelType::UnionPay, Arc::new(PlainTextNotifyHandler::unionpay())).await;
        self
    }

    pub async fn register_handler(&self, channel: ChannelType, handler: Arc<dyn NotifyHandler>) {
        self.handlers.write().await.insert(channel, handler);
    }

    /// 同名处理器原位替换，保持执行顺序
    pub async fn register_processor(&self, name: &str, processor: Arc<dyn NotifyProcessor>) {
        let mut processors = self.processors.write().await;
        match processors.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => {
                warn!(processor = %name, "Replacing registered notify processor");
                slot.1 = processor;
            }
            None => {
                info!(processor = %name, "Notify processor registered");
                processors.push((name.to_string(), processor));
            }
        }
    }

    pub async fn processor_names(&self) -> Vec<String> {
        self.processors
            .read()
            .await
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    async fn handler(&self, channel: ChannelType) -> Arc<dyn NotifyHandler> {
        self.handlers
            .read()
            .await
            .get(&channel)
            .cloned()
            .unwrap_or_else(|| self.default_handler.clone())
    }

    pub async fn handle(&self, channel: ChannelType, payload: &NotifyPayload) -> Result<NotifyOutcome, PayError> {
        let adapter = self.gateway.adapter(channel)?;
        let handler = self.handler(channel).await;

        let result = match adapter.handle_notify(payload).await {
            Ok(result) => result,
            Err(err) => {
                // 不向渠道回显内部细节
                warn!(channel = %channel, error = %err, "Notify rejected");
                return Ok(NotifyOutcome {
                    status: StatusCode::BAD_REQUEST,
                    ack: handler.failure("invalid notify"),
                    result: None,
                    processing: Err(err),
                });
            }
        };

        let processing = self.run_processors(&result).await;
        if let Err(err) = &processing {
            error!(
                channel = %channel,
                out_trade_no = %result.out_trade_no,
                error = %err,
                "Notify processing failed"
            );
        }

        Ok(NotifyOutcome {
            status: StatusCode::OK,
            ack: handler.success(),
            result: Some(result),
            processing,
        })
    }

    // 快照处理器列表后释放读锁，再逐个执行，遇到失败即停止
    async fn run_processors(&self, result: &NotifyResult) -> Result<(), PayError> {
        let processors: Vec<NamedProcessor> = self.processors.read().await.clone();

        for (name, processor) in processors {
            processor.process(result).await.map_err(|source| PayError::Processor {
                name: name.clone(),
                source: Box::new(source),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::enums::TradeStatus;
    use crate::services::gateway::tests::MockAdapter;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    // 记录执行顺序的处理器
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl NotifyProcessor for Recorder {
        async fn process(&self, _result: &NotifyResult) -> Result<(), PayError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(PayError::Internal("store unavailable".into()));
            }
            Ok(())
        }
    }

    fn notify_result() -> NotifyResult {
        NotifyResult {
            success: true,
            out_trade_no: "T1".into(),
            total_amount: dec!(0.01),
            trade_status: TradeStatus::Success,
            order_id: "4200000001".into(),
            channel: ChannelType::Wechat,
            paid_at: None,
        }
    }

    fn manager_with(adapter: MockAdapter) -> NotifyManager {
        let gateway = PaymentGateway::new(vec![Arc::new(adapter)]).unwrap();
        NotifyManager::new(Arc::new(gateway))
    }

    fn verified_adapter() -> MockAdapter {
        let mut adapter = MockAdapter::new();
        adapter.expect_channel().return_const(ChannelType::Wechat);
        adapter.expect_handle_notify().returning(|_| Ok(notify_result()));
        adapter
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, fail: bool) -> Arc<Recorder> {
        Arc::new(Recorder { name, log: log.clone(), fail })
    }

    #[tokio::test]
    async fn test_processors_run_in_registration_order() {
        let manager = manager_with(verified_adapter());
        let log = Arc::new(Mutex::new(Vec::new()));
        manager.register_processor("logging", recorder("logging", &log, false)).await;
        manager.register_processor("order_state", recorder("order_state", &log, false)).await;
        manager.register_processor("metrics", recorder("metrics", &log, false)).await;

        let outcome = manager.handle(ChannelType::Wechat, &NotifyPayload::new("{}")).await.unwrap();

        assert!(outcome.is_acknowledged());
        assert!(outcome.processing.is_ok());
        assert_eq!(outcome.ack.body, r#"{"code":"SUCCESS","message":"OK"}"#);
        assert_eq!(*log.lock().unwrap(), vec!["logging", "order_state", "metrics"]);
    }

    #[tokio::test]
    async fn test_failed_authentication_runs_no_processor() {
        let mut adapter = MockAdapter::new();
        adapter.expect_channel().return_const(ChannelType::Wechat);
        adapter
            .expect_handle_notify()
            .returning(|_| Err(PayError::InvalidSignature("signature mismatch at byte 17".into())));

        let manager = manager_with(adapter);
        let log = Arc::new(Mutex::new(Vec::new()));
        manager.register_processor("order_state", recorder("order_state", &log, false)).await;

        let outcome = manager.handle(ChannelType::Wechat, &NotifyPayload::new("{}")).await.unwrap();

        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        assert!(!outcome.ack.body.contains("SUCCESS"));
        assert!(!outcome.ack.body.contains("byte 17"));
        assert!(outcome.result.is_none());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_processor_failure_is_labelled_and_still_acknowledged() {
        let manager = manager_with(verified_adapter());
        let log = Arc::new(Mutex::new(Vec::new()));
        manager.register_processor("logging", recorder("logging", &log, false)).await;
        manager.register_processor("order_state", recorder("order_state", &log, true)).await;
        manager.register_processor("metrics", recorder("metrics", &log, false)).await;

        let outcome = manager.handle(ChannelType::Wechat, &NotifyPayload::new("{}")).await.unwrap();

        assert!(outcome.is_acknowledged());
        match outcome.processing {
            Err(PayError::Processor { name, .. }) => assert_eq!(name, "order_state"),
            other => panic!("unexpected processing outcome: {other:?}"),
        }
        // 失败后剩余处理器不再执行
        assert_eq!(*log.lock().unwrap(), vec!["logging", "order_state"]);
    }

    #[tokio::test]
    async fn test_reregistering_replaces_in_place() {
        let manager = manager_with(verified_adapter());
        let log = Arc::new(Mutex::new(Vec::new()));
        manager.register_processor("a", recorder("a1", &log, false)).await;
        manager.register_processor("b", recorder("b", &log, false)).await;
        manager.register_processor("a", recorder("a2", &log, false)).await;

        assert_eq!(manager.processor_names().await, vec!["a", "b"]);

        manager.handle(ChannelType::Wechat, &NotifyPayload::new("{}")).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a2", "b"]);
    }

    #[tokio::test]
    async fn test_unsupported_channel() {
        let manager = manager_with(verified_adapter());
        let err = manager
            .handle(ChannelType::Alipay, &NotifyPayload::new("a=b"))
            .await
            .unwrap_err();
        assert!(err.is_unsupported_channel());
    }

    #[tokio::test]
    async fn test_channel_specific_ack() {
        let mut adapter = MockAdapter::new();
        adapter.expect_channel().return_const(ChannelType::Alipay);
        adapter.expect_handle_notify().returning(|_| Ok(notify_result()));

        let manager = manager_with(adapter).with_channel_handlers().await;
        let outcome = manager.handle(ChannelType::Alipay, &NotifyPayload::new("a=b")).await.unwrap();
        assert_eq!(outcome.ack.body, "success");
        assert!(outcome.ack.content_type.starts_with("text/plain"));
    }

    #[test]
    fn test_failure_acks() {
        let ack = JsonNotifyHandler.failure("invalid notify");
        assert_eq!(ack.body, r#"{"code":"FAIL","message":"invalid notify"}"#);
        assert_eq!(PlainTextNotifyHandler::unionpay().failure("x").body, "fail");
    }
}
