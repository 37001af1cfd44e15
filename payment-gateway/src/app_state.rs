use std::sync::Arc;

use crate::adapters::PaymentAdapter;
use crate::config::AppConfig;
use crate::services::gateway::PaymentGateway;
use crate::services::notify::processors::{
    InMemoryNotifyMetrics, InMemoryOrderStore, LoggingProcessor, MetricsProcessor, OrderStateProcessor,
};
use crate::services::notify::NotifyManager;
use crate::utils::error::PayError;

/// 应用状态，包含共享的网关和通知管道
pub struct AppState {
    pub config: AppConfig,

    // 服务层
    pub gateway: Arc<PaymentGateway>,
    pub notify_manager: Arc<NotifyManager>,

    // 通知处理器依赖的存储
    pub order_store: Arc<InMemoryOrderStore>,
    pub notify_metrics: Arc<InMemoryNotifyMetrics>,
}

impl AppState {
    /// 组装网关和默认通知处理器：日志 -> 订单状态 -> 统计
    pub async fn new(config: AppConfig, adapters: Vec<Arc<dyn PaymentAdapter>>) -> Result<Self, PayError> {
        let gateway = Arc::new(PaymentGateway::new(adapters)?);

        let order_store = Arc::new(InMemoryOrderStore::new());
        let notify_metrics = Arc::new(InMemoryNotifyMetrics::new());

        let notify_manager = NotifyManager::new(gateway.clone()).with_channel_handlers().await;
        notify_manager
            .register_processor("logging", Arc::new(LoggingProcessor))
            .await;
        notify_manager
            .register_processor("order_state", Arc::new(OrderStateProcessor::new(order_store.clone())))
            .await;
        notify_manager
            .register_processor("metrics", Arc::new(MetricsProcessor::new(notify_metrics.clone())))
            .await;

        Ok(Self {
            config,
            gateway,
            notify_manager: Arc::new(notify_manager),
            order_store,
            notify_metrics,
        })
    }
}
