//! 内置通知处理器：日志、订单状态、统计
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::NotifyProcessor;
use crate::domain::enums::{ChannelType, TradeStatus};
use crate::domain::models::NotifyResult;
use crate::utils::error::PayError;

/// 记录每一条已验签的通知
#[derive(Debug, Default, Clone)]
pub struct LoggingProcessor;

#[async_trait]
impl NotifyProcessor for LoggingProcessor {
    async fn process(&self, result: &NotifyResult) -> Result<(), PayError> {
        info!(
            channel = %result.channel,
            out_trade_no = %result.out_trade_no,
            order_id = %result.order_id,
            trade_status = %result.trade_status,
            total_amount = %result.total_amount,
            success = result.success,
            "Payment notify received"
        );
        Ok(())
    }
}

/// 状态写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// 状态已更新
    Applied,
    /// 与当前状态相同的重复通知
    Duplicate,
    /// 终态不可回退，丢弃
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderState {
    pub status: TradeStatus,
    pub order_id: String,
    pub total_amount: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// 订单状态存储，需保证同一订单重复投递只生效一次
#[async_trait]
pub trait OrderStateStore: Send + Sync {
    async fn apply(&self, result: &NotifyResult) -> Result<ApplyOutcome, PayError>;

    async fn get(&self, channel: ChannelType, out_trade_no: &str) -> Result<Option<OrderState>, PayError>;
}

/// 判断状态能否从 current 迁移到 next
pub fn transition(current: Option<TradeStatus>, next: TradeStatus) -> ApplyOutcome {
    match current {
        None => ApplyOutcome::Applied,
        Some(current) if current == next => ApplyOutcome::Duplicate,
        // 成功后仍可转入退款
        Some(TradeStatus::Success) if next == TradeStatus::Refund => ApplyOutcome::Applied,
        Some(current) if current.is_terminal() => ApplyOutcome::Ignored,
        Some(_) => ApplyOutcome::Applied,
    }
}

/// 进程内订单状态，单实例部署或测试使用
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<(ChannelType, String), OrderState>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderStateStore for InMemoryOrderStore {
    async fn apply(&self, result: &NotifyResult) -> Result<ApplyOutcome, PayError> {
        // 判断和写入在同一把写锁内完成
        let mut orders = self.orders.write().await;
        let key = (result.channel, result.out_trade_no.clone());
        let outcome = transition(orders.get(&key).map(|s| s.status), result.trade_status);

        if outcome == ApplyOutcome::Applied {
            orders.insert(
                key,
                OrderState {
                    status: result.trade_status,
                    order_id: result.order_id.clone(),
                    total_amount: result.total_amount,
                    updated_at: result.paid_at.unwrap_or_else(Utc::now),
                },
            );
        }
        Ok(outcome)
    }

    async fn get(&self, channel: ChannelType, out_trade_no: &str) -> Result<Option<OrderState>, PayError> {
        Ok(self.orders.read().await.get(&(channel, out_trade_no.to_string())).cloned())
    }
}

/// 把通知结果写入订单状态
pub struct OrderStateProcessor {
    store: Arc<dyn OrderStateStore>,
}

impl OrderStateProcessor {
    pub fn new(store: Arc<dyn OrderStateStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NotifyProcessor for OrderStateProcessor {
    async fn process(&self, result: &NotifyResult) -> Result<(), PayError> {
        match self.store.apply(result).await? {
            ApplyOutcome::Applied => {
                info!(
                    out_trade_no = %result.out_trade_no,
                    trade_status = %result.trade_status,
                    "Order state updated"
                );
            }
            ApplyOutcome::Duplicate => {
                debug!(out_trade_no = %result.out_trade_no, "Duplicate notify ignored");
            }
            ApplyOutcome::Ignored => {
                warn!(
                    out_trade_no = %result.out_trade_no,
                    trade_status = %result.trade_status,
                    "Stale notify would downgrade terminal state"
                );
            }
        }
        Ok(())
    }
}

/// 通知统计接口
pub trait NotifyMetrics: Send + Sync {
    fn record(&self, channel: ChannelType, status: TradeStatus, amount: Decimal);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelStats {
    pub count: u64,
    pub success_count: u64,
    pub success_amount: Decimal,
}

#[derive(Debug, Default)]
pub struct InMemoryNotifyMetrics {
    stats: std::sync::RwLock<HashMap<ChannelType, ChannelStats>>,
}

impl InMemoryNotifyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, channel: ChannelType) -> ChannelStats {
        match self.stats.read() {
            Ok(stats) => stats.get(&channel).cloned().unwrap_or_default(),
            Err(poisoned) => poisoned.into_inner().get(&channel).cloned().unwrap_or_default(),
        }
    }
}

impl NotifyMetrics for InMemoryNotifyMetrics {
    fn record(&self, channel: ChannelType, status: TradeStatus, amount: Decimal) {
        let mut stats = match self.stats.write() {
            Ok(stats) => stats,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = stats.entry(channel).or_default();
        entry.count += 1;
        if status.is_success() {
            entry.success_count += 1;
            entry.success_amount += amount;
        }
    }
}

pub struct MetricsProcessor {
    metrics: Arc<dyn NotifyMetrics>,
}

impl MetricsProcessor {
    pub fn new(metrics: Arc<dyn NotifyMetrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl NotifyProcessor for MetricsProcessor {
    async fn process(&self, result: &NotifyResult) -> Result<(), PayError> {
        self.metrics
            .record(result.channel, result.trade_status, result.total_amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn result(status: TradeStatus) -> NotifyResult {
        NotifyResult {
            success: status.is_success(),
            out_trade_no: "T1".into(),
            total_amount: dec!(0.01),
            trade_status: status,
            order_id: "4200000001".into(),
            channel: ChannelType::Wechat,
            paid_at: None,
        }
    }

    #[rstest]
    #[case(None, TradeStatus::Success, ApplyOutcome::Applied)]
    #[case(Some(TradeStatus::NotPay), TradeStatus::Success, ApplyOutcome::Applied)]
    #[case(Some(TradeStatus::UserPaying), TradeStatus::Closed, ApplyOutcome::Applied)]
    #[case(Some(TradeStatus::Success), TradeStatus::Success, ApplyOutcome::Duplicate)]
    #[case(Some(TradeStatus::Success), TradeStatus::Refund, ApplyOutcome::Applied)]
    #[case(Some(TradeStatus::Success), TradeStatus::NotPay, ApplyOutcome::Ignored)]
    #[case(Some(TradeStatus::Closed), TradeStatus::Success, ApplyOutcome::Ignored)]
    #[case(Some(TradeStatus::Refund), TradeStatus::Success, ApplyOutcome::Ignored)]
    fn test_transition(
        #[case] current: Option<TradeStatus>,
        #[case] next: TradeStatus,
        #[case] expected: ApplyOutcome,
    ) {
        assert_eq!(transition(current, next), expected);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_applies_once() {
        let store = Arc::new(InMemoryOrderStore::new());
        let processor = OrderStateProcessor::new(store.clone());
        let notify = result(TradeStatus::Success);

        processor.process(&notify).await.unwrap();
        processor.process(&notify).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.apply(&notify).await.unwrap(), ApplyOutcome::Duplicate);
        let state = store.get(ChannelType::Wechat, "T1").await.unwrap().unwrap();
        assert_eq!(state.status, TradeStatus::Success);
    }

    #[tokio::test]
    async fn test_late_notify_does_not_downgrade() {
        let store = InMemoryOrderStore::new();
        store.apply(&result(TradeStatus::Success)).await.unwrap();

        let outcome = store.apply(&result(TradeStatus::NotPay)).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Ignored);

        let state = store.get(ChannelType::Wechat, "T1").await.unwrap().unwrap();
        assert_eq!(state.status, TradeStatus::Success);
    }

    #[tokio::test]
    async fn test_orders_keyed_by_channel() {
        let store = InMemoryOrderStore::new();
        let mut alipay = result(TradeStatus::Closed);
        alipay.channel = ChannelType::Alipay;

        store.apply(&result(TradeStatus::Success)).await.unwrap();
        assert_eq!(store.apply(&alipay).await.unwrap(), ApplyOutcome::Applied);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_metrics_processor() {
        let metrics = Arc::new(InMemoryNotifyMetrics::new());
        let processor = MetricsProcessor::new(metrics.clone());

        processor.process(&result(TradeStatus::Success)).await.unwrap();
        processor.process(&result(TradeStatus::Success)).await.unwrap();
        processor.process(&result(TradeStatus::Closed)).await.unwrap();

        let stats = metrics.snapshot(ChannelType::Wechat);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.success_amount, dec!(0.02));
        assert_eq!(metrics.snapshot(ChannelType::Alipay), ChannelStats::default());
    }

    #[tokio::test]
    async fn test_logging_processor_never_fails() {
        assert!(LoggingProcessor.process(&result(TradeStatus::PayError)).await.is_ok());
    }
}
