use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::adapters::PaymentAdapter;
use crate::domain::enums::ChannelType;
use crate::domain::models::{
    CloseRequest, NotifyPayload, NotifyResult, QueryRequest, QueryResponse, RefundRequest,
    RefundResponse, UnifiedPayRequest, UnifiedPayResponse,
};
use crate::utils::error::PayError;

/// 支付网关：渠道到适配器的只读路由表，启动时构建一次
pub struct PaymentGateway {
    adapters: HashMap<ChannelType, Arc<dyn PaymentAdapter>>,
}

impl PaymentGateway {
    /// 同一渠道重复注册视为配置错误
    pub fn new(adapters: Vec<Arc<dyn PaymentAdapter>>) -> Result<Self, PayError> {
        let mut map: HashMap<ChannelType, Arc<dyn PaymentAdapter>> = HashMap::new();

        for adapter in adapters {
            let channel = adapter.channel();
            if map.insert(channel, adapter).is_some() {
                error!(channel = %channel, "Duplicate payment adapter registration");
                return Err(PayError::Config(format!(
                    "duplicate adapter registration for channel {channel}"
                )));
            }
            info!(channel = %channel, "Payment adapter registered");
        }

        Ok(Self { adapters: map })
    }

    pub fn adapter(&self, channel: ChannelType) -> Result<&Arc<dyn PaymentAdapter>, PayError> {
        self.adapters
            .get(&channel)
            .ok_or_else(|| PayError::UnsupportedChannel(channel.to_string()))
    }

    pub async fn pay(&self, req: &UnifiedPayRequest) -> Result<UnifiedPayResponse, PayError> {
        self.adapter(req.channel)?.pay(req).await
    }

    pub async fn query(&self, req: &QueryRequest) -> Result<QueryResponse, PayError> {
        self.adapter(req.channel)?.query(req).await
    }

    pub async fn refund(&self, req: &RefundRequest) -> Result<RefundResponse, PayError> {
        self.adapter(req.channel)?.refund(req).await
    }

    pub async fn close(&self, req: &CloseRequest) -> Result<(), PayError> {
        self.adapter(req.channel)?.close(req).await
    }

    pub async fn handle_notify(&self, channel: ChannelType, payload: &NotifyPayload) -> Result<NotifyResult, PayError> {
        self.adapter(channel)?.handle_notify(payload).await
    }

    /// 已注册渠道，按渠道排序且不重复
    pub fn supported_channels(&self) -> Vec<ChannelType> {
        let mut channels: Vec<ChannelType> = self.adapters.keys().copied().collect();
        channels.sort();
        channels
    }

    pub fn is_supported(&self, channel: ChannelType) -> bool {
        self.adapters.contains_key(&channel)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::enums::{PayScene, TradeStatus};
    use async_trait::async_trait;
    use mockall::mock;
    use rust_decimal_macros::dec;

    mock! {
        pub Adapter {}

        #[async_trait]
        impl PaymentAdapter for Adapter {
            async fn pay(&self, req: &UnifiedPayRequest) -> Result<UnifiedPayResponse, PayError>;
            async fn query(&self, req: &QueryRequest) -> Result<QueryResponse, PayError>;
            async fn refund(&self, req: &RefundRequest) -> Result<RefundResponse, PayError>;
            async fn close(&self, req: &CloseRequest) -> Result<(), PayError>;
            async fn handle_notify(&self, payload: &NotifyPayload) -> Result<NotifyResult, PayError>;
            fn channel(&self) -> ChannelType;
        }
    }

    fn adapter_for(channel: ChannelType) -> MockAdapter {
        let mut adapter = MockAdapter::new();
        adapter.expect_channel().return_const(channel);
        adapter
    }

    fn pay_request(channel: ChannelType) -> UnifiedPayRequest {
        UnifiedPayRequest {
            channel,
            out_trade_no: "T1".to_string(),
            total_amount: dec!(0.01),
            subject: "test".to_string(),
            scene: PayScene::App,
            notify_url: "https://example.com/notify".to_string(),
            return_url: None,
            payer_id: None,
            attach: None,
            client_ip: None,
        }
    }

    #[tokio::test]
    async fn test_routes_to_registered_adapter() {
        let mut wechat = adapter_for(ChannelType::Wechat);
        wechat.expect_pay().times(1).returning(|req| {
            let mut resp = UnifiedPayResponse::success(ChannelType::Wechat, &req.out_trade_no);
            resp.pay_data = Some("prepay".to_string());
            Ok(resp)
        });

        let gateway = PaymentGateway::new(vec![Arc::new(wechat)]).unwrap();
        let resp = gateway.pay(&pay_request(ChannelType::Wechat)).await.unwrap();

        assert_eq!(resp.channel, ChannelType::Wechat);
        assert_eq!(resp.out_trade_no, "T1");
        assert!(resp.has_pay_data());
    }

    #[tokio::test]
    async fn test_unregistered_channel_never_reaches_adapter() {
        let mut wechat = adapter_for(ChannelType::Wechat);
        wechat.expect_pay().never();
        wechat.expect_query().never();
        wechat.expect_refund().never();
        wechat.expect_close().never();

        let gateway = PaymentGateway::new(vec![Arc::new(wechat)]).unwrap();

        let err = gateway.pay(&pay_request(ChannelType::Alipay)).await.unwrap_err();
        assert!(err.is_unsupported_channel());

        let query = QueryRequest {
            channel: ChannelType::UnionPay,
            out_trade_no: Some("T1".into()),
            order_id: None,
            txn_time: None,
        };
        assert!(gateway.query(&query).await.unwrap_err().is_unsupported_channel());

        let close = CloseRequest {
            channel: ChannelType::Alipay,
            out_trade_no: Some("T1".into()),
            order_id: None,
            txn_time: None,
        };
        assert!(gateway.close(&close).await.unwrap_err().is_unsupported_channel());

        let refund = RefundRequest {
            channel: ChannelType::UnionPay,
            out_trade_no: Some("T1".into()),
            order_id: None,
            out_refund_no: "R1".into(),
            refund_amount: dec!(0.01),
            total_amount: dec!(0.01),
            reason: None,
        };
        assert!(gateway.refund(&refund).await.unwrap_err().is_unsupported_channel());
    }

    #[tokio::test]
    async fn test_provider_errors_pass_through_unchanged() {
        let mut alipay = adapter_for(ChannelType::Alipay);
        alipay
            .expect_query()
            .returning(|_| Err(PayError::Timeout("alipay".into())));

        let gateway = PaymentGateway::new(vec![Arc::new(alipay)]).unwrap();
        let query = QueryRequest {
            channel: ChannelType::Alipay,
            out_trade_no: Some("T1".into()),
            order_id: None,
            txn_time: None,
        };
        let err = gateway.query(&query).await.unwrap_err();
        assert!(!err.is_unsupported_channel());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_supported_channels_exact_set() {
        let gateway = PaymentGateway::new(vec![
            Arc::new(adapter_for(ChannelType::UnionPay)),
            Arc::new(adapter_for(ChannelType::Wechat)),
        ])
        .unwrap();

        assert_eq!(gateway.supported_channels(), vec![ChannelType::Wechat, ChannelType::UnionPay]);
        assert!(!gateway.is_supported(ChannelType::Alipay));

        let empty = PaymentGateway::new(vec![]).unwrap();
        assert!(empty.supported_channels().is_empty());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = PaymentGateway::new(vec![
            Arc::new(adapter_for(ChannelType::Wechat)),
            Arc::new(adapter_for(ChannelType::Wechat)),
        ]);
        let err = result.err().unwrap();
        assert!(err.to_string().contains("duplicate adapter registration"));
    }

    #[tokio::test]
    async fn test_notify_routed_by_channel() {
        let mut unionpay = adapter_for(ChannelType::UnionPay);
        unionpay.expect_handle_notify().times(1).returning(|_| {
            Ok(NotifyResult {
                success: true,
                out_trade_no: "T1".into(),
                total_amount: dec!(0.01),
                trade_status: TradeStatus::Success,
                order_id: "Q1".into(),
                channel: ChannelType::UnionPay,
                paid_at: None,
            })
        });

        let gateway = PaymentGateway::new(vec![Arc::new(unionpay)]).unwrap();
        let result = gateway
            .handle_notify(ChannelType::UnionPay, &NotifyPayload::new("respCode=00"))
            .await
            .unwrap();
        assert_eq!(result.out_trade_no, "T1");
    }
}
