use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::domain::enums::ChannelType;
use crate::domain::models::{
    CloseRequest, NotifyPayload, NotifyResult, QueryRequest, QueryResponse, RefundRequest,
    RefundResponse, UnifiedPayRequest, UnifiedPayResponse,
};
use crate::utils::error::PayError;
use crate::utils::http_client::HttpClient;

pub mod alipay;
pub mod unionpay;
pub mod wechat;

pub use alipay::AlipayAdapter;
pub use unionpay::UnionPayAdapter;
pub use wechat::WechatPayAdapter;

/// 支付适配器公共接口，每个渠道一个实现
///
/// 渠道业务拒绝通过响应中的非0 code 返回；网络、签名、配置错误通过 `Err` 返回。
/// 只有查询会在内部重试，下单、退款、关单的重试由调用方决定。
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// 统一下单
    async fn pay(&self, req: &UnifiedPayRequest) -> Result<UnifiedPayResponse, PayError>;

    /// 查询交易状态
    async fn query(&self, req: &QueryRequest) -> Result<QueryResponse, PayError>;

    /// 发起退款，out_refund_no 原样透传给渠道作为幂等键
    async fn refund(&self, req: &RefundRequest) -> Result<RefundResponse, PayError>;

    /// 关闭未支付订单，渠道返回已关闭时视为成功
    async fn close(&self, req: &CloseRequest) -> Result<(), PayError>;

    /// 验签并解析异步通知，验签失败一定返回错误
    async fn handle_notify(&self, payload: &NotifyPayload) -> Result<NotifyResult, PayError>;

    fn channel(&self) -> ChannelType;
}

/// 根据配置创建已启用的渠道适配器
pub fn create_adapters(config: &AppConfig) -> Result<Vec<Arc<dyn PaymentAdapter>>, PayError> {
    let http = HttpClient::new(config.http.client_config())?;
    let mut adapters: Vec<Arc<dyn PaymentAdapter>> = Vec::new();

    if config.wechat.enabled {
        adapters.push(Arc::new(WechatPayAdapter::from_config(&config.wechat, http.clone())?));
        info!("Wechat pay adapter enabled");
    }

    if config.alipay.enabled {
        adapters.push(Arc::new(AlipayAdapter::from_config(&config.alipay, http.clone())?));
        info!("Alipay adapter enabled");
    }

    if config.unionpay.enabled {
        adapters.push(Arc::new(UnionPayAdapter::from_config(&config.unionpay, http)?));
        info!("UnionPay adapter enabled");
    }

    Ok(adapters)
}
