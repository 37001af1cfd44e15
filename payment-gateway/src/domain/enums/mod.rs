use serde::{Serialize, Deserialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::utils::error::PayError;

/// 支付渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChannelType {
    Wechat,
    Alipay,
    UnionPay,
}

impl ChannelType {
    /// 解析渠道标识，未知渠道返回 unsupported channel 错误
    pub fn parse(value: &str) -> Result<Self, PayError> {
        value
            .parse()
            .map_err(|_| PayError::UnsupportedChannel(value.to_string()))
    }
}

/// 支付场景
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PayScene {
    App,    // APP支付
    H5,     // 手机网页支付
    JsApi,  // 公众号/小程序支付
    Native, // 扫码支付
    Pc,     // 电脑网站支付
}

impl PayScene {
    pub fn parse(value: &str) -> Result<Self, PayError> {
        value.parse().map_err(|_| PayError::invalid_scene(value))
    }
}

/// 统一交易状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum TradeStatus {
    Success,    // 支付成功
    Refund,     // 转入退款
    NotPay,     // 未支付
    Closed,     // 已关闭
    Revoked,    // 已撤销
    UserPaying, // 用户支付中
    PayError,   // 支付失败
}

impl TradeStatus {
    /// 终态不会再变化，退款除外（成功后可转入退款）
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::NotPay | Self::UserPaying)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// 退款状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum RefundStatus {
    Success,
    Processing,
    Closed,
    Abnormal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_channel_wire_names() {
        assert_eq!(ChannelType::Wechat.to_string(), "wechat");
        assert_eq!(ChannelType::UnionPay.to_string(), "unionpay");
        assert_eq!(ChannelType::parse("alipay").unwrap(), ChannelType::Alipay);

        let json = serde_json::to_string(&ChannelType::UnionPay).unwrap();
        assert_eq!(json, "\"unionpay\"");
    }

    #[test]
    fn test_unknown_channel_is_unsupported() {
        let err = ChannelType::parse("unknown").unwrap_err();
        assert!(err.is_unsupported_channel());
        assert_eq!(err.to_string(), "unsupported payment channel: unknown");
    }

    #[test]
    fn test_scene_parsing() {
        assert_eq!(PayScene::parse("jsapi").unwrap(), PayScene::JsApi);
        assert_eq!(PayScene::parse("pc").unwrap(), PayScene::Pc);
        // 未知场景不能静默回退到默认值
        assert!(PayScene::parse("mini_program").is_err());
        assert_eq!(PayScene::iter().count(), 5);
    }

    #[test]
    fn test_trade_status_names() {
        assert_eq!(TradeStatus::NotPay.to_string(), "NOTPAY");
        assert_eq!(TradeStatus::UserPaying.to_string(), "USERPAYING");
        assert_eq!("PAYERROR".parse::<TradeStatus>().unwrap(), TradeStatus::PayError);
        assert_eq!(serde_json::to_string(&TradeStatus::Revoked).unwrap(), "\"REVOKED\"");

        assert!(TradeStatus::Success.is_terminal());
        assert!(!TradeStatus::UserPaying.is_terminal());
    }
}
