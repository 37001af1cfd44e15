use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::enums::{ChannelType, PayScene, RefundStatus, TradeStatus};
use crate::domain::money;
use crate::utils::error::{ErrorCode, PayError};

/// 统一下单请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedPayRequest {
    pub channel: ChannelType,
    pub out_trade_no: String,            // 商户订单号
    pub total_amount: Decimal,           // 金额（元）
    pub subject: String,                 // 订单标题
    pub scene: PayScene,
    pub notify_url: String,              // 异步通知地址
    pub return_url: Option<String>,      // 前端跳转地址
    pub payer_id: Option<String>,        // 付款人标识（微信openid / 支付宝buyer_id）
    pub attach: Option<String>,          // 附加数据，通知时原样返回
    pub client_ip: Option<String>,
}

impl UnifiedPayRequest {
    pub fn validate(&self) -> Result<(), PayError> {
        require("out_trade_no", &self.out_trade_no)?;
        require("subject", &self.subject)?;
        require("notify_url", &self.notify_url)?;
        money::validate_amount(self.total_amount)
    }

    pub fn payer_id(&self) -> Option<&str> {
        self.payer_id.as_deref().filter(|v| !v.is_empty())
    }
}

/// 统一下单响应，code 非0表示渠道业务拒绝
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnifiedPayResponse {
    pub code: i32,
    pub message: String,
    pub order_id: String,                // 渠道订单号（部分场景下单时尚未分配）
    pub out_trade_no: String,
    pub pay_data: Option<String>,        // 客户端调起参数：SDK参数JSON / 订单串 / 表单 / tn
    pub qr_code: Option<String>,
    pub pay_url: Option<String>,
    pub channel: ChannelType,
}

impl UnifiedPayResponse {
    pub fn success(channel: ChannelType, out_trade_no: &str) -> Self {
        Self {
            code: ErrorCode::Success.as_i32(),
            message: "success".to_string(),
            order_id: String::new(),
            out_trade_no: out_trade_no.to_string(),
            pay_data: None,
            qr_code: None,
            pay_url: None,
            channel,
        }
    }

    pub fn rejected(channel: ChannelType, out_trade_no: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_i32(),
            message: message.into(),
            ..Self::success(channel, out_trade_no)
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == ErrorCode::Success.as_i32()
    }

    pub fn has_pay_data(&self) -> bool {
        [&self.pay_data, &self.qr_code, &self.pay_url]
            .iter()
            .any(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

/// 订单引用：渠道订单号或商户订单号，优先使用商户订单号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRef<'a> {
    OutTradeNo(&'a str),
    OrderId(&'a str),
}

fn order_ref<'a>(out_trade_no: &'a Option<String>, order_id: &'a Option<String>) -> Result<OrderRef<'a>, PayError> {
    match (non_empty(out_trade_no), non_empty(order_id)) {
        (Some(no), _) => Ok(OrderRef::OutTradeNo(no)),
        (None, Some(id)) => Ok(OrderRef::OrderId(id)),
        (None, None) => Err(PayError::missing_parameter("out_trade_no or order_id")),
    }
}

/// 查询请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub channel: ChannelType,
    pub out_trade_no: Option<String>,
    pub order_id: Option<String>,
    #[serde(default)]
    pub txn_time: Option<String>,        // 原交易时间 yyyyMMddHHmmss，银联按商户订单号查询时使用
}

impl QueryRequest {
    pub fn validate(&self) -> Result<(), PayError> {
        self.order_ref().map(|_| ())
    }

    pub fn order_ref(&self) -> Result<OrderRef<'_>, PayError> {
        order_ref(&self.out_trade_no, &self.order_id)
    }
}

/// 查询响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub code: i32,
    pub message: String,
    pub order_id: String,
    pub out_trade_no: String,
    pub trade_status: TradeStatus,
    pub total_amount: Option<Decimal>,
    pub paid_at: Option<DateTime<Utc>>,
    pub channel: ChannelType,
}

impl QueryResponse {
    pub fn rejected(channel: ChannelType, out_trade_no: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_i32(),
            message: message.into(),
            order_id: String::new(),
            out_trade_no: out_trade_no.to_string(),
            trade_status: TradeStatus::NotPay,
            total_amount: None,
            paid_at: None,
            channel,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == ErrorCode::Success.as_i32()
    }
}

/// 退款请求，out_refund_no 是渠道侧的幂等键
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub channel: ChannelType,
    pub out_trade_no: Option<String>,
    pub order_id: Option<String>,
    pub out_refund_no: String,
    pub refund_amount: Decimal,
    pub total_amount: Decimal,
    pub reason: Option<String>,
}

impl RefundRequest {
    pub fn validate(&self) -> Result<(), PayError> {
        self.order_ref()?;
        require("out_refund_no", &self.out_refund_no)?;
        money::validate_amount(self.refund_amount)?;
        money::validate_amount(self.total_amount)?;
        if self.refund_amount > self.total_amount {
            return Err(PayError::invalid_amount(format!(
                "refund amount {} exceeds total amount {}",
                self.refund_amount, self.total_amount
            )));
        }
        Ok(())
    }

    pub fn order_ref(&self) -> Result<OrderRef<'_>, PayError> {
        order_ref(&self.out_trade_no, &self.order_id)
    }
}

/// 退款响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefundResponse {
    pub code: i32,
    pub message: String,
    pub refund_id: String,               // 渠道退款单号
    pub out_refund_no: String,
    pub refund_amount: Decimal,
    pub status: RefundStatus,
    pub channel: ChannelType,
}

impl RefundResponse {
    pub fn rejected(req: &RefundRequest, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_i32(),
            message: message.into(),
            refund_id: String::new(),
            out_refund_no: req.out_refund_no.clone(),
            refund_amount: req.refund_amount,
            status: RefundStatus::Abnormal,
            channel: req.channel,
        }
    }
}

/// 关单请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseRequest {
    pub channel: ChannelType,
    pub out_trade_no: Option<String>,
    pub order_id: Option<String>,
    #[serde(default)]
    pub txn_time: Option<String>,        // 原交易时间 yyyyMMddHHmmss，银联按商户订单号查询时使用
}

impl CloseRequest {
    pub fn validate(&self) -> Result<(), PayError> {
        self.order_ref().map(|_| ())
    }

    pub fn order_ref(&self) -> Result<OrderRef<'_>, PayError> {
        order_ref(&self.out_trade_no, &self.order_id)
    }
}

/// 渠道异步通知的原始内容，header 名统一小写
#[derive(Debug, Clone, Default)]
pub struct NotifyPayload {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl NotifyPayload {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body_str(&self) -> Result<&str, PayError> {
        std::str::from_utf8(&self.body)
            .map_err(|e| PayError::InvalidNotify(format!("body is not valid utf-8: {e}")))
    }
}

/// 归一化后的通知结果，所有通知处理器共享同一份
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotifyResult {
    pub success: bool,
    pub out_trade_no: String,
    pub total_amount: Decimal,
    pub trade_status: TradeStatus,
    pub order_id: String,
    pub channel: ChannelType,
    pub paid_at: Option<DateTime<Utc>>,
}

fn require(field: &str, value: &str) -> Result<(), PayError> {
    if value.trim().is_empty() {
        return Err(PayError::missing_parameter(field));
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
