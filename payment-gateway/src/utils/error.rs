use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use std::fmt;
use tracing::error;

use crate::domain::enums::{ChannelType, PayScene};

// API响应结构: {code, message, data?}, code=0 表示成功
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T) -> Self {
        Self {
            code: ErrorCode::Success.as_i32(),
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: None,
        }
    }
}

// 业务错误代码枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success = 0,

    // 请求校验错误 (10xx)
    UnsupportedChannel = 1001,
    InvalidScene = 1002,
    InvalidAmount = 1003,
    MissingParameter = 1004,
    InvalidParameter = 1005,

    // 渠道业务错误 (10xx)
    OrderNotFound = 1006,
    OrderClosed = 1007,
    OrderPaid = 1008,
    OrderExpired = 1009,
    RefundNotAllowed = 1010,
    InsufficientBalance = 1011,

    // 渠道返回的其他业务拒绝 (20xx)
    WechatError = 2001,
    AlipayError = 2002,
    UnionPayError = 2003,

    // 签名错误 (30xx)
    InvalidSignature = 3001,
    SignatureFailed = 3002,

    // 通知错误 (40xx)
    InvalidNotify = 4001,
    NotifyVerifyFailed = 4002,
    NotifyProcessFailed = 4003,

    // 系统与传输错误 (50xx)
    SystemError = 5000,
    NetworkError = 5001,
    Timeout = 5002,
    ConfigError = 5003,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",

            Self::UnsupportedChannel => "unsupported payment channel",
            Self::InvalidScene => "invalid payment scene",
            Self::InvalidAmount => "invalid amount",
            Self::MissingParameter => "missing required parameter",
            Self::InvalidParameter => "invalid parameter",

            Self::OrderNotFound => "order not found",
            Self::OrderClosed => "order closed",
            Self::OrderPaid => "order already paid",
            Self::OrderExpired => "order expired",
            Self::RefundNotAllowed => "refund not allowed",
            Self::InsufficientBalance => "insufficient balance",

            Self::WechatError => "wechat pay error",
            Self::AlipayError => "alipay error",
            Self::UnionPayError => "unionpay error",

            Self::InvalidSignature => "invalid signature",
            Self::SignatureFailed => "signature failed",

            Self::InvalidNotify => "invalid notify data",
            Self::NotifyVerifyFailed => "notify verification failed",
            Self::NotifyProcessFailed => "notify processing failed",

            Self::SystemError => "system error",
            Self::NetworkError => "network error",
            Self::Timeout => "request timeout",
            Self::ConfigError => "configuration error",
        }
    }

    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn as_status_code(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            Self::UnsupportedChannel
            | Self::InvalidScene
            | Self::InvalidAmount
            | Self::MissingParameter
            | Self::InvalidParameter => StatusCode::BAD_REQUEST,

            Self::OrderNotFound => StatusCode::NOT_FOUND,
            Self::OrderClosed | Self::OrderPaid => StatusCode::CONFLICT,
            Self::OrderExpired
            | Self::RefundNotAllowed
            | Self::InsufficientBalance => StatusCode::UNPROCESSABLE_ENTITY,

            Self::WechatError | Self::AlipayError | Self::UnionPayError => StatusCode::BAD_GATEWAY,

            Self::InvalidSignature
            | Self::InvalidNotify
            | Self::NotifyVerifyFailed => StatusCode::BAD_REQUEST,
            Self::SignatureFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotifyProcessFailed => StatusCode::INTERNAL_SERVER_ERROR,

            Self::SystemError | Self::ConfigError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NetworkError => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 渠道业务拒绝的规范分类，各适配器把渠道自有的错误码映射到这里
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusinessError {
    OrderNotFound,
    OrderClosed,
    OrderPaid,
    OrderExpired,
    RefundNotAllowed,
    InsufficientBalance,
    /// 无法归类的渠道拒绝
    Rejected(ChannelType),
}

impl BusinessError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::OrderNotFound => ErrorCode::OrderNotFound,
            Self::OrderClosed => ErrorCode::OrderClosed,
            Self::OrderPaid => ErrorCode::OrderPaid,
            Self::OrderExpired => ErrorCode::OrderExpired,
            Self::RefundNotAllowed => ErrorCode::RefundNotAllowed,
            Self::InsufficientBalance => ErrorCode::InsufficientBalance,
            Self::Rejected(ChannelType::Wechat) => ErrorCode::WechatError,
            Self::Rejected(ChannelType::Alipay) => ErrorCode::AlipayError,
            Self::Rejected(ChannelType::UnionPay) => ErrorCode::UnionPayError,
        }
    }
}

impl fmt::Display for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code().as_str())
    }
}

// 应用错误类型
#[derive(Error, Debug)]
pub enum PayError {
    #[error("{code}: {message}")]
    Validation { code: ErrorCode, message: String },

    #[error("unsupported payment channel: {0}")]
    UnsupportedChannel(String),

    #[error("unsupported scene {scene} for channel {channel}")]
    UnsupportedScene { channel: ChannelType, scene: PayScene },

    #[error("{kind} [{provider_code}]: {message}")]
    Business {
        kind: BusinessError,
        provider_code: String,
        message: String,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout: {0}")]
    Timeout(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("signature failed: {0}")]
    SignatureFailed(String),

    #[error("invalid notify data: {0}")]
    InvalidNotify(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("processor {name} failed: {source}")]
    Processor {
        name: String,
        #[source]
        source: Box<PayError>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl PayError {
    pub fn invalid_amount(message: impl Into<String>) -> Self {
        Self::Validation { code: ErrorCode::InvalidAmount, message: message.into() }
    }

    pub fn missing_parameter(field: &str) -> Self {
        Self::Validation {
            code: ErrorCode::MissingParameter,
            message: format!("{field} is required"),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::Validation { code: ErrorCode::InvalidParameter, message: message.into() }
    }

    pub fn invalid_scene(scene: &str) -> Self {
        Self::Validation {
            code: ErrorCode::InvalidScene,
            message: format!("invalid payment scene: {scene}"),
        }
    }

    pub fn business(
        kind: BusinessError,
        provider_code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Business {
            kind,
            provider_code: provider_code.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } => *code,
            Self::UnsupportedChannel(_) => ErrorCode::UnsupportedChannel,
            Self::UnsupportedScene { .. } => ErrorCode::InvalidScene,
            Self::Business { kind, .. } => kind.code(),
            Self::Network(_) => ErrorCode::NetworkError,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::InvalidSignature(_) => ErrorCode::InvalidSignature,
            Self::SignatureFailed(_) => ErrorCode::SignatureFailed,
            Self::InvalidNotify(_) => ErrorCode::InvalidNotify,
            Self::InvalidResponse(_) => ErrorCode::SystemError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Processor { .. } => ErrorCode::NotifyProcessFailed,
            Self::Internal(_) => ErrorCode::SystemError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.code().as_status_code()
    }

    /// 网络、超时与系统错误可由调用方重试，其余错误重试同样的请求没有意义
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::NetworkError | ErrorCode::Timeout | ErrorCode::SystemError
        )
    }

    pub fn is_business(&self) -> bool {
        matches!(self, Self::Business { .. })
    }

    pub fn is_unsupported_channel(&self) -> bool {
        matches!(self, Self::UnsupportedChannel(_))
    }

    // 获取用户友好的错误消息，签名与通知错误不回显内部细节
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::UnsupportedChannel(channel) => format!("unsupported payment channel: {channel}"),
            Self::UnsupportedScene { .. } => self.to_string(),
            Self::Business { message, .. } => message.clone(),
            Self::Network(_) | Self::Timeout(_) => self.code().as_str().to_string(),
            Self::InvalidSignature(_) | Self::InvalidNotify(_) => self.code().as_str().to_string(),
            Self::SignatureFailed(err) => {
                error!("Signature failed: {}", err);
                ErrorCode::SignatureFailed.as_str().to_string()
            }
            Self::InvalidResponse(err) | Self::Internal(err) | Self::Config(err) => {
                error!("Internal error: {}", err);
                "An internal error occurred. Please try again later.".to_string()
            }
            Self::Processor { name, .. } => format!("notify processor {name} failed"),
        }
    }
}

impl From<reqwest::Error> for PayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<config::ConfigError> for PayError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

// 将PayError转换为Axum响应
impl IntoResponse for PayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code().as_i32();
        let message = self.user_message();

        if status.is_server_error() {
            error!(
                status_code = %status.as_u16(),
                error_code = %code,
                error = %self,
                "Server error occurred"
            );
        }

        (status, Json(ApiResponse::<()>::error(code, &message))).into_response()
    }
}
