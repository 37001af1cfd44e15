//! 微信支付 API v3 适配器
//!
//! 请求使用商户私钥做 `WECHATPAY2-SHA256-RSA2048` 签名，回调通过 HTTP 头验签后
//! 用 APIv3 密钥解密 `resource` 得到交易详情。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::adapters::PaymentAdapter;
use crate::config::WechatConfig;
use crate::domain::enums::{ChannelType, PayScene, RefundStatus, TradeStatus};
use crate::domain::models::{
    CloseRequest, NotifyPayload, NotifyResult, OrderRef, QueryRequest, QueryResponse,
    RefundRequest, RefundResponse, UnifiedPayRequest, UnifiedPayResponse,
};
use crate::domain::money;
use crate::utils::error::{BusinessError, ErrorCode, PayError};
use crate::utils::http_client::{HttpClient, HttpResponse, RequestBody};
use crate::utils::sign::{self, RsaSigner, RsaVerifier};

const AUTH_SCHEMA: &str = "WECHATPAY2-SHA256-RSA2048";
const NOTIFY_MAX_SKEW_SECS: i64 = 300;

/// 微信支付商户凭证
#[derive(Debug, Clone)]
pub struct WechatCredentials {
    pub app_id: String,
    pub mch_id: String,
    pub serial_no: String,       // 商户证书序列号
    pub api_v3_key: String,      // 32字节 APIv3 密钥
    pub merchant_key: RsaSigner,
    pub platform_key: RsaVerifier,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct WechatPayAdapter {
    credentials: WechatCredentials,
    http: HttpClient,
}

// 微信错误响应体
#[derive(Debug, Deserialize)]
struct WechatErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WechatAmount {
    total: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WechatTransaction {
    out_trade_no: String,
    transaction_id: Option<String>,
    trade_state: String,
    amount: Option<WechatAmount>,
    success_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WechatRefund {
    refund_id: String,
    out_refund_no: String,
    status: String,
    amount: Option<WechatRefundAmount>,
}

#[derive(Debug, Deserialize)]
struct WechatRefundAmount {
    refund: i64,
}

#[derive(Debug, Deserialize)]
struct NotifyEnvelope {
    event_type: String,
    resource: NotifyResource,
}

#[derive(Debug, Deserialize)]
struct NotifyResource {
    algorithm: String,
    ciphertext: String,
    nonce: String,
    #[serde(default)]
    associated_data: String,
}

impl WechatPayAdapter {
    pub fn new(credentials: WechatCredentials, http: HttpClient) -> Result<Self, PayError> {
        if credentials.api_v3_key.len() != 32 {
            return Err(PayError::Config("wechat api_v3_key must be 32 bytes".to_string()));
        }
        Ok(Self { credentials, http })
    }

    pub fn from_config(config: &WechatConfig, http: HttpClient) -> Result<Self, PayError> {
        let credentials = WechatCredentials {
            app_id: config.app_id.clone(),
            mch_id: config.mch_id.clone(),
            serial_no: config.serial_no.clone(),
            api_v3_key: config.api_v3_key.clone(),
            merchant_key: RsaSigner::from_pem_file(&config.private_key_path)?,
            platform_key: RsaVerifier::from_pem_file(&config.platform_cert_path)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        };
        Self::new(credentials, http)
    }

    // 生成 Authorization 头，签名串: METHOD\nURL\nTIMESTAMP\nNONCE\nBODY\n
    fn authorization(&self, method: &Method, path: &str, body: &str) -> Result<String, PayError> {
        let timestamp = Utc::now().timestamp();
        let nonce = sign::nonce_str(32);
        let message = format!("{method}\n{path}\n{timestamp}\n{nonce}\n{body}\n");
        let signature = self.credentials.merchant_key.sign(message.as_bytes())?;

        Ok(format!(
            r#"{AUTH_SCHEMA} mchid="{}",nonce_str="{nonce}",timestamp="{timestamp}",serial_no="{}",signature="{signature}""#,
            self.credentials.mch_id, self.credentials.serial_no
        ))
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>, retry: bool) -> Result<HttpResponse, PayError> {
        let body = body.map(|v| RequestBody::Json(v.to_string()));
        let auth = self.authorization(&method, path, body.as_ref().map_or("", |b| b.as_str()))?;
        let headers = [("Authorization", auth)];
        let url = format!("{}{}", self.credentials.base_url, path);

        let resp = if retry {
            self.http.send_with_retry(method, &url, &headers, body.as_ref()).await?
        } else {
            self.http.send(method, &url, &headers, body.as_ref()).await?
        };

        match resp.status {
            401 => Err(PayError::SignatureFailed(format!("wechat rejected request signature: {}", resp.body))),
            s if s >= 500 => Err(PayError::Network(format!("wechat returned status {s}"))),
            _ => Ok(resp),
        }
    }

    // 客户端调起支付的签名: appid\ntimestamp\nnonce\npackage\n
    fn client_sign(&self, timestamp: &str, nonce: &str, package: &str) -> Result<String, PayError> {
        let message = format!("{}\n{timestamp}\n{nonce}\n{package}\n", self.credentials.app_id);
        self.credentials.merchant_key.sign(message.as_bytes())
    }

    fn app_pay_data(&self, prepay_id: &str) -> Result<String, PayError> {
        let timestamp = Utc::now().timestamp().to_string();
        let nonce = sign::nonce_str(32);
        let sign = self.client_sign(&timestamp, &nonce, prepay_id)?;

        Ok(json!({
            "appid": self.credentials.app_id,
            "partnerid": self.credentials.mch_id,
            "prepayid": prepay_id,
            "package": "Sign=WXPay",
            "noncestr": nonce,
            "timestamp": timestamp,
            "sign": sign,
        })
        .to_string())
    }

    fn jsapi_pay_data(&self, prepay_id: &str) -> Result<String, PayError> {
        let timestamp = Utc::now().timestamp().to_string();
        let nonce = sign::nonce_str(32);
        let package = format!("prepay_id={prepay_id}");
        let pay_sign = self.client_sign(&timestamp, &nonce, &package)?;

        Ok(json!({
            "appId": self.credentials.app_id,
            "timeStamp": timestamp,
            "nonceStr": nonce,
            "package": package,
            "signType": "RSA",
            "paySign": pay_sign,
        })
        .to_string())
    }

    fn transaction_path(&self, order: OrderRef<'_>) -> String {
        match order {
            OrderRef::OutTradeNo(no) => format!(
                "/v3/pay/transactions/out-trade-no/{no}?mchid={}",
                self.credentials.mch_id
            ),
            OrderRef::OrderId(id) => format!(
                "/v3/pay/transactions/id/{id}?mchid={}",
                self.credentials.mch_id
            ),
        }
    }

    fn decrypt_resource(&self, resource: &NotifyResource) -> Result<WechatTransaction, PayError> {
        if resource.algorithm != "AEAD_AES_256_GCM" {
            return Err(PayError::InvalidNotify(format!("unsupported algorithm {}", resource.algorithm)));
        }

        let plain = sign::decrypt_aes_256_gcm(
            self.credentials.api_v3_key.as_bytes(),
            resource.nonce.as_bytes(),
            resource.associated_data.as_bytes(),
            &resource.ciphertext,
        )?;

        serde_json::from_slice(&plain)
            .map_err(|e| PayError::InvalidNotify(format!("invalid wechat transaction: {e}")))
    }
}

/// 微信交易状态映射，未知状态按未支付处理
pub fn map_trade_state(state: &str) -> TradeStatus {
    match state {
        "SUCCESS" => TradeStatus::Success,
        "REFUND" => TradeStatus::Refund,
        "NOTPAY" => TradeStatus::NotPay,
        "CLOSED" => TradeStatus::Closed,
        "REVOKED" => TradeStatus::Revoked,
        "USERPAYING" => TradeStatus::UserPaying,
        "PAYERROR" => TradeStatus::PayError,
        other => {
            warn!(trade_state = %other, "Unknown wechat trade state, treated as NOTPAY");
            TradeStatus::NotPay
        }
    }
}

/// 微信错误码映射
pub fn map_error_code(code: &str) -> BusinessError {
    match code {
        "ORDER_NOT_EXIST" | "RESOURCE_NOT_EXISTS" => BusinessError::OrderNotFound,
        "ORDERPAID" => BusinessError::OrderPaid,
        "ORDER_CLOSED" => BusinessError::OrderClosed,
        "NOT_ENOUGH" => BusinessError::InsufficientBalance,
        _ => BusinessError::Rejected(ChannelType::Wechat),
    }
}

fn map_refund_status(status: &str) -> RefundStatus {
    match status {
        "SUCCESS" => RefundStatus::Success,
        "CLOSED" => RefundStatus::Closed,
        "ABNORMAL" => RefundStatus::Abnormal,
        _ => RefundStatus::Processing,
    }
}

fn parse_error(resp: &HttpResponse) -> (BusinessError, WechatErrorBody) {
    let body = resp.json::<WechatErrorBody>().unwrap_or_else(|_| WechatErrorBody {
        code: format!("HTTP_{}", resp.status),
        message: resp.body.clone(),
    });
    (map_error_code(&body.code), body)
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[async_trait]
impl PaymentAdapter for WechatPayAdapter {
    async fn pay(&self, req: &UnifiedPayRequest) -> Result<UnifiedPayResponse, PayError> {
        info!(out_trade_no = %req.out_trade_no, scene = %req.scene, "Creating wechat payment");

        let path = match req.scene {
            PayScene::App => "/v3/pay/transactions/app",
            PayScene::JsApi => "/v3/pay/transactions/jsapi",
            PayScene::H5 => "/v3/pay/transactions/h5",
            PayScene::Native => "/v3/pay/transactions/native",
            PayScene::Pc => {
                return Err(PayError::UnsupportedScene { channel: ChannelType::Wechat, scene: req.scene });
            }
        };

        let mut body = json!({
            "appid": self.credentials.app_id,
            "mchid": self.credentials.mch_id,
            "description": req.subject,
            "out_trade_no": req.out_trade_no,
            "notify_url": req.notify_url,
            "amount": {
                "total": money::to_minor_units(req.total_amount)?,
                "currency": "CNY",
            },
        });
        if let Some(attach) = req.attach.as_deref().filter(|a| !a.is_empty()) {
            body["attach"] = json!(attach);
        }
        match req.scene {
            PayScene::JsApi => {
                let openid = req.payer_id().ok_or_else(|| PayError::missing_parameter("openid"))?;
                body["payer"] = json!({ "openid": openid });
            }
            PayScene::H5 => {
                body["scene_info"] = json!({
                    "payer_client_ip": req.client_ip.as_deref().unwrap_or("127.0.0.1"),
                    "h5_info": { "type": "Wap" },
                });
            }
            _ => {}
        }

        let resp = self.call(Method::POST, path, Some(body), false).await?;
        if !resp.is_success() {
            let (kind, err) = parse_error(&resp);
            warn!(out_trade_no = %req.out_trade_no, code = %err.code, message = %err.message, "Wechat rejected payment");
            return Ok(UnifiedPayResponse::rejected(ChannelType::Wechat, &req.out_trade_no, kind.code(), err.message));
        }

        let data: Value = resp.json()?;
        let field = |name: &str| {
            data.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| PayError::InvalidResponse(format!("wechat response missing {name}")))
        };

        let mut result = UnifiedPayResponse::success(ChannelType::Wechat, &req.out_trade_no);
        match req.scene {
            PayScene::App => {
                let prepay_id = field("prepay_id")?;
                result.pay_data = Some(self.app_pay_data(&prepay_id)?);
                result.order_id = prepay_id;
            }
            PayScene::JsApi => {
                let prepay_id = field("prepay_id")?;
                result.pay_data = Some(self.jsapi_pay_data(&prepay_id)?);
                result.order_id = prepay_id;
            }
            PayScene::H5 => result.pay_url = Some(field("h5_url")?),
            PayScene::Native => result.qr_code = Some(field("code_url")?),
            PayScene::Pc => {
                return Err(PayError::UnsupportedScene { channel: ChannelType::Wechat, scene: req.scene });
            }
        }

        info!(out_trade_no = %req.out_trade_no, "Wechat payment created");
        Ok(result)
    }

    async fn query(&self, req: &QueryRequest) -> Result<QueryResponse, PayError> {
        let order = req.order_ref()?;
        let resp = self.call(Method::GET, &self.transaction_path(order), None, true).await?;

        let fallback_no = req.out_trade_no.as_deref().unwrap_or_default();
        if !resp.is_success() {
            let (kind, err) = parse_error(&resp);
            return Ok(QueryResponse::rejected(ChannelType::Wechat, fallback_no, kind.code(), err.message));
        }

        let tx: WechatTransaction = resp.json()?;
        Ok(QueryResponse {
            code: ErrorCode::Success.as_i32(),
            message: "success".to_string(),
            order_id: tx.transaction_id.unwrap_or_default(),
            trade_status: map_trade_state(&tx.trade_state),
            total_amount: tx.amount.and_then(|a| a.total).map(money::from_minor_units),
            paid_at: parse_time(tx.success_time.as_deref()),
            out_trade_no: tx.out_trade_no,
            channel: ChannelType::Wechat,
        })
    }

    async fn refund(&self, req: &RefundRequest) -> Result<RefundResponse, PayError> {
        info!(out_refund_no = %req.out_refund_no, "Creating wechat refund");

        let mut body = json!({
            "out_refund_no": req.out_refund_no,
            "amount": {
                "refund": money::to_minor_units(req.refund_amount)?,
                "total": money::to_minor_units(req.total_amount)?,
                "currency": "CNY",
            },
        });
        match req.order_ref()? {
            OrderRef::OutTradeNo(no) => body["out_trade_no"] = json!(no),
            OrderRef::OrderId(id) => body["transaction_id"] = json!(id),
        }
        if let Some(reason) = req.reason.as_deref().filter(|r| !r.is_empty()) {
            body["reason"] = json!(reason);
        }

        let resp = self.call(Method::POST, "/v3/refund/domestic/refunds", Some(body), false).await?;
        if !resp.is_success() {
            let (kind, err) = parse_error(&resp);
            warn!(out_refund_no = %req.out_refund_no, code = %err.code, "Wechat rejected refund");
            return Ok(RefundResponse::rejected(req, kind.code(), err.message));
        }

        let refund: WechatRefund = resp.json()?;
        Ok(RefundResponse {
            code: ErrorCode::Success.as_i32(),
            message: "success".to_string(),
            refund_id: refund.refund_id,
            out_refund_no: refund.out_refund_no,
            refund_amount: refund
                .amount
                .map(|a| money::from_minor_units(a.refund))
                .unwrap_or(req.refund_amount),
            status: map_refund_status(&refund.status),
            channel: ChannelType::Wechat,
        })
    }

    async fn close(&self, req: &CloseRequest) -> Result<(), PayError> {
        let out_trade_no = match req.order_ref()? {
            OrderRef::OutTradeNo(no) => no,
            OrderRef::OrderId(_) => {
                return Err(PayError::invalid_parameter("wechat close requires out_trade_no"));
            }
        };

        let path = format!("/v3/pay/transactions/out-trade-no/{out_trade_no}/close");
        let body = json!({ "mchid": self.credentials.mch_id });
        let resp = self.call(Method::POST, &path, Some(body), false).await?;

        if resp.is_success() {
            info!(out_trade_no = %out_trade_no, "Wechat order closed");
            return Ok(());
        }

        let (kind, err) = parse_error(&resp);
        if kind == BusinessError::OrderClosed {
            info!(out_trade_no = %out_trade_no, "Wechat order already closed");
            return Ok(());
        }
        Err(PayError::business(kind, err.code, err.message))
    }

    async fn handle_notify(&self, payload: &NotifyPayload) -> Result<NotifyResult, PayError> {
        let header = |name: &str| {
            payload
                .header(name)
                .ok_or_else(|| PayError::InvalidNotify(format!("missing header {name}")))
        };
        let timestamp = header("wechatpay-timestamp")?;
        let nonce = header("wechatpay-nonce")?;
        let signature = header("wechatpay-signature")?;
        let body = payload.body_str()?;

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| PayError::InvalidNotify("invalid wechatpay-timestamp".to_string()))?;
        if !sign::verify_timestamp(ts, NOTIFY_MAX_SKEW_SECS) {
            return Err(PayError::InvalidNotify("wechatpay-timestamp out of range".to_string()));
        }

        let message = format!("{timestamp}\n{nonce}\n{body}\n");
        if !self.credentials.platform_key.verify(message.as_bytes(), signature) {
            error!(serial = ?payload.header("wechatpay-serial"), "Wechat notify signature verification failed");
            return Err(PayError::InvalidSignature("wechat notify signature mismatch".to_string()));
        }

        let envelope: NotifyEnvelope = serde_json::from_str(body)
            .map_err(|e| PayError::InvalidNotify(format!("invalid wechat notify body: {e}")))?;
        let tx = self.decrypt_resource(&envelope.resource)?;
        let trade_status = map_trade_state(&tx.trade_state);

        info!(
            event_type = %envelope.event_type,
            out_trade_no = %tx.out_trade_no,
            trade_state = %tx.trade_state,
            "Wechat notify verified"
        );

        Ok(NotifyResult {
            success: trade_status.is_success(),
            total_amount: tx
                .amount
                .and_then(|a| a.total)
                .map(money::from_minor_units)
                .unwrap_or_default(),
            trade_status,
            order_id: tx.transaction_id.unwrap_or_default(),
            paid_at: parse_time(tx.success_time.as_deref()),
            out_trade_no: tx.out_trade_no,
            channel: ChannelType::Wechat,
        })
    }

    fn channel(&self) -> ChannelType {
        ChannelType::Wechat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("SUCCESS", TradeStatus::Success)]
    #[case("REFUND", TradeStatus::Refund)]
    #[case("NOTPAY", TradeStatus::NotPay)]
    #[case("CLOSED", TradeStatus::Closed)]
    #[case("REVOKED", TradeStatus::Revoked)]
    #[case("USERPAYING", TradeStatus::UserPaying)]
    #[case("PAYERROR", TradeStatus::PayError)]
    #[case("SOMETHING_NEW", TradeStatus::NotPay)]
    fn test_map_trade_state(#[case] input: &str, #[case] expected: TradeStatus) {
        assert_eq!(map_trade_state(input), expected);
    }

    #[rstest]
    #[case("ORDER_NOT_EXIST", ErrorCode::OrderNotFound)]
    #[case("RESOURCE_NOT_EXISTS", ErrorCode::OrderNotFound)]
    #[case("ORDERPAID", ErrorCode::OrderPaid)]
    #[case("ORDER_CLOSED", ErrorCode::OrderClosed)]
    #[case("NOT_ENOUGH", ErrorCode::InsufficientBalance)]
    #[case("PARAM_ERROR", ErrorCode::WechatError)]
    fn test_map_error_code(#[case] input: &str, #[case] expected: ErrorCode) {
        assert_eq!(map_error_code(input).code(), expected);
    }

    #[test]
    fn test_parse_time() {
        let t = parse_time(Some("2024-05-01T10:00:00+08:00")).unwrap();
        assert_eq!(t.to_rfc3339(), "2024-05-01T02:00:00+00:00");
        assert!(parse_time(Some("20240501100000")).is_none());
    }
}
