//! 支付宝开放平台适配器（RSA2）
//!
//! 公共参数经通用签名工具签名后放入 `sign` 字段；异步通知验签时排除 `sign` 与 `sign_type`。

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{error, info, warn};

use crate::adapters::PaymentAdapter;
use crate::config::AlipayConfig;
use crate::domain::enums::{ChannelType, PayScene, RefundStatus, TradeStatus};
use crate::domain::models::{
    CloseRequest, NotifyPayload, NotifyResult, OrderRef, QueryRequest, QueryResponse,
    RefundRequest, RefundResponse, UnifiedPayRequest, UnifiedPayResponse,
};
use crate::domain::money;
use crate::utils::error::{BusinessError, ErrorCode, PayError};
use crate::utils::html;
use crate::utils::http_client::{HttpClient, RequestBody};
use crate::utils::sign::{RsaSigner, RsaVerifier};

const SUCCESS_CODE: &str = "10000";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const CHINA_OFFSET_SECS: i32 = 8 * 3600;

/// 支付宝应用凭证
#[derive(Debug, Clone)]
pub struct AlipayCredentials {
    pub app_id: String,
    pub app_private_key: RsaSigner,
    pub alipay_public_key: RsaVerifier,
    pub gateway_url: String,
}

#[derive(Debug, Clone)]
pub struct AlipayAdapter {
    credentials: AlipayCredentials,
    http: HttpClient,
}

// 支付宝接口响应中的公共字段
#[derive(Debug, Deserialize)]
struct AlipayResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    sub_code: Option<String>,
    #[serde(default)]
    sub_msg: Option<String>,
    #[serde(flatten)]
    body: HashMap<String, Value>,
}

impl AlipayResponse {
    fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.body.get(name).and_then(Value::as_str)
    }

    fn error_code(&self) -> &str {
        self.sub_code.as_deref().unwrap_or(&self.code)
    }

    fn error_message(&self) -> String {
        self.sub_msg.clone().unwrap_or_else(|| self.msg.clone())
    }
}

impl AlipayAdapter {
    pub fn new(credentials: AlipayCredentials, http: HttpClient) -> Self {
        Self { credentials, http }
    }

    pub fn from_config(config: &AlipayConfig, http: HttpClient) -> Result<Self, PayError> {
        let credentials = AlipayCredentials {
            app_id: config.app_id.clone(),
            app_private_key: RsaSigner::from_pem_file(&config.private_key_path)?,
            alipay_public_key: RsaVerifier::from_pem_file(&config.alipay_public_key_path)?,
            gateway_url: config.gateway_url.clone(),
        };
        Ok(Self::new(credentials, http))
    }

    // 组装公共参数并签名
    fn signed_params(
        &self,
        method: &str,
        biz_content: &Value,
        notify_url: Option<&str>,
        return_url: Option<&str>,
    ) -> Result<BTreeMap<String, String>, PayError> {
        let mut params = BTreeMap::new();
        params.insert("app_id".to_string(), self.credentials.app_id.clone());
        params.insert("method".to_string(), method.to_string());
        params.insert("format".to_string(), "JSON".to_string());
        params.insert("charset".to_string(), "utf-8".to_string());
        params.insert("sign_type".to_string(), "RSA2".to_string());
        params.insert("timestamp".to_string(), china_now().format(TIME_FORMAT).to_string());
        params.insert("version".to_string(), "1.0".to_string());
        params.insert("biz_content".to_string(), biz_content.to_string());
        if let Some(url) = notify_url.filter(|u| !u.is_empty()) {
            params.insert("notify_url".to_string(), url.to_string());
        }
        if let Some(url) = return_url.filter(|u| !u.is_empty()) {
            params.insert("return_url".to_string(), url.to_string());
        }

        let sign = self.credentials.app_private_key.sign_params(&params, &["sign"])?;
        params.insert("sign".to_string(), sign);
        Ok(params)
    }

    // 调用支付宝网关接口，返回 `{method}_response` 节点
    async fn execute(
        &self,
        method: &str,
        biz_content: Value,
        notify_url: Option<&str>,
        retry: bool,
    ) -> Result<AlipayResponse, PayError> {
        let params = self.signed_params(method, &biz_content, notify_url, None)?;
        let form = serde_urlencoded::to_string(&params)
            .map_err(|e| PayError::Internal(format!("failed to encode alipay params: {e}")))?;
        let body = RequestBody::Form(form);

        let resp = if retry {
            self.http.send_with_retry(Method::POST, &self.credentials.gateway_url, &[], Some(&body)).await?
        } else {
            self.http.send(Method::POST, &self.credentials.gateway_url, &[], Some(&body)).await?
        };
        if !resp.is_success() {
            return Err(PayError::Network(format!("alipay returned status {}", resp.status)));
        }

        let mut root: HashMap<String, Value> = resp.json()?;
        let node = format!("{}_response", method.replace('.', "_"));
        let value = root
            .remove(&node)
            .ok_or_else(|| PayError::InvalidResponse(format!("alipay response missing {node}")))?;
        let result: AlipayResponse = serde_json::from_value(value)
            .map_err(|e| PayError::InvalidResponse(format!("invalid alipay response: {e}")))?;

        if result.error_code().contains("invalid-signature") || result.error_code().contains("invalid-app-auth") {
            return Err(PayError::SignatureFailed(format!("alipay rejected request: {}", result.error_message())));
        }
        if result.code == "20000" {
            return Err(PayError::Network(format!("alipay service unavailable: {}", result.error_message())));
        }
        Ok(result)
    }

    fn page_form(&self, params: &BTreeMap<String, String>) -> String {
        let action = format!("{}?charset=utf-8", self.credentials.gateway_url);
        html::auto_submit_form("alipaysubmit", &action, params)
    }

    async fn create_trade(&self, req: &UnifiedPayRequest, mut biz: Value) -> Result<UnifiedPayResponse, PayError> {
        let buyer_id = req.payer_id().ok_or_else(|| PayError::missing_parameter("buyer_id"))?;
        biz["buyer_id"] = json!(buyer_id);

        let resp = self
            .execute("alipay.trade.create", biz, Some(&req.notify_url), false)
            .await?;
        if !resp.is_success() {
            let kind = map_sub_code(resp.error_code());
            warn!(out_trade_no = %req.out_trade_no, code = %resp.error_code(), "Alipay rejected trade create");
            return Ok(UnifiedPayResponse::rejected(ChannelType::Alipay, &req.out_trade_no, kind.code(), resp.error_message()));
        }

        let trade_no = resp
            .str_field("trade_no")
            .ok_or_else(|| PayError::InvalidResponse("alipay response missing trade_no".to_string()))?;

        let mut result = UnifiedPayResponse::success(ChannelType::Alipay, &req.out_trade_no);
        result.order_id = trade_no.to_string();
        result.pay_data = Some(json!({ "trade_no": trade_no }).to_string());
        Ok(result)
    }
}

/// 异步通知的交易状态：全额退款后交易关闭，通知里带 refund_fee / gmt_refund
pub fn map_notify_status(status: &str, refund_fee: Option<&str>, gmt_refund: Option<&str>) -> TradeStatus {
    let refunded = refund_fee.is_some_and(|fee| parse_amount(Some(fee)).is_some_and(|fee| fee > Decimal::ZERO))
        || gmt_refund.is_some_and(|t| !t.is_empty());
    match map_trade_status(status) {
        TradeStatus::Closed if refunded => TradeStatus::Refund,
        other => other,
    }
}

/// 支付宝交易状态映射
pub fn map_trade_status(status: &str) -> TradeStatus {
    match status {
        "TRADE_SUCCESS" | "TRADE_FINISHED" => TradeStatus::Success,
        "WAIT_BUYER_PAY" => TradeStatus::NotPay,
        "TRADE_CLOSED" => TradeStatus::Closed,
        other => {
            warn!(trade_status = %other, "Unknown alipay trade status, treated as NOTPAY");
            TradeStatus::NotPay
        }
    }
}

/// 支付宝业务错误码映射
pub fn map_sub_code(sub_code: &str) -> BusinessError {
    match sub_code {
        "ACQ.TRADE_NOT_EXIST" => BusinessError::OrderNotFound,
        "ACQ.TRADE_HAS_CLOSE" => BusinessError::OrderClosed,
        "ACQ.TRADE_HAS_SUCCESS" => BusinessError::OrderPaid,
        "ACQ.TRADE_HAS_FINISHED" | "ACQ.TRADE_NOT_ALLOW_REFUND" => BusinessError::RefundNotAllowed,
        "ACQ.BUYER_BALANCE_NOT_ENOUGH" | "ACQ.SELLER_BALANCE_NOT_ENOUGH" => BusinessError::InsufficientBalance,
        "ACQ.TRADE_EXPIRED" => BusinessError::OrderExpired,
        _ => BusinessError::Rejected(ChannelType::Alipay),
    }
}

fn china_now() -> DateTime<FixedOffset> {
    match FixedOffset::east_opt(CHINA_OFFSET_SECS) {
        Some(offset) => Utc::now().with_timezone(&offset),
        None => Utc::now().fixed_offset(),
    }
}

// 支付宝时间为北京时间 `yyyy-MM-dd HH:mm:ss`
fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value?, TIME_FORMAT).ok()?;
    let offset = FixedOffset::east_opt(CHINA_OFFSET_SECS)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

fn parse_amount(value: Option<&str>) -> Option<Decimal> {
    value.and_then(|v| v.parse().ok())
}

fn order_biz(order: OrderRef<'_>) -> Value {
    match order {
        OrderRef::OutTradeNo(no) => json!({ "out_trade_no": no }),
        OrderRef::OrderId(id) => json!({ "trade_no": id }),
    }
}

#[async_trait]
impl PaymentAdapter for AlipayAdapter {
    async fn pay(&self, req: &UnifiedPayRequest) -> Result<UnifiedPayResponse, PayError> {
        info!(out_trade_no = %req.out_trade_no, scene = %req.scene, "Creating alipay payment");

        let mut biz = json!({
            "out_trade_no": req.out_trade_no,
            "total_amount": money::format_major_units(req.total_amount),
            "subject": req.subject,
        });
        if let Some(attach) = req.attach.as_deref().filter(|a| !a.is_empty()) {
            biz["passback_params"] = json!(attach);
        }

        let (method, product_code) = match req.scene {
            PayScene::App => ("alipay.trade.app.pay", "QUICK_MSECURITY_PAY"),
            PayScene::H5 => ("alipay.trade.wap.pay", "QUICK_WAP_WAY"),
            PayScene::Pc | PayScene::Native => ("alipay.trade.page.pay", "FAST_INSTANT_TRADE_PAY"),
            PayScene::JsApi => return self.create_trade(req, biz).await,
        };
        biz["product_code"] = json!(product_code);
        if req.scene == PayScene::Native {
            biz["qr_pay_mode"] = json!("4");
        }

        let params = self.signed_params(method, &biz, Some(&req.notify_url), req.return_url.as_deref())?;
        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| PayError::Internal(format!("failed to encode alipay params: {e}")))?;

        let mut result = UnifiedPayResponse::success(ChannelType::Alipay, &req.out_trade_no);
        match req.scene {
            // 订单串直接交给客户端 SDK
            PayScene::App => result.pay_data = Some(query),
            PayScene::H5 => result.pay_url = Some(format!("{}?{query}", self.credentials.gateway_url)),
            _ => result.pay_data = Some(self.page_form(&params)),
        }

        info!(out_trade_no = %req.out_trade_no, method = %method, "Alipay payment created");
        Ok(result)
    }

    async fn query(&self, req: &QueryRequest) -> Result<QueryResponse, PayError> {
        let resp = self.execute("alipay.trade.query", order_biz(req.order_ref()?), None, true).await?;

        let fallback_no = req.out_trade_no.as_deref().unwrap_or_default();
        if !resp.is_success() {
            let kind = map_sub_code(resp.error_code());
            return Ok(QueryResponse::rejected(ChannelType::Alipay, fallback_no, kind.code(), resp.error_message()));
        }

        Ok(QueryResponse {
            code: ErrorCode::Success.as_i32(),
            message: "success".to_string(),
            order_id: resp.str_field("trade_no").unwrap_or_default().to_string(),
            out_trade_no: resp.str_field("out_trade_no").unwrap_or(fallback_no).to_string(),
            trade_status: map_trade_status(resp.str_field("trade_status").unwrap_or_default()),
            total_amount: parse_amount(resp.str_field("total_amount")),
            paid_at: parse_time(resp.str_field("send_pay_date")),
            channel: ChannelType::Alipay,
        })
    }

    async fn refund(&self, req: &RefundRequest) -> Result<RefundResponse, PayError> {
        info!(out_refund_no = %req.out_refund_no, "Creating alipay refund");

        let mut biz = order_biz(req.order_ref()?);
        biz["refund_amount"] = json!(money::format_major_units(req.refund_amount));
        // 同一 out_request_no 重复提交不会重复退款
        biz["out_request_no"] = json!(req.out_refund_no);
        if let Some(reason) = req.reason.as_deref().filter(|r| !r.is_empty()) {
            biz["refund_reason"] = json!(reason);
        }

        let resp = self.execute("alipay.trade.refund", biz, None, false).await?;
        if !resp.is_success() {
            let kind = map_sub_code(resp.error_code());
            warn!(out_refund_no = %req.out_refund_no, code = %resp.error_code(), "Alipay rejected refund");
            return Ok(RefundResponse::rejected(req, kind.code(), resp.error_message()));
        }

        if resp.str_field("fund_change") == Some("N") {
            info!(out_refund_no = %req.out_refund_no, "Alipay refund already processed");
        }

        Ok(RefundResponse {
            code: ErrorCode::Success.as_i32(),
            message: "success".to_string(),
            refund_id: resp.str_field("trade_no").unwrap_or_default().to_string(),
            out_refund_no: req.out_refund_no.clone(),
            refund_amount: parse_amount(resp.str_field("refund_fee")).unwrap_or(req.refund_amount),
            status: RefundStatus::Success,
            channel: ChannelType::Alipay,
        })
    }

    async fn close(&self, req: &CloseRequest) -> Result<(), PayError> {
        let resp = self.execute("alipay.trade.close", order_biz(req.order_ref()?), None, false).await?;
        if resp.is_success() {
            return Ok(());
        }

        let kind = map_sub_code(resp.error_code());
        if kind == BusinessError::OrderClosed {
            info!(out_trade_no = ?req.out_trade_no, "Alipay order already closed");
            return Ok(());
        }

        // 交易状态不允许关闭时，查询确认是否已经关闭
        if resp.error_code() == "ACQ.TRADE_STATUS_ERROR" {
            let query = QueryRequest {
                channel: ChannelType::Alipay,
                out_trade_no: req.out_trade_no.clone(),
                order_id: req.order_id.clone(),
                txn_time: None,
            };
            let current = self.query(&query).await?;
            match current.trade_status {
                TradeStatus::Closed if current.is_success() => {
                    info!(out_trade_no = ?req.out_trade_no, "Alipay order confirmed closed");
                    return Ok(());
                }
                TradeStatus::Success | TradeStatus::Refund if current.is_success() => {
                    return Err(PayError::business(BusinessError::OrderPaid, resp.error_code(), resp.error_message()));
                }
                status => {
                    warn!(out_trade_no = ?req.out_trade_no, status = %status, "Alipay order cannot be closed");
                }
            }
        }
        Err(PayError::business(kind, resp.error_code(), resp.error_message()))
    }

    async fn handle_notify(&self, payload: &NotifyPayload) -> Result<NotifyResult, PayError> {
        let params: HashMap<String, String> = serde_urlencoded::from_bytes(&payload.body)
            .map_err(|e| PayError::InvalidNotify(format!("invalid alipay notify body: {e}")))?;

        let signature = params
            .get("sign")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PayError::InvalidSignature("alipay notify missing sign".to_string()))?;
        if !self
            .credentials
            .alipay_public_key
            .verify_params(&params, &["sign", "sign_type"], signature)
        {
            error!(notify_id = ?params.get("notify_id"), "Alipay notify signature verification failed");
            return Err(PayError::InvalidSignature("alipay notify signature mismatch".to_string()));
        }

        if params.get("app_id").map(String::as_str) != Some(self.credentials.app_id.as_str()) {
            return Err(PayError::InvalidNotify("alipay notify app_id mismatch".to_string()));
        }

        let field = |name: &str| params.get(name).map(String::as_str);
        let out_trade_no = field("out_trade_no")
            .ok_or_else(|| PayError::InvalidNotify("alipay notify missing out_trade_no".to_string()))?;
        let total_amount = parse_amount(field("total_amount"))
            .ok_or_else(|| PayError::InvalidNotify("alipay notify missing total_amount".to_string()))?;
        let trade_status = map_notify_status(
            field("trade_status").unwrap_or_default(),
            field("refund_fee"),
            field("gmt_refund"),
        );

        info!(out_trade_no = %out_trade_no, trade_status = ?field("trade_status"), status = %trade_status, "Alipay notify verified");

        Ok(NotifyResult {
            success: trade_status.is_success(),
            out_trade_no: out_trade_no.to_string(),
            total_amount,
            trade_status,
            order_id: field("trade_no").unwrap_or_default().to_string(),
            channel: ChannelType::Alipay,
            paid_at: parse_time(field("gmt_payment")),
        })
    }

    fn channel(&self) -> ChannelType {
        ChannelType::Alipay
    }
}
