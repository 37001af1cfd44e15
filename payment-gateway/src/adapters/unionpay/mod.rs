//! 银联全渠道网关适配器（5.1.0）
//!
//! 请求与应答都是表单报文，签名字段为 `signature`，使用通用签名工具签名与验签。

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use lru::LruCache;
use reqwest::Method;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::adapters::PaymentAdapter;
use crate::config::UnionPayConfig;
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

const SIGN_FIELD: &str = "signature";
const TIME_FORMAT: &str = "%Y%m%d%H%M%S";
const CHINA_OFFSET_SECS: i32 = 8 * 3600;
const TXN_TYPE_PAY: &str = "01";
const TXN_TYPE_REFUND: &str = "04";
const TXN_TIME_CAPACITY: usize = 10_000;
const TXN_TIME_TTL: Duration = Duration::from_secs(24 * 3600);

/// 银联商户凭证
#[derive(Debug, Clone)]
pub struct UnionPayCredentials {
    pub mer_id: String,
    pub cert_id: String,         // 签名证书序列号
    pub signer: RsaSigner,
    pub verifier: RsaVerifier,
    pub gateway_url: String,     // 如 https://gateway.95516.com/gateway
    pub back_url: String,        // 退款等后台通知地址
}

/// 下单时记录的 txnTime
///
/// 银联按 orderId + txnTime 定位原交易。缓存只是本进程的便利：容量满时淘汰最久未用的订单，
/// 超过 TTL 的条目读取时丢弃，订单进入终态后移除。重启或跨实例时由调用方传入 txn_time 或 order_id。
#[derive(Debug)]
pub struct TxnTimeCache {
    entries: Mutex<LruCache<String, (String, Instant)>>,
    ttl: Duration,
}

impl TxnTimeCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub async fn insert(&self, out_trade_no: &str, txn_time: String) {
        self.entries
            .lock()
            .await
            .put(out_trade_no.to_string(), (txn_time, Instant::now()));
    }

    pub async fn get(&self, out_trade_no: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        let cached = entries
            .get(out_trade_no)
            .map(|(txn_time, at)| (txn_time.clone(), at.elapsed()));

        match cached {
            Some((txn_time, age)) if age < self.ttl => Some(txn_time),
            Some(_) => {
                entries.pop(out_trade_no);
                None
            }
            None => None,
        }
    }

    pub async fn remove(&self, out_trade_no: &str) {
        if self.entries.lock().await.pop(out_trade_no).is_some() {
            debug!(out_trade_no = %out_trade_no, "UnionPay txnTime evicted");
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for TxnTimeCache {
    fn default() -> Self {
        Self::new(TXN_TIME_CAPACITY, TXN_TIME_TTL)
    }
}

#[derive(Debug)]
pub struct UnionPayAdapter {
    credentials: UnionPayCredentials,
    http: HttpClient,
    txn_times: TxnTimeCache,
}

enum QueryOutcome {
    Found(QueryResponse),
    Rejected { kind: BusinessError, code: String, message: String },
}

// 原交易定位方式
enum Locator {
    Order { order_id: String, txn_time: String },
    QueryId(String),
}

impl UnionPayAdapter {
    pub fn new(credentials: UnionPayCredentials, http: HttpClient) -> Self {
        Self::with_txn_time_cache(credentials, http, TxnTimeCache::default())
    }

    pub fn with_txn_time_cache(credentials: UnionPayCredentials, http: HttpClient, txn_times: TxnTimeCache) -> Self {
        Self {
            credentials,
            http,
            txn_times,
        }
    }

    pub fn txn_times(&self) -> &TxnTimeCache {
        &self.txn_times
    }

    pub fn from_config(config: &UnionPayConfig, http: HttpClient) -> Result<Self, PayError> {
        let signer = match config.private_key_password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => {
                let pem = std::fs::read(&config.private_key_path).map_err(|e| {
                    PayError::Config(format!("failed to read key file {}: {e}", config.private_key_path))
                })?;
                RsaSigner::from_pem_with_passphrase(&pem, password)?
            }
            None => RsaSigner::from_pem_file(&config.private_key_path)?,
        };

        let credentials = UnionPayCredentials {
            mer_id: config.mer_id.clone(),
            cert_id: config.cert_id.clone(),
            signer,
            verifier: RsaVerifier::from_pem_file(&config.verify_cert_path)?,
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
            back_url: config.back_url.clone(),
        };
        Ok(Self::new(credentials, http))
    }

    fn base_params(&self, txn_type: &str, txn_sub_type: &str, biz_type: &str) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("version".to_string(), "5.1.0".to_string());
        params.insert("encoding".to_string(), "UTF-8".to_string());
        params.insert("signMethod".to_string(), "01".to_string());
        params.insert("certId".to_string(), self.credentials.cert_id.clone());
        params.insert("merId".to_string(), self.credentials.mer_id.clone());
        params.insert("accessType".to_string(), "0".to_string());
        params.insert("txnType".to_string(), txn_type.to_string());
        params.insert("txnSubType".to_string(), txn_sub_type.to_string());
        params.insert("bizType".to_string(), biz_type.to_string());
        params
    }

    fn sign(&self, params: &mut BTreeMap<String, String>) -> Result<(), PayError> {
        let signature = self.credentials.signer.sign_params(&*params, &[SIGN_FIELD])?;
        params.insert(SIGN_FIELD.to_string(), signature);
        Ok(())
    }

    fn verify(&self, params: &HashMap<String, String>) -> bool {
        params
            .get(SIGN_FIELD)
            .is_some_and(|sig| self.credentials.verifier.verify_params(params, &[SIGN_FIELD], sig))
    }

    // 后台交易：表单提交并校验应答签名
    async fn back_request(
        &self,
        endpoint: &str,
        mut params: BTreeMap<String, String>,
        retry: bool,
    ) -> Result<HashMap<String, String>, PayError> {
        self.sign(&mut params)?;
        let form = serde_urlencoded::to_string(&params)
            .map_err(|e| PayError::Internal(format!("failed to encode unionpay params: {e}")))?;
        let body = RequestBody::Form(form);
        let url = format!("{}/api/{endpoint}", self.credentials.gateway_url);

        let resp = if retry {
            self.http.send_with_retry(Method::POST, &url, &[], Some(&body)).await?
        } else {
            self.http.send(Method::POST, &url, &[], Some(&body)).await?
        };
        if !resp.is_success() {
            return Err(PayError::Network(format!("unionpay returned status {}", resp.status)));
        }

        let result = resp.form()?;
        if !self.verify(&result) {
            error!(endpoint = %endpoint, resp_code = ?result.get("respCode"), "UnionPay response signature verification failed");
            return Err(PayError::InvalidSignature("unionpay response signature mismatch".to_string()));
        }
        Ok(result)
    }

    fn front_form(&self, params: &BTreeMap<String, String>) -> String {
        let action = format!("{}/api/frontTransReq.do", self.credentials.gateway_url);
        html::auto_submit_form("pay_form", &action, params)
    }

    // 商户订单号需要配合 txnTime（调用方传入优先，其次本地缓存），否则退回渠道 queryId
    async fn locate(&self, req: &QueryRequest) -> Result<Locator, PayError> {
        if let OrderRef::OutTradeNo(out_trade_no) = req.order_ref()? {
            let txn_time = match req.txn_time.as_deref().filter(|t| !t.trim().is_empty()) {
                Some(txn_time) => Some(check_txn_time(txn_time)?),
                None => self.txn_times.get(out_trade_no).await,
            };
            if let Some(txn_time) = txn_time {
                return Ok(Locator::Order { order_id: out_trade_no.to_string(), txn_time });
            }
        }

        match req.order_id.as_deref().filter(|id| !id.trim().is_empty()) {
            Some(query_id) => Ok(Locator::QueryId(query_id.to_string())),
            None => Err(PayError::missing_parameter("txn_time or order_id")),
        }
    }

    async fn query_order(&self, req: &QueryRequest) -> Result<QueryOutcome, PayError> {
        let mut params = self.base_params("00", "00", "000000");
        match self.locate(req).await? {
            Locator::QueryId(query_id) => {
                params.insert("queryId".to_string(), query_id);
            }
            Locator::Order { order_id, txn_time } => {
                params.insert("orderId".to_string(), order_id);
                params.insert("txnTime".to_string(), txn_time);
            }
        }

        let result = self.back_request("queryTrans.do", params, true).await?;
        let field = |name: &str| result.get(name).map(String::as_str).unwrap_or_default();

        let resp_code = field("respCode");
        if resp_code != "00" {
            return Ok(QueryOutcome::Rejected {
                kind: map_resp_code(resp_code),
                code: resp_code.to_string(),
                message: field("respMsg").to_string(),
            });
        }

        let resp = QueryResponse {
            code: ErrorCode::Success.as_i32(),
            message: "success".to_string(),
            order_id: field("queryId").to_string(),
            out_trade_no: result
                .get("orderId")
                .cloned()
                .or_else(|| req.out_trade_no.clone())
                .unwrap_or_default(),
            trade_status: map_orig_resp_code(field("origRespCode")),
            total_amount: field("txnAmt").parse().ok().map(money::from_minor_units),
            paid_at: parse_time(field("txnTime")),
            channel: ChannelType::UnionPay,
        };

        if resp.trade_status.is_terminal() {
            self.txn_times.remove(&resp.out_trade_no).await;
        }
        Ok(QueryOutcome::Found(resp))
    }

    fn payment_notify(params: &HashMap<String, String>) -> Result<NotifyResult, PayError> {
        let field = |name: &str| params.get(name).map(String::as_str).unwrap_or_default();
        let out_trade_no = field("orderId");
        if out_trade_no.is_empty() {
            return Err(PayError::InvalidNotify("unionpay notify missing orderId".to_string()));
        }

        let success = field("respCode") == "00";
        let trade_status = if success { TradeStatus::Success } else { TradeStatus::PayError };
        info!(out_trade_no = %out_trade_no, resp_code = %field("respCode"), "UnionPay payment notify verified");

        Ok(NotifyResult {
            success,
            out_trade_no: out_trade_no.to_string(),
            total_amount: notify_amount(params)?,
            trade_status,
            order_id: field("queryId").to_string(),
            channel: ChannelType::UnionPay,
            paid_at: parse_time(field("txnTime")),
        })
    }

    // 退款通知的 orderId 是退款单号，原订单号在下单退款时写入的 reqReserved 中
    fn refund_notify(params: &HashMap<String, String>) -> Result<NotifyResult, PayError> {
        let field = |name: &str| params.get(name).map(String::as_str).unwrap_or_default();
        let out_trade_no = field("reqReserved");
        if out_trade_no.is_empty() {
            return Err(PayError::InvalidNotify("unionpay refund notify missing original order".to_string()));
        }

        let refunded = field("respCode") == "00";
        if !refunded {
            warn!(
                out_trade_no = %out_trade_no,
                out_refund_no = %field("orderId"),
                resp_code = %field("respCode"),
                "UnionPay refund failed, order stays paid"
            );
        } else {
            info!(out_trade_no = %out_trade_no, out_refund_no = %field("orderId"), "UnionPay refund notify verified");
        }

        // 退款失败时原订单仍是支付成功
        let trade_status = if refunded { TradeStatus::Refund } else { TradeStatus::Success };
        Ok(NotifyResult {
            success: trade_status.is_success(),
            out_trade_no: out_trade_no.to_string(),
            total_amount: notify_amount(params)?,
            trade_status,
            order_id: field("origQryId").to_string(),
            channel: ChannelType::UnionPay,
            paid_at: None,
        })
    }
}

fn notify_amount(params: &HashMap<String, String>) -> Result<Decimal, PayError> {
    let fen: i64 = params
        .get("txnAmt")
        .and_then(|amt| amt.parse().ok())
        .ok_or_else(|| PayError::InvalidNotify("unionpay notify invalid txnAmt".to_string()))?;
    Ok(money::from_minor_units(fen))
}

fn check_txn_time(value: &str) -> Result<String, PayError> {
    match parse_time(value) {
        Some(_) => Ok(value.to_string()),
        None => Err(PayError::invalid_parameter("txn_time must be yyyyMMddHHmmss")),
    }
}

/// 原交易应答码映射
pub fn map_orig_resp_code(code: &str) -> TradeStatus {
    match code {
        "00" | "A6" => TradeStatus::Success,
        "03" | "04" | "05" => TradeStatus::UserPaying,
        "" => {
            warn!("UnionPay query returned empty origRespCode, treated as NOTPAY");
            TradeStatus::NotPay
        }
        c if c.chars().all(|ch| ch.is_ascii_alphanumeric()) => TradeStatus::PayError,
        other => {
            warn!(orig_resp_code = %other, "Unknown unionpay origRespCode, treated as NOTPAY");
            TradeStatus::NotPay
        }
    }
}

/// 应答码映射
pub fn map_resp_code(code: &str) -> BusinessError {
    match code {
        "34" => BusinessError::OrderNotFound,
        "35" => BusinessError::OrderExpired,
        "12" => BusinessError::OrderPaid,
        "51" | "61" => BusinessError::InsufficientBalance,
        "59" | "60" => BusinessError::RefundNotAllowed,
        _ => BusinessError::Rejected(ChannelType::UnionPay),
    }
}

fn china_now() -> String {
    match FixedOffset::east_opt(CHINA_OFFSET_SECS) {
        Some(offset) => Utc::now().with_timezone(&offset).format(TIME_FORMAT).to_string(),
        None => Utc::now().format(TIME_FORMAT).to_string(),
    }
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, TIME_FORMAT).ok()?;
    FixedOffset::east_opt(CHINA_OFFSET_SECS)?
        .from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

#[async_trait]
impl PaymentAdapter for UnionPayAdapter {
    async fn pay(&self, req: &UnifiedPayRequest) -> Result<UnifiedPayResponse, PayError> {
        info!(out_trade_no = %req.out_trade_no, scene = %req.scene, "Creating unionpay payment");

        let channel_type = match req.scene {
            PayScene::App | PayScene::H5 => "08",
            PayScene::Pc => "07",
            PayScene::JsApi | PayScene::Native => {
                return Err(PayError::UnsupportedScene { channel: ChannelType::UnionPay, scene: req.scene });
            }
        };

        let txn_time = china_now();
        let mut params = self.base_params(TXN_TYPE_PAY, "01", "000201");
        params.insert("channelType".to_string(), channel_type.to_string());
        params.insert("orderId".to_string(), req.out_trade_no.clone());
        params.insert("txnTime".to_string(), txn_time.clone());
        params.insert("txnAmt".to_string(), money::to_minor_units(req.total_amount)?.to_string());
        params.insert("currencyCode".to_string(), "156".to_string());
        params.insert("orderDesc".to_string(), req.subject.clone());
        params.insert("backUrl".to_string(), req.notify_url.clone());
        if let Some(attach) = req.attach.as_deref().filter(|a| !a.is_empty()) {
            params.insert("reqReserved".to_string(), attach.to_string());
        }

        self.txn_times.insert(&req.out_trade_no, txn_time).await;

        let mut result = UnifiedPayResponse::success(ChannelType::UnionPay, &req.out_trade_no);

        if req.scene != PayScene::App {
            if let Some(url) = req.return_url.as_deref().filter(|u| !u.is_empty()) {
                params.insert("frontUrl".to_string(), url.to_string());
            }
            self.sign(&mut params)?;
            result.pay_data = Some(self.front_form(&params));
            return Ok(result);
        }

        let resp = self.back_request("appTransReq.do", params, false).await?;
        let resp_code = resp.get("respCode").map(String::as_str).unwrap_or_default();
        if resp_code != "00" {
            let message = resp.get("respMsg").cloned().unwrap_or_default();
            warn!(out_trade_no = %req.out_trade_no, resp_code = %resp_code, "UnionPay rejected payment");
            return Ok(UnifiedPayResponse::rejected(
                ChannelType::UnionPay,
                &req.out_trade_no,
                map_resp_code(resp_code).code(),
                message,
            ));
        }

        let tn = resp
            .get("tn")
            .filter(|tn| !tn.is_empty())
            .ok_or_else(|| PayError::InvalidResponse("unionpay response missing tn".to_string()))?;
        result.pay_data = Some(tn.clone());
        info!(out_trade_no = %req.out_trade_no, "UnionPay payment created");
        Ok(result)
    }

    async fn query(&self, req: &QueryRequest) -> Result<QueryResponse, PayError> {
        match self.query_order(req).await? {
            QueryOutcome::Found(resp) => Ok(resp),
            QueryOutcome::Rejected { kind, message, .. } => Ok(QueryResponse::rejected(
                ChannelType::UnionPay,
                req.out_trade_no.as_deref().unwrap_or_default(),
                kind.code(),
                message,
            )),
        }
    }

    async fn refund(&self, req: &RefundRequest) -> Result<RefundResponse, PayError> {
        info!(out_refund_no = %req.out_refund_no, "Creating unionpay refund");

        // 银联退款必须携带原交易 queryId
        let orig_qry_id = req
            .order_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PayError::missing_parameter("order_id"))?;

        // 退款通知只回传 reqReserved，用它关联原订单
        let out_trade_no = req
            .out_trade_no
            .as_deref()
            .filter(|no| !no.is_empty())
            .ok_or_else(|| PayError::missing_parameter("out_trade_no"))?;

        let mut params = self.base_params(TXN_TYPE_REFUND, "00", "000201");
        params.insert("channelType".to_string(), "07".to_string());
        params.insert("orderId".to_string(), req.out_refund_no.clone());
        params.insert("origQryId".to_string(), orig_qry_id.to_string());
        params.insert("reqReserved".to_string(), out_trade_no.to_string());
        params.insert("txnTime".to_string(), china_now());
        params.insert("txnAmt".to_string(), money::to_minor_units(req.refund_amount)?.to_string());
        params.insert("backUrl".to_string(), self.credentials.back_url.clone());

        let resp = self.back_request("backTransReq.do", params, false).await?;
        let resp_code = resp.get("respCode").map(String::as_str).unwrap_or_default();
        if resp_code != "00" {
            let message = resp.get("respMsg").cloned().unwrap_or_default();
            warn!(out_refund_no = %req.out_refund_no, resp_code = %resp_code, "UnionPay rejected refund");
            return Ok(RefundResponse::rejected(req, map_resp_code(resp_code).code(), message));
        }

        // 受理成功，最终结果以异步通知为准
        Ok(RefundResponse {
            code: ErrorCode::Success.as_i32(),
            message: "success".to_string(),
            refund_id: resp.get("queryId").cloned().unwrap_or_default(),
            out_refund_no: req.out_refund_no.clone(),
            refund_amount: req.refund_amount,
            status: RefundStatus::Processing,
            channel: ChannelType::UnionPay,
        })
    }

    async fn close(&self, req: &CloseRequest) -> Result<(), PayError> {
        // 银联未支付订单由渠道超时关闭，这里只确认订单没有支付成功
        let query = QueryRequest {
            channel: ChannelType::UnionPay,
            out_trade_no: req.out_trade_no.clone(),
            order_id: req.order_id.clone(),
            txn_time: req.txn_time.clone(),
        };

        match self.query_order(&query).await? {
            QueryOutcome::Found(resp) => match resp.trade_status {
                TradeStatus::Success | TradeStatus::Refund => Err(PayError::business(
                    BusinessError::OrderPaid,
                    "00",
                    "order already paid",
                )),
                TradeStatus::UserPaying => Err(PayError::business(
                    BusinessError::Rejected(ChannelType::UnionPay),
                    "03",
                    "order is being paid",
                )),
                status => {
                    info!(out_trade_no = ?req.out_trade_no, status = %status, "UnionPay order treated as closed");
                    self.txn_times.remove(&resp.out_trade_no).await;
                    Ok(())
                }
            },
            QueryOutcome::Rejected { kind, code, message } => Err(PayError::business(kind, code, message)),
        }
    }

    async fn handle_notify(&self, payload: &NotifyPayload) -> Result<NotifyResult, PayError> {
        let params: HashMap<String, String> = serde_urlencoded::from_bytes(&payload.body)
            .map_err(|e| PayError::InvalidNotify(format!("invalid unionpay notify body: {e}")))?;

        if !self.verify(&params) {
            error!(order_id = ?params.get("orderId"), "UnionPay notify signature verification failed");
            return Err(PayError::InvalidSignature("unionpay notify signature mismatch".to_string()));
        }

        if params.get("merId").map(String::as_str) != Some(self.credentials.mer_id.as_str()) {
            return Err(PayError::InvalidNotify("unionpay notify merId mismatch".to_string()));
        }

        match params.get("txnType").map(String::as_str) {
            Some(TXN_TYPE_PAY) => {
                let result = Self::payment_notify(&params)?;
                self.txn_times.remove(&result.out_trade_no).await;
                Ok(result)
            }
            Some(TXN_TYPE_REFUND) => Self::refund_notify(&params),
            other => {
                warn!(txn_type = ?other, order_id = ?params.get("orderId"), "Unexpected unionpay notify txnType");
                Err(PayError::InvalidNotify(format!("unsupported unionpay txnType: {}", other.unwrap_or_default())))
            }
        }
    }

    fn channel(&self) -> ChannelType {
        ChannelType::UnionPay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("00", TradeStatus::Success)]
    #[case("03", TradeStatus::UserPaying)]
    #[case("04", TradeStatus::UserPaying)]
    #[case("05", TradeStatus::UserPaying)]
    #[case("14", TradeStatus::PayError)]
    #[case("", TradeStatus::NotPay)]
    #[case("??", TradeStatus::NotPay)]
    fn test_map_orig_resp_code(#[case] input: &str, #[case] expected: TradeStatus) {
        assert_eq!(map_orig_resp_code(input), expected);
    }

    #[rstest]
    #[case("34", ErrorCode::OrderNotFound)]
    #[case("12", ErrorCode::OrderPaid)]
    #[case("99", ErrorCode::UnionPayError)]
    fn test_map_resp_code(#[case] input: &str, #[case] expected: ErrorCode) {
        assert_eq!(map_resp_code(input).code(), expected);
    }

    #[test]
    fn test_parse_time() {
        let t = parse_time("20240501100000").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-05-01T02:00:00+00:00");
        assert_eq!(china_now().len(), 14);
    }

    #[test]
    fn test_check_txn_time() {
        assert_eq!(check_txn_time("20240601100000").unwrap(), "20240601100000");
        assert_eq!(check_txn_time("2024-06-01").unwrap_err().code(), ErrorCode::InvalidParameter);
    }

    #[tokio::test]
    async fn test_txn_time_cache_is_bounded() {
        let cache = TxnTimeCache::new(2, Duration::from_secs(60));
        cache.insert("T1", "20240601100000".to_string()).await;
        cache.insert("T2", "20240601100001".to_string()).await;
        cache.insert("T3", "20240601100002".to_string()).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("T1").await.is_none());
        assert_eq!(cache.get("T3").await.as_deref(), Some("20240601100002"));

        cache.remove("T3").await;
        assert!(cache.get("T3").await.is_none());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_txn_time_cache_expires_entries() {
        let cache = TxnTimeCache::new(10, Duration::ZERO);
        cache.insert("T1", "20240601100000".to_string()).await;

        assert!(cache.get("T1").await.is_none());
        assert_eq!(cache.len().await, 0);
    }
}
