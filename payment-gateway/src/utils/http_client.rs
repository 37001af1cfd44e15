use reqwest::{Client, Method, RequestBuilder, header};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::utils::error::PayError;

// HTTP客户端配置
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            retry_count: 2,
            retry_delay: Duration::from_millis(500),
            user_agent: format!("UnipayGateway/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// HTTP客户端日志记录器
#[derive(Debug, Clone)]
pub struct RequestLogger {
    enabled: bool,
    mask_fields: Vec<String>,
}

impl RequestLogger {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            mask_fields: vec![
                "sign".to_string(),
                "signature".to_string(),
                "paysign".to_string(),
                "ciphertext".to_string(),
                "accno".to_string(),
                "openid".to_string(),
                "buyer_id".to_string(),
            ],
        }
    }

    // 遮蔽敏感字段
    fn mask_sensitive_data(&self, data: &str) -> String {
        // 尝试解析为JSON
        if let Ok(mut json_value) = serde_json::from_str::<Value>(data) {
            self.mask_json_value(&mut json_value);
            return json_value.to_string();
        }

        // 表单数据: field=value
        let mut result = data.to_string();
        for field in &self.mask_fields {
            let pattern = format!(r"(?i)(^|&)({})=([^&]*)", regex::escape(field));
            if let Ok(re) = regex::Regex::new(&pattern) {
                result = re.replace_all(&result, "${1}${2}=*****").to_string();
            }
        }
        result
    }

    // 递归遮蔽JSON中的敏感字段
    fn mask_json_value(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let lower = key.to_lowercase();
                    if self.mask_fields.iter().any(|field| lower == *field) && (val.is_string() || val.is_number()) {
                        *val = Value::String("*****".to_string());
                    } else {
                        self.mask_json_value(val);
                    }
                }
            }
            Value::Array(array) => {
                for val in array.iter_mut() {
                    self.mask_json_value(val);
                }
            }
            _ => {}
        }
    }
}

/// 已序列化的请求体，保留原文用于签名和日志
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(String),
    Form(String),
}

impl RequestBody {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Json(s) | Self::Form(s) => s,
        }
    }
}

/// 渠道响应，body 保留原文用于验签
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, PayError> {
        serde_json::from_str(&self.body)
            .map_err(|e| PayError::InvalidResponse(format!("failed to parse json response: {e}")))
    }

    pub fn form(&self) -> Result<HashMap<String, String>, PayError> {
        serde_urlencoded::from_str(&self.body)
            .map_err(|e| PayError::InvalidResponse(format!("failed to parse form response: {e}")))
    }
}

// HTTP客户端
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    logger: RequestLogger,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, PayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| PayError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            logger: RequestLogger::new(true),
        })
    }

    /// 只发送一次，用于下单、退款、关单等非幂等请求
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, String)],
        body: Option<&RequestBody>,
    ) -> Result<HttpResponse, PayError> {
        self.execute(method, url, headers, body, 0).await
    }

    /// 网络错误、5xx 和 429 时按配置重试，只用于查询类幂等请求
    pub async fn send_with_retry(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, String)],
        body: Option<&RequestBody>,
    ) -> Result<HttpResponse, PayError> {
        self.execute(method, url, headers, body, self.config.retry_count).await
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, String)],
        body: Option<&RequestBody>,
        max_retries: u32,
    ) -> Result<HttpResponse, PayError> {
        let request_id = Uuid::new_v4().to_string();

        if self.logger.enabled {
            let masked = body
                .map(|b| self.logger.mask_sensitive_data(b.as_str()))
                .unwrap_or_else(|| "<<no body>>".to_string());
            debug!(request_id = %request_id, method = %method, url = %url, body = %masked, "HTTP request");
        }

        let mut retry_count = 0;
        loop {
            let request = self.build(method.clone(), url, headers, body);

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let should_retry = status.is_server_error() || status.as_u16() == 429;

                    if should_retry && retry_count < max_retries {
                        warn!(
                            request_id = %request_id,
                            retry = retry_count + 1,
                            max_retries = max_retries,
                            status = %status.as_u16(),
                            "Retrying request due to server error"
                        );
                        retry_count += 1;
                        sleep(self.config.retry_delay).await;
                        continue;
                    }

                    let text = response.text().await?;
                    if self.logger.enabled {
                        debug!(
                            request_id = %request_id,
                            status = %status.as_u16(),
                            response = %self.logger.mask_sensitive_data(&text),
                            "HTTP response"
                        );
                    }
                    return Ok(HttpResponse { status: status.as_u16(), body: text });
                }
                Err(e) => {
                    if retry_count >= max_retries {
                        error!(request_id = %request_id, url = %url, error = %e, "HTTP request failed");
                        return Err(e.into());
                    }

                    warn!(
                        request_id = %request_id,
                        retry = retry_count + 1,
                        max_retries = max_retries,
                        error = %e,
                        "Retrying request due to network error"
                    );
                    retry_count += 1;
                    sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    fn build(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, String)],
        body: Option<&RequestBody>,
    ) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json");

        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }

        match body {
            Some(RequestBody::Json(s)) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(s.clone()),
            Some(RequestBody::Form(s)) => builder
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded;charset=utf-8")
                .body(s.clone()),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(retry_count: u32) -> HttpClient {
        HttpClient::new(HttpClientConfig {
            retry_count,
            retry_delay: Duration::from_millis(10),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_mask_sensitive_data() {
        let logger = RequestLogger::new(true);

        let masked = logger.mask_sensitive_data(r#"{"appid":"wx1","payer":{"openid":"o-123"},"sign":"abc"}"#);
        assert!(masked.contains("wx1"));
        assert!(!masked.contains("o-123"));
        assert!(!masked.contains("abc"));

        let masked = logger.mask_sensitive_data("merId=777&signature=AbC%2B&txnAmt=1");
        assert_eq!(masked, "merId=777&signature=*****&txnAmt=1");
    }

    #[tokio::test]
    async fn test_send_does_not_retry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/pay");
                then.status(503);
            })
            .await;

        let resp = client(3)
            .send(Method::POST, &server.url("/pay"), &[], Some(&RequestBody::Json("{}".into())))
            .await
            .unwrap();
        assert_eq!(resp.status, 503);
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_send_with_retry_retries_server_errors() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/query");
                then.status(500).body("busy");
            })
            .await;

        let resp = client(2)
            .send_with_retry(Method::GET, &server.url("/query"), &[], None)
            .await
            .unwrap();
        assert_eq!(resp.status, 500);
        // 首次请求 + 2 次重试
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn test_response_parsing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/json");
                then.status(200).json_body(serde_json::json!({"trade_state": "SUCCESS"}));
            })
            .await;

        let resp = client(0)
            .send(Method::GET, &server.url("/json"), &[("X-Test", "1".to_string())], None)
            .await
            .unwrap();
        assert!(resp.is_success());
        let value: Value = resp.json().unwrap();
        assert_eq!(value["trade_state"], "SUCCESS");
        assert!(resp.json::<Vec<String>>().is_err());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let err = client(0)
            .send(Method::GET, "http://127.0.0.1:1/unreachable", &[], None)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
