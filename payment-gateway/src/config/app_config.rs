use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use config::{Config, Environment, File};
use tracing::info;

use crate::utils::error::PayError;
use crate::utils::http_client::HttpClientConfig;

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    pub request_timeout: u64, // 秒
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
    pub file_path: Option<String>,
}

/// 渠道出站 HTTP 调用配置
#[derive(Clone, Debug, Deserialize)]
pub struct HttpConfig {
    pub timeout: u64,         // 秒
    pub connect_timeout: u64, // 秒
    pub query_retries: u32,
    pub retry_delay_ms: u64,
}

impl HttpConfig {
    pub fn client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.timeout),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            retry_count: self.query_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct WechatConfig {
    pub enabled: bool,
    pub app_id: String,
    pub mch_id: String,
    pub serial_no: String,
    pub api_v3_key: String,
    pub private_key_path: String,
    pub platform_cert_path: String,
    pub base_url: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AlipayConfig {
    pub enabled: bool,
    pub app_id: String,
    pub private_key_path: String,
    pub alipay_public_key_path: String,
    pub gateway_url: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct UnionPayConfig {
    pub enabled: bool,
    pub mer_id: String,
    pub cert_id: String,
    pub private_key_path: String,
    pub private_key_password: Option<String>,
    pub verify_cert_path: String,
    pub gateway_url: String,
    pub back_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub wechat: WechatConfig,
    #[serde(default)]
    pub alipay: AlipayConfig,
    #[serde(default)]
    pub unionpay: UnionPayConfig,
    pub environment: String,
    pub service_name: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, PayError> {
        let config_path = dotenvy::var("CONFIG_PATH").unwrap_or_else(|_| {
            format!("{}/config/application.toml", env!("CARGO_MANIFEST_DIR"))
        });

        info!("Loading configuration from {}", &config_path);
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &str) -> Result<Self, PayError> {
        let builder = Config::builder()
            .add_source(File::from(Path::new(config_path)))
            .add_source(Environment::with_prefix("APP").separator("__"));

        let config = builder.build()?;
        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// 已启用渠道的凭证必须完整
    pub fn validate(&self) -> Result<(), PayError> {
        if self.server.request_timeout == 0 {
            return Err(PayError::Config("server.request_timeout must be positive".to_string()));
        }

        if self.wechat.enabled {
            let w = &self.wechat;
            require("wechat", &[
                ("app_id", &w.app_id),
                ("mch_id", &w.mch_id),
                ("serial_no", &w.serial_no),
                ("api_v3_key", &w.api_v3_key),
                ("private_key_path", &w.private_key_path),
                ("platform_cert_path", &w.platform_cert_path),
                ("base_url", &w.base_url),
            ])?;
            if w.api_v3_key.len() != 32 {
                return Err(PayError::Config("wechat.api_v3_key must be 32 bytes".to_string()));
            }
        }

        if self.alipay.enabled {
            let a = &self.alipay;
            require("alipay", &[
                ("app_id", &a.app_id),
                ("private_key_path", &a.private_key_path),
                ("alipay_public_key_path", &a.alipay_public_key_path),
                ("gateway_url", &a.gateway_url),
            ])?;
        }

        if self.unionpay.enabled {
            let u = &self.unionpay;
            require("unionpay", &[
                ("mer_id", &u.mer_id),
                ("cert_id", &u.cert_id),
                ("private_key_path", &u.private_key_path),
                ("verify_cert_path", &u.verify_cert_path),
                ("gateway_url", &u.gateway_url),
                ("back_url", &u.back_url),
            ])?;
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout)
    }

    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "development"
    }

    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

fn require(section: &str, fields: &[(&str, &String)]) -> Result<(), PayError> {
    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((name, _)) => Err(PayError::Config(format!("{section}.{name} is required when {section} is enabled"))),
        None => Ok(()),
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                cors_origins: vec!["*".to_string()],
                request_timeout: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json_format: false,
                file_path: None,
            },
            http: HttpConfig {
                timeout: 30,
                connect_timeout: 10,
                query_retries: 2,
                retry_delay_ms: 500,
            },
            wechat: WechatConfig {
                base_url: "https://api.mch.weixin.qq.com".to_string(),
                ..Default::default()
            },
            alipay: AlipayConfig {
                gateway_url: "https://openapi.alipay.com/gateway.do".to_string(),
                ..Default::default()
            },
            unionpay: UnionPayConfig {
                gateway_url: "https://gateway.95516.com/gateway".to_string(),
                ..Default::default()
            },
            environment: "development".to_string(),
            service_name: "unipay-gateway".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_development());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_enabled_channel_requires_credentials() {
        let mut config = AppConfig::default();
        config.alipay.enabled = true;
        config.alipay.app_id = "2021000000000000".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("alipay.private_key_path"));
    }

    #[test]
    fn test_wechat_key_length() {
        let mut config = AppConfig::default();
        config.wechat = WechatConfig {
            enabled: true,
            app_id: "wx1".into(),
            mch_id: "1900000001".into(),
            serial_no: "ABC".into(),
            api_v3_key: "short".into(),
            private_key_path: "/tmp/key.pem".into(),
            platform_cert_path: "/tmp/cert.pem".into(),
            base_url: "https://api.mch.weixin.qq.com".into(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_http_client_config() {
        let http = AppConfig::default().http.client_config();
        assert_eq!(http.retry_count, 2);
        assert_eq!(http.retry_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_load_sample_config() {
        let path = format!("{}/config/application.toml", env!("CARGO_MANIFEST_DIR"));
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.service_name, "unipay-gateway");
        assert!(!config.wechat.enabled);
    }
}
