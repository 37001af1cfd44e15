#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::symm::{encrypt_aead, Cipher};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

use unipay_gateway::adapters::alipay::{AlipayAdapter, AlipayCredentials};
use unipay_gateway::adapters::unionpay::{UnionPayAdapter, UnionPayCredentials};
use unipay_gateway::adapters::wechat::{WechatCredentials, WechatPayAdapter};
use unipay_gateway::domain::models::NotifyPayload;
use unipay_gateway::utils::http_client::{HttpClient, HttpClientConfig};
use unipay_gateway::utils::sign::{RsaSigner, RsaVerifier};

pub const API_V3_KEY: &str = "0123456789abcdef0123456789abcdef";
pub const ALIPAY_APP_ID: &str = "2021000000000001";
pub const UNIONPAY_MER_ID: &str = "777290058110048";

pub fn key_pair() -> (RsaSigner, RsaVerifier) {
    let private = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let public = PKey::public_key_from_pem(&private.public_key_to_pem().unwrap()).unwrap();
    (RsaSigner::from_key(private), RsaVerifier::from_key(public))
}

pub fn http_client() -> HttpClient {
    HttpClient::new(HttpClientConfig {
        timeout: Duration::from_secs(5),
        retry_count: 2,
        retry_delay: Duration::from_millis(10),
        ..Default::default()
    })
    .unwrap()
}

/// 微信适配器以及模拟微信平台签名用的私钥
pub struct WechatFixture {
    pub adapter: WechatPayAdapter,
    pub platform: RsaSigner,
}

pub fn wechat(base_url: &str) -> WechatFixture {
    let (merchant_key, _) = key_pair();
    let (platform, platform_key) = key_pair();
    let credentials = WechatCredentials {
        app_id: "wx8888888888888888".to_string(),
        mch_id: "1900000109".to_string(),
        serial_no: "5157F09EFDC096DE15EBE81A47057A7232F1B8E1".to_string(),
        api_v3_key: API_V3_KEY.to_string(),
        merchant_key,
        platform_key,
        base_url: base_url.to_string(),
    };
    WechatFixture {
        adapter: WechatPayAdapter::new(credentials, http_client()).unwrap(),
        platform,
    }
}

/// 构造一条加密并签名的微信支付成功通知
pub fn wechat_notify(platform: &RsaSigner, out_trade_no: &str, total_fen: i64) -> NotifyPayload {
    let transaction = json!({
        "appid": "wx8888888888888888",
        "mchid": "1900000109",
        "out_trade_no": out_trade_no,
        "transaction_id": "4200000985202406010000000001",
        "trade_type": "APP",
        "trade_state": "SUCCESS",
        "success_time": "2024-06-01T10:00:00+08:00",
        "amount": { "total": total_fen, "payer_total": total_fen, "currency": "CNY" }
    })
    .to_string();

    let nonce = "0123456789ab";
    let aad = "transaction";
    let mut tag = [0u8; 16];
    let mut ciphertext = encrypt_aead(
        Cipher::aes_256_gcm(),
        API_V3_KEY.as_bytes(),
        Some(nonce.as_bytes()),
        aad.as_bytes(),
        transaction.as_bytes(),
        &mut tag,
    )
    .unwrap();
    ciphertext.extend_from_slice(&tag);

    let body = json!({
        "id": "EV-2018022511223320873",
        "create_time": "2024-06-01T10:00:01+08:00",
        "resource_type": "encrypt-resource",
        "event_type": "TRANSACTION.SUCCESS",
        "summary": "支付成功",
        "resource": {
            "original_type": "transaction",
            "algorithm": "AEAD_AES_256_GCM",
            "ciphertext": STANDARD.encode(&ciphertext),
            "associated_data": aad,
            "nonce": nonce
        }
    })
    .to_string();

    let timestamp = Utc::now().timestamp().to_string();
    let header_nonce = "5K8264ILTKCH16CQ2502SI8ZNMTM67VS";
    let message = format!("{timestamp}\n{header_nonce}\n{body}\n");
    let signature = platform.sign(message.as_bytes()).unwrap();

    NotifyPayload::new(body)
        .with_header("Wechatpay-Timestamp", timestamp)
        .with_header("Wechatpay-Nonce", header_nonce)
        .with_header("Wechatpay-Signature", signature)
        .with_header("Wechatpay-Serial", "PUB_KEY_ID_0000000001")
}

pub struct AlipayFixture {
    pub adapter: AlipayAdapter,
    pub alipay: RsaSigner,
}

pub fn alipay(gateway_url: &str) -> AlipayFixture {
    let (app_private_key, _) = key_pair();
    let (alipay, alipay_public_key) = key_pair();
    let credentials = AlipayCredentials {
        app_id: ALIPAY_APP_ID.to_string(),
        app_private_key,
        alipay_public_key,
        gateway_url: gateway_url.to_string(),
    };
    AlipayFixture {
        adapter: AlipayAdapter::new(credentials, http_client()),
        alipay,
    }
}

/// 支付宝异步通知表单，签名时排除 sign 和 sign_type
pub fn alipay_notify(alipay: &RsaSigner, out_trade_no: &str, total_amount: &str) -> String {
    alipay_notify_with(alipay, out_trade_no, total_amount, &[])
}

/// 在默认支付成功通知上覆盖或追加字段
pub fn alipay_notify_with(
    alipay: &RsaSigner,
    out_trade_no: &str,
    total_amount: &str,
    fields: &[(&str, &str)],
) -> String {
    let mut params: BTreeMap<String, String> = [
        ("app_id", ALIPAY_APP_ID),
        ("notify_id", "ac05099524730693a8b330c5ecf72da9786"),
        ("notify_type", "trade_status_sync"),
        ("notify_time", "2024-06-01 10:00:05"),
        ("charset", "utf-8"),
        ("version", "1.0"),
        ("trade_no", "2024060122001400000000000001"),
        ("out_trade_no", out_trade_no),
        ("total_amount", total_amount),
        ("trade_status", "TRADE_SUCCESS"),
        ("gmt_payment", "2024-06-01 10:00:00"),
        ("subject", "测试订单"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in fields {
        params.insert(k.to_string(), v.to_string());
    }

    let sign = alipay.sign_params(&params, &["sign", "sign_type"]).unwrap();
    params.insert("sign_type".to_string(), "RSA2".to_string());
    params.insert("sign".to_string(), sign);
    serde_urlencoded::to_string(&params).unwrap()
}

pub struct UnionPayFixture {
    pub adapter: UnionPayAdapter,
    pub unionpay: RsaSigner,
}

pub fn unionpay(gateway_url: &str) -> UnionPayFixture {
    let (signer, _) = key_pair();
    let (unionpay, verifier) = key_pair();
    let credentials = UnionPayCredentials {
        mer_id: UNIONPAY_MER_ID.to_string(),
        cert_id: "69629715588".to_string(),
        signer,
        verifier,
        gateway_url: gateway_url.to_string(),
        back_url: "https://merchant.example.com/unionpay/back".to_string(),
    };
    UnionPayFixture {
        adapter: UnionPayAdapter::new(credentials, http_client()),
        unionpay,
    }
}

/// 银联表单报文，签名字段为 signature
pub fn unionpay_form(unionpay: &RsaSigner, fields: &[(&str, &str)]) -> String {
    let mut params: BTreeMap<String, String> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let signature = unionpay.sign_params(&params, &["signature"]).unwrap();
    params.insert("signature".to_string(), signature);
    serde_urlencoded::to_string(&params).unwrap()
}
