//! 通用签名工具：参数规范化 + RSA-SHA256 签名/验签
//!
//! 规范化规则：去掉空值和签名字段本身，按 key 字节序排序，拼接为 `k1=v1&k2=v2`，
//! 末尾不带分隔符。所有值为空时规范化结果为空串，仍然正常签名/验签。

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Utc;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};
use openssl::symm::{Cipher, decrypt_aead};
use openssl::x509::X509;
use rand::{rng, Rng};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::utils::error::PayError;

// 参数规范化
pub fn canonicalize<I, K, V>(params: I, exclude: &[&str]) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let sorted: BTreeMap<String, String> = params
        .into_iter()
        .filter(|(k, v)| !v.as_ref().is_empty() && !exclude.contains(&k.as_ref()))
        .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
        .collect();

    sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// 私钥签名器
#[derive(Clone)]
pub struct RsaSigner {
    key: PKey<Private>,
}

impl fmt::Debug for RsaSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaSigner").field("bits", &self.key.bits()).finish()
    }
}

impl RsaSigner {
    /// 支持 PKCS#1 (`BEGIN RSA PRIVATE KEY`) 与 PKCS#8 (`BEGIN PRIVATE KEY`)
    pub fn from_pem(pem: &[u8]) -> Result<Self, PayError> {
        let key = PKey::private_key_from_pem(pem)
            .map_err(|e| PayError::Config(format!("invalid private key: {e}")))?;
        Ok(Self { key })
    }

    pub fn from_pem_with_passphrase(pem: &[u8], passphrase: &str) -> Result<Self, PayError> {
        let key = PKey::private_key_from_pem_passphrase(pem, passphrase.as_bytes())
            .map_err(|e| PayError::Config(format!("invalid encrypted private key: {e}")))?;
        Ok(Self { key })
    }

    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, PayError> {
        Self::from_pem(&read_key_file(path.as_ref())?)
    }

    pub fn from_key(key: PKey<Private>) -> Self {
        Self { key }
    }

    // 对原始消息签名，返回 base64
    pub fn sign(&self, message: &[u8]) -> Result<String, PayError> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.key)
            .map_err(|e| PayError::SignatureFailed(e.to_string()))?;
        signer
            .update(message)
            .map_err(|e| PayError::SignatureFailed(e.to_string()))?;
        let signature = signer
            .sign_to_vec()
            .map_err(|e| PayError::SignatureFailed(e.to_string()))?;
        Ok(STANDARD.encode(signature))
    }

    /// 规范化参数后签名，`exclude` 中的字段（通常是签名字段）不参与
    pub fn sign_params<I, K, V>(&self, params: I, exclude: &[&str]) -> Result<String, PayError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.sign(canonicalize(params, exclude).as_bytes())
    }
}

/// 公钥验签器
#[derive(Clone)]
pub struct RsaVerifier {
    key: PKey<Public>,
}

impl fmt::Debug for RsaVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaVerifier").field("bits", &self.key.bits()).finish()
    }
}

impl RsaVerifier {
    /// 支持 X.509 证书、PKCS#1 公钥 (`BEGIN RSA PUBLIC KEY`) 与 SPKI 公钥 (`BEGIN PUBLIC KEY`)
    pub fn from_pem(pem: &[u8]) -> Result<Self, PayError> {
        let text = String::from_utf8_lossy(pem);
        let key = if text.contains("BEGIN CERTIFICATE") {
            X509::from_pem(pem).and_then(|cert| cert.public_key())
        } else if text.contains("BEGIN RSA PUBLIC KEY") {
            Rsa::public_key_from_pem_pkcs1(pem).and_then(PKey::from_rsa)
        } else {
            PKey::public_key_from_pem(pem)
        }
        .map_err(|e| PayError::Config(format!("invalid public key: {e}")))?;

        Ok(Self { key })
    }

    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, PayError> {
        Self::from_pem(&read_key_file(path.as_ref())?)
    }

    pub fn from_key(key: PKey<Public>) -> Self {
        Self { key }
    }

    /// 验签失败、签名格式错误都返回 false，不返回错误
    pub fn verify(&self, message: &[u8], signature_b64: &str) -> bool {
        let Ok(signature) = STANDARD.decode(signature_b64.trim()) else {
            return false;
        };
        if signature.is_empty() {
            return false;
        }

        Verifier::new(MessageDigest::sha256(), &self.key)
            .and_then(|mut verifier| {
                verifier.update(message)?;
                verifier.verify(&signature)
            })
            .unwrap_or(false)
    }

    pub fn verify_params<I, K, V>(&self, params: I, exclude: &[&str], signature_b64: &str) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.verify(canonicalize(params, exclude).as_bytes(), signature_b64)
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>, PayError> {
    std::fs::read(path)
        .map_err(|e| PayError::Config(format!("failed to read key file {}: {e}", path.display())))
}

// AEAD_AES_256_GCM 解密，密文末尾 16 字节为认证标签
pub fn decrypt_aes_256_gcm(
    key: &[u8],
    nonce: &[u8],
    associated_data: &[u8],
    ciphertext_b64: &str,
) -> Result<Vec<u8>, PayError> {
    const TAG_LEN: usize = 16;

    if key.len() != 32 {
        return Err(PayError::Config("AES-256-GCM key must be 32 bytes".to_string()));
    }

    let data = STANDARD
        .decode(ciphertext_b64)
        .map_err(|e| PayError::InvalidNotify(format!("ciphertext is not valid base64: {e}")))?;
    if data.len() < TAG_LEN {
        return Err(PayError::InvalidNotify("ciphertext too short".to_string()));
    }

    let (ciphertext, tag) = data.split_at(data.len() - TAG_LEN);
    decrypt_aead(Cipher::aes_256_gcm(), key, Some(nonce), associated_data, ciphertext, tag)
        .map_err(|_| PayError::InvalidSignature("failed to decrypt notify resource".to_string()))
}

// 生成随机字符串
pub fn nonce_str(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rng();

    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

// 验证时间戳与当前时间的偏差是否在允许范围内
pub fn verify_timestamp(timestamp: i64, max_skew_seconds: i64) -> bool {
    (Utc::now().timestamp() - timestamp).abs() <= max_skew_seconds
}
