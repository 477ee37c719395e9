//! 消息体加解密
//!
//! 明文布局（网络字节序）：
//! `random(16) ‖ msg_len(4) ‖ msg(msg_len) ‖ appid`，
//! 按 32 字节 PKCS#7 补位后做 AES-256-CBC，最后 base64。

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::wechat::crypto::{self, AesKey};
use crate::wechat::error::CryptoError;

pub const RANDOM_LEN: usize = 16;
const LEN_PREFIX: usize = 4;
const HEADER_LEN: usize = RANDOM_LEN + LEN_PREFIX;

/// 解密后的消息体
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub random: [u8; RANDOM_LEN],
    pub payload: Vec<u8>,
    pub app_id: String,
}

/// 生成 16 位 `[0-9A-Za-z]` 随机串
pub fn random_nonce() -> [u8; RANDOM_LEN] {
    let mut rng = rand::thread_rng();
    let mut nonce = [0u8; RANDOM_LEN];
    for b in nonce.iter_mut() {
        *b = rng.sample(Alphanumeric);
    }
    nonce
}

/// 拼接布局、补位并原地加密，返回原始密文
pub fn encode(
    key: &AesKey,
    random: &[u8; RANDOM_LEN],
    payload: &[u8],
    app_id: &str,
) -> Result<Vec<u8>, CryptoError> {
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| CryptoError::MalformedEnvelope(format!("消息过长: {}", payload.len())))?;

    let content_len = HEADER_LEN + payload.len() + app_id.len();
    let mut buf = Vec::with_capacity(content_len + crypto::PKCS7_BLOCK_SIZE);
    buf.extend_from_slice(random);
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(app_id.as_bytes());

    crypto::pkcs7_pad(&mut buf);
    crypto::cbc_encrypt_in_place(key, &mut buf)?;
    Ok(buf)
}

/// 解密原始密文并校验 AppId
pub fn decode(
    key: &AesKey,
    ciphertext: &[u8],
    expected_app_id: &str,
) -> Result<MessageEnvelope, CryptoError> {
    let plaintext = crypto::decrypt(key, ciphertext)?;

    if plaintext.len() <= HEADER_LEN {
        return Err(CryptoError::MalformedEnvelope(format!(
            "明文过短: {}",
            plaintext.len()
        )));
    }

    let mut len_bytes = [0u8; LEN_PREFIX];
    len_bytes.copy_from_slice(&plaintext[RANDOM_LEN..HEADER_LEN]);
    let payload_len = u32::from_be_bytes(len_bytes) as usize;

    let app_id_offset = HEADER_LEN
        .checked_add(payload_len)
        .filter(|offset| *offset < plaintext.len())
        .ok_or_else(|| CryptoError::MalformedEnvelope(format!("消息长度不正确: {}", payload_len)))?;

    let app_id = &plaintext[app_id_offset..];
    if app_id != expected_app_id.as_bytes() {
        return Err(CryptoError::AppIdMismatch);
    }

    let mut random = [0u8; RANDOM_LEN];
    random.copy_from_slice(&plaintext[..RANDOM_LEN]);

    Ok(MessageEnvelope {
        random,
        payload: plaintext[HEADER_LEN..app_id_offset].to_vec(),
        app_id: expected_app_id.to_string(),
    })
}

/// 加密并 base64 编码，结果即回复 XML 中的 `Encrypt` 字段
pub fn encrypt_msg(
    key: &AesKey,
    random: &[u8; RANDOM_LEN],
    payload: &[u8],
    app_id: &str,
) -> Result<String, CryptoError> {
    let ciphertext = encode(key, random, payload, app_id)?;
    Ok(STANDARD.encode(ciphertext))
}

/// 对请求 XML 中的 `Encrypt` 字段做 base64 解码并解密
pub fn decrypt_msg(
    key: &AesKey,
    encrypted: &str,
    app_id: &str,
) -> Result<MessageEnvelope, CryptoError> {
    let ciphertext = STANDARD
        .decode(encrypted.trim())
        .map_err(|e| CryptoError::InvalidBase64(e.to_string()))?;
    decode(key, &ciphertext, app_id)
}
