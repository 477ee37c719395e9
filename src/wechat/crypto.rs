use aes::Aes256;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use sha1::{Digest, Sha1};
use std::fmt;

use crate::wechat::error::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// 微信约定的 PKCS#7 补位块大小（不是 AES 的 16 字节分组）
pub const PKCS7_BLOCK_SIZE: usize = 32;

/// EncodingAESKey 固定为 43 个字符
pub const ENCODED_KEY_LEN: usize = 43;

// ============================================================================
// 签名
// ============================================================================

/// 将 token、timestamp、nonce、msg_encrypt 四个参数按字典序排序，
/// 拼接成一个字符串后做 sha1，结果为小写十六进制。
///
/// 服务器校验（GET）时 `msg_encrypt` 传空串即可。
pub fn sign(token: &str, timestamp: &str, nonce: &str, msg_encrypt: &str) -> String {
    let mut parts = [token, timestamp, nonce, msg_encrypt];
    parts.sort_unstable();

    let digest = Sha1::digest(parts.concat().as_bytes());
    hex::encode(digest)
}

/// 校验签名是否与给定参数匹配
pub fn verify_signature(
    signature: &str,
    token: &str,
    timestamp: &str,
    nonce: &str,
    msg_encrypt: &str,
) -> bool {
    let expected = sign(token, timestamp, nonce, msg_encrypt);
    // 长度相同的情况下逐字节比较，不提前退出
    expected.len() == signature.len()
        && expected
            .bytes()
            .zip(signature.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

// ============================================================================
// AES 密钥
// ============================================================================

/// EncodingAESKey 是 43 个随机字符，最后一个字符的低位通常不为 0
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// 解码后的 32 字节 AES 密钥，IV 取前 16 字节
#[derive(Clone, PartialEq, Eq)]
pub struct AesKey([u8; 32]);

impl AesKey {
    /// 从公众号后台配置的 43 位 EncodingAESKey 解码
    pub fn from_encoded(encoded: &str) -> Result<Self, CryptoError> {
        let encoded = encoded.trim();
        let decoded = KEY_ENGINE
            .decode(format!("{}=", encoded))
            .map_err(|e| CryptoError::InvalidBase64(e.to_string()))?;

        if encoded.len() != ENCODED_KEY_LEN {
            return Err(CryptoError::BadKeyLength(decoded.len()));
        }

        Self::from_bytes(&decoded)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::BadKeyLength(bytes.len()))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn iv(&self) -> &[u8] {
        &self.0[..16]
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(***)")
    }
}

// ============================================================================
// PKCS#7（块大小 32）
// ============================================================================

/// 按 32 字节补位，补位值等于补位长度，取值范围 [1, 32]
pub fn pkcs7_pad(buf: &mut Vec<u8>) {
    let amount = PKCS7_BLOCK_SIZE - buf.len() % PKCS7_BLOCK_SIZE;
    buf.resize(buf.len() + amount, amount as u8);
}

/// 去除补位，返回有效内容
pub fn pkcs7_unpad(buf: &[u8]) -> Result<&[u8], CryptoError> {
    let amount = buf.last().copied().unwrap_or(0) as usize;

    if !(1..=PKCS7_BLOCK_SIZE).contains(&amount) || amount > buf.len() {
        return Err(CryptoError::BadPadding(amount));
    }

    Ok(&buf[..buf.len() - amount])
}

// ============================================================================
// AES-256-CBC
// ============================================================================

/// 补位后加密
pub fn encrypt(key: &AesKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut buf = plaintext.to_vec();
    pkcs7_pad(&mut buf);
    cbc_encrypt_in_place(key, &mut buf)?;
    Ok(buf)
}

/// 解密并去除补位
pub fn decrypt(key: &AesKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() || ciphertext.len() % PKCS7_BLOCK_SIZE != 0 {
        return Err(CryptoError::BadCiphertextLength(ciphertext.len()));
    }

    let mut buf = ciphertext.to_vec();
    let decryptor = Aes256CbcDec::new_from_slices(key.as_bytes(), key.iv())
        .map_err(|_| CryptoError::BadKeyLength(key.as_bytes().len()))?;
    decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| CryptoError::BadCiphertextLength(ciphertext.len()))?;

    let len = pkcs7_unpad(&buf)?.len();
    buf.truncate(len);
    Ok(buf)
}

/// 原地加密，不做补位；`buf` 长度必须是 16 的整数倍
pub(crate) fn cbc_encrypt_in_place(key: &AesKey, buf: &mut [u8]) -> Result<(), CryptoError> {
    let len = buf.len();
    let encryptor = Aes256CbcEnc::new_from_slices(key.as_bytes(), key.iv())
        .map_err(|_| CryptoError::BadKeyLength(key.as_bytes().len()))?;
    encryptor
        .encrypt_padded_mut::<NoPadding>(buf, len)
        .map_err(|_| CryptoError::BadCiphertextLength(len))?;
    Ok(())
}
