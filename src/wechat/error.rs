use thiserror::Error;

/// 消息加解密错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("EncodingAESKey 解码后长度必须为 32 字节，实际为 {0}")]
    BadKeyLength(usize),

    #[error("密文长度必须是 32 的正整数倍，实际为 {0}")]
    BadCiphertextLength(usize),

    #[error("PKCS#7 补位长度不正确: {0}")]
    BadPadding(usize),

    #[error("消息中的 AppId 与配置不一致")]
    AppIdMismatch,

    #[error("base64 解码失败: {0}")]
    InvalidBase64(String),

    #[error("消息体格式不正确: {0}")]
    MalformedEnvelope(String),
}

/// 微信公众平台相关的错误
#[derive(Debug, Error)]
pub enum WechatError {
    #[error("配置无效: {0}")]
    Config(String),

    #[error("网络请求失败: {0}")]
    Transport(String),

    #[error("HTTP 状态码异常: {0}")]
    HttpStatus(u16),

    #[error("[wechat global error]: errcode: {code}, errmsg: {msg}")]
    Platform { code: i64, msg: String },

    #[error("签名校验失败")]
    SignatureMismatch,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("XML 格式不正确: {0}")]
    MalformedXml(String),

    #[error("JSON 格式不正确: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("没有可用的图片素材")]
    NoImageMaterials,

    #[error("access token 服务已停止")]
    TokenServiceUnavailable,
}

impl From<reqwest::Error> for WechatError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => WechatError::HttpStatus(status.as_u16()),
            None => WechatError::Transport(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, WechatError>;
