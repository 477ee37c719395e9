//! 微信公众平台接入层：access token、接口调用、消息加解密

pub mod api;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod material;
pub mod models;
pub mod token;
pub mod xml;

pub use api::ApiClient;
pub use crypto::{AesKey, sign};
pub use error::{CryptoError, WechatError};
pub use token::{AccessTokenServer, AppCredential, PlatformTokenSource, TokenSource};
