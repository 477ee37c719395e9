use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::timeline::TimelineError;
use crate::wechat::WechatError;

/// 回调接口的错误，转换成对应的 HTTP 状态码
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Wechat(#[from] WechatError),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    /// 生成回复时出错
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Wechat(e) => match e {
                // 都是请求本身的问题
                WechatError::SignatureMismatch
                | WechatError::Crypto(_)
                | WechatError::MalformedXml(_)
                | WechatError::MalformedJson(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Timeline(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("❌ 回调处理失败: {}", self);
        } else {
            warn!("⚠️ 拒绝回调请求: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}
