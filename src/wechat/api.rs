use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::wechat::error::{Result, WechatError};
use crate::wechat::models::PlatformStatus;
use crate::wechat::token::AccessTokenServer;

pub const WECHAT_API_BASE: &str = "https://api.weixin.qq.com";

/// 出站请求的超时时间
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// 创建带超时的 reqwest 客户端
pub fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| WechatError::Transport(e.to_string()))
}

/// 公众平台 JSON 接口客户端，每次请求自动带上 access token
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: AccessTokenServer,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, tokens: AccessTokenServer) -> Self {
        Self {
            http,
            base_url: WECHAT_API_BASE.to_string(),
            tokens,
        }
    }

    /// 覆盖接口地址（测试时指向 wiremock）
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// GET 请求，`query` 会追加在 access_token 之后
    ///
    /// 平台返回的错误（包括 token 失效）原样交给调用方，不做重试。
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let token = self.tokens.token().await?;
        let url = format!("{}{}", self.base_url, path);
        log_request("GET", &url, &[]);

        let response = self
            .http
            .get(&url)
            .query(&[("access_token", token.as_str())])
            .query(query)
            .send()
            .await?;

        read_response(response).await
    }

    /// POST JSON 请求
    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        // serde_json 不会转义 HTML 字符，正文里的 <p> 等标签原样发送
        let payload = serde_json::to_vec(body)?;

        let token = self.tokens.token().await?;
        let url = format!("{}{}", self.base_url, path);
        log_request("POST", &url, &payload);

        let response = self
            .http
            .post(&url)
            .query(&[("access_token", token.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(payload)
            .send()
            .await?;

        read_response(response).await
    }
}

async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await?;
    log_response(status, &body);

    if status != StatusCode::OK {
        return Err(WechatError::HttpStatus(status.as_u16()));
    }

    decode_platform_body(&body)
}

/// 先检查 errcode，再解析成调用方需要的结构
pub(crate) fn decode_platform_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let status: PlatformStatus = serde_json::from_slice(body)?;
    status.into_result()?;
    Ok(serde_json::from_slice(body)?)
}

/// 记录请求
pub(crate) fn log_request(method: &str, url: &str, body: &[u8]) {
    let body = String::from_utf8_lossy(body);
    debug!(method, url, body = %body.trim_end(), "<= request");
}

/// 记录响应，按状态码选择日志级别
pub(crate) fn log_response(status: StatusCode, body: &[u8]) {
    let body = String::from_utf8_lossy(body);
    let status = status.as_u16();
    match status {
        500.. => error!(status, body = %body, "=> response"),
        400..=499 => warn!(status, body = %body, "=> response"),
        _ => debug!(status, body = %body, "=> response"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wechat::models::AccessTokenResponse;
    use crate::wechat::token::TokenSource;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone, Default)]
    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }

    impl TokenSource for CountingSource {
        async fn fetch(&self) -> Result<AccessTokenResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(AccessTokenResponse {
                access_token: format!("token-{}", n),
                expires_in: 7200,
            })
        }
    }

    #[derive(Debug, Deserialize)]
    struct Echo {
        value: String,
    }

    async fn setup() -> (MockServer, ApiClient, CountingSource) {
        let server = MockServer::start().await;
        let source = CountingSource::default();
        let tokens = AccessTokenServer::spawn(source.clone());
        let client = ApiClient::new(reqwest::Client::new(), tokens).with_base_url(&server.uri());
        (server, client, source)
    }

    #[tokio::test]
    async fn test_get_injects_access_token() {
        let (server, client, _) = setup().await;

        Mock::given(method("GET"))
            .and(path("/cgi-bin/echo"))
            .and(query_param("access_token", "token-1"))
            .and(query_param("type", "image"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let echo: Echo = client.get("/cgi-bin/echo", &[("type", "image")]).await.unwrap();
        assert_eq!(echo.value, "ok");
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let (server, client, _) = setup().await;

        Mock::given(method("POST"))
            .and(path("/cgi-bin/echo"))
            .and(query_param("access_token", "token-1"))
            .and(body_json(json!({"content": "<p>a & b</p>"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"errcode": 0, "errmsg": "ok", "value": "posted"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let echo: Echo = client
            .post("/cgi-bin/echo", &json!({"content": "<p>a & b</p>"}))
            .await
            .unwrap();
        assert_eq!(echo.value, "posted");
    }

    #[tokio::test]
    async fn test_non_200_is_transport_error() {
        let (server, client, _) = setup().await;

        Mock::given(method("GET"))
            .and(path("/cgi-bin/echo"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let result: Result<Echo> = client.get("/cgi-bin/echo", &[]).await;
        assert!(matches!(result, Err(WechatError::HttpStatus(503))));
    }

    #[tokio::test]
    async fn test_errcode_is_platform_error() {
        let (server, client, source) = setup().await;

        Mock::given(method("POST"))
            .and(path("/cgi-bin/echo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"errcode": 45009, "errmsg": "reach max api daily quota limit"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result: Result<Echo> = client.post("/cgi-bin/echo", &json!({})).await;
        assert!(matches!(result, Err(WechatError::Platform { code: 45009, .. })));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1, "普通错误不会刷新 token");
    }

    #[tokio::test]
    async fn test_invalid_token_is_not_retried() {
        let (server, client, source) = setup().await;

        Mock::given(method("GET"))
            .and(path("/cgi-bin/echo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"errcode": 40001, "errmsg": "invalid credential"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result: Result<Echo> = client.get("/cgi-bin/echo", &[]).await;
        assert!(matches!(result, Err(WechatError::Platform { code: 40001, .. })));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1, "token 失效时不会自动刷新");
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[test]
    fn test_decode_platform_body_malformed_json() {
        let result: Result<Echo> = decode_platform_body(b"<html>");
        assert!(matches!(result, Err(WechatError::MalformedJson(_))));
    }
}
