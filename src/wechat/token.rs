//! access token 中控服务
//!
//! 公众号的 access token 全局唯一，重新获取会让旧 token 在短时间后失效，
//! 所以整个进程只允许一个后台任务去请求 `/cgi-bin/token`。
//! 调用方通过 [`AccessTokenServer`] 句柄读取缓存，或者经由通道请求刷新；
//! 缓存只由后台任务写入，刷新请求按到达顺序逐个处理。

use std::future::Future;
use std::sync::{Arc, RwLock};

use reqwest::StatusCode;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::wechat::api::{decode_platform_body, log_request, log_response};
use crate::wechat::error::{Result, WechatError};
use crate::wechat::models::AccessTokenResponse;

pub const TOKEN_PATH: &str = "/cgi-bin/token";

/// 第一次定时刷新前的等待时间
pub const DEFAULT_TICK: Duration = Duration::from_secs(2 * 60 * 60);

/// 提前于过期时间刷新的余量
const EXPIRY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// 新旧有效期相差超过该值才重新设置定时器
const RETICK_THRESHOLD: Duration = Duration::from_secs(5);

/// 公众号的 AppID / AppSecret
#[derive(Clone)]
pub struct AppCredential {
    pub app_id: String,
    pub app_secret: String,
}

impl std::fmt::Debug for AppCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredential")
            .field("app_id", &self.app_id)
            .field("app_secret", &"***")
            .finish()
    }
}

/// 缓存中的 access token
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

impl AccessToken {
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// 获取 access token 的来源，生产环境为微信服务器
pub trait TokenSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<AccessTokenResponse>> + Send;
}

// ============================================================================
// 微信服务器
// ============================================================================

/// 通过 `GET /cgi-bin/token` 获取 access token
pub struct PlatformTokenSource {
    http: reqwest::Client,
    base_url: String,
    credential: AppCredential,
}

impl PlatformTokenSource {
    pub fn new(http: reqwest::Client, base_url: &str, credential: AppCredential) -> Result<Self> {
        if credential.app_id.trim().is_empty() || credential.app_secret.trim().is_empty() {
            return Err(WechatError::Config("appId 或 appSecret 为空".to_string()));
        }

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credential,
        })
    }
}

impl TokenSource for PlatformTokenSource {
    async fn fetch(&self) -> Result<AccessTokenResponse> {
        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        log_request("GET", &url, &[]);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", self.credential.app_id.as_str()),
                ("secret", self.credential.app_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        log_response(status, &body);

        if status != StatusCode::OK {
            return Err(WechatError::HttpStatus(status.as_u16()));
        }

        decode_platform_body(&body)
    }
}

// ============================================================================
// 句柄
// ============================================================================

type RefreshReply = oneshot::Sender<Result<String>>;

/// access token 服务的句柄，可随意 clone
#[derive(Clone)]
pub struct AccessTokenServer {
    cache: Arc<RwLock<Option<AccessToken>>>,
    requests: mpsc::Sender<RefreshReply>,
}

impl AccessTokenServer {
    /// 启动后台任务，必须在 tokio 运行时内调用
    pub fn spawn<S: TokenSource>(source: S) -> Self {
        Self::spawn_with_tick(source, DEFAULT_TICK)
    }

    pub fn spawn_with_tick<S: TokenSource>(source: S, initial_tick: Duration) -> Self {
        // tokio 的 mpsc 至少要有 1 个缓冲位，配合 oneshot 回复实现一问一答
        let (requests, receiver) = mpsc::channel(1);
        let cache = Arc::new(RwLock::new(None));

        let worker = TokenWorker {
            source,
            cache: cache.clone(),
            tick: initial_tick,
        };
        tokio::spawn(worker.run(receiver));

        Self { cache, requests }
    }

    /// 优先返回缓存中未过期的 token，否则请求刷新
    pub async fn token(&self) -> Result<String> {
        if let Some(token) = self.cached() {
            debug!("load token from cache");
            return Ok(token);
        }

        debug!("load token from wechat server");
        self.refresh_token().await
    }

    /// 强制向微信服务器请求新的 token
    pub async fn refresh_token(&self) -> Result<String> {
        let (reply, response) = oneshot::channel();

        self.requests
            .send(reply)
            .await
            .map_err(|_| WechatError::TokenServiceUnavailable)?;

        response
            .await
            .map_err(|_| WechatError::TokenServiceUnavailable)?
    }

    /// 当前缓存的 token（已过期的不返回）
    pub fn cached(&self) -> Option<String> {
        let guard = self.cache.read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .filter(|token| token.is_fresh(Instant::now()))
            .map(|token| token.token.clone())
    }
}

// ============================================================================
// 后台任务
// ============================================================================

struct TokenWorker<S> {
    source: S,
    cache: Arc<RwLock<Option<AccessToken>>>,
    tick: Duration,
}

impl<S: TokenSource> TokenWorker<S> {
    async fn run(mut self, mut requests: mpsc::Receiver<RefreshReply>) {
        let timer = time::sleep(self.tick);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(reply) = request else {
                        debug!("所有句柄都已释放，access token 服务退出");
                        return;
                    };

                    let result = self.update_token().await;

                    if let Ok((_, next_tick)) = &result {
                        self.tick = *next_tick;
                        timer.as_mut().reset(Instant::now() + self.tick);
                    }

                    // 调用方可能已经放弃等待
                    let _ = reply.send(result.map(|(token, _)| token));
                }
                () = &mut timer => {
                    match self.update_token().await {
                        Ok((_, next_tick)) => {
                            if self.tick.abs_diff(next_tick) > RETICK_THRESHOLD {
                                info!(
                                    "access token 刷新间隔调整: {}s -> {}s",
                                    self.tick.as_secs(),
                                    next_tick.as_secs()
                                );
                                self.tick = next_tick;
                            }
                        }
                        Err(e) => {
                            // 旧 token 还能用一段时间，下一次调用会再触发刷新
                            warn!("定时刷新 access token 失败: {}", e);
                        }
                    }
                    timer.as_mut().reset(Instant::now() + self.tick);
                }
            }
        }
    }

    async fn update_token(&self) -> Result<(String, Duration)> {
        let response = self.source.fetch().await.map_err(|e| {
            error!("load token: {}", e);
            e
        })?;

        let now = Instant::now();
        let token = AccessToken {
            token: response.access_token.clone(),
            issued_at: now,
            expires_at: now + Duration::from_secs(response.expires_in),
        };

        info!(
            "fetched new token: {}, expires in {}s",
            mask(&token.token),
            response.expires_in
        );

        {
            let mut guard = self.cache.write().unwrap_or_else(|e| e.into_inner());
            *guard = Some(token);
        }

        Ok((response.access_token, refresh_interval(response.expires_in)))
    }
}

/// 根据服务器返回的有效期计算下次刷新的间隔
fn refresh_interval(expires_in: u64) -> Duration {
    let ttl = Duration::from_secs(expires_in);
    if ttl > EXPIRY_MARGIN * 2 {
        ttl - EXPIRY_MARGIN
    } else {
        (ttl / 2).max(Duration::from_secs(1))
    }
}

fn mask(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{}***", prefix)
}
