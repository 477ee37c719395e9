mod handlers;
pub mod responses;

pub use handlers::callback::{CallbackQuery, MONTH_EVENT_KEY, month_event_content};

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::{Router, routing::get};
use chrono::{DateTime, FixedOffset};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::app::config::{ServerConfig, WechatConfig};
use crate::server::handlers::callback;
use crate::timeline::now_in_beijing;
use crate::wechat::AesKey;

/// 单个回调请求的处理时限
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub type Clock = fn() -> DateTime<FixedOffset>;

/// 所有回调请求共享的状态
#[derive(Clone)]
pub struct AppState {
    pub token: String,
    pub app_id: String,
    pub aes_key: AesKey,
    pub clock: Clock,
}

impl AppState {
    pub fn from_config(config: &WechatConfig) -> Result<Self> {
        Ok(Self {
            token: config.token.clone(),
            app_id: config.app_id.clone(),
            aes_key: config.aes_key()?,
            clock: now_in_beijing,
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("app_id", &self.app_id)
            .field("token", &"***")
            .field("aes_key", &self.aes_key)
            .finish()
    }
}

pub struct Server {
    router: Router,
    listener: TcpListener,
}

impl Server {
    pub async fn new(config: &ServerConfig, state: AppState) -> Result<Self> {
        let trace_layer =
            TraceLayer::new_for_http().make_span_with(|request: &'_ axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                tracing::info_span!("request", method = %request.method(), uri)
            });

        let router = Router::new()
            .route("/", get(callback::verify).post(callback::receive))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                REQUEST_TIMEOUT,
            ))
            .layer(trace_layer)
            .with_state(Arc::new(state));

        let listener = TcpListener::bind(format!("{}:{}", config.host, config.port))
            .await
            .with_context(|| format!("监听端口 {} 失败", config.port))?;

        Ok(Self { router, listener })
    }

    pub fn port(&self) -> u16 {
        self.listener
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or_default()
    }

    /// 运行到收到 Ctrl-C 为止
    pub async fn run(self) -> Result<()> {
        info!("🚀 回调服务监听于 {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("回调服务已停止");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("无法监听 Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("收到 Ctrl-C，准备退出");
}
