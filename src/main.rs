use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use progressbar::app::AppConfig;
use progressbar::article::ArticleRenderer;
use progressbar::logger;
use progressbar::publisher::Publisher;
use progressbar::scheduler;
use progressbar::server::{AppState, Server};
use progressbar::wechat::api::build_http_client;
use progressbar::wechat::models::MassFilter;
use progressbar::wechat::{AccessTokenServer, ApiClient, PlatformTokenSource};

#[tokio::main]
async fn main() -> Result<()> {
    // 第一个参数为配置文件路径，默认 ./config.toml
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    logger::init(config.app.debug);
    info!("🚀 启动 progressbar");
    info!("{}", "=".repeat(60));

    let http = build_http_client().context("创建 HTTP 客户端失败")?;

    // ========================================================================
    // access token 服务
    // ========================================================================
    let source = PlatformTokenSource::new(
        http.clone(),
        &config.wechat.api_base_url,
        config.wechat.credential(),
    )?;
    let tokens = AccessTokenServer::spawn(source);
    let client = ApiClient::new(http.clone(), tokens).with_base_url(&config.wechat.api_base_url);

    // ========================================================================
    // 每日推送
    // ========================================================================
    let renderer = ArticleRenderer::new(
        http,
        Some(config.article.template.clone()),
        &config.article.quotations_url,
    );
    let filter = MassFilter {
        is_to_all: config.wechat.is_to_all,
        tag_id: config.wechat.tag_id,
    };
    let publisher = Arc::new(Publisher::new(client, renderer, filter));

    let at = config.schedule.time;
    tokio::spawn(scheduler::run_daily(at, move |now| {
        let publisher = Arc::clone(&publisher);
        async move {
            match publisher.broadcast(now).await {
                Ok(report) => info!("✅ 今日推送完成: {} (msg_id: {})", report.title, report.msg_id),
                Err(e) => error!("❌ 今日推送失败: {:#}", e),
            }
        }
    }));

    // ========================================================================
    // 回调服务
    // ========================================================================
    let state = AppState::from_config(&config.wechat)?;
    let server = Server::new(&config.server, state).await?;
    server.run().await?;

    info!("👋 已退出");
    Ok(())
}
