use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, FixedOffset};
use tracing::info;

use crate::article::ArticleRenderer;
use crate::timeline::{beijing, year_progress};
use crate::wechat::ApiClient;
use crate::wechat::material::{mass_send_article, random_image_material, upload_article_material};
use crate::wechat::models::MassFilter;

/// 一次群发的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub title: String,
    pub media_id: String,
    pub msg_id: i64,
}

/// 每日推送：计算进度 -> 生成文章 -> 上传素材 -> 群发
pub struct Publisher {
    client: ApiClient,
    renderer: ArticleRenderer,
    filter: MassFilter,
}

impl Publisher {
    pub fn new(client: ApiClient, renderer: ArticleRenderer, filter: MassFilter) -> Self {
        Self {
            client,
            renderer,
            filter,
        }
    }

    /// 任何一步失败都直接返回，当天不再继续
    pub async fn broadcast(&self, now: DateTime<FixedOffset>) -> Result<BroadcastReport> {
        let ratio = year_progress(&now).context("get progress of this year")?;
        let year = now.with_timezone(&beijing()).year();

        let draft = self
            .renderer
            .render(year, ratio)
            .await
            .context("create article")?;
        let title = draft.title.clone();

        let cover = random_image_material(&self.client)
            .await
            .context("pick cover image")?;

        let media_id = upload_article_material(&self.client, &draft.with_thumb(&cover.media_id))
            .await
            .context("upload article")?;
        info!("upload article successfully, the article's mediaId is {}", media_id);

        let sent = mass_send_article(&self.client, &media_id, self.filter.clone())
            .await
            .context("send article")?;
        info!("✅ 文章 {} 已群发", media_id);

        Ok(BroadcastReport {
            title,
            media_id,
            msg_id: sent.msg_id,
        })
    }
}
