use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::timeline::percent;
use crate::wechat::models::ArticleMaterial;

/// 内置模板，找不到模板文件时使用
const BUILTIN_TEMPLATE: &str = include_str!("../templates/article_template.html");

/// 图文正文的字数上限
pub const MAX_CONTENT_CHARS: usize = 20_000;

/// 摘要的字数上限
const MAX_DIGEST_CHARS: usize = 120;

static TAG_WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(<[^><]*>)\s*").expect("标签空白正则有效"));

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*\.(\w+)\s*\}\}").expect("占位符正则有效"));

/// 一条名言
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Quotation {
    #[serde(alias = "Body")]
    pub body: String,
    #[serde(default, alias = "Author")]
    pub author: String,
    #[serde(default, alias = "Reference")]
    pub reference: String,
}

/// 渲染好、尚未上传的文章
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDraft {
    pub title: String,
    pub digest: String,
    pub content: String,
}

impl ArticleDraft {
    /// 配上封面图，得到上传用的图文素材
    pub fn with_thumb(self, thumb_media_id: &str) -> ArticleMaterial {
        ArticleMaterial {
            thumb_media_id: thumb_media_id.to_string(),
            title: self.title,
            content: self.content,
            digest: self.digest,
            show_cover_pic: 0,
        }
    }
}

/// 文章标题，例如 `2024 年已经过去了 50% 啦`
pub fn title_for(year: i32, ratio: f64) -> String {
    format!("{} 年已经过去了 {}% 啦", year, percent(ratio))
}

/// 去掉标签前后的空白
pub fn compress_html(html: &str) -> String {
    TAG_WHITESPACE.replace_all(html, "$1").into_owned()
}

/// 填充 `{{.Body}}`、`{{.Author}}`、`{{.Reference}}` 占位符
pub fn render_template(template: &str, quotation: &Quotation) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "Body" => quotation.body.clone(),
            "Author" => quotation.author.clone(),
            "Reference" => quotation.reference.clone(),
            _ => String::new(),
        })
        .into_owned()
}

/// 文章渲染器
pub struct ArticleRenderer {
    http: reqwest::Client,
    template_path: Option<PathBuf>,
    quotations_url: String,
}

impl ArticleRenderer {
    pub fn new(http: reqwest::Client, template_path: Option<PathBuf>, quotations_url: &str) -> Self {
        Self {
            http,
            template_path,
            quotations_url: quotations_url.to_string(),
        }
    }

    /// 根据年份和进度生成文章
    pub async fn render(&self, year: i32, ratio: f64) -> Result<ArticleDraft> {
        let template = compress_html(&self.load_template()?);
        let quotations = self.fetch_quotations().await?;
        let quotation = quotations
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| anyhow!("名言列表为空"))?;

        let content = render_template(&template, quotation);
        let length = content.chars().count();
        if length > MAX_CONTENT_CHARS {
            return Err(anyhow!(
                "文章正文过长: {} 字，上限 {} 字",
                length,
                MAX_CONTENT_CHARS
            ));
        }

        let draft = ArticleDraft {
            title: title_for(year, ratio),
            digest: quotation.body.chars().take(MAX_DIGEST_CHARS).collect(),
            content,
        };
        debug!(title = %draft.title, "new article");
        Ok(draft)
    }

    fn load_template(&self) -> Result<String> {
        match &self.template_path {
            Some(path) if path.exists() => {
                debug!("read article template from {}", path.display());
                fs::read_to_string(path)
                    .with_context(|| format!("读取文章模板失败: {}", path.display()))
            }
            Some(path) => {
                info!("模板文件 {} 不存在，使用内置模板", path.display());
                Ok(BUILTIN_TEMPLATE.to_string())
            }
            None => Ok(BUILTIN_TEMPLATE.to_string()),
        }
    }

    async fn fetch_quotations(&self) -> Result<Vec<Quotation>> {
        let response = self
            .http
            .get(&self.quotations_url)
            .send()
            .await
            .with_context(|| format!("获取名言列表失败: {}", self.quotations_url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "fetch article options, got http status: {}",
                response.status()
            ));
        }

        response
            .json::<Vec<Quotation>>()
            .await
            .context("解析名言列表失败")
    }
}
