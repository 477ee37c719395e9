use anyhow::{Context, Result, anyhow};
use chrono::NaiveTime;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::wechat::api::WECHAT_API_BASE;
use crate::wechat::{AesKey, AppCredential};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub server: ServerConfig,
    pub wechat: WechatConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub article: ArticleConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppSection {
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WechatConfig {
    pub app_id: String,
    pub app_secret: String,
    pub token: String,
    pub aes_key: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_tag_id")]
    pub tag_id: i64,
    #[serde(default)]
    pub is_to_all: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    /// 每天执行的北京时间
    #[serde(default = "default_schedule_time")]
    pub time: NaiveTime,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ArticleConfig {
    #[serde(default = "default_template")]
    pub template: PathBuf,
    #[serde(default = "default_quotations_url")]
    pub quotations_url: String,
}

impl AppConfig {
    /// 读取并校验配置文件，默认为当前目录下的 `config.toml`
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = config_path.unwrap_or_else(|| Path::new("config.toml"));
        let raw = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let cfg = Self::from_toml(&raw)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 缺少凭证或 aesKey 不合法都视为致命错误
    pub fn validate(&self) -> Result<()> {
        let wechat = &self.wechat;
        if wechat.app_id.trim().is_empty() {
            return Err(anyhow!("wechat.appId 不能为空"));
        }
        if wechat.app_secret.trim().is_empty() {
            return Err(anyhow!("wechat.appSecret 不能为空"));
        }
        if wechat.token.trim().is_empty() {
            return Err(anyhow!("wechat.token 不能为空"));
        }
        wechat.aes_key()?;
        Ok(())
    }
}

impl WechatConfig {
    pub fn credential(&self) -> AppCredential {
        AppCredential {
            app_id: self.app_id.clone(),
            app_secret: self.app_secret.clone(),
        }
    }

    pub fn aes_key(&self) -> Result<AesKey> {
        AesKey::from_encoded(&self.aes_key).map_err(|e| anyhow!("wechat.aesKey 无效: {}", e))
    }
}

impl std::fmt::Debug for WechatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WechatConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"***")
            .field("token", &"***")
            .field("aes_key", &"***")
            .field("api_base_url", &self.api_base_url)
            .field("tag_id", &self.tag_id)
            .field("is_to_all", &self.is_to_all)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            time: default_schedule_time(),
        }
    }
}

impl Default for ArticleConfig {
    fn default() -> Self {
        Self {
            template: default_template(),
            quotations_url: default_quotations_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_api_base_url() -> String {
    WECHAT_API_BASE.to_string()
}

fn default_tag_id() -> i64 {
    2
}

fn default_schedule_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 41, 0).unwrap_or_default()
}

fn default_template() -> PathBuf {
    PathBuf::from("article_template.html")
}

fn default_quotations_url() -> String {
    "https://raw.githubusercontent.com/sqrthree/progressbar201X/quotations/main.json".to_string()
}
