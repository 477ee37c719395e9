use serde::{Deserialize, Serialize};

use crate::wechat::error::WechatError;

/// 所有接口返回中都可能出现的全局错误码
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformStatus {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
}

impl PlatformStatus {
    pub fn into_result(self) -> Result<(), WechatError> {
        if self.errcode != 0 {
            return Err(WechatError::Platform {
                code: self.errcode,
                msg: self.errmsg,
            });
        }
        Ok(())
    }
}

/// `/cgi-bin/token` 的返回
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}

/// 永久素材
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub media_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub update_time: i64,
    #[serde(default)]
    pub url: String,
}

/// `batchget_material` 请求体
#[derive(Debug, Clone, Serialize)]
pub struct BatchGetMaterialRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub offset: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchGetMaterialResponse {
    #[serde(default)]
    pub total_count: u32,
    #[serde(default)]
    pub item_count: u32,
    #[serde(default)]
    pub item: Vec<Material>,
}

/// 图文素材中的一篇文章
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleMaterial {
    pub thumb_media_id: String,
    pub title: String,
    pub content: String,
    pub digest: String,
    pub show_cover_pic: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddNewsRequest<'a> {
    pub articles: Vec<&'a ArticleMaterial>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddNewsResponse {
    pub media_id: String,
}

/// 群发筛选条件
#[derive(Debug, Clone, Serialize)]
pub struct MassFilter {
    pub is_to_all: bool,
    pub tag_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaRef<'a> {
    pub media_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendAllRequest<'a> {
    pub filter: MassFilter,
    pub mpnews: MediaRef<'a>,
    pub msgtype: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendAllResponse {
    #[serde(default)]
    pub msg_id: i64,
    #[serde(default)]
    pub msg_data_id: i64,
}
