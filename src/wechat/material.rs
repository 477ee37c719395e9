use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::wechat::api::ApiClient;
use crate::wechat::error::{Result, WechatError};
use crate::wechat::models::{
    AddNewsRequest, AddNewsResponse, ArticleMaterial, BatchGetMaterialRequest,
    BatchGetMaterialResponse, MassFilter, Material, MediaRef, SendAllRequest, SendAllResponse,
};

const BATCHGET_MATERIAL_PATH: &str = "/cgi-bin/material/batchget_material";
const ADD_NEWS_PATH: &str = "/cgi-bin/material/add_news";
const MASS_SENDALL_PATH: &str = "/cgi-bin/message/mass/sendall";

/// 每次拉取的图片素材数量
const IMAGE_PAGE_SIZE: u32 = 20;

/// 获取前 20 个图片素材
pub async fn fetch_image_materials(client: &ApiClient) -> Result<Vec<Material>> {
    let request = BatchGetMaterialRequest {
        kind: "image",
        offset: 0,
        count: IMAGE_PAGE_SIZE,
    };

    let response: BatchGetMaterialResponse = client.post(BATCHGET_MATERIAL_PATH, &request).await?;
    debug!(
        "图片素材共 {} 个，本次返回 {} 个",
        response.total_count, response.item_count
    );
    Ok(response.item)
}

/// 随机挑选一张图片素材作为封面
pub async fn random_image_material(client: &ApiClient) -> Result<Material> {
    let materials = fetch_image_materials(client).await?;
    let material = materials
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or(WechatError::NoImageMaterials)?;

    debug!("从 {} 个素材中选中 {}", materials.len(), material.media_id);
    Ok(material)
}

/// 上传单篇图文素材，返回 media_id
pub async fn upload_article_material(client: &ApiClient, article: &ArticleMaterial) -> Result<String> {
    info!(
        thumb_media_id = %article.thumb_media_id,
        title = %article.title,
        "create new article"
    );

    let request = AddNewsRequest {
        articles: vec![article],
    };
    let response: AddNewsResponse = client.post(ADD_NEWS_PATH, &request).await?;
    Ok(response.media_id)
}

/// 按标签群发图文消息
pub async fn mass_send_article(
    client: &ApiClient,
    media_id: &str,
    filter: MassFilter,
) -> Result<SendAllResponse> {
    let request = SendAllRequest {
        filter,
        mpnews: MediaRef { media_id },
        msgtype: "mpnews",
    };

    let response: SendAllResponse = client.post(MASS_SENDALL_PATH, &request).await?;
    info!(
        "群发任务已提交，msg_id: {}, msg_data_id: {}",
        response.msg_id, response.msg_data_id
    );
    Ok(response)
}
