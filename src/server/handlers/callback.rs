//! 公众号服务器回调
//!
//! GET 用于服务器地址校验，POST 接收加密的菜单点击事件并回复本月进度。

use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::server::AppState;
use crate::server::responses::ApiError;
use crate::timeline::{TimelineError, month_progress, percent};
use crate::wechat::crypto::verify_signature;
use crate::wechat::envelope::{decrypt_msg, encrypt_msg, random_nonce};
use crate::wechat::sign;
use crate::wechat::WechatError;
use crate::wechat::xml::{EncryptedReply, TextReply, parse_xml};

/// 菜单 “本月进度” 的 EventKey
pub const MONTH_EVENT_KEY: &str = "month";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallbackQuery {
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
    pub echostr: String,
    pub encrypt_type: String,
    pub msg_signature: Option<String>,
}

/// 点击 “本月进度” 后回复的文字
pub fn month_event_content(now: &DateTime<FixedOffset>) -> Result<String, TimelineError> {
    let ratio = month_progress(now)?;
    Ok(format!("本月已经过去了 {}%。", percent(ratio)))
}

/// 服务器地址校验，原样返回 echostr
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<String, ApiError> {
    if query.echostr.is_empty() {
        return Err(ApiError::bad_request("缺少 echostr 参数"));
    }
    check_signature(&state, &query)?;

    info!("✅ 服务器地址校验通过");
    Ok(format!("{}\n", query.echostr))
}

/// 接收加密消息并回复
pub async fn receive(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    if query.encrypt_type != "aes" {
        return Err(ApiError::bad_request(format!(
            "不支持的 encrypt_type: {:?}",
            query.encrypt_type
        )));
    }
    check_signature(&state, &query)?;

    let outer = parse_xml(&body)?;
    let encrypted = outer
        .get("Encrypt")
        .ok_or_else(|| ApiError::bad_request("消息中缺少 Encrypt 字段"))?;

    if let Some(msg_signature) = &query.msg_signature {
        if !verify_signature(
            msg_signature,
            &state.token,
            &query.timestamp,
            &query.nonce,
            encrypted,
        ) {
            return Err(WechatError::SignatureMismatch.into());
        }
    }

    let envelope =
        decrypt_msg(&state.aes_key, encrypted, &state.app_id).map_err(WechatError::from)?;
    let inner = String::from_utf8(envelope.payload)
        .map_err(|_| ApiError::bad_request("消息内容不是合法的 UTF-8"))?;
    let message = parse_xml(&inner)?;
    debug!(?message, "received message");

    let now = (state.clock)();
    let content = match message.get("EventKey").map(String::as_str) {
        Some(MONTH_EVENT_KEY) => month_event_content(&now)?,
        other => {
            return Err(ApiError::bad_request(format!("未知的 EventKey: {:?}", other)));
        }
    };

    let reply = TextReply {
        to_user_name: message.get("FromUserName").cloned().unwrap_or_default(),
        from_user_name: message.get("ToUserName").cloned().unwrap_or_default(),
        create_time: now.timestamp(),
        content,
    };

    let encrypt = encrypt_msg(
        &state.aes_key,
        &random_nonce(),
        reply.to_xml().as_bytes(),
        &state.app_id,
    )
    .map_err(|e| ApiError::Internal(format!("加密回复失败: {}", e)))?;
    let msg_signature = sign(&state.token, &query.timestamp, &query.nonce, &encrypt);

    let outer = EncryptedReply {
        encrypt,
        msg_signature,
        timestamp: query.timestamp,
        nonce: query.nonce,
    };

    info!("回复本月进度: {}", reply.content);
    Ok(([(CONTENT_TYPE, "application/xml")], format!("{}\n", outer.to_xml())))
}

fn check_signature(state: &AppState, query: &CallbackQuery) -> Result<(), ApiError> {
    if verify_signature(
        &query.signature,
        &state.token,
        &query.timestamp,
        &query.nonce,
        "",
    ) {
        Ok(())
    } else {
        Err(WechatError::SignatureMismatch.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wechat::AesKey;
    use axum::http::StatusCode;
    use axum::response::Response;

    const TOKEN: &str = "tok";
    const APP_ID: &str = "wxTEST";
    const TEST_ENCODED_KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8";

    fn mid_january() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-01-16T00:00:00+08:00").unwrap()
    }

    fn state() -> Arc<AppState> {
        Arc::new(AppState {
            token: TOKEN.to_string(),
            app_id: APP_ID.to_string(),
            aes_key: AesKey::from_encoded(TEST_ENCODED_KEY).unwrap(),
            clock: mid_january,
        })
    }

    fn signed_query(timestamp: &str, nonce: &str) -> CallbackQuery {
        CallbackQuery {
            signature: sign(TOKEN, timestamp, nonce, ""),
            timestamp: timestamp.to_string(),
            nonce: nonce.to_string(),
            encrypt_type: "aes".to_string(),
            ..Default::default()
        }
    }

    fn encrypted_event(event_key: &str) -> String {
        let inner = format!(
            "<xml><ToUserName><![CDATA[gh_server]]></ToUserName><FromUserName><![CDATA[oUser]]></FromUserName><CreateTime>1700000000</CreateTime><MsgType><![CDATA[event]]></MsgType><Event><![CDATA[CLICK]]></Event><EventKey><![CDATA[{}]]></EventKey></xml>",
            event_key
        );
        let key = AesKey::from_encoded(TEST_ENCODED_KEY).unwrap();
        encrypt_msg(&key, b"0123456789abcdef", inner.as_bytes(), APP_ID).unwrap()
    }

    async fn into_body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_month_event_content() {
        assert_eq!(
            month_event_content(&mid_january()).unwrap(),
            "本月已经过去了 48%。"
        );
    }

    #[tokio::test]
    async fn test_verify_echoes_echostr() {
        let mut query = signed_query("1", "abc");
        query.echostr = "hello".to_string();

        let body = verify(State(state()), Query(query)).await.unwrap();
        assert_eq!(body, "hello\n");
    }

    #[tokio::test]
    async fn test_verify_rejects_bad_signature() {
        let mut query = signed_query("1", "abc");
        query.echostr = "hello".to_string();
        query.signature = "0".repeat(40);

        let err = verify(State(state()), Query(query)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_verify_requires_echostr() {
        let err = verify(State(state()), Query(signed_query("1", "abc")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_receive_month_event() {
        let encrypt = encrypted_event("month");
        let body = format!("<xml><ToUserName><![CDATA[gh_server]]></ToUserName><Encrypt><![CDATA[{}]]></Encrypt></xml>", encrypt);
        let mut query = signed_query("1700000000", "n0nce");
        query.msg_signature = Some(sign(TOKEN, "1700000000", "n0nce", &encrypt));

        let response = receive(State(state()), Query(query), body)
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let reply = parse_xml(into_body(response).await.trim_end()).unwrap();
        assert_eq!(reply["TimeStamp"], "1700000000");
        assert_eq!(reply["Nonce"], "n0nce");
        assert_eq!(
            reply["MsgSignature"],
            sign(TOKEN, "1700000000", "n0nce", &reply["Encrypt"])
        );

        let key = AesKey::from_encoded(TEST_ENCODED_KEY).unwrap();
        let envelope = decrypt_msg(&key, &reply["Encrypt"], APP_ID).unwrap();
        let text = parse_xml(std::str::from_utf8(&envelope.payload).unwrap()).unwrap();
        assert_eq!(text["Content"], "本月已经过去了 48%。");
        assert_eq!(text["ToUserName"], "oUser");
        assert_eq!(text["FromUserName"], "gh_server");
        assert_eq!(text["MsgType"], "text");
        assert_eq!(text["CreateTime"], mid_january().timestamp().to_string());
        assert!(envelope.random.iter().all(u8::is_ascii_alphanumeric));
    }

    #[tokio::test]
    async fn test_receive_rejects_plaintext_mode() {
        let mut query = signed_query("1", "abc");
        query.encrypt_type = "raw".to_string();

        let err = receive(State(state()), Query(query), "<xml></xml>".to_string())
            .await
            .err()
            .unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_receive_rejects_wrong_msg_signature() {
        let encrypt = encrypted_event("month");
        let body = format!("<xml><Encrypt><![CDATA[{}]]></Encrypt></xml>", encrypt);
        let mut query = signed_query("1", "abc");
        query.msg_signature = Some("0".repeat(40));

        let err = receive(State(state()), Query(query), body).await.err().unwrap();
        assert!(matches!(err, ApiError::Wechat(WechatError::SignatureMismatch)));
    }

    #[tokio::test]
    async fn test_receive_rejects_unknown_event_key() {
        let body = format!(
            "<xml><Encrypt><![CDATA[{}]]></Encrypt></xml>",
            encrypted_event("year")
        );

        let err = receive(State(state()), Query(signed_query("1", "abc")), body)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_receive_rejects_broken_xml() {
        let err = receive(
            State(state()),
            Query(signed_query("1", "abc")),
            "<xml><Encrypt>".to_string(),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_receive_rejects_foreign_app_id() {
        let key = AesKey::from_encoded(TEST_ENCODED_KEY).unwrap();
        let encrypt = encrypt_msg(&key, b"0123456789abcdef", b"<xml></xml>", "wxOTHER").unwrap();
        let body = format!("<xml><Encrypt><![CDATA[{}]]></Encrypt></xml>", encrypt);

        let err = receive(State(state()), Query(signed_query("1", "abc")), body)
            .await
            .err()
            .unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
