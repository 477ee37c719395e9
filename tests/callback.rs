mod utils;

use progressbar::wechat::envelope::{decrypt_msg, encrypt_msg};
use progressbar::wechat::xml::parse_xml;
use progressbar::wechat::{AesKey, sign};
use reqwest::{Client, StatusCode};

use utils::{APP_ID, ENCODED_KEY, TOKEN};

fn month_click_body(encrypt: &str) -> String {
    format!(
        "<xml><ToUserName><![CDATA[gh_server]]></ToUserName><Encrypt><![CDATA[{}]]></Encrypt></xml>",
        encrypt
    )
}

fn encrypted_click(event_key: &str) -> String {
    let inner = format!(
        "<xml><ToUserName><![CDATA[gh_server]]></ToUserName><FromUserName><![CDATA[oUser]]></FromUserName><CreateTime>1700000000</CreateTime><MsgType><![CDATA[event]]></MsgType><Event><![CDATA[CLICK]]></Event><EventKey><![CDATA[{}]]></EventKey></xml>",
        event_key
    );
    let key = AesKey::from_encoded(ENCODED_KEY).unwrap();
    encrypt_msg(&key, b"ABCDEFGHIJKLMNOP", inner.as_bytes(), APP_ID).unwrap()
}

#[tokio::test]
async fn test_handshake_echoes_echostr() {
    let addr = utils::spawn_server().await;
    let client = Client::new();

    let signature = sign(TOKEN, "1", "abc", "");
    let response = client
        .get(format!(
            "{addr}/?signature={signature}&timestamp=1&nonce=abc&echostr=hello"
        ))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "hello\n");
}

#[tokio::test]
async fn test_handshake_rejects_bad_signature() {
    let addr = utils::spawn_server().await;
    let client = Client::new();

    let response = client
        .get(format!(
            "{addr}/?signature=deadbeef&timestamp=1&nonce=abc&echostr=hello"
        ))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_month_click_gets_encrypted_reply() {
    let addr = utils::spawn_server().await;
    let client = Client::new();

    let encrypt = encrypted_click("month");
    let signature = sign(TOKEN, "1700000000", "n0nce", "");
    let msg_signature = sign(TOKEN, "1700000000", "n0nce", &encrypt);

    let response = client
        .post(format!(
            "{addr}/?signature={signature}&timestamp=1700000000&nonce=n0nce&encrypt_type=aes&msg_signature={msg_signature}"
        ))
        .body(month_click_body(&encrypt))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    let outer = parse_xml(body.trim_end()).unwrap();
    assert_eq!(
        outer["MsgSignature"],
        sign(TOKEN, "1700000000", "n0nce", &outer["Encrypt"])
    );

    let key = AesKey::from_encoded(ENCODED_KEY).unwrap();
    let envelope = decrypt_msg(&key, &outer["Encrypt"], APP_ID).unwrap();
    assert_eq!(envelope.app_id, APP_ID);

    let reply = parse_xml(std::str::from_utf8(&envelope.payload).unwrap()).unwrap();
    assert!(
        reply["Content"].starts_with("本月已经过去了 "),
        "实际回复: {}",
        reply["Content"]
    );
    assert!(reply["Content"].ends_with("%。"));
    assert_eq!(reply["ToUserName"], "oUser");
}

#[tokio::test]
async fn test_post_requires_aes_mode() {
    let addr = utils::spawn_server().await;
    let client = Client::new();

    let signature = sign(TOKEN, "1", "abc", "");
    let response = client
        .post(format!(
            "{addr}/?signature={signature}&timestamp=1&nonce=abc&encrypt_type=raw"
        ))
        .body(month_click_body(&encrypted_click("month")))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_event_key_is_rejected() {
    let addr = utils::spawn_server().await;
    let client = Client::new();

    let signature = sign(TOKEN, "1", "abc", "");
    let response = client
        .post(format!(
            "{addr}/?signature={signature}&timestamp=1&nonce=abc&encrypt_type=aes"
        ))
        .body(month_click_body(&encrypted_click("unknown")))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
