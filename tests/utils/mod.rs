use progressbar::app::AppConfig;
use progressbar::server::{AppState, Server};

pub const TOKEN: &str = "tok";
pub const APP_ID: &str = "wxTEST";
pub const ENCODED_KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8";

pub fn test_config() -> AppConfig {
    let raw = format!(
        r#"
        [server]
        host = "127.0.0.1"
        port = 0

        [wechat]
        appId = "{APP_ID}"
        appSecret = "SECRET"
        token = "{TOKEN}"
        aesKey = "{ENCODED_KEY}"
        "#
    );
    AppConfig::from_toml(&raw).unwrap()
}

pub async fn spawn_server() -> String {
    let config = test_config();
    let state = AppState::from_config(&config.wechat).unwrap();

    let server = Server::new(&config.server, state).await.unwrap();

    let port = server.port();
    tokio::spawn(server.run());

    format!("http://{}:{}", config.server.host, port)
}
