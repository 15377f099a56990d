use serde_json::{Value, json};

use super::{YouTubeClient, common::client_block};

const CLIENT_NAME: &str = "WEB_EMBEDDED_PLAYER";
const CLIENT_ID: &str = "56";
const CLIENT_VERSION: &str = "1.20240723.01.00";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36";

/// Embedded web player, used when the primary identity is refused as unplayable.
pub struct WebEmbeddedClient;

impl YouTubeClient for WebEmbeddedClient {
    fn name(&self) -> &'static str {
        "WEB_EMBEDDED"
    }
    fn client_name(&self) -> &'static str {
        CLIENT_NAME
    }
    fn client_id(&self) -> &'static str {
        CLIENT_ID
    }
    fn client_version(&self) -> &'static str {
        CLIENT_VERSION
    }
    fn user_agent(&self) -> &'static str {
        USER_AGENT
    }

    fn build_context(&self, lang: &str) -> Value {
        json!({ "client": client_block(CLIENT_NAME, CLIENT_VERSION, lang) })
    }
}
