use serde_json::{Value, json};

use super::{YouTubeClient, common::client_block};

const CLIENT_NAME: &str = "TVHTML5";
const CLIENT_ID: &str = "7";
const CLIENT_VERSION: &str = "7.20240724.13.00";
const USER_AGENT: &str = "Mozilla/5.0 (SmartHub; SMART-TV; U; Linux/SmartTV; Maple2012) \
     AppleWebKit/534.7 (KHTML, like Gecko) SmartTV Safari/534.7";

/// Television profile, the primary identity of the negotiation.
pub struct TvClient;

impl YouTubeClient for TvClient {
    fn name(&self) -> &'static str {
        "TV"
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
