use serde_json::{Value, json};

use super::{YouTubeClient, common::client_block};

const CLIENT_NAME: &str = "IOS";
const CLIENT_ID: &str = "5";
const CLIENT_VERSION: &str = "19.45.4";
const DEVICE_MODEL: &str = "iPhone16,2";
const OS_VERSION: &str = "17.5.1.21F90";
const USER_AGENT: &str =
    "com.google.ios.youtube/19.45.4 (iPhone16,2; U; CPU iOS 17_5_1 like Mac OS X; en_US)";

pub struct IosClient;

impl YouTubeClient for IosClient {
    fn name(&self) -> &'static str {
        "IOS"
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

    /// Build the InnerTube context block for an iPhone device.
    fn build_context(&self, lang: &str) -> Value {
        let mut client = client_block(CLIENT_NAME, CLIENT_VERSION, lang);
        if let Some(obj) = client.as_object_mut() {
            obj.insert("deviceMake".to_string(), "Apple".into());
            obj.insert("deviceModel".to_string(), DEVICE_MODEL.into());
            obj.insert("osName".to_string(), "iPhone".into());
            obj.insert("osVersion".to_string(), OS_VERSION.into());
            obj.insert("userAgent".to_string(), USER_AGENT.into());
        }

        json!({ "client": client })
    }
}
