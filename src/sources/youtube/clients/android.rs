use serde_json::{Value, json};

use super::{YouTubeClient, common::client_block};

const CLIENT_NAME: &str = "ANDROID";
const CLIENT_ID: &str = "3";
const CLIENT_VERSION: &str = "19.44.38";
const OS_VERSION: &str = "11";
const SDK_VERSION: u32 = 30;
const USER_AGENT: &str = "com.google.android.youtube/19.44.38 (Linux; U; Android 11) gzip";

pub struct AndroidClient;

impl YouTubeClient for AndroidClient {
    fn name(&self) -> &'static str {
        "ANDROID"
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
        let mut client = client_block(CLIENT_NAME, CLIENT_VERSION, lang);
        if let Some(obj) = client.as_object_mut() {
            obj.insert("osName".to_string(), "Android".into());
            obj.insert("osVersion".to_string(), OS_VERSION.into());
            obj.insert("androidSdkVersion".to_string(), SDK_VERSION.into());
            obj.insert("userAgent".to_string(), USER_AGENT.into());
        }

        json!({ "client": client })
    }
}
