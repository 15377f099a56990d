pub mod android;
pub mod common;
pub mod ios;
pub mod negotiator;
pub mod tv;
pub mod web_embedded;

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Value, json};

pub use negotiator::{NegotiationOutcome, Negotiator, PlayerRequest};

/// A spoofed client profile sent as the request context of the player API.
pub trait YouTubeClient: Send + Sync {
    fn name(&self) -> &'static str;
    fn client_name(&self) -> &'static str;
    /// Numeric id sent in `X-YouTube-Client-Name`.
    fn client_id(&self) -> &'static str;
    fn client_version(&self) -> &'static str;
    fn user_agent(&self) -> &'static str;

    fn build_context(&self, lang: &str) -> Value;
}

pub fn create_client(name: &str) -> Option<Arc<dyn YouTubeClient>> {
    match name.to_ascii_uppercase().as_str() {
        "TV" | "TVHTML5" => Some(Arc::new(tv::TvClient)),
        "WEB_EMBEDDED" | "WEB_EMBEDDED_PLAYER" => Some(Arc::new(web_embedded::WebEmbeddedClient)),
        "ANDROID" => Some(Arc::new(android::AndroidClient)),
        "IOS" => Some(Arc::new(ios::IosClient)),
        _ => None,
    }
}

static SIGNATURE_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:signatureTimestamp|sts):(\d+)").expect("static sts pattern"));

/// Negotiation payload tied to one player script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackContext {
    pub signature_timestamp: Option<u32>,
}

impl PlaybackContext {
    pub fn from_player_script(body: &str) -> Self {
        let signature_timestamp = SIGNATURE_TIMESTAMP
            .captures(body)
            .and_then(|caps| caps[1].parse().ok());

        if signature_timestamp.is_none() {
            tracing::warn!("player script carries no signature timestamp");
        }

        Self { signature_timestamp }
    }

    pub fn to_json(&self) -> Value {
        let mut content = json!({ "html5Preference": "HTML5_PREF_WANTS" });
        if let (Some(sts), Some(obj)) = (self.signature_timestamp, content.as_object_mut()) {
            obj.insert("signatureTimestamp".to_string(), sts.into());
        }

        json!({ "contentPlaybackContext": content })
    }
}
