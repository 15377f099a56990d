use serde_json::{Value, json};

use super::YouTubeClient;
use crate::common::{
    errors::Result,
    http::{HttpRequest, RequestOptions},
    types::{PlaybackNonce, SessionToken},
};

/// YouTube InnerTube API base endpoint (googleapis is more stable and avoids
/// some geo-restrictions that www.youtube.com may impose).
pub const INNERTUBE_API: &str = "https://youtubei.googleapis.com";

pub const NONCE_LENGTH: usize = 12;

/// Client block shared by every identity: locale pinned to UTC.
pub fn client_block(name: &str, version: &str, lang: &str) -> Value {
    json!({
        "clientName": name,
        "clientVersion": version,
        "hl": lang,
        "timeZone": "UTC",
        "utcOffsetMinutes": 0
    })
}

/// Player endpoint URL carrying a fresh playback nonce.
pub fn player_url(video_id: &str) -> String {
    format!(
        "{}/youtubei/v1/player?prettyPrint=false&t={}&id={}",
        INNERTUBE_API,
        PlaybackNonce::generate(NONCE_LENGTH),
        urlencoding::encode(video_id)
    )
}

/// Player API request for one identity. A user agent set in `options` takes
/// precedence over the identity's own.
pub fn player_request(
    video_id: &str,
    payload: &Value,
    client: &dyn YouTubeClient,
    visitor: Option<&SessionToken>,
    options: &RequestOptions,
) -> Result<HttpRequest> {
    let mut req = HttpRequest::post_json(player_url(video_id), payload, options)?
        .header("User-Agent", client.user_agent())
        .header("X-Goog-Api-Format-Version", "2")
        .header("X-YouTube-Client-Name", client.client_id())
        .header("X-YouTube-Client-Version", client.client_version());

    if let Some(visitor) = visitor {
        req = req.header("X-Goog-Visitor-Id", visitor.0.as_str());
    }

    Ok(req)
}

/// Components of a `signatureCipher` / `cipher` query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureCipher {
    pub url: String,
    pub s: String,
    /// Query parameter receiving the descrambled signature.
    pub sp: String,
}

/// Decode a `signatureCipher` / `cipher` query string into its parts.
pub fn decode_signature_cipher(cipher_str: &str) -> Option<SignatureCipher> {
    let mut url = None;
    let mut sig = None;
    let mut sp = None;

    for part in cipher_str.split('&') {
        if let Some((k, v)) = part.split_once('=') {
            let decoded = urlencoding::decode(v).ok()?.to_string();
            match k {
                "url" => url = Some(decoded),
                "s" => sig = Some(decoded),
                "sp" => sp = Some(decoded),
                _ => {}
            }
        }
    }

    match (url, sig) {
        (Some(url), Some(s)) => Some(SignatureCipher {
            url,
            s,
            sp: sp.unwrap_or_else(|| "signature".to_string()),
        }),
        _ => None,
    }
}

/// Visitor data advertised by a player response or initial data blob.
pub fn visitor_data(blob: &Value) -> Option<String> {
    blob.get("responseContext")?
        .get("serviceTrackingParams")?
        .as_array()?
        .iter()
        .filter(|p| p.get("service").and_then(|s| s.as_str()) == Some("GFEEDBACK"))
        .filter_map(|p| p.get("params").and_then(|v| v.as_array()))
        .flatten()
        .find(|p| p.get("key").and_then(|k| k.as_str()) == Some("visitor_data"))
        .and_then(|p| p.get("value"))
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
