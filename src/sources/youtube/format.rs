use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static LIVE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsource[/=]yt_live_broadcast\b").expect("static live pattern"));
static HLS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/manifest/hls_(variant|playlist)/").expect("static hls pattern"));
static DASH_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/manifest/dash/").expect("static dash pattern"));

const HLS_MIME_MARKERS: &[&str] = &["hls", "x-mpegURL", "application/vnd.apple.mpegurl"];

/// Raw rendition record from the player API `streamingData`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    #[serde(default)]
    pub itag: u32,
    pub url: Option<String>,
    pub mime_type: Option<String>,
    pub bitrate: Option<u64>,
    pub average_bitrate: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub quality_label: Option<String>,
    pub audio_quality: Option<String>,
    pub audio_sample_rate: Option<String>,
    pub audio_channels: Option<u32>,
    pub content_length: Option<String>,
    pub approx_duration_ms: Option<String>,
    pub signature_cipher: Option<String>,
    pub cipher: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StreamDescriptor {
    /// Muxed formats followed by adaptive ones.
    pub fn from_response(response: &Value) -> Vec<Self> {
        let Some(streaming) = response.get("streamingData") else {
            return Vec::new();
        };

        ["formats", "adaptiveFormats"]
            .iter()
            .filter_map(|key| streaming.get(key).and_then(|v| v.as_array()))
            .flatten()
            .filter_map(|raw| match serde_json::from_value(raw.clone()) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    tracing::debug!("skipping unparseable stream descriptor: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// A descriptor with a resolvable URL and derived metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedFormat {
    pub itag: u32,
    pub url: String,
    pub mime_type: String,
    pub bitrate: Option<u64>,
    pub average_bitrate: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub quality_label: Option<String>,
    pub audio_quality: Option<String>,
    pub audio_sample_rate: Option<String>,
    pub audio_channels: Option<u32>,
    pub content_length: Option<String>,
    pub approx_duration_ms: Option<String>,

    pub container: Option<String>,
    pub codecs: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub has_video: bool,
    pub has_audio: bool,
    /// Kilobits per second.
    pub audio_bitrate: Option<u32>,
    pub is_live: bool,
    #[serde(rename = "isHLS")]
    pub is_hls: bool,
    #[serde(rename = "isDashMPD")]
    pub is_dash_mpd: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Audio bitrate (kbps) of well-known itags.
pub fn itag_audio_bitrate(itag: u32) -> Option<u32> {
    match itag {
        5 | 6 => Some(64),
        17 => Some(24),
        18 => Some(96),
        22 => Some(192),
        36 => Some(38),
        43 => Some(128),
        139 => Some(48),
        140 => Some(128),
        141 => Some(256),
        171 => Some(128),
        172 => Some(192),
        249 => Some(48),
        250 => Some(64),
        251 => Some(160),
        _ => None,
    }
}

/// Enriches a descriptor with container, codec and manifest metadata.
///
/// Returns `None` when the url or the MIME type is missing.
pub fn add_format_meta(descriptor: StreamDescriptor, url: String) -> Option<ResolvedFormat> {
    let mime_type = descriptor.mime_type.filter(|m| !m.is_empty())?;
    if url.is_empty() {
        return None;
    }

    let container = mime_type
        .split(';')
        .next()
        .and_then(|m| m.split('/').nth(1))
        .map(|c| c.trim().to_string());
    let codecs = mime_type
        .split_once("codecs=\"")
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(codecs, _)| codecs.to_string());

    let audio_bitrate = itag_audio_bitrate(descriptor.itag);
    let has_video = descriptor.quality_label.is_some() || mime_type.starts_with("video/");
    let has_audio = audio_bitrate.is_some()
        || descriptor.audio_quality.is_some()
        || mime_type.starts_with("audio/");

    let parts: Vec<&str> = codecs
        .as_deref()
        .map(|c| c.split(',').map(str::trim).filter(|c| !c.is_empty()).collect())
        .unwrap_or_default();
    let video_codec = has_video.then(|| parts.first()).flatten().map(|c| c.to_string());
    let audio_codec = has_audio.then(|| parts.last()).flatten().map(|c| c.to_string());

    Some(ResolvedFormat {
        itag: descriptor.itag,
        is_live: LIVE_URL.is_match(&url),
        is_hls: HLS_URL.is_match(&url),
        is_dash_mpd: DASH_URL.is_match(&url),
        url,
        mime_type,
        bitrate: descriptor.bitrate,
        average_bitrate: descriptor.average_bitrate,
        width: descriptor.width,
        height: descriptor.height,
        fps: descriptor.fps,
        quality_label: descriptor.quality_label,
        audio_quality: descriptor.audio_quality,
        audio_sample_rate: descriptor.audio_sample_rate,
        audio_channels: descriptor.audio_channels,
        content_length: descriptor.content_length,
        approx_duration_ms: descriptor.approx_duration_ms,
        container,
        codecs,
        video_codec,
        audio_codec,
        has_video,
        has_audio,
        audio_bitrate,
        extra: descriptor.extra,
    })
}

fn estimate_audio_bitrate(format: &ResolvedFormat) -> Option<u32> {
    let by_quality = format.audio_quality.as_deref().and_then(|q| {
        match q.trim_start_matches("AUDIO_QUALITY_") {
            "ULTRALOW" => Some(32),
            "LOW" => Some(64),
            "MEDIUM" => Some(128),
            "HIGH" => Some(256),
            _ => None,
        }
    });

    by_quality.or_else(|| {
        if format.has_video {
            return None;
        }
        format
            .bitrate
            .filter(|b| *b > 0)
            .map(|b| u32::try_from(b / 1000).unwrap_or(u32::MAX))
    })
}

/// Turns deciphered descriptors into the final format records.
///
/// Drops records lacking a url or MIME type, fills in missing audio bitrates
/// and flags HLS formats recognizable from their MIME type.
pub fn normalize(resolved: Vec<(StreamDescriptor, String)>) -> Vec<ResolvedFormat> {
    resolved
        .into_iter()
        .filter_map(|(descriptor, url)| add_format_meta(descriptor, url))
        .map(|mut format| {
            if format.audio_bitrate.is_none() && format.has_audio {
                format.audio_bitrate = estimate_audio_bitrate(&format);
            }
            if !format.is_hls && HLS_MIME_MARKERS.iter().any(|m| format.mime_type.contains(m)) {
                format.is_hls = true;
            }
            format
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn descriptor(itag: u32, mime: &str) -> StreamDescriptor {
        StreamDescriptor {
            itag,
            mime_type: Some(mime.to_string()),
            ..StreamDescriptor::default()
        }
    }

    #[test]
    fn test_from_response_keeps_order_and_unknown_fields() {
        let response = json!({
            "streamingData": {
                "formats": [{ "itag": 18, "mimeType": "video/mp4", "projectionType": "RECTANGULAR" }],
                "adaptiveFormats": [
                    { "itag": 251, "mimeType": "audio/webm", "bitrate": 150000 },
                    { "itag": "broken" }
                ]
            }
        });

        let descriptors = StreamDescriptor::from_response(&response);
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].itag, 18);
        assert_eq!(descriptors[0].extra["projectionType"], "RECTANGULAR");
        assert_eq!(descriptors[1].bitrate, Some(150_000));
        assert!(StreamDescriptor::from_response(&json!({})).is_empty());
    }

    #[test]
    fn test_format_meta_for_muxed_mp4() {
        let mut raw = descriptor(18, "video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"");
        raw.quality_label = Some("360p".to_string());

        let format =
            add_format_meta(raw, "https://a.test/videoplayback?itag=18".to_string()).unwrap();
        assert_eq!(format.container.as_deref(), Some("mp4"));
        assert_eq!(format.codecs.as_deref(), Some("avc1.42001E, mp4a.40.2"));
        assert_eq!(format.video_codec.as_deref(), Some("avc1.42001E"));
        assert_eq!(format.audio_codec.as_deref(), Some("mp4a.40.2"));
        assert!(format.has_video && format.has_audio);
        assert_eq!(format.audio_bitrate, Some(96));
        assert!(!format.is_live && !format.is_hls && !format.is_dash_mpd);
    }

    #[test]
    fn test_manifest_and_live_detection() {
        let format = add_format_meta(
            descriptor(95, "video/ts"),
            "https://manifest.googlevideo.com/api/manifest/hls_playlist/source/yt_live_broadcast/id/x".to_string(),
        )
        .unwrap();
        assert!(format.is_live);
        assert!(format.is_hls);
    }

    #[test]
    fn test_missing_url_or_mime_is_dropped() {
        assert!(
            add_format_meta(StreamDescriptor::default(), "https://a.test".to_string()).is_none()
        );
        assert!(add_format_meta(descriptor(18, "video/mp4"), String::new()).is_none());
    }

    #[test]
    fn test_normalize_estimates_and_flags() {
        let mut by_quality = descriptor(600, "audio/webm; codecs=\"opus\"");
        by_quality.audio_quality = Some("AUDIO_QUALITY_LOW".to_string());
        let mut by_bitrate = descriptor(601, "audio/mp4; codecs=\"mp4a.40.5\"");
        by_bitrate.bitrate = Some(48_500);
        let hls = descriptor(602, "application/x-mpegURL");

        let formats = normalize(vec![
            (by_quality, "https://a.test/1".to_string()),
            (by_bitrate, "https://a.test/2".to_string()),
            (hls, "https://a.test/3".to_string()),
            (StreamDescriptor::default(), "https://a.test/4".to_string()),
        ]);

        assert_eq!(formats.len(), 3);
        assert_eq!(formats[0].audio_bitrate, Some(64));
        assert_eq!(formats[1].audio_bitrate, Some(48));
        assert!(formats[2].is_hls);
        assert!(!formats[2].has_audio);
    }

    #[test]
    fn test_resolved_format_serializes_camel_case() {
        let format =
            add_format_meta(descriptor(140, "audio/mp4"), "https://a.test".to_string()).unwrap();
        let value = serde_json::to_value(&format).unwrap();
        assert_eq!(value["mimeType"], "audio/mp4");
        assert_eq!(value["hasAudio"], true);
        assert_eq!(value["isHLS"], false);
        assert_eq!(value["audioBitrate"], 128);
    }
}
