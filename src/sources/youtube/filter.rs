use std::{cmp::Ordering, fmt, str::FromStr, sync::Arc};

use super::format::ResolvedFormat;
use crate::common::errors::{ResolveError, Result};

pub type Predicate = Arc<dyn Fn(&ResolvedFormat) -> bool + Send + Sync>;
pub type Comparator = Arc<dyn Fn(&ResolvedFormat, &ResolvedFormat) -> Ordering + Send + Sync>;

/// Format selector: a named preset or an arbitrary predicate.
#[derive(Clone)]
pub enum FormatFilter {
    Video,
    Audio,
    VideoOnly,
    AudioOnly,
    VideoAndAudio,
    BestVideo,
    BestAudio,
    LowestVideo,
    LowestAudio,
    /// Formats whose url contains `.<ext>`.
    Extension(String),
    Custom(Predicate),
}

impl FormatFilter {
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&ResolvedFormat) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    fn matches(&self, format: &ResolvedFormat) -> bool {
        let mime = format.mime_type.as_str();
        let video = mime.contains("video");
        let audio = mime.contains("audio");

        match self {
            Self::Video | Self::BestVideo | Self::LowestVideo => video,
            Self::Audio | Self::BestAudio | Self::LowestAudio => audio,
            Self::VideoOnly => video && !audio,
            Self::AudioOnly => audio && !video,
            Self::VideoAndAudio => video && audio,
            Self::Extension(ext) => format.url.contains(&format!(".{}", ext)),
            Self::Custom(predicate) => predicate(format),
        }
    }

    /// Best-first ordering for the single-winner presets.
    fn default_order(&self) -> Option<fn(&ResolvedFormat, &ResolvedFormat) -> Ordering> {
        match self {
            Self::BestVideo => Some(|a, b| {
                width(b).cmp(&width(a)).then_with(|| bitrate(b).cmp(&bitrate(a)))
            }),
            Self::BestAudio => Some(|a, b| bitrate(b).cmp(&bitrate(a))),
            Self::LowestVideo => Some(|a, b| {
                width(a).cmp(&width(b)).then_with(|| bitrate(a).cmp(&bitrate(b)))
            }),
            Self::LowestAudio => Some(|a, b| bitrate(a).cmp(&bitrate(b))),
            _ => None,
        }
    }
}

impl FromStr for FormatFilter {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "video" => Self::Video,
            "audio" => Self::Audio,
            "videoonly" => Self::VideoOnly,
            "audioonly" => Self::AudioOnly,
            "videoandaudio" | "audioandvideo" => Self::VideoAndAudio,
            "bestvideo" => Self::BestVideo,
            "bestaudio" => Self::BestAudio,
            "lowestvideo" => Self::LowestVideo,
            "lowestaudio" => Self::LowestAudio,
            _ => match s.strip_prefix("extension:") {
                Some(ext) if !ext.is_empty() => Self::Extension(ext.to_string()),
                _ => return Err(ResolveError::UnsupportedFilter(s.to_string())),
            },
        })
    }
}

impl fmt::Debug for FormatFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::VideoOnly => write!(f, "videoonly"),
            Self::AudioOnly => write!(f, "audioonly"),
            Self::VideoAndAudio => write!(f, "videoandaudio"),
            Self::BestVideo => write!(f, "bestvideo"),
            Self::BestAudio => write!(f, "bestaudio"),
            Self::LowestVideo => write!(f, "lowestvideo"),
            Self::LowestAudio => write!(f, "lowestaudio"),
            Self::Extension(ext) => write!(f, "extension:{}", ext),
            Self::Custom(_) => write!(f, "custom"),
        }
    }
}

#[derive(Clone, Default)]
pub struct FilterOptions {
    /// Return the first url-bearing format when nothing matches.
    pub fallback: bool,
    pub custom_sort: Option<Comparator>,
    pub min_bitrate: u64,
    /// Satisfied by either the width or the height.
    pub min_resolution: u32,
    /// Substring the MIME type must contain.
    pub codec: Option<String>,
}

impl FilterOptions {
    fn accepts(&self, format: &ResolvedFormat) -> bool {
        !format.url.is_empty()
            && self
                .codec
                .as_deref()
                .is_none_or(|codec| format.mime_type.contains(codec))
            && bitrate(format) >= self.min_bitrate
            && (width(format) >= self.min_resolution || height(format) >= self.min_resolution)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Single(Option<ResolvedFormat>),
    Multiple(Vec<ResolvedFormat>),
}

impl Selection {
    pub fn into_vec(self) -> Vec<ResolvedFormat> {
        match self {
            Self::Single(format) => format.into_iter().collect(),
            Self::Multiple(formats) => formats,
        }
    }
}

fn width(f: &ResolvedFormat) -> u32 {
    f.width.unwrap_or(0)
}

fn height(f: &ResolvedFormat) -> u32 {
    f.height.unwrap_or(0)
}

fn bitrate(f: &ResolvedFormat) -> u64 {
    f.bitrate.unwrap_or(0)
}

/// Applies a selector and its constraints to a resolved format set.
///
/// `best*` / `lowest*` yield a single winner, every other selector the whole
/// matching subset.
pub fn filter(
    formats: &[ResolvedFormat],
    selector: &FormatFilter,
    options: &FilterOptions,
) -> Selection {
    let matching = formats
        .iter()
        .filter(|f| options.accepts(f) && selector.matches(f));

    let selection = match selector.default_order() {
        Some(default_order) => {
            // min_by keeps the first of equal elements, like a stable sort would.
            let winner = match &options.custom_sort {
                Some(sort) => matching.min_by(|a, b| sort(a, b)),
                None => matching.min_by(|a, b| default_order(a, b)),
            };
            Selection::Single(winner.cloned())
        }
        None => Selection::Multiple(matching.cloned().collect()),
    };

    let empty = match &selection {
        Selection::Single(winner) => winner.is_none(),
        Selection::Multiple(list) => list.is_empty(),
    };

    if options.fallback && empty {
        let first = formats.iter().find(|f| !f.url.is_empty()).cloned();
        tracing::debug!(?selector, found = first.is_some(), "filter matched nothing, falling back");
        return Selection::Single(first);
    }

    selection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(itag: u32, mime: &str, width: Option<u32>, bitrate: u64) -> ResolvedFormat {
        ResolvedFormat {
            itag,
            url: format!(
                "https://rr1.googlevideo.com/videoplayback?itag={}&mime=x.{}",
                itag,
                mime.split(['/', ';']).nth(1).unwrap_or("bin")
            ),
            mime_type: mime.to_string(),
            width,
            height: width.map(|w| w * 9 / 16),
            bitrate: Some(bitrate),
            ..ResolvedFormat::default()
        }
    }

    fn fixture() -> Vec<ResolvedFormat> {
        vec![
            format(18, "video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"", Some(640), 500_000),
            format(137, "video/mp4; codecs=\"avc1.640028\"", Some(1920), 4_000_000),
            format(248, "video/webm; codecs=\"vp9\"", Some(1920), 2_500_000),
            format(160, "video/mp4; codecs=\"avc1.4d400c\"", Some(256), 110_000),
            format(140, "audio/mp4; codecs=\"mp4a.40.2\"", None, 130_000),
            format(251, "audio/webm; codecs=\"opus\"", None, 160_000),
            format(249, "audio/webm; codecs=\"opus\"", None, 50_000),
            format(900, "video+audio/mux; codecs=\"x\"", Some(320), 300_000),
        ]
    }

    fn itags(selection: Selection) -> Vec<u32> {
        selection.into_vec().iter().map(|f| f.itag).collect()
    }

    #[test]
    fn test_videoandaudio_subset() {
        let formats = fixture();
        let selector: FormatFilter = "videoandaudio".parse().unwrap();
        let selected = filter(&formats, &selector, &FilterOptions::default());

        let expected: Vec<u32> = formats
            .iter()
            .filter(|f| f.mime_type.contains("video") && f.mime_type.contains("audio"))
            .map(|f| f.itag)
            .collect();
        assert_eq!(itags(selected), expected);
        assert_eq!(expected, vec![900]);

        let alias: FormatFilter = "audioandvideo".parse().unwrap();
        assert_eq!(itags(filter(&formats, &alias, &FilterOptions::default())), vec![900]);
    }

    #[test]
    fn test_bestaudio_is_max_bitrate() {
        let formats = fixture();
        let selected = filter(&formats, &FormatFilter::BestAudio, &FilterOptions::default());
        let max = formats
            .iter()
            .filter(|f| f.mime_type.contains("audio"))
            .max_by_key(|f| f.bitrate)
            .unwrap();
        match selected {
            Selection::Single(Some(f)) => {
                assert_eq!(f.itag, max.itag);
                assert_eq!(f.itag, 900);
            }
            other => panic!("unexpected selection: {other:?}"),
        }

        let lowest = filter(&formats, &FormatFilter::LowestAudio, &FilterOptions::default());
        assert_eq!(itags(lowest), vec![249]);
    }

    #[test]
    fn test_bestvideo_prefers_width_then_bitrate() {
        let formats = fixture();
        assert_eq!(
            itags(filter(&formats, &FormatFilter::BestVideo, &FilterOptions::default())),
            vec![137]
        );
        assert_eq!(
            itags(filter(&formats, &FormatFilter::LowestVideo, &FilterOptions::default())),
            vec![160]
        );
    }

    #[test]
    fn test_list_presets() {
        let formats = fixture();
        let opts = FilterOptions::default();
        assert_eq!(itags(filter(&formats, &FormatFilter::AudioOnly, &opts)), vec![140, 251, 249]);
        assert_eq!(
            itags(filter(&formats, &FormatFilter::VideoOnly, &opts)),
            vec![18, 137, 248, 160]
        );
        assert_eq!(itags(filter(&formats, &FormatFilter::Video, &opts)).len(), 5);
        assert_eq!(
            itags(filter(&formats, &"extension:webm".parse().unwrap(), &opts)),
            vec![248, 251, 249]
        );
        assert_eq!(
            itags(filter(&formats, &FormatFilter::custom(|f| f.itag == 18), &opts)),
            vec![18]
        );
    }

    #[test]
    fn test_constraints() {
        let formats = fixture();
        let opts = FilterOptions {
            min_bitrate: 1_000_000,
            min_resolution: 1080,
            codec: Some("vp9".to_string()),
            ..FilterOptions::default()
        };
        assert_eq!(itags(filter(&formats, &FormatFilter::Video, &opts)), vec![248]);

        let custom = FilterOptions {
            custom_sort: Some(Arc::new(|a: &ResolvedFormat, b: &ResolvedFormat| {
                a.itag.cmp(&b.itag)
            })),
            ..FilterOptions::default()
        };
        assert_eq!(itags(filter(&formats, &FormatFilter::BestAudio, &custom)), vec![140]);
    }

    #[test]
    fn test_fallback_returns_first_url_bearing_format() {
        let mut formats = fixture();
        formats[0].url.clear();
        let strict = FilterOptions {
            min_bitrate: u64::MAX,
            ..FilterOptions::default()
        };

        assert_eq!(filter(&formats, &FormatFilter::Audio, &strict), Selection::Multiple(vec![]));
        assert_eq!(filter(&formats, &FormatFilter::BestVideo, &strict), Selection::Single(None));

        let fallback = FilterOptions {
            fallback: true,
            ..strict
        };
        assert_eq!(itags(filter(&formats, &FormatFilter::Audio, &fallback)), vec![137]);
        assert_eq!(itags(filter(&formats, &FormatFilter::BestVideo, &fallback)), vec![137]);
    }

    #[test]
    fn test_unknown_preset_is_unsupported() {
        let err = "highestaudio".parse::<FormatFilter>().unwrap_err();
        assert!(matches!(err, ResolveError::UnsupportedFilter(ref s) if s == "highestaudio"));
        assert!("extension:".parse::<FormatFilter>().is_err());
    }
}
