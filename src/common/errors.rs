use thiserror::Error;

/// Failure taxonomy of the playback resolution pipeline.
///
/// Every variant carries enough context (source document, field, status,
/// script url) to diagnose an upstream change without access to the code.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// An expected marker is absent from an upstream document.
    #[error("could not find {field} in {source_name}")]
    NotFound { source_name: String, field: String },

    /// The marker was found but its content is not valid structured data.
    #[error("error parsing {field} in {source_name}: {message}")]
    Parse {
        source_name: String,
        field: String,
        message: String,
    },

    /// Every known extraction convention for the watch page failed.
    #[error("error when parsing watch page, the upstream page shape may have changed")]
    UpstreamShapeChanged {
        #[source]
        source: Box<ResolveError>,
    },

    /// The platform explicitly refuses playback for this video.
    #[error("video {video_id} is not playable ({status}): {reason}")]
    Playability {
        video_id: String,
        status: String,
        reason: String,
    },

    #[error("malformed player response: expected video {expected}, got {actual:?}")]
    MalformedResponse {
        expected: String,
        actual: Option<String>,
    },

    /// A transform function could not be located or evaluated in the player script.
    #[error("player script {script} changed, could not derive {what}")]
    ObfuscationChanged { script: String, what: String },

    #[error("given filter ({0}) is not supported")]
    UnsupportedFilter(String),

    /// Server-class HTTP failure, retried by the retry policy.
    #[error("upstream returned {status} for {url}")]
    TransientUpstream { status: u16, url: String },

    #[error("upstream returned {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ResolveError>;

impl ResolveError {
    pub fn not_found(source_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::NotFound {
            source_name: source_name.into(),
            field: field.into(),
        }
    }

    pub fn parse(
        source_name: impl Into<String>,
        field: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            field: field.into(),
            message: message.to_string(),
        }
    }

    pub fn obfuscation(script: impl Into<String>, what: impl Into<String>) -> Self {
        Self::ObfuscationChanged {
            script: script.into(),
            what: what.into(),
        }
    }

    /// Maps an HTTP status to the matching error, `None` for 2xx.
    pub fn from_status(status: u16, url: &str) -> Option<Self> {
        match status {
            200..=299 => None,
            500..=u16::MAX => Some(Self::TransientUpstream {
                status,
                url: url.to_string(),
            }),
            _ => Some(Self::UpstreamStatus {
                status,
                url: url.to_string(),
            }),
        }
    }

    /// Only server-class failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientUpstream { .. } => true,
            Self::Http(e) => e.status().is_some_and(|s| s.is_server_error()),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TransientUpstream { status, .. } | Self::UpstreamStatus { status, .. } => {
                Some(*status)
            }
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for ResolveError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<std::io::Error> for ResolveError {
    fn from(e: std::io::Error) -> Self {
        Self::Config(e.to_string())
    }
}
