use std::sync::Arc;

use serde_json::{Value, json};

use super::{PlaybackContext, YouTubeClient, common::player_request, create_client};
use crate::{
    common::{
        errors::{ResolveError, Result},
        http::{HttpTransport, RequestOptions},
        types::SessionToken,
    },
    configs::ResolverConfig,
    sources::youtube::retry::RetryPolicy,
};

/// Everything one player API call needs besides the client identity.
pub struct PlayerRequest<'a> {
    pub video_id: &'a str,
    pub lang: &'a str,
    pub playback_context: &'a PlaybackContext,
    pub visitor: Option<&'a SessionToken>,
    pub options: &'a RequestOptions,
}

#[derive(Debug, Clone)]
pub struct NegotiationOutcome {
    pub response: Value,
    /// Name of the identity whose response was accepted.
    pub client: &'static str,
    pub fallback: bool,
}

enum Verdict {
    Playable,
    Unplayable(String),
}

/// Player API negotiation: primary identity first, the fallback identity only
/// when the primary is refused as `UNPLAYABLE`.
pub struct Negotiator {
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
    primary: Arc<dyn YouTubeClient>,
    fallback: Arc<dyn YouTubeClient>,
}

impl Negotiator {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        retry: RetryPolicy,
        primary: Arc<dyn YouTubeClient>,
        fallback: Arc<dyn YouTubeClient>,
    ) -> Self {
        Self {
            transport,
            retry,
            primary,
            fallback,
        }
    }

    pub fn from_config(
        transport: Arc<dyn HttpTransport>,
        retry: RetryPolicy,
        config: &ResolverConfig,
    ) -> Result<Self> {
        let lookup = |name: &str| {
            create_client(name)
                .ok_or_else(|| ResolveError::Config(format!("unknown client identity: {}", name)))
        };

        Ok(Self::new(
            transport,
            retry,
            lookup(&config.primary_client)?,
            lookup(&config.fallback_client)?,
        ))
    }

    pub async fn negotiate(&self, req: &PlayerRequest<'_>) -> Result<NegotiationOutcome> {
        let response = self.attempt(self.primary.as_ref(), req).await?;
        match verdict(req.video_id, &response)? {
            Verdict::Playable => Ok(NegotiationOutcome {
                response,
                client: self.primary.name(),
                fallback: false,
            }),
            Verdict::Unplayable(reason) => {
                tracing::info!(
                    video_id = req.video_id,
                    client = self.fallback.name(),
                    "{} refused playback ({}), falling back",
                    self.primary.name(),
                    reason
                );

                let response = self.attempt(self.fallback.as_ref(), req).await?;
                match verdict(req.video_id, &response)? {
                    Verdict::Playable => Ok(NegotiationOutcome {
                        response,
                        client: self.fallback.name(),
                        fallback: true,
                    }),
                    Verdict::Unplayable(reason) => Err(ResolveError::Playability {
                        video_id: req.video_id.to_string(),
                        status: "UNPLAYABLE".to_string(),
                        reason,
                    }),
                }
            }
        }
    }

    async fn attempt(&self, client: &dyn YouTubeClient, req: &PlayerRequest<'_>) -> Result<Value> {
        let payload = json!({
            "context": client.build_context(req.lang),
            "videoId": req.video_id,
            "playbackContext": req.playback_context.to_json(),
            "contentCheckOk": true,
            "racyCheckOk": true
        });

        tracing::debug!(video_id = req.video_id, client = client.name(), "player request");

        let transport = &self.transport;
        let payload = &payload;
        let res = self
            .retry
            .run("player request", move || {
                let request = player_request(
                    req.video_id,
                    payload,
                    client,
                    req.visitor,
                    req.options,
                );
                async move {
                    let request = request?;
                    let url = request.url.clone();
                    transport.fetch(request).await?.ensure_success(&url)
                }
            })
            .await?;

        res.json()
    }
}

fn verdict(video_id: &str, response: &Value) -> Result<Verdict> {
    let playability = response.get("playabilityStatus");
    let status = playability
        .and_then(|p| p.get("status"))
        .and_then(|s| s.as_str())
        .unwrap_or("OK");

    if status != "OK" {
        let reason = playability.map(reason).unwrap_or_default();
        if status == "UNPLAYABLE" {
            return Ok(Verdict::Unplayable(reason));
        }
        return Err(ResolveError::Playability {
            video_id: video_id.to_string(),
            status: status.to_string(),
            reason,
        });
    }

    let declared = response
        .get("videoDetails")
        .and_then(|d| d.get("videoId"))
        .and_then(|v| v.as_str());

    if declared != Some(video_id) {
        return Err(ResolveError::MalformedResponse {
            expected: video_id.to_string(),
            actual: declared.map(str::to_string),
        });
    }

    Ok(Verdict::Playable)
}

fn reason(playability: &Value) -> String {
    playability
        .get("reason")
        .and_then(|r| r.as_str())
        .or_else(|| {
            playability
                .get("messages")
                .and_then(|m| m.get(0))
                .and_then(|m| m.as_str())
        })
        .unwrap_or_default()
        .to_string()
}
