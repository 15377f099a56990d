use std::{sync::Arc, time::Instant};

use serde::{Deserialize, Serialize};
use tracing::instrument;

pub mod cache;
pub mod cipher;
pub mod clients;
pub mod extractor;
pub mod filter;
pub mod format;
pub mod page;
pub mod retry;
pub mod utils;

use cache::{LruPageCache, PageCache, ResolutionCache};
use cipher::CipherSet;
use clients::{Negotiator, PlaybackContext, PlayerRequest};
use format::{ResolvedFormat, StreamDescriptor, normalize};
use page::PageAcquirer;
use retry::RetryPolicy;

use crate::{
    common::{
        errors::{ResolveError, Result},
        http::{HttpTransport, ReqwestTransport, RequestOptions},
        types::{PlayerScriptRef, SessionToken},
    },
    configs::Config,
};

/// Per-call options. Unset fields fall back to the `[resolver]` config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOptions {
    pub lang: Option<String>,
    /// Forwarded to the transport untouched.
    #[serde(default, rename = "requestOptions")]
    pub request: RequestOptions,
    /// Pre-supplied session token, bypasses derivation.
    pub visitor_id: Option<String>,
    pub debug: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveOutput {
    pub formats: Vec<ResolvedFormat>,
    /// Whether the response came from the fallback client identity.
    pub fallback: bool,
}

/// Playback resolution pipeline: page acquisition, player API negotiation,
/// cipher application and format normalization, sharing one resolution cache.
pub struct YouTubeResolver {
    config: Config,
    acquirer: PageAcquirer,
    negotiator: Negotiator,
    cache: ResolutionCache,
}

impl YouTubeResolver {
    pub fn new(config: Config) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config.http)?);
        let pages = Arc::new(LruPageCache::new(
            config.cache.page_capacity,
            config.cache.page_ttl(),
        ));
        Self::with_collaborators(config, transport, pages)
    }

    pub fn with_collaborators(
        config: Config,
        transport: Arc<dyn HttpTransport>,
        pages: Arc<dyn PageCache>,
    ) -> Result<Self> {
        let retry = RetryPolicy::from(&config.retry);
        let negotiator =
            Negotiator::from_config(transport.clone(), retry.clone(), &config.resolver)?;

        Ok(Self {
            acquirer: PageAcquirer::new(transport, pages, retry),
            negotiator,
            cache: ResolutionCache::new(),
            config,
        })
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Warms the player script, its playback context, its cipher transforms
    /// and the session token.
    ///
    /// Returns `None` when no page advertises a player script.
    #[instrument(skip(self, options))]
    pub async fn initialize(&self, options: &ResolveOptions) -> Result<Option<PlayerScriptRef>> {
        let script = match self.player_script(options).await {
            Ok(script) => script,
            Err(e @ ResolveError::UpstreamShapeChanged { .. }) => {
                tracing::warn!("initialization found no player script: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.playback_context(&script, options).await?;
        self.cipher(&script, options).await?;
        self.session_token(&self.config.resolver.sample_video_id, options)
            .await;

        tracing::info!(script = %script, "resolver initialized");
        Ok(Some(script))
    }

    #[instrument(level = "debug", skip(self, options))]
    pub async fn resolve(&self, video_id: &str, options: &ResolveOptions) -> Result<ResolveOutput> {
        let started = Instant::now();

        let script = self.player_script(options).await?;
        let playback_context = self.playback_context(&script, options).await?;
        let visitor = self.session_token(video_id, options).await;

        let request = PlayerRequest {
            video_id,
            lang: self.lang(options),
            playback_context: &playback_context,
            visitor: visitor.as_ref(),
            options: &options.request,
        };

        let outcome = match self.negotiator.negotiate(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if self.config.cache.invalidate_on_failure && is_stale_context(&e) {
                    tracing::warn!(
                        video_id,
                        "player API rejected the cached context, clearing cache: {}",
                        e
                    );
                    self.cache.clear();
                }
                return Err(e);
            }
        };

        let descriptors = StreamDescriptor::from_response(&outcome.response);
        let cipher = self.cipher(&script, options).await?;
        let formats = normalize(cipher.decipher_formats(descriptors));

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if options.debug.unwrap_or(self.config.resolver.debug) {
            tracing::info!(
                video_id,
                client = outcome.client,
                formats = formats.len(),
                elapsed_ms,
                "took"
            );
        } else {
            tracing::debug!(
                video_id,
                client = outcome.client,
                formats = formats.len(),
                elapsed_ms,
                "took"
            );
        }

        Ok(ResolveOutput {
            formats,
            fallback: outcome.fallback,
        })
    }

    fn lang<'a>(&'a self, options: &'a ResolveOptions) -> &'a str {
        options.lang.as_deref().unwrap_or(&self.config.resolver.lang)
    }

    async fn player_script(&self, options: &ResolveOptions) -> Result<PlayerScriptRef> {
        self.cache
            .player_script(|| async {
                let script = self
                    .acquirer
                    .player_script(
                        &self.config.resolver.sample_video_id,
                        self.lang(options),
                        &options.request,
                    )
                    .await?;
                tracing::debug!(script = %script, "player script resolved");
                Ok(script)
            })
            .await
    }

    async fn playback_context(
        &self,
        script: &PlayerScriptRef,
        options: &ResolveOptions,
    ) -> Result<PlaybackContext> {
        self.cache
            .playback_context(script, || async {
                let body = self.acquirer.player_script_body(script, &options.request).await?;
                let context = PlaybackContext::from_player_script(&body);
                tracing::debug!(
                    script = %script,
                    sts = ?context.signature_timestamp,
                    "playback context derived"
                );
                Ok(context)
            })
            .await
    }

    async fn cipher(
        &self,
        script: &PlayerScriptRef,
        options: &ResolveOptions,
    ) -> Result<Arc<CipherSet>> {
        self.cache
            .cipher(script, || async {
                let body = self.acquirer.player_script_body(script, &options.request).await?;
                Ok(Arc::new(CipherSet::derive(script, &body)))
            })
            .await
    }

    /// Caller supplied token, else the shared derived one. A failed
    /// derivation is logged and the request goes out without a token.
    async fn session_token(
        &self,
        video_id: &str,
        options: &ResolveOptions,
    ) -> Option<SessionToken> {
        if let Some(id) = options
            .visitor_id
            .as_ref()
            .or(self.config.resolver.visitor_id.as_ref())
        {
            return Some(SessionToken(id.clone()));
        }

        self.cache
            .session_token(|| {
                self.acquirer
                    .session_token(video_id, self.lang(options), &options.request)
            })
            .await
            .inspect_err(|e| tracing::warn!(video_id, "could not derive session token: {}", e))
            .ok()
    }
}

/// Rejections that suggest the cached context no longer matches upstream.
fn is_stale_context(err: &ResolveError) -> bool {
    match err {
        ResolveError::MalformedResponse { .. } => true,
        ResolveError::UpstreamStatus { status, .. } => (400..500).contains(status),
        _ => false,
    }
}
