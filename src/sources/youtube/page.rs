use std::sync::{Arc, LazyLock};

use futures::FutureExt;
use regex::Regex;
use serde_json::Value;

use super::{
    cache::PageCache,
    clients::common::visitor_data,
    extractor::{WATCH_SOURCE, extract_initial_data, extract_player_response},
    retry::RetryPolicy,
    utils::{EMBED_URL, WATCH_URL, absolutize},
};
use crate::common::{
    errors::{ResolveError, Result},
    http::{HttpRequest, HttpTransport, RequestOptions},
    types::{PlayerScriptRef, SessionToken},
};

static PLAYER_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<script\s+src="([^"]+)"(?:\s+type="text/javascript")?\s+name="player_ias/base"\s*>|"jsUrl":"([^"]+)""#,
    )
    .expect("static player script pattern")
});

/// Blobs embedded in one watch page.
#[derive(Debug, Clone)]
pub struct WatchPage {
    pub player_response: Value,
    pub initial_data: Value,
    pub player_script: Option<PlayerScriptRef>,
}

impl WatchPage {
    /// Parses a watch document. Any extraction failure is reported as a
    /// changed page shape wrapping the underlying error.
    pub fn parse(body: &str) -> Result<Self> {
        let parsed = extract_player_response(WATCH_SOURCE, body).and_then(|player_response| {
            let initial_data = extract_initial_data(WATCH_SOURCE, body)?;
            Ok((player_response, initial_data))
        });

        let (player_response, initial_data) =
            parsed.map_err(|e| ResolveError::UpstreamShapeChanged {
                source: Box::new(e),
            })?;

        Ok(Self {
            player_response,
            initial_data,
            player_script: find_player_script(body),
        })
    }

    pub fn visitor_data(&self) -> Option<SessionToken> {
        visitor_data(&self.player_response)
            .or_else(|| visitor_data(&self.initial_data))
            .map(SessionToken)
    }
}

/// Player script reference advertised by a watch or embed document.
pub fn find_player_script(body: &str) -> Option<PlayerScriptRef> {
    let caps = PLAYER_SCRIPT.captures(body)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
    Some(PlayerScriptRef(absolutize(&raw.replace("\\/", "/"))))
}

pub fn watch_url(video_id: &str, lang: &str) -> String {
    let now = time::OffsetDateTime::now_utc();
    let bpctr = now.unix_timestamp() + i64::from(now.nanosecond() > 0);
    format!(
        "{}{}&hl={}&bpctr={}&has_verified=1",
        WATCH_URL,
        urlencoding::encode(video_id),
        urlencoding::encode(lang),
        bpctr
    )
}

pub fn embed_url(video_id: &str, lang: &str) -> String {
    format!(
        "{}{}?hl={}",
        EMBED_URL,
        urlencoding::encode(video_id),
        urlencoding::encode(lang)
    )
}

/// Fetches upstream documents through the shared page cache.
pub struct PageAcquirer {
    transport: Arc<dyn HttpTransport>,
    pages: Arc<dyn PageCache>,
    retry: RetryPolicy,
}

impl PageAcquirer {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        pages: Arc<dyn PageCache>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            pages,
            retry,
        }
    }

    /// Body of `url`; concurrent callers for the same url share one fetch.
    pub async fn fetch(&self, url: &str, options: &RequestOptions) -> Result<String> {
        let producer = async move {
            self.retry
                .run("page fetch", move || async move {
                    let res = self
                        .transport
                        .fetch(HttpRequest::get(url, options))
                        .await?
                        .ensure_success(url)?;
                    Ok(res.text())
                })
                .await
        };

        self.pages.get_or_set(url, producer.boxed()).await
    }

    pub async fn watch_page(
        &self,
        video_id: &str,
        lang: &str,
        options: &RequestOptions,
    ) -> Result<WatchPage> {
        let body = self.fetch(&watch_url(video_id, lang), options).await?;
        WatchPage::parse(&body)
    }

    /// Player script of the watch page, or of the embed page when the watch
    /// page does not reference one.
    pub async fn player_script(
        &self,
        video_id: &str,
        lang: &str,
        options: &RequestOptions,
    ) -> Result<PlayerScriptRef> {
        let body = self.fetch(&watch_url(video_id, lang), options).await?;
        if let Some(script) = find_player_script(&body) {
            return Ok(script);
        }

        tracing::debug!(video_id, "watch page has no player script, trying embed page");
        let embed = self.fetch(&embed_url(video_id, lang), options).await?;
        find_player_script(&embed).ok_or_else(|| ResolveError::UpstreamShapeChanged {
            source: Box::new(ResolveError::not_found("embed.html", "player script")),
        })
    }

    pub async fn session_token(
        &self,
        video_id: &str,
        lang: &str,
        options: &RequestOptions,
    ) -> Result<SessionToken> {
        self.watch_page(video_id, lang, options)
            .await?
            .visitor_data()
            .ok_or_else(|| ResolveError::not_found(WATCH_SOURCE, "visitor_data"))
    }

    pub async fn player_script_body(
        &self,
        script: &PlayerScriptRef,
        options: &RequestOptions,
    ) -> Result<String> {
        self.fetch(script, options).await
    }
}
