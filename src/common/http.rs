use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    common::errors::{ResolveError, Result},
    configs::HttpConfig,
};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36";

/// Caller supplied transport options, forwarded to the transport untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub options: RequestOptions,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, options: &RequestOptions) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            options: options.clone(),
        }
    }

    pub fn post_json<T: Serialize>(
        url: impl Into<String>,
        body: &T,
        options: &RequestOptions,
    ) -> Result<Self> {
        Ok(Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(serde_json::to_string(body)?),
            options: options.clone(),
        })
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Classifies a non-2xx status into the pipeline error taxonomy.
    pub fn ensure_success(self, url: &str) -> Result<Self> {
        match ResolveError::from_status(self.status, url) {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    pub fn text(self) -> String {
        self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Capability used for every upstream fetch of the pipeline.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Default transport backed by reqwest.
pub struct ReqwestTransport {
    client: Client,
    config: HttpConfig,
    proxied: DashMap<String, Client>,
}

impl ReqwestTransport {
    pub fn default_user_agent() -> String {
        DEFAULT_USER_AGENT.to_string()
    }

    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Self::build_client(config, config.proxy.as_deref())?;

        Ok(Self {
            client,
            config: config.clone(),
            proxied: DashMap::new(),
        })
    }

    fn build_client(config: &HttpConfig, proxy: Option<&str>) -> Result<Client> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(Self::default_user_agent);

        let mut builder = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true);

        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(builder.build()?)
    }

    fn client_for(&self, options: &RequestOptions) -> Result<Client> {
        let Some(proxy) = options.proxy.as_deref() else {
            return Ok(self.client.clone());
        };

        if let Some(client) = self.proxied.get(proxy) {
            return Ok(client.clone());
        }

        let client = Self::build_client(&self.config, Some(proxy))?;
        self.proxied.insert(proxy.to_string(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse> {
        let client = self.client_for(&request.options)?;

        let mut req = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url),
        };

        for (key, value) in request.options.headers.iter() {
            req = req.header(key.as_str(), value.as_str());
        }
        for (key, value) in &request.headers {
            if request.options.user_agent.is_some() && key.eq_ignore_ascii_case("user-agent") {
                continue;
            }
            req = req.header(key.as_str(), value.as_str());
        }
        if let Some(ua) = &request.options.user_agent {
            req = req.header(reqwest::header::USER_AGENT, ua.as_str());
        }
        if let Some(secs) = request.options.timeout_secs {
            req = req.timeout(Duration::from_secs(secs));
        }
        if let Some(body) = request.body {
            req = req.body(body);
        }

        let res = req.send().await?;
        let status = res.status().as_u16();
        let body = res.text().await?;

        tracing::trace!(url = %request.url, status, bytes = body.len(), "fetched");

        Ok(HttpResponse { status, body })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_success_classifies_status() {
        let ok = HttpResponse {
            status: 200,
            body: "{}".into(),
        };
        assert!(ok.ensure_success("https://example.com").is_ok());

        let err = HttpResponse {
            status: 502,
            body: String::new(),
        }
        .ensure_success("https://example.com")
        .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_post_json_sets_content_type() {
        let req = HttpRequest::post_json(
            "https://example.com",
            &serde_json::json!({ "a": 1 }),
            &RequestOptions::default(),
        )
        .unwrap()
        .header("X-Test", "1");

        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.body.as_deref(), Some(r#"{"a":1}"#));
        assert!(req.headers.iter().any(|(k, _)| k == "Content-Type"));
        assert!(req.headers.iter().any(|(k, v)| k == "X-Test" && v == "1"));
    }
}
