use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Url};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{info, warn};

use crate::blobs::{BlobStore, PUBLIC_PREFIX};
use crate::payload::ImagePayload;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("unsupported image reference '{0}'")]
    BadReference(String),
    #[error("local image {name} unavailable: {reason}")]
    Local { name: String, reason: String },
    #[error("image {reference} could not be downloaded (direct: {direct}; proxy: {proxy})")]
    Undownloadable { reference: String, direct: String, proxy: String },
}

/// Where a template image lives.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageRef {
    Remote(String),
    Inline(ImagePayload),
    /// A file in the local blob store, by name relative to its root.
    Local(String),
}

impl ImageRef {
    pub fn parse(reference: &str) -> Result<Self, FetchError> {
        let reference = reference.trim();
        if reference.starts_with("https://") || reference.starts_with("http://") {
            return Ok(Self::Remote(reference.to_string()));
        }
        if reference.starts_with("data:") {
            return ImagePayload::parse(reference)
                .map(Self::Inline)
                .map_err(|e| FetchError::BadReference(e.to_string()));
        }
        let local = reference
            .strip_prefix("blob:")
            .or_else(|| reference.strip_prefix(PUBLIC_PREFIX));
        match local {
            Some(name) if !name.is_empty() && !name.starts_with('/') && !name.contains("..") => {
                Ok(Self::Local(name.to_string()))
            }
            _ => Err(FetchError::BadReference(reference.to_string())),
        }
    }
}

/// Plain GET returning the response body.
#[async_trait]
pub trait HttpGet: Send + Sync {
    async fn get_bytes(&self, url: &str) -> Result<Bytes, FetchError>;
}

pub struct ReqwestGet {
    client: Client,
}

impl ReqwestGet {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("poster-studio/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpGet for ReqwestGet {
    async fn get_bytes(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Http(e.to_string()))?;
        response.bytes().await.map_err(|e| FetchError::Http(e.to_string()))
    }
}

/// Resolves template references into in-memory payloads.
///
/// Network URLs are tried directly first and then once through the CORS
/// relay. Local blobs are read from disk and never go through the relay.
#[derive(Clone)]
pub struct RemoteFetcher {
    http: Arc<dyn HttpGet>,
    blobs: BlobStore,
    proxy_url: String,
}

impl RemoteFetcher {
    pub fn new(http: Arc<dyn HttpGet>, blobs: BlobStore, proxy_url: impl Into<String>) -> Self {
        Self { http, blobs, proxy_url: proxy_url.into() }
    }

    pub async fn fetch(&self, reference: &str) -> Result<ImagePayload, FetchError> {
        match ImageRef::parse(reference)? {
            ImageRef::Inline(payload) => Ok(payload),
            ImageRef::Local(name) => {
                let bytes = self.blobs.read(&name).await.map_err(|e| FetchError::Local {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
                Ok(ImagePayload::sniffed(&bytes))
            }
            ImageRef::Remote(url) => self.fetch_remote(&url).await,
        }
    }

    async fn fetch_remote(&self, url: &str) -> Result<ImagePayload, FetchError> {
        let direct = match self.http.get_bytes(url).await {
            Ok(bytes) => return Ok(ImagePayload::sniffed(&bytes)),
            Err(e) => e,
        };
        warn!("⚠️ Direct fetch of {} failed ({}), retrying through proxy", url, direct);

        let proxied = self.proxied_url(url);
        let proxy = match &proxied {
            Ok(proxied) => match self.http.get_bytes(proxied).await {
                Ok(bytes) => {
                    info!("✅ Fetched {} through proxy", url);
                    return Ok(ImagePayload::sniffed(&bytes));
                }
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };

        Err(FetchError::Undownloadable {
            reference: url.to_string(),
            direct: direct.to_string(),
            proxy,
        })
    }

    fn proxied_url(&self, target: &str) -> Result<String, FetchError> {
        Url::parse_with_params(&self.proxy_url, &[("url", target)])
            .map(String::from)
            .map_err(|e| FetchError::BadReference(format!("proxy url: {e}")))
    }
}
