//! Fetch capability
//! ----------------
//! Everything the explorer reads from outside the engine (table lists, label
//! documents, manifests and data files) goes through [`Fetcher`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use tracing::debug;

use crate::error::{AppError, AppResult};

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the body at `url`. A non-success response is an error.
    async fn fetch_bytes(&self, url: &Url) -> AppResult<Vec<u8>>;

    async fn fetch_json(&self, url: &Url) -> AppResult<serde_json::Value> {
        let bytes = self.fetch_bytes(url).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// HTTP(S) through reqwest; `file://` URLs are read from disk.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("harborx/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_bytes(&self, url: &Url) -> AppResult<Vec<u8>> {
        match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| AppError::fetch("bad_url", format!("not a local path: {}", url)))?;
                debug!(target: "harborx::fetch", "read {}", path.display());
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| AppError::fetch("not_found", format!("{}: {}", url, e)))
            }
            "http" | "https" => {
                debug!(target: "harborx::fetch", "GET {}", url);
                // no-store: every load cycle must observe the current documents
                let resp = self
                    .client
                    .get(url.clone())
                    .header(reqwest::header::CACHE_CONTROL, "no-store")
                    .send()
                    .await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(AppError::fetch("http_status", format!("{} returned HTTP {}", url, status)));
                }
                Ok(resp.bytes().await?.to_vec())
            }
            other => Err(AppError::fetch("bad_url", format!("unsupported scheme '{}' in {}", other, url))),
        }
    }
}

/// In-memory fetcher keyed by absolute URL. Unknown URLs fail like a 404.
/// Records every request so callers can assert on fallback order.
#[derive(Default)]
pub struct MemoryFetcher {
    docs: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.docs.lock().insert(url.to_string(), body.into());
    }

    pub fn insert_json(&self, url: &str, v: &serde_json::Value) {
        self.insert(url, v.to_string());
    }

    pub fn remove(&self, url: &str) { self.docs.lock().remove(url); }

    pub fn requests(&self) -> Vec<String> { self.requests.lock().clone() }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch_bytes(&self, url: &Url) -> AppResult<Vec<u8>> {
        self.requests.lock().push(url.to_string());
        self.docs
            .lock()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| AppError::fetch("http_status", format!("{} returned HTTP 404 Not Found", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_scheme_reads_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("doc.json");
        std::fs::write(&p, r#"{"a":["x.parquet"]}"#).unwrap();
        let f = HttpFetcher::new().unwrap();
        let url = Url::from_file_path(&p).unwrap();
        let v = f.fetch_json(&url).await.unwrap();
        assert_eq!(v["a"][0], "x.parquet");

        let missing = Url::from_file_path(tmp.path().join("nope.json")).unwrap();
        let err = f.fetch_bytes(&missing).await.unwrap_err();
        assert_eq!(err.code_str(), "not_found");
    }

    #[tokio::test]
    async fn memory_fetcher_records_requests() {
        let f = MemoryFetcher::new();
        f.insert("http://h/ok.json", "[]");
        assert!(f.fetch_bytes(&Url::parse("http://h/missing.json").unwrap()).await.is_err());
        assert!(f.fetch_json(&Url::parse("http://h/ok.json").unwrap()).await.unwrap().is_array());
        assert_eq!(f.requests(), vec!["http://h/missing.json", "http://h/ok.json"]);
    }

    #[tokio::test]
    async fn invalid_json_is_a_fetch_error() {
        let f = MemoryFetcher::new();
        f.insert("http://h/bad.json", "{not json");
        let err = f.fetch_json(&Url::parse("http://h/bad.json").unwrap()).await.unwrap_err();
        assert_eq!(err.code_str(), "invalid_json");
    }
}
