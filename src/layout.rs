//! Where a load cycle looks for its documents, relative to the base URL,
//! and the one-fallback fetch used for every variant-scoped document.

use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::fetch::Fetcher;
use crate::variant::Variant;

pub const DEFAULT_TABLES_TEMPLATE: &str = "data/{variant}/state_diff/_tables.json";
pub const DEFAULT_LABELS_TEMPLATE: &str = "data/{variant}/wallet_class_map.json";
pub const DEFAULT_MANIFEST_PATH: &str = "data/manifest.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayout {
    pub tables: String,
    pub labels: String,
    pub manifest: String,
}

impl Default for SourceLayout {
    fn default() -> Self {
        Self {
            tables: DEFAULT_TABLES_TEMPLATE.to_string(),
            labels: DEFAULT_LABELS_TEMPLATE.to_string(),
            manifest: DEFAULT_MANIFEST_PATH.to_string(),
        }
    }
}

impl SourceLayout {
    pub fn tables_url(&self, base: &Url, v: Variant) -> AppResult<Url> { join(base, &expand(&self.tables, v)) }

    pub fn labels_url(&self, base: &Url, v: Variant) -> AppResult<Url> { join(base, &expand(&self.labels, v)) }

    pub fn manifest_url(&self, base: &Url) -> AppResult<Url> { join(base, &self.manifest) }
}

fn expand(template: &str, v: Variant) -> String { template.replace("{variant}", v.as_str()) }

fn join(base: &Url, rel: &str) -> AppResult<Url> {
    base.join(rel)
        .map_err(|e| AppError::config("bad_layout", format!("cannot join '{}' onto {}: {}", rel, base, e)))
}

/// A document found at one of the candidate locations.
#[derive(Debug, Clone)]
pub struct Located<T> {
    pub variant: Variant,
    pub url: Url,
    pub doc: T,
}

/// Try each candidate once, in order. Fetch errors and parse errors both
/// count as a failed attempt. On total failure returns every attempted URL.
pub async fn fetch_first<T, F>(
    fetcher: &dyn Fetcher,
    candidates: &[(Variant, Url)],
    parse: F,
) -> Result<Located<T>, Vec<String>>
where
    F: Fn(&Value) -> AppResult<T>,
{
    let mut attempted = Vec::with_capacity(candidates.len());
    for (variant, url) in candidates {
        attempted.push(url.to_string());
        let parsed = match fetcher.fetch_json(url).await {
            Ok(v) => parse(&v),
            Err(e) => Err(e),
        };
        match parsed {
            Ok(doc) => {
                debug!(target: "harborx::layout", "using {} ({})", url, variant);
                return Ok(Located { variant: *variant, url: url.clone(), doc });
            }
            Err(e) => warn!(target: "harborx::layout", "{} unusable: {}", url, e),
        }
    }
    Err(attempted)
}

/// Candidate list for a variant-scoped document: chosen variant, then the other.
pub fn variant_candidates<F>(preferred: Variant, locate: F) -> AppResult<Vec<(Variant, Url)>>
where
    F: Fn(Variant) -> AppResult<Url>,
{
    preferred.fallback_order().into_iter().map(|v| Ok((v, locate(v)?))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetcher;

    #[test]
    fn default_layout_urls() {
        let l = SourceLayout::default();
        let base = Url::parse("http://h:8000/web/").unwrap();
        assert_eq!(l.tables_url(&base, Variant::Fixed).unwrap().as_str(), "http://h:8000/web/data/fixed/state_diff/_tables.json");
        assert_eq!(l.labels_url(&base, Variant::Local).unwrap().as_str(), "http://h:8000/web/data/local/wallet_class_map.json");
        assert_eq!(l.manifest_url(&base).unwrap().as_str(), "http://h:8000/web/data/manifest.json");
    }

    #[tokio::test]
    async fn parse_failure_falls_through_to_next_candidate() {
        let f = MemoryFetcher::new();
        f.insert("http://h/a.json", "[1]");
        f.insert("http://h/b.json", r#"{"ok": true}"#);
        let cands = vec![
            (Variant::Fixed, Url::parse("http://h/a.json").unwrap()),
            (Variant::Local, Url::parse("http://h/b.json").unwrap()),
        ];
        let got = fetch_first(&f, &cands, |v| {
            if v.is_object() { Ok(v.clone()) } else { Err(AppError::fetch("invalid_document", "not an object")) }
        })
        .await
        .unwrap();
        assert_eq!(got.variant, Variant::Local);
        assert_eq!(got.url.as_str(), "http://h/b.json");
    }

    #[tokio::test]
    async fn total_failure_reports_all_attempts() {
        let f = MemoryFetcher::new();
        let base = Url::parse("http://h/").unwrap();
        let l = SourceLayout::default();
        let cands = variant_candidates(Variant::Local, |v| l.tables_url(&base, v)).unwrap();
        let err = fetch_first(&f, &cands, |v| Ok(v.clone())).await.unwrap_err();
        assert_eq!(
            err,
            vec!["http://h/data/local/state_diff/_tables.json", "http://h/data/fixed/state_diff/_tables.json"]
        );
    }
}
