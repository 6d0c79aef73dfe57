use std::path::Path;

use path_absolutize::Absolutize;
use reqwest::Url;

use crate::error::{AppError, AppResult};
use crate::labels::DEFAULT_LABEL_CHUNK;
use crate::layout::SourceLayout;
use crate::registry::{DEFAULT_EXTENSIONS, DEFAULT_VIEW_CHUNK};
use crate::variant::{resolve_for_url, HostPolicy, Variant};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/";

pub const ENV_BASE_URL: &str = "HARBORX_BASE_URL";
pub const ENV_DATA_SUBDIR: &str = "HARBORX_DATA_SUBDIR";
pub const ENV_PRIMARY_HOSTS: &str = "HARBORX_PRIMARY_HOSTS";
pub const ENV_VIEW_CHUNK: &str = "HARBORX_VIEW_CHUNK";
pub const ENV_LABEL_CHUNK: &str = "HARBORX_LABEL_CHUNK";
pub const ENV_EXTENSIONS: &str = "HARBORX_EXTENSIONS";
/// Manifest path under the base, e.g. `data/local/manifest.json` after `harborx_manifest add`.
pub const ENV_MANIFEST: &str = "HARBORX_MANIFEST";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerConfig {
    /// Every relative document location is resolved against this.
    pub base_url: Url,
    /// Caller override (CLI flag); wins over everything else.
    pub explicit_subdir: Option<String>,
    /// Declared configuration of the hosting page.
    pub page_subdir: Option<String>,
    pub primary_hosts: Vec<String>,
    pub view_chunk: usize,
    pub label_chunk: usize,
    pub extensions: Vec<String>,
    pub layout: SourceLayout,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL parses"),
            explicit_subdir: None,
            page_subdir: None,
            primary_hosts: Vec::new(),
            view_chunk: DEFAULT_VIEW_CHUNK,
            label_chunk: DEFAULT_LABEL_CHUNK,
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            layout: SourceLayout::default(),
        }
    }
}

impl ExplorerConfig {
    pub fn from_env() -> AppResult<Self> { Self::from_lookup(|k| std::env::var(k).ok()) }

    /// Build from an arbitrary key lookup; unset or blank keys keep defaults.
    pub fn from_lookup<F>(get: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = ExplorerConfig::default();
        if let Some(b) = get(ENV_BASE_URL) {
            cfg.base_url = parse_base_url(&b)?;
        }
        cfg.page_subdir = get(ENV_DATA_SUBDIR);
        if let Some(h) = get(ENV_PRIMARY_HOSTS) {
            cfg.primary_hosts = split_list(&h);
        }
        if let Some(n) = get(ENV_VIEW_CHUNK) {
            cfg.view_chunk = parse_chunk(ENV_VIEW_CHUNK, &n)?;
        }
        if let Some(n) = get(ENV_LABEL_CHUNK) {
            cfg.label_chunk = parse_chunk(ENV_LABEL_CHUNK, &n)?;
        }
        if let Some(x) = get(ENV_EXTENSIONS) {
            cfg.extensions = split_list(&x);
        }
        if let Some(m) = get(ENV_MANIFEST) {
            cfg.layout.manifest = m;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.view_chunk == 0 {
            return Err(AppError::config("bad_chunk_size", "view chunk size must be at least 1"));
        }
        if self.label_chunk == 0 {
            return Err(AppError::config("bad_chunk_size", "label chunk size must be at least 1"));
        }
        if self.base_url.cannot_be_a_base() {
            return Err(AppError::config("bad_base_url", format!("{} cannot be used as a base URL", self.base_url)));
        }
        Ok(())
    }

    pub fn host_policy(&self) -> HostPolicy { HostPolicy::new(self.primary_hosts.iter().cloned()) }

    /// Dataset variant for this configuration, per the resolution order.
    pub fn variant(&self) -> Variant {
        resolve_for_url(&self.base_url, self.explicit_subdir.as_deref(), self.page_subdir.as_deref(), &self.host_policy())
    }
}

/// Accepts URLs and bare directory paths; always ends in `/` so relative
/// joins land inside it.
pub fn parse_base_url(s: &str) -> AppResult<Url> {
    let mut url = match Url::parse(s) {
        Ok(u) => u,
        Err(_) => {
            let abs = Path::new(s)
                .absolutize()
                .map_err(|e| AppError::config("bad_base_url", format!("{}: {}", s, e)))?;
            Url::from_directory_path(&abs)
                .map_err(|_| AppError::config("bad_base_url", format!("{} is not a usable directory", abs.display())))?
        }
    };
    if !url.path().ends_with('/') {
        let p = format!("{}/", url.path());
        url.set_path(&p);
    }
    Ok(url)
}

fn parse_chunk(key: &str, v: &str) -> AppResult<usize> {
    let n: usize = v
        .parse()
        .map_err(|_| AppError::config("bad_chunk_size", format!("{}={} is not a positive integer", key, v)))?;
    if n == 0 {
        return Err(AppError::config("bad_chunk_size", format!("{} must be at least 1", key)));
    }
    Ok(n)
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',').map(|x| x.trim()).filter(|x| !x.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let c = ExplorerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(c.view_chunk, 16);
        assert_eq!(c.label_chunk, 128);
        assert_eq!(c.extensions, vec!["httpfs"]);
        assert_eq!(c.variant(), Variant::Local);
    }

    #[test]
    fn env_values() {
        let c = ExplorerConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://data.example.org/explorer"),
            (ENV_PRIMARY_HOSTS, "data.example.org, mirror.example.org"),
            (ENV_VIEW_CHUNK, "4"),
            (ENV_EXTENSIONS, "httpfs,arrow"),
            (ENV_MANIFEST, "data/local/manifest.json"),
        ]))
        .unwrap();
        assert_eq!(c.base_url.as_str(), "https://data.example.org/explorer/");
        assert_eq!(c.primary_hosts.len(), 2);
        assert_eq!(c.view_chunk, 4);
        assert_eq!(c.extensions, vec!["httpfs", "arrow"]);
        assert_eq!(c.layout.manifest, "data/local/manifest.json");
        assert_eq!(c.variant(), Variant::Fixed);
    }

    #[test]
    fn page_subdir_beats_host() {
        let c = ExplorerConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://data.example.org/"),
            (ENV_DATA_SUBDIR, "local"),
        ]))
        .unwrap();
        assert_eq!(c.variant(), Variant::Local);
    }

    #[test]
    fn zero_chunk_is_config_error() {
        for key in [ENV_VIEW_CHUNK, ENV_LABEL_CHUNK] {
            let err = ExplorerConfig::from_lookup(lookup(&[(key, "0")])).unwrap_err();
            assert_eq!(err.code_str(), "bad_chunk_size");
            assert_eq!(err.exit_code(), 2);
        }
        assert!(ExplorerConfig::from_lookup(lookup(&[(ENV_VIEW_CHUNK, "x")])).is_err());
    }

    #[test]
    fn directory_base() {
        let dir = tempfile::tempdir().unwrap();
        let u = parse_base_url(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(u.scheme(), "file");
        assert!(u.path().ends_with('/'));
    }
}
