//! Data source variant resolution
//! ------------------------------
//! Picks which environment subdirectory ("fixed" or "local") a load cycle reads
//! first. Pure function of its inputs: explicit override, page-level declared
//! configuration, URL query parameters and finally the host name.

use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Query parameters consulted, in order.
pub const QUERY_KEYS: [&str; 2] = ["data_subdir", "mode"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Published, production data.
    Fixed,
    /// Locally ingested data.
    Local,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Fixed => "fixed",
            Variant::Local => "local",
        }
    }

    pub fn other(&self) -> Variant {
        match self {
            Variant::Fixed => Variant::Local,
            Variant::Local => Variant::Fixed,
        }
    }

    /// Case-insensitive parse; anything unrecognised is None.
    pub fn parse(s: &str) -> Option<Variant> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(Variant::Fixed),
            "local" => Some(Variant::Local),
            _ => None,
        }
    }

    /// Locations are tried in this order: selected variant, then the other one once.
    pub fn fallback_order(&self) -> [Variant; 2] { [*self, self.other()] }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Raw override inputs collected by the caller.
#[derive(Debug, Clone, Default)]
pub struct VariantInputs {
    pub explicit: Option<String>,
    pub page_config: Option<String>,
    pub query: Vec<(String, String)>,
}

impl VariantInputs {
    /// Collect query parameters from the page/base URL.
    pub fn with_url_query(mut self, url: &Url) -> Self {
        self.query = url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
        self
    }

    fn query_value(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// Host heuristic. With no primary hosts configured every non-loopback host
/// counts as production; otherwise only the listed hosts do.
#[derive(Debug, Clone, Default)]
pub struct HostPolicy {
    pub primary_hosts: Vec<String>,
}

impl HostPolicy {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let primary_hosts = hosts
            .into_iter()
            .map(|h| {
                let h: String = h.into();
                h.trim().to_ascii_lowercase()
            })
            .filter(|h| !h.is_empty())
            .collect();
        Self { primary_hosts }
    }

    pub fn variant_for_host(&self, host: Option<&str>) -> Variant {
        let host = host.map(|h| h.trim().trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase()).unwrap_or_default();
        if is_loopback(&host) { return Variant::Local; }
        if self.primary_hosts.is_empty() { return Variant::Fixed; }
        if self.primary_hosts.iter().any(|p| *p == host) { Variant::Fixed } else { Variant::Local }
    }
}

fn is_loopback(host: &str) -> bool {
    host.is_empty() || host == "localhost" || host == "127.0.0.1" || host == "::1" || host.ends_with(".localhost")
}

/// Resolve the variant for one load cycle.
pub fn resolve_variant(inputs: &VariantInputs, host: Option<&str>, policy: &HostPolicy) -> Variant {
    let candidates = [inputs.explicit.as_deref(), inputs.page_config.as_deref()]
        .into_iter()
        .chain(QUERY_KEYS.iter().map(|k| inputs.query_value(k)));
    for c in candidates.flatten() {
        if let Some(v) = Variant::parse(c) { return v; }
    }
    policy.variant_for_host(host)
}

/// Convenience over [`resolve_variant`] taking host and query from the base URL.
pub fn resolve_for_url(base: &Url, explicit: Option<&str>, page_config: Option<&str>, policy: &HostPolicy) -> Variant {
    let inputs = VariantInputs {
        explicit: explicit.map(str::to_string),
        page_config: page_config.map(str::to_string),
        query: Vec::new(),
    }
    .with_url_query(base);
    resolve_variant(&inputs, base.host_str(), policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(explicit: Option<&str>, page: Option<&str>, query: &[(&str, &str)]) -> VariantInputs {
        VariantInputs {
            explicit: explicit.map(str::to_string),
            page_config: page.map(str::to_string),
            query: query.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn explicit_beats_everything() {
        let p = HostPolicy::default();
        let i = inputs(Some("LOCAL"), Some("fixed"), &[("data_subdir", "fixed")]);
        assert_eq!(resolve_variant(&i, Some("data.example.org"), &p), Variant::Local);
    }

    #[test]
    fn page_config_beats_query_param() {
        let p = HostPolicy::default();
        let i = inputs(None, Some("fixed"), &[("data_subdir", "local")]);
        assert_eq!(resolve_variant(&i, Some("localhost"), &p), Variant::Fixed);
    }

    #[test]
    fn data_subdir_param_beats_mode_param() {
        let p = HostPolicy::default();
        let i = inputs(None, None, &[("mode", "fixed"), ("data_subdir", "local")]);
        assert_eq!(resolve_variant(&i, Some("data.example.org"), &p), Variant::Local);
        let i = inputs(None, None, &[("mode", "fixed")]);
        assert_eq!(resolve_variant(&i, Some("localhost"), &p), Variant::Fixed);
    }

    #[test]
    fn unrecognised_override_falls_through() {
        let p = HostPolicy::default();
        let i = inputs(Some("staging"), Some(""), &[("mode", "dark")]);
        assert_eq!(resolve_variant(&i, Some("127.0.0.1"), &p), Variant::Local);
    }

    #[test]
    fn host_heuristic() {
        let open = HostPolicy::default();
        assert_eq!(open.variant_for_host(Some("localhost")), Variant::Local);
        assert_eq!(open.variant_for_host(Some("[::1]")), Variant::Local);
        assert_eq!(open.variant_for_host(None), Variant::Local);
        assert_eq!(open.variant_for_host(Some("harbor.example.org")), Variant::Fixed);

        let listed = HostPolicy::new(["harbor.example.org"]);
        assert_eq!(listed.variant_for_host(Some("HARBOR.example.org")), Variant::Fixed);
        assert_eq!(listed.variant_for_host(Some("preview.example.org")), Variant::Local);
    }

    #[test]
    fn resolves_from_url_and_is_stable() {
        let p = HostPolicy::default();
        let u = Url::parse("http://127.0.0.1:8080/index.html?data_subdir=fixed").unwrap();
        let a = resolve_for_url(&u, None, None, &p);
        let b = resolve_for_url(&u, None, None, &p);
        assert_eq!(a, Variant::Fixed);
        assert_eq!(a, b);
        let f = Url::parse("file:///srv/web/").unwrap();
        assert_eq!(resolve_for_url(&f, None, None, &p), Variant::Local);
    }

    #[test]
    fn fallback_order_tries_other_variant_once() {
        assert_eq!(Variant::Fixed.fallback_order(), [Variant::Fixed, Variant::Local]);
        assert_eq!(Variant::Local.fallback_order(), [Variant::Local, Variant::Fixed]);
    }
}
