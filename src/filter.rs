use url::Url;

/// Query parameters that identify the same page across visits and are
/// dropped during canonicalization. Mostly session tokens and ad/tracking
/// identifiers.
const VOLATILE_QUERY_KEYS: [&str; 8] = [
    "session",
    "sessionid",
    "sid",
    "token",
    "phpsessid",
    "jsessionid",
    "fbclid",
    "gclid",
];

/// Domain allow-list applied by the frontier planner at enqueue time.
///
/// An empty allow-list permits everything. A listed domain matches its own
/// host and any subdomain, so `example.com` admits `docs.example.com`.
#[derive(Debug, Clone, Default)]
pub struct DomainFilter {
    allowed: Vec<String>,
}

impl DomainFilter {
    /// Create a filter from the configured allow-list
    pub fn new(allowed_domains: &[String]) -> Self {
        Self {
            allowed: allowed_domains
                .iter()
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// Whether this filter restricts anything at all
    pub fn is_unrestricted(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Determine whether a URL's host is within the allow-list
    pub fn permits(&self, url: &Url) -> bool {
        if self.allowed.is_empty() {
            return true;
        }

        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        self.allowed
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }
}

/// Produce the canonical form of a URL used for identity everywhere in
/// the engine: fragment removed, volatile query parameters dropped, and
/// utm_* tracking parameters dropped.
pub fn canonicalize(url: &Url) -> Url {
    let mut canonical = url.clone();
    canonical.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| {
                let key = k.to_ascii_lowercase();
                !key.starts_with("utm_") && !VOLATILE_QUERY_KEYS.contains(&key.as_str())
            })
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            canonical.set_query(None);
        } else {
            canonical
                .query_pairs_mut()
                .clear()
                .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
    }

    canonical
}
