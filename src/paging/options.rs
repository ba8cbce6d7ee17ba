//! Request decorations re-applied to every page request.
//!
//! A continuation link is a bare URL. Headers such as
//! `Prefer: odata.maxpagesize=N` that the caller set on the first request
//! are not carried by it, so the fetcher runs a configurator over every
//! request it builds, the first one included.

use std::fmt;
use std::sync::Arc;

use tracing::warn;
use url::Url;

use crate::http::HttpRequest;

/// A pure `(request) -> request` hook applied before every page fetch.
pub type RequestConfigurator = Arc<dyn Fn(HttpRequest) -> HttpRequest + Send + Sync>;

/// Headers and query options for a paged request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Headers set on every page request.
    pub headers: Vec<(String, String)>,
    /// Query pairs appended when the URL lacks them.
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a query option.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Asks the server for at most `size` items per page.
    #[must_use]
    pub fn max_page_size(self, size: u32) -> Self {
        self.header("Prefer", format!("odata.maxpagesize={size}"))
    }

    /// True if nothing would be changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.query.is_empty()
    }

    /// Headers as they are sent.
    ///
    /// Repeated `Prefer` entries are joined into one comma-separated value,
    /// so a caller's own preference does not displace
    /// `odata.maxpagesize`. Any other repeated name keeps its last value.
    #[must_use]
    pub fn merged_headers(&self) -> Vec<(String, String)> {
        let mut merged: Vec<(String, String)> = Vec::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            match merged.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
                Some((_, existing)) if name.eq_ignore_ascii_case("prefer") => {
                    existing.push_str(", ");
                    existing.push_str(value);
                }
                Some((_, existing)) => existing.clone_from(value),
                None => merged.push((name.clone(), value.clone())),
            }
        }
        merged
    }

    /// Applies the options to `request`.
    ///
    /// Headers from [`merged_headers`](Self::merged_headers) replace existing
    /// values; an illegal name or value is logged and skipped. A query pair
    /// is skipped when the URL already has that key, so continuation links
    /// keep their own `$top` or `$skiptoken`. An unparsable URL is left alone
    /// for the fetcher to reject.
    #[must_use]
    pub fn apply(&self, mut request: HttpRequest) -> HttpRequest {
        for (name, value) in self.merged_headers() {
            if !request.set_header(&name, &value) {
                warn!(header = %name, "skipping header with an illegal name or value");
            }
        }

        if !self.query.is_empty()
            && let Ok(mut url) = Url::parse(&request.url)
        {
            let present: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
            let missing: Vec<&(String, String)> = self
                .query
                .iter()
                .filter(|(key, _)| !present.iter().any(|p| p == key))
                .collect();
            if !missing.is_empty() {
                {
                    let mut pairs = url.query_pairs_mut();
                    for (key, value) in missing {
                        pairs.append_pair(key, value);
                    }
                }
                request.url = url.into();
            }
        }

        request
    }

    /// Turns the options into a configurator hook.
    #[must_use]
    pub fn into_configurator(self) -> RequestConfigurator {
        Arc::new(move |request| self.apply(request))
    }
}

impl fmt::Display for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} header(s), {} query option(s)",
            self.headers.len(),
            self.query.len()
        )
    }
}
