//! `Origin` allow-list for upgrade requests.

use std::collections::HashSet;

use axum::http::HeaderMap;
use axum::http::header::ORIGIN;

/// Exact-match origin allow-list.
#[derive(Clone, Debug, Default)]
pub struct OriginValidator {
    allowed: HashSet<String>,
}

impl OriginValidator {
    /// Build from allowed origins (scheme + host + optional port).
    pub fn new(allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed: allowed
                .into_iter()
                .map(Into::into)
                .filter(|o: &String| !o.is_empty())
                .collect(),
        }
    }

    /// Whether `origin` is on the list. Missing or empty origins are denied.
    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            Some(o) if !o.is_empty() => self.allowed.contains(o),
            _ => false,
        }
    }

    /// Check the request's `Origin` header.
    pub fn allows_request(&self, headers: &HeaderMap) -> bool {
        self.is_allowed(origin_header(headers))
    }
}

/// The `Origin` header as UTF-8, if present.
pub fn origin_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(ORIGIN).and_then(|v| v.to_str().ok())
}
