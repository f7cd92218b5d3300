//! Network requests proxied through the host's backend.

use crate::RESERVED_HEADER_PREFIX;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A request the integration asks the host to perform on its behalf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            headers: None,
        }
    }

    /// Headers as key/value pairs with reserved keys removed.
    pub fn header_list(&self) -> Vec<FetchHeader> {
        self.headers
            .as_ref()
            .map(|h| {
                scrub_headers(h)
                    .into_iter()
                    .map(|(key, value)| FetchHeader { key, value })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchHeader {
    pub key: String,
    pub value: String,
}

/// Result of a proxied request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(default)]
    pub headers: Vec<FetchHeader>,
    #[serde(default)]
    pub body: String,
}

impl FetchResponse {
    /// First header value matching `key`, compared case-insensitively.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(key))
            .map(|h| h.value.as_str())
    }
}

/// Drop every header whose key starts with the reserved internal prefix.
pub fn scrub_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(key, _)| !is_reserved(key))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn is_reserved(key: &str) -> bool {
    key.get(..RESERVED_HEADER_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(RESERVED_HEADER_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn strips_reserved_prefix() {
        let scrubbed = scrub_headers(&headers(&[("pinpt-secret", "x"), ("accept", "json")]));
        assert_eq!(scrubbed, headers(&[("accept", "json")]));
    }

    #[test]
    fn prefix_match_is_case_insensitive() {
        let scrubbed = scrub_headers(&headers(&[("Pinpt-Customer-Id", "1"), ("X-Pinpt-Note", "ok")]));
        assert_eq!(scrubbed, headers(&[("X-Pinpt-Note", "ok")]));
    }

    #[test]
    fn header_list_scrubs() {
        let req = FetchRequest {
            url: "https://api.example.com".into(),
            method: Some("GET".into()),
            headers: Some(headers(&[("pinpt-token", "t"), ("accept", "json")])),
        };
        assert_eq!(
            req.header_list(),
            vec![FetchHeader {
                key: "accept".into(),
                value: "json".into()
            }]
        );
    }
}
