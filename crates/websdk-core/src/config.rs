//! Persisted integration settings and the credential shapes stored in them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Where the integration's backend work runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationType {
    #[serde(rename = "CLOUD")]
    Cloud,
    #[serde(rename = "SELFMANAGED")]
    SelfManaged,
}

/// Username/password credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A static API key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyAuth {
    pub apikey: String,
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// OAuth 1.0a token pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth1Auth {
    pub consumer_key: String,
    pub oauth_token: String,
    pub oauth_token_secret: String,
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// OAuth 2 tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Auth {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<String>,
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// The single active credential of an integration instance.
///
/// Serialized with the same key the shape uses inside a [`Config`], e.g.
/// `{"oauth2_auth": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Authorization {
    #[serde(rename = "basic_auth")]
    Basic(BasicAuth),
    #[serde(rename = "apikey_auth")]
    ApiKey(ApiKeyAuth),
    #[serde(rename = "oauth1_auth")]
    OAuth1(OAuth1Auth),
    #[serde(rename = "oauth2_auth")]
    OAuth2(OAuth2Auth),
}

impl Authorization {
    /// Unix timestamp (milliseconds) when the credential was created.
    pub fn created(&self) -> i64 {
        match self {
            Self::Basic(a) => a.created,
            Self::ApiKey(a) => a.created,
            Self::OAuth1(a) => a.created,
            Self::OAuth2(a) => a.created,
        }
    }

    /// URL of the system the credential was issued for, if recorded.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Basic(a) => a.url.as_deref(),
            Self::ApiKey(a) => a.url.as_deref(),
            Self::OAuth1(a) => a.url.as_deref(),
            Self::OAuth2(a) => a.url.as_deref(),
        }
    }

    /// Derive the active credential from a stored config.
    ///
    /// When more than one shape is present, OAuth2 wins, then OAuth1, basic
    /// and finally API key.
    pub fn from_config(config: &Config) -> Option<Self> {
        if let Some(a) = config.typed(OAUTH2_KEY) {
            return Some(Self::OAuth2(a));
        }
        if let Some(a) = config.typed(OAUTH1_KEY) {
            return Some(Self::OAuth1(a));
        }
        if let Some(a) = config.typed(BASIC_KEY) {
            return Some(Self::Basic(a));
        }
        config.typed(APIKEY_KEY).map(Self::ApiKey)
    }

    fn key(&self) -> &'static str {
        match self {
            Self::Basic(_) => BASIC_KEY,
            Self::ApiKey(_) => APIKEY_KEY,
            Self::OAuth1(_) => OAUTH1_KEY,
            Self::OAuth2(_) => OAUTH2_KEY,
        }
    }
}

const BASIC_KEY: &str = "basic_auth";
const APIKEY_KEY: &str = "apikey_auth";
const OAUTH1_KEY: &str = "oauth1_auth";
const OAUTH2_KEY: &str = "oauth2_auth";

/// An account selected for export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigAccount {
    pub id: String,
    /// `ORG` or `USER`.
    #[serde(rename = "type")]
    pub kind: String,
    pub public: bool,
}

/// Open-ended key/value bag of persisted integration settings.
///
/// The host's persistence collaborator owns the canonical copy; each side
/// keeps a cached copy and replaces it wholesale, never field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config(Map<String, Value>);

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The serialized form used for change detection.
    pub fn fingerprint(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }

    /// True when both configs serialize identically.
    pub fn same_as(&self, other: &Config) -> bool {
        self.fingerprint() == other.fingerprint()
    }

    pub fn integration_type(&self) -> Option<IntegrationType> {
        self.typed("integration_type")
    }

    pub fn inclusions(&self) -> Option<BTreeMap<String, String>> {
        self.typed("inclusions")
    }

    pub fn exclusions(&self) -> Option<BTreeMap<String, String>> {
        self.typed("exclusions")
    }

    pub fn accounts(&self) -> Option<BTreeMap<String, ConfigAccount>> {
        self.typed("accounts")
    }

    pub fn authorization(&self) -> Option<Authorization> {
        Authorization::from_config(self)
    }

    /// Store `auth` under its key, removing every other credential shape.
    pub fn set_authorization(&mut self, auth: &Authorization) {
        for key in [BASIC_KEY, APIKEY_KEY, OAUTH1_KEY, OAUTH2_KEY] {
            self.0.remove(key);
        }
        let body = match auth {
            Authorization::Basic(a) => serde_json::to_value(a),
            Authorization::ApiKey(a) => serde_json::to_value(a),
            Authorization::OAuth1(a) => serde_json::to_value(a),
            Authorization::OAuth2(a) => serde_json::to_value(a),
        };
        match body {
            Ok(body) => {
                self.0.insert(auth.key().to_string(), body);
            }
            Err(e) => tracing::warn!("failed to encode authorization: {}", e),
        }
    }

    fn typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.0.get(key)?;
        if value.is_null() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

impl From<Map<String, Value>> for Config {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
