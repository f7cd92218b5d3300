//! Host-supplied context carried in payloads.

use serde::{Deserialize, Serialize};

pub use crate::config::IntegrationType as InstallLocation;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Identity and environment of the signed-in user. Read-only to the
/// integration and delivered once, in `INIT`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub customer: Customer,
    pub user: User,
    /// Environment tag, e.g. `stable` or `edge`.
    pub env: String,
    #[serde(rename = "graphqlUrl")]
    pub graphql_url: String,
    #[serde(rename = "authUrl")]
    pub auth_url: String,
}

/// Export progress of an installed integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<i64>,
    #[serde(default)]
    pub processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_export_requested_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_export_completed_date: Option<i64>,
    #[serde(default)]
    pub throttled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttled_until_date: Option<i64>,
}

/// A customer-hosted agent, when one is enrolled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfManagedAgent {
    pub enrollment_id: String,
    #[serde(default)]
    pub running: bool,
}

/// Set when the installed integration needs the user to re-run setup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeRequired {
    pub message: String,
    #[serde(default)]
    pub requires_reauth: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OAuthVersion {
    #[serde(rename = "1")]
    Version1,
    #[serde(rename = "2")]
    Version2,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastAppearance {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToastOptions {
    #[serde(default)]
    pub appearance: ToastAppearance,
    #[serde(default)]
    pub auto_dismiss: bool,
}
