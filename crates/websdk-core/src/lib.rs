//! Core types for the integration web SDK.
//!
//! An integration runs inside a sandboxed iframe and talks to the page that
//! embeds it (the installer) purely through posted messages. This crate holds
//! the contract both sides encode and decode against: the envelope, the
//! closed command vocabulary, the data model carried in payloads, the
//! transport seam, and the pending-operation tracker.

mod config;
mod fetch;
mod message;
mod model;
mod pending;
mod transport;

pub use config::{
    ApiKeyAuth, Authorization, BasicAuth, Config, ConfigAccount, IntegrationType, OAuth1Auth,
    OAuth2Auth,
};
pub use fetch::{FetchHeader, FetchRequest, FetchResponse, scrub_headers};
pub use message::{
    CommandKind, DecodeError, Envelope, HostMessage, InitPayload, IntegrationMessage, Message,
};
pub use model::{
    Customer, InstallLocation, OAuthVersion, ProcessingDetail, SelfManagedAgent, Session,
    ToastAppearance, ToastOptions, UpgradeRequired, User,
};
pub use pending::{Abandoned, PendingTable, Waiter};
pub use transport::{ChannelTransport, Inbox, Transport, channel};

use serde::{Deserialize, Serialize};

/// Tag placed in `source` on every message of this protocol family.
pub const PROTOCOL_SOURCE: &str = "agent.websdk";

/// Tag placed in `scope` on every message of the integration channel.
pub const PROTOCOL_SCOPE: &str = "INTEGRATION";

/// Header keys with this prefix are reserved for internal infrastructure
/// and never forwarded by the fetch proxy.
pub const RESERVED_HEADER_PREFIX: &str = "pinpt-";

/// Query parameter the host appends to its own URL before an OAuth
/// redirect so the reload can be recognised as a continuation.
pub const REDIRECT_MARKER: &str = "integration=redirect";

/// Publisher of an integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publisher {
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub url: String,
}

/// Static identity and presentation data for an embeddable integration.
///
/// Immutable for the lifetime of one installer except for `installed`,
/// which the host flips as the user installs or removes the integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Integration type, e.g. `github`. Used to address storage and OAuth paths.
    #[serde(rename = "refType")]
    pub ref_type: String,
    /// Icon URL.
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub publisher: Publisher,
    /// URL loaded into the iframe.
    #[serde(rename = "uiURL")]
    pub ui_url: String,
    #[serde(default)]
    pub errored: bool,
    #[serde(default, rename = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
