//! Protocol messages.
//!
//! Every message travels as a flat JSON object: the envelope tags (`source`,
//! `scope`, `publisher`, `refType`) sit next to the `command` tag and its
//! payload fields. A reply reuses the `command` of its request and carries
//! either the success field or `err`, never both.

use crate::config::Config;
use crate::fetch::{FetchHeader, FetchRequest, FetchResponse};
use crate::model::{
    InstallLocation, OAuthVersion, ProcessingDetail, SelfManagedAgent, Session, ToastOptions,
    UpgradeRequired,
};
use crate::{Authorization, PROTOCOL_SCOPE, PROTOCOL_SOURCE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The closed command vocabulary, independent of direction.
///
/// Requests and their replies share a kind, which is what pending
/// operations are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Init,
    InitAck,
    HandleAuthChange,
    HandleAuthChangeAck,
    Exit,
    SetInstallEnabled,
    GetConfig,
    SetConfig,
    SetRedirectTo,
    GetRedirectUrl,
    SetAppOAuthUrl,
    GetAppOAuthUrl,
    SetOAuth1Connect,
    SetValidate,
    Fetch,
    SetSelfManagedAgentRequired,
    CreatePrivateKey,
    SetPrivateKey,
    GetPrivateKey,
    SetInstallLocation,
    SetUpgradeComplete,
    AddToast,
}

const WIRE_NAMES: &[(CommandKind, &str)] = &[
    (CommandKind::Init, "INIT"),
    (CommandKind::InitAck, "init"),
    (CommandKind::HandleAuthChange, "handleAuthChange"),
    (CommandKind::HandleAuthChangeAck, "handleAuthChangeAck"),
    (CommandKind::Exit, "EXIT"),
    (CommandKind::SetInstallEnabled, "setInstallEnabled"),
    (CommandKind::GetConfig, "getConfig"),
    (CommandKind::SetConfig, "setConfig"),
    (CommandKind::SetRedirectTo, "setRedirectTo"),
    (CommandKind::GetRedirectUrl, "getRedirectURL"),
    (CommandKind::SetAppOAuthUrl, "setAppOAuthURL"),
    (CommandKind::GetAppOAuthUrl, "getAppOAuthURL"),
    (CommandKind::SetOAuth1Connect, "setOAuth1Connect"),
    (CommandKind::SetValidate, "setValidate"),
    (CommandKind::Fetch, "fetch"),
    (CommandKind::SetSelfManagedAgentRequired, "setSelfManagedAgentRequired"),
    (CommandKind::CreatePrivateKey, "createPrivateKey"),
    (CommandKind::SetPrivateKey, "setPrivateKey"),
    (CommandKind::GetPrivateKey, "getPrivateKey"),
    (CommandKind::SetInstallLocation, "setInstallLocation"),
    (CommandKind::SetUpgradeComplete, "setUpgradeComplete"),
    (CommandKind::AddToast, "addToast"),
];

impl CommandKind {
    /// The `command` string used on the wire.
    pub fn wire_name(self) -> &'static str {
        WIRE_NAMES
            .iter()
            .find(|(k, _)| *k == self)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }

    /// Look up a wire name. Matching is exact: `INIT` and `init` differ.
    pub fn from_wire(name: &str) -> Option<Self> {
        WIRE_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(k, _)| *k)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A direction-specific message body.
pub trait Message: Serialize + DeserializeOwned {
    fn kind(&self) -> CommandKind;

    /// Whether this direction defines `kind` at all.
    fn accepts(kind: CommandKind) -> bool;
}

/// Seed state the host sends once the iframe has loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    pub id: String,
    /// The host's top-level document URL.
    pub url: String,
    pub installed: bool,
    /// True when this load continues an OAuth redirect.
    pub redirected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<Authorization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_detail: Option<ProcessingDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_managed_agent: Option<SelfManagedAgent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_required: Option<UpgradeRequired>,
}

/// Messages sent from the integration frame to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum IntegrationMessage {
    /// Ready signal; unblocks the host's loading UI.
    #[serde(rename = "init")]
    InitAck,
    #[serde(rename = "setInstallEnabled")]
    SetInstallEnabled { value: bool },
    #[serde(rename = "getConfig")]
    GetConfig,
    #[serde(rename = "setConfig")]
    SetConfig { value: Config },
    /// Ask the host to navigate the top-level document.
    #[serde(rename = "setRedirectTo")]
    SetRedirectTo { url: String },
    #[serde(rename = "getRedirectURL")]
    GetRedirectUrl,
    /// Override the OAuth URL the host hands out.
    #[serde(rename = "setAppOAuthURL")]
    SetAppOAuthUrl { url: String },
    #[serde(rename = "getAppOAuthURL")]
    GetAppOAuthUrl {
        #[serde(rename = "redirectTo")]
        redirect_to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<OAuthVersion>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        baseuri: Option<String>,
    },
    #[serde(rename = "setOAuth1Connect")]
    SetOAuth1Connect { url: String },
    #[serde(rename = "setValidate")]
    SetValidate { config: Config },
    #[serde(rename = "fetch")]
    Fetch(FetchRequest),
    #[serde(rename = "setSelfManagedAgentRequired")]
    SetSelfManagedAgentRequired,
    #[serde(rename = "createPrivateKey")]
    CreatePrivateKey,
    #[serde(rename = "setPrivateKey")]
    SetPrivateKey { value: String },
    #[serde(rename = "getPrivateKey")]
    GetPrivateKey,
    #[serde(rename = "setInstallLocation")]
    SetInstallLocation { value: InstallLocation },
    #[serde(rename = "setUpgradeComplete")]
    SetUpgradeComplete,
    #[serde(rename = "addToast")]
    AddToast {
        message: String,
        #[serde(default)]
        options: ToastOptions,
    },
    #[serde(rename = "handleAuthChangeAck")]
    HandleAuthChangeAck,
    /// Sent on teardown. Best effort, never acknowledged.
    #[serde(rename = "EXIT")]
    Exit,
}

impl Message for IntegrationMessage {
    fn kind(&self) -> CommandKind {
        match self {
            Self::InitAck => CommandKind::InitAck,
            Self::SetInstallEnabled { .. } => CommandKind::SetInstallEnabled,
            Self::GetConfig => CommandKind::GetConfig,
            Self::SetConfig { .. } => CommandKind::SetConfig,
            Self::SetRedirectTo { .. } => CommandKind::SetRedirectTo,
            Self::GetRedirectUrl => CommandKind::GetRedirectUrl,
            Self::SetAppOAuthUrl { .. } => CommandKind::SetAppOAuthUrl,
            Self::GetAppOAuthUrl { .. } => CommandKind::GetAppOAuthUrl,
            Self::SetOAuth1Connect { .. } => CommandKind::SetOAuth1Connect,
            Self::SetValidate { .. } => CommandKind::SetValidate,
            Self::Fetch(_) => CommandKind::Fetch,
            Self::SetSelfManagedAgentRequired => CommandKind::SetSelfManagedAgentRequired,
            Self::CreatePrivateKey => CommandKind::CreatePrivateKey,
            Self::SetPrivateKey { .. } => CommandKind::SetPrivateKey,
            Self::GetPrivateKey => CommandKind::GetPrivateKey,
            Self::SetInstallLocation { .. } => CommandKind::SetInstallLocation,
            Self::SetUpgradeComplete => CommandKind::SetUpgradeComplete,
            Self::AddToast { .. } => CommandKind::AddToast,
            Self::HandleAuthChangeAck => CommandKind::HandleAuthChangeAck,
            Self::Exit => CommandKind::Exit,
        }
    }

    fn accepts(kind: CommandKind) -> bool {
        !matches!(kind, CommandKind::Init | CommandKind::HandleAuthChange)
    }
}

/// Messages sent from the host into the integration frame.
///
/// Reply variants share the `command` of the request they answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum HostMessage {
    #[serde(rename = "INIT")]
    Init(InitPayload),
    /// The user asked to change the credential of an installed integration.
    #[serde(rename = "handleAuthChange")]
    HandleAuthChange,
    #[serde(rename = "getConfig")]
    Config {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<Config>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
    /// Host push of the full config; also the echo of an integration write.
    #[serde(rename = "setConfig")]
    PushConfig { config: Config },
    #[serde(rename = "getRedirectURL")]
    RedirectUrl {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
    #[serde(rename = "getAppOAuthURL")]
    AppOAuthUrl {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
    #[serde(rename = "setOAuth1Connect")]
    OAuth1Connect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
    #[serde(rename = "setValidate")]
    Validate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
    #[serde(rename = "fetch")]
    Fetch {
        #[serde(default, rename = "statusCode", skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<Vec<FetchHeader>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
    #[serde(rename = "setSelfManagedAgentRequired")]
    SelfManagedAgentRequired {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
    #[serde(rename = "createPrivateKey")]
    PrivateKeyCreated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
    #[serde(rename = "setPrivateKey")]
    PrivateKeySaved {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
    #[serde(rename = "getPrivateKey")]
    PrivateKey {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
    #[serde(rename = "setInstallLocation")]
    InstallLocationSaved {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
    #[serde(rename = "setUpgradeComplete")]
    UpgradeCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
}

fn split<T>(result: Result<T, String>) -> (Option<T>, Option<String>) {
    match result {
        Ok(v) => (Some(v), None),
        Err(e) => (None, Some(e)),
    }
}

impl HostMessage {
    pub fn config_reply(result: Result<Config, String>) -> Self {
        let (config, err) = split(result);
        Self::Config { config, err }
    }

    pub fn redirect_url_reply(result: Result<String, String>) -> Self {
        let (url, err) = split(result);
        Self::RedirectUrl { url, err }
    }

    pub fn app_oauth_url_reply(result: Result<String, String>) -> Self {
        let (url, err) = split(result);
        Self::AppOAuthUrl { url, err }
    }

    pub fn validate_reply(result: Result<Value, String>) -> Self {
        let (result, err) = split(result);
        Self::Validate { result, err }
    }

    pub fn fetch_reply(result: Result<FetchResponse, String>) -> Self {
        match result {
            Ok(r) => Self::Fetch {
                status_code: Some(r.status_code),
                headers: Some(r.headers),
                body: Some(r.body),
                err: None,
            },
            Err(e) => Self::Fetch {
                status_code: None,
                headers: None,
                body: None,
                err: Some(e),
            },
        }
    }

    pub fn private_key_created(result: Result<String, String>) -> Self {
        let (result, err) = split(result);
        Self::PrivateKeyCreated { result, err }
    }

    pub fn private_key_reply(result: Result<Option<String>, String>) -> Self {
        let (value, err) = split(result);
        Self::PrivateKey {
            value: value.flatten(),
            err,
        }
    }

    /// Reply for a request whose only outcome is success or `err`.
    ///
    /// Returns `None` for kinds that carry a success payload.
    pub fn ack(kind: CommandKind, result: Result<(), String>) -> Option<Self> {
        let err = result.err();
        Some(match kind {
            CommandKind::SetOAuth1Connect => Self::OAuth1Connect { err },
            CommandKind::SetSelfManagedAgentRequired => Self::SelfManagedAgentRequired { err },
            CommandKind::SetPrivateKey => Self::PrivateKeySaved { err },
            CommandKind::SetInstallLocation => Self::InstallLocationSaved { err },
            CommandKind::SetUpgradeComplete => Self::UpgradeCompleted { err },
            _ => return None,
        })
    }

    /// The `err` field of a reply, if the request failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Config { err, .. }
            | Self::RedirectUrl { err, .. }
            | Self::AppOAuthUrl { err, .. }
            | Self::OAuth1Connect { err }
            | Self::Validate { err, .. }
            | Self::Fetch { err, .. }
            | Self::SelfManagedAgentRequired { err }
            | Self::PrivateKeyCreated { err, .. }
            | Self::PrivateKeySaved { err }
            | Self::PrivateKey { err, .. }
            | Self::InstallLocationSaved { err }
            | Self::UpgradeCompleted { err } => err.as_deref(),
            Self::Init(_) | Self::HandleAuthChange | Self::PushConfig { .. } => None,
        }
    }
}

impl Message for HostMessage {
    fn kind(&self) -> CommandKind {
        match self {
            Self::Init(_) => CommandKind::Init,
            Self::HandleAuthChange => CommandKind::HandleAuthChange,
            Self::Config { .. } => CommandKind::GetConfig,
            Self::PushConfig { .. } => CommandKind::SetConfig,
            Self::RedirectUrl { .. } => CommandKind::GetRedirectUrl,
            Self::AppOAuthUrl { .. } => CommandKind::GetAppOAuthUrl,
            Self::OAuth1Connect { .. } => CommandKind::SetOAuth1Connect,
            Self::Validate { .. } => CommandKind::SetValidate,
            Self::Fetch { .. } => CommandKind::Fetch,
            Self::SelfManagedAgentRequired { .. } => CommandKind::SetSelfManagedAgentRequired,
            Self::PrivateKeyCreated { .. } => CommandKind::CreatePrivateKey,
            Self::PrivateKeySaved { .. } => CommandKind::SetPrivateKey,
            Self::PrivateKey { .. } => CommandKind::GetPrivateKey,
            Self::InstallLocationSaved { .. } => CommandKind::SetInstallLocation,
            Self::UpgradeCompleted { .. } => CommandKind::SetUpgradeComplete,
        }
    }

    fn accepts(kind: CommandKind) -> bool {
        !matches!(
            kind,
            CommandKind::InitAck
                | CommandKind::HandleAuthChangeAck
                | CommandKind::Exit
                | CommandKind::SetInstallEnabled
                | CommandKind::SetRedirectTo
                | CommandKind::SetAppOAuthUrl
                | CommandKind::AddToast
        )
    }
}

/// Why an incoming value was not turned into a message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not ours: wrong `source` or `scope`, or not an object at all.
    #[error("message does not belong to this protocol")]
    Foreign,
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),
    #[error("malformed {command} message: {source}")]
    Malformed {
        command: CommandKind,
        #[source]
        source: serde_json::Error,
    },
}

/// A message plus the tags identifying protocol, channel and integration.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    pub source: String,
    pub scope: String,
    pub publisher: Option<String>,
    pub ref_type: Option<String>,
    pub message: M,
}

impl<M: Message> Envelope<M> {
    /// Wrap `message` with this protocol's `source` and `scope`.
    pub fn new(message: M) -> Self {
        Self {
            source: PROTOCOL_SOURCE.to_string(),
            scope: PROTOCOL_SCOPE.to_string(),
            publisher: None,
            ref_type: None,
            message,
        }
    }

    /// Address the envelope to one integration instance.
    pub fn with_target(mut self, publisher: impl Into<String>, ref_type: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self.ref_type = Some(ref_type.into());
        self
    }

    /// Flatten into the wire object.
    pub fn encode(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(&self.message)?;
        if let Value::Object(map) = &mut value {
            map.insert("source".into(), Value::String(self.source.clone()));
            map.insert("scope".into(), Value::String(self.scope.clone()));
            if let Some(publisher) = &self.publisher {
                map.insert("publisher".into(), Value::String(publisher.clone()));
            }
            if let Some(ref_type) = &self.ref_type {
                map.insert("refType".into(), Value::String(ref_type.clone()));
            }
        }
        Ok(value)
    }

    /// Parse a wire object, rejecting traffic that is not ours.
    pub fn decode(raw: &Value) -> Result<Self, DecodeError> {
        let obj = raw.as_object().ok_or(DecodeError::Foreign)?;
        let tag = |key: &str| obj.get(key).and_then(Value::as_str);
        if tag("source") != Some(PROTOCOL_SOURCE) || tag("scope") != Some(PROTOCOL_SCOPE) {
            return Err(DecodeError::Foreign);
        }

        let command = tag("command").unwrap_or_default();
        let kind = CommandKind::from_wire(command)
            .filter(|k| M::accepts(*k))
            .ok_or_else(|| DecodeError::UnknownCommand(command.to_string()))?;

        let message: M = serde_json::from_value(raw.clone())
            .map_err(|source| DecodeError::Malformed { command: kind, source })?;

        Ok(Self {
            source: PROTOCOL_SOURCE.to_string(),
            scope: PROTOCOL_SCOPE.to_string(),
            publisher: tag("publisher").map(str::to_string),
            ref_type: tag("refType").map(str::to_string),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn foreign_messages_are_rejected() {
        for raw in [
            json!({"source": "react-devtools", "scope": "INTEGRATION", "command": "getConfig"}),
            json!({"source": "agent.websdk", "scope": "OTHER", "command": "getConfig"}),
            json!({"command": "getConfig"}),
            json!("getConfig"),
        ] {
            assert!(matches!(
                Envelope::<IntegrationMessage>::decode(&raw),
                Err(DecodeError::Foreign)
            ));
        }
    }

    #[test]
    fn unknown_command_is_reported() {
        let raw = json!({"source": "agent.websdk", "scope": "INTEGRATION", "command": "teleport"});
        assert!(matches!(
            Envelope::<HostMessage>::decode(&raw),
            Err(DecodeError::UnknownCommand(c)) if c == "teleport"
        ));
    }

    #[test]
    fn direction_is_enforced() {
        // `setInstallEnabled` only flows from the integration to the host.
        let raw = json!({
            "source": "agent.websdk", "scope": "INTEGRATION",
            "command": "setInstallEnabled", "value": true,
        });
        assert!(Envelope::<IntegrationMessage>::decode(&raw).is_ok());
        assert!(matches!(
            Envelope::<HostMessage>::decode(&raw),
            Err(DecodeError::UnknownCommand(_))
        ));
    }

    #[test]
    fn init_and_ack_are_distinct() {
        assert_eq!(CommandKind::from_wire("INIT"), Some(CommandKind::Init));
        assert_eq!(CommandKind::from_wire("init"), Some(CommandKind::InitAck));
        assert_eq!(CommandKind::from_wire("Init"), None);
    }

    #[test]
    fn encode_is_flat() {
        let env = Envelope::new(IntegrationMessage::SetInstallEnabled { value: true })
            .with_target("pinpoint", "github");
        assert_eq!(
            env.encode().unwrap(),
            json!({
                "command": "setInstallEnabled",
                "value": true,
                "source": "agent.websdk",
                "scope": "INTEGRATION",
                "publisher": "pinpoint",
                "refType": "github",
            })
        );
    }

    #[test]
    fn decode_reads_tags_and_payload() {
        let raw = json!({
            "source": "agent.websdk", "scope": "INTEGRATION",
            "publisher": "pinpoint", "refType": "jira",
            "command": "getAppOAuthURL", "redirectTo": "https://app/x", "version": "1",
        });
        let env = Envelope::<IntegrationMessage>::decode(&raw).unwrap();
        assert_eq!(env.ref_type.as_deref(), Some("jira"));
        assert_eq!(
            env.message,
            IntegrationMessage::GetAppOAuthUrl {
                redirect_to: "https://app/x".into(),
                version: Some(OAuthVersion::Version1),
                baseuri: None,
            }
        );
    }

    #[test]
    fn malformed_payload_is_reported() {
        let raw = json!({
            "source": "agent.websdk", "scope": "INTEGRATION",
            "command": "setInstallEnabled", "value": "yes",
        });
        assert!(matches!(
            Envelope::<IntegrationMessage>::decode(&raw),
            Err(DecodeError::Malformed { command: CommandKind::SetInstallEnabled, .. })
        ));
    }

    #[test]
    fn reply_carries_value_or_err() {
        let ok = serde_json::to_value(HostMessage::redirect_url_reply(Ok("https://a".into()))).unwrap();
        assert_eq!(ok, json!({"command": "getRedirectURL", "url": "https://a"}));

        let err = serde_json::to_value(HostMessage::redirect_url_reply(Err("nope".into()))).unwrap();
        assert_eq!(err, json!({"command": "getRedirectURL", "err": "nope"}));
    }

    #[test]
    fn ack_only_for_payloadless_replies() {
        assert!(HostMessage::ack(CommandKind::SetPrivateKey, Ok(())).is_some());
        assert!(HostMessage::ack(CommandKind::GetConfig, Ok(())).is_none());
        let failed = HostMessage::ack(CommandKind::SetUpgradeComplete, Err("down".into())).unwrap();
        assert_eq!(failed.error(), Some("down"));
        assert_eq!(failed.kind(), CommandKind::SetUpgradeComplete);
    }

    #[test]
    fn every_kind_round_trips_its_wire_name() {
        for (kind, name) in WIRE_NAMES {
            assert_eq!(kind.wire_name(), *name);
            assert_eq!(CommandKind::from_wire(name), Some(*kind));
        }
    }
}
