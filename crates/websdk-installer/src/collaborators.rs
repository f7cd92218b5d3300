//! Privileged operations the installer delegates to the embedding application.

use async_trait::async_trait;
use serde_json::Value;
use websdk_core::{Config, InstallLocation, Integration, ToastOptions};

/// A collaborator rejected the operation. The message is forwarded to the
/// integration in the reply's `err` field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CollaboratorError {
    message: String,
}

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Callbacks supplied by the host application, one per capability.
///
/// Each receives the integration descriptor with its current `installed`
/// flag.
#[async_trait]
pub trait Collaborators: Send + Sync {
    async fn set_install_enabled(
        &self,
        integration: &Integration,
        enabled: bool,
    ) -> Result<(), CollaboratorError>;

    /// `None` means nothing stored yet and is served as an empty config.
    async fn get_config(&self, integration: &Integration)
    -> Result<Option<Config>, CollaboratorError>;

    async fn set_config(
        &self,
        integration: &Integration,
        config: &Config,
    ) -> Result<(), CollaboratorError>;

    async fn on_install(&self, integration: &Integration) -> Result<(), CollaboratorError>;

    async fn on_remove(&self, integration: &Integration) -> Result<(), CollaboratorError>;

    async fn on_auth1_connect(
        &self,
        integration: &Integration,
        url: &str,
    ) -> Result<(), CollaboratorError>;

    async fn on_validate(
        &self,
        integration: &Integration,
        config: &Config,
    ) -> Result<Value, CollaboratorError>;

    fn set_self_managed_agent_required(&self);

    async fn get_private_key(
        &self,
        integration: &Integration,
    ) -> Result<Option<String>, CollaboratorError>;

    async fn set_private_key(
        &self,
        integration: &Integration,
        key: &str,
    ) -> Result<(), CollaboratorError>;

    async fn set_install_location(
        &self,
        integration: &Integration,
        location: InstallLocation,
    ) -> Result<(), CollaboratorError>;

    async fn set_upgrade_complete(&self, integration: &Integration)
    -> Result<(), CollaboratorError>;

    fn add_toast(&self, message: &str, options: &ToastOptions);
}
