//! UI-visible state derived from host messages.

use websdk_core::{
    Authorization, Config, ProcessingDetail, SelfManagedAgent, Session, UpgradeRequired,
};

/// Context lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lifecycle {
    /// Not listening yet.
    #[default]
    Uninitialized,
    /// Listening; waiting for `INIT` and the config fetch it triggers.
    AwaitingInit,
    /// Seeded by the host. Interaction allowed.
    Ready,
    /// Torn down; `EXIT` has been sent.
    Exited,
}

/// Snapshot of everything integration UI code renders from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrationState {
    pub lifecycle: Lifecycle,
    /// Installer instance id, from `INIT`.
    pub id: Option<String>,
    /// The host's top-level URL.
    pub url: String,
    pub installed: bool,
    /// This load continues an OAuth redirect.
    pub redirected: bool,
    /// The user asked to replace the current credential.
    pub re_auth: bool,
    pub config: Config,
    pub authorization: Option<Authorization>,
    pub processing_detail: Option<ProcessingDetail>,
    pub self_managed_agent: Option<SelfManagedAgent>,
    pub session: Option<Session>,
    pub upgrade_required: Option<UpgradeRequired>,
    /// Last validation failure, shown inline until the next successful validation.
    pub validation_error: Option<String>,
}

impl IntegrationState {
    /// UI must show a loader and suppress interaction while this is true.
    pub fn loading(&self) -> bool {
        self.lifecycle != Lifecycle::Ready
    }
}
