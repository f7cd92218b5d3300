//! Host-side runtime.
//!
//! An [`Installer`] owns one integration iframe. It seeds the frame with
//! `INIT` after load, reveals it once the integration signals ready, and
//! serves the integration's requests by delegating to [`Collaborators`] and
//! an [`AgentBackend`]. Requests are served in arrival order, and every
//! reply is posted only if the frame that asked is still mounted at the
//! moment of sending.

mod backend;
mod collaborators;
mod environment;
mod error;
mod urls;
mod view;

pub use backend::{AgentBackend, BackendError, GraphqlBackend};
pub use collaborators::{CollaboratorError, Collaborators};
pub use environment::{HostEnvironment, SimulatedEnvironment};
pub use error::InstallerError;
pub use urls::{OAuthTarget, app_oauth_url, has_redirect_marker, redirect_url, strip_redirect_marker};
pub use view::{InstallerLifecycle, InstallerView};

use serde_json::Value;
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use websdk_core::{
    Authorization, CommandKind, Config, DecodeError, Envelope, FetchRequest, HostMessage, Inbox,
    InitPayload, Integration, IntegrationMessage, Message, ProcessingDetail, SelfManagedAgent,
    Session, Transport, UpgradeRequired, scrub_headers,
};

/// Everything the host knows about the integration instance it embeds.
#[derive(Debug, Clone, Default)]
pub struct InstallerProps {
    /// Integration instance id.
    pub id: String,
    pub integration: Integration,
    pub authorization: Option<Authorization>,
    pub processing_detail: Option<ProcessingDetail>,
    pub self_managed_agent: Option<SelfManagedAgent>,
    pub session: Option<Session>,
    pub upgrade_required: Option<UpgradeRequired>,
}

impl InstallerProps {
    pub fn new(id: impl Into<String>, integration: Integration) -> Self {
        Self {
            id: id.into(),
            integration,
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct Inner {
    /// The iframe's content window; `None` once torn down.
    frame: Option<Arc<dyn Transport>>,
    /// `INIT` has been sent to the current frame.
    loaded: bool,
    /// Last config seen from the store or the integration.
    current_config: Config,
    /// OAuth URL override pushed by the integration.
    oauth_url: Option<String>,
    /// Bumped on every mount and unmount.
    generation: u64,
}

pub struct Installer {
    props: InstallerProps,
    collaborators: Arc<dyn Collaborators>,
    backend: Arc<dyn AgentBackend>,
    env: Arc<dyn HostEnvironment>,
    inner: Mutex<Inner>,
    view: watch::Sender<InstallerView>,
}

impl Installer {
    pub fn new(
        props: InstallerProps,
        collaborators: Arc<dyn Collaborators>,
        backend: Arc<dyn AgentBackend>,
        env: Arc<dyn HostEnvironment>,
    ) -> Self {
        let (view, _) = watch::channel(InstallerView {
            installed: props.integration.installed,
            ..Default::default()
        });
        Self {
            props,
            collaborators,
            backend,
            env,
            inner: Mutex::new(Inner::default()),
            view,
        }
    }

    pub fn props(&self) -> &InstallerProps {
        &self.props
    }

    pub fn subscribe(&self) -> watch::Receiver<InstallerView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> InstallerView {
        self.view.borrow().clone()
    }

    /// Attach a freshly created (hidden) iframe.
    pub fn mount(&self, frame: Arc<dyn Transport>) {
        {
            let mut inner = self.inner();
            inner.frame = Some(frame);
            inner.loaded = false;
            inner.generation += 1;
        }
        self.view.send_modify(|v| {
            v.lifecycle = InstallerLifecycle::FrameLoading;
            v.frame_visible = false;
        });
        tracing::info!(integration = %self.props.integration.ref_type, "integration frame mounted");
    }

    /// Tear the iframe down. Replies still being computed are dropped.
    pub fn unmount(&self) {
        {
            let mut inner = self.inner();
            inner.frame = None;
            inner.loaded = false;
            inner.generation += 1;
        }
        self.view.send_modify(|v| {
            v.lifecycle = InstallerLifecycle::Unmounted;
            v.frame_visible = false;
        });
        tracing::info!(integration = %self.props.integration.ref_type, "integration frame unmounted");
    }

    /// The iframe's load event. Sends `INIT` unless it was already sent to
    /// this frame; returns whether it did.
    pub fn on_frame_load(&self) -> bool {
        {
            let mut inner = self.inner();
            if inner.frame.is_none() || inner.loaded {
                return false;
            }
            inner.loaded = true;
        }

        let mut url = self.env.current_url();
        let redirected = has_redirect_marker(&url);
        if redirected {
            url = strip_redirect_marker(&url);
            self.env.replace_url(&url);
        }

        let payload = InitPayload {
            id: self.props.id.clone(),
            url,
            installed: self.view.borrow().installed,
            redirected,
            authorization: self.props.authorization.clone(),
            processing_detail: self.props.processing_detail.clone(),
            self_managed_agent: self.props.self_managed_agent.clone(),
            session: self.props.session.clone(),
            upgrade_required: self.props.upgrade_required.clone(),
        };
        self.send(HostMessage::Init(payload));

        self.view.send_if_modified(|v| {
            if v.lifecycle == InstallerLifecycle::FrameLoading {
                v.lifecycle = InstallerLifecycle::AwaitingReady;
                true
            } else {
                false
            }
        });
        true
    }

    /// Serve the frame's inbox until it closes. Messages are handled one at
    /// a time so writes land in the order the integration sent them.
    pub async fn listen(self: Arc<Self>, mut inbox: Inbox) {
        while let Some(raw) = inbox.recv().await {
            self.handle_message(&raw).await;
        }
        tracing::debug!(integration = %self.props.integration.ref_type, "installer inbox closed");
    }

    /// Process one message from the window bus.
    pub async fn handle_message(&self, raw: &Value) {
        let envelope = match Envelope::<IntegrationMessage>::decode(raw) {
            Ok(envelope) => envelope,
            Err(DecodeError::Foreign) => return,
            Err(e @ DecodeError::UnknownCommand(_)) => {
                tracing::trace!("ignoring integration message: {}", e);
                return;
            }
            Err(e) => {
                tracing::warn!("invalid integration message: {}", e);
                return;
            }
        };
        if let Some(ref_type) = &envelope.ref_type {
            if *ref_type != self.props.integration.ref_type {
                tracing::trace!(%ref_type, "message for another integration");
                return;
            }
        }
        let kind = envelope.message.kind();
        if self.view.borrow().lifecycle == InstallerLifecycle::Unmounted {
            tracing::debug!(command = %kind, "installer unmounted, message ignored");
            return;
        }
        tracing::debug!(command = %kind, integration = %self.props.integration.ref_type, "installer received message");

        let generation = self.inner().generation;
        let integration = self.integration();
        match envelope.message {
            IntegrationMessage::InitAck => self.mark_ready(),
            IntegrationMessage::SetInstallEnabled { value } => {
                self.mark_ready();
                let result = self
                    .collaborators
                    .set_install_enabled(&integration, value)
                    .await;
                if self.failed(kind, result).is_ok() {
                    self.view.send_if_modified(|v| {
                        let changed = v.install_enabled != value;
                        v.install_enabled = value;
                        changed
                    });
                }
            }
            IntegrationMessage::GetConfig => {
                let result = self.collaborators.get_config(&integration).await;
                let result = self.failed(kind, result).map(Option::unwrap_or_default);
                if let Ok(config) = &result {
                    self.inner().current_config = config.clone();
                }
                self.reply(generation, HostMessage::config_reply(result));
            }
            IntegrationMessage::SetConfig { value } => {
                self.mark_ready();
                let result = self.collaborators.set_config(&integration, &value).await;
                // an unpersisted write is not echoed back as if it were stored
                if self.failed(kind, result).is_ok() {
                    self.sync_config(Some(generation), value);
                }
            }
            IntegrationMessage::SetAppOAuthUrl { url } => {
                self.inner().oauth_url = Some(url);
            }
            IntegrationMessage::GetRedirectUrl => {
                let url = redirect_url(&self.env.current_url());
                self.reply(generation, HostMessage::redirect_url_reply(Ok(url)));
            }
            IntegrationMessage::GetAppOAuthUrl {
                redirect_to,
                version,
                baseuri,
            } => {
                let override_url = self.inner().oauth_url.clone();
                let target = OAuthTarget {
                    ref_type: &self.props.integration.ref_type,
                    instance_id: &self.props.id,
                    session: self.props.session.as_ref(),
                };
                let result = app_oauth_url(
                    &target,
                    override_url.as_deref(),
                    &redirect_to,
                    version,
                    baseuri.as_deref(),
                );
                self.reply(generation, HostMessage::app_oauth_url_reply(self.failed(kind, result)));
            }
            IntegrationMessage::SetRedirectTo { url } => self.env.navigate(&url),
            IntegrationMessage::SetOAuth1Connect { url } => {
                let result = self
                    .collaborators
                    .on_auth1_connect(&integration, &url)
                    .await;
                self.send_ack(generation, kind, result);
            }
            IntegrationMessage::SetValidate { config } => {
                let result = self.collaborators.on_validate(&integration, &config).await;
                self.reply(generation, HostMessage::validate_reply(self.failed(kind, result)));
            }
            IntegrationMessage::Fetch(request) => {
                let request = FetchRequest {
                    headers: request.headers.as_ref().map(scrub_headers),
                    ..request
                };
                let result = self.backend.fetch(&request).await;
                self.reply(generation, HostMessage::fetch_reply(self.failed(kind, result)));
            }
            IntegrationMessage::SetSelfManagedAgentRequired => {
                self.collaborators.set_self_managed_agent_required();
                self.send_ack(generation, kind, Ok(()));
            }
            IntegrationMessage::CreatePrivateKey => {
                let result = self.backend.create_private_key().await;
                self.reply(generation, HostMessage::private_key_created(self.failed(kind, result)));
            }
            IntegrationMessage::SetPrivateKey { value } => {
                let result = self
                    .collaborators
                    .set_private_key(&integration, &value)
                    .await;
                self.send_ack(generation, kind, result);
            }
            IntegrationMessage::GetPrivateKey => {
                let result = self.collaborators.get_private_key(&integration).await;
                self.reply(generation, HostMessage::private_key_reply(self.failed(kind, result)));
            }
            IntegrationMessage::SetInstallLocation { value } => {
                let result = self
                    .collaborators
                    .set_install_location(&integration, value)
                    .await;
                self.send_ack(generation, kind, result);
            }
            IntegrationMessage::SetUpgradeComplete => {
                let result = self.collaborators.set_upgrade_complete(&integration).await;
                self.send_ack(generation, kind, result);
            }
            IntegrationMessage::AddToast { message, options } => {
                self.collaborators.add_toast(&message, &options);
            }
            IntegrationMessage::HandleAuthChangeAck => {
                tracing::debug!("integration handled auth change");
            }
            IntegrationMessage::Exit => {
                tracing::debug!(integration = %self.props.integration.ref_type, "integration frame exited");
            }
        }
    }

    /// Push a config into the frame if it differs from the last known copy.
    /// Returns whether a push was sent.
    pub fn push_config(&self, config: Config) -> bool {
        self.sync_config(None, config)
    }

    fn sync_config(&self, generation: Option<u64>, config: Config) -> bool {
        {
            let mut inner = self.inner();
            if inner.current_config.same_as(&config) {
                return false;
            }
            inner.current_config = config.clone();
        }
        self.post(generation, HostMessage::PushConfig { config })
    }

    /// The user clicked the install/remove action. Installs directly, or
    /// opens the removal confirmation if already installed.
    pub async fn handle_install(&self) -> Result<(), InstallerError> {
        let view = self.view();
        if view.lifecycle != InstallerLifecycle::Ready {
            return Err(InstallerError::NotReady(view.lifecycle));
        }
        if view.installed {
            self.view
                .send_modify(|v| v.lifecycle = InstallerLifecycle::ConfirmingRemoval);
            return Ok(());
        }
        if !view.install_enabled {
            return Err(InstallerError::InstallDisabled);
        }

        self.view
            .send_modify(|v| v.lifecycle = InstallerLifecycle::Installing);
        let result = self.collaborators.on_install(&self.integration()).await;
        self.view.send_modify(|v| {
            if v.lifecycle == InstallerLifecycle::Installing {
                v.lifecycle = InstallerLifecycle::Ready;
            }
            if result.is_ok() {
                v.installed = true;
            }
        });
        result.map_err(|e| {
            tracing::error!(integration = %self.props.integration.ref_type, "install failed: {}", e);
            InstallerError::from(e)
        })
    }

    /// Confirm the pending removal.
    pub async fn confirm_removal(&self) -> Result<(), InstallerError> {
        if !self.view.borrow().confirming_removal() {
            return Err(InstallerError::NoRemovalPending);
        }
        self.view
            .send_modify(|v| v.lifecycle = InstallerLifecycle::Uninstalling);
        self.inner().loaded = false;

        let result = self.collaborators.on_remove(&self.integration()).await;
        self.view.send_modify(|v| {
            if v.lifecycle == InstallerLifecycle::Uninstalling {
                v.lifecycle = InstallerLifecycle::Ready;
            }
            if result.is_ok() {
                v.installed = false;
                v.install_enabled = false;
            }
        });
        result.map_err(|e| {
            tracing::error!(integration = %self.props.integration.ref_type, "remove failed: {}", e);
            InstallerError::from(e)
        })
    }

    /// Close the removal dialog without removing. The frame will be
    /// re-seeded with `INIT` on its next load.
    pub fn cancel_removal(&self) -> bool {
        let cancelled = self.view.send_if_modified(|v| {
            if v.confirming_removal() {
                v.lifecycle = InstallerLifecycle::Ready;
                true
            } else {
                false
            }
        });
        if cancelled {
            self.inner().loaded = false;
        }
        cancelled
    }

    /// Tell the integration the user wants to replace its credential.
    pub fn handle_auth_change(&self) -> bool {
        self.send(HostMessage::HandleAuthChange)
    }

    fn mark_ready(&self) {
        let revealed = self.view.send_if_modified(|v| {
            if v.lifecycle == InstallerLifecycle::AwaitingReady {
                v.lifecycle = InstallerLifecycle::Ready;
                v.frame_visible = true;
                true
            } else {
                false
            }
        });
        if revealed {
            tracing::info!(integration = %self.props.integration.ref_type, "integration frame ready");
        }
    }

    fn integration(&self) -> Integration {
        let mut integration = self.props.integration.clone();
        integration.installed = self.view.borrow().installed;
        integration
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Log a failed operation and turn it into the reply's `err` text.
    fn failed<T, E: Display>(&self, kind: CommandKind, result: Result<T, E>) -> Result<T, String> {
        result.map_err(|e| {
            tracing::error!(
                command = %kind,
                integration = %self.props.integration.ref_type,
                "{}", e
            );
            e.to_string()
        })
    }

    fn send_ack(&self, generation: u64, kind: CommandKind, result: Result<(), CollaboratorError>) {
        let result = self.failed(kind, result);
        if let Some(reply) = HostMessage::ack(kind, result) {
            self.reply(generation, reply);
        }
    }

    fn send(&self, message: HostMessage) -> bool {
        self.post(None, message)
    }

    /// Answer a request, unless the frame that sent it has since been
    /// unmounted or replaced.
    fn reply(&self, generation: u64, message: HostMessage) -> bool {
        self.post(Some(generation), message)
    }

    /// Post into the current frame, or only into the frame of `generation`
    /// when given. Returns whether it was posted.
    fn post(&self, generation: Option<u64>, message: HostMessage) -> bool {
        let kind = message.kind();
        let integration = &self.props.integration;
        let envelope =
            Envelope::new(message).with_target(&integration.publisher.name, &integration.ref_type);
        let raw = match envelope.encode() {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(command = %kind, "failed to encode message: {}", e);
                return false;
            }
        };
        let inner = self.inner();
        match &inner.frame {
            Some(frame) if generation.is_none_or(|g| g == inner.generation) => {
                frame.post(raw);
                true
            }
            Some(_) => {
                tracing::debug!(command = %kind, "ignored because the requesting iframe was replaced");
                false
            }
            None => {
                tracing::debug!(command = %kind, "ignored because iframe is being unloaded");
                false
            }
        }
    }
}
