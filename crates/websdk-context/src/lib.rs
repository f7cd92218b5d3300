//! Integration-side runtime.
//!
//! [`Context`] is the capability object handed to code running inside the
//! integration iframe. Each method turns into a message posted to the
//! parent window; methods that need an answer park a waiter keyed by
//! command and resume when the host's reply with the same command arrives.
//!
//! At most one call per command may be in flight. A second call of the same
//! kind replaces the first, whose future then fails with
//! [`ContextError::Abandoned`].

mod error;
mod state;

pub use error::ContextError;
pub use state::{IntegrationState, Lifecycle};

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use websdk_core::{
    CommandKind, Config, DecodeError, Envelope, FetchRequest, FetchResponse, HostMessage, Inbox,
    InitPayload, InstallLocation, IntegrationMessage, Message, OAuthVersion, PendingTable,
    ToastOptions, Transport, scrub_headers,
};

/// Invoked once when the host settles an OAuth1 connect handshake.
pub type OAuth1Callback = Box<dyn FnOnce(Result<(), ContextError>) + Send>;

#[derive(Default)]
struct Inner {
    /// An `INIT` is waiting on its config fetch.
    init_fetch: bool,
    oauth1_callback: Option<OAuth1Callback>,
}

/// The integration's handle on its host.
pub struct Context {
    parent: Arc<dyn Transport>,
    publisher: String,
    ref_type: String,
    pending: PendingTable<CommandKind, HostMessage>,
    inner: Mutex<Inner>,
    state: watch::Sender<IntegrationState>,
}

impl Context {
    pub fn new(
        parent: Arc<dyn Transport>,
        publisher: impl Into<String>,
        ref_type: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(IntegrationState::default());
        Self {
            parent,
            publisher: publisher.into(),
            ref_type: ref_type.into(),
            pending: PendingTable::new(),
            inner: Mutex::new(Inner::default()),
            state,
        }
    }

    /// Start accepting host messages.
    pub fn mount(&self) {
        self.state.send_if_modified(|s| {
            if s.lifecycle == Lifecycle::Uninitialized {
                s.lifecycle = Lifecycle::AwaitingInit;
                true
            } else {
                false
            }
        });
    }

    /// Observe state changes. The receiver sees a change whenever config,
    /// authorization, processing detail, readiness or any other field moves.
    pub fn subscribe(&self) -> watch::Receiver<IntegrationState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> IntegrationState {
        self.state.borrow().clone()
    }

    pub fn publisher(&self) -> &str {
        &self.publisher
    }

    pub fn ref_type(&self) -> &str {
        &self.ref_type
    }

    /// Drive the context from an inbox until the window closes.
    pub async fn listen(self: Arc<Self>, mut inbox: Inbox) {
        self.mount();
        while let Some(raw) = inbox.recv().await {
            self.handle_message(&raw);
        }
        tracing::debug!(ref_type = %self.ref_type, "integration inbox closed");
    }

    /// Process one message from the window bus.
    pub fn handle_message(&self, raw: &Value) {
        let envelope = match Envelope::<HostMessage>::decode(raw) {
            Ok(envelope) => envelope,
            Err(DecodeError::Foreign) => return,
            Err(e @ DecodeError::UnknownCommand(_)) => {
                tracing::trace!("ignoring host message: {}", e);
                return;
            }
            Err(e) => {
                tracing::warn!("invalid host message: {}", e);
                return;
            }
        };

        let lifecycle = self.state.borrow().lifecycle;
        if matches!(lifecycle, Lifecycle::Uninitialized | Lifecycle::Exited) {
            tracing::debug!(command = %envelope.message.kind(), ?lifecycle, "not listening, message dropped");
            return;
        }

        match envelope.message {
            HostMessage::Init(payload) => self.on_init(payload),
            HostMessage::PushConfig { config } => {
                self.replace_config(config);
            }
            HostMessage::HandleAuthChange => {
                self.state.send_if_modified(|s| !std::mem::replace(&mut s.re_auth, true));
            }
            HostMessage::OAuth1Connect { err } => {
                let callback = self.inner().oauth1_callback.take();
                match callback {
                    Some(callback) => callback(err.map_or(Ok(()), |e| Err(ContextError::Remote(e)))),
                    None => tracing::debug!("oauth1 connect reply with no callback registered"),
                }
            }
            reply @ HostMessage::Config { .. } => {
                self.on_config_reply(&reply);
                self.settle(reply);
            }
            reply => self.settle(reply),
        }
    }

    fn on_init(&self, payload: InitPayload) {
        tracing::info!(id = %payload.id, redirected = payload.redirected, "received INIT from host");
        self.state.send_modify(|s| {
            s.lifecycle = Lifecycle::AwaitingInit;
            s.id = Some(payload.id);
            s.url = payload.url;
            s.installed = payload.installed;
            s.redirected = payload.redirected;
            s.authorization = payload.authorization;
            s.processing_detail = payload.processing_detail;
            s.self_managed_agent = payload.self_managed_agent;
            s.session = payload.session;
            s.upgrade_required = payload.upgrade_required;
        });
        self.inner().init_fetch = true;
        self.post(IntegrationMessage::GetConfig);
    }

    fn on_config_reply(&self, reply: &HostMessage) {
        let HostMessage::Config { config, err } = reply else {
            return;
        };
        let init = std::mem::take(&mut self.inner().init_fetch);
        if let Some(err) = err {
            if init {
                tracing::error!("config fetch for INIT failed, staying in loading state: {}", err);
            }
            return;
        }
        self.replace_config(config.clone().unwrap_or_default());
        if init {
            self.state.send_modify(|s| s.lifecycle = Lifecycle::Ready);
            self.post(IntegrationMessage::InitAck);
        }
    }

    fn settle(&self, reply: HostMessage) {
        let kind = reply.kind();
        if !self.pending.settle(kind, reply) {
            tracing::debug!(command = %kind, "reply with no pending operation");
        }
    }

    /// Replace the cached config if its serialized form differs.
    fn replace_config(&self, config: Config) -> bool {
        self.state.send_if_modified(|s| {
            if s.config.same_as(&config) {
                false
            } else {
                s.config = config;
                true
            }
        })
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn post(&self, message: IntegrationMessage) {
        let envelope = Envelope::new(message).with_target(&self.publisher, &self.ref_type);
        match envelope.encode() {
            Ok(raw) => self.parent.post(raw),
            Err(e) => tracing::warn!(command = %envelope.message.kind(), "failed to encode message: {}", e),
        }
    }

    async fn request(&self, message: IntegrationMessage) -> Result<HostMessage, ContextError> {
        let waiter = self.pending.register(message.kind());
        self.post(message);
        let reply = waiter.wait().await?;
        match reply.error() {
            Some(err) => Err(ContextError::Remote(err.to_string())),
            None => Ok(reply),
        }
    }

    async fn request_ack(&self, message: IntegrationMessage) -> Result<(), ContextError> {
        self.request(message).await.map(|_| ())
    }

    /// Fetch the persisted config from the host.
    pub async fn get_config(&self) -> Result<Config, ContextError> {
        match self.request(IntegrationMessage::GetConfig).await? {
            HostMessage::Config { config, .. } => Ok(config.unwrap_or_default()),
            other => Err(ContextError::UnexpectedReply(other.kind())),
        }
    }

    /// Persist `config`. Fire-and-forget; the host echoes it back only if it
    /// differs from the host's copy.
    pub fn set_config(&self, config: Config) {
        self.replace_config(config.clone());
        self.post(IntegrationMessage::SetConfig { value: config });
    }

    /// Gate the host's Install action. Call whenever local validity changes.
    pub fn set_install_enabled(&self, enabled: bool) {
        self.post(IntegrationMessage::SetInstallEnabled { value: enabled });
    }

    /// URL the integration should use as its OAuth callback target.
    pub async fn get_redirect_url(&self) -> Result<String, ContextError> {
        match self.request(IntegrationMessage::GetRedirectUrl).await? {
            HostMessage::RedirectUrl { url, .. } => {
                url.ok_or(ContextError::MissingPayload(CommandKind::GetRedirectUrl))
            }
            other => Err(ContextError::UnexpectedReply(other.kind())),
        }
    }

    /// Authorization URL for linking a third-party OAuth provider.
    pub async fn get_app_oauth_url(
        &self,
        redirect_to: &str,
        version: Option<OAuthVersion>,
        baseuri: Option<&str>,
    ) -> Result<String, ContextError> {
        let message = IntegrationMessage::GetAppOAuthUrl {
            redirect_to: redirect_to.to_string(),
            version,
            baseuri: baseuri.map(str::to_string),
        };
        match self.request(message).await? {
            HostMessage::AppOAuthUrl { url, .. } => {
                url.ok_or(ContextError::MissingPayload(CommandKind::GetAppOAuthUrl))
            }
            other => Err(ContextError::UnexpectedReply(other.kind())),
        }
    }

    /// Override the OAuth URL the host hands out from now on.
    pub fn set_app_oauth_url(&self, url: &str) {
        self.post(IntegrationMessage::SetAppOAuthUrl {
            url: url.to_string(),
        });
    }

    /// Ask the host to navigate the top-level document.
    pub fn set_redirect_to(&self, url: &str) {
        self.post(IntegrationMessage::SetRedirectTo {
            url: url.to_string(),
        });
    }

    /// Start an OAuth1 connect handshake and register `callback` for its
    /// outcome. `None` clears any registration without contacting the host.
    pub fn set_oauth1_connect(&self, url: &str, callback: Option<OAuth1Callback>) {
        let Some(callback) = callback else {
            self.inner().oauth1_callback = None;
            return;
        };
        if self.inner().oauth1_callback.replace(callback).is_some() {
            tracing::debug!("replacing pending oauth1 connect callback");
        }
        self.post(IntegrationMessage::SetOAuth1Connect {
            url: url.to_string(),
        });
    }

    /// Validate a candidate config against backend rules.
    ///
    /// A failure is also recorded as the inline validation error and
    /// disables the host's Install action until a later validation passes.
    pub async fn set_validate(&self, config: Config) -> Result<Value, ContextError> {
        let outcome = match self.request(IntegrationMessage::SetValidate { config }).await {
            Ok(HostMessage::Validate { result, .. }) => Ok(result.unwrap_or(Value::Null)),
            Ok(other) => Err(ContextError::UnexpectedReply(other.kind())),
            Err(e) => Err(e),
        };
        match &outcome {
            Ok(_) => {
                self.state
                    .send_if_modified(|s| s.validation_error.take().is_some());
            }
            Err(ContextError::Remote(message)) => {
                let message = message.clone();
                self.state.send_modify(|s| s.validation_error = Some(message));
                self.set_install_enabled(false);
            }
            Err(_) => {}
        }
        outcome
    }

    /// Perform a request from the host's backend. Headers under the reserved
    /// internal prefix are stripped before they leave the frame.
    pub async fn fetch(
        &self,
        url: &str,
        headers: Option<&BTreeMap<String, String>>,
        method: Option<&str>,
    ) -> Result<FetchResponse, ContextError> {
        let request = FetchRequest {
            url: url.to_string(),
            method: method.map(str::to_string),
            headers: headers.map(scrub_headers),
        };
        match self.request(IntegrationMessage::Fetch(request)).await? {
            HostMessage::Fetch {
                status_code,
                headers,
                body,
                ..
            } => Ok(FetchResponse {
                status_code: status_code.ok_or(ContextError::MissingPayload(CommandKind::Fetch))?,
                headers: headers.unwrap_or_default(),
                body: body.unwrap_or_default(),
            }),
            other => Err(ContextError::UnexpectedReply(other.kind())),
        }
    }

    pub async fn set_self_managed_agent_required(&self) -> Result<(), ContextError> {
        self.request_ack(IntegrationMessage::SetSelfManagedAgentRequired)
            .await
    }

    /// Have the host issue a new agent private key.
    pub async fn create_private_key(&self) -> Result<String, ContextError> {
        match self.request(IntegrationMessage::CreatePrivateKey).await? {
            HostMessage::PrivateKeyCreated { result, .. } => {
                result.ok_or(ContextError::MissingPayload(CommandKind::CreatePrivateKey))
            }
            other => Err(ContextError::UnexpectedReply(other.kind())),
        }
    }

    pub async fn set_private_key(&self, key: &str) -> Result<(), ContextError> {
        self.request_ack(IntegrationMessage::SetPrivateKey {
            value: key.to_string(),
        })
        .await
    }

    pub async fn get_private_key(&self) -> Result<Option<String>, ContextError> {
        match self.request(IntegrationMessage::GetPrivateKey).await? {
            HostMessage::PrivateKey { value, .. } => Ok(value),
            other => Err(ContextError::UnexpectedReply(other.kind())),
        }
    }

    pub async fn set_install_location(&self, location: InstallLocation) -> Result<(), ContextError> {
        self.request_ack(IntegrationMessage::SetInstallLocation { value: location })
            .await
    }

    pub async fn set_upgrade_complete(&self) -> Result<(), ContextError> {
        self.request_ack(IntegrationMessage::SetUpgradeComplete)
            .await
    }

    /// Show a notification in the host page.
    pub fn add_toast(&self, message: &str, options: ToastOptions) {
        self.post(IntegrationMessage::AddToast {
            message: message.to_string(),
            options,
        });
    }

    /// The credential change requested by the host has been handled.
    pub fn on_re_authed(&self) {
        self.state.send_if_modified(|s| std::mem::take(&mut s.re_auth));
        self.post(IntegrationMessage::HandleAuthChangeAck);
    }

    /// Tear down: notify the host and stop accepting messages. Calls still
    /// in flight fail with [`ContextError::Abandoned`].
    pub fn exit(&self) {
        self.post(IntegrationMessage::Exit);
        self.state.send_modify(|s| s.lifecycle = Lifecycle::Exited);
        self.pending.clear();
        self.inner().oauth1_callback = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use websdk_core::Authorization;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Value>>);

    impl Transport for Recorder {
        fn post(&self, message: Value) {
            self.0.lock().unwrap().push(message);
        }
    }

    impl Recorder {
        fn commands(&self) -> Vec<String> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .map(|m| m["command"].as_str().unwrap_or_default().to_string())
                .collect()
        }

        fn last(&self) -> Value {
            self.0.lock().unwrap().last().cloned().unwrap()
        }

        async fn wait_for(&self, command: &str) {
            while !self.commands().iter().any(|c| c == command) {
                tokio::task::yield_now().await;
            }
        }
    }

    fn host(message: HostMessage) -> Value {
        Envelope::new(message).encode().unwrap()
    }

    fn config(value: Value) -> Config {
        serde_json::from_value(value).unwrap()
    }

    fn mounted() -> (Arc<Context>, Arc<Recorder>) {
        let parent = Arc::new(Recorder::default());
        let ctx = Arc::new(Context::new(parent.clone(), "pinpoint", "github"));
        ctx.mount();
        (ctx, parent)
    }

    fn init(id: &str) -> Value {
        host(HostMessage::Init(InitPayload {
            id: id.into(),
            url: "https://app.example.com/integrations".into(),
            installed: true,
            ..Default::default()
        }))
    }

    #[test]
    fn outbound_messages_are_tagged() {
        let (ctx, parent) = mounted();
        ctx.set_install_enabled(true);
        assert_eq!(
            parent.last(),
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
    fn init_fetches_config_then_becomes_ready() {
        let (ctx, parent) = mounted();
        assert!(ctx.state().loading());

        ctx.handle_message(&init("abc"));
        assert_eq!(parent.commands(), ["getConfig"]);
        let state = ctx.state();
        assert_eq!(state.id.as_deref(), Some("abc"));
        assert!(state.installed);
        assert!(state.loading());

        ctx.handle_message(&host(HostMessage::config_reply(Ok(config(json!({"a": 1}))))));
        let state = ctx.state();
        assert_eq!(state.lifecycle, Lifecycle::Ready);
        assert_eq!(state.config, config(json!({"a": 1})));
        assert_eq!(parent.commands(), ["getConfig", "init"]);
    }

    #[test]
    fn second_init_overwrites_seed() {
        let (ctx, parent) = mounted();
        ctx.handle_message(&init("first"));
        ctx.handle_message(&host(HostMessage::Init(InitPayload {
            id: "second".into(),
            url: "https://other".into(),
            installed: false,
            redirected: true,
            ..Default::default()
        })));
        ctx.handle_message(&host(HostMessage::config_reply(Ok(Config::new()))));

        let state = ctx.state();
        assert_eq!(state.id.as_deref(), Some("second"));
        assert_eq!(state.url, "https://other");
        assert!(!state.installed);
        assert!(state.redirected);
        // One fetch per INIT, one ack once ready.
        assert_eq!(parent.commands(), ["getConfig", "getConfig", "init"]);

        // A late reply to the first fetch does not ack again.
        ctx.handle_message(&host(HostMessage::config_reply(Ok(Config::new()))));
        assert_eq!(parent.commands().iter().filter(|c| *c == "init").count(), 1);
    }

    #[test]
    fn failed_init_fetch_keeps_loading() {
        let (ctx, _parent) = mounted();
        ctx.handle_message(&init("abc"));
        ctx.handle_message(&host(HostMessage::config_reply(Err("store offline".into()))));
        assert!(ctx.state().loading());
    }

    #[test]
    fn foreign_and_premount_messages_have_no_effect() {
        let parent = Arc::new(Recorder::default());
        let ctx = Context::new(parent.clone(), "pinpoint", "github");
        ctx.handle_message(&init("early"));
        assert!(ctx.state().id.is_none());

        ctx.mount();
        let mut foreign = init("x");
        foreign["source"] = json!("someone-else");
        ctx.handle_message(&foreign);
        ctx.handle_message(&json!({"hello": "world"}));
        assert!(ctx.state().id.is_none());
        assert!(parent.commands().is_empty());
    }

    #[test]
    fn host_push_only_notifies_on_change() {
        let (ctx, _parent) = mounted();
        let mut rx = ctx.subscribe();
        rx.mark_unchanged();

        let pushed = config(json!({"accounts": {"1": {"id": "1", "type": "ORG", "public": true}}}));
        ctx.handle_message(&host(HostMessage::PushConfig { config: pushed.clone() }));
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();

        ctx.handle_message(&host(HostMessage::PushConfig { config: pushed.clone() }));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(ctx.state().config, pushed);
    }

    #[test]
    fn set_config_updates_cache_so_echo_is_silent() {
        let (ctx, parent) = mounted();
        let mut rx = ctx.subscribe();
        let value = config(json!({"integration_type": "CLOUD"}));
        ctx.set_config(value.clone());
        assert_eq!(parent.last()["value"], json!({"integration_type": "CLOUD"}));
        rx.mark_unchanged();

        ctx.handle_message(&host(HostMessage::PushConfig { config: value }));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn reply_resolves_only_matching_command() {
        let (ctx, parent) = mounted();
        let call = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.get_redirect_url().await }
        });
        parent.wait_for("getRedirectURL").await;

        ctx.handle_message(&host(HostMessage::app_oauth_url_reply(Ok("https://wrong".into()))));
        ctx.handle_message(&host(HostMessage::PushConfig { config: Config::new() }));
        assert!(!call.is_finished());

        ctx.handle_message(&host(HostMessage::redirect_url_reply(Ok(
            "https://app.example.com/?integration=redirect".into(),
        ))));
        assert_eq!(
            call.await.unwrap().unwrap(),
            "https://app.example.com/?integration=redirect"
        );
    }

    #[tokio::test]
    async fn remote_error_rejects() {
        let (ctx, parent) = mounted();
        let call = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.create_private_key().await }
        });
        parent.wait_for("createPrivateKey").await;
        ctx.handle_message(&host(HostMessage::private_key_created(Err("denied".into()))));
        assert_eq!(
            call.await.unwrap(),
            Err(ContextError::Remote("denied".into()))
        );
    }

    #[tokio::test]
    async fn overlapping_call_abandons_first() {
        let (ctx, parent) = mounted();
        let first = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.get_private_key().await }
        });
        parent.wait_for("getPrivateKey").await;
        let second = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.get_private_key().await }
        });
        while parent.commands().len() < 2 {
            tokio::task::yield_now().await;
        }
        ctx.handle_message(&host(HostMessage::private_key_reply(Ok(Some("pem".into())))));
        assert!(matches!(first.await.unwrap(), Err(ContextError::Abandoned(_))));
        assert_eq!(second.await.unwrap(), Ok(Some("pem".into())));
    }

    #[tokio::test]
    async fn fetch_scrubs_reserved_headers() {
        let (ctx, parent) = mounted();
        let call = tokio::spawn({
            let ctx = ctx.clone();
            async move {
                let headers = BTreeMap::from([
                    ("pinpt-secret".to_string(), "x".to_string()),
                    ("accept".to_string(), "json".to_string()),
                ]);
                ctx.fetch("https://api.example.com/user", Some(&headers), None)
                    .await
            }
        });
        parent.wait_for("fetch").await;
        assert_eq!(parent.last()["headers"], json!({"accept": "json"}));

        ctx.handle_message(&host(HostMessage::fetch_reply(Ok(FetchResponse {
            status_code: 200,
            headers: vec![],
            body: "{}".into(),
        }))));
        let response = call.await.unwrap().unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "{}");
    }

    #[tokio::test]
    async fn validation_failure_is_shown_inline() {
        let (ctx, parent) = mounted();
        let call = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.set_validate(Config::new()).await }
        });
        parent.wait_for("setValidate").await;
        ctx.handle_message(&host(HostMessage::validate_reply(Err("bad token".into()))));
        assert!(call.await.unwrap().is_err());
        assert_eq!(ctx.state().validation_error.as_deref(), Some("bad token"));
        assert_eq!(parent.last()["command"], "setInstallEnabled");
        assert_eq!(parent.last()["value"], false);

        let call = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.set_validate(Config::new()).await }
        });
        while parent.commands().iter().filter(|c| *c == "setValidate").count() < 2 {
            tokio::task::yield_now().await;
        }
        ctx.handle_message(&host(HostMessage::validate_reply(Ok(json!({"ok": true})))));
        assert_eq!(call.await.unwrap(), Ok(json!({"ok": true})));
        assert!(ctx.state().validation_error.is_none());
    }

    #[test]
    fn oauth1_callback_fires_once() {
        let (ctx, parent) = mounted();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        ctx.set_oauth1_connect(
            "https://jira.example.com",
            Some(Box::new(move |result| {
                tx.send(result).unwrap();
            })),
        );
        assert_eq!(parent.last()["url"], "https://jira.example.com");

        let failed = HostMessage::ack(CommandKind::SetOAuth1Connect, Err("rejected".into())).unwrap();
        ctx.handle_message(&host(failed.clone()));
        ctx.handle_message(&host(failed));
        assert_eq!(rx.try_recv().unwrap(), Err(ContextError::Remote("rejected".into())));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn oauth1_without_callback_clears_registration() {
        let (ctx, parent) = mounted();
        let fired = Arc::new(Mutex::new(false));
        let flag = fired.clone();
        ctx.set_oauth1_connect("https://a", Some(Box::new(move |_| *flag.lock().unwrap() = true)));
        ctx.set_oauth1_connect("https://a", None);
        assert_eq!(parent.commands(), ["setOAuth1Connect"]);

        ctx.handle_message(&host(HostMessage::ack(CommandKind::SetOAuth1Connect, Ok(())).unwrap()));
        assert!(!*fired.lock().unwrap());
    }

    #[test]
    fn auth_change_round_trip() {
        let (ctx, parent) = mounted();
        ctx.handle_message(&host(HostMessage::HandleAuthChange));
        assert!(ctx.state().re_auth);
        ctx.on_re_authed();
        assert!(!ctx.state().re_auth);
        assert_eq!(parent.last()["command"], "handleAuthChangeAck");
    }

    #[test]
    fn init_seeds_authorization() {
        let (ctx, _parent) = mounted();
        let auth: Authorization =
            serde_json::from_value(json!({"apikey_auth": {"apikey": "k", "created": 9}})).unwrap();
        ctx.handle_message(&host(HostMessage::Init(InitPayload {
            id: "1".into(),
            authorization: Some(auth.clone()),
            ..Default::default()
        })));
        assert_eq!(ctx.state().authorization, Some(auth));
    }

    #[tokio::test]
    async fn exit_notifies_host_and_abandons_calls() {
        let (ctx, parent) = mounted();
        let call = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.get_config().await }
        });
        parent.wait_for("getConfig").await;
        ctx.exit();
        assert_eq!(parent.last()["command"], "EXIT");
        assert!(matches!(call.await.unwrap(), Err(ContextError::Abandoned(_))));

        ctx.handle_message(&init("after-exit"));
        assert!(ctx.state().id.is_none());
    }
}
