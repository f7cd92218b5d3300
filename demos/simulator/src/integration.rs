//! A scripted integration: what a real integration UI would do after the
//! user filled in an API key form.

use serde_json::json;
use std::sync::Arc;
use websdk_context::{Context, ContextError, Lifecycle};
use websdk_core::{Config, ToastAppearance, ToastOptions};

pub struct Script {
    pub apikey: String,
    pub api_url: String,
    /// Proxy one GET through the host's backend once configured.
    pub fetch: Option<String>,
}

pub async fn run(context: Arc<Context>, script: Script) -> Result<(), ContextError> {
    let mut state = context.subscribe();
    if state.wait_for(|s| s.lifecycle == Lifecycle::Ready).await.is_err() {
        return Ok(());
    }
    let seed = context.state();
    tracing::info!(
        installed = seed.installed,
        redirected = seed.redirected,
        has_config = !seed.config.is_empty(),
        "integration ready"
    );

    if seed.installed {
        if let Some(auth) = &seed.authorization {
            tracing::info!(created = auth.created(), url = ?auth.url(), "already installed");
        }
    } else {
        let mut config = Config::new();
        config.insert(
            "apikey_auth",
            json!({ "apikey": script.apikey, "url": script.api_url, "created": 0 }),
        );

        let result = context.set_validate(config.clone()).await?;
        tracing::info!(%result, "credentials validated");
        context.set_config(config);
        context.set_install_enabled(true);
        context.add_toast(
            "Credentials validated",
            ToastOptions {
                appearance: ToastAppearance::Success,
                auto_dismiss: true,
            },
        );
    }

    if let Some(url) = script.fetch {
        let response = context.fetch(&url, None, Some("GET")).await?;
        tracing::info!(status = response.status_code, bytes = response.body.len(), "fetched {}", url);
    }
    Ok(())
}
