//! File-backed stand-in for the host page's local storage, and the
//! collaborators that run on top of it.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use websdk_core::{Authorization, Config, InstallLocation, Integration, ToastOptions};
use websdk_installer::{CollaboratorError, Collaborators};

/// String key/value pairs persisted as one JSON object. The lock is held
/// across each file write so the file always matches the last update.
pub struct Store {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl Store {
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = if tokio::fs::try_exists(&path).await? {
            serde_json::from_str(&tokio::fs::read_to_string(&path).await?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().await.get(key).cloned()
    }

    pub async fn set(&self, key: &str, value: impl Into<String>) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value.into());
        self.flush(&entries).await
    }

    pub async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.flush(&entries).await?;
        }
        Ok(())
    }

    async fn flush(&self, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
        tokio::fs::write(&self.path, serde_json::to_string_pretty(entries)?).await?;
        Ok(())
    }
}

fn installed_key(ref_type: &str) -> String {
    format!("installer.{ref_type}")
}

fn config_key(ref_type: &str) -> String {
    format!("installer.config.{ref_type}")
}

fn collaborator_error(e: anyhow::Error) -> CollaboratorError {
    CollaboratorError::new(e.to_string())
}

/// Host callbacks backed by a [`Store`].
pub struct SimulatorHost {
    store: Store,
    delay: Duration,
}

impl SimulatorHost {
    pub fn new(store: Store, delay: Duration) -> Self {
        Self { store, delay }
    }

    pub async fn installed(&self, ref_type: &str) -> bool {
        self.store.get(&installed_key(ref_type)).await.as_deref() == Some("true")
    }

    pub async fn stored_config(&self, ref_type: &str) -> anyhow::Result<Option<Config>> {
        self.store
            .get(&config_key(ref_type))
            .await
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(Into::into)
    }

    /// Credential carried by the stored config, if any.
    pub async fn authorization(&self, ref_type: &str) -> Option<Authorization> {
        match self.stored_config(ref_type).await {
            Ok(config) => config.as_ref().and_then(Authorization::from_config),
            Err(e) => {
                tracing::warn!(%ref_type, "stored config is unreadable: {}", e);
                None
            }
        }
    }

    pub async fn forget(&self, ref_type: &str) -> anyhow::Result<()> {
        self.store.remove(&installed_key(ref_type)).await?;
        self.store.remove(&config_key(ref_type)).await
    }
}

#[async_trait]
impl Collaborators for SimulatorHost {
    async fn set_install_enabled(
        &self,
        integration: &Integration,
        enabled: bool,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(integration = %integration.ref_type, enabled, "install action toggled");
        Ok(())
    }

    async fn get_config(&self, integration: &Integration) -> Result<Option<Config>, CollaboratorError> {
        self.stored_config(&integration.ref_type)
            .await
            .map_err(collaborator_error)
    }

    async fn set_config(&self, integration: &Integration, config: &Config) -> Result<(), CollaboratorError> {
        let raw = serde_json::to_string(config).map_err(|e| CollaboratorError::new(e.to_string()))?;
        self.store
            .set(&config_key(&integration.ref_type), raw)
            .await
            .map_err(collaborator_error)
    }

    async fn on_install(&self, integration: &Integration) -> Result<(), CollaboratorError> {
        tracing::info!(integration = %integration.ref_type, "installed");
        self.store
            .set(&installed_key(&integration.ref_type), "true")
            .await
            .map_err(collaborator_error)
    }

    async fn on_remove(&self, integration: &Integration) -> Result<(), CollaboratorError> {
        tracing::info!(integration = %integration.ref_type, "removed");
        self.forget(&integration.ref_type)
            .await
            .map_err(collaborator_error)
    }

    async fn on_auth1_connect(&self, integration: &Integration, url: &str) -> Result<(), CollaboratorError> {
        tracing::info!(integration = %integration.ref_type, %url, "simulating oauth1 consent");
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn on_validate(&self, integration: &Integration, _: &Config) -> Result<Value, CollaboratorError> {
        tracing::info!(integration = %integration.ref_type, "simulating validation");
        tokio::time::sleep(self.delay).await;
        Ok(json!({ "simulator": true }))
    }

    fn set_self_managed_agent_required(&self) {
        tracing::info!("the app would now navigate to the self-managed agent install page");
    }

    async fn get_private_key(&self, _: &Integration) -> Result<Option<String>, CollaboratorError> {
        Ok(None)
    }

    async fn set_private_key(&self, integration: &Integration, _: &str) -> Result<(), CollaboratorError> {
        tracing::info!(integration = %integration.ref_type, "private key received");
        Ok(())
    }

    async fn set_install_location(
        &self,
        integration: &Integration,
        location: InstallLocation,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(integration = %integration.ref_type, ?location, "install location chosen");
        Ok(())
    }

    async fn set_upgrade_complete(&self, integration: &Integration) -> Result<(), CollaboratorError> {
        tracing::info!(integration = %integration.ref_type, "upgrade complete");
        Ok(())
    }

    fn add_toast(&self, message: &str, options: &ToastOptions) {
        tracing::info!(appearance = ?options.appearance, auto_dismiss = options.auto_dismiss, "toast: {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integration() -> Integration {
        Integration {
            name: "GitHub".into(),
            ref_type: "github".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn install_and_config_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let host = SimulatorHost::new(Store::open(&path).await.unwrap(), Duration::ZERO);

        let config: Config = serde_json::from_value(json!({
            "apikey_auth": {"apikey": "k", "url": "https://api.example", "created": 1},
        }))
        .unwrap();
        host.set_config(&integration(), &config).await.unwrap();
        host.on_install(&integration()).await.unwrap();

        let reopened = SimulatorHost::new(Store::open(&path).await.unwrap(), Duration::ZERO);
        assert!(reopened.installed("github").await);
        assert_eq!(reopened.get_config(&integration()).await.unwrap(), Some(config));
        assert!(matches!(
            reopened.authorization("github").await,
            Some(Authorization::ApiKey(_))
        ));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("installer.github"));
        assert!(raw.contains("installer.config.github"));
    }

    #[tokio::test]
    async fn remove_clears_both_keys() {
        let dir = tempfile::tempdir().unwrap();
        let host = SimulatorHost::new(Store::open(dir.path().join("s.json")).await.unwrap(), Duration::ZERO);
        host.on_install(&integration()).await.unwrap();
        host.set_config(&integration(), &Config::new()).await.unwrap();

        host.on_remove(&integration()).await.unwrap();
        assert!(!host.installed("github").await);
        assert_eq!(host.get_config(&integration()).await.unwrap(), None);
        assert!(host.authorization("github").await.is_none());
    }

    #[tokio::test]
    async fn concurrent_writes_all_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = std::sync::Arc::new(Store::open(&path).await.unwrap());

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let key = format!("k{i}");
                    store.set(&key, i.to_string()).await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let reopened = Store::open(&path).await.unwrap();
        for i in 0..8 {
            assert_eq!(reopened.get(&format!("k{i}")).await, Some(i.to_string()));
        }
    }
}
