//! Simulator settings, read from an optional TOML file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use websdk_core::{Customer, Integration, Publisher, Session, User};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Integration instance id handed to the frame in `INIT`.
    pub id: String,
    /// URL of the simulated host page.
    pub host_url: String,
    /// File backing the simulated local storage.
    pub store: PathBuf,
    /// Artificial latency of the validate and OAuth1 collaborators.
    pub delay_ms: u64,
    pub integration: Integration,
    pub session: Session,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            id: "1234567890".into(),
            host_url: "http://localhost:3000/settings/integrations".into(),
            store: PathBuf::from("simulator-store.json"),
            delay_ms: 2000,
            integration: Integration {
                name: "Demo".into(),
                description: "Demonstration integration".into(),
                ref_type: "demo".into(),
                publisher: Publisher {
                    name: "Pinpoint".into(),
                    ..Default::default()
                },
                ui_url: "http://localhost:8080".into(),
                ..Default::default()
            },
            session: Session {
                customer: Customer {
                    id: "1234".into(),
                    name: "Test".into(),
                },
                user: User {
                    id: "999".into(),
                    name: "Test McTester".into(),
                    avatar_url: None,
                },
                env: "stable".into(),
                graphql_url: "https://graph.api.pinpoint.com/graphql".into(),
                auth_url: "https://auth.api.pinpoint.com".into(),
            },
        }
    }
}

impl SimulatorConfig {
    /// Load `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: SimulatorConfig = toml::from_str(
            r#"
            delay_ms = 0

            [integration]
            name = "GitHub"
            refType = "github"
            uiURL = "http://localhost:9000"
            "#,
        )
        .unwrap();
        assert_eq!(config.delay_ms, 0);
        assert_eq!(config.integration.ref_type, "github");
        assert!(!config.integration.installed);
        assert_eq!(config.session.customer.id, "1234");
        assert_eq!(config.id, "1234567890");
    }

    #[test]
    fn no_file_means_defaults() {
        let config = SimulatorConfig::load(None).unwrap();
        assert_eq!(config.session.auth_url, "https://auth.api.pinpoint.com");
        assert_eq!(config.integration.ref_type, "demo");
    }
}
