//! The host document the installer lives in.

use std::sync::{Mutex, MutexGuard};

/// Access to the top-level document: its URL, navigation and history.
pub trait HostEnvironment: Send + Sync {
    /// Full URL of the top-level document.
    fn current_url(&self) -> String;

    /// Navigate the top-level document away.
    fn navigate(&self, url: &str);

    /// Replace the visible URL without navigating or adding a history entry.
    fn replace_url(&self, url: &str);
}

#[derive(Debug, Default)]
struct Document {
    url: String,
    navigations: Vec<String>,
    replacements: Vec<String>,
}

/// An in-memory document for simulation and tests.
#[derive(Debug, Default)]
pub struct SimulatedEnvironment {
    document: Mutex<Document>,
}

impl SimulatedEnvironment {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            document: Mutex::new(Document {
                url: url.into(),
                ..Default::default()
            }),
        }
    }

    /// Every URL passed to [`HostEnvironment::navigate`], oldest first.
    pub fn navigations(&self) -> Vec<String> {
        self.document().navigations.clone()
    }

    /// Every URL passed to [`HostEnvironment::replace_url`], oldest first.
    pub fn replacements(&self) -> Vec<String> {
        self.document().replacements.clone()
    }

    fn document(&self) -> MutexGuard<'_, Document> {
        self.document.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HostEnvironment for SimulatedEnvironment {
    fn current_url(&self) -> String {
        self.document().url.clone()
    }

    fn navigate(&self, url: &str) {
        tracing::info!(%url, "navigating host document");
        let mut doc = self.document();
        doc.url = url.to_string();
        doc.navigations.push(url.to_string());
    }

    fn replace_url(&self, url: &str) {
        let mut doc = self.document();
        doc.url = url.to_string();
        doc.replacements.push(url.to_string());
    }
}
