//! What the host page renders around the iframe.

/// Installer lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallerLifecycle {
    #[default]
    Unmounted,
    /// Iframe created and hidden; waiting for its load event.
    FrameLoading,
    /// `INIT` sent; waiting for the integration's ready signal.
    AwaitingReady,
    Ready,
    Installing,
    /// The removal dialog is open.
    ConfirmingRemoval,
    Uninstalling,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallerView {
    pub lifecycle: InstallerLifecycle,
    /// The iframe stays hidden until the integration signals ready.
    pub frame_visible: bool,
    pub installed: bool,
    /// Whether the Install action is available.
    pub install_enabled: bool,
}

impl InstallerView {
    /// Show the loading indicator.
    pub fn loading(&self) -> bool {
        matches!(
            self.lifecycle,
            InstallerLifecycle::FrameLoading | InstallerLifecycle::AwaitingReady
        )
    }

    pub fn confirming_removal(&self) -> bool {
        self.lifecycle == InstallerLifecycle::ConfirmingRemoval
    }
}
