use crate::{CollaboratorError, InstallerLifecycle};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstallerError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error("no session available to build an OAuth URL")]
    MissingSession,
    #[error("installer is {0:?}, not ready")]
    NotReady(InstallerLifecycle),
    #[error("install is not enabled by the integration")]
    InstallDisabled,
    #[error("no removal is awaiting confirmation")]
    NoRemovalPending,
}
