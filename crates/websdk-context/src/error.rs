use websdk_core::{Abandoned, CommandKind};

/// Failure of a capability call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The host reported an error in the reply's `err` field.
    #[error("{0}")]
    Remote(String),
    #[error(transparent)]
    Abandoned(#[from] Abandoned),
    #[error("{0} reply carried neither a value nor an error")]
    MissingPayload(CommandKind),
    #[error("unexpected {0} reply")]
    UnexpectedReply(CommandKind),
}
