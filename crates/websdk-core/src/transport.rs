//! Fire-and-forget delivery of structured messages to another window.

use serde_json::Value;
use tokio::sync::mpsc;

/// A handle to another window's message bus.
///
/// Posting never fails from the caller's point of view: a window that has
/// been closed or navigated away silently drops the message.
pub trait Transport: Send + Sync {
    fn post(&self, message: Value);
}

/// Receiving side of an in-process window.
pub type Inbox = mpsc::UnboundedReceiver<Value>;

/// In-process stand-in for a window, delivering in send order.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Value>,
}

impl ChannelTransport {
    /// True once the receiving window has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Transport for ChannelTransport {
    fn post(&self, message: Value) {
        if self.tx.send(message).is_err() {
            tracing::trace!("target window closed, message dropped");
        }
    }
}

/// Create a window: a posting handle and the inbox it delivers to.
pub fn channel() -> (ChannelTransport, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelTransport { tx }, rx)
}
