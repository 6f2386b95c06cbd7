//! Log feed subscription.

use crate::event::CallEvent;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Handle on the log hub's delivery queue for one subscriber.
#[derive(Debug)]
pub struct LogSubscription {
    receiver: mpsc::Receiver<CallEvent>,
}

impl LogSubscription {
    pub(crate) fn new(receiver: mpsc::Receiver<CallEvent>) -> Self {
        Self { receiver }
    }

    /// Next event, or `None` once the hub has closed this subscription.
    pub async fn recv(&mut self) -> Option<CallEvent> {
        let event = self.receiver.recv().await;
        if event.is_none() {
            debug!(target: "telemetry.subscription", feed = "log", "Log subscription closed");
        }
        event
    }

    /// Adapt into a `Stream` for server-streaming RPC handlers.
    #[must_use]
    pub fn into_stream(self) -> ReceiverStream<CallEvent> {
        ReceiverStream::new(self.receiver)
    }
}
