use std::sync::Arc;

use fonthost_core::{GeneratedBuffer, SubmissionId};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Generated buffers for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDelivery {
    pub submission_id: SubmissionId,
    pub buffers: Vec<GeneratedBuffer>,
}

/// Process-wide publish/subscribe channel of generated buffers.
#[derive(Clone)]
pub struct BufferFeed {
    sender: broadcast::Sender<Arc<FeedDelivery>>,
}

impl Default for BufferFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Delivers to every current subscriber and returns how many there were.
    pub fn publish(&self, delivery: FeedDelivery) -> usize {
        let submission_id = delivery.submission_id;
        match self.sender.send(Arc::new(delivery)) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!(stage = "feed", %submission_id, "no subscriber for generated buffers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> FeedSubscription {
        FeedSubscription {
            receiver: Some(self.sender.subscribe()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Registration on the [`BufferFeed`]. Dropping it unsubscribes.
pub struct FeedSubscription {
    receiver: Option<broadcast::Receiver<Arc<FeedDelivery>>>,
}

impl FeedSubscription {
    /// Waits for the next delivery. Returns `None` once unsubscribed or closed.
    pub async fn recv(&mut self) -> Option<Arc<FeedDelivery>> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(delivery) => return Some(delivery),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(stage = "feed", skipped, "feed subscriber lagged");
                }
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    pub fn unsubscribe(&mut self) {
        self.receiver = None;
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }
}
