use std::time::Duration;

use axum::response::sse::{Event, KeepAlive};
use fonthost_core::{FormErrors, HostingForm, HostingStatus};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::debug;

use crate::backend::Navigator;

/// Notification pushed to the client driving a hosting session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    Navigate {
        path: String,
    },
    Status {
        status: HostingStatus,
        loading: bool,
        errors: FormErrors,
    },
}

impl SessionEvent {
    pub fn status(form: &HostingForm) -> Self {
        Self::Status {
            status: form.status(),
            loading: form.loading(),
            errors: form.errors(),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Status { .. } => "status",
        }
    }

    pub fn into_sse_event(self) -> Result<Event, serde_json::Error> {
        let data = serde_json::to_string(&self)?;
        Ok(Event::default().event(self.event_name()).data(data))
    }
}

/// Per-session broadcast hub feeding the SSE stream.
#[derive(Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(32);
        Self { sender }
    }

    pub fn publish(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            debug!(stage = "sse", "no listener for session event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Navigator for SessionEvents {
    fn navigate(&self, path: &str) {
        self.publish(SessionEvent::Navigate {
            path: path.to_string(),
        });
    }
}

pub fn event_stream(
    events: &SessionEvents,
) -> impl Stream<Item = Result<Event, serde_json::Error>> + Send + 'static {
    BroadcastStream::new(events.subscribe()).filter_map(|result| match result {
        Ok(event) => Some(event.into_sse_event()),
        Err(_) => None,
    })
}

pub fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(20))
        .text("heartbeat")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_serializes_flags() {
        let event = SessionEvent::status(&HostingForm::new());
        assert_eq!(event.event_name(), "status");

        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["kind"], "status");
        assert_eq!(value["status"], "idle");
        assert_eq!(value["loading"], false);
        assert_eq!(value["errors"]["hosting"], false);
    }

    #[tokio::test]
    async fn navigator_publishes_navigate_events() {
        let events = SessionEvents::new();
        let mut receiver = events.subscribe();

        events.navigate("/library/hosting");

        let event = receiver.recv().await.expect("event");
        assert_eq!(
            event,
            SessionEvent::Navigate {
                path: "/library/hosting".to_string()
            }
        );
    }
}
