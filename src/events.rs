use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Events pushed to the frontend. The serialized form keeps the names the
/// panel listens for: `ping_status` and `login_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StatusEvent {
    PingStatus {
        host: String,
        success: bool,
        consecutive_failures: u32,
        timestamp: i64,
    },
    LoginStatus {
        success: bool,
        status: i32,
        message: String,
        timestamp: i64,
    },
}

/// Fan-out channel for status events.
///
/// Delivery is fire-and-forget: an event published while nobody is
/// subscribed is dropped, and a receiver only sees events published after
/// it subscribed. Dropping a receiver unsubscribes it.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: StatusEvent) {
        // send only errors when there are no receivers
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping_event(n: u32) -> StatusEvent {
        StatusEvent::PingStatus {
            host: "8.8.8.8".into(),
            success: false,
            consecutive_failures: n,
            timestamp: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn every_subscriber_receives_each_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(ping_event(1));
        bus.emit(ping_event(2));

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await.unwrap(), ping_event(1));
            assert_eq!(rx.recv().await.unwrap(), ping_event(2));
        }
    }

    #[tokio::test]
    async fn late_subscribers_do_not_see_past_events() {
        let bus = EventBus::new();
        bus.emit(ping_event(1));

        let mut rx = bus.subscribe();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn emit_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.emit(ping_event(1));
    }

    #[test]
    fn events_serialize_with_panel_facing_names() {
        let ping = serde_json::to_value(ping_event(3)).unwrap();
        assert_eq!(ping["type"], "ping_status");
        assert_eq!(ping["data"]["host"], "8.8.8.8");
        assert_eq!(ping["data"]["consecutive_failures"], 3);

        let login = serde_json::to_value(StatusEvent::LoginStatus {
            success: true,
            status: 200,
            message: "ok".into(),
            timestamp: 1_700_000_000,
        })
        .unwrap();
        assert_eq!(login["type"], "login_status");
        assert_eq!(login["data"]["status"], 200);
    }
}
