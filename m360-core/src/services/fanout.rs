//! Event Fan-out, spec.md §4.8/§4.9: pushes fresh samples out to every
//! WebSocket subscriber whose subscription matches, with a global-sensor
//! fallback when no tenant-scoped subscriber matched.

use m360_common::{SampleEvent, WsServerMessage};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum Subscription {
    All,
    Sensors(Vec<i64>),
    Empty,
}

impl Subscription {
    fn matches(&self, sensor_id: i64) -> bool {
        match self {
            Subscription::All => true,
            Subscription::Sensors(ids) => ids.contains(&sensor_id),
            Subscription::Empty => false,
        }
    }
}

struct Subscriber {
    tenant: String,
    subscription: Subscription,
    sink: mpsc::Sender<WsServerMessage>,
}

/// Registry of connected WebSocket writers, keyed by an opaque connection id.
#[derive(Default)]
pub struct Fanout {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn attach(&self, conn_id: u64, tenant: String, sink: mpsc::Sender<WsServerMessage>) {
        self.subscribers.lock().unwrap().insert(
            conn_id,
            Subscriber {
                tenant,
                subscription: Subscription::Empty,
                sink,
            },
        );
    }

    pub fn detach(&self, conn_id: u64) {
        self.subscribers.lock().unwrap().remove(&conn_id);
    }

    pub fn subscribe(&self, conn_id: u64, subscription: Subscription) {
        if let Some(sub) = self.subscribers.lock().unwrap().get_mut(&conn_id) {
            sub.subscription = subscription;
        }
    }

    /// Delivers `sample` to every subscriber owned by `tenant` whose
    /// subscription matches the sensor. If that yields zero deliveries (the
    /// sensor may belong to a tenant nobody from is currently connected, or
    /// to a cross-tenant shared device) the sample is still broadcast to
    /// every subscriber with subscription `all`, `empty`, or containing the
    /// sensor, tenant notwithstanding — spec.md §4.8 step 2's documented
    /// fallback. Send errors detach the sink.
    pub async fn publish(&self, tenant: &str, sample: SampleEvent) {
        let sensor_id = sample.sensor_id();
        let message = WsServerMessage::Sample(sample);

        let same_tenant: Vec<(u64, mpsc::Sender<WsServerMessage>)> = {
            let subs = self.subscribers.lock().unwrap();
            subs.iter()
                .filter(|(_, s)| s.tenant == tenant && s.subscription.matches(sensor_id))
                .map(|(conn_id, s)| (*conn_id, s.sink.clone()))
                .collect()
        };

        let targets = if !same_tenant.is_empty() {
            same_tenant
        } else {
            let subs = self.subscribers.lock().unwrap();
            subs.iter()
                .filter(|(_, s)| matches!(s.subscription, Subscription::Empty) || s.subscription.matches(sensor_id))
                .map(|(conn_id, s)| (*conn_id, s.sink.clone()))
                .collect()
        };

        for (conn_id, sink) in targets {
            if sink.send(message.clone()).await.is_err() {
                self.detach(conn_id);
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m360_common::{PingSamplePayload, PingStatus};

    #[tokio::test]
    async fn publish_delivers_only_to_matching_subscription() {
        let fanout = Fanout::new();
        let (tx, mut rx) = mpsc::channel(8);
        fanout.attach(1, "tenant-a".to_string(), tx);
        fanout.subscribe(1, Subscription::Sensors(vec![42]));

        let sample = SampleEvent::Ping(PingSamplePayload::new(99, PingStatus::Ok, Some(1.0)));
        fanout.publish("tenant-a", sample).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_falls_back_cross_tenant_when_no_same_tenant_match() {
        let fanout = Fanout::new();
        let (tx, mut rx) = mpsc::channel(8);
        fanout.attach(1, "tenant-b".to_string(), tx);
        fanout.subscribe(1, Subscription::All);

        let sample = SampleEvent::Ping(PingSamplePayload::new(7, PingStatus::Ok, Some(1.0)));
        fanout.publish("tenant-a", sample).await;

        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn detach_removes_subscriber() {
        let fanout = Fanout::new();
        let (tx, _rx) = mpsc::channel(8);
        fanout.attach(1, "tenant-a".to_string(), tx);
        assert_eq!(fanout.connection_count(), 1);
        fanout.detach(1);
        assert_eq!(fanout.connection_count(), 0);
    }
}
