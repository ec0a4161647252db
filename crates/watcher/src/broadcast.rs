//! Bounded fan-out of event envelopes to live subscribers.
//!
//! Each subscriber is a bounded channel drained by its transport task. A
//! publish never waits on a subscriber: a closed or full channel gets the
//! subscriber evicted during that same publish.

use crate::config::FanoutConfig;
use betcache_types::{ws, EventEnvelope, EventType};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

const MIN_HOUSEKEEPING_PERIOD: Duration = Duration::from_secs(1);

pub type SubscriberId = u64;

/// Serialized envelope as sent on the wire.
pub type Payload = Arc<str>;

pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<Payload>,
}

/// Returned instead of a subscription when the cap is reached. The transport
/// delivers `notice`, then closes with `close_code` / `reason`.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub notice: EventEnvelope,
    pub close_code: u16,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PublishReport {
    pub delivered: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FanoutStats {
    pub active_connections: usize,
    pub total_connections_ever: u64,
    pub connection_limit: usize,
}

pub struct BroadcastFanout {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Payload>>>,
    next_id: AtomicU64,
    total_connections: AtomicU64,
    max_subscribers: usize,
    buffer: usize,
}

impl BroadcastFanout {
    pub fn new(config: &FanoutConfig) -> Self {
        Self::with_limits(config.max_subscribers, config.subscriber_buffer)
    }

    pub fn with_limits(max_subscribers: usize, buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            total_connections: AtomicU64::new(0),
            max_subscribers,
            buffer: buffer.max(1),
        }
    }

    pub fn subscribe(&self) -> Result<Subscription, Rejection> {
        let mut subscribers = self.subscribers.lock().unwrap();
        if subscribers.len() >= self.max_subscribers {
            warn!(
                max = self.max_subscribers,
                "Connection rejected: maximum connections reached"
            );
            return Err(Rejection {
                notice: EventEnvelope::with_prefix(
                    "error",
                    EventType::System,
                    "Connection rejected: Too many active connections",
                ),
                close_code: ws::CLOSE_TRY_AGAIN_LATER,
                reason: ws::CLOSE_REASON_FULL,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.buffer);
        subscribers.insert(id, sender);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        info!(subscriber = id, active = subscribers.len(), "subscriber connected");

        Ok(Subscription { id, receiver })
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap();
        let removed = subscribers.remove(&id).is_some();
        if removed {
            info!(subscriber = id, remaining = subscribers.len(), "subscriber removed");
        } else {
            debug!(subscriber = id, "unsubscribe for unknown subscriber");
        }
        removed
    }

    /// Sends `event` to every subscriber, evicting any whose channel refuses it.
    pub fn publish(&self, event: &EventEnvelope) -> PublishReport {
        let payload: Payload = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                error!(error = %e, "failed to serialize event envelope");
                return PublishReport::default();
            }
        };

        let report = self.send_all(&payload);
        if report.evicted > 0 {
            info!(
                evicted = report.evicted,
                "removed disconnected clients during broadcast"
            );
        }
        debug!(
            event_type = ?event.event_type,
            delivered = report.delivered,
            "broadcast event"
        );
        report
    }

    /// Liveness check: a `system` test message to everyone. Returns how many
    /// stale subscribers were removed.
    pub fn ping_all(&self) -> usize {
        let ping = EventEnvelope::with_prefix("ping", EventType::System, "Connection test");
        let evicted = self.publish(&ping).evicted;
        if evicted > 0 {
            info!(evicted, "removed stale connections");
        }
        evicted
    }

    pub fn stats(&self) -> FanoutStats {
        FanoutStats {
            active_connections: self.len(),
            total_connections_ever: self.total_connections.load(Ordering::Relaxed),
            connection_limit: self.max_subscribers,
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodic liveness check of the subscriber set. Touches nothing but the fanout.
    pub async fn run_housekeeping(self: Arc<Self>, period: Duration) {
        let mut timer = interval(period.max(MIN_HOUSEKEEPING_PERIOD));
        // The first tick completes immediately; skip it.
        timer.tick().await;
        loop {
            timer.tick().await;
            let removed = self.ping_all();
            debug!(removed, active = self.len(), "subscriber housekeeping done");
        }
    }

    fn send_all(&self, payload: &Payload) -> PublishReport {
        let mut subscribers = self.subscribers.lock().unwrap();
        let mut report = PublishReport::default();

        subscribers.retain(|id, sender| match sender.try_send(payload.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = id, "subscriber queue full, evicting");
                report.evicted += 1;
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(subscriber = id, "subscriber disconnected, evicting");
                report.evicted += 1;
                false
            }
        });

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(payload: &Payload) -> EventEnvelope {
        serde_json::from_str(payload).unwrap()
    }

    #[tokio::test]
    async fn test_publish_evicts_dead_subscriber() {
        let fanout = BroadcastFanout::with_limits(100, 8);
        let mut a = fanout.subscribe().unwrap();
        let dead = fanout.subscribe().unwrap();
        let mut c = fanout.subscribe().unwrap();
        drop(dead.receiver);

        let report = fanout.publish(&EventEnvelope::new(EventType::Block, "range"));
        assert_eq!(report, PublishReport { delivered: 2, evicted: 1 });
        assert_eq!(fanout.len(), 2);

        assert_eq!(decode(&a.receiver.recv().await.unwrap()).message, "range");
        assert_eq!(decode(&c.receiver.recv().await.unwrap()).message, "range");

        let again = fanout.publish(&EventEnvelope::new(EventType::Block, "next"));
        assert_eq!(again, PublishReport { delivered: 2, evicted: 0 });
    }

    #[test]
    fn test_cap_rejects_with_notice() {
        let fanout = BroadcastFanout::with_limits(100, 1);
        let subs: Vec<_> = (0..100).map(|_| fanout.subscribe().unwrap()).collect();
        assert_eq!(fanout.len(), 100);

        let rejection = match fanout.subscribe() {
            Err(r) => r,
            Ok(_) => panic!("101st subscriber must be rejected"),
        };
        assert_eq!(rejection.close_code, 1013);
        assert_eq!(rejection.reason, "Maximum connections reached");
        assert_eq!(rejection.notice.event_type, EventType::System);
        assert!(rejection.notice.message.contains("Too many active connections"));
        assert_eq!(fanout.len(), 100);
        drop(subs);
    }

    #[test]
    fn test_slot_frees_after_unsubscribe() {
        let fanout = BroadcastFanout::with_limits(1, 1);
        let first = fanout.subscribe().unwrap();
        assert!(fanout.subscribe().is_err());
        assert!(fanout.unsubscribe(first.id));
        assert!(!fanout.unsubscribe(first.id));
        assert!(fanout.subscribe().is_ok());
        assert_eq!(fanout.stats().total_connections_ever, 2);
    }

    #[test]
    fn test_full_subscriber_does_not_block_others() {
        let fanout = BroadcastFanout::with_limits(10, 1);
        let _slow = fanout.subscribe().unwrap();
        let mut fast = fanout.subscribe().unwrap();

        let first = fanout.publish(&EventEnvelope::new(EventType::Block, "1"));
        assert_eq!(first.delivered, 2);
        fast.receiver.try_recv().unwrap();

        // `_slow` never drains its single-slot queue.
        let second = fanout.publish(&EventEnvelope::new(EventType::Block, "2"));
        assert_eq!(second, PublishReport { delivered: 1, evicted: 1 });
        assert_eq!(decode(&fast.receiver.try_recv().unwrap()).message, "2");
    }

    #[test]
    fn test_ping_removes_stale_connections() {
        let fanout = BroadcastFanout::with_limits(10, 4);
        let mut live = fanout.subscribe().unwrap();
        let stale = fanout.subscribe().unwrap();
        drop(stale);

        assert_eq!(fanout.ping_all(), 1);
        let ping = decode(&live.receiver.try_recv().unwrap());
        assert_eq!(ping.event_type, EventType::System);
        assert_eq!(ping.message, "Connection test");
        assert_eq!(
            fanout.stats(),
            FanoutStats {
                active_connections: 1,
                total_connections_ever: 2,
                connection_limit: 10,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_housekeeping_runs_on_its_own_timer() {
        let fanout = Arc::new(BroadcastFanout::with_limits(10, 4));
        let stale = fanout.subscribe().unwrap();
        drop(stale);

        let task = tokio::spawn(fanout.clone().run_housekeeping(Duration::from_secs(120)));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fanout.len(), 1);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(fanout.len(), 0);
        task.abort();
    }
}
