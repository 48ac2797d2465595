//! Subscription table ownership, Sub-transport intake, and coalesced
//! dispatch to per-key/wildcard/log consumers.

use crate::buffer::CoalescingBuffer;
use crate::transport::SubTransport;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;
use tracing::{error, warn};
use xtables_protocol::codec;
use xtables_protocol::{Category, Update};

pub type UpdateCallback = Arc<dyn Fn(&Update) + Send + Sync>;
pub type LogCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// A server solicitation handed off by intake to the Telemetry Responder.
///
/// Solicitation `Update`s carry the correlation id as an 8-byte
/// big-endian payload in `value` rather than a per-key value — this is
/// the only data-carrying field the Update record has, since the id
/// concept otherwise belongs to the Message record.
#[derive(Debug, Clone, Copy)]
pub struct Solicitation {
    pub id: u64,
    pub category: Category,
}

const WILDCARD_KEY: &str = "";

/// Owns the subscription table; intake and dispatch run as independent
/// tokio tasks cooperating only through the coalescing buffer.
pub struct SubscriptionRouter {
    table: StdMutex<HashMap<String, Vec<UpdateCallback>>>,
    log_consumers: StdMutex<Vec<LogCallback>>,
    buffer: Arc<CoalescingBuffer<Update>>,
    sub: Arc<SubTransport>,
    _intake_task: tokio::task::JoinHandle<()>,
    _dispatch_task: tokio::task::JoinHandle<()>,
}

impl SubscriptionRouter {
    pub fn spawn(
        buffer_capacity: usize,
        sub: Arc<SubTransport>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Solicitation>) {
        let buffer = Arc::new(CoalescingBuffer::new(buffer_capacity, |a: &Update, b: &Update| {
            a.key == b.key
        }));
        let (solicit_tx, solicit_rx) = mpsc::unbounded_channel();

        // `Arc::new_cyclic` hands back a weak reference to the
        // not-yet-constructed Arc, which the dispatch task upgrades once
        // spawned — this breaks the otherwise-circular "dispatch needs
        // the table, the table lives on the thing holding the dispatch
        // task's handle" dependency.
        let router = Arc::new_cyclic(|weak: &std::sync::Weak<SubscriptionRouter>| {
            let dispatch_task = {
                let weak = weak.clone();
                let buffer = buffer.clone();
                tokio::spawn(async move { Self::dispatch_loop(weak, buffer).await })
            };
            SubscriptionRouter {
                table: StdMutex::new(HashMap::new()),
                log_consumers: StdMutex::new(Vec::new()),
                buffer: buffer.clone(),
                sub: sub.clone(),
                _intake_task: tokio::spawn(Self::intake_loop(sub, buffer, solicit_tx)),
                _dispatch_task: dispatch_task,
            }
        });

        (router, solicit_rx)
    }

    async fn intake_loop(
        sub: Arc<SubTransport>,
        buffer: Arc<CoalescingBuffer<Update>>,
        solicit_tx: mpsc::UnboundedSender<Solicitation>,
    ) {
        while let Some(frame) = sub.recv().await {
            match codec::decode_update(&frame) {
                Ok(update) if update.category.is_solicitation() => {
                    match decode_solicitation_id(&update.value) {
                        Some(id) => {
                            let _ = solicit_tx.send(Solicitation {
                                id,
                                category: update.category,
                            });
                        }
                        None => warn!("solicitation frame missing correlation id, dropping"),
                    }
                }
                Ok(update) => buffer.write(update),
                Err(e) => warn!(error = %e, "discarding unparseable subscription frame"),
            }
        }
    }

    async fn dispatch_loop(router: std::sync::Weak<Self>, buffer: Arc<CoalescingBuffer<Update>>) {
        while let Some(update) = buffer.read_latest_coalescing().await {
            let Some(router) = router.upgrade() else {
                return;
            };
            match update.category {
                Category::Update | Category::Publish => router.dispatch_keyed(&update),
                Category::Log => router.dispatch_log(&update.value),
                Category::Information | Category::Registry => {
                    // Solicitations never reach the buffer; intake routes
                    // them straight to the telemetry channel.
                }
            }
        }
    }

    fn dispatch_keyed(&self, update: &Update) {
        let (keyed, wildcard) = {
            let table = self.table.lock().unwrap();
            (
                table.get(&update.key).cloned().unwrap_or_default(),
                table.get(WILDCARD_KEY).cloned().unwrap_or_default(),
            )
        };
        // Per-key callbacks run before wildcard callbacks, each group in
        // registration order.
        for callback in keyed.iter().chain(wildcard.iter()) {
            invoke_guarded(callback, update);
        }
    }

    fn dispatch_log(&self, value: &[u8]) {
        let consumers = self.log_consumers.lock().unwrap().clone();
        for consumer in &consumers {
            if std::panic::catch_unwind(AssertUnwindSafe(|| consumer(value))).is_err() {
                error!("log consumer panicked, continuing dispatch");
            }
        }
    }

    /// Subscribe `callback` to `key` (the empty string is the wildcard).
    /// Installing the wire-level prefix filter is performed atomically
    /// with the table insert under the table lock.
    pub fn subscribe(&self, key: &str, callback: UpdateCallback) {
        let mut table = self.table.lock().unwrap();
        let callbacks = table.entry(key.to_string()).or_default();
        if !callbacks.iter().any(|c| Arc::ptr_eq(c, &callback)) {
            if callbacks.is_empty() {
                self.sub.add_prefix(codec::encode_update_prefix(key));
            }
            callbacks.push(callback);
        }
    }

    /// Remove `callback` from `key`'s subscriber list. The wire prefix
    /// filter is removed only once the last callback for `key` is gone.
    pub fn unsubscribe(&self, key: &str, callback: &UpdateCallback) {
        let mut table = self.table.lock().unwrap();
        if let Some(callbacks) = table.get_mut(key) {
            callbacks.retain(|c| !Arc::ptr_eq(c, callback));
            if callbacks.is_empty() {
                table.remove(key);
                self.sub.remove_prefix(&codec::encode_update_prefix(key));
            }
        }
    }

    pub fn subscribe_log(&self, consumer: LogCallback) {
        self.log_consumers.lock().unwrap().push(consumer);
    }

    pub fn buffer_occupancy(&self) -> usize {
        self.buffer.len()
    }

    pub fn shutdown(&self) {
        self.buffer.shutdown();
    }
}

fn invoke_guarded(callback: &UpdateCallback, update: &Update) {
    if std::panic::catch_unwind(AssertUnwindSafe(|| callback(update))).is_err() {
        // An exception raised by a user callback is logged but does not
        // remove the callback, halt dispatch, or terminate the loop.
        error!("subscription callback panicked, continuing dispatch");
    }
}

fn decode_solicitation_id(value: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = value.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

pub fn encode_solicitation_id(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::ConnectionMonitor;
    use crate::resolver::EndpointResolver;

    fn test_router() -> Arc<SubscriptionRouter> {
        let monitor = Arc::new(ConnectionMonitor::new());
        let resolver = Arc::new(EndpointResolver::new(None));
        let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        let sub = Arc::new(SubTransport::spawn(
            "127.0.0.1:1".to_string(),
            monitor,
            resolver,
            stop_rx,
        ));
        SubscriptionRouter::spawn(16, sub).0
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe_returns_table_to_pre_state() {
        let router = test_router();
        let callback: UpdateCallback = Arc::new(|_| {});

        router.subscribe("robot.enabled", callback.clone());
        assert_eq!(router.table.lock().unwrap().len(), 1);

        router.unsubscribe("robot.enabled", &callback);
        assert!(router.table.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_subscribe_of_the_same_callback_is_idempotent() {
        let router = test_router();
        let callback: UpdateCallback = Arc::new(|_| {});

        router.subscribe("k", callback.clone());
        router.subscribe("k", callback.clone());

        assert_eq!(router.table.lock().unwrap().get("k").unwrap().len(), 1);
    }
}
