use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use core_types::types::BinRecord;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::binner::BinnerCounters;

/// Delivery channels registered against one binner.
///
/// Publish never blocks: a full channel is a slow consumer and that delivery
/// is dropped (counted, debug-logged); closed channels are pruned. Mutation
/// of the set is safe concurrently with publish.
pub struct SubscriberSet {
    label: String,
    senders: Mutex<HashMap<u64, mpsc::Sender<Vec<BinRecord>>>>,
    next_id: AtomicU64,
    counters: Arc<BinnerCounters>,
}

impl SubscriberSet {
    pub fn new(label: impl Into<String>, counters: Arc<BinnerCounters>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            senders: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            counters,
        })
    }

    /// Registers a bounded delivery channel. The returned [`Subscription`]
    /// unregisters itself on drop, whatever the exit path.
    pub fn subscribe(self: &Arc<Self>, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.senders.lock().insert(id, tx);
        Subscription {
            id,
            rx,
            set: Arc::clone(self),
        }
    }

    /// Attempts a non-blocking send of `records` to every registered channel.
    pub fn publish(&self, records: &[BinRecord]) {
        if records.is_empty() {
            return;
        }
        let snapshot: Vec<(u64, mpsc::Sender<Vec<BinRecord>>)> = {
            let guard = self.senders.lock();
            guard.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };
        let mut closed = Vec::new();
        for (id, tx) in snapshot {
            match tx.try_send(records.to_vec()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.counters.publish_drops.fetch_add(1, Ordering::Relaxed);
                    log::debug!(
                        "{}: subscriber {} full; dropping {} bins",
                        self.label,
                        id,
                        records.len()
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }
        if !closed.is_empty() {
            let mut guard = self.senders.lock();
            for id in closed {
                guard.remove(&id);
            }
        }
    }

    /// Drops every registered sender so consumers observe end-of-stream.
    pub fn close(&self) {
        self.senders.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.senders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.lock().is_empty()
    }

    fn remove(&self, id: u64) {
        self.senders.lock().remove(&id);
    }
}

/// Scoped registration against a [`SubscriberSet`]; receiving half of the
/// delivery channel. Dropping it removes the channel from the set.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Vec<BinRecord>>,
    set: Arc<SubscriberSet>,
}

impl Subscription {
    /// Next published batch of bins; `None` once the binner closed.
    pub async fn recv(&mut self) -> Option<Vec<BinRecord>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<BinRecord>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.set.remove(self.id);
    }
}
