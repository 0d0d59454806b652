//! # State Publisher
//!
//! Holds the latest [`TunerState`] behind a lock as an `Arc`, so a reader
//! always clones a complete snapshot and a writer swaps in a whole new one.
//!
//! Subscribers get a wake-up channel of capacity one. A publish while a
//! wake-up is already pending is folded into it, and the subscriber reads
//! whatever is latest when it wakes: last value wins, intermediate
//! snapshots may be skipped.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};

use crate::TunerState;

#[derive(Debug)]
struct Shared {
    latest: RwLock<Arc<TunerState>>,
    subscribers: Mutex<Vec<Sender<()>>>,
}

/// Cheap to clone; all clones publish to and read from the same slot.
#[derive(Debug, Clone)]
pub struct StatePublisher {
    shared: Arc<Shared>,
}

impl StatePublisher {
    pub fn new(initial: TunerState) -> Self {
        Self {
            shared: Arc::new(Shared {
                latest: RwLock::new(Arc::new(initial)),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Replaces the current snapshot and wakes subscribers.
    pub fn publish(&self, state: TunerState) {
        *self.shared.latest.write() = Arc::new(state);

        self.shared.subscribers.lock().retain(|tx| match tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => false,
        });
    }

    /// The most recent snapshot.
    pub fn latest(&self) -> Arc<TunerState> {
        Arc::clone(&self.shared.latest.read())
    }

    /// Registers a subscriber that is woken by later publications.
    pub fn subscribe(&self) -> StateSubscription {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.shared.subscribers.lock().push(tx);
        StateSubscription {
            wake: rx,
            publisher: self.clone(),
        }
    }

    /// Number of live subscriptions, as of the last publication.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }
}

impl Default for StatePublisher {
    fn default() -> Self {
        Self::new(TunerState::default())
    }
}

/// Receives the latest snapshot after each publication.
#[derive(Debug)]
pub struct StateSubscription {
    wake: Receiver<()>,
    publisher: StatePublisher,
}

impl StateSubscription {
    /// Blocks until something is published, then returns the latest
    /// snapshot. `None` once every publisher is gone.
    pub fn recv(&self) -> Option<Arc<TunerState>> {
        self.wake.recv().ok().map(|()| self.publisher.latest())
    }

    /// The latest snapshot if something was published since the last call.
    pub fn try_recv(&self) -> Option<Arc<TunerState>> {
        self.wake.try_recv().ok().map(|()| self.publisher.latest())
    }

    /// Like [`recv`](Self::recv) with a deadline.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Arc<TunerState>> {
        match self.wake.recv_timeout(timeout) {
            Ok(()) => Some(self.publisher.latest()),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// The latest snapshot without waiting.
    pub fn latest(&self) -> Arc<TunerState> {
        self.publisher.latest()
    }
}
