//! Matching out-of-band callback answers to the calls waiting for them.
//!
//! A query registers a [`PendingCall`] under a request id, ships the id and a
//! callback object to the peer, and waits. The callback side holds the
//! matching [`Fulfiller`]. Entries carry a generation so that an answer for a
//! call that already timed out cannot land in a later call reusing its id.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, trace};

use crate::error::RetError;

/// Request ids wrap at this value.
pub const REQUEST_ID_MODULUS: u32 = 0x10000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("timed out waiting for callback")]
    TimedOut,
    #[error("no pending call for {0}")]
    Stale(CorrelationKey),
    #[error("every request id is in flight")]
    Exhausted,
    #[error("pending call was cancelled")]
    Disconnected,
}

impl From<CorrelationError> for RetError {
    fn from(err: CorrelationError) -> Self {
        match err {
            CorrelationError::TimedOut => RetError::TimeOut,
            CorrelationError::Stale(_) | CorrelationError::Exhausted | CorrelationError::Disconnected => {
                RetError::Failed
            }
        }
    }
}

/// Per-session request id source.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    counter: AtomicU32,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i32 {
        (self.counter.fetch_add(1, Ordering::Relaxed) % REQUEST_ID_MODULUS) as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub window_id: i32,
    pub tree_id: i32,
    pub request_id: i32,
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "window {} tree {} request {}",
            self.window_id, self.tree_id, self.request_id
        )
    }
}

struct Entry<T> {
    generation: u64,
    sender: Sender<T>,
}

pub struct CorrelationTable<T> {
    entries: Mutex<HashMap<CorrelationKey, Entry<T>>>,
    generations: AtomicU64,
    ids: RequestIdGenerator,
}

impl<T> Default for CorrelationTable<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
            ids: RequestIdGenerator::new(),
        }
    }
}

impl<T: Send + 'static> CorrelationTable<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Allocates a request id that is not in flight for this window and tree.
    pub fn register(
        self: &Arc<Self>,
        window_id: i32,
        tree_id: i32,
    ) -> Result<(PendingCall<T>, Fulfiller<T>), CorrelationError> {
        let mut entries = self.entries.lock();
        for _ in 0..REQUEST_ID_MODULUS {
            let key = CorrelationKey {
                window_id,
                tree_id,
                request_id: self.ids.next(),
            };
            if entries.contains_key(&key) {
                trace!(target: "a11y::correlation", %key, "request id still in flight, skipping");
                continue;
            }
            let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
            let (sender, receiver) = crossbeam_channel::bounded(1);
            entries.insert(key, Entry { generation, sender });
            let pending = PendingCall {
                table: Arc::clone(self),
                key,
                generation,
                receiver,
            };
            let fulfiller = Fulfiller {
                table: Arc::clone(self),
                key,
                generation,
            };
            return Ok((pending, fulfiller));
        }
        Err(CorrelationError::Exhausted)
    }

    /// Completes the entry registered under `key` if it is still the
    /// `generation` that was handed out.
    pub fn fulfill(&self, key: CorrelationKey, generation: u64, value: T) -> Result<(), CorrelationError> {
        let entry = {
            let mut entries = self.entries.lock();
            match entries.get(&key) {
                Some(entry) if entry.generation == generation => entries.remove(&key),
                _ => None,
            }
        };
        match entry {
            Some(entry) => entry
                .sender
                .try_send(value)
                .map_err(|_| CorrelationError::Stale(key)),
            None => {
                debug!(target: "a11y::correlation", %key, generation, "dropping stale answer");
                Err(CorrelationError::Stale(key))
            }
        }
    }

    /// Completes whatever call is currently registered under `key`.
    pub fn resolve(&self, key: CorrelationKey, value: T) -> Result<(), CorrelationError> {
        let generation = self
            .entries
            .lock()
            .get(&key)
            .map(|entry| entry.generation)
            .ok_or(CorrelationError::Stale(key))?;
        self.fulfill(key, generation, value)
    }

    pub fn outstanding(&self) -> usize {
        self.entries.lock().len()
    }

    fn cancel(&self, key: CorrelationKey, generation: u64) {
        let mut entries = self.entries.lock();
        if entries.get(&key).is_some_and(|entry| entry.generation == generation) {
            entries.remove(&key);
        }
    }
}

/// Caller's half of a correlated call. Consumed once; dropping it without
/// waiting abandons the call.
pub struct PendingCall<T: Send + 'static> {
    table: Arc<CorrelationTable<T>>,
    key: CorrelationKey,
    generation: u64,
    receiver: Receiver<T>,
}

impl<T: Send + 'static> PendingCall<T> {
    pub fn key(&self) -> CorrelationKey {
        self.key
    }

    pub fn request_id(&self) -> i32 {
        self.key.request_id
    }

    /// Blocks for the answer. On timeout the entry is removed so a late
    /// answer is rejected as stale.
    pub fn wait(self, timeout: Duration) -> Result<T, CorrelationError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Disconnected) => Err(CorrelationError::Disconnected),
            Err(RecvTimeoutError::Timeout) => {
                self.table.cancel(self.key, self.generation);
                // an answer may have slipped in between the timeout and the cancel
                match self.receiver.try_recv() {
                    Ok(value) => Ok(value),
                    Err(_) => {
                        debug!(
                            target: "a11y::correlation",
                            key = %self.key,
                            timeout_ms = timeout.as_millis() as u64,
                            "pending call timed out"
                        );
                        Err(CorrelationError::TimedOut)
                    }
                }
            }
        }
    }

    /// Async form of [`PendingCall::wait`]; the wait runs on the blocking pool.
    pub async fn wait_async(self, timeout: Duration) -> Result<T, CorrelationError> {
        tokio::task::spawn_blocking(move || self.wait(timeout))
            .await
            .map_err(|_| CorrelationError::Disconnected)?
    }

    pub fn abandon(self) {}
}

impl<T: Send + 'static> Drop for PendingCall<T> {
    fn drop(&mut self) {
        self.table.cancel(self.key, self.generation);
    }
}

/// Answering half of a correlated call.
pub struct Fulfiller<T: Send + 'static> {
    table: Arc<CorrelationTable<T>>,
    key: CorrelationKey,
    generation: u64,
}

impl<T: Send + 'static> Fulfiller<T> {
    pub fn key(&self) -> CorrelationKey {
        self.key
    }

    pub fn fulfill(self, value: T) -> Result<(), CorrelationError> {
        self.table.fulfill(self.key, self.generation, value)
    }
}

impl<T: Send + 'static> fmt::Debug for Fulfiller<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fulfiller")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .finish()
    }
}
