/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Message Queue (§4.2): a bounded per-address FIFO of pending ciphertext
//! envelopes with head-drop eviction at capacity and age-based expiry.
//! Enqueue, drain, and size observations are serialized per recipient —
//! one `parking_lot::Mutex` guards each address's deque, sharded by a
//! `DashMap` the same way the key directory shards its table.

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use utils::address::Address;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: String,
    pub from: Address,
    pub to: Address,
    pub content: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone)]
struct QueuedEntry {
    envelope: Envelope,
    enqueued_at: Instant,
}

/// Outcome of an `Enqueue` call. The incoming envelope is never refused —
/// `evicted` reports whether appending it pushed the recipient's queue over
/// `max_per_user`, causing the oldest entry to be head-dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted { evicted: bool },
}

#[derive(Clone)]
pub struct MessageQueue {
    queues: Arc<DashMap<Address, Mutex<VecDeque<QueuedEntry>>>>,
    max_per_user: usize,
    retention: Duration,
}

impl MessageQueue {
    pub fn new(max_per_user: usize, retention: Duration) -> Self {
        MessageQueue {
            queues: Arc::new(DashMap::new()),
            max_per_user,
            retention,
        }
    }

    fn is_expired(&self, entry: &QueuedEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.enqueued_at) >= self.retention
    }

    /// Appends to the recipient's FIFO, head-dropping the oldest entry if
    /// already at `max_per_user`. Opportunistically sweeps expired entries
    /// first, since that alone may free enough room to avoid evicting a
    /// live one.
    pub fn enqueue(&self, envelope: Envelope) -> EnqueueOutcome {
        let now = Instant::now();
        let slot = self
            .queues
            .entry(envelope.to.clone())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut deque = slot.lock();

        if deque.len() >= self.max_per_user {
            while let Some(front) = deque.front() {
                if self.is_expired(front, now) {
                    deque.pop_front();
                } else {
                    break;
                }
            }
        }

        let mut evicted = false;
        if deque.len() >= self.max_per_user {
            deque.pop_front();
            evicted = true;
        }

        deque.push_back(QueuedEntry {
            envelope,
            enqueued_at: now,
        });

        EnqueueOutcome::Accepted { evicted }
    }

    /// Atomically removes and returns all non-expired entries for
    /// `address`, oldest first. After this call the address has no
    /// queued entries.
    pub fn drain(&self, address: &Address) -> Vec<Envelope> {
        let Some(slot) = self.queues.get(address) else {
            return Vec::new();
        };
        let now = Instant::now();
        let taken = std::mem::take(&mut *slot.lock());
        taken
            .into_iter()
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| entry.envelope)
            .collect()
    }

    /// Non-destructive read of every non-expired entry for `address`,
    /// oldest first. Unlike `drain`, the queue is left untouched — used by
    /// the HTTP introspection endpoint (`GET /api/messages/:address`).
    pub fn peek(&self, address: &Address) -> Vec<Envelope> {
        let Some(slot) = self.queues.get(address) else {
            return Vec::new();
        };
        let now = Instant::now();
        slot.lock()
            .iter()
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| entry.envelope.clone())
            .collect()
    }

    /// Current non-expired count. May over-count conservatively if purge
    /// has not run recently; `drain` always reconciles.
    pub fn size(&self, address: &Address) -> usize {
        let Some(slot) = self.queues.get(address) else {
            return 0;
        };
        let now = Instant::now();
        slot.lock()
            .iter()
            .filter(|entry| !self.is_expired(entry, now))
            .count()
    }

    /// Sweeps every address, removing entries with age >= retention.
    /// Returns the number of entries purged. Meant to run on a timer
    /// (default hourly, see the housekeeper in `common`).
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;
        for entry in self.queues.iter() {
            let mut deque = entry.value().lock();
            let before = deque.len();
            deque.retain(|e| !self.is_expired(e, now));
            purged += before - deque.len();
        }
        purged
    }

    pub fn clear(&self, address: &Address) {
        if let Some(slot) = self.queues.get(address) {
            slot.lock().clear();
        }
    }

    pub fn total_queued(&self) -> usize {
        self.queues.iter().map(|e| e.value().lock().len()).sum()
    }

    /// Aggregate counters for `GET /api/messages/stats/all`.
    pub fn stats(&self) -> QueueStats {
        let mut total = 0;
        let mut addresses_with_messages = 0;
        for entry in self.queues.iter() {
            let len = entry.value().lock().len();
            if len > 0 {
                total += len;
                addresses_with_messages += 1;
            }
        }
        QueueStats {
            total_queued: total,
            addresses_with_messages,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_queued: usize,
    pub addresses_with_messages: usize,
}
