/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Session Registry (§4.3): address -> active session handle, with
//! at-most-one-per-address and identity-checked unregister so a displaced
//! session's late teardown can never evict its successor.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use utils::address::Address;

use crate::handle::SessionHandle;

#[derive(Debug, Clone)]
pub struct PresenceEvent {
    pub address: Address,
    pub online: bool,
    pub at: u64,
}

pub struct SessionRegistry {
    sessions: DashMap<Address, Arc<SessionHandle>>,
    presence: broadcast::Sender<PresenceEvent>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (presence, _) = broadcast::channel(1024);
        SessionRegistry {
            sessions: DashMap::new(),
            presence,
        }
    }

    /// Single pub/sub abstraction with non-blocking producers: slow
    /// subscribers lag and drop old events rather than stall registry
    /// operations (§9, event-emitter presence stream).
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.presence.subscribe()
    }

    fn emit(&self, address: Address, online: bool) {
        let _ = self.presence.send(PresenceEvent {
            address,
            online,
            at: utils::time::now_ms(),
        });
    }

    /// Inserts `handle` for `address`. If an entry already existed, it is
    /// returned as the displaced handle — the caller MUST signal it to
    /// close. Register-and-return-displaced is one atomic map operation.
    pub fn register(&self, address: Address, handle: Arc<SessionHandle>) -> Option<Arc<SessionHandle>> {
        let displaced = self.sessions.insert(address.clone(), handle);
        if displaced.is_some() {
            self.emit(address.clone(), false);
        }
        self.emit(address, true);
        displaced
    }

    /// Removes the entry for `address` only if it is exactly `handle`
    /// (compared by session id). Returns whether the removal happened.
    pub fn unregister(&self, address: &Address, handle: &Arc<SessionHandle>) -> bool {
        let removed = self
            .sessions
            .remove_if(address, |_, current| current.id == handle.id)
            .is_some();
        if removed {
            self.emit(address.clone(), false);
        }
        removed
    }

    pub fn lookup(&self, address: &Address) -> Option<Arc<SessionHandle>> {
        self.sessions.get(address).map(|r| r.clone())
    }

    pub fn online_addresses(&self) -> Vec<Address> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_online(&self, address: &Address) -> bool {
        self.sessions.contains_key(address)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        SessionRegistry::new()
    }
}
