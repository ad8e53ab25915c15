/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use tokio::sync::{mpsc, Notify};

use crate::protocol::ServerFrame;

/// Monotonically increasing, process-unique identifier handed out per
/// connection. Registry displacement and identity-checked unregister both
/// compare on this rather than on `Arc` pointer identity, so a handle
/// remains comparable after being cloned into log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

#[derive(Default)]
pub struct SessionIdGenerator(std::sync::atomic::AtomicU64);

impl SessionIdGenerator {
    pub fn next(&self) -> SessionId {
        SessionId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// A handle to one live session, shared by reference between the Session
/// Registry and any task that wants to post a frame to it. The underlying
/// connection's write end is never touched here: posting means pushing
/// onto the bounded outbound mailbox, which only the owning session task
/// drains and writes to the socket (§5, per-connection write ownership).
pub struct SessionHandle {
    pub id: SessionId,
    pub address_str: String,
    outbound: mpsc::Sender<ServerFrame>,
    last_activity_ms: AtomicI64,
    close: Notify,
}

impl SessionHandle {
    pub fn new(id: SessionId, address_str: String, outbound: mpsc::Sender<ServerFrame>) -> Arc<Self> {
        Arc::new(SessionHandle {
            id,
            address_str,
            outbound,
            last_activity_ms: AtomicI64::new(utils::time::now_ms() as i64),
            close: Notify::new(),
        })
    }

    /// Signals this session's owning task to stop accepting outbound
    /// traffic and close the connection promptly (§4.4 displacement).
    pub fn signal_close(&self) {
        self.close.notify_one();
    }

    pub async fn closed(&self) {
        self.close.notified().await;
    }

    pub fn touch(&self) {
        self.last_activity_ms
            .store(utils::time::now_ms() as i64, Ordering::Relaxed);
    }

    pub fn last_activity_ms(&self) -> i64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    /// Attempts to post a frame to this session's outbound mailbox without
    /// waiting. `Err` means the mailbox is full (congested) or the
    /// session's task has already dropped the receiving end.
    pub fn try_post(&self, frame: ServerFrame) -> Result<(), mpsc::error::TrySendError<ServerFrame>> {
        self.outbound.try_send(frame)
    }

    /// Posts with a bounded wait, used for the send-timeout described in
    /// §5 (`mailboxSendTimeout`) when a caller wants to give a slightly
    /// congested mailbox a chance to drain before declaring the
    /// recipient offline for this message.
    pub async fn post_with_timeout(
        &self,
        frame: ServerFrame,
        timeout: std::time::Duration,
    ) -> Result<(), ()> {
        tokio::time::timeout(timeout, self.outbound.send(frame))
            .await
            .map_err(|_| ())
            .and_then(|r| r.map_err(|_| ()))
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

pub fn identity_eq(a: &Arc<SessionHandle>, b: &Arc<SessionHandle>) -> bool {
    a.id == b.id
}
