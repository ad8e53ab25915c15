/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Server aggregate (§4): wires the Key Directory, Message Queue, Session
//! Registry, and Session Manager behind one `Arc<Inner>` handle that the
//! listener clones into every accepted connection, the way the teacher's
//! own `Server { pub inner: Arc<Inner>, .. }` is the single handle its
//! JMAP/IMAP/SMTP front ends share.

use std::sync::Arc;

use directory::KeyDirectory;
use queue::MessageQueue;
use session::{SessionIdGenerator, SessionManager, SessionRegistry};
use utils::config::Config;

pub mod housekeeper;

#[derive(Clone)]
pub struct Server {
    pub inner: Arc<Inner>,
}

pub struct Inner {
    pub config: Arc<Config>,
    pub directory: KeyDirectory,
    pub queue: MessageQueue,
    pub registry: Arc<SessionRegistry>,
    pub sessions: SessionManager,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(SessionRegistry::new());
        let queue = MessageQueue::new(config.max_offline_messages, config.message_retention);
        let sessions = SessionManager::new(
            registry.clone(),
            queue.clone(),
            config.clone(),
            Arc::new(SessionIdGenerator::default()),
        );

        Server {
            inner: Arc::new(Inner {
                config,
                directory: KeyDirectory::new(),
                queue,
                registry,
                sessions,
            }),
        }
    }
}

impl std::ops::Deref for Server {
    type Target = Inner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
