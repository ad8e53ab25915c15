/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Structured event types and error plumbing shared by every crate in the
//! relay workspace. Logging is backed by `tracing`; this crate only adds the
//! event taxonomy and the `location!()` / `.caused_by()` context-chaining
//! idiom used to build errors that carry enough breadcrumbs to be useful in
//! logs without leaking internal structure to clients (see §7 of the design
//! doc for the propagation policy this supports).

use std::fmt;

mod level;
pub use level::Level;

pub type Result<T> = std::result::Result<T, Error>;

/// Captured at the point an error is constructed via [`location!`].
#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[macro_export]
macro_rules! location {
    () => {
        $crate::Location {
            file: file!(),
            line: line!(),
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    AuthTimeout,
    AuthInvalid,
    AuthDuplicate,
    IdleTimeout,
    Displaced,
    TransportError,
    MailboxCongested,
    ProtocolError,
    MalformedFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryEvent {
    NotFound,
    InvalidAddress,
    PayloadTooLarge,
    InvalidRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    Enqueued,
    HeadDropped,
    Purged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerEvent {
    BindError,
    UpgradeFailed,
    BodyTooLarge,
    RequestTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvent {
    Exhausted,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Session(SessionEvent),
    Directory(DirectoryEvent),
    Queue(QueueEvent),
    Listener(ListenerEvent),
    Resource(ResourceEvent),
}

impl From<SessionEvent> for EventType {
    fn from(e: SessionEvent) -> Self {
        EventType::Session(e)
    }
}

impl From<DirectoryEvent> for EventType {
    fn from(e: DirectoryEvent) -> Self {
        EventType::Directory(e)
    }
}

impl From<QueueEvent> for EventType {
    fn from(e: QueueEvent) -> Self {
        EventType::Queue(e)
    }
}

impl From<ListenerEvent> for EventType {
    fn from(e: ListenerEvent) -> Self {
        EventType::Listener(e)
    }
}

impl From<ResourceEvent> for EventType {
    fn from(e: ResourceEvent) -> Self {
        EventType::Resource(e)
    }
}

impl EventType {
    /// The severity a bare event carries before any context is attached.
    /// Validation-shaped events log at `warn`, everything else (transport,
    /// internal, resource) logs at `error`.
    pub fn level(&self) -> Level {
        match self {
            EventType::Directory(DirectoryEvent::NotFound) => Level::Debug,
            EventType::Directory(_) => Level::Warn,
            EventType::Session(SessionEvent::MalformedFrame | SessionEvent::MailboxCongested) => {
                Level::Debug
            }
            EventType::Session(_) => Level::Warn,
            EventType::Queue(_) => Level::Debug,
            EventType::Listener(_) => Level::Warn,
            EventType::Resource(_) => Level::Error,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Session(e) => write!(f, "session.{e:?}"),
            EventType::Directory(e) => write!(f, "directory.{e:?}"),
            EventType::Queue(e) => write!(f, "queue.{e:?}"),
            EventType::Listener(e) => write!(f, "listener.{e:?}"),
            EventType::Resource(e) => write!(f, "resource.{e:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Error {
    etype: EventType,
    keys: Vec<(&'static str, String)>,
    location: Option<Location>,
}

impl Error {
    pub fn new(etype: EventType) -> Self {
        Error {
            etype,
            keys: Vec::new(),
            location: None,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.etype
    }

    pub fn matches(&self, etype: EventType) -> bool {
        self.etype == etype
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn ctx(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.keys.push((key, value.to_string()));
        self
    }

    /// Emits this error through `tracing` at the severity its event type
    /// carries. Never includes message payloads; only structured
    /// identifiers passed in via [`Error::ctx`].
    pub fn emit(&self) {
        let location = self
            .location
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".into());
        match self.etype.level() {
            Level::Error => tracing::error!(event = %self.etype, at = %location, keys = ?self.keys, "error"),
            Level::Warn => tracing::warn!(event = %self.etype, at = %location, keys = ?self.keys, "warning"),
            Level::Info => tracing::info!(event = %self.etype, at = %location, keys = ?self.keys, "info"),
            Level::Debug => tracing::debug!(event = %self.etype, at = %location, keys = ?self.keys, "debug"),
        }
    }

    /// Short reason safe to hand to a client in an `error` frame or HTTP
    /// error body. Validation/protocol events get a specific message;
    /// everything else collapses to a generic one so internals never leak.
    pub fn client_message(&self) -> &'static str {
        match self.etype {
            EventType::Directory(DirectoryEvent::NotFound) => "not found",
            EventType::Directory(DirectoryEvent::InvalidAddress) => "invalid address",
            EventType::Directory(DirectoryEvent::PayloadTooLarge) => "payload too large",
            EventType::Directory(DirectoryEvent::InvalidRequest) => "invalid request",
            EventType::Session(SessionEvent::AuthTimeout) => "authentication timed out",
            EventType::Session(SessionEvent::AuthInvalid) => "invalid authentication",
            EventType::Session(SessionEvent::AuthDuplicate) => "already authenticated",
            EventType::Session(SessionEvent::MalformedFrame) => "malformed frame",
            EventType::Session(SessionEvent::ProtocolError) => "protocol error",
            _ => "internal error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.etype)?;
        if let Some(location) = self.location {
            write!(f, " at {location}")?;
        }
        for (key, value) in &self.keys {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// Converts a bare event type into an [`Error`]. Mirrors the
/// `SomeEvent::Variant.into_err()` call sites used throughout the
/// workspace.
pub trait IntoErr {
    fn into_err(self) -> Error;
}

impl<T> IntoErr for T
where
    T: Into<EventType>,
{
    fn into_err(self) -> Error {
        Error::new(self.into())
    }
}

/// Chains a `location!()` breadcrumb onto a `Result`'s error, converting
/// foreign error types into [`Error`] along the way.
pub trait AddContext<T> {
    fn caused_by(self, location: Location) -> Result<T>;
}

impl<T, E> AddContext<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn caused_by(self, location: Location) -> Result<T> {
        self.map_err(|e| e.into().with_location(location))
    }
}

pub fn init_logging(level: Level) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_tracing_filter()));
    fmt().with_env_filter(filter).with_target(false).init();
}
