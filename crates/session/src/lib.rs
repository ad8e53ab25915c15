/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Session Registry (§4.3) and Session Manager (§4.4): the connection
//! layer. `registry` owns the address -> handle map and the presence
//! stream; `handle` is the cross-task reference to a live session's
//! outbound mailbox; `protocol` is the tagged-JSON wire format (§6.2);
//! `manager` drives the per-connection state machine generic over any
//! transport that can frame text messages in and out.

pub mod handle;
pub mod manager;
pub mod protocol;
pub mod registry;

pub use handle::{SessionHandle, SessionId, SessionIdGenerator};
pub use manager::{SessionManager, State, Transport, TransportSink, TransportStream};
pub use protocol::{ClientFrame, ServerFrame};
pub use registry::{PresenceEvent, SessionRegistry};
