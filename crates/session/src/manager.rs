/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Session Manager (§4.4): owns one client connection from accept to
//! close. Generalizes the teacher's `Session<T: AsyncRead + AsyncWrite>` +
//! `State` state machine (`crates/smtp/src/core/mod.rs`) to this relay's
//! `Connected -> Authenticated -> Closing -> Closed` transitions, driven
//! by tagged JSON frames instead of SMTP commands. `run` is the task that
//! owns the connection's write end for its whole lifetime — every other
//! component reaches this session only through its outbound mailbox
//! (§5, per-connection write ownership).

use std::sync::Arc;

use queue::{Envelope, MessageQueue};
use tokio::sync::{mpsc, watch};
use trc::IntoErr;
use utils::{address::Address, config::Config, limits, time::now_ms};

use crate::{
    handle::{SessionHandle, SessionIdGenerator},
    protocol::{ClientFrame, ServerFrame},
    registry::SessionRegistry,
};

/// Write half of a framed, text-based connection.
#[async_trait::async_trait]
pub trait TransportSink: Send {
    async fn send(&mut self, text: String) -> std::io::Result<()>;

    async fn close(&mut self);
}

/// Read half of a framed, text-based connection.
#[async_trait::async_trait]
pub trait TransportStream: Send {
    /// Returns `None` when the peer closed the connection, `Some(Err(_))`
    /// on a transport-level read failure.
    async fn recv(&mut self) -> Option<std::io::Result<String>>;
}

/// A framed, text-based duplex connection that splits into independent
/// read/write halves, the same shape `tokio_tungstenite`'s
/// `WebSocketStream` offers via `StreamExt::split`. Splitting up front is
/// what lets `run`'s select loop hold a read in flight on `Stream` while a
/// concurrent branch writes through `Sink` — the two halves borrow
/// disjoint fields, so the borrow checker doesn't see them as competing
/// for the same connection. The listener crate implements this over a
/// `WebSocketStream`; tests implement it over in-memory channels. This is
/// the relay's analogue of the teacher's `Session<T: AsyncRead +
/// AsyncWrite>` being codec-agnostic.
pub trait Transport: Send {
    type Sink: TransportSink;
    type Stream: TransportStream;

    fn split(self) -> (Self::Sink, Self::Stream);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Connected,
    Authenticated,
    Closing,
    Closed,
}

/// Why a session transitioned to `Closing`. Drives whether an `error`
/// frame is attempted before teardown (§7 propagation policy).
enum CloseReason {
    AuthTimeout,
    AuthInvalid(&'static str),
    Displaced,
    IdleTimeout,
    ProtocolError(&'static str),
    TransportError,
    ClientClosed,
}

/// The shared, cloneable components every session needs: the registry to
/// register/unregister with, the queue to drain on login and enqueue to
/// when a recipient is offline, and the timers/limits from §6.4.
#[derive(Clone)]
pub struct SessionManager {
    pub registry: Arc<SessionRegistry>,
    pub queue: MessageQueue,
    pub config: Arc<Config>,
    pub ids: Arc<SessionIdGenerator>,
}

impl SessionManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        queue: MessageQueue,
        config: Arc<Config>,
        ids: Arc<SessionIdGenerator>,
    ) -> Self {
        SessionManager {
            registry,
            queue,
            config,
            ids,
        }
    }

    /// Drives one connection end to end. Returns once the session has
    /// reached `Closed`.
    pub async fn run<T: Transport>(&self, transport: T, mut shutdown: watch::Receiver<bool>) {
        let (mut sink, mut stream) = transport.split();
        let id = self.ids.next();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerFrame>(self.config.mailbox_capacity);

        let (address, handle) = match self.authenticate(&mut sink, &mut stream, id, outbound_tx).await {
            Ok(pair) => pair,
            Err(reason) => {
                self.send_close_reason(&mut sink, &reason).await;
                sink.close().await;
                return;
            }
        };

        let mut state = State::Authenticated;
        self.drain_queue(&mut sink, &address).await;

        // Only an inbound frame from the client resets this; delivering
        // live traffic *to* this session (the outbound_rx branch) must
        // not postpone the idle timeout (§4.4/§8).
        let mut idle_deadline = tokio::time::Instant::now() + self.config.idle_timeout;
        let mut close_reason: Option<CloseReason> = None;

        while state == State::Authenticated {
            tokio::select! {
                biased;

                _ = handle.closed() => {
                    state = State::Closing;
                    close_reason = Some(CloseReason::Displaced);
                }
                changed = shutdown.changed() => {
                    if changed.is_ok() && *shutdown.borrow() {
                        state = State::Closing;
                    }
                }
                frame = outbound_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            if sink.send(encode(&frame)).await.is_err() {
                                state = State::Closing;
                                close_reason = Some(CloseReason::TransportError);
                            }
                        }
                        None => state = State::Closing,
                    }
                }
                _ = tokio::time::sleep_until(idle_deadline) => {
                    state = State::Closing;
                    close_reason = Some(CloseReason::IdleTimeout);
                }
                incoming = stream.recv() => {
                    match incoming {
                        Some(Ok(text)) => {
                            handle.touch();
                            idle_deadline = tokio::time::Instant::now() + self.config.idle_timeout;
                            if let Some(reason) = self.dispatch(&mut sink, &address, &text).await {
                                state = State::Closing;
                                close_reason = Some(reason);
                            }
                        }
                        Some(Err(_)) => {
                            state = State::Closing;
                            close_reason = Some(CloseReason::TransportError);
                        }
                        None => {
                            state = State::Closing;
                            close_reason = Some(CloseReason::ClientClosed);
                        }
                    }
                }
            }
        }

        if let Some(reason) = &close_reason {
            self.send_close_reason(&mut sink, reason).await;
        }

        // CLOSING -> CLOSED: flush the outbound mailbox within the drain
        // deadline, then close and unregister (identity-checked so a
        // displaced session's late teardown cannot evict its successor).
        let deadline = tokio::time::Instant::now() + self.config.drain_deadline;
        while let Ok(Some(frame)) =
            tokio::time::timeout_at(deadline, outbound_rx.recv()).await
        {
            if sink.send(encode(&frame)).await.is_err() {
                break;
            }
        }
        sink.close().await;
        self.registry.unregister(&address, &handle);
    }

    /// CONNECTED -> AUTHENTICATED. The first frame must be `auth` with a
    /// canonical address, arriving within `auth_timeout`.
    async fn authenticate<S: TransportSink, R: TransportStream>(
        &self,
        sink: &mut S,
        stream: &mut R,
        id: crate::handle::SessionId,
        outbound_tx: mpsc::Sender<ServerFrame>,
    ) -> Result<(Address, Arc<SessionHandle>), CloseReason> {
        let first = tokio::time::timeout(self.config.auth_timeout, stream.recv())
            .await
            .map_err(|_| CloseReason::AuthTimeout)?
            .ok_or(CloseReason::ClientClosed)?
            .map_err(|_| CloseReason::TransportError)?;

        let frame: ClientFrame = serde_json::from_str(&first)
            .map_err(|_| CloseReason::AuthInvalid("malformed frame"))?;

        let address = match frame {
            ClientFrame::Auth { address } => address,
            _ => return Err(CloseReason::AuthInvalid("first frame must be auth")),
        };

        let handle = SessionHandle::new(id, address.to_string(), outbound_tx);
        if let Some(displaced) = self.registry.register(address.clone(), handle.clone()) {
            trc::SessionEvent::Displaced
                .into_err()
                .ctx("address", &address)
                .emit();
            displaced.signal_close();
        }

        let auth_success = ServerFrame::AuthSuccess {
            address: address.clone(),
            timestamp: now_ms(),
        };
        sink.send(encode(&auth_success))
            .await
            .map_err(|_| CloseReason::TransportError)?;

        Ok((address, handle))
    }

    /// Forwards every non-expired queued envelope for `address` as a
    /// `message{queued: true}` frame, oldest first, before any live
    /// traffic is accepted for this connection.
    async fn drain_queue<S: TransportSink>(&self, sink: &mut S, address: &Address) {
        for envelope in self.queue.drain(address) {
            let frame = ServerFrame::Message {
                from: envelope.from,
                content: envelope.content,
                message_id: envelope.message_id,
                timestamp: envelope.timestamp,
                queued: true,
            };
            if sink.send(encode(&frame)).await.is_err() {
                return;
            }
        }
    }

    /// Returns `Some(reason)` when the frame requires tearing the session
    /// down; the caller routes that reason through `send_close_reason`
    /// once the select loop has exited, rather than signaling itself via
    /// `handle.closed()` (that path is reserved for displacement by a new
    /// connection for the same address).
    async fn dispatch<S: TransportSink>(
        &self,
        sink: &mut S,
        address: &Address,
        text: &str,
    ) -> Option<CloseReason> {
        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(_) => {
                trc::SessionEvent::MalformedFrame.into_err().emit();
                let _ = sink
                    .send(encode(&ServerFrame::Error {
                        message: "malformed frame".into(),
                    }))
                    .await;
                return None;
            }
        };

        match frame {
            // §4.4: a second auth on an already-authenticated session is a
            // protocol error that ends the session.
            ClientFrame::Auth { .. } => Some(CloseReason::ProtocolError("already authenticated")),
            ClientFrame::Message {
                to,
                content,
                message_id,
                timestamp,
            } => {
                self.handle_message(sink, address, to, content, message_id, timestamp)
                    .await;
                None
            }
            ClientFrame::Typing { to, is_typing } => {
                if let Some(recipient) = self.registry.lookup(&to) {
                    let _ = recipient.try_post(ServerFrame::Typing {
                        from: address.clone(),
                        is_typing,
                    });
                }
                None
            }
            ClientFrame::ReadReceipt { to, message_id } => {
                if let Some(recipient) = self.registry.lookup(&to) {
                    let _ = recipient.try_post(ServerFrame::Read {
                        from: address.clone(),
                        message_id,
                        timestamp: now_ms(),
                    });
                }
                None
            }
            ClientFrame::Ping => {
                let _ = sink
                    .send(encode(&ServerFrame::Pong { timestamp: now_ms() }))
                    .await;
                None
            }
            ClientFrame::Unknown => {
                tracing::debug!(address = %address, "ignored unknown frame type");
                None
            }
        }
    }

    async fn handle_message<S: TransportSink>(
        &self,
        sink: &mut S,
        from: &Address,
        to: Address,
        content: String,
        message_id: String,
        timestamp: u64,
    ) {
        if message_id.len() > limits::MAX_MESSAGE_ID_LEN || content.len() > limits::MAX_CONTENT_BYTES {
            let _ = sink
                .send(encode(&ServerFrame::Error {
                    message: "message exceeds size limit".into(),
                }))
                .await;
            return;
        }

        let live_frame = ServerFrame::Message {
            from: from.clone(),
            content: content.clone(),
            message_id: message_id.clone(),
            timestamp,
            queued: false,
        };

        let delivered = if let Some(recipient) = self.registry.lookup(&to) {
            recipient
                .post_with_timeout(live_frame, self.config.mailbox_send_timeout)
                .await
                .is_ok()
        } else {
            false
        };

        let now = now_ms();
        let reply = if delivered {
            ServerFrame::Delivered {
                message_id,
                to,
                timestamp: now,
            }
        } else {
            self.queue.enqueue(Envelope {
                message_id: message_id.clone(),
                from: from.clone(),
                to: to.clone(),
                content,
                timestamp,
            });
            ServerFrame::Queued {
                message_id,
                to,
                timestamp: now,
            }
        };
        let _ = sink.send(encode(&reply)).await;
    }

    async fn send_close_reason<S: TransportSink>(&self, sink: &mut S, reason: &CloseReason) {
        let message = match reason {
            CloseReason::AuthTimeout => {
                trc::SessionEvent::AuthTimeout.into_err().emit();
                Some("authentication timed out")
            }
            CloseReason::AuthInvalid(why) => {
                trc::SessionEvent::AuthInvalid.into_err().ctx("reason", *why).emit();
                Some("invalid authentication")
            }
            CloseReason::ProtocolError(why) => {
                trc::SessionEvent::ProtocolError.into_err().ctx("reason", *why).emit();
                Some(*why)
            }
            CloseReason::IdleTimeout => {
                trc::SessionEvent::IdleTimeout.into_err().emit();
                Some("idle timeout")
            }
            CloseReason::Displaced | CloseReason::TransportError | CloseReason::ClientClosed => None,
        };
        if let Some(message) = message {
            let _ = sink
                .send(encode(&ServerFrame::Error {
                    message: message.into(),
                }))
                .await;
        }
    }
}

fn encode(frame: &ServerFrame) -> String {
    serde_json::to_string(frame).unwrap_or_else(|_| {
        r#"{"type":"error","message":"internal error"}"#.to_string()
    })
}
