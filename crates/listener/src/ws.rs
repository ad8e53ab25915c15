/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! WebSocket transport (§6.1): adapts a `hyper_tungstenite` upgraded stream
//! to `session::{Transport, TransportSink, TransportStream}`. Text frames
//! carry JSON (§6.2); every other frame kind is either consumed
//! transparently by the underlying library (ping/pong) or ignored.

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use hyper_tungstenite::{tungstenite::Message, HyperWebsocket, WebSocketStream};
use hyper_util::rt::TokioIo;
use hyper::upgrade::Upgraded;

type Conn = WebSocketStream<TokioIo<Upgraded>>;

pub struct WsTransport {
    inner: Conn,
}

impl WsTransport {
    pub async fn accept(websocket: HyperWebsocket) -> Result<Self, hyper_tungstenite::tungstenite::Error> {
        Ok(WsTransport {
            inner: websocket.await?,
        })
    }
}

pub struct WsSink(SplitSink<Conn, Message>);
pub struct WsStream(SplitStream<Conn>);

impl session::manager::Transport for WsTransport {
    type Sink = WsSink;
    type Stream = WsStream;

    fn split(self) -> (WsSink, WsStream) {
        let (sink, stream) = self.inner.split();
        (WsSink(sink), WsStream(stream))
    }
}

fn to_io_error(err: hyper_tungstenite::tungstenite::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
}

#[async_trait::async_trait]
impl session::manager::TransportSink for WsSink {
    async fn send(&mut self, text: String) -> std::io::Result<()> {
        self.0.send(Message::Text(text)).await.map_err(to_io_error)
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}

#[async_trait::async_trait]
impl session::manager::TransportStream for WsStream {
    /// Loops past control/binary frames — the wire protocol is text-only
    /// (§6.1) — surfacing only `Text` payloads and terminal conditions.
    async fn recv(&mut self) -> Option<std::io::Result<String>> {
        loop {
            match self.0.next().await {
                None => return None,
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                Some(Ok(Message::Close(_))) => return None,
                Some(Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    continue;
                }
                Some(Err(err)) => return Some(Err(to_io_error(err))),
            }
        }
    }
}
