/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::watch,
};
use utils::config::Config;

/// A relay instance bound to an OS-assigned loopback port, with its own
/// `common::Server` handle so tests can inspect registry/queue/directory
/// state directly alongside driving the real wire protocols.
pub struct RunningRelay {
    pub server: common::Server,
    pub port: u16,
    shutdown: watch::Sender<bool>,
}

impl RunningRelay {
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/", self.port)
    }

    pub fn http_addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

impl Drop for RunningRelay {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Boots a full relay (listener + housekeeper) with the given config
/// override, returning once the socket is accepting connections.
pub async fn spawn_with(config: Config) -> RunningRelay {
    let mut config = config;
    config.bind_address = "127.0.0.1".into();
    config.port = 0;

    let server = common::Server::new(config.clone());
    let tcp_listener = listener::bind(&config)
        .await
        .expect("bind to an OS-assigned loopback port");
    let port = tcp_listener.local_addr().unwrap().port();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn({
        let server = server.clone();
        let shutdown_rx = shutdown_rx.clone();
        async move { listener::serve(tcp_listener, server, shutdown_rx).await }
    });
    tokio::spawn({
        let server = server.clone();
        async move { server.run_housekeeper(shutdown_rx).await }
    });

    RunningRelay {
        server,
        port,
        shutdown: shutdown_tx,
    }
}

pub async fn spawn() -> RunningRelay {
    spawn_with(Config::default()).await
}

pub fn addr(tail: &str) -> utils::address::Address {
    format!("0x{:0>40}", tail).parse().unwrap()
}

/// Issues one raw HTTP/1.1 request against the relay's shared listening
/// port and returns `(status, body)`. `Connection: close` makes the server
/// close the socket once the response is written, so reading to EOF is
/// enough to recover the whole response without a Content-Length parser.
pub async fn http_request(
    http_addr: &str,
    method: &str,
    path: &str,
    body: &str,
) -> (u16, serde_json::Value) {
    let mut stream = tokio::net::TcpStream::connect(http_addr)
        .await
        .expect("connect to relay HTTP port");

    let request = if body.is_empty() {
        format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
    } else {
        format!(
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
    };
    stream
        .write_all(request.as_bytes())
        .await
        .expect("write HTTP request");
    stream.shutdown().await.ok();

    let mut raw = Vec::new();
    stream
        .read_to_end(&mut raw)
        .await
        .expect("read HTTP response");
    let text = String::from_utf8_lossy(&raw);

    let mut parts = text.splitn(2, "\r\n\r\n");
    let head = parts.next().unwrap_or_default();
    let body_text = parts.next().unwrap_or_default();

    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .expect("parse HTTP status line");

    let json = if body_text.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(body_text).expect("parse JSON response body")
    };

    (status, json)
}
