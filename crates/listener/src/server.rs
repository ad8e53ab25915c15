/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Accept loop (§4.5): one `TcpListener` serves both the WebSocket upgrade
//! and the REST surface on the same port, the way the teacher's
//! `ServerInstance` binds one listener per protocol and hands every
//! accepted stream to `http1::Builder::serve_connection`. Each connection
//! is metered by a `ConcurrencyLimiter` permit held for its lifetime.

use std::{convert::Infallible, net::SocketAddr, time::Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full, Limited};
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::{net::TcpListener, sync::watch};

use common::Server;
use trc::IntoErr;

use crate::{limiter::ConcurrencyLimiter, ws::WsTransport};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, Infallible>;

fn full(bytes: Vec<u8>) -> BoxBody {
    Full::new(Bytes::from(bytes)).map_err(|never| match never {}).boxed()
}

fn empty() -> BoxBody {
    Empty::new().map_err(|never| match never {}).boxed()
}

pub async fn bind(config: &utils::config::Config) -> std::io::Result<TcpListener> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    TcpListener::bind(addr).await
}

/// Accepts connections until `shutdown` flips, spawning one task per
/// connection. Each task is independently responsible for completing its
/// own in-flight work inside `drain_deadline` once the session layer
/// observes shutdown — this loop only stops handing out new work.
pub async fn serve(listener: TcpListener, server: Server, mut shutdown: watch::Receiver<bool>) {
    let limiter = ConcurrencyLimiter::new(server.config.max_connections);
    let started_at = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        trc::ListenerEvent::BindError
                            .into_err()
                            .ctx("error", err.to_string())
                            .with_location(trc::location!())
                            .emit();
                        continue;
                    }
                };

                let Some(permit) = limiter.try_acquire() else {
                    tracing::debug!(%peer, "connection refused: at capacity");
                    continue;
                };

                let server = server.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    serve_connection(stream, server, shutdown, started_at, peer).await;
                });
            }
        }
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    server: Server,
    shutdown: watch::Receiver<bool>,
    started_at: Instant,
    peer: SocketAddr,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        handle(req, server.clone(), shutdown.clone(), started_at)
    });

    let conn = http1::Builder::new()
        .serve_connection(io, service)
        .with_upgrades();

    if let Err(err) = conn.await {
        tracing::debug!(%peer, error = %err, "connection closed with error");
    }
}

async fn handle(
    req: Request<Incoming>,
    server: Server,
    shutdown: watch::Receiver<bool>,
    started_at: Instant,
) -> Result<Response<BoxBody>, Infallible> {
    if hyper_tungstenite::is_upgrade_request(&req) && req.uri().path() == server.config.ws_path {
        return Ok(upgrade_to_websocket(req, server, shutdown).await);
    }

    let origin = req
        .headers()
        .get(hyper::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if req.method() == hyper::Method::OPTIONS {
        return Ok(cors_preflight(&server, origin.as_deref()));
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let limited = Limited::new(req.into_body(), server.config.max_body_bytes);
    let body = match limited.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => {
            return Ok(json_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                br#"{"error":"body_too_large","message":"request body exceeds the configured limit"}"#.to_vec(),
                origin.as_deref(),
                &server,
            ));
        }
    };

    let request_timeout = server.config.http_request_timeout;
    let response = match tokio::time::timeout(
        request_timeout,
        crate::http::route(&server, &method, &segments, &body, started_at),
    )
    .await
    {
        Ok(response) => response,
        Err(_) => {
            trc::ListenerEvent::RequestTimeout
                .into_err()
                .ctx("path", path.clone())
                .with_location(trc::location!())
                .emit();
            return Ok(json_response(
                StatusCode::GATEWAY_TIMEOUT,
                br#"{"error":"request_timeout","message":"request exceeded the configured timeout"}"#.to_vec(),
                origin.as_deref(),
                &server,
            ));
        }
    };
    let payload = if response.status == StatusCode::NO_CONTENT {
        Vec::new()
    } else {
        serde_json::to_vec(&response.body).unwrap_or_default()
    };
    Ok(json_response(response.status, payload, origin.as_deref(), &server))
}

async fn upgrade_to_websocket(
    mut req: Request<Incoming>,
    server: Server,
    shutdown: watch::Receiver<bool>,
) -> Response<BoxBody> {
    match hyper_tungstenite::upgrade(&mut req, None) {
        Ok((response, websocket)) => {
            tokio::spawn(async move {
                match WsTransport::accept(websocket).await {
                    Ok(transport) => {
                        server.sessions.run(transport, shutdown).await;
                    }
                    Err(err) => {
                        trc::ListenerEvent::UpgradeFailed
                            .into_err()
                            .ctx("error", err.to_string())
                            .with_location(trc::location!())
                            .emit();
                    }
                }
            });
            response.map(|body| body.map_err(|never| match never {}).boxed())
        }
        Err(err) => {
            trc::ListenerEvent::UpgradeFailed
                .into_err()
                .ctx("error", err.to_string())
                .with_location(trc::location!())
                .emit();
            Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(empty())
                .unwrap()
        }
    }
}

fn cors_preflight(server: &Server, origin: Option<&str>) -> Response<BoxBody> {
    let mut builder = Response::builder().status(StatusCode::NO_CONTENT);
    if let Some(origin) = origin.filter(|o| server.config.allowed_origins.allows(o)) {
        builder = builder
            .header(hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN, origin)
            .header(hyper::header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, DELETE, OPTIONS")
            .header(hyper::header::ACCESS_CONTROL_ALLOW_HEADERS, "content-type");
    }
    builder.body(empty()).unwrap()
}

fn json_response(
    status: StatusCode,
    payload: Vec<u8>,
    origin: Option<&str>,
    server: &Server,
) -> Response<BoxBody> {
    let mut builder = Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json");
    if let Some(origin) = origin.filter(|o| server.config.allowed_origins.allows(o)) {
        builder = builder.header(hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    builder.body(full(payload)).unwrap()
}
