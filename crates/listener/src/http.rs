/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! REST surface (§6.3): key directory, message queue introspection, and
//! presence endpoints. Routing follows the teacher's own
//! `match (path.get(1), path.get(2), path.get(3), method) { ... }`
//! dispatch idiom (`crates/jmap/src/api/management/stores.rs`), narrowed
//! from that file's many admin routes down to this relay's handful.

use std::time::Instant;

use bytes::Bytes;
use hyper::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use common::Server;
use utils::address::Address;

pub type JsonBody = serde_json::Value;

pub struct ApiResponse {
    pub status: StatusCode,
    pub body: JsonBody,
}

impl ApiResponse {
    fn ok(body: JsonBody) -> Self {
        ApiResponse {
            status: StatusCode::OK,
            body,
        }
    }

    fn no_content() -> Self {
        ApiResponse {
            status: StatusCode::NO_CONTENT,
            body: JsonBody::Null,
        }
    }

    fn error(status: StatusCode, code: &str, message: &str) -> Self {
        ApiResponse {
            status,
            body: json!({ "error": code, "message": message }),
        }
    }

    fn bad_request(message: &str) -> Self {
        Self::error(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    fn not_found() -> Self {
        Self::error(StatusCode::NOT_FOUND, "not_found", "not found")
    }
}

#[derive(Deserialize)]
struct StoreKeyBody {
    address: String,
    #[serde(rename = "publicKey")]
    public_key: String,
}

#[derive(Deserialize)]
struct BatchAddressesBody {
    addresses: Vec<String>,
}

#[derive(Serialize)]
struct KeyRecordView {
    address: Address,
    #[serde(rename = "publicKey")]
    public_key: String,
    #[serde(rename = "createdAt")]
    created_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "updatedAt")]
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<directory::KeyRecord> for KeyRecordView {
    fn from(record: directory::KeyRecord) -> Self {
        KeyRecordView {
            address: record.address,
            public_key: record.public_key,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// The JSON shape of an envelope returned by `GET /api/messages/:address`
/// (§3): a non-destructive read, so every entry is necessarily one that
/// would arrive with `queued: true` if drained live.
#[derive(Serialize)]
struct EnvelopeView {
    #[serde(rename = "messageId")]
    message_id: String,
    from: Address,
    to: Address,
    content: String,
    timestamp: u64,
    queued: bool,
}

impl From<queue::Envelope> for EnvelopeView {
    fn from(envelope: queue::Envelope) -> Self {
        EnvelopeView {
            message_id: envelope.message_id,
            from: envelope.from,
            to: envelope.to,
            content: envelope.content,
            timestamp: envelope.timestamp,
            queued: true,
        }
    }
}

fn parse_address(raw: &str) -> Result<Address, ApiResponse> {
    raw.parse()
        .map_err(|_| ApiResponse::bad_request("invalid address"))
}

fn parse_addresses(raw: Vec<String>, max_batch: usize) -> Result<Vec<Address>, ApiResponse> {
    if raw.len() > max_batch {
        return Err(ApiResponse::bad_request("batch exceeds maximum size"));
    }
    raw.iter()
        .map(|s| s.parse())
        .collect::<Result<Vec<Address>, _>>()
        .map_err(|_| ApiResponse::bad_request("invalid address in batch"))
}

fn parse_json<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, ApiResponse> {
    serde_json::from_slice(body).map_err(|_| ApiResponse::bad_request("malformed JSON body"))
}

/// Dispatches one request by path segments and method. `body` is the
/// already-collected, size-capped request body (§4.5).
pub async fn route(
    server: &Server,
    method: &Method,
    path_segments: &[&str],
    body: &[u8],
    started_at: Instant,
) -> ApiResponse {
    match (
        path_segments.first().copied(),
        path_segments.get(1).copied(),
        path_segments.get(2).copied(),
        method,
    ) {
        (Some("health"), None, None, &Method::GET) => health(server, started_at),

        (Some("api"), Some("public-keys"), None, &Method::POST) => {
            store_public_key(server, body)
        }
        (Some("api"), Some("public-keys"), Some("batch"), &Method::POST) => {
            batch_public_keys(server, body)
        }
        (Some("api"), Some("public-keys"), Some(address), &Method::GET) => {
            get_public_key(server, address)
        }
        (Some("api"), Some("public-keys"), Some(address), &Method::DELETE) => {
            delete_public_key(server, address)
        }

        (Some("api"), Some("messages"), Some("stats"), &Method::GET) => message_stats(server),
        (Some("api"), Some("messages"), Some(address), &Method::GET)
            if path_segments.get(3).is_none() =>
        {
            get_messages(server, address)
        }
        (Some("api"), Some("messages"), Some(address), &Method::GET)
            if path_segments.get(3) == Some(&"queue-size") =>
        {
            queue_size(server, address)
        }
        (Some("api"), Some("messages"), Some(address), &Method::DELETE) => {
            clear_messages(server, address)
        }

        (Some("api"), Some("status"), Some("batch"), &Method::POST) => {
            batch_status(server, body)
        }
        (Some("api"), Some("status"), Some("online"), &Method::GET)
            if path_segments.get(3) == Some(&"all") =>
        {
            online_addresses(server)
        }
        (Some("api"), Some("status"), Some(address), &Method::GET) => status(server, address),

        _ => ApiResponse::not_found(),
    }
}

fn health(server: &Server, started_at: Instant) -> ApiResponse {
    ApiResponse::ok(json!({
        "status": "ok",
        "timestamp": utils::time::now_ms(),
        "uptime": started_at.elapsed().as_secs(),
        "connections": server.registry.count(),
        "queuedMessages": server.queue.total_queued(),
    }))
}

fn store_public_key(server: &Server, body: &[u8]) -> ApiResponse {
    let req: StoreKeyBody = match parse_json(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let address = match parse_address(&req.address) {
        Ok(address) => address,
        Err(resp) => return resp,
    };
    match server.directory.store(address, req.public_key) {
        Ok(record) => ApiResponse::ok(serde_json::to_value(KeyRecordView::from(record)).unwrap()),
        Err(err) => ApiResponse::bad_request(err.client_message()),
    }
}

fn get_public_key(server: &Server, address: &str) -> ApiResponse {
    let address = match parse_address(address) {
        Ok(address) => address,
        Err(resp) => return resp,
    };
    match server.directory.get(&address) {
        Some(record) => ApiResponse::ok(serde_json::to_value(KeyRecordView::from(record)).unwrap()),
        None => ApiResponse::not_found(),
    }
}

fn batch_public_keys(server: &Server, body: &[u8]) -> ApiResponse {
    let req: BatchAddressesBody = match parse_json(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let addresses = match parse_addresses(req.addresses, server.config.max_batch) {
        Ok(addresses) => addresses,
        Err(resp) => return resp,
    };
    match server.directory.get_batch(&addresses, server.config.max_batch) {
        Ok(records) => {
            let keys: serde_json::Map<String, JsonBody> = records
                .into_iter()
                .map(|record| {
                    (
                        record.address.to_string(),
                        serde_json::to_value(KeyRecordView::from(record)).unwrap(),
                    )
                })
                .collect();
            ApiResponse::ok(json!({ "keys": keys }))
        }
        Err(err) => ApiResponse::bad_request(err.client_message()),
    }
}

fn delete_public_key(server: &Server, address: &str) -> ApiResponse {
    let address = match parse_address(address) {
        Ok(address) => address,
        Err(resp) => return resp,
    };
    server.directory.delete(&address);
    ApiResponse::no_content()
}

fn get_messages(server: &Server, address: &str) -> ApiResponse {
    let address = match parse_address(address) {
        Ok(address) => address,
        Err(resp) => return resp,
    };
    let messages: Vec<EnvelopeView> = server
        .queue
        .peek(&address)
        .into_iter()
        .map(EnvelopeView::from)
        .collect();
    ApiResponse::ok(json!({ "messages": messages }))
}

fn queue_size(server: &Server, address: &str) -> ApiResponse {
    let address = match parse_address(address) {
        Ok(address) => address,
        Err(resp) => return resp,
    };
    ApiResponse::ok(json!({ "queueSize": server.queue.size(&address) }))
}

fn clear_messages(server: &Server, address: &str) -> ApiResponse {
    let address = match parse_address(address) {
        Ok(address) => address,
        Err(resp) => return resp,
    };
    server.queue.clear(&address);
    ApiResponse::no_content()
}

fn message_stats(server: &Server) -> ApiResponse {
    let stats = server.queue.stats();
    ApiResponse::ok(json!({
        "totalQueued": stats.total_queued,
        "addressesWithMessages": stats.addresses_with_messages,
    }))
}

fn status(server: &Server, address: &str) -> ApiResponse {
    let address = match parse_address(address) {
        Ok(address) => address,
        Err(resp) => return resp,
    };
    ApiResponse::ok(json!({
        "address": address,
        "online": server.registry.is_online(&address),
        "timestamp": utils::time::now_ms(),
    }))
}

fn batch_status(server: &Server, body: &[u8]) -> ApiResponse {
    let req: BatchAddressesBody = match parse_json(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let addresses = match parse_addresses(req.addresses, server.config.max_batch) {
        Ok(addresses) => addresses,
        Err(resp) => return resp,
    };
    let statuses: serde_json::Map<String, JsonBody> = addresses
        .into_iter()
        .map(|address| {
            let online = server.registry.is_online(&address);
            (address.to_string(), JsonBody::Bool(online))
        })
        .collect();
    ApiResponse::ok(json!({ "statuses": statuses }))
}

fn online_addresses(server: &Server) -> ApiResponse {
    let addresses: Vec<Address> = server.registry.online_addresses();
    ApiResponse::ok(json!({ "addresses": addresses }))
}
