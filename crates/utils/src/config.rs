/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::{str::FromStr, time::Duration};

use trc::Level;

/// CORS origin policy for the HTTP surface and the WebSocket upgrade,
/// parsed from `ALLOWED_ORIGINS`.
#[derive(Debug, Clone)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            AllowedOrigins::Any => true,
            AllowedOrigins::List(list) => list.iter().any(|o| o == origin),
        }
    }
}

/// Everything read from the environment at startup (§6.4). Read once;
/// never re-read or persisted.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub allowed_origins: AllowedOrigins,
    pub max_offline_messages: usize,
    pub message_retention: Duration,
    pub purge_interval: Duration,
    pub auth_timeout: Duration,
    pub idle_timeout: Duration,
    pub mailbox_capacity: usize,
    pub mailbox_send_timeout: Duration,
    pub drain_deadline: Duration,
    pub max_batch: usize,
    pub log_level: Level,
    pub http_request_timeout: Duration,
    pub max_body_bytes: usize,
    pub ws_path: String,
    pub max_connections: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_address: "0.0.0.0".into(),
            port: 3002,
            allowed_origins: AllowedOrigins::Any,
            max_offline_messages: 1000,
            message_retention: Duration::from_secs(168 * 3600),
            purge_interval: Duration::from_secs(3600),
            auth_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            mailbox_capacity: 256,
            mailbox_send_timeout: Duration::from_millis(100),
            drain_deadline: Duration::from_secs(1),
            max_batch: 100,
            log_level: Level::Info,
            http_request_timeout: Duration::from_secs(30),
            max_body_bytes: 1024 * 1024,
            ws_path: "/".into(),
            max_connections: 10_000,
        }
    }
}

fn env_var<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Parses every recognized key from the process environment, falling
    /// back to the defaults in §4.2/§4.4/§6.4 for anything unset or
    /// unparseable.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let allowed_origins = match std::env::var("ALLOWED_ORIGINS") {
            Ok(v) if v.trim() == "*" => AllowedOrigins::Any,
            Ok(v) => AllowedOrigins::List(
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            Err(_) => defaults.allowed_origins,
        };

        let log_level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.log_level);

        Config {
            bind_address: std::env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            port: env_var("PORT", defaults.port),
            allowed_origins,
            max_offline_messages: env_var("MAX_OFFLINE_MESSAGES", defaults.max_offline_messages),
            message_retention: Duration::from_secs(
                env_var::<u64>("MESSAGE_RETENTION_HOURS", 168) * 3600,
            ),
            purge_interval: Duration::from_secs(env_var(
                "PURGE_INTERVAL_SECONDS",
                defaults.purge_interval.as_secs(),
            )),
            auth_timeout: Duration::from_secs(env_var(
                "AUTH_TIMEOUT_SECONDS",
                defaults.auth_timeout.as_secs(),
            )),
            idle_timeout: Duration::from_secs(env_var(
                "IDLE_TIMEOUT_SECONDS",
                defaults.idle_timeout.as_secs(),
            )),
            mailbox_capacity: env_var("MAILBOX_CAPACITY", defaults.mailbox_capacity),
            mailbox_send_timeout: Duration::from_millis(env_var(
                "MAILBOX_SEND_TIMEOUT_MILLIS",
                defaults.mailbox_send_timeout.as_millis() as u64,
            )),
            drain_deadline: Duration::from_millis(env_var(
                "DRAIN_DEADLINE_MILLIS",
                defaults.drain_deadline.as_millis() as u64,
            )),
            max_batch: env_var("MAX_BATCH", defaults.max_batch),
            log_level,
            http_request_timeout: Duration::from_secs(env_var(
                "HTTP_REQUEST_TIMEOUT_SECONDS",
                defaults.http_request_timeout.as_secs(),
            )),
            max_body_bytes: env_var("MAX_BODY_BYTES", defaults.max_body_bytes),
            ws_path: std::env::var("WS_PATH").unwrap_or(defaults.ws_path),
            max_connections: env_var("MAX_CONNECTIONS", defaults.max_connections),
        }
    }
}
