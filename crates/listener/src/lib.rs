/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! HTTP surface (§4.5, §6.1, §6.3): binds one listening port that serves
//! both the WebSocket upgrade at the configured path and the REST key
//! directory / queue / presence endpoints, the way the teacher binds one
//! port per `ServerInstance` and dispatches by protocol.

pub mod http;
pub mod limiter;
pub mod server;
pub mod ws;

pub use server::{bind, serve};
