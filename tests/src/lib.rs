/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! End-to-end coverage for the relay (§8): every test here drives the real
//! `listener`/`common` stack over an actual TCP socket rather than calling
//! component APIs directly — that's what the per-crate `#[cfg(test)]`
//! modules already do. `support` spins up one relay instance per test on an
//! OS-assigned port and speaks its real wire protocols (WebSocket JSON
//! frames, raw HTTP/1.1) the way a client would.

pub mod support;

mod boundaries;
mod scenarios;
