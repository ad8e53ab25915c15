/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod address;
pub mod config;
pub mod limits;
pub mod time;

pub use address::Address;
pub use config::Config;
