/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Field-size caps from §6.2 / §4.5 of the wire protocol. These are not
//! configurable: they bound a single frame or request field, not a
//! resource pool, so unlike `Config` they stay as constants.

pub const MAX_MESSAGE_ID_LEN: usize = 128;
pub const MAX_CONTENT_BYTES: usize = 64 * 1024;
pub const MAX_PUBLIC_KEY_BYTES: usize = 4 * 1024;
