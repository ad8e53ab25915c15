/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use chrono::Utc;

/// Milliseconds since the Unix epoch, the unit every timestamp in the wire
/// protocol and the key directory uses.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
