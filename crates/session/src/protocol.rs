/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Wire protocol (§6.2): tagged JSON frames in both directions. Parsed
//! once into a sum type; unknown `type` discriminators are ignored rather
//! than rejected, per the dynamic-dispatch-to-tagged-variant redesign
//! note in §9.

use serde::{Deserialize, Serialize};
use utils::address::Address;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "auth")]
    Auth { address: Address },
    #[serde(rename = "message")]
    Message {
        to: Address,
        content: String,
        #[serde(rename = "messageId")]
        message_id: String,
        timestamp: u64,
    },
    #[serde(rename = "typing")]
    Typing {
        to: Address,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
    #[serde(rename = "read_receipt")]
    ReadReceipt {
        to: Address,
        #[serde(rename = "messageId")]
        message_id: String,
    },
    #[serde(rename = "ping")]
    Ping,
    /// Catches any `type` this relay doesn't recognize so the rest of the
    /// object can still be parsed and then silently dropped, instead of
    /// failing the whole frame.
    #[serde(other)]
    Unknown,
}

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "auth_success")]
    AuthSuccess { address: Address, timestamp: u64 },
    #[serde(rename = "message")]
    Message {
        from: Address,
        content: String,
        #[serde(rename = "messageId")]
        message_id: String,
        timestamp: u64,
        #[serde(default, skip_serializing_if = "is_false")]
        queued: bool,
    },
    #[serde(rename = "delivered")]
    Delivered {
        #[serde(rename = "messageId")]
        message_id: String,
        to: Address,
        timestamp: u64,
    },
    #[serde(rename = "queued")]
    Queued {
        #[serde(rename = "messageId")]
        message_id: String,
        to: Address,
        timestamp: u64,
    },
    #[serde(rename = "read")]
    Read {
        from: Address,
        #[serde(rename = "messageId")]
        message_id: String,
        timestamp: u64,
    },
    #[serde(rename = "typing")]
    Typing {
        from: Address,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
    #[serde(rename = "pong")]
    Pong { timestamp: u64 },
    #[serde(rename = "error")]
    Error { message: String },
}
