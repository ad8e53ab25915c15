/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Key Directory (§4.1): one public key per address, answering single and
//! batch lookups. Readers never block writers on an unrelated key — the
//! backing table shards independently per key, the same reasoning
//! `common`'s own `DashMap`-backed caches use.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use trc::{DirectoryEvent, IntoErr};
use utils::{address::Address, limits::MAX_PUBLIC_KEY_BYTES};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    pub address: Address,
    pub public_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct KeyDirectory {
    records: Arc<DashMap<Address, KeyRecord>>,
}

impl KeyDirectory {
    pub fn new() -> Self {
        KeyDirectory::default()
    }

    /// Upserts a key. Overwrite preserves `created_at`; `updated_at`
    /// always advances.
    pub fn store(&self, address: Address, public_key: String) -> trc::Result<KeyRecord> {
        if public_key.len() > MAX_PUBLIC_KEY_BYTES {
            return Err(DirectoryEvent::PayloadTooLarge
                .into_err()
                .ctx("address", &address)
                .with_location(trc::location!()));
        }

        let now = Utc::now();
        let record = match self.records.entry(address.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.public_key = public_key;
                existing.updated_at = now;
                existing.clone()
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let record = KeyRecord {
                    address,
                    public_key,
                    created_at: now,
                    updated_at: now,
                };
                entry.insert(record.clone());
                record
            }
        };
        Ok(record)
    }

    pub fn get(&self, address: &Address) -> Option<KeyRecord> {
        self.records.get(address).map(|r| r.clone())
    }

    /// Returns only the addresses that exist; silently omits the rest.
    /// Fails with `InvalidRequest` if the batch exceeds `max_batch`.
    pub fn get_batch(&self, addresses: &[Address], max_batch: usize) -> trc::Result<Vec<KeyRecord>> {
        if addresses.len() > max_batch {
            return Err(DirectoryEvent::InvalidRequest
                .into_err()
                .ctx("batch_len", addresses.len())
                .with_location(trc::location!()));
        }
        Ok(addresses.iter().filter_map(|a| self.get(a)).collect())
    }

    /// Idempotent.
    pub fn delete(&self, address: &Address) {
        self.records.remove(address);
    }

    pub fn has(&self, address: &Address) -> bool {
        self.records.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
