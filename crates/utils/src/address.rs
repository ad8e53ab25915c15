/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

pub const ADDRESS_LEN: usize = 42;
pub const ADDRESS_HEX_LEN: usize = 40;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("address does not match the canonical 0x-prefixed 40 hex digit pattern")]
pub struct AddressError;

/// A canonical `0x`-prefixed, 40 lowercase hex digit client identity.
///
/// Comparisons are case-insensitive on parse; once constructed the value is
/// always stored lowercase, so any two `Address`es that compare equal are
/// also byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<String, AddressError> {
        if s.len() != ADDRESS_LEN || !s.starts_with("0x") {
            return Err(AddressError);
        }
        let hex = &s[2..];
        if hex.len() != ADDRESS_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError);
        }
        Ok(format!("0x{}", hex.to_ascii_lowercase()))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::validate(s).map(Address)
    }
}

impl TryFrom<&str> for Address {
    type Error = AddressError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
