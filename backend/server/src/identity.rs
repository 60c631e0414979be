//! # Pseudo-identities
//!
//! Visitors are never stored by address. Every record instead carries
//! `sha256(address, day, salt)`, which:
//!
//! - is stable for one address within one UTC calendar day, so same-day
//!   duplicates (second poll vote, fourth feedback) can be detected
//! - changes completely at UTC midnight, so nobody can follow a visitor
//!   across days
//! - cannot be brute forced back to an address without the salt, which only
//!   lives in process memory
//!
//! Rotating the salt changes every future identity but leaves stored ones
//! untouched.
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

const SEPARATOR: u8 = 0x1f;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Analytics salt must not be empty")]
pub struct EmptySalt;

#[derive(Clone)]
pub struct Salt(String);

impl Salt {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptySalt> {
        let value = value.into();

        if value.trim().is_empty() {
            return Err(EmptySalt);
        }

        Ok(Self(value))
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Salt(<redacted>)")
    }
}

/// 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PseudoIdentity(String);

impl PseudoIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PseudoIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn derive(address: &str, day: NaiveDate, salt: &Salt) -> PseudoIdentity {
    let mut hasher = Sha256::new();

    hasher.update(address.as_bytes());
    hasher.update([SEPARATOR]);
    hasher.update(day.format("%Y-%m-%d").to_string().as_bytes());
    hasher.update([SEPARATOR]);
    hasher.update(salt.0.as_bytes());

    PseudoIdentity(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone)]
pub struct IdentityHasher {
    salt: Salt,
}

impl IdentityHasher {
    pub fn new(salt: Salt) -> Self {
        Self { salt }
    }

    pub fn derive(&self, address: &str, day: NaiveDate) -> PseudoIdentity {
        derive(address, day, &self.salt)
    }
}
