//! Number160: a 160-bit SHA-1 digest used as a DHT routing key.
//!
//! Location, content and domain strings are hashed into fixed-width keys
//! before they reach the network. SHA-1 is plenty for routing; it is not
//! the security boundary (domain ownership is, see [`crate::dht`]).
//!
//! Content checksums use MD5 so that digests match the ones recorded by
//! existing clients.

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;
use thiserror::Error;

/// Width of a [`Number160`] in bytes.
pub const KEY_LEN: usize = 20;

/// A 160-bit key in the DHT key space.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Number160([u8; KEY_LEN]);

/// Errors that can occur when parsing keys.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("invalid key length: expected 40 hex chars, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex character in key")]
    InvalidHex,
}

impl Number160 {
    /// The all-zero key; the default domain for unprotected values.
    pub const ZERO: Number160 = Number160([0; KEY_LEN]);

    /// Hash raw bytes into a key.
    pub fn from_data(data: &[u8]) -> Self {
        let digest = Sha1::digest(data);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Hash a raw key string (location, content or domain).
    pub fn hash_str(raw: &str) -> Self {
        Self::from_data(raw.as_bytes())
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; KEY_LEN]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Number160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Number160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Number160({})", self.to_hex())
    }
}

impl FromStr for Number160 {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != KEY_LEN * 2 {
            return Err(HashError::InvalidLength(s.len()));
        }
        let decoded = hex::decode(s).map_err(|_| HashError::InvalidHex)?;
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }
}

/// MD5 digest of `data` as 32 lowercase hex chars.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// MD5 of everything `reader` yields, without buffering it whole.
pub fn md5_hex_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Md5::new();
    io::copy(reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
