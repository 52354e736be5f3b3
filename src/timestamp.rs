//! Unix timestamp utilities for payment authorization windows.
//!
//! ERC-3009 `transferWithAuthorization` messages carry a validity window as a
//! pair of timestamps (`validAfter`, `validBefore`). This module provides the
//! [`UnixTimestamp`] type used for both bounds throughout the wire protocol.

use alloy::primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::{SystemTime, SystemTimeError};

/// Seconds since the Unix epoch (1970-01-01T00:00:00Z).
///
/// # Serialization
///
/// Serialized as a stringified integer to avoid precision loss in JSON, since
/// JavaScript's `Number` cannot safely represent all 64-bit integers:
///
/// ```json
/// "1699999999"
/// ```
///
/// # Example
///
/// ```
/// use x402_arena::timestamp::UnixTimestamp;
///
/// let ts = UnixTimestamp::from_secs(1699999999);
/// let expires = ts + 3600;
/// assert_eq!(expires.as_secs(), 1700003599);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq)]
pub struct UnixTimestamp(u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(UnixTimestamp(ts))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0.saturating_add(rhs))
    }
}

impl From<UnixTimestamp> for U256 {
    fn from(value: UnixTimestamp) -> Self {
        U256::from(value.0)
    }
}

impl UnixTimestamp {
    /// Creates a [`UnixTimestamp`] from a raw seconds value.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns the current system time.
    ///
    /// # Errors
    ///
    /// Returns [`SystemTimeError`] if the system clock reads before the Unix
    /// epoch. Verification treats this as an infrastructure failure rather
    /// than a payment rejection.
    pub fn try_now() -> Result<Self, SystemTimeError> {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_secs();
        Ok(Self(now))
    }

    /// Returns the timestamp as raw seconds since the Unix epoch.
    pub fn as_secs(&self) -> u64 {
        self.0
    }
}
