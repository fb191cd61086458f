//! Signing algorithms and token lifetimes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// A supported signing algorithm.
///
/// `HS*` sign with a shared secret (HMAC); `RS*` sign with an RSA private
/// key and verify with the matching public key (PKCS#1 v1.5).
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Algorithm {
    HS256,
    HS384,
    HS512,
    RS256,
    RS384,
    RS512,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
        }
    }

    /// `true` for the shared-secret family.
    pub fn is_symmetric(self) -> bool {
        matches!(self, Self::HS256 | Self::HS384 | Self::HS512)
    }
}

impl FromStr for Algorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            other => Err(ConfigError::UnknownAlgorithm(other.to_owned())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long an issued token stays valid.
///
/// Written as an integer count with a unit suffix: `"45s"`, `"30m"`, `"1h"`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(try_from = "String")]
pub struct Lifetime(u64);

impl Lifetime {
    pub const fn seconds(n: u64) -> Self { Self(n) }
    pub const fn minutes(n: u64) -> Self { Self(n.saturating_mul(60)) }
    pub const fn hours(n: u64) -> Self { Self(n.saturating_mul(3600)) }

    pub fn as_secs(self) -> u64 { self.0 }
}

impl Default for Lifetime {
    fn default() -> Self { Self::hours(1) }
}

impl From<Duration> for Lifetime {
    fn from(d: Duration) -> Self { Self(d.as_secs()) }
}

impl FromStr for Lifetime {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::Lifetime(s.to_owned());
        let split = s.len().checked_sub(1).ok_or_else(invalid)?;
        if !s.is_char_boundary(split) {
            return Err(invalid());
        }
        let (count, unit) = s.split_at(split);
        if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let count: u64 = count.parse().map_err(|_| invalid())?;
        let secs = match unit {
            "s" => Some(count),
            "m" => count.checked_mul(60),
            "h" => count.checked_mul(3600),
            _ => None,
        };
        secs.map(Self).ok_or_else(invalid)
    }
}

impl TryFrom<String> for Lifetime {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
