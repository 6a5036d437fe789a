// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Arena capacity configuration and parsing.
//!
//! A [`Capacity`] is the amount of virtual memory an arena reserves up
//! front. It supports human-readable string parsing for configuration
//! ergonomics.

use crate::config::ARENA_DEFAULT_CAPACITY_MIB;
use std::fmt;

/// Error returned by [`Capacity::parse`].
#[derive(Debug, thiserror::Error)]
#[error("invalid capacity '{input}': expected a nonzero number with an optional K/M/G suffix")]
pub struct ParseCapacityError {
    input: String,
}

/// The up-front virtual-memory reservation of an arena.
///
/// # Parsing
/// Supports human-readable strings with binary-unit suffixes:
/// - `"4M"` or `"4MB"` → 4 × 1024² bytes
/// - `"1G"` or `"1GB"` → 1 × 1024³ bytes
/// - `"2048K"` or `"2048KB"` → 2048 × 1024 bytes
/// - `"4194304"` → raw byte count
///
/// # Examples
/// ```
/// use memory_resources::Capacity;
///
/// let c = Capacity::from_mib(4);
/// assert_eq!(c.as_mib(), 4);
///
/// let c = Capacity::parse("1G").unwrap();
/// assert_eq!(c.as_mib(), 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Capacity {
    /// Capacity in bytes.
    bytes: usize,
}

impl Capacity {
    /// Creates a capacity from a byte count.
    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    /// Creates a capacity from mebibytes.
    pub fn from_mib(mib: usize) -> Self {
        Self {
            bytes: mib * 1024 * 1024,
        }
    }

    /// Creates a capacity from gibibytes.
    pub fn from_gib(gib: usize) -> Self {
        Self {
            bytes: gib * 1024 * 1024 * 1024,
        }
    }

    /// Returns the capacity in bytes.
    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Returns the capacity in mebibytes (truncated).
    pub fn as_mib(&self) -> usize {
        self.bytes / (1024 * 1024)
    }

    /// Parses a human-readable capacity string.
    ///
    /// Accepted formats: `"4M"`, `"4MB"`, `"1G"`, `"1GB"`, `"2048K"`,
    /// `"2048KB"`, or a plain byte count like `"4194304"`.
    /// Case-insensitive. Zero is rejected.
    pub fn parse(s: &str) -> Result<Self, ParseCapacityError> {
        let error = || ParseCapacityError {
            input: s.to_string(),
        };

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(error());
        }

        let upper = trimmed.to_uppercase();
        let (num_str, multiplier) = if upper.ends_with("GB") {
            (&trimmed[..trimmed.len() - 2], 1024 * 1024 * 1024)
        } else if upper.ends_with('G') {
            (&trimmed[..trimmed.len() - 1], 1024 * 1024 * 1024)
        } else if upper.ends_with("MB") {
            (&trimmed[..trimmed.len() - 2], 1024 * 1024)
        } else if upper.ends_with('M') {
            (&trimmed[..trimmed.len() - 1], 1024 * 1024)
        } else if upper.ends_with("KB") {
            (&trimmed[..trimmed.len() - 2], 1024)
        } else if upper.ends_with('K') {
            (&trimmed[..trimmed.len() - 1], 1024)
        } else if upper.ends_with('B') {
            (&trimmed[..trimmed.len() - 1], 1)
        } else {
            // Plain number — treat as bytes.
            (trimmed, 1)
        };

        let value: usize = num_str.trim().parse().map_err(|_| error())?;
        let bytes = value.checked_mul(multiplier).ok_or_else(error)?;
        if bytes == 0 {
            return Err(error());
        }

        Ok(Self { bytes })
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Self::from_mib(ARENA_DEFAULT_CAPACITY_MIB)
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bytes >= 1024 * 1024 * 1024 && self.bytes % (1024 * 1024 * 1024) == 0 {
            write!(f, "{} GiB", self.bytes / (1024 * 1024 * 1024))
        } else if self.bytes >= 1024 * 1024 && self.bytes % (1024 * 1024) == 0 {
            write!(f, "{} MiB", self.bytes / (1024 * 1024))
        } else if self.bytes >= 1024 && self.bytes % 1024 == 0 {
            write!(f, "{} KiB", self.bytes / 1024)
        } else {
            write!(f, "{} B", self.bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_mib() {
        let c = Capacity::from_mib(4);
        assert_eq!(c.as_bytes(), 4 * 1024 * 1024);
        assert_eq!(c.as_mib(), 4);
    }

    #[test]
    fn test_from_gib() {
        let c = Capacity::from_gib(2);
        assert_eq!(c.as_mib(), 2048);
    }

    #[test]
    fn test_default_matches_configured_capacity() {
        assert_eq!(Capacity::default().as_mib(), ARENA_DEFAULT_CAPACITY_MIB);
    }

    #[test]
    fn test_parse_mebibytes() {
        assert_eq!(Capacity::parse("4M").unwrap().as_mib(), 4);
        assert_eq!(Capacity::parse("4MB").unwrap().as_mib(), 4);
        assert_eq!(Capacity::parse("4m").unwrap().as_mib(), 4);
        assert_eq!(Capacity::parse("4mb").unwrap().as_mib(), 4);
    }

    #[test]
    fn test_parse_gibibytes() {
        assert_eq!(Capacity::parse("1G").unwrap().as_mib(), 1024);
        assert_eq!(Capacity::parse("1GB").unwrap().as_mib(), 1024);
        assert_eq!(Capacity::parse("2g").unwrap().as_mib(), 2048);
    }

    #[test]
    fn test_parse_kibibytes() {
        assert_eq!(Capacity::parse("1024K").unwrap().as_bytes(), 1024 * 1024);
        assert_eq!(Capacity::parse("1024KB").unwrap().as_bytes(), 1024 * 1024);
    }

    #[test]
    fn test_parse_raw_bytes() {
        let c = Capacity::parse("4194304").unwrap();
        assert_eq!(c.as_mib(), 4);
    }

    #[test]
    fn test_parse_with_whitespace() {
        assert_eq!(Capacity::parse("  4M  ").unwrap().as_mib(), 4);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Capacity::parse("").is_err());
        assert!(Capacity::parse("abc").is_err());
        assert!(Capacity::parse("0M").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Capacity::from_gib(1)), "1 GiB");
        assert_eq!(format!("{}", Capacity::from_mib(4)), "4 MiB");
        assert_eq!(format!("{}", Capacity::from_bytes(2048)), "2 KiB");
        assert_eq!(format!("{}", Capacity::from_bytes(100)), "100 B");
    }

    #[test]
    fn test_serde_roundtrip() {
        let c = Capacity::from_mib(8);
        let json = serde_json::to_string(&c).unwrap();
        let back: Capacity = serde_json::from_str(&json).unwrap();
        assert_eq!(c, back);
    }
}
