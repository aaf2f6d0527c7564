//! Chain partition key.
//!
//! [`ChainId`] is a newtype wrapper around the lowercase network name
//! (`"sepolia"`, `"base"`, ...). Every persisted entity is partitioned by
//! it, so two spellings of the same network must never produce two keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::IndexerError;

/// Lowercase identifier of one configured blockchain network.
///
/// Normalized on construction (trimmed, lowercased). Used as the partition
/// key of pools, stakes, events and the indexer cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    /// Creates a `ChainId` from any spelling of the network name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    /// Returns the normalized name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChainId {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self::new(s);
        if id.0.is_empty() {
            return Err(IndexerError::InvalidRequest(
                "chain must not be empty".to_string(),
            ));
        }
        Ok(id)
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
