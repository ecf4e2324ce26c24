//! Core type definitions for TabletIO
//!
//! This module defines the fundamental identifiers and descriptors used
//! throughout the system: table names, region identities, and table schemas.

use bytes::Bytes;
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Replica ordinal of the primary copy of a region
pub const PRIMARY_REPLICA_ID: u32 = 0;

/// Unique identifier for a region
///
/// All replicas of the same region share one `RegionId`; they differ only
/// in their replica ordinal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct RegionId(Uuid);

impl RegionId {
    /// Generate a new random region ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RegionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegionId({})", self.0)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Name of a table
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct TableName(String);

impl TableName {
    /// Create a new table name (validates naming rules)
    pub fn new(name: impl Into<String>) -> Result<Self, TableNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the table name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate table name
    fn validate(name: &str) -> Result<(), TableNameError> {
        if name.is_empty() {
            return Err(TableNameError::Empty);
        }
        if name.len() > 255 {
            return Err(TableNameError::TooLong);
        }

        // Must start with a letter or number
        let first = name.chars().next().unwrap();
        if !first.is_ascii_alphanumeric() {
            return Err(TableNameError::InvalidStartChar);
        }

        // Only letters, numbers, underscores, hyphens, and periods allowed
        for c in name.chars() {
            if !c.is_ascii_alphanumeric() && c != '_' && c != '-' && c != '.' {
                return Err(TableNameError::InvalidChar(c));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableName({:?})", self.0)
    }
}

/// Errors that can occur when creating a table name
#[derive(Debug, Clone, thiserror::Error)]
pub enum TableNameError {
    #[error("table name cannot be empty")]
    Empty,
    #[error("table name must be at most 255 characters")]
    TooLong,
    #[error("table name must start with a letter or number")]
    InvalidStartChar,
    #[error("table name contains invalid character: {0}")]
    InvalidChar(char),
}

/// Identity of one replica of a region
///
/// A region is a contiguous key range `[start_key, end_key)` of a table.
/// Replica 0 is the primary; ordinals 1 and up are read-only secondaries
/// that receive the primary's write stream asynchronously.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDescriptor {
    table: TableName,
    region_id: RegionId,
    start_key: Bytes,
    end_key: Bytes,
    replica_id: u32,
}

impl RegionDescriptor {
    /// Create a descriptor for the primary replica of a new region
    #[must_use]
    pub fn new(table: TableName, start_key: Bytes, end_key: Bytes) -> Self {
        Self {
            table,
            region_id: RegionId::new(),
            start_key,
            end_key,
            replica_id: PRIMARY_REPLICA_ID,
        }
    }

    /// Descriptor for another replica of the same region
    ///
    /// Shares the region identity and key range; only the ordinal differs.
    #[must_use]
    pub fn as_replica(&self, replica_id: u32) -> Self {
        Self {
            table: self.table.clone(),
            region_id: self.region_id,
            start_key: self.start_key.clone(),
            end_key: self.end_key.clone(),
            replica_id,
        }
    }

    /// Table this region belongs to
    #[must_use]
    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Region identity, shared by all replicas
    #[must_use]
    pub fn region_id(&self) -> RegionId {
        self.region_id
    }

    /// Inclusive start of the key range
    #[must_use]
    pub fn start_key(&self) -> &Bytes {
        &self.start_key
    }

    /// Exclusive end of the key range
    #[must_use]
    pub fn end_key(&self) -> &Bytes {
        &self.end_key
    }

    /// Replica ordinal (0 = primary)
    #[must_use]
    pub fn replica_id(&self) -> u32 {
        self.replica_id
    }

    /// Whether this descriptor names the primary replica
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.replica_id == PRIMARY_REPLICA_ID
    }

    /// Stable name used in logs and RPC routing
    #[must_use]
    pub fn encoded_name(&self) -> String {
        format!("{}.{}.{}", self.table, self.region_id, self.replica_id)
    }
}

impl fmt::Debug for RegionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegionDescriptor({})", self.encoded_name())
    }
}

impl fmt::Display for RegionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encoded_name())
    }
}

/// Schema of a table, read-only for the replication path
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    table: TableName,
    replication_factor: u32,
    column_families: BTreeSet<String>,
    region_memstore_replication: bool,
}

impl TableSchema {
    /// Create a schema with the given replication factor and column families
    pub fn new<I, S>(table: TableName, replication_factor: u32, column_families: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table,
            replication_factor,
            column_families: column_families.into_iter().map(Into::into).collect(),
            region_memstore_replication: true,
        }
    }

    /// Disable in-memory write replication; only meta edits ride the sink
    #[must_use]
    pub fn without_memstore_replication(mut self) -> Self {
        self.region_memstore_replication = false;
        self
    }

    /// Table this schema describes
    #[must_use]
    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Total number of copies of each region, including the primary
    #[must_use]
    pub fn replication_factor(&self) -> u32 {
        self.replication_factor
    }

    /// Names of the table's column families
    #[must_use]
    pub fn column_families(&self) -> &BTreeSet<String> {
        &self.column_families
    }

    /// Number of column families
    #[must_use]
    pub fn column_family_count(&self) -> usize {
        self.column_families.len()
    }

    /// Whether in-memory writes are replicated to secondaries
    #[must_use]
    pub fn has_region_memstore_replication(&self) -> bool {
        self.region_memstore_replication
    }
}
