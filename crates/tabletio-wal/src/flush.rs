//! Flush-lifecycle markers
//!
//! When a region persists its in-memory stores to durable files, the flush
//! lifecycle is recorded in the WAL as meta edits so that downstream
//! consumers (most importantly the replication sink) can observe durability
//! checkpoints. The descriptor payload is bincode-encoded into a meta cell.

use crate::edit::{Cell, CellType, WalEdit, META_FAMILY};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tabletio_common::{Error, Result, TableSchema};
use tracing::warn;

/// Qualifier of meta cells carrying a flush descriptor
pub const FLUSH_QUALIFIER: &[u8] = b"FLUSH";

/// Stage of the flush lifecycle a descriptor records
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlushAction {
    /// Flush started; memstore contents are not yet durable
    Start,
    /// Flush committed; the covered stores are durable up to the flush sequence
    Commit,
    /// Flush abandoned before producing files
    Abort,
    /// Flush could not run (e.g. empty memstore under snapshot)
    CannotFlush,
}

/// Per-column-family outcome of a flush
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFlush {
    /// Column family that was flushed
    pub family: String,
    /// Store files the flush produced
    pub flush_output: Vec<String>,
}

/// Record of one flush lifecycle event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushDescriptor {
    /// Lifecycle stage
    pub action: FlushAction,
    /// Encoded name of the flushed region
    pub encoded_region_name: String,
    /// Highest sequence id made durable by this flush
    pub flush_sequence_number: u64,
    /// Per-family outcomes
    pub store_flushes: Vec<StoreFlush>,
}

impl FlushDescriptor {
    /// Whether this flush covered every column family of the table
    ///
    /// Only a full-coverage flush makes the WAL history before
    /// `flush_sequence_number` redundant for catch-up purposes.
    #[must_use]
    pub fn covers_all_families(&self, schema: &TableSchema) -> bool {
        let flushed: BTreeSet<&str> = self
            .store_flushes
            .iter()
            .map(|s| s.family.as_str())
            .collect();
        if flushed.len() != schema.column_family_count() {
            return false;
        }
        schema
            .column_families()
            .iter()
            .all(|family| flushed.contains(family.as_str()))
    }

    /// Encode the descriptor into a meta-cell payload
    pub fn to_bytes(&self) -> Result<Bytes> {
        let buf = bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    /// Decode a descriptor from a meta-cell payload
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

impl WalEdit {
    /// Build the meta edit that records a flush event in the log
    pub fn flush_marker(desc: &FlushDescriptor, timestamp_ms: u64) -> Result<Self> {
        let payload = desc.to_bytes()?;
        Ok(Self::new(vec![Cell {
            family: META_FAMILY.to_string(),
            qualifier: Bytes::from_static(FLUSH_QUALIFIER),
            timestamp_ms,
            cell_type: CellType::Put,
            value: payload,
        }]))
    }

    /// Flush descriptors carried by this edit's meta cells
    ///
    /// Cells with an unparseable payload are skipped: a malformed marker
    /// must never poison the consumer.
    #[must_use]
    pub fn flush_descriptors(&self) -> Vec<FlushDescriptor> {
        if !self.is_meta_edit() {
            return Vec::new();
        }
        self.cells()
            .iter()
            .filter(|cell| cell.qualifier.as_ref() == FLUSH_QUALIFIER)
            .filter_map(|cell| match FlushDescriptor::from_bytes(&cell.value) {
                Ok(desc) => Some(desc),
                Err(e) => {
                    warn!("Failed to parse flush descriptor from meta cell: {}", e);
                    None
                }
            })
            .collect()
    }
}
