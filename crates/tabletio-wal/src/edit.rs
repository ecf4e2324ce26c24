//! WAL keys, cells and edits
//!
//! A `WalEdit` is the unit appended to the write-ahead log: an ordered run
//! of cells committed atomically under one `WalKey`. Edits whose cells all
//! live in the reserved [`META_FAMILY`] carry region lifecycle events
//! (flush markers) instead of user data.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tabletio_common::TableName;

/// Reserved column family for meta edits riding the log
pub const META_FAMILY: &str = "_meta_";

/// Key of one WAL edit
///
/// `sequence_id` is assigned by the append path and is strictly increasing
/// per region; downstream consumers rely on it for ordering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalKey {
    /// Encoded name of the region the edit belongs to
    pub encoded_region_name: String,
    /// Table the region belongs to
    pub table: TableName,
    /// Append sequence number, strictly increasing per region
    pub sequence_id: u64,
    /// Wall-clock write time in milliseconds since the epoch
    pub write_time_ms: u64,
}

impl WalKey {
    /// Create a new key
    #[must_use]
    pub fn new(
        encoded_region_name: impl Into<String>,
        table: TableName,
        sequence_id: u64,
        write_time_ms: u64,
    ) -> Self {
        Self {
            encoded_region_name: encoded_region_name.into(),
            table,
            sequence_id,
            write_time_ms,
        }
    }

    /// Approximate in-memory size in bytes
    #[must_use]
    pub fn estimated_size(&self) -> u64 {
        (self.encoded_region_name.len() + self.table.as_str().len() + 16) as u64
    }
}

/// Kind of mutation a cell represents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    /// Insert or overwrite a value
    Put,
    /// Delete a single version of a column
    Delete,
    /// Delete all versions of a column
    DeleteColumn,
    /// Delete an entire column family for the row
    DeleteFamily,
}

/// One column mutation within an edit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Column family name
    pub family: String,
    /// Column qualifier
    pub qualifier: Bytes,
    /// Mutation timestamp in milliseconds since the epoch
    pub timestamp_ms: u64,
    /// Mutation kind
    pub cell_type: CellType,
    /// Cell payload (empty for deletes)
    pub value: Bytes,
}

impl Cell {
    /// Create a put cell
    #[must_use]
    pub fn put(
        family: impl Into<String>,
        qualifier: impl Into<Bytes>,
        timestamp_ms: u64,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp_ms,
            cell_type: CellType::Put,
            value: value.into(),
        }
    }

    /// Create a delete cell
    #[must_use]
    pub fn delete(
        family: impl Into<String>,
        qualifier: impl Into<Bytes>,
        timestamp_ms: u64,
        cell_type: CellType,
    ) -> Self {
        Self {
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp_ms,
            cell_type,
            value: Bytes::new(),
        }
    }

    /// Whether this cell lives in the reserved meta family
    #[must_use]
    pub fn is_meta(&self) -> bool {
        self.family == META_FAMILY
    }

    /// Approximate in-memory size in bytes
    #[must_use]
    pub fn estimated_size(&self) -> u64 {
        (self.family.len() + self.qualifier.len() + self.value.len() + 16) as u64
    }
}

/// One write-ahead-log edit: an ordered run of cells committed atomically
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEdit {
    cells: Vec<Cell>,
}

impl WalEdit {
    /// Create an edit from cells, preserving their order
    #[must_use]
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// Append a cell to the edit
    pub fn add(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    /// Cells in append order
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Whether the edit carries no cells
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Whether this is a meta edit (every cell in the reserved meta family)
    #[must_use]
    pub fn is_meta_edit(&self) -> bool {
        !self.cells.is_empty() && self.cells.iter().all(Cell::is_meta)
    }

    /// Approximate in-memory size in bytes
    #[must_use]
    pub fn estimated_size(&self) -> u64 {
        self.cells.iter().map(Cell::estimated_size).sum()
    }
}
