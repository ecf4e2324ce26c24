//! TabletIO WAL - Write-ahead-log edit model
//!
//! This crate defines the in-memory representation of log edits as they
//! travel from the primary's append path to downstream consumers: keys,
//! cells, edits, and the flush-lifecycle markers that ride the log as
//! meta edits.

pub mod edit;
pub mod flush;

pub use edit::{Cell, CellType, WalEdit, WalKey, META_FAMILY};
pub use flush::{FlushAction, FlushDescriptor, StoreFlush};
