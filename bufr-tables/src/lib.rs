//! Descriptor metadata tables for BUFR messages.
//!
//! Loads element (Table B), sequence (Table D) and code/flag (Table C/F)
//! metadata keyed by `(master_table, originating_centre, local_table,
//! master_version, local_version)`, and keeps it immutable and shareable
//! once loaded so a [`TableStore`] can be handed to many engine instances
//! decoding messages in parallel (see the crate's CONCURRENCY & RESOURCE
//! MODEL section).

#![forbid(unsafe_code)]

pub mod element;
pub mod ids;
pub mod standard;
pub mod store;
pub mod table_set;
pub mod version;

pub use element::{ElementEntry, ElementKind, ElementUnit};
pub use ids::{DescriptorClass, DescriptorId};
pub use store::TableStore;
pub use table_set::{TableSet, TableSetBuilder};
pub use version::TableVersionKey;
