//! Arbor imports archival description records into a graph store.
//!
//! Records are XML files whose hierarchy is encoded in directory names: the
//! children of record `irn42.xml` live in `<data_dir>/42/`. One import is a
//! single transaction attributed to a repository and a user, checkpointed
//! periodically and rolled back as a whole on the first error.

#![warn(missing_docs)]

pub mod error;
pub mod fixtures;
pub mod importer;
pub mod parser;
pub mod records;
pub mod store;
pub mod types;

pub use error::{ImportError, Result};
pub use importer::{
    FlatImporter, HierarchicalImporter, ImportFormat, ImportLog, ImportOptions, ImportSession,
    ImportSummary, RecordImporter,
};
pub use parser::{MutationHandler, RecordParser};
pub use records::{PathResolver, RecordId, RecordNaming, RecordPath};
pub use store::{GraphStore, MemoryStore, SqliteStore, StoreError};
