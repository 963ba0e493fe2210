//! Warehouse access for the feedback analyzer.
//!
//! Three pieces, leaves first:
//!
//! - [`session`]: a lazily created, process-shared session speaking the
//!   warehouse's SQL-over-HTTP statements API.
//! - [`references`]: resolution of a symbolic reference name into the set
//!   of externally granted table identifiers, optionally with owning
//!   database/schema/table metadata.
//! - [`probe`]: count/sample/describe probing of one granted table at a
//!   time, with per-table failures captured as data instead of aborting
//!   the batch.

pub mod config;
pub mod errors;
pub mod probe;
pub mod references;
pub mod session;
#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

pub use config::WarehouseConfig;
pub use errors::{Result, WarehouseError};
pub use probe::{BatchProbe, TableProbeResult, TableProber};
pub use references::{Cardinality, ReferenceDescriptor, ReferenceResolver, ReferenceSet};
pub use session::{ColumnInfo, Session, SessionProvider, StatementResult};
