//! # plfread-core
//!
//! A library for reading TIA Portal project containers (`PEData.plf`) and
//! reconstructing a structured project model without TIA Portal installed.
//!
//! This crate provides the core functionality for:
//! - Parsing and validating the container preamble (header, key material)
//! - Framing the append-only block log, including session markers
//! - Verifying block signatures and inflating compressed payloads
//! - Interpreting the embedded XML schemas that describe the binary pages
//! - Reconciling append-log sessions into final-state entities
//! - Assembling stations, devices, and block catalogs into a [`ProjectModel`]
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`container`]: Preamble parsing, block framing, verification, inflation
//! - [`schema`]: Embedded-schema interpretation and record decoding
//! - [`reconcile`]: Append-log session reconciliation
//! - [`model`]: The reconstructed project model and summary rendering
//! - [`reader`]: The facade tying the pipeline together
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use plfread_core::Reader;
//!
//! // Open a project directory (or its .apNN wrapper, or the .plf itself)
//! let reader = Reader::open("./Press_Line")?;
//! let model = reader.read()?;
//! print!("{}", model.summary());
//! # Ok::<(), plfread_core::Error>(())
//! ```
//!
//! The reader never writes to the container; concurrent reads of the same
//! project from independent readers are safe.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod container;
pub mod cursor;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod reader;
pub mod schema;

// Re-export primary types for convenience
pub use container::{
    BlockFramer, BlockKind, BlockRecord, FormatVersion, Frame, Header, LogMarker, Preamble,
    TrustLevel,
};
pub use cursor::ByteCursor;
pub use error::{Error, Result};
pub use model::{Device, DeviceSubtype, LibraryRef, ProjectModel, Station};
pub use reader::{read_project, Reader, ReaderOptions};
pub use reconcile::IncompleteSession;
pub use schema::{Schema, SchemaSet};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Size of one raw data page inside a container
pub const PAGE_SIZE: usize = 4096;
