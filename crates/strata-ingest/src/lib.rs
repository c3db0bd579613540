//! Folder ingestion for the Strata catalog.
//!
//! An [`Ingestor`] walks a folder, classifies each file, derives the natural
//! keys of every hierarchy level (from header metadata for DICOM files, from
//! the folder layout for NIfTI files), resolves them through a
//! [`strata_core::store::CatalogStore`], and records the file under a
//! processing step together with its content digest and copy flag.

pub mod classify;
pub mod error;
pub mod extract;
pub mod hash;
pub mod ingest;
pub mod layout;
pub mod metadata;
pub mod options;
pub mod policy;
pub mod resolve;

pub use error::{Error, Result};
pub use ingest::{IngestReport, Ingestor};
pub use layout::{Layout, PathLayout};
pub use options::IngestOptions;
