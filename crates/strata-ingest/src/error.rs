//! Error types for `strata-ingest`.

use std::path::PathBuf;

use strata_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {source}")]
  Store {
    #[source]
    source:      Box<dyn std::error::Error + Send + Sync>,
    unavailable: bool,
  },

  #[error("provenance not found: {0}")]
  UnknownProvenance(i64),

  #[error("ingestion root is not a directory: {}", .0.display())]
  RootNotFound(PathBuf),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("unreadable metadata in {}: {reason}", .path.display())]
  Metadata { path: PathBuf, reason: String },

  #[error("invalid path layout pattern: {0}")]
  Layout(#[from] regex::Error),

  #[error("blocking task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl Error {
  /// Wrap a backend error, keeping its availability classification.
  pub fn store<E: StoreError>(e: E) -> Self {
    let unavailable = e.is_unavailable();
    Self::Store { source: Box::new(e), unavailable }
  }

  /// `true` when the error came from a backend that can no longer serve
  /// requests; such errors abort an ingestion run.
  pub fn is_unavailable(&self) -> bool {
    matches!(self, Self::Store { unavailable: true, .. })
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
