//! Error type for `strata-store-sqlite`.

use strata_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] strata_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("provenance not found: {0}")]
  ProvenanceNotFound(i64),

  #[error("processing step not found: {0}")]
  StepNotFound(i64),
}

impl StoreError for Error {
  fn is_unavailable(&self) -> bool {
    matches!(self, Error::Database(tokio_rusqlite::Error::ConnectionClosed))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
