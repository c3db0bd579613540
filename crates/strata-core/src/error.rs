//! Error types for `strata-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown file type discriminant: {0:?}")]
  UnknownFileType(String),

  #[error("unknown gender discriminant: {0:?}")]
  UnknownGender(String),

  #[error("unknown handedness discriminant: {0:?}")]
  UnknownHandedness(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
