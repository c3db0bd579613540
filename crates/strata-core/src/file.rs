//! Data files: the leaves of the hierarchy.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The content class assigned to a file by a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
  /// Structured-header image file; resolved from its header fields.
  Dicom,
  /// Derived image without rich headers; resolved from its path.
  Nifti,
  /// Any other regular file.
  Other,
}

impl FileType {
  /// The discriminant string stored in the `file_type` column.
  pub fn discriminant(self) -> &'static str {
    match self {
      Self::Dicom => "DICOM",
      Self::Nifti => "NIFTI",
      Self::Other => "other",
    }
  }

  pub fn from_discriminant(s: &str) -> Result<Self> {
    match s {
      "DICOM" => Ok(Self::Dicom),
      "NIFTI" => Ok(Self::Nifti),
      "other" => Ok(Self::Other),
      other => Err(Error::UnknownFileType(other.to_owned())),
    }
  }
}

impl std::fmt::Display for FileType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.discriminant())
  }
}

/// A recorded file. `path` is globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
  pub file_id:            i64,
  pub path:               String,
  pub file_type:          FileType,
  /// Byte-identical to a file recorded by the previous processing step.
  pub is_copy:            bool,
  /// Hex SHA-256 of the content; `None` if the file could not be read.
  pub content_hash:       Option<String>,
  /// `None` for files recorded without hierarchy resolution.
  pub repetition_id:      Option<i64>,
  pub processing_step_id: i64,
}

/// Input to [`crate::store::CatalogStore::upsert_file`].
///
/// Keyed by `path`. On revisit every field is overwritten, except that a
/// `None` repetition keeps whatever repetition the path already has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDataFile {
  pub path:               String,
  pub file_type:          FileType,
  pub is_copy:            bool,
  pub content_hash:       Option<String>,
  pub repetition_id:      Option<i64>,
  pub processing_step_id: i64,
}
