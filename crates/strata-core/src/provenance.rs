//! Provenance fingerprints and the processing-step lineage.
//!
//! A provenance records *what produced* a batch of files (dataset name plus a
//! software fingerprint). A processing step records *which stage* of the
//! pipeline produced them; steps form a singly linked chain through
//! `previous_step_id`, and that chain scopes copy detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Provenance ──────────────────────────────────────────────────────────────

/// Free-form description of the software that produced a dataset.
///
/// Every field is optional. Two fingerprints are the same only if every field
/// matches, with `None` matching `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareVersions {
  pub matlab_version: Option<String>,
  pub spm_version:    Option<String>,
  pub spm_revision:   Option<String>,
  /// Name of the pipeline function that was called.
  pub fn_called:      Option<String>,
  pub fn_version:     Option<String>,
  /// Anything that does not fit the fields above.
  pub others:         Option<String>,
}

/// A persisted provenance fingerprint. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
  pub provenance_id: i64,
  pub dataset:       String,
  pub software:      SoftwareVersions,
}

/// Input to [`crate::store::CatalogStore::get_or_create_provenance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProvenance {
  pub dataset:  String,
  pub software: SoftwareVersions,
}

impl NewProvenance {
  /// A provenance with an empty software fingerprint.
  pub fn new(dataset: impl Into<String>) -> Self {
    Self { dataset: dataset.into(), software: SoftwareVersions::default() }
  }
}

// ─── Processing steps ────────────────────────────────────────────────────────

/// One stage of the processing pipeline.
///
/// `execution_date` is an audit field: it is refreshed every time the step is
/// resolved, so it records the *last* run rather than the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStep {
  pub step_id:          i64,
  pub name:             String,
  pub provenance_id:    i64,
  /// `None` for a pipeline root.
  pub previous_step_id: Option<i64>,
  pub execution_date:   DateTime<Utc>,
}

impl ProcessingStep {
  pub fn is_root(&self) -> bool { self.previous_step_id.is_none() }
}

/// Input to [`crate::store::CatalogStore::get_or_create_step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStep {
  pub name:             String,
  pub provenance_id:    i64,
  pub previous_step_id: Option<i64>,
}
