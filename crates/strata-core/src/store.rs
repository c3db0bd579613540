//! The `CatalogStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `strata-store-sqlite`).
//! The ingestion engine depends on this abstraction, not on any concrete
//! backend, and receives the store explicitly on every call.

use std::{collections::HashSet, future::Future};

use crate::{
  file::{DataFile, NewDataFile},
  hierarchy::{
    MappingKind, NewRepetition, NewSequence, NewSession, Participant, Repetition,
    Sequence, SequenceType, SequenceTypeFields, Session, Visit,
  },
  provenance::{NewProvenance, NewStep, ProcessingStep, Provenance},
};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Error contract for backends.
///
/// Constraint conflicts are resolved inside the backend; whatever reaches the
/// caller is either a per-operation failure or an unavailable backend.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// `true` when the backend can no longer serve any request (e.g. the
  /// connection is gone). Ingestion runs abort on such errors only.
  fn is_unavailable(&self) -> bool;
}

// ─── Counts ──────────────────────────────────────────────────────────────────

/// Row counts per entity level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounts {
  pub provenances:          u64,
  pub processing_steps:     u64,
  pub participant_mappings: u64,
  pub visit_mappings:       u64,
  pub participants:         u64,
  pub visits:               u64,
  pub sessions:             u64,
  pub sequence_types:       u64,
  pub sequences:            u64,
  pub repetitions:          u64,
  pub files:                u64,
  pub copies:               u64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a catalog backend.
///
/// Every `get_or_create_*` / `upsert_*` method is a true upsert on the
/// entity's natural key: calling it twice with the same key never creates a
/// second row. Each call commits on its own.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait CatalogStore: Send + Sync {
  type Error: StoreError;

  // ── Provenance & steps ────────────────────────────────────────────────

  /// Get or create the provenance matching every field of `input`
  /// (null-aware).
  fn get_or_create_provenance(
    &self,
    input: NewProvenance,
  ) -> impl Future<Output = Result<Provenance, Self::Error>> + Send + '_;

  fn get_provenance(
    &self,
    provenance_id: i64,
  ) -> impl Future<Output = Result<Option<Provenance>, Self::Error>> + Send + '_;

  /// Get or create the step keyed by `(name, provenance_id,
  /// previous_step_id)`. The step's `execution_date` is set to now on every
  /// call, including when it already existed.
  fn get_or_create_step(
    &self,
    input: NewStep,
  ) -> impl Future<Output = Result<ProcessingStep, Self::Error>> + Send + '_;

  fn get_step(
    &self,
    step_id: i64,
  ) -> impl Future<Output = Result<Option<ProcessingStep>, Self::Error>> + Send + '_;

  // ── Identity mapping ──────────────────────────────────────────────────

  /// Return the surrogate for `(dataset, name)`, minting
  /// `1 + max(existing surrogate in dataset)` (0 for the first) if none
  /// exists. This is the only operation that assigns participant and visit
  /// ids.
  fn surrogate_for(
    &self,
    kind: MappingKind,
    dataset: String,
    name: Option<String>,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  // ── Hierarchy ─────────────────────────────────────────────────────────

  /// Insert the participant, or overwrite every demographic field of the
  /// existing one.
  fn upsert_participant(
    &self,
    participant: Participant,
  ) -> impl Future<Output = Result<Participant, Self::Error>> + Send + '_;

  /// Create a bare participant if none exists; never modifies an existing
  /// one.
  fn ensure_participant(
    &self,
    dataset: String,
    participant_id: i64,
  ) -> impl Future<Output = Result<Participant, Self::Error>> + Send + '_;

  fn get_participant(
    &self,
    dataset: String,
    participant_id: i64,
  ) -> impl Future<Output = Result<Option<Participant>, Self::Error>> + Send + '_;

  /// Insert the visit, or overwrite `participant_id`, `date` and `age` of the
  /// existing one.
  fn upsert_visit(
    &self,
    visit: Visit,
  ) -> impl Future<Output = Result<Visit, Self::Error>> + Send + '_;

  /// Create a visit with no date or age if none exists; never modifies an
  /// existing one.
  fn ensure_visit(
    &self,
    dataset: String,
    visit_id: i64,
    participant_id: i64,
  ) -> impl Future<Output = Result<Visit, Self::Error>> + Send + '_;

  fn get_visit(
    &self,
    dataset: String,
    visit_id: i64,
  ) -> impl Future<Output = Result<Option<Visit>, Self::Error>> + Send + '_;

  fn get_or_create_session(
    &self,
    input: NewSession,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  fn get_or_create_sequence_type(
    &self,
    fields: SequenceTypeFields,
  ) -> impl Future<Output = Result<SequenceType, Self::Error>> + Send + '_;

  fn upsert_sequence(
    &self,
    input: NewSequence,
  ) -> impl Future<Output = Result<Sequence, Self::Error>> + Send + '_;

  fn upsert_repetition(
    &self,
    input: NewRepetition,
  ) -> impl Future<Output = Result<Repetition, Self::Error>> + Send + '_;

  // ── Files ─────────────────────────────────────────────────────────────

  fn upsert_file(
    &self,
    input: NewDataFile,
  ) -> impl Future<Output = Result<DataFile, Self::Error>> + Send + '_;

  fn get_file(
    &self,
    path: String,
  ) -> impl Future<Output = Result<Option<DataFile>, Self::Error>> + Send + '_;

  /// All files currently attributed to `step_id`.
  fn list_files(
    &self,
    step_id: i64,
  ) -> impl Future<Output = Result<Vec<DataFile>, Self::Error>> + Send + '_;

  /// Content digests recorded for the files of `step_id`; unreadable files
  /// (no digest) are left out.
  fn file_hashes_for_step(
    &self,
    step_id: i64,
  ) -> impl Future<Output = Result<HashSet<String>, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn counts(
    &self,
  ) -> impl Future<Output = Result<CatalogCounts, Self::Error>> + Send + '_;
}
