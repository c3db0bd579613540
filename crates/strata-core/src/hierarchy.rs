//! The entity hierarchy: participant → visit → session → sequence →
//! repetition.
//!
//! Participants and visits are keyed by a surrogate minted per dataset by the
//! identity mapping service; the remaining levels are keyed by a store-assigned
//! row id and located through their natural key.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Identity mapping ────────────────────────────────────────────────────────

/// Which identity mapping table a natural name is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingKind {
  Participant,
  Visit,
}

// ─── Demographics ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
  Male,
  Female,
  Other,
  Unknown,
}

impl Gender {
  /// The discriminant string stored in the `gender` column.
  pub fn discriminant(self) -> &'static str {
    match self {
      Self::Male => "male",
      Self::Female => "female",
      Self::Other => "other",
      Self::Unknown => "unknown",
    }
  }

  pub fn from_discriminant(s: &str) -> Result<Self> {
    match s {
      "male" => Ok(Self::Male),
      "female" => Ok(Self::Female),
      "other" => Ok(Self::Other),
      "unknown" => Ok(Self::Unknown),
      other => Err(Error::UnknownGender(other.to_owned())),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
  Left,
  Right,
  Ambidexter,
  Unknown,
}

impl Handedness {
  pub fn discriminant(self) -> &'static str {
    match self {
      Self::Left => "left",
      Self::Right => "right",
      Self::Ambidexter => "ambidexter",
      Self::Unknown => "unknown",
    }
  }

  pub fn from_discriminant(s: &str) -> Result<Self> {
    match s {
      "left" => Ok(Self::Left),
      "right" => Ok(Self::Right),
      "ambidexter" => Ok(Self::Ambidexter),
      "unknown" => Ok(Self::Unknown),
      other => Err(Error::UnknownHandedness(other.to_owned())),
    }
  }
}

// ─── Participant & visit ─────────────────────────────────────────────────────

/// A study participant. `participant_id` is the surrogate from the
/// participant mapping of `dataset`.
///
/// Demographic fields are overwritten, not merged, on every header-based
/// sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
  pub dataset:        String,
  pub participant_id: i64,
  pub gender:         Option<Gender>,
  pub birth_date:     Option<NaiveDate>,
  /// Age in fractional years at the most recent sighting.
  pub age:            Option<f64>,
  pub handedness:     Option<Handedness>,
}

impl Participant {
  /// A participant with no demographic information.
  pub fn bare(dataset: impl Into<String>, participant_id: i64) -> Self {
    Self {
      dataset: dataset.into(),
      participant_id,
      gender: None,
      birth_date: None,
      age: None,
      handedness: None,
    }
  }
}

/// One visit of a participant. `visit_id` is the surrogate from the visit
/// mapping of `dataset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
  pub dataset:        String,
  pub visit_id:       i64,
  pub participant_id: i64,
  pub date:           Option<NaiveDate>,
  /// Participant age in fractional years at the time of the visit.
  pub age:            Option<f64>,
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// A scanning session within a visit. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub session_id: i64,
  pub dataset:    String,
  pub visit_id:   i64,
  pub name:       Option<String>,
}

/// Natural key of a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
  pub dataset:  String,
  pub visit_id: i64,
  pub name:     Option<String>,
}

// ─── Sequence type ───────────────────────────────────────────────────────────

/// The full acquisition-protocol tuple.
///
/// A protocol is only "the same" if every recorded parameter matches. Matching
/// goes through [`SequenceTypeFields::natural_key`], a canonical string form in
/// which `None` is distinct from every value and equal only to `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceTypeFields {
  pub name:                           Option<String>,
  pub manufacturer:                   Option<String>,
  pub manufacturer_model_name:        Option<String>,
  pub institution_name:               Option<String>,
  pub slice_thickness:                Option<f64>,
  pub repetition_time:                Option<f64>,
  pub echo_time:                      Option<f64>,
  pub echo_number:                    Option<i64>,
  pub number_of_phase_encoding_steps: Option<i64>,
  pub percent_phase_field_of_view:    Option<f64>,
  pub pixel_bandwidth:                Option<i64>,
  pub flip_angle:                     Option<f64>,
  pub rows:                           Option<i64>,
  pub columns:                        Option<i64>,
  pub magnetic_field_strength:        Option<f64>,
  pub space_between_slices:           Option<f64>,
  pub echo_train_length:              Option<i64>,
  pub percent_sampling:               Option<f64>,
  pub pixel_spacing_0:                Option<f64>,
  pub pixel_spacing_1:                Option<f64>,
}

impl SequenceTypeFields {
  /// Canonical, order-stable string form of the whole tuple.
  ///
  /// Field order follows the struct declaration, so two tuples produce the
  /// same key exactly when every field is equal.
  pub fn natural_key(&self) -> Result<String> {
    Ok(serde_json::to_string(self)?)
  }
}

/// A persisted acquisition protocol. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceType {
  pub sequence_type_id: i64,
  pub fields:           SequenceTypeFields,
}

// ─── Sequence & repetition ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
  pub sequence_id:      i64,
  pub session_id:       i64,
  pub name:             Option<String>,
  pub sequence_type_id: Option<i64>,
}

/// Input to [`crate::store::CatalogStore::upsert_sequence`].
///
/// The natural key is `(session_id, name)`. When `sequence_type_id` is `Some`
/// it replaces the stored type; `None` leaves the stored type untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSequence {
  pub session_id:       i64,
  pub name:             Option<String>,
  pub sequence_type_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repetition {
  pub repetition_id: i64,
  pub sequence_id:   i64,
  pub name:          Option<String>,
  pub date:          Option<NaiveDate>,
}

/// Input to [`crate::store::CatalogStore::upsert_repetition`]. The natural
/// key is `(sequence_id, name)`; `date` is overwritten on revisit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepetition {
  pub sequence_id: i64,
  pub name:        Option<String>,
  pub date:        Option<NaiveDate>,
}
