//! Where each hierarchy attribute comes from, and how raw values are coerced.
//!
//! Each attribute has an ordered chain of [`Source`]s. The first source that
//! yields a value surviving coercion wins; a chain that runs dry yields
//! `None`. Nothing here fails: bad input degrades to a missing value.

use chrono::NaiveDate;
use strata_core::hierarchy::Gender;

use crate::{
  layout::{Layout, Segment},
  metadata::{FieldValue, MetadataAccessor},
  options::IngestOptions,
};

// ─── Sources ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  /// A header field, by keyword.
  Header(&'static str),
  /// A positional path segment.
  Path(Segment),
}

use Source::{Header, Path};

pub const PATIENT_ID: &[Source] = &[Header("PatientID")];
pub const PATIENT_SEX: &[Source] = &[Header("PatientSex")];
pub const PATIENT_BIRTH_DATE: &[Source] = &[Header("PatientBirthDate")];
pub const PATIENT_AGE: &[Source] = &[Header("PatientAge")];
pub const STUDY_ID: &[Source] = &[Header("StudyID")];
pub const VISIT_FROM_PATH: &[Source] = &[Path(Segment::DicomVisit)];
pub const VISIT_DATE: &[Source] = &[Header("AcquisitionDate"), Header("SeriesDate")];
pub const SESSION_NAME: &[Source] = &[Header("StudyID")];
pub const SEQUENCE_NAME: &[Source] =
  &[Header("SeriesDescription"), Header("ProtocolName")];
pub const REPETITION_NAME: &[Source] = &[Header("SeriesNumber")];
pub const REPETITION_FROM_PATH: &[Source] = &[Path(Segment::DicomRepetition)];
pub const REPETITION_DATE: &[Source] = &[Header("SeriesDate")];

pub const NIFTI_PARTICIPANT: &[Source] = &[Path(Segment::Participant)];
pub const NIFTI_SESSION: &[Source] = &[Path(Segment::Session)];
pub const NIFTI_SEQUENCE: &[Source] = &[Path(Segment::Sequence)];
pub const NIFTI_REPETITION: &[Source] = &[Path(Segment::Repetition)];

// ─── Lookup ──────────────────────────────────────────────────────────────────

/// Everything a chain can draw from for one file.
pub struct Lookup<'a> {
  pub header: Option<&'a dyn MetadataAccessor>,
  pub path:   &'a str,
  pub layout: &'a Layout,
}

impl Lookup<'_> {
  pub fn fetch(&self, source: Source) -> Option<FieldValue> {
    match source {
      Header(field) => self.header?.get(field).cloned(),
      Path(segment) => self.layout.capture(segment, self.path).map(FieldValue::Text),
    }
  }

  /// First value in `chain` accepted by `coerce`.
  pub fn first<T>(
    &self,
    chain: &[Source],
    coerce: impl Fn(&FieldValue) -> Option<T>,
  ) -> Option<T> {
    chain
      .iter()
      .find_map(|&source| self.fetch(source).as_ref().and_then(&coerce))
  }

  pub fn text(&self, chain: &[Source]) -> Option<String> {
    self.first(chain, FieldValue::as_text)
  }

  pub fn date(&self, chain: &[Source]) -> Option<NaiveDate> {
    self.first(chain, |v| {
      let raw = v.as_text()?;
      let date = parse_compact_date(&raw);
      if date.is_none() {
        tracing::warn!(path = self.path, value = %raw, "unparseable date");
      }
      date
    })
  }

  pub fn age(&self, chain: &[Source]) -> Option<f64> {
    self.first(chain, |v| {
      let raw = v.as_text()?;
      let age = parse_age(&raw);
      if age.is_none() {
        tracing::warn!(path = self.path, value = %raw, "unparseable age");
      }
      age
    })
  }

  pub fn float(&self, field: &'static str) -> Option<f64> {
    self.first(&[Header(field)], FieldValue::as_f64)
  }

  pub fn int(&self, field: &'static str) -> Option<i64> {
    self.first(&[Header(field)], FieldValue::as_i64)
  }

  /// Element `index` of a multi-valued header field, as a float.
  pub fn float_item(&self, field: &'static str, index: usize) -> Option<f64> {
    self.first(&[Header(field)], |v| v.item(index)?.as_f64())
  }
}

// ─── Coercions ───────────────────────────────────────────────────────────────

/// Converts a compact age string `NNNU` to fractional years.
///
/// The unit `U` is one of `Y`, `M`, `W`, `D`.
pub fn parse_age(raw: &str) -> Option<f64> {
  let raw = raw.trim();
  if raw.len() != 4 || !raw.is_ascii() {
    return None;
  }
  let (digits, unit) = raw.split_at(3);
  if !digits.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  let value: u32 = digits.parse().ok()?;
  let value = f64::from(value);
  match unit {
    "Y" => Some(value),
    "M" => Some(value / 12.0),
    "W" => Some(value / 52.1429),
    "D" => Some(value / 365.0),
    _ => None,
  }
}

/// Parses `YYYYMMDD`, or `YYYY-MM-DD`.
pub fn parse_compact_date(raw: &str) -> Option<NaiveDate> {
  let raw = raw.trim();
  NaiveDate::parse_from_str(raw, "%Y%m%d")
    .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
    .ok()
}

pub fn parse_gender(raw: &str) -> Gender {
  match raw.trim() {
    "M" => Gender::Male,
    "F" => Gender::Female,
    "O" => Gender::Other,
    _ => Gender::Unknown,
  }
}

/// Splits a combined `"{visit}_{participant}"` identifier. Anything other
/// than exactly two parts is not a combined identifier.
pub fn split_combined_id(raw: &str) -> Option<(&str, &str)> {
  let mut parts = raw.split('_');
  match (parts.next(), parts.next(), parts.next()) {
    (Some(visit), Some(participant), None) => Some((visit, participant)),
    _ => None,
  }
}

// ─── Naming rules ────────────────────────────────────────────────────────────

/// The participant's natural name, given the raw patient identifier.
pub fn participant_name(patient_id: Option<&str>, options: &IngestOptions) -> Option<String> {
  let raw = patient_id?;
  if options.participant_id_in_visit_id {
    if let Some((_, participant)) = split_combined_id(raw) {
      return Some(participant.to_owned());
    }
  }
  Some(raw.to_owned())
}

/// The visit's natural name.
///
/// With a combined patient identifier the visit part is used; otherwise (or
/// when there is none) the study identifier, optionally qualified by the
/// patient identifier.
pub fn visit_name(
  patient_id: Option<&str>,
  study: Option<String>,
  options: &IngestOptions,
) -> Option<String> {
  if options.participant_id_in_visit_id {
    if let Some((visit, _)) = patient_id.and_then(split_combined_id) {
      if !visit.is_empty() {
        return Some(visit.to_owned());
      }
    }
  }
  match (options.session_id_by_participant, patient_id, study) {
    (true, Some(patient), Some(study)) => Some(format!("{patient}_{study}")),
    (_, _, study) => study,
  }
}
