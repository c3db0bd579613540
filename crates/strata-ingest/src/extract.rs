//! Natural keys and attributes of one file, before any store access.

use chrono::NaiveDate;
use strata_core::hierarchy::{Gender, SequenceTypeFields};

use crate::{
  options::IngestOptions,
  policy::{self, Lookup},
};

/// Everything a header-based resolution writes, per level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderRecord {
  pub participant_name: Option<String>,
  pub gender:           Option<Gender>,
  pub birth_date:       Option<NaiveDate>,
  pub visit_name:       Option<String>,
  pub visit_date:       Option<NaiveDate>,
  pub age:              Option<f64>,
  pub session_name:     Option<String>,
  pub sequence_type:    SequenceTypeFields,
  pub repetition_name:  Option<String>,
  pub repetition_date:  Option<NaiveDate>,
}

/// Names of every level of a file resolved from its path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathRecord {
  pub participant_name: Option<String>,
  pub visit_name:       Option<String>,
  pub session_name:     Option<String>,
  pub sequence_name:    Option<String>,
  pub repetition_name:  Option<String>,
}

pub fn header_record(lookup: &Lookup<'_>, options: &IngestOptions) -> HeaderRecord {
  let patient_id = lookup.text(policy::PATIENT_ID);
  if patient_id.is_none() {
    tracing::warn!(path = lookup.path, "no patient id; using the anonymous participant");
  }

  let study = if options.visit_from_path {
    lookup.text(policy::VISIT_FROM_PATH)
  } else {
    lookup.text(policy::STUDY_ID)
  };

  let repetition_name = if options.repetition_from_path {
    lookup.text(policy::REPETITION_FROM_PATH)
  } else {
    lookup.text(policy::REPETITION_NAME)
  };

  HeaderRecord {
    participant_name: policy::participant_name(patient_id.as_deref(), options),
    gender: lookup.text(policy::PATIENT_SEX).map(|s| policy::parse_gender(&s)),
    birth_date: lookup.date(policy::PATIENT_BIRTH_DATE),
    visit_name: policy::visit_name(patient_id.as_deref(), study, options),
    visit_date: lookup.date(policy::VISIT_DATE),
    age: lookup.age(policy::PATIENT_AGE),
    session_name: lookup.text(policy::SESSION_NAME),
    sequence_type: sequence_type_fields(lookup),
    repetition_name,
    repetition_date: lookup.date(policy::REPETITION_DATE),
  }
}

/// The acquisition-protocol tuple. Each field is coerced on its own; a value
/// that does not coerce is left unset.
pub fn sequence_type_fields(lookup: &Lookup<'_>) -> SequenceTypeFields {
  SequenceTypeFields {
    name:                           lookup.text(policy::SEQUENCE_NAME),
    manufacturer:                   lookup.text(&[policy::Source::Header("Manufacturer")]),
    manufacturer_model_name:        lookup
      .text(&[policy::Source::Header("ManufacturerModelName")]),
    institution_name:               lookup.text(&[policy::Source::Header("InstitutionName")]),
    slice_thickness:                lookup.float("SliceThickness"),
    repetition_time:                lookup.float("RepetitionTime"),
    echo_time:                      lookup.float("EchoTime"),
    echo_number:                    lookup.int("EchoNumbers"),
    number_of_phase_encoding_steps: lookup.int("NumberOfPhaseEncodingSteps"),
    percent_phase_field_of_view:    lookup.float("PercentPhaseFieldOfView"),
    pixel_bandwidth:                lookup.int("PixelBandwidth"),
    flip_angle:                     lookup.float("FlipAngle"),
    rows:                           lookup.int("Rows"),
    columns:                        lookup.int("Columns"),
    magnetic_field_strength:        lookup.float("MagneticFieldStrength"),
    space_between_slices:           lookup.float("SpacingBetweenSlices"),
    echo_train_length:              lookup.int("EchoTrainLength"),
    percent_sampling:               lookup.float("PercentSampling"),
    pixel_spacing_0:                lookup.float_item("PixelSpacing", 0),
    pixel_spacing_1:                lookup.float_item("PixelSpacing", 1),
  }
}

pub fn path_record(lookup: &Lookup<'_>, options: &IngestOptions) -> PathRecord {
  let raw_participant = lookup.text(policy::NIFTI_PARTICIPANT);
  let session = lookup.text(policy::NIFTI_SESSION);

  PathRecord {
    participant_name: policy::participant_name(raw_participant.as_deref(), options),
    visit_name:       policy::visit_name(raw_participant.as_deref(), session.clone(), options),
    session_name:     session,
    sequence_name:    lookup.text(policy::NIFTI_SEQUENCE),
    repetition_name:  lookup.text(policy::NIFTI_REPETITION),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    layout::PathLayout,
    metadata::{FieldValue, MapMetadata},
  };

  fn text(s: &str) -> FieldValue { FieldValue::Text(s.into()) }

  fn header() -> MapMetadata {
    MapMetadata::new()
      .with("PatientID", text("V2_PR00042"))
      .with("PatientSex", text("F"))
      .with("PatientBirthDate", text("19451231"))
      .with("PatientAge", text("070Y"))
      .with("StudyID", text("7"))
      .with("AcquisitionDate", text("20160309"))
      .with("SeriesDate", text("20160310"))
      .with("SeriesNumber", FieldValue::Int(4))
      .with("SeriesDescription", text("t1_mprage"))
      .with("EchoTime", text("2.98"))
      .with("Rows", FieldValue::Int(256))
      .with("FlipAngle", text("not a number"))
      .with("PixelSpacing", text("0.9375\\0.8"))
  }

  #[test]
  fn header_record_follows_options() {
    let layout = PathLayout::default().compile().unwrap();
    let meta = header();
    let lookup = Lookup {
      header: Some(&meta),
      path:   "/data/ppmi/visit-a/study/series-9/IM0001",
      layout: &layout,
    };

    let plain = header_record(&lookup, &IngestOptions::default());
    assert_eq!(plain.participant_name.as_deref(), Some("V2_PR00042"));
    assert_eq!(plain.visit_name.as_deref(), Some("7"));
    assert_eq!(plain.session_name.as_deref(), Some("7"));
    assert_eq!(plain.gender, Some(Gender::Female));
    assert_eq!(plain.age, Some(70.0));
    assert_eq!(plain.visit_date, NaiveDate::from_ymd_opt(2016, 3, 9));
    assert_eq!(plain.repetition_name.as_deref(), Some("4"));
    assert_eq!(plain.repetition_date, NaiveDate::from_ymd_opt(2016, 3, 10));

    let fields = &plain.sequence_type;
    assert_eq!(fields.name.as_deref(), Some("t1_mprage"));
    assert_eq!(fields.echo_time, Some(2.98));
    assert_eq!(fields.rows, Some(256));
    assert_eq!(fields.flip_angle, None);
    assert_eq!(fields.pixel_spacing_0, Some(0.9375));
    assert_eq!(fields.pixel_spacing_1, Some(0.8));

    let lren = header_record(&lookup, &IngestOptions {
      participant_id_in_visit_id: true,
      ..Default::default()
    });
    assert_eq!(lren.participant_name.as_deref(), Some("PR00042"));
    assert_eq!(lren.visit_name.as_deref(), Some("V2"));

    let from_path = header_record(&lookup, &IngestOptions {
      visit_from_path: true,
      repetition_from_path: true,
      ..Default::default()
    });
    assert_eq!(from_path.visit_name.as_deref(), Some("visit-a"));
    assert_eq!(from_path.repetition_name.as_deref(), Some("series-9"));
  }

  #[test]
  fn empty_header_degrades_to_nulls() {
    let layout = PathLayout::default().compile().unwrap();
    let meta = MapMetadata::new();
    let lookup = Lookup { header: Some(&meta), path: "/x/IM1", layout: &layout };

    let record = header_record(&lookup, &IngestOptions::default());
    assert_eq!(record, HeaderRecord::default());
  }

  #[test]
  fn path_record_uses_layout_segments() {
    let layout = PathLayout::default().compile().unwrap();
    let lookup = Lookup {
      header: None,
      path:   "/out/V1_PR00001/2/t1_mprage/01/s0001.nii",
      layout: &layout,
    };

    let plain = path_record(&lookup, &IngestOptions::default());
    assert_eq!(plain, PathRecord {
      participant_name: Some("V1_PR00001".into()),
      visit_name:       Some("2".into()),
      session_name:     Some("2".into()),
      sequence_name:    Some("t1_mprage".into()),
      repetition_name:  Some("01".into()),
    });

    let lren = path_record(&lookup, &IngestOptions {
      participant_id_in_visit_id: true,
      ..Default::default()
    });
    assert_eq!(lren.participant_name.as_deref(), Some("PR00001"));
    assert_eq!(lren.visit_name.as_deref(), Some("V1"));
  }
}
