//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, calendar dates as `YYYY-MM-DD`,
//! enums as their lowercase discriminants.

use chrono::{DateTime, NaiveDate, Utc};
use strata_core::{
  file::{DataFile, FileType},
  hierarchy::{Gender, Handedness, Participant, Repetition, Visit},
  provenance::{ProcessingStep, Provenance, SoftwareVersions},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn encode_date(d: NaiveDate) -> String { d.format(DATE_FORMAT).to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

fn decode_opt_date(s: Option<String>) -> Result<Option<NaiveDate>> {
  s.as_deref().map(decode_date).transpose()
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `provenances` row.
pub struct RawProvenance {
  pub provenance_id:  i64,
  pub dataset:        String,
  pub matlab_version: Option<String>,
  pub spm_version:    Option<String>,
  pub spm_revision:   Option<String>,
  pub fn_called:      Option<String>,
  pub fn_version:     Option<String>,
  pub others:         Option<String>,
}

impl RawProvenance {
  pub const COLUMNS: &'static str = "provenance_id, dataset, matlab_version, \
     spm_version, spm_revision, fn_called, fn_version, others";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      provenance_id:  row.get(0)?,
      dataset:        row.get(1)?,
      matlab_version: row.get(2)?,
      spm_version:    row.get(3)?,
      spm_revision:   row.get(4)?,
      fn_called:      row.get(5)?,
      fn_version:     row.get(6)?,
      others:         row.get(7)?,
    })
  }

  pub fn into_provenance(self) -> Provenance {
    Provenance {
      provenance_id: self.provenance_id,
      dataset:       self.dataset,
      software:      SoftwareVersions {
        matlab_version: self.matlab_version,
        spm_version:    self.spm_version,
        spm_revision:   self.spm_revision,
        fn_called:      self.fn_called,
        fn_version:     self.fn_version,
        others:         self.others,
      },
    }
  }
}

/// Raw values read directly from a `processing_steps` row.
pub struct RawStep {
  pub step_id:          i64,
  pub name:             String,
  pub provenance_id:    i64,
  pub previous_step_id: Option<i64>,
  pub execution_date:   String,
}

impl RawStep {
  pub const COLUMNS: &'static str =
    "step_id, name, provenance_id, previous_step_id, execution_date";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      step_id:          row.get(0)?,
      name:             row.get(1)?,
      provenance_id:    row.get(2)?,
      previous_step_id: row.get(3)?,
      execution_date:   row.get(4)?,
    })
  }

  pub fn into_step(self) -> Result<ProcessingStep> {
    Ok(ProcessingStep {
      step_id:          self.step_id,
      name:             self.name,
      provenance_id:    self.provenance_id,
      previous_step_id: self.previous_step_id,
      execution_date:   decode_dt(&self.execution_date)?,
    })
  }
}

/// Raw values read directly from a `participants` row.
pub struct RawParticipant {
  pub dataset:        String,
  pub participant_id: i64,
  pub gender:         Option<String>,
  pub birth_date:     Option<String>,
  pub age:            Option<f64>,
  pub handedness:     Option<String>,
}

impl RawParticipant {
  pub const COLUMNS: &'static str =
    "dataset, participant_id, gender, birth_date, age, handedness";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      dataset:        row.get(0)?,
      participant_id: row.get(1)?,
      gender:         row.get(2)?,
      birth_date:     row.get(3)?,
      age:            row.get(4)?,
      handedness:     row.get(5)?,
    })
  }

  pub fn into_participant(self) -> Result<Participant> {
    Ok(Participant {
      dataset:        self.dataset,
      participant_id: self.participant_id,
      gender:         self
        .gender
        .as_deref()
        .map(Gender::from_discriminant)
        .transpose()?,
      birth_date:     decode_opt_date(self.birth_date)?,
      age:            self.age,
      handedness:     self
        .handedness
        .as_deref()
        .map(Handedness::from_discriminant)
        .transpose()?,
    })
  }
}

/// Raw values read directly from a `visits` row.
pub struct RawVisit {
  pub dataset:        String,
  pub visit_id:       i64,
  pub participant_id: i64,
  pub date:           Option<String>,
  pub age:            Option<f64>,
}

impl RawVisit {
  pub const COLUMNS: &'static str = "dataset, visit_id, participant_id, date, age";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      dataset:        row.get(0)?,
      visit_id:       row.get(1)?,
      participant_id: row.get(2)?,
      date:           row.get(3)?,
      age:            row.get(4)?,
    })
  }

  pub fn into_visit(self) -> Result<Visit> {
    Ok(Visit {
      dataset:        self.dataset,
      visit_id:       self.visit_id,
      participant_id: self.participant_id,
      date:           decode_opt_date(self.date)?,
      age:            self.age,
    })
  }
}

/// Raw values read directly from a `repetitions` row.
pub struct RawRepetition {
  pub repetition_id: i64,
  pub sequence_id:   i64,
  pub name:          Option<String>,
  pub date:          Option<String>,
}

impl RawRepetition {
  pub const COLUMNS: &'static str = "repetition_id, sequence_id, name, date";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      repetition_id: row.get(0)?,
      sequence_id:   row.get(1)?,
      name:          row.get(2)?,
      date:          row.get(3)?,
    })
  }

  pub fn into_repetition(self) -> Result<Repetition> {
    Ok(Repetition {
      repetition_id: self.repetition_id,
      sequence_id:   self.sequence_id,
      name:          self.name,
      date:          decode_opt_date(self.date)?,
    })
  }
}

/// Raw values read directly from a `data_files` row.
pub struct RawFile {
  pub file_id:            i64,
  pub path:               String,
  pub file_type:          String,
  pub is_copy:            bool,
  pub content_hash:       Option<String>,
  pub repetition_id:      Option<i64>,
  pub processing_step_id: i64,
}

impl RawFile {
  pub const COLUMNS: &'static str = "file_id, path, file_type, is_copy, \
     content_hash, repetition_id, processing_step_id";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      file_id:            row.get(0)?,
      path:               row.get(1)?,
      file_type:          row.get(2)?,
      is_copy:            row.get(3)?,
      content_hash:       row.get(4)?,
      repetition_id:      row.get(5)?,
      processing_step_id: row.get(6)?,
    })
  }

  pub fn into_file(self) -> Result<DataFile> {
    Ok(DataFile {
      file_id:            self.file_id,
      path:               self.path,
      file_type:          FileType::from_discriminant(&self.file_type)?,
      is_copy:            self.is_copy,
      content_hash:       self.content_hash,
      repetition_id:      self.repetition_id,
      processing_step_id: self.processing_step_id,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn date_column_format() {
    let d = NaiveDate::from_ymd_opt(2016, 3, 9).unwrap();
    assert_eq!(encode_date(d), "2016-03-09");
    assert_eq!(decode_date("2016-03-09").unwrap(), d);
    assert!(matches!(decode_date("20160309"), Err(Error::DateParse(_))));
  }
}
