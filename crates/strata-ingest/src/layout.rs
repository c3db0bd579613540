//! Positional path patterns for files whose hierarchy lives in the folder
//! structure rather than in their headers.
//!
//! The default layout expects
//! `…/<participant>/<session>/<sequence>/<repetition>/<file>` for NIfTI
//! files, and `…/<visit>/<…>/<repetition>/<file>` for DICOM files when the
//! visit or repetition is taken from the path.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Regular expressions, one per hierarchy level. Each is matched against the
/// full `/`-separated path and the first capture group is the level's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathLayout {
  pub participant:      String,
  pub session:          String,
  pub sequence:         String,
  pub repetition:       String,
  pub dicom_visit:      String,
  pub dicom_repetition: String,
}

impl Default for PathLayout {
  fn default() -> Self {
    Self {
      participant:      r"/([^/]+)/[^/]+/[^/]+/[^/]+/[^/]+$".into(),
      session:          r"/([^/]+)/[^/]+/[^/]+/[^/]+$".into(),
      sequence:         r"/([^/]+)/[^/]+/[^/]+$".into(),
      repetition:       r"/([^/]+)/[^/]+$".into(),
      dicom_visit:      r"/([^/]+)/[^/]+/[^/]+/[^/]+$".into(),
      dicom_repetition: r"/([^/]+)/[^/]+$".into(),
    }
  }
}

impl PathLayout {
  pub fn compile(&self) -> Result<Layout> {
    Ok(Layout {
      participant:      Regex::new(&self.participant)?,
      session:          Regex::new(&self.session)?,
      sequence:         Regex::new(&self.sequence)?,
      repetition:       Regex::new(&self.repetition)?,
      dicom_visit:      Regex::new(&self.dicom_visit)?,
      dicom_repetition: Regex::new(&self.dicom_repetition)?,
    })
  }
}

/// A path position that names one hierarchy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
  Participant,
  Session,
  Sequence,
  Repetition,
  DicomVisit,
  DicomRepetition,
}

/// A compiled [`PathLayout`].
#[derive(Debug, Clone)]
pub struct Layout {
  participant:      Regex,
  session:          Regex,
  sequence:         Regex,
  repetition:       Regex,
  dicom_visit:      Regex,
  dicom_repetition: Regex,
}

impl Layout {
  fn pattern(&self, segment: Segment) -> &Regex {
    match segment {
      Segment::Participant => &self.participant,
      Segment::Session => &self.session,
      Segment::Sequence => &self.sequence,
      Segment::Repetition => &self.repetition,
      Segment::DicomVisit => &self.dicom_visit,
      Segment::DicomRepetition => &self.dicom_repetition,
    }
  }

  /// The name of `segment` within `path`, if the pattern matches.
  pub fn capture(&self, segment: Segment, path: &str) -> Option<String> {
    self
      .pattern(segment)
      .captures(path)
      .and_then(|c| c.get(1))
      .map(|m| m.as_str().to_owned())
  }
}
