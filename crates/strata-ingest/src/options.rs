use serde::{Deserialize, Serialize};

/// Per-run switches for dataset conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
  /// Files of one leaf directory share a repetition: only the first DICOM
  /// file of a directory is resolved from its header.
  pub boost:                      bool,
  /// Study ids are only unique per patient; visits are named
  /// `"{PatientID}_{StudyID}"`.
  pub session_id_by_participant:  bool,
  /// The patient id has the form `"{visit}_{participant}"`.
  pub participant_id_in_visit_id: bool,
  /// Take the DICOM visit name from the folder structure.
  pub visit_from_path:            bool,
  /// Take the DICOM repetition name from the parent folder.
  pub repetition_from_path:       bool,
  /// The folder is laid out in the expected hierarchy. When unset, NIfTI
  /// files are recorded without resolving their path.
  pub is_organised:               bool,
}

impl Default for IngestOptions {
  fn default() -> Self {
    Self {
      boost:                      false,
      session_id_by_participant:  false,
      participant_id_in_visit_id: false,
      visit_from_path:            false,
      repetition_from_path:       false,
      is_organised:               true,
    }
  }
}
