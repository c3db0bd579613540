//! Persists an extracted record level by level, top-down.
//!
//! Each level is looked up by its natural key and created if absent, so a
//! repeated resolution of the same file converges on the same rows. The store
//! is passed in explicitly.

use strata_core::{
  hierarchy::{
    MappingKind, NewRepetition, NewSequence, NewSession, Participant, Repetition,
    Visit,
  },
  store::CatalogStore,
};

use crate::{
  extract::{HeaderRecord, PathRecord},
  Error, Result,
};

/// Header-based resolution. Participant, visit, sequence type and repetition
/// attributes are overwritten with the latest sighting.
pub async fn resolve_header<S: CatalogStore>(
  store:   &S,
  dataset: &str,
  record:  &HeaderRecord,
) -> Result<Repetition> {
  let participant_id = store
    .surrogate_for(MappingKind::Participant, dataset.to_owned(), record.participant_name.clone())
    .await
    .map_err(Error::store)?;
  store
    .upsert_participant(Participant {
      dataset:        dataset.to_owned(),
      participant_id,
      gender:         record.gender,
      birth_date:     record.birth_date,
      age:            record.age,
      handedness:     None,
    })
    .await
    .map_err(Error::store)?;

  let visit_id = store
    .surrogate_for(MappingKind::Visit, dataset.to_owned(), record.visit_name.clone())
    .await
    .map_err(Error::store)?;
  store
    .upsert_visit(Visit {
      dataset: dataset.to_owned(),
      visit_id,
      participant_id,
      date: record.visit_date,
      age: record.age,
    })
    .await
    .map_err(Error::store)?;

  let session = store
    .get_or_create_session(NewSession {
      dataset:  dataset.to_owned(),
      visit_id,
      name:     record.session_name.clone(),
    })
    .await
    .map_err(Error::store)?;

  let sequence_type = store
    .get_or_create_sequence_type(record.sequence_type.clone())
    .await
    .map_err(Error::store)?;

  let sequence = store
    .upsert_sequence(NewSequence {
      session_id:       session.session_id,
      name:             record.sequence_type.name.clone(),
      sequence_type_id: Some(sequence_type.sequence_type_id),
    })
    .await
    .map_err(Error::store)?;

  store
    .upsert_repetition(NewRepetition {
      sequence_id: sequence.sequence_id,
      name:        record.repetition_name.clone(),
      date:        record.repetition_date,
    })
    .await
    .map_err(Error::store)
}

/// Path-based resolution. Participants and visits are only created, never
/// modified, and the sequence keeps whatever type it already has.
pub async fn resolve_path<S: CatalogStore>(
  store:   &S,
  dataset: &str,
  record:  &PathRecord,
) -> Result<Repetition> {
  let participant_id = store
    .surrogate_for(MappingKind::Participant, dataset.to_owned(), record.participant_name.clone())
    .await
    .map_err(Error::store)?;
  store
    .ensure_participant(dataset.to_owned(), participant_id)
    .await
    .map_err(Error::store)?;

  let visit_id = store
    .surrogate_for(MappingKind::Visit, dataset.to_owned(), record.visit_name.clone())
    .await
    .map_err(Error::store)?;
  store
    .ensure_visit(dataset.to_owned(), visit_id, participant_id)
    .await
    .map_err(Error::store)?;

  let session = store
    .get_or_create_session(NewSession {
      dataset:  dataset.to_owned(),
      visit_id,
      name:     record.session_name.clone(),
    })
    .await
    .map_err(Error::store)?;

  let sequence = store
    .upsert_sequence(NewSequence {
      session_id:       session.session_id,
      name:             record.sequence_name.clone(),
      sequence_type_id: None,
    })
    .await
    .map_err(Error::store)?;

  store
    .upsert_repetition(NewRepetition {
      sequence_id: sequence.sequence_id,
      name:        record.repetition_name.clone(),
      date:        None,
    })
    .await
    .map_err(Error::store)
}
