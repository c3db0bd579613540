//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::NaiveDate;
use strata_core::{
  file::{FileType, NewDataFile},
  hierarchy::{
    Gender, Handedness, MappingKind, NewRepetition, NewSequence, NewSession,
    Participant, SequenceTypeFields, Visit,
  },
  provenance::{NewProvenance, NewStep, SoftwareVersions},
  store::{CatalogStore, StoreError as _},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// A store with one provenance and one root step; returns the step id.
async fn store_with_step() -> (SqliteStore, i64) {
  let s = store().await;
  let prov = s
    .get_or_create_provenance(NewProvenance::new("ds"))
    .await
    .unwrap();
  let step = s
    .get_or_create_step(NewStep {
      name:             "ingest".into(),
      provenance_id:    prov.provenance_id,
      previous_step_id: None,
    })
    .await
    .unwrap();
  (s, step.step_id)
}

/// Participant, visit, session and sequence rows to hang repetitions off.
async fn sequence_in(s: &SqliteStore) -> i64 {
  s.ensure_participant("ds".into(), 0).await.unwrap();
  s.ensure_visit("ds".into(), 0, 0).await.unwrap();
  let session = s
    .get_or_create_session(NewSession {
      dataset:  "ds".into(),
      visit_id: 0,
      name:     Some("1".into()),
    })
    .await
    .unwrap();
  s.upsert_sequence(NewSequence {
    session_id:       session.session_id,
    name:             Some("t1".into()),
    sequence_type_id: None,
  })
  .await
  .unwrap()
  .sequence_id
}

// ─── Provenance ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn provenance_matches_on_every_field() {
  let s = store().await;

  let a = s.get_or_create_provenance(NewProvenance::new("ds")).await.unwrap();
  let b = s.get_or_create_provenance(NewProvenance::new("ds")).await.unwrap();
  assert_eq!(a.provenance_id, b.provenance_id);

  let versioned = NewProvenance {
    dataset:  "ds".into(),
    software: SoftwareVersions {
      spm_version: Some("SPM12".into()),
      ..Default::default()
    },
  };
  let c = s.get_or_create_provenance(versioned.clone()).await.unwrap();
  assert_ne!(a.provenance_id, c.provenance_id);
  assert_eq!(c.software.spm_version.as_deref(), Some("SPM12"));

  let d = s.get_or_create_provenance(versioned).await.unwrap();
  assert_eq!(c.provenance_id, d.provenance_id);

  let e = s.get_or_create_provenance(NewProvenance::new("other")).await.unwrap();
  assert_ne!(a.provenance_id, e.provenance_id);

  assert_eq!(s.counts().await.unwrap().provenances, 3);
}

#[tokio::test]
async fn get_provenance_missing_returns_none() {
  let s = store().await;
  assert!(s.get_provenance(42).await.unwrap().is_none());
}

// ─── Processing steps ────────────────────────────────────────────────────────

#[tokio::test]
async fn step_is_reused_and_execution_date_refreshed() {
  let s = store().await;
  let prov = s.get_or_create_provenance(NewProvenance::new("ds")).await.unwrap();
  let input = NewStep {
    name:             "ingest".into(),
    provenance_id:    prov.provenance_id,
    previous_step_id: None,
  };

  let first = s.get_or_create_step(input.clone()).await.unwrap();
  assert!(first.is_root());
  tokio::time::sleep(std::time::Duration::from_millis(5)).await;
  let second = s.get_or_create_step(input).await.unwrap();

  assert_eq!(first.step_id, second.step_id);
  assert!(second.execution_date > first.execution_date);

  let stored = s.get_step(first.step_id).await.unwrap().unwrap();
  assert_eq!(stored.execution_date, second.execution_date);
  assert_eq!(s.counts().await.unwrap().processing_steps, 1);
}

#[tokio::test]
async fn step_chain_is_keyed_by_previous_step() {
  let s = store().await;
  let prov = s.get_or_create_provenance(NewProvenance::new("ds")).await.unwrap();
  let root = s
    .get_or_create_step(NewStep {
      name:             "ingest".into(),
      provenance_id:    prov.provenance_id,
      previous_step_id: None,
    })
    .await
    .unwrap();
  let chained = s
    .get_or_create_step(NewStep {
      name:             "ingest".into(),
      provenance_id:    prov.provenance_id,
      previous_step_id: Some(root.step_id),
    })
    .await
    .unwrap();

  assert_ne!(root.step_id, chained.step_id);
  assert_eq!(chained.previous_step_id, Some(root.step_id));
}

#[tokio::test]
async fn step_requires_known_provenance_and_previous_step() {
  let s = store().await;

  let err = s
    .get_or_create_step(NewStep {
      name:             "ingest".into(),
      provenance_id:    7,
      previous_step_id: None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ProvenanceNotFound(7)));
  assert!(!err.is_unavailable());

  let prov = s.get_or_create_provenance(NewProvenance::new("ds")).await.unwrap();
  let err = s
    .get_or_create_step(NewStep {
      name:             "ingest".into(),
      provenance_id:    prov.provenance_id,
      previous_step_id: Some(99),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::StepNotFound(99)));
}

// ─── Identity mapping ────────────────────────────────────────────────────────

#[tokio::test]
async fn surrogates_are_dense_per_dataset() {
  let s = store().await;
  let p = MappingKind::Participant;

  let a = s.surrogate_for(p, "ds".into(), Some("PR00001".into())).await.unwrap();
  let b = s.surrogate_for(p, "ds".into(), Some("PR00002".into())).await.unwrap();
  let c = s.surrogate_for(p, "ds".into(), Some("PR00003".into())).await.unwrap();
  assert_eq!((a, b, c), (0, 1, 2));

  let again = s.surrogate_for(p, "ds".into(), Some("PR00002".into())).await.unwrap();
  assert_eq!(again, 1);

  let other = s.surrogate_for(p, "other".into(), Some("PR00002".into())).await.unwrap();
  assert_eq!(other, 0);

  assert_eq!(s.counts().await.unwrap().participant_mappings, 4);
}

#[tokio::test]
async fn participant_and_visit_mappings_are_independent() {
  let s = store().await;

  let p = s
    .surrogate_for(MappingKind::Participant, "ds".into(), Some("X".into()))
    .await
    .unwrap();
  let v = s
    .surrogate_for(MappingKind::Visit, "ds".into(), Some("X".into()))
    .await
    .unwrap();
  assert_eq!((p, v), (0, 0));

  let counts = s.counts().await.unwrap();
  assert_eq!(counts.participant_mappings, 1);
  assert_eq!(counts.visit_mappings, 1);
}

#[tokio::test]
async fn missing_name_maps_to_a_single_surrogate() {
  let s = store().await;
  let v = MappingKind::Visit;

  let named = s.surrogate_for(v, "ds".into(), Some("V1".into())).await.unwrap();
  let anon1 = s.surrogate_for(v, "ds".into(), None).await.unwrap();
  let anon2 = s.surrogate_for(v, "ds".into(), None).await.unwrap();

  assert_eq!(named, 0);
  assert_eq!(anon1, 1);
  assert_eq!(anon1, anon2);
}

// ─── Participants & visits ───────────────────────────────────────────────────

#[tokio::test]
async fn participant_fields_are_overwritten() {
  let s = store().await;

  s.upsert_participant(Participant {
    gender: Some(Gender::Male),
    age: Some(45.0),
    ..Participant::bare("ds", 0)
  })
  .await
  .unwrap();

  s.upsert_participant(Participant {
    handedness: Some(Handedness::Left),
    birth_date: NaiveDate::from_ymd_opt(1970, 1, 2),
    ..Participant::bare("ds", 0)
  })
  .await
  .unwrap();

  let p = s.get_participant("ds".into(), 0).await.unwrap().unwrap();
  assert_eq!(p.gender, None);
  assert_eq!(p.age, None);
  assert_eq!(p.handedness, Some(Handedness::Left));
  assert_eq!(p.birth_date, NaiveDate::from_ymd_opt(1970, 1, 2));
  assert_eq!(s.counts().await.unwrap().participants, 1);
}

#[tokio::test]
async fn ensure_participant_never_overwrites() {
  let s = store().await;

  s.upsert_participant(Participant {
    gender: Some(Gender::Female),
    ..Participant::bare("ds", 3)
  })
  .await
  .unwrap();

  let p = s.ensure_participant("ds".into(), 3).await.unwrap();
  assert_eq!(p.gender, Some(Gender::Female));

  let fresh = s.ensure_participant("ds".into(), 4).await.unwrap();
  assert_eq!(fresh, Participant::bare("ds", 4));
}

#[tokio::test]
async fn visit_upsert_and_ensure() {
  let s = store().await;
  s.ensure_participant("ds".into(), 0).await.unwrap();
  s.ensure_participant("ds".into(), 1).await.unwrap();

  let bare = s.ensure_visit("ds".into(), 0, 0).await.unwrap();
  assert_eq!(bare.date, None);

  s.upsert_visit(Visit {
    dataset:        "ds".into(),
    visit_id:       0,
    participant_id: 1,
    date:           NaiveDate::from_ymd_opt(2016, 3, 9),
    age:            Some(70.5),
  })
  .await
  .unwrap();

  let kept = s.ensure_visit("ds".into(), 0, 0).await.unwrap();
  assert_eq!(kept.participant_id, 1);
  assert_eq!(kept.date, NaiveDate::from_ymd_opt(2016, 3, 9));
  assert_eq!(kept.age, Some(70.5));

  assert!(s.get_visit("ds".into(), 9).await.unwrap().is_none());
}

// ─── Sessions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sessions_dedupe_including_missing_name() {
  let s = store().await;
  s.ensure_participant("ds".into(), 0).await.unwrap();
  s.ensure_visit("ds".into(), 0, 0).await.unwrap();

  let key = |name: Option<&str>| NewSession {
    dataset:  "ds".into(),
    visit_id: 0,
    name:     name.map(str::to_owned),
  };

  let a = s.get_or_create_session(key(Some("1"))).await.unwrap();
  let b = s.get_or_create_session(key(Some("1"))).await.unwrap();
  let c = s.get_or_create_session(key(None)).await.unwrap();
  let d = s.get_or_create_session(key(None)).await.unwrap();

  assert_eq!(a.session_id, b.session_id);
  assert_eq!(c.session_id, d.session_id);
  assert_ne!(a.session_id, c.session_id);
  assert_eq!(s.counts().await.unwrap().sessions, 2);
}

// ─── Sequence types & sequences ──────────────────────────────────────────────

fn mprage(echo_time: Option<f64>) -> SequenceTypeFields {
  SequenceTypeFields {
    name: Some("t1_mprage".into()),
    manufacturer: Some("Siemens".into()),
    echo_time,
    rows: Some(256),
    columns: Some(240),
    pixel_spacing_0: Some(1.0),
    pixel_spacing_1: Some(1.0),
    ..Default::default()
  }
}

#[tokio::test]
async fn sequence_type_requires_every_field_to_match() {
  let s = store().await;

  let a = s.get_or_create_sequence_type(mprage(Some(2.98))).await.unwrap();
  let b = s.get_or_create_sequence_type(mprage(Some(2.98))).await.unwrap();
  let c = s.get_or_create_sequence_type(mprage(Some(3.1))).await.unwrap();
  let d = s.get_or_create_sequence_type(mprage(None)).await.unwrap();
  let e = s.get_or_create_sequence_type(mprage(None)).await.unwrap();

  assert_eq!(a.sequence_type_id, b.sequence_type_id);
  assert_ne!(a.sequence_type_id, c.sequence_type_id);
  assert_ne!(a.sequence_type_id, d.sequence_type_id);
  assert_eq!(d.sequence_type_id, e.sequence_type_id);
  assert_eq!(c.fields.echo_time, Some(3.1));
  assert_eq!(s.counts().await.unwrap().sequence_types, 3);
}

#[tokio::test]
async fn sequence_type_follows_latest_sighting() {
  let s = store().await;
  s.ensure_participant("ds".into(), 0).await.unwrap();
  s.ensure_visit("ds".into(), 0, 0).await.unwrap();
  let session = s
    .get_or_create_session(NewSession { dataset: "ds".into(), visit_id: 0, name: None })
    .await
    .unwrap();

  let t1 = s.get_or_create_sequence_type(mprage(Some(2.98))).await.unwrap();
  let t2 = s.get_or_create_sequence_type(mprage(Some(3.1))).await.unwrap();

  let key = |ty: Option<i64>| NewSequence {
    session_id:       session.session_id,
    name:             Some("t1_mprage".into()),
    sequence_type_id: ty,
  };

  let first = s.upsert_sequence(key(Some(t1.sequence_type_id))).await.unwrap();
  let drift = s.upsert_sequence(key(Some(t2.sequence_type_id))).await.unwrap();
  let bare  = s.upsert_sequence(key(None)).await.unwrap();

  assert_eq!(first.sequence_id, drift.sequence_id);
  assert_eq!(drift.sequence_type_id, Some(t2.sequence_type_id));
  assert_eq!(bare.sequence_id, first.sequence_id);
  assert_eq!(bare.sequence_type_id, Some(t2.sequence_type_id));
  assert_eq!(s.counts().await.unwrap().sequences, 1);
}

// ─── Repetitions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn repetition_date_is_overwritten() {
  let s = store().await;
  let sequence_id = sequence_in(&s).await;

  let key = |date: Option<NaiveDate>| NewRepetition {
    sequence_id,
    name: Some("5".into()),
    date,
  };

  let a = s
    .upsert_repetition(key(NaiveDate::from_ymd_opt(2016, 3, 9)))
    .await
    .unwrap();
  let b = s
    .upsert_repetition(key(NaiveDate::from_ymd_opt(2016, 3, 10)))
    .await
    .unwrap();

  assert_eq!(a.repetition_id, b.repetition_id);
  assert_eq!(b.date, NaiveDate::from_ymd_opt(2016, 3, 10));

  let cleared = s.upsert_repetition(key(None)).await.unwrap();
  assert_eq!(cleared.repetition_id, a.repetition_id);
  assert_eq!(cleared.date, None);
  assert_eq!(s.counts().await.unwrap().repetitions, 1);
}

// ─── Files ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn file_upsert_is_keyed_by_path() {
  let (s, step_id) = store_with_step().await;
  let sequence_id = sequence_in(&s).await;
  let rep = s
    .upsert_repetition(NewRepetition { sequence_id, name: Some("1".into()), date: None })
    .await
    .unwrap();

  let input = NewDataFile {
    path:               "/data/a/IM0001.dcm".into(),
    file_type:          FileType::Dicom,
    is_copy:            false,
    content_hash:       Some("ab".into()),
    repetition_id:      Some(rep.repetition_id),
    processing_step_id: step_id,
  };

  let first = s.upsert_file(input.clone()).await.unwrap();
  let second = s.upsert_file(input).await.unwrap();
  assert_eq!(first, second);
  assert_eq!(first.file_type, FileType::Dicom);

  let fetched = s.get_file("/data/a/IM0001.dcm".into()).await.unwrap().unwrap();
  assert_eq!(fetched, first);
  assert!(s.get_file("/nope".into()).await.unwrap().is_none());
  assert_eq!(s.counts().await.unwrap().files, 1);
}

#[tokio::test]
async fn file_upsert_without_repetition_keeps_existing_one() {
  let (s, step_id) = store_with_step().await;
  let sequence_id = sequence_in(&s).await;
  let rep = s
    .upsert_repetition(NewRepetition { sequence_id, name: Some("1".into()), date: None })
    .await
    .unwrap();

  s.upsert_file(NewDataFile {
    path:               "/data/x.nii".into(),
    file_type:          FileType::Nifti,
    is_copy:            false,
    content_hash:       Some("aa".into()),
    repetition_id:      Some(rep.repetition_id),
    processing_step_id: step_id,
  })
  .await
  .unwrap();

  let updated = s
    .upsert_file(NewDataFile {
      path:               "/data/x.nii".into(),
      file_type:          FileType::Other,
      is_copy:            true,
      content_hash:       Some("bb".into()),
      repetition_id:      None,
      processing_step_id: step_id,
    })
    .await
    .unwrap();

  assert_eq!(updated.repetition_id, Some(rep.repetition_id));
  assert_eq!(updated.file_type, FileType::Other);
  assert!(updated.is_copy);
  assert_eq!(updated.content_hash.as_deref(), Some("bb"));
  assert_eq!(s.counts().await.unwrap().copies, 1);
}

#[tokio::test]
async fn hashes_and_listing_are_per_step() {
  let (s, step_id) = store_with_step().await;
  let prov_id = s.get_step(step_id).await.unwrap().unwrap().provenance_id;
  let next = s
    .get_or_create_step(NewStep {
      name:             "normalise".into(),
      provenance_id:    prov_id,
      previous_step_id: Some(step_id),
    })
    .await
    .unwrap();

  let file = |path: &str, hash: Option<&str>, step: i64| NewDataFile {
    path:               path.into(),
    file_type:          FileType::Other,
    is_copy:            false,
    content_hash:       hash.map(str::to_owned),
    repetition_id:      None,
    processing_step_id: step,
  };

  s.upsert_file(file("/a", Some("h1"), step_id)).await.unwrap();
  s.upsert_file(file("/b", Some("h2"), step_id)).await.unwrap();
  s.upsert_file(file("/c", None, step_id)).await.unwrap();
  s.upsert_file(file("/d", Some("h3"), next.step_id)).await.unwrap();

  let hashes = s.file_hashes_for_step(step_id).await.unwrap();
  assert_eq!(hashes.len(), 2);
  assert!(hashes.contains("h1") && hashes.contains("h2"));

  let listed = s.list_files(step_id).await.unwrap();
  let paths: Vec<_> = listed.iter().map(|f| f.path.as_str()).collect();
  assert_eq!(paths, ["/a", "/b", "/c"]);

  assert_eq!(s.list_files(next.step_id).await.unwrap().len(), 1);
}

// ─── Availability ────────────────────────────────────────────────────────────

#[tokio::test]
async fn closed_store_reports_unavailable() {
  let s = store().await;
  let handle = s.clone();
  s.close().await.unwrap();

  let err = handle.counts().await.unwrap_err();
  assert!(err.is_unavailable());
}
