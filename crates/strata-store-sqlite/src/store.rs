//! [`SqliteStore`]: the SQLite implementation of [`CatalogStore`].

use std::{collections::HashSet, path::Path, time::Duration};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};

use strata_core::{
  file::{DataFile, NewDataFile},
  hierarchy::{
    MappingKind, NewRepetition, NewSequence, NewSession, Participant, Repetition,
    Sequence, SequenceType, SequenceTypeFields, Session, Visit,
  },
  provenance::{NewProvenance, NewStep, ProcessingStep, Provenance},
  store::{CatalogCounts, CatalogStore},
};

use crate::{
  encode::{
    encode_date, encode_dt, RawFile, RawParticipant, RawProvenance,
    RawRepetition, RawStep, RawVisit,
  },
  schema::SCHEMA,
  Error, Result,
};

/// How long a writer waits on another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Transaction helpers ─────────────────────────────────────────────────────

/// Run `f` inside an `IMMEDIATE` transaction.
///
/// The write lock is taken up front, so a lookup followed by an insert inside
/// `f` cannot interleave with another writer's.
fn immediate<T>(
  conn: &mut Connection,
  f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
) -> rusqlite::Result<T> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let out = f(&tx)?;
  tx.commit()?;
  Ok(out)
}

/// Look up a row by its natural key and insert it if absent.
///
/// Returns the row and whether it was created by this call. An insert that
/// hits a uniqueness constraint yields the row already holding the key. Must
/// run inside [`immediate`].
fn find_or_insert<T>(
  conn: &Connection,
  find: impl Fn(&Connection) -> rusqlite::Result<Option<T>>,
  insert: impl FnOnce(&Connection) -> rusqlite::Result<usize>,
) -> rusqlite::Result<(T, bool)> {
  if let Some(found) = find(conn)? {
    return Ok((found, false));
  }
  match insert(conn) {
    Ok(_) => {}
    Err(e) if is_constraint_violation(&e) => {
      return match find(conn)? {
        Some(winner) => Ok((winner, false)),
        None => Err(e),
      };
    }
    Err(e) => return Err(e),
  }
  let created = find(conn)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
  Ok((created, true))
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

fn mapping_table(kind: MappingKind) -> (&'static str, &'static str) {
  match kind {
    MappingKind::Participant => ("participant_mappings", "participant_id"),
    MappingKind::Visit => ("visit_mappings", "visit_id"),
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Strata catalog backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Close the underlying connection. Later calls fail with an error for
  /// which [`StoreError::is_unavailable`] holds.
  ///
  /// [`StoreError::is_unavailable`]: strata_core::store::StoreError::is_unavailable
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }
}

impl CatalogStore for SqliteStore {
  type Error = Error;

  // ── Provenance & steps ────────────────────────────────────────────────────

  async fn get_or_create_provenance(&self, input: NewProvenance) -> Result<Provenance> {
    let raw: RawProvenance = self
      .conn
      .call(move |conn| {
        let NewProvenance { dataset, software: sw } = input;
        let find = |c: &Connection| {
          c.query_row(
            &format!(
              "SELECT {} FROM provenances
               WHERE dataset = ?1
                 AND matlab_version IS ?2 AND spm_version IS ?3
                 AND spm_revision IS ?4 AND fn_called IS ?5
                 AND fn_version IS ?6 AND others IS ?7",
              RawProvenance::COLUMNS
            ),
            rusqlite::params![
              dataset,
              sw.matlab_version,
              sw.spm_version,
              sw.spm_revision,
              sw.fn_called,
              sw.fn_version,
              sw.others,
            ],
            RawProvenance::from_row,
          )
          .optional()
        };
        let insert = |c: &Connection| {
          c.execute(
            "INSERT INTO provenances (dataset, matlab_version, spm_version,
               spm_revision, fn_called, fn_version, others)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
              dataset,
              sw.matlab_version,
              sw.spm_version,
              sw.spm_revision,
              sw.fn_called,
              sw.fn_version,
              sw.others,
            ],
          )
        };
        let (raw, created) = immediate(conn, |tx| find_or_insert(tx, find, insert))?;
        if created {
          tracing::debug!(provenance_id = raw.provenance_id, "created provenance");
        }
        Ok(raw)
      })
      .await?;

    Ok(raw.into_provenance())
  }

  async fn get_provenance(&self, provenance_id: i64) -> Result<Option<Provenance>> {
    let raw: Option<RawProvenance> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM provenances WHERE provenance_id = ?1",
                RawProvenance::COLUMNS
              ),
              rusqlite::params![provenance_id],
              RawProvenance::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    Ok(raw.map(RawProvenance::into_provenance))
  }

  async fn get_or_create_step(&self, input: NewStep) -> Result<ProcessingStep> {
    if self.get_provenance(input.provenance_id).await?.is_none() {
      return Err(Error::ProvenanceNotFound(input.provenance_id));
    }
    if let Some(previous) = input.previous_step_id {
      if self.get_step(previous).await?.is_none() {
        return Err(Error::StepNotFound(previous));
      }
    }

    let now = encode_dt(Utc::now());

    let raw: RawStep = self
      .conn
      .call(move |conn| {
        let NewStep { name, provenance_id, previous_step_id } = input;
        let find = |c: &Connection| {
          c.query_row(
            &format!(
              "SELECT {} FROM processing_steps
               WHERE name = ?1 AND provenance_id = ?2 AND previous_step_id IS ?3",
              RawStep::COLUMNS
            ),
            rusqlite::params![name, provenance_id, previous_step_id],
            RawStep::from_row,
          )
          .optional()
        };
        let insert = |c: &Connection| {
          c.execute(
            "INSERT INTO processing_steps
               (name, provenance_id, previous_step_id, execution_date)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![name, provenance_id, previous_step_id, now],
          )
        };
        let raw = immediate(conn, |tx| {
          let (raw, created) = find_or_insert(tx, find, insert)?;
          if created {
            tracing::debug!(step_id = raw.step_id, name = %raw.name, "created processing step");
          } else {
            tx.execute(
              "UPDATE processing_steps SET execution_date = ?1 WHERE step_id = ?2",
              rusqlite::params![now, raw.step_id],
            )?;
          }
          Ok(RawStep { execution_date: now.clone(), ..raw })
        })?;
        Ok(raw)
      })
      .await?;

    raw.into_step()
  }

  async fn get_step(&self, step_id: i64) -> Result<Option<ProcessingStep>> {
    let raw: Option<RawStep> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM processing_steps WHERE step_id = ?1",
                RawStep::COLUMNS
              ),
              rusqlite::params![step_id],
              RawStep::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawStep::into_step).transpose()
  }

  // ── Identity mapping ──────────────────────────────────────────────────────

  async fn surrogate_for(
    &self,
    kind:    MappingKind,
    dataset: String,
    name:    Option<String>,
  ) -> Result<i64> {
    let (table, column) = mapping_table(kind);

    let id: i64 = self
      .conn
      .call(move |conn| {
        let find = |c: &Connection| {
          c.query_row(
            &format!("SELECT {column} FROM {table} WHERE dataset = ?1 AND name IS ?2"),
            rusqlite::params![dataset, name],
            |r| r.get(0),
          )
          .optional()
        };
        // The next surrogate is computed in the same statement as the insert.
        let insert = |c: &Connection| {
          c.execute(
            &format!(
              "INSERT INTO {table} (dataset, name, {column})
               SELECT ?1, ?2, COALESCE(MAX({column}), -1) + 1
               FROM {table} WHERE dataset = ?1"
            ),
            rusqlite::params![dataset, name],
          )
        };
        let (id, created) = immediate(conn, |tx| find_or_insert(tx, find, insert))?;
        if created {
          tracing::debug!(table, dataset = %dataset, name = ?name, id, "minted surrogate");
        }
        Ok(id)
      })
      .await?;

    Ok(id)
  }

  // ── Hierarchy ─────────────────────────────────────────────────────────────

  async fn upsert_participant(&self, participant: Participant) -> Result<Participant> {
    let gender     = participant.gender.map(|g| g.discriminant());
    let handedness = participant.handedness.map(|h| h.discriminant());
    let birth_date = participant.birth_date.map(encode_date);
    let dataset    = participant.dataset.clone();
    let id         = participant.participant_id;
    let age        = participant.age;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO participants
             (dataset, participant_id, gender, birth_date, age, handedness)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (dataset, participant_id) DO UPDATE SET
             gender     = excluded.gender,
             birth_date = excluded.birth_date,
             age        = excluded.age,
             handedness = excluded.handedness",
          rusqlite::params![dataset, id, gender, birth_date, age, handedness],
        )?;
        Ok(())
      })
      .await?;

    Ok(participant)
  }

  async fn ensure_participant(
    &self,
    dataset:        String,
    participant_id: i64,
  ) -> Result<Participant> {
    let raw: RawParticipant = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO participants (dataset, participant_id) VALUES (?1, ?2)
           ON CONFLICT (dataset, participant_id) DO NOTHING",
          rusqlite::params![dataset, participant_id],
        )?;
        Ok(conn.query_row(
          &format!(
            "SELECT {} FROM participants WHERE dataset = ?1 AND participant_id = ?2",
            RawParticipant::COLUMNS
          ),
          rusqlite::params![dataset, participant_id],
          RawParticipant::from_row,
        )?)
      })
      .await?;

    raw.into_participant()
  }

  async fn get_participant(
    &self,
    dataset:        String,
    participant_id: i64,
  ) -> Result<Option<Participant>> {
    let raw: Option<RawParticipant> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM participants WHERE dataset = ?1 AND participant_id = ?2",
                RawParticipant::COLUMNS
              ),
              rusqlite::params![dataset, participant_id],
              RawParticipant::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawParticipant::into_participant).transpose()
  }

  async fn upsert_visit(&self, visit: Visit) -> Result<Visit> {
    let dataset        = visit.dataset.clone();
    let visit_id       = visit.visit_id;
    let participant_id = visit.participant_id;
    let date           = visit.date.map(encode_date);
    let age            = visit.age;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO visits (dataset, visit_id, participant_id, date, age)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (dataset, visit_id) DO UPDATE SET
             participant_id = excluded.participant_id,
             date           = excluded.date,
             age            = excluded.age",
          rusqlite::params![dataset, visit_id, participant_id, date, age],
        )?;
        Ok(())
      })
      .await?;

    Ok(visit)
  }

  async fn ensure_visit(
    &self,
    dataset:        String,
    visit_id:       i64,
    participant_id: i64,
  ) -> Result<Visit> {
    let raw: RawVisit = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO visits (dataset, visit_id, participant_id) VALUES (?1, ?2, ?3)
           ON CONFLICT (dataset, visit_id) DO NOTHING",
          rusqlite::params![dataset, visit_id, participant_id],
        )?;
        Ok(conn.query_row(
          &format!(
            "SELECT {} FROM visits WHERE dataset = ?1 AND visit_id = ?2",
            RawVisit::COLUMNS
          ),
          rusqlite::params![dataset, visit_id],
          RawVisit::from_row,
        )?)
      })
      .await?;

    raw.into_visit()
  }

  async fn get_visit(&self, dataset: String, visit_id: i64) -> Result<Option<Visit>> {
    let raw: Option<RawVisit> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM visits WHERE dataset = ?1 AND visit_id = ?2",
                RawVisit::COLUMNS
              ),
              rusqlite::params![dataset, visit_id],
              RawVisit::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawVisit::into_visit).transpose()
  }

  async fn get_or_create_session(&self, input: NewSession) -> Result<Session> {
    let session = self
      .conn
      .call(move |conn| {
        let NewSession { dataset, visit_id, name } = input;
        let find = |c: &Connection| {
          c.query_row(
            "SELECT session_id FROM sessions
             WHERE dataset = ?1 AND visit_id = ?2 AND name IS ?3",
            rusqlite::params![dataset, visit_id, name],
            |r| r.get::<_, i64>(0),
          )
          .optional()
        };
        let insert = |c: &Connection| {
          c.execute(
            "INSERT INTO sessions (dataset, visit_id, name) VALUES (?1, ?2, ?3)",
            rusqlite::params![dataset, visit_id, name],
          )
        };
        let (session_id, _) = immediate(conn, |tx| find_or_insert(tx, find, insert))?;
        Ok(Session { session_id, dataset, visit_id, name })
      })
      .await?;

    Ok(session)
  }

  async fn get_or_create_sequence_type(
    &self,
    fields: SequenceTypeFields,
  ) -> Result<SequenceType> {
    let natural_key = fields.natural_key()?;
    let f = fields.clone();

    let sequence_type_id: i64 = self
      .conn
      .call(move |conn| {
        let id = immediate(conn, |tx| {
          tx.execute(
            "INSERT INTO sequence_types (
               natural_key, name, manufacturer, manufacturer_model_name,
               institution_name, slice_thickness, repetition_time, echo_time,
               echo_number, number_of_phase_encoding_steps,
               percent_phase_field_of_view, pixel_bandwidth, flip_angle,
               pixel_rows, pixel_columns, magnetic_field_strength,
               space_between_slices, echo_train_length, percent_sampling,
               pixel_spacing_0, pixel_spacing_1)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     ?15, ?16, ?17, ?18, ?19, ?20, ?21)
             ON CONFLICT (natural_key) DO NOTHING",
            rusqlite::params![
              natural_key,
              f.name,
              f.manufacturer,
              f.manufacturer_model_name,
              f.institution_name,
              f.slice_thickness,
              f.repetition_time,
              f.echo_time,
              f.echo_number,
              f.number_of_phase_encoding_steps,
              f.percent_phase_field_of_view,
              f.pixel_bandwidth,
              f.flip_angle,
              f.rows,
              f.columns,
              f.magnetic_field_strength,
              f.space_between_slices,
              f.echo_train_length,
              f.percent_sampling,
              f.pixel_spacing_0,
              f.pixel_spacing_1,
            ],
          )?;
          tx.query_row(
            "SELECT sequence_type_id FROM sequence_types WHERE natural_key = ?1",
            rusqlite::params![natural_key],
            |r| r.get(0),
          )
        })?;
        Ok(id)
      })
      .await?;

    Ok(SequenceType { sequence_type_id, fields })
  }

  async fn upsert_sequence(&self, input: NewSequence) -> Result<Sequence> {
    let sequence = self
      .conn
      .call(move |conn| {
        let NewSequence { session_id, name, sequence_type_id } = input;
        let find = |c: &Connection| {
          c.query_row(
            "SELECT sequence_id, sequence_type_id FROM sequences
             WHERE session_id = ?1 AND name IS ?2",
            rusqlite::params![session_id, name],
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, Option<i64>>(1)?)),
          )
          .optional()
        };
        let insert = |c: &Connection| {
          c.execute(
            "INSERT INTO sequences (session_id, name, sequence_type_id)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![session_id, name, sequence_type_id],
          )
        };
        let sequence = immediate(conn, |tx| {
          let ((sequence_id, stored_type), _) = find_or_insert(tx, find, insert)?;
          let current = match sequence_type_id {
            Some(new_type) if stored_type != Some(new_type) => {
              tx.execute(
                "UPDATE sequences SET sequence_type_id = ?1 WHERE sequence_id = ?2",
                rusqlite::params![new_type, sequence_id],
              )?;
              Some(new_type)
            }
            _ => stored_type,
          };
          Ok(Sequence {
            sequence_id,
            session_id,
            name: name.clone(),
            sequence_type_id: current,
          })
        })?;
        Ok(sequence)
      })
      .await?;

    Ok(sequence)
  }

  async fn upsert_repetition(&self, input: NewRepetition) -> Result<Repetition> {
    let date = input.date.map(encode_date);

    let raw: RawRepetition = self
      .conn
      .call(move |conn| {
        let NewRepetition { sequence_id, name, .. } = input;
        let find = |c: &Connection| {
          c.query_row(
            &format!(
              "SELECT {} FROM repetitions WHERE sequence_id = ?1 AND name IS ?2",
              RawRepetition::COLUMNS
            ),
            rusqlite::params![sequence_id, name],
            RawRepetition::from_row,
          )
          .optional()
        };
        let insert = |c: &Connection| {
          c.execute(
            "INSERT INTO repetitions (sequence_id, name, date) VALUES (?1, ?2, ?3)",
            rusqlite::params![sequence_id, name, date],
          )
        };
        let raw = immediate(conn, |tx| {
          let (raw, created) = find_or_insert(tx, find, insert)?;
          if !created && raw.date != date {
            tx.execute(
              "UPDATE repetitions SET date = ?1 WHERE repetition_id = ?2",
              rusqlite::params![date, raw.repetition_id],
            )?;
          }
          Ok(RawRepetition { date: date.clone(), ..raw })
        })?;
        Ok(raw)
      })
      .await?;

    raw.into_repetition()
  }

  // ── Files ─────────────────────────────────────────────────────────────────

  async fn upsert_file(&self, input: NewDataFile) -> Result<DataFile> {
    let file_type = input.file_type.discriminant();

    let raw: RawFile = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO data_files (path, file_type, is_copy, content_hash,
               repetition_id, processing_step_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (path) DO UPDATE SET
               file_type          = excluded.file_type,
               is_copy            = excluded.is_copy,
               content_hash       = excluded.content_hash,
               repetition_id      = COALESCE(excluded.repetition_id, data_files.repetition_id),
               processing_step_id = excluded.processing_step_id
             RETURNING {}",
            RawFile::COLUMNS
          ),
          rusqlite::params![
            input.path,
            file_type,
            input.is_copy,
            input.content_hash,
            input.repetition_id,
            input.processing_step_id,
          ],
          RawFile::from_row,
        )?)
      })
      .await?;

    raw.into_file()
  }

  async fn get_file(&self, path: String) -> Result<Option<DataFile>> {
    let raw: Option<RawFile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM data_files WHERE path = ?1", RawFile::COLUMNS),
              rusqlite::params![path],
              RawFile::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawFile::into_file).transpose()
  }

  async fn list_files(&self, step_id: i64) -> Result<Vec<DataFile>> {
    let raws: Vec<RawFile> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM data_files WHERE processing_step_id = ?1 ORDER BY path",
          RawFile::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![step_id], RawFile::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFile::into_file).collect()
  }

  async fn file_hashes_for_step(&self, step_id: i64) -> Result<HashSet<String>> {
    let hashes = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT content_hash FROM data_files
           WHERE processing_step_id = ?1 AND content_hash IS NOT NULL",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![step_id], |r| r.get::<_, String>(0))?
          .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(hashes)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn counts(&self) -> Result<CatalogCounts> {
    let counts = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT
             (SELECT COUNT(*) FROM provenances),
             (SELECT COUNT(*) FROM processing_steps),
             (SELECT COUNT(*) FROM participant_mappings),
             (SELECT COUNT(*) FROM visit_mappings),
             (SELECT COUNT(*) FROM participants),
             (SELECT COUNT(*) FROM visits),
             (SELECT COUNT(*) FROM sessions),
             (SELECT COUNT(*) FROM sequence_types),
             (SELECT COUNT(*) FROM sequences),
             (SELECT COUNT(*) FROM repetitions),
             (SELECT COUNT(*) FROM data_files),
             (SELECT COUNT(*) FROM data_files WHERE is_copy = 1)",
          [],
          |r| {
            Ok(CatalogCounts {
              provenances:          r.get::<_, i64>(0)? as u64,
              processing_steps:     r.get::<_, i64>(1)? as u64,
              participant_mappings: r.get::<_, i64>(2)? as u64,
              visit_mappings:       r.get::<_, i64>(3)? as u64,
              participants:         r.get::<_, i64>(4)? as u64,
              visits:               r.get::<_, i64>(5)? as u64,
              sessions:             r.get::<_, i64>(6)? as u64,
              sequence_types:       r.get::<_, i64>(7)? as u64,
              sequences:            r.get::<_, i64>(8)? as u64,
              repetitions:          r.get::<_, i64>(9)? as u64,
              files:                r.get::<_, i64>(10)? as u64,
              copies:               r.get::<_, i64>(11)? as u64,
            })
          },
        )?)
      })
      .await?;

    Ok(counts)
  }
}
