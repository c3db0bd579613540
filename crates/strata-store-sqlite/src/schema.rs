//! SQL schema for the Strata SQLite store.
//!
//! Executed once at connection startup. Nullable natural-key columns are made
//! unique through expression indexes over `IFNULL(col, x'00')`: a blob sentinel
//! never compares equal to a TEXT or INTEGER value, so `NULL` matches only
//! `NULL`. Lookups use `IS` for the same null-aware equality.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS provenances (
    provenance_id  INTEGER PRIMARY KEY,
    dataset        TEXT NOT NULL,
    matlab_version TEXT,
    spm_version    TEXT,
    spm_revision   TEXT,
    fn_called      TEXT,
    fn_version     TEXT,
    others         TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS provenances_fingerprint_idx ON provenances (
    dataset,
    IFNULL(matlab_version, x'00'),
    IFNULL(spm_version,    x'00'),
    IFNULL(spm_revision,   x'00'),
    IFNULL(fn_called,      x'00'),
    IFNULL(fn_version,     x'00'),
    IFNULL(others,         x'00')
);

-- execution_date is the only column ever updated.
CREATE TABLE IF NOT EXISTS processing_steps (
    step_id          INTEGER PRIMARY KEY,
    name             TEXT    NOT NULL,
    provenance_id    INTEGER NOT NULL REFERENCES provenances(provenance_id),
    previous_step_id INTEGER REFERENCES processing_steps(step_id),
    execution_date   TEXT    NOT NULL   -- RFC 3339 UTC; last run
);

CREATE UNIQUE INDEX IF NOT EXISTS processing_steps_key_idx ON processing_steps (
    name, provenance_id, IFNULL(previous_step_id, x'00')
);

-- Surrogates are minted by the store only; never updated once assigned.
CREATE TABLE IF NOT EXISTS participant_mappings (
    dataset        TEXT    NOT NULL,
    name           TEXT,
    participant_id INTEGER NOT NULL,
    UNIQUE (dataset, participant_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS participant_mappings_name_idx
    ON participant_mappings (dataset, IFNULL(name, x'00'));

CREATE TABLE IF NOT EXISTS visit_mappings (
    dataset  TEXT    NOT NULL,
    name     TEXT,
    visit_id INTEGER NOT NULL,
    UNIQUE (dataset, visit_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS visit_mappings_name_idx
    ON visit_mappings (dataset, IFNULL(name, x'00'));

CREATE TABLE IF NOT EXISTS participants (
    dataset        TEXT    NOT NULL,
    participant_id INTEGER NOT NULL,
    gender         TEXT,             -- 'male' | 'female' | 'other' | 'unknown'
    birth_date     TEXT,             -- YYYY-MM-DD
    age            REAL,             -- fractional years
    handedness     TEXT,             -- 'left' | 'right' | 'ambidexter' | 'unknown'
    PRIMARY KEY (dataset, participant_id)
);

CREATE TABLE IF NOT EXISTS visits (
    dataset        TEXT    NOT NULL,
    visit_id       INTEGER NOT NULL,
    participant_id INTEGER NOT NULL,
    date           TEXT,
    age            REAL,
    PRIMARY KEY (dataset, visit_id),
    FOREIGN KEY (dataset, participant_id) REFERENCES participants(dataset, participant_id)
);

CREATE TABLE IF NOT EXISTS sessions (
    session_id INTEGER PRIMARY KEY,
    dataset    TEXT    NOT NULL,
    visit_id   INTEGER NOT NULL,
    name       TEXT,
    FOREIGN KEY (dataset, visit_id) REFERENCES visits(dataset, visit_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS sessions_key_idx
    ON sessions (dataset, visit_id, IFNULL(name, x'00'));

-- natural_key is the canonical JSON form of every column below it.
CREATE TABLE IF NOT EXISTS sequence_types (
    sequence_type_id               INTEGER PRIMARY KEY,
    natural_key                    TEXT NOT NULL UNIQUE,
    name                           TEXT,
    manufacturer                   TEXT,
    manufacturer_model_name        TEXT,
    institution_name               TEXT,
    slice_thickness                REAL,
    repetition_time                REAL,
    echo_time                      REAL,
    echo_number                    INTEGER,
    number_of_phase_encoding_steps INTEGER,
    percent_phase_field_of_view    REAL,
    pixel_bandwidth                INTEGER,
    flip_angle                     REAL,
    pixel_rows                     INTEGER,
    pixel_columns                  INTEGER,
    magnetic_field_strength        REAL,
    space_between_slices           REAL,
    echo_train_length              INTEGER,
    percent_sampling               REAL,
    pixel_spacing_0                REAL,
    pixel_spacing_1                REAL
);

CREATE TABLE IF NOT EXISTS sequences (
    sequence_id      INTEGER PRIMARY KEY,
    session_id       INTEGER NOT NULL REFERENCES sessions(session_id),
    name             TEXT,
    sequence_type_id INTEGER REFERENCES sequence_types(sequence_type_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS sequences_key_idx
    ON sequences (session_id, IFNULL(name, x'00'));

CREATE TABLE IF NOT EXISTS repetitions (
    repetition_id INTEGER PRIMARY KEY,
    sequence_id   INTEGER NOT NULL REFERENCES sequences(sequence_id),
    name          TEXT,
    date          TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS repetitions_key_idx
    ON repetitions (sequence_id, IFNULL(name, x'00'));

CREATE TABLE IF NOT EXISTS data_files (
    file_id            INTEGER PRIMARY KEY,
    path               TEXT    NOT NULL UNIQUE,
    file_type          TEXT    NOT NULL,   -- 'DICOM' | 'NIFTI' | 'other'
    is_copy            INTEGER NOT NULL DEFAULT 0,
    content_hash       TEXT,               -- hex SHA-256, NULL if unreadable
    repetition_id      INTEGER REFERENCES repetitions(repetition_id),
    processing_step_id INTEGER NOT NULL REFERENCES processing_steps(step_id)
);

CREATE INDEX IF NOT EXISTS data_files_step_idx ON data_files(processing_step_id);
CREATE INDEX IF NOT EXISTS data_files_hash_idx ON data_files(content_hash);

PRAGMA user_version = 1;
";
