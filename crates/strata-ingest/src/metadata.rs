//! Read access to per-file header metadata.
//!
//! Header fields are addressed by their keyword (`PatientID`, `EchoTime`, …).
//! The default [`SidecarReader`] looks for a JSON object next to the image;
//! header parsing proper is left to whatever produced that sidecar.

use std::{
  collections::HashMap,
  fs,
  io::ErrorKind,
  path::{Path, PathBuf},
};

use serde_json::Value;

use crate::{Error, Result};

// ─── Values ──────────────────────────────────────────────────────────────────

/// A single header value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
  Int(i64),
  Float(f64),
  Text(String),
  List(Vec<FieldValue>),
}

impl FieldValue {
  /// Converts one JSON value. `null`, booleans and objects have no header
  /// counterpart and yield `None`, as does a list holding any of them.
  pub fn from_json(value: Value) -> Option<Self> {
    match value {
      Value::String(s) => Some(Self::Text(s)),
      Value::Number(n) => n.as_i64().map(Self::Int).or_else(|| n.as_f64().map(Self::Float)),
      Value::Array(items) => items
        .into_iter()
        .map(Self::from_json)
        .collect::<Option<Vec<_>>>()
        .map(Self::List),
      Value::Null | Value::Bool(_) | Value::Object(_) => None,
    }
  }

  /// Textual form of a scalar. Empty and whitespace-only text counts as
  /// absent.
  pub fn as_text(&self) -> Option<String> {
    let s = match self {
      Self::Text(s) => s.trim().to_owned(),
      Self::Int(i) => i.to_string(),
      Self::Float(f) => f.to_string(),
      Self::List(_) => return None,
    };
    (!s.is_empty()).then_some(s)
  }

  /// Finite numeric value; `NaN` and infinities do not coerce.
  pub fn as_f64(&self) -> Option<f64> {
    let f = match self {
      Self::Float(f) => *f,
      Self::Int(i) => *i as f64,
      Self::Text(s) => s.trim().parse::<f64>().ok()?,
      Self::List(_) => return None,
    };
    f.is_finite().then_some(f)
  }

  /// Integral value. Floats with a fractional part do not coerce.
  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Self::Int(i) => Some(*i),
      Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
      Self::Float(_) => None,
      Self::Text(s) => {
        let s = s.trim();
        s.parse()
          .ok()
          .or_else(|| Self::Float(s.parse().ok()?).as_i64())
      }
      Self::List(_) => None,
    }
  }

  /// Element `index` of a multi-valued field, given either as a list or as
  /// backslash-separated text.
  pub fn item(&self, index: usize) -> Option<FieldValue> {
    match self {
      Self::List(items) => items.get(index).cloned(),
      Self::Text(s) => s.split('\\').nth(index).map(|p| Self::Text(p.to_owned())),
      scalar if index == 0 => Some(scalar.clone()),
      _ => None,
    }
  }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Field lookup over the header of one file.
pub trait MetadataAccessor {
  fn get(&self, field: &str) -> Option<&FieldValue>;
}

/// Produces a [`MetadataAccessor`] for a file.
///
/// The `Default` accessor is the empty header a file falls back to when its
/// metadata cannot be read.
pub trait MetadataReader: Send + Sync {
  type Accessor: MetadataAccessor + Default + Send + 'static;

  fn read(&self, path: &Path) -> Result<Self::Accessor>;
}

// ─── In-memory accessor ──────────────────────────────────────────────────────

/// A header held in memory, keyed by field keyword.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapMetadata(HashMap<String, FieldValue>);

impl MapMetadata {
  pub fn new() -> Self { Self::default() }

  pub fn with(mut self, field: impl Into<String>, value: FieldValue) -> Self {
    self.0.insert(field.into(), value);
    self
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl MapMetadata {
  /// Builds a header from a JSON object. Fields without a header counterpart
  /// are left out.
  pub fn from_json(fields: serde_json::Map<String, Value>) -> Self {
    Self(
      fields
        .into_iter()
        .filter_map(|(k, v)| Some((k, FieldValue::from_json(v)?)))
        .collect(),
    )
  }
}

impl MetadataAccessor for MapMetadata {
  fn get(&self, field: &str) -> Option<&FieldValue> { self.0.get(field) }
}

// ─── JSON sidecars ───────────────────────────────────────────────────────────

/// Reads the header of `scan.dcm` from `scan.dcm.json`, falling back to
/// `scan.json`. A file without a sidecar has an empty header.
///
/// Sidecars are ordinary files to the walk and are recorded as such.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarReader;

impl SidecarReader {
  fn candidates(path: &Path) -> [PathBuf; 2] {
    let mut full = path.as_os_str().to_owned();
    full.push(".json");
    [PathBuf::from(full), path.with_extension("json")]
  }
}

impl MetadataReader for SidecarReader {
  type Accessor = MapMetadata;

  fn read(&self, path: &Path) -> Result<MapMetadata> {
    for candidate in Self::candidates(path) {
      if candidate == path {
        continue;
      }
      let text = match fs::read_to_string(&candidate) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => continue,
        Err(e) => return Err(e.into()),
      };
      let fields = serde_json::from_str(&text).map_err(|e| Error::Metadata {
        path:   candidate,
        reason: e.to_string(),
      })?;
      return Ok(MapMetadata::from_json(fields));
    }
    tracing::debug!(path = %path.display(), "no metadata sidecar");
    Ok(MapMetadata::default())
  }
}
