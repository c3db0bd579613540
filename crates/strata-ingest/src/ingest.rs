//! The ingestion run: walk a folder and record every file under one
//! processing step.

use std::{
  collections::{HashMap, HashSet},
  path::{Path, PathBuf},
  sync::Arc,
};

use strata_core::{
  file::{FileType, NewDataFile},
  provenance::NewStep,
  store::CatalogStore,
};
use walkdir::WalkDir;

use crate::{
  classify::{Classifier, MagicClassifier},
  extract,
  hash::hash_file,
  layout::Layout,
  metadata::{MetadataReader, SidecarReader},
  options::IngestOptions,
  policy::Lookup,
  resolve, Error, Result,
};

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
  /// The step every recorded file is attributed to.
  pub step_id:  i64,
  /// Files with a row written by this run.
  pub recorded: u64,
  /// Entries not recorded: non-regular or vanished entries.
  pub skipped:  u64,
  /// Files whose resolution failed.
  pub failed:   u64,
  /// Recorded files byte-identical to a file of the previous step.
  pub copies:   u64,
}

enum Outcome {
  Recorded { is_copy: bool },
  Skipped,
}

/// Per-run state.
struct Run {
  dataset:         String,
  step_id:         i64,
  previous_hashes: HashSet<String>,
  /// Leaf directory → repetition, for boost mode.
  resolved_dirs:   HashMap<PathBuf, i64>,
  report:          IngestReport,
}

/// Walks folders and records their files in a [`CatalogStore`].
pub struct Ingestor<C = MagicClassifier, M = SidecarReader> {
  classifier: Arc<C>,
  reader:     Arc<M>,
  options:    IngestOptions,
  layout:     Layout,
}

impl Ingestor {
  /// An ingestor using magic-byte classification and JSON sidecars.
  pub fn new(options: IngestOptions, layout: Layout) -> Self {
    Self::with_parts(MagicClassifier, SidecarReader, options, layout)
  }
}

impl<C, M> Ingestor<C, M>
where
  C: Classifier + 'static,
  M: MetadataReader + 'static,
{
  pub fn with_parts(classifier: C, reader: M, options: IngestOptions, layout: Layout) -> Self {
    Self {
      classifier: Arc::new(classifier),
      reader: Arc::new(reader),
      options,
      layout,
    }
  }

  pub fn options(&self) -> &IngestOptions { &self.options }

  /// Record every file below `root` under the step `(step_name,
  /// provenance_id, previous_step_id)`, creating the step if needed.
  ///
  /// Failures on single files are logged and counted. The run only aborts
  /// when the store becomes unavailable.
  pub async fn ingest<S: CatalogStore>(
    &self,
    store:            &S,
    root:             &Path,
    provenance_id:    i64,
    step_name:        &str,
    previous_step_id: Option<i64>,
  ) -> Result<IngestReport> {
    if !root.is_dir() {
      return Err(Error::RootNotFound(root.to_path_buf()));
    }

    let provenance = store
      .get_provenance(provenance_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::UnknownProvenance(provenance_id))?;

    let step = store
      .get_or_create_step(NewStep {
        name: step_name.to_owned(),
        provenance_id,
        previous_step_id,
      })
      .await
      .map_err(Error::store)?;

    let previous_hashes = match previous_step_id {
      Some(previous) => store
        .file_hashes_for_step(previous)
        .await
        .map_err(Error::store)?,
      None => HashSet::new(),
    };

    tracing::info!(
      root = %root.display(),
      dataset = %provenance.dataset,
      step_id = step.step_id,
      options = ?self.options,
      "starting ingestion"
    );

    let mut run = Run {
      dataset: provenance.dataset,
      step_id: step.step_id,
      previous_hashes,
      resolved_dirs: HashMap::new(),
      report: IngestReport { step_id: step.step_id, ..Default::default() },
    };

    for path in walk(root.to_path_buf()).await? {
      match self.process_file(store, &mut run, &path).await {
        Ok(Outcome::Recorded { is_copy }) => {
          run.report.recorded += 1;
          if is_copy {
            run.report.copies += 1;
          }
        }
        Ok(Outcome::Skipped) => run.report.skipped += 1,
        Err(e) if e.is_unavailable() => {
          tracing::error!(path = %path.display(), error = %e, "store unavailable; aborting run");
          return Err(e);
        }
        Err(e) => {
          tracing::warn!(path = %path.display(), error = %e, "failed to record file");
          run.report.failed += 1;
        }
      }
    }

    let report = run.report;
    tracing::info!(
      step_id = report.step_id,
      recorded = report.recorded,
      skipped = report.skipped,
      failed = report.failed,
      copies = report.copies,
      "ingestion finished"
    );
    Ok(report)
  }

  async fn process_file<S: CatalogStore>(
    &self,
    store: &S,
    run:   &mut Run,
    path:  &Path,
  ) -> Result<Outcome> {
    tracing::debug!(path = %path.display(), "processing");

    let file_type = match self.classify(path).await {
      Ok(Some(file_type)) => file_type,
      Ok(None) => return Ok(Outcome::Skipped),
      Err(e) => {
        tracing::warn!(path = %path.display(), error = %e, "cannot classify file");
        return Ok(Outcome::Skipped);
      }
    };

    let hash = hash_file(path.to_path_buf()).await;
    let is_copy = hash.as_ref().is_some_and(|h| run.previous_hashes.contains(h));
    let path_str = path.to_string_lossy().into_owned();

    let repetition_id = match file_type {
      FileType::Dicom => {
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let cached = if self.options.boost {
          run.resolved_dirs.get(&dir).copied()
        } else {
          None
        };
        match cached {
          Some(repetition_id) => Some(repetition_id),
          None => {
            let accessor = self.read_metadata(path).await.unwrap_or_else(|e| {
              tracing::warn!(path = %path.display(), error = %e, "cannot read header; resolving without it");
              M::Accessor::default()
            });
            let record = extract::header_record(
              &Lookup { header: Some(&accessor), path: &path_str, layout: &self.layout },
              &self.options,
            );
            let repetition = resolve::resolve_header(store, &run.dataset, &record).await?;
            run.resolved_dirs.insert(dir, repetition.repetition_id);
            Some(repetition.repetition_id)
          }
        }
      }
      FileType::Nifti if self.options.is_organised => {
        let record = extract::path_record(
          &Lookup { header: None, path: &path_str, layout: &self.layout },
          &self.options,
        );
        let repetition = resolve::resolve_path(store, &run.dataset, &record).await?;
        Some(repetition.repetition_id)
      }
      FileType::Nifti | FileType::Other => None,
    };

    let file = store
      .upsert_file(NewDataFile {
        path: path_str,
        file_type,
        is_copy,
        content_hash: hash,
        repetition_id,
        processing_step_id: run.step_id,
      })
      .await
      .map_err(Error::store)?;

    tracing::debug!(file_id = file.file_id, %file_type, is_copy, ?repetition_id, "recorded file");
    Ok(Outcome::Recorded { is_copy })
  }

  async fn classify(&self, path: &Path) -> Result<Option<FileType>> {
    let classifier = Arc::clone(&self.classifier);
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || classifier.classify(&path)).await?
  }

  async fn read_metadata(&self, path: &Path) -> Result<M::Accessor> {
    let reader = Arc::clone(&self.reader);
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || reader.read(&path)).await?
  }
}

/// Regular files below `root`, sorted by name at every level. Entries that
/// cannot be visited are logged and left out.
async fn walk(root: PathBuf) -> Result<Vec<PathBuf>> {
  let files = tokio::task::spawn_blocking(move || {
    let mut files = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
      match entry {
        Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "cannot visit entry"),
      }
    }
    files
  })
  .await?;

  tracing::debug!(count = files.len(), "discovered files");
  Ok(files)
}
