//! `strata`: record imaging folders in a Strata catalog.
//!
//! # Usage
//!
//! ```text
//! strata provenance --dataset lren --spm-version SPM12
//! strata ingest /data/lren/raw --provenance 0 --step dicom_import --boost
//! strata ingest /data/lren/nifti --provenance 0 --step nifti_convert --previous-step 0
//! strata stats
//! ```
//!
//! Settings are read from `strata.toml` (or `--config`) and `STRATA_*`
//! environment variables; nested keys use `__`, e.g.
//! `STRATA_OPTIONS__BOOST=true`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use strata_core::{
  provenance::{NewProvenance, SoftwareVersions},
  store::CatalogStore,
};
use strata_ingest::{IngestOptions, Ingestor, PathLayout};
use strata_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "strata", version, about = "Imaging-study catalog")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "strata.toml")]
  config: PathBuf,

  /// SQLite catalog file; overrides `store_path` from the configuration.
  #[arg(long, env = "STRATA_STORE")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Get or create a provenance and print its id.
  Provenance(ProvenanceArgs),
  /// Record every file of a folder under a processing step.
  Ingest(IngestArgs),
  /// Print row counts per level.
  Stats,
}

#[derive(Args)]
struct ProvenanceArgs {
  #[arg(long)]
  dataset:        String,
  #[arg(long)]
  matlab_version: Option<String>,
  #[arg(long)]
  spm_version:    Option<String>,
  #[arg(long)]
  spm_revision:   Option<String>,
  #[arg(long)]
  fn_called:      Option<String>,
  #[arg(long)]
  fn_version:     Option<String>,
  #[arg(long)]
  others:         Option<String>,
}

#[derive(Args)]
struct IngestArgs {
  /// Folder to walk.
  folder: PathBuf,

  #[arg(long)]
  provenance: i64,

  /// Name of the processing step that produced the folder.
  #[arg(long)]
  step: String,

  /// Step whose files are compared against for copy detection.
  #[arg(long)]
  previous_step: Option<i64>,

  #[arg(long)]
  boost: bool,

  #[arg(long)]
  session_id_by_participant: bool,

  #[arg(long)]
  participant_id_in_visit_id: bool,

  #[arg(long)]
  visit_from_path: bool,

  #[arg(long)]
  repetition_from_path: bool,

  /// The folder is not laid out as participant/session/sequence/repetition.
  #[arg(long)]
  not_organised: bool,
}

impl IngestArgs {
  /// Flags switch options on; they never switch configured ones off.
  fn apply(&self, mut options: IngestOptions) -> IngestOptions {
    options.boost |= self.boost;
    options.session_id_by_participant |= self.session_id_by_participant;
    options.participant_id_in_visit_id |= self.participant_id_in_visit_id;
    options.visit_from_path |= self.visit_from_path;
    options.repetition_from_path |= self.repetition_from_path;
    if self.not_organised {
      options.is_organised = false;
    }
    options
  }
}

// ─── Config file ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(default)]
struct CliConfig {
  store_path: PathBuf,
  options:    IngestOptions,
  layout:     PathLayout,
}

impl Default for CliConfig {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("strata.db"),
      options:    IngestOptions::default(),
      layout:     PathLayout::default(),
    }
  }
}

fn load_config(path: &Path) -> anyhow::Result<CliConfig> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("STRATA")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise configuration")
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = load_config(&cli.config)?;

  let store_path = expand_tilde(cli.store.as_deref().unwrap_or(&cfg.store_path));
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Provenance(args) => {
      let provenance = store
        .get_or_create_provenance(NewProvenance {
          dataset:  args.dataset,
          software: SoftwareVersions {
            matlab_version: args.matlab_version,
            spm_version:    args.spm_version,
            spm_revision:   args.spm_revision,
            fn_called:      args.fn_called,
            fn_version:     args.fn_version,
            others:         args.others,
          },
        })
        .await
        .context("failed to record provenance")?;
      println!("{}", provenance.provenance_id);
    }

    Command::Ingest(args) => {
      let options = args.apply(cfg.options);
      let layout = cfg.layout.compile().context("invalid path layout")?;
      let report = Ingestor::new(options, layout)
        .ingest(
          &store,
          &args.folder,
          args.provenance,
          &args.step,
          args.previous_step,
        )
        .await
        .with_context(|| format!("failed to ingest {}", args.folder.display()))?;
      println!(
        "step {}: {} recorded, {} copies, {} skipped, {} failed",
        report.step_id, report.recorded, report.copies, report.skipped, report.failed
      );
    }

    Command::Stats => {
      let c = store.counts().await.context("failed to count rows")?;
      for (label, n) in [
        ("provenances", c.provenances),
        ("processing steps", c.processing_steps),
        ("participant mappings", c.participant_mappings),
        ("visit mappings", c.visit_mappings),
        ("participants", c.participants),
        ("visits", c.visits),
        ("sessions", c.sessions),
        ("sequence types", c.sequence_types),
        ("sequences", c.sequences),
        ("repetitions", c.repetitions),
        ("files", c.files),
        ("copies", c.copies),
      ] {
        println!("{label:<22}{n}");
      }
    }
  }

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
