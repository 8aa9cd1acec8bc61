//! Catalog assembly: build the sample tree from a recipe and write it out.
//!
//! [`build_catalog`] is the whole pipeline: load and guard the recipe,
//! fingerprint it, walk it with a [`CatalogBuilder`], then name and write the
//! document with a [`CatalogWriter`].

mod builder;
mod types;
mod writer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::info;

pub use builder::{BuildOutput, BuildReport, CatalogBuilder, SkipReason, SkippedSample};
pub use types::{BeamSummary, Catalog, CatalogSamples, CatalogSummary, RunConfigurations, RunRecord, SampleRecord};
pub use writer::{CatalogName, CatalogWriter, runset_token, summarize_beams, to_pretty_json, version_tag};

use crate::config::BuildConfig;
use crate::consts::{CATALOG_ROLE, CATALOG_SCHEMA_VERSION, RECIPE_HASH_PREFIX_LEN};
use crate::exposure::{ColumnReader, ExposureSource};
use crate::recipe::{Recipe, RecipeError};
use crate::stage::StageOutdirMap;
use crate::util::hash::{ContentHash, HashFileError, hash_file};

/// Errors that abort a catalog build.
#[derive(Debug, Error)]
pub enum CatalogError {
  #[error(transparent)]
  Recipe(#[from] RecipeError),

  #[error("failed to hash recipe: {0}")]
  Hash(#[from] HashFileError),

  #[error("failed to read catalog {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse catalog {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to write {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to serialize catalog: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("{} already exists with a different sample tree; pass --force to overwrite", path.display())]
  Conflict { path: PathBuf },
}

/// A written catalog and how it was built.
#[derive(Debug, Clone)]
pub struct BuiltCatalog {
  pub path: PathBuf,
  pub catalog: Catalog,
  pub report: BuildReport,
  pub recipe_hash: ContentHash,
}

/// Run the full pipeline for one recipe.
pub async fn build_catalog(
  recipe_path: &Path,
  stages: StageOutdirMap,
  config: &BuildConfig,
  reader: Arc<dyn ColumnReader>,
  source: ExposureSource,
) -> Result<BuiltCatalog, CatalogError> {
  let recipe = Recipe::load(recipe_path)?;
  let recipe_hash = hash_file(recipe_path)?;
  let now = Utc::now();

  info!(
    recipe = %recipe_path.display(),
    hash = %recipe_hash.short(RECIPE_HASH_PREFIX_LEN),
    stages = stages.len(),
    exposure = source.name(),
    "building catalog"
  );

  let builder = CatalogBuilder::new(&recipe, config, Arc::new(stages), reader, source);
  let output = builder.build().await?;

  let name = CatalogName {
    project: recipe.project_slug(config.project.as_deref()).to_string(),
    beam_scope: summarize_beams(output.run_configurations.keys().map(String::as_str)),
    runs_token: runset_token(&config.runs),
    version_tag: version_tag(now),
    recipe_hash: recipe_hash.short(RECIPE_HASH_PREFIX_LEN).to_string(),
  };

  let catalog = assemble(recipe_path, &recipe, &recipe_hash, output.run_configurations, now);
  let path = CatalogWriter::new(&config.outdir, config.force).write(&catalog, &name)?;

  Ok(BuiltCatalog {
    path,
    catalog,
    report: output.report,
    recipe_hash,
  })
}

/// Wrap a built sample tree in the catalog envelope.
pub fn assemble(
  recipe_path: &Path,
  recipe: &Recipe,
  recipe_hash: &ContentHash,
  run_configurations: RunConfigurations,
  produced_at: DateTime<Utc>,
) -> Catalog {
  Catalog {
    role: CATALOG_ROLE.to_string(),
    schema_version: CATALOG_SCHEMA_VERSION.to_string(),
    produced_at: produced_at.to_rfc3339_opts(SecondsFormat::Secs, false),
    source_recipe_path: recipe_path.display().to_string(),
    source_recipe_hash: recipe_hash.short(RECIPE_HASH_PREFIX_LEN).to_string(),
    samples: CatalogSamples {
      ntupledir: recipe.ntuple_base_directory.clone(),
      run_configurations,
    },
  }
}
