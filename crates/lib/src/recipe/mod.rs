//! Recipe loading and guards.
//!
//! A recipe is read once and never mutated. Only instances with
//! `role = "recipe"` may be built; templates are refused before any work.

mod beam;
mod types;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consts::{DEFAULT_PROJECT, RECIPE_ROLE};

pub use beam::{BeamFamily, BeamKey, HornCurrent};
pub use types::{BeamBlock, Recipe, RecipeKind, RunBlock, SampleEntry, SampleType};

/// Errors that can occur when loading or validating a recipe.
#[derive(Debug, Error)]
pub enum RecipeError {
  /// The recipe file could not be read.
  #[error("failed to read recipe {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The recipe is not valid JSON for the recipe schema.
  #[error("failed to parse recipe {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  /// The document is not a recipe.
  #[error("expected role='recipe', found '{}'", .found.as_deref().unwrap_or("none"))]
  WrongRole { found: Option<String> },

  /// Templates must be copied to an instance before building.
  #[error("refusing to run on a template; copy it and set recipe_kind='instance'")]
  TemplateRecipe,
}

impl Recipe {
  /// Load and validate a recipe from disk.
  pub fn load(path: &Path) -> Result<Self, RecipeError> {
    let content = fs::read_to_string(path).map_err(|source| RecipeError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&content).map_err(|e| match e {
      RecipeError::Parse { source, .. } => RecipeError::Parse {
        path: path.to_path_buf(),
        source,
      },
      other => other,
    })
  }

  /// Parse and validate a recipe from a JSON string.
  pub fn from_json(content: &str) -> Result<Self, RecipeError> {
    let recipe: Recipe = serde_json::from_str(content).map_err(|source| RecipeError::Parse {
      path: PathBuf::new(),
      source,
    })?;
    recipe.validate()?;
    Ok(recipe)
  }

  /// Check the role and kind guards.
  pub fn validate(&self) -> Result<(), RecipeError> {
    if self.role.as_deref() != Some(RECIPE_ROLE) {
      return Err(RecipeError::WrongRole {
        found: self.role.clone(),
      });
    }
    if self.recipe_kind == RecipeKind::Template {
      return Err(RecipeError::TemplateRecipe);
    }
    Ok(())
  }

  /// Project slug, preferring an explicit override.
  pub fn project_slug<'a>(&'a self, override_slug: Option<&'a str>) -> &'a str {
    override_slug
      .or(self.project.as_deref())
      .unwrap_or(DEFAULT_PROJECT)
  }
}
