//! samcat-lib: Core types and logic for building sample catalogs
//!
//! This crate turns a declarative recipe of beams, runs and samples into a
//! catalog document consumable by analysis code:
//! - `recipe`: the immutable input document and its guards
//! - `stage`: stage name to output directory resolution
//! - `discovery`: cached artifact listing per directory
//! - `merge`: the external merge tool (or its dry-run stand-in)
//! - `exposure`: normalization metadata (POT, triggers) per sample
//! - `dataset_id`: canonical dataset identifiers
//! - `catalog`: the builder that walks the recipe and the writer that emits it

pub mod catalog;
pub mod config;
pub mod consts;
pub mod dataset_id;
pub mod discovery;
pub mod exposure;
pub mod merge;
pub mod recipe;
pub mod stage;
pub mod util;
