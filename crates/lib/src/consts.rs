//! Crate-wide constants.

/// Application name used for environment variable prefixes and defaults.
pub const APP_NAME: &str = "samcat";

/// Version of the emitted catalog document layout.
pub const CATALOG_SCHEMA_VERSION: &str = "1.0";

/// Value of `role` a recipe document must carry.
pub const RECIPE_ROLE: &str = "recipe";

/// Value of `role` written into every catalog.
pub const CATALOG_ROLE: &str = "catalog";

/// Number of hex characters of the recipe hash used in file names and the catalog.
pub const RECIPE_HASH_PREFIX_LEN: usize = 7;

/// File extension of merge inputs and merged artifacts.
pub const ARTIFACT_EXTENSION: &str = "root";

/// Default external merge tool.
pub const DEFAULT_MERGE_TOOL: &str = "hadd";

/// Default external column reader command.
///
/// Invoked as `<reader> <file> <tree> <branch>`; prints the branch values.
pub const DEFAULT_READER_COMMAND: &str = "read-branch";

/// Tree holding per-subrun exposure.
pub const SUBRUN_TREE: &str = "nuselection/SubRun";

/// Exposure branch inside [`SUBRUN_TREE`].
pub const POT_BRANCH: &str = "pot";

/// Trees searched, in order, for run/subrun identifiers.
pub const RUN_SUBRUN_TREES: &[&str] = &[SUBRUN_TREE, "nuselection/EventSelectionFilter"];

/// Default project slug when neither the CLI nor the recipe names one.
pub const DEFAULT_PROJECT: &str = "proj";

/// Stage assumed for dataset ids when a sample declares none.
pub const DEFAULT_STAGE: &str = "selection_beam";

/// Upper bound on the default worker count.
pub const MAX_DEFAULT_JOBS: usize = 8;

/// Default timeout for one merge invocation, in seconds.
pub const DEFAULT_MERGE_TIMEOUT_SECS: u64 = 3600;

/// Default timeout for one column read, in seconds.
pub const DEFAULT_READER_TIMEOUT_SECS: u64 = 300;

/// Exit code a column reader uses to report a missing tree or branch.
pub const READER_NOT_FOUND_EXIT: i32 = 3;
