//! Workflow XML extraction.
//!
//! Only two things are read from a workflow definition: `<!ENTITY>`
//! declarations and the `<outdir>` of each `<stage>` in the first
//! `<project>`. The documents use internal DTD entities that general XML
//! readers do not expand, so extraction is pattern based.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::error;

static ENTITY: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"<!ENTITY\s+([^\s]+)\s+"([^"]+)">"#).expect("entity pattern"));

static PROJECT: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?s)<project\b[^>]*>(.*?)</project>").expect("project pattern"));

static STAGE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"(?s)<stage\b[^>]*?\bname\s*=\s*"([^"]*)"[^>]*>(.*?)</stage>"#).expect("stage pattern")
});

static OUTDIR: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?s)<outdir>\s*(.*?)\s*</outdir>").expect("outdir pattern"));

/// Raw contents of one workflow file, before entity substitution.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorkflowDefinition {
  /// `(name, value)` in declaration order; a redeclared name keeps its first
  /// position and takes the later value.
  pub entities: Vec<(String, String)>,
  /// `(stage name, raw outdir)` in document order.
  pub stage_outdirs: Vec<(String, String)>,
}

/// Extract entities and stage outdirs from workflow XML text.
///
/// A document without a `<project>` element still contributes its entities.
pub fn parse_workflow(text: &str, origin: &Path) -> WorkflowDefinition {
  let mut entities = Vec::new();
  declare_entities(
    &mut entities,
    ENTITY.captures_iter(text).map(|c| (c[1].to_string(), c[2].to_string())),
  );

  let Some(project) = PROJECT.captures(text) else {
    error!(path = %origin.display(), "could not find <project> in workflow XML");
    return WorkflowDefinition {
      entities,
      stage_outdirs: Vec::new(),
    };
  };

  let stage_outdirs = STAGE
    .captures_iter(&project[1])
    .map(|stage| {
      let outdir = OUTDIR
        .captures(&stage[2])
        .map(|o| o[1].to_string())
        .unwrap_or_default();
      (stage[1].to_string(), outdir)
    })
    .collect();

  WorkflowDefinition {
    entities,
    stage_outdirs,
  }
}

/// Add declarations to an ordered entity list.
pub fn declare_entities(entities: &mut Vec<(String, String)>, declared: impl IntoIterator<Item = (String, String)>) {
  for (name, value) in declared {
    match entities.iter_mut().find(|(existing, _)| *existing == name) {
      Some(slot) => slot.1 = value,
      None => entities.push((name, value)),
    }
  }
}

/// Replace every `&name;` reference with its entity value, one entity at a
/// time in list order.
pub fn substitute_entities(text: &str, entities: &[(String, String)]) -> String {
  let mut out = text.to_string();
  for (name, value) in entities {
    out = out.replace(&format!("&{};", name), value);
  }
  out
}
