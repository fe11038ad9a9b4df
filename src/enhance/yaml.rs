//! Post-processing of the model's YAML answer: strip Markdown code fences,
//! parse, drop empty `tech_stack` categories and an empty `selector_path`,
//! then re-serialize.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value};

use crate::error::EnhanceError;

/// First fenced block; the fences must start their own lines.
static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?sm)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```[ \t]*$").unwrap()
});

/// Return the body of the first ```` ```yaml ... ``` ```` block, trimmed.
/// Prose around the block is dropped. Input without a fence is returned as is.
pub fn strip_code_fences(content: &str) -> &str {
    match FENCE.captures(content).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => content,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Sequence(seq) => seq.is_empty(),
        Value::Mapping(map) => map.is_empty(),
        _ => false,
    }
}

/// Drop `tech_stack` categories that are null or empty.
pub fn prune_tech_stack(doc: &mut Mapping) {
    if let Some(Value::Mapping(stack)) = doc.get_mut("tech_stack") {
        stack.retain(|_, items| !is_empty_value(items));
    }
}

/// Drop `selector_path` when it is null or blank.
pub fn prune_selector_path(doc: &mut Mapping) {
    if doc.get("selector_path").is_some_and(is_empty_value) {
        doc.remove("selector_path");
    }
}

/// Turn raw model output into the normalized YAML payload.
pub fn normalize_payload(raw: &str) -> Result<String, EnhanceError> {
    let parse_error = |message: String| EnhanceError::Parse {
        message,
        raw: raw.to_string(),
    };

    let content = strip_code_fences(raw);
    let value: Value = serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string()))?;
    let Value::Mapping(mut doc) = value else {
        return Err(parse_error("expected a YAML mapping at top level".into()));
    };
    if !doc.contains_key("task") {
        return Err(parse_error("missing required key `task`".into()));
    }

    prune_tech_stack(&mut doc);
    prune_selector_path(&mut doc);

    serde_yaml::to_string(&Value::Mapping(doc)).map_err(|e| parse_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "task:
  summary: Add a login form
  goals:
  - Render email and password fields
tech_stack:
  frontend:
  - React
  backend: []
  database: null
constraints:
- Keep it accessible
selector_path: ''
";

    #[test]
    fn strips_yaml_fence() {
        let fenced = format!("```yaml\n{DOC}```");
        assert_eq!(strip_code_fences(&fenced), DOC.trim());
        assert_eq!(strip_code_fences("```\na: 1\n```"), "a: 1");
    }

    #[test]
    fn stripping_fenceless_text_is_a_no_op() {
        assert_eq!(strip_code_fences(DOC), DOC);
        assert_eq!(strip_code_fences("task:\n  summary: x\n"), "task:\n  summary: x\n");
        assert_eq!(strip_code_fences("  a: 1  \n"), "  a: 1  \n");
    }

    #[test]
    fn strips_fence_surrounded_by_prose() {
        let reply =
            format!("Here is the prompt:\n\n```yaml\n{DOC}```\n\nLet me know if you need changes.");
        assert_eq!(strip_code_fences(&reply), DOC.trim());
        let out = normalize_payload(&reply).unwrap();
        let doc: Value = serde_yaml::from_str(&out).unwrap();
        assert_eq!(doc["task"]["summary"], "Add a login form");
    }

    #[test]
    fn removes_empty_categories_and_selector() {
        let out = normalize_payload(&format!("```yaml\n{DOC}```")).unwrap();
        let doc: Value = serde_yaml::from_str(&out).unwrap();
        let stack = doc["tech_stack"].as_mapping().unwrap();
        assert_eq!(stack.len(), 1);
        assert!(stack.contains_key("frontend"));
        assert!(doc.get("selector_path").is_none());
        assert_eq!(doc["task"]["goals"][0], "Render email and password fields");
    }

    #[test]
    fn pruning_clean_document_is_a_no_op() {
        let clean = normalize_payload(DOC).unwrap();
        let mut doc: Mapping = serde_yaml::from_str(&clean).unwrap();
        let before = doc.clone();
        prune_tech_stack(&mut doc);
        prune_selector_path(&mut doc);
        assert_eq!(doc, before);
        assert_eq!(normalize_payload(&clean).unwrap(), clean);
    }

    #[test]
    fn keeps_non_empty_selector() {
        let out = normalize_payload("task:\n  summary: x\nselector_path: '#app'\n").unwrap();
        let doc: Value = serde_yaml::from_str(&out).unwrap();
        assert_eq!(doc["selector_path"], "#app");
    }

    #[test]
    fn invalid_yaml_reports_raw_content() {
        let raw = "task: [unclosed";
        match normalize_payload(raw).unwrap_err() {
            EnhanceError::Parse { raw: got, .. } => assert_eq!(got, raw),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(
            normalize_payload("just a sentence").unwrap_err(),
            EnhanceError::Parse { .. }
        ));
    }
}
