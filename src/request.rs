//! Enhancement request parameters and input validation.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{EnhanceError, FieldError};

pub const MIN_TEXT_CHARS: usize = 10;
pub const MAX_TEXT_CHARS: usize = 5000;
pub const MAX_SELECTOR_CHARS: usize = 500;

/// Characters that may appear in a CSS selector path.
static SELECTOR_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[A-Za-z0-9\s\-_#.\[\]=:"'()>+~*,^$|@]+$"#).unwrap());

/// Target length of the generated prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum WordLimit {
    W100,
    #[default]
    W200,
    W300,
    W500,
}

impl WordLimit {
    pub const ALL: [WordLimit; 4] = [WordLimit::W100, WordLimit::W200, WordLimit::W300, WordLimit::W500];

    pub fn words(self) -> u32 {
        match self {
            WordLimit::W100 => 100,
            WordLimit::W200 => 200,
            WordLimit::W300 => 300,
            WordLimit::W500 => 500,
        }
    }
}

impl TryFrom<u32> for WordLimit {
    type Error = EnhanceError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        WordLimit::ALL
            .into_iter()
            .find(|w| w.words() == value)
            .ok_or_else(|| {
                EnhanceError::Validation(vec![FieldError::new(
                    "word_limit",
                    format!("must be one of 100, 200, 300, 500 (got {value})"),
                )])
            })
    }
}

impl From<WordLimit> for u32 {
    fn from(value: WordLimit) -> Self {
        value.words()
    }
}

impl std::fmt::Display for WordLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.words())
    }
}

/// Technology selections grouped by category (e.g. `frontend`, `database`).
/// Each category keeps its items in selection order without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TechStack(BTreeMap<String, Vec<String>>);

impl TechStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add items under `category`, skipping blanks and repeats.
    pub fn with<I, S>(mut self, category: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.0.entry(category.trim().to_string()).or_default();
        for item in items {
            let item = item.into();
            let item = item.trim();
            if !item.is_empty() && !entry.iter().any(|existing| existing == item) {
                entry.push(item.to_string());
            }
        }
        self
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// True when no category holds any item.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

/// One user submission. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParams {
    text: String,
    word_limit: WordLimit,
    selector_path: Option<String>,
    tech_stack: TechStack,
}

impl RequestParams {
    pub fn new(text: impl Into<String>, word_limit: WordLimit) -> Self {
        Self {
            text: text.into(),
            word_limit,
            selector_path: None,
            tech_stack: TechStack::default(),
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        let selector = selector.into();
        self.selector_path = (!selector.trim().is_empty()).then_some(selector);
        self
    }

    pub fn with_tech_stack(mut self, tech_stack: TechStack) -> Self {
        self.tech_stack = tech_stack;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn word_limit(&self) -> WordLimit {
        self.word_limit
    }

    pub fn selector_path(&self) -> Option<&str> {
        self.selector_path.as_deref()
    }

    pub fn tech_stack(&self) -> &TechStack {
        &self.tech_stack
    }

    /// Check input constraints, collecting every offending field.
    pub fn validate(&self) -> Result<(), EnhanceError> {
        let mut errors = Vec::new();

        let chars = self.text.trim().chars().count();
        if chars < MIN_TEXT_CHARS {
            errors.push(FieldError::new(
                "text",
                format!("must be at least {MIN_TEXT_CHARS} characters"),
            ));
        } else if chars > MAX_TEXT_CHARS {
            errors.push(FieldError::new(
                "text",
                format!("must be at most {MAX_TEXT_CHARS} characters"),
            ));
        }

        if let Some(selector) = self.selector_path.as_deref() {
            if let Some(message) = selector_problem(selector.trim()) {
                errors.push(FieldError::new("selector_path", message));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EnhanceError::Validation(errors))
        }
    }
}

fn selector_problem(selector: &str) -> Option<String> {
    if selector.chars().count() > MAX_SELECTOR_CHARS {
        return Some(format!("must be at most {MAX_SELECTOR_CHARS} characters"));
    }
    if !SELECTOR_CHARS.is_match(selector) {
        return Some("contains characters not valid in a CSS selector".into());
    }
    let mut stack = Vec::new();
    for c in selector.chars() {
        match c {
            '[' | '(' => stack.push(c),
            ']' => {
                if stack.pop() != Some('[') {
                    return Some("unbalanced brackets".into());
                }
            }
            ')' => {
                if stack.pop() != Some('(') {
                    return Some("unbalanced parentheses".into());
                }
            }
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Some("unclosed bracket or parenthesis".into());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_errors(err: EnhanceError) -> Vec<FieldError> {
        match err {
            EnhanceError::Validation(fields) => fields,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn word_limit_accepts_only_known_values() {
        assert_eq!(WordLimit::try_from(300).unwrap(), WordLimit::W300);
        let fields = field_errors(WordLimit::try_from(250).unwrap_err());
        assert_eq!(fields[0].field, "word_limit");
    }

    #[test]
    fn word_limit_serializes_as_number() {
        assert_eq!(serde_json::to_string(&WordLimit::W500).unwrap(), "500");
        let parsed: WordLimit = serde_json::from_str("100").unwrap();
        assert_eq!(parsed, WordLimit::W100);
        assert!(serde_json::from_str::<WordLimit>("150").is_err());
    }

    #[test]
    fn tech_stack_skips_blanks_and_repeats() {
        let stack = TechStack::new().with("frontend", ["React", " ", "React", "Vue"]);
        let (category, items) = stack.categories().next().unwrap();
        assert_eq!(category, "frontend");
        assert_eq!(items, ["React".to_string(), "Vue".to_string()]);
        assert!(TechStack::new().with("backend", Vec::<String>::new()).is_empty());
    }

    #[test]
    fn short_text_and_bad_selector_are_both_reported() {
        let params = RequestParams::new("too short", WordLimit::W100).with_selector("div[class=x");
        let fields = field_errors(params.validate().unwrap_err());
        let names: Vec<_> = fields.iter().map(|f| f.field).collect();
        assert_eq!(names, ["text", "selector_path"]);
    }

    #[test]
    fn valid_selector_passes() {
        let params = RequestParams::new("add a login form", WordLimit::W100)
            .with_selector("#app > form.login input[type=\"email\"]:nth-child(2)");
        assert!(params.validate().is_ok());
    }

    #[test]
    fn blank_selector_is_treated_as_absent() {
        let params = RequestParams::new("add a login form", WordLimit::W100).with_selector("  ");
        assert_eq!(params.selector_path(), None);
    }

    #[test]
    fn overlong_text_is_rejected() {
        let params = RequestParams::new("x".repeat(MAX_TEXT_CHARS + 1), WordLimit::W100);
        assert_eq!(field_errors(params.validate().unwrap_err())[0].field, "text");
    }
}
