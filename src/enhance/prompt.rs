//! Chat-completion body construction.

use crate::request::RequestParams;

/// Describes the YAML document the model must return.
pub const SYSTEM_PROMPT: &str = "\
You turn rough feature requests into precise implementation prompts for a coding assistant.
Respond with YAML only, no commentary, using exactly this schema:

task:
  summary: <one-paragraph restatement of the request>
  goals:
    - <concrete, verifiable goal>
tech_stack:
  <category>:
    - <technology>
constraints:
  - <constraint the implementation must respect>
selector_path: <CSS selector of the target element, omit when not given>

Only list technologies that were provided. Keep the whole document within the requested word limit.";

/// `max_tokens` for a request: three tokens per requested word, at least 500.
pub fn max_tokens(params: &RequestParams) -> u32 {
    (params.word_limit().words() * 3).max(500)
}

/// User message embedding the (possibly translated) description and the
/// request's word limit, selector and tech-stack summary.
pub fn build_user_message(params: &RequestParams, text: &str) -> String {
    let mut msg = format!(
        "Task description:\n{}\n\nWord limit: {}\n",
        text.trim(),
        params.word_limit()
    );

    if let Some(selector) = params.selector_path() {
        msg.push_str(&format!("Selector path: {}\n", selector.trim()));
    }

    if params.tech_stack().is_empty() {
        msg.push_str("Tech stack: not specified\n");
    } else {
        msg.push_str("Tech stack:\n");
        for (category, items) in params.tech_stack().categories() {
            if !items.is_empty() {
                msg.push_str(&format!("- {}: {}\n", category, items.join(", ")));
            }
        }
    }
    msg
}

/// Full chat-completion body with deterministic sampling.
pub fn build_request_body(model: &str, params: &RequestParams, text: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [
            {"role": "system", "content": SYSTEM_PROMPT},
            {"role": "user", "content": build_user_message(params, text)}
        ],
        "temperature": 0,
        "max_tokens": max_tokens(params),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{TechStack, WordLimit};

    #[test]
    fn max_tokens_has_floor() {
        assert_eq!(max_tokens(&RequestParams::new("x", WordLimit::W100)), 500);
        assert_eq!(max_tokens(&RequestParams::new("x", WordLimit::W300)), 900);
        assert_eq!(max_tokens(&RequestParams::new("x", WordLimit::W500)), 1500);
    }

    #[test]
    fn user_message_lists_selector_and_stack() {
        let params = RequestParams::new("ignored original", WordLimit::W200)
            .with_selector("#login")
            .with_tech_stack(
                TechStack::new()
                    .with("frontend", ["React", "Tailwind"])
                    .with("database", Vec::<String>::new()),
            );
        let msg = build_user_message(&params, "add a login form");
        assert!(msg.contains("Task description:\nadd a login form"));
        assert!(msg.contains("Word limit: 200"));
        assert!(msg.contains("Selector path: #login"));
        assert!(msg.contains("- frontend: React, Tailwind"));
        assert!(!msg.contains("database"));
    }

    #[test]
    fn body_uses_zero_temperature() {
        let params = RequestParams::new("add a login form", WordLimit::W100);
        let body = build_request_body("gpt-test", &params, params.text());
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["temperature"], 0);
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][1]["content"].as_str().unwrap().contains("Tech stack: not specified"));
    }
}
