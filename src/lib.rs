//! Prompt Enhancer: turns a free-text feature request plus a tech-stack
//! selection into a structured YAML prompt via an LLM chat-completion API.
//!
//! The core is the request orchestration in [`enhance`]: fingerprinted TTL
//! cache, in-flight deduplication and a retrying transport. [`language`]
//! detects non-English input and translates it best-effort beforehand.

pub mod config;
pub mod enhance;
pub mod error;
pub mod language;
pub mod metrics;
pub mod request;
pub mod state_store;

pub use config::EnhancerConfig;
pub use enhance::{EnhanceResult, Enhancer, ResultMetrics};
pub use error::{EnhanceError, FieldError};
pub use request::{RequestParams, TechStack, WordLimit};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter; `json` switches to JSON lines.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("prompt_enhancer=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
