//! Command-line front end: enhance one description and print the YAML.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use prompt_enhancer::enhance::EnhanceResult;
use prompt_enhancer::state_store::{FormInputs, StateStore};
use prompt_enhancer::{
    init_tracing, EnhanceError, Enhancer, EnhancerConfig, RequestParams, TechStack, WordLimit,
};

#[derive(Debug, Parser)]
#[command(
    name = "prompt-enhancer",
    version,
    about = "Turn a rough feature request into a structured YAML prompt"
)]
struct Args {
    /// Free-text description of the task.
    #[arg(required_unless_present = "last")]
    text: Option<String>,

    /// Target length of the prompt: 100, 200, 300 or 500 words.
    #[arg(short, long, default_value_t = 200)]
    word_limit: u32,

    /// CSS selector of the element the task is about.
    #[arg(short, long)]
    selector: Option<String>,

    /// Tech-stack selection as `category=item,item` (repeatable).
    #[arg(long = "stack", value_name = "CATEGORY=ITEMS")]
    stack: Vec<String>,

    /// Run the same request this many times (later runs hit the cache).
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// SQLite file for remembering inputs and the last result.
    #[arg(long, env = "PROMPT_ENHANCER_STATE_DB")]
    state_db: Option<PathBuf>,

    /// Print the last saved result instead of calling the API.
    #[arg(long)]
    last: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

fn parse_stack(entries: &[String]) -> Result<TechStack, EnhanceError> {
    let mut stack = TechStack::new();
    for entry in entries {
        let (category, items) = entry.split_once('=').ok_or_else(|| {
            EnhanceError::Validation(vec![prompt_enhancer::FieldError::new(
                "tech_stack",
                format!("expected category=item,item but got {entry:?}"),
            )])
        })?;
        stack = stack.with(category, items.split(','));
    }
    Ok(stack)
}

async fn run(args: Args) -> Result<(), EnhanceError> {
    let mut config = EnhancerConfig::from_env();
    if args.state_db.is_some() {
        config.state_db = args.state_db.clone();
    }

    let store = match config.state_db.as_deref() {
        Some(path) => match StateStore::open(path) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(error = %e, "state store unavailable, continuing without persistence");
                None
            }
        },
        None => None,
    };

    if args.last {
        let last = store
            .as_ref()
            .and_then(|s| s.load::<Option<EnhanceResult>>());
        match last {
            Some(result) => print!("{}", result.payload),
            None => eprintln!("no saved result"),
        }
        return Ok(());
    }

    let text = args.text.unwrap_or_default();
    let word_limit = WordLimit::try_from(args.word_limit)?;
    let tech_stack = parse_stack(&args.stack)?;
    let mut params =
        RequestParams::new(text.clone(), word_limit).with_tech_stack(tech_stack.clone());
    if let Some(selector) = args.selector.clone() {
        params = params.with_selector(selector);
    }
    params.validate()?;

    let enhancer = Enhancer::from_config(&config)?;

    let mut last = None;
    for _ in 0..args.repeat.max(1) {
        let result = enhancer.enhance(&params).await?;
        if let Some(t) = &result.translation {
            info!(
                lang = %t.detected_language_code,
                translated = t.was_translated,
                "input language {}",
                t.detected_language_name
            );
        }
        info!(
            duration_ms = result.metrics.duration_ms,
            cache_hit = result.metrics.cache_hit,
            "request finished"
        );
        last = Some(result);
    }

    if let Some(result) = &last {
        print!("{}", result.payload);
    }

    let metrics = enhancer.metrics();
    info!(hit_rate = metrics.cache_hit_rate(), summary = ?metrics.summary(), "session metrics");

    if let Some(store) = &store {
        let form = FormInputs {
            text,
            word_limit,
            selector_path: args.selector,
        };
        let saved = store
            .save(&form)
            .and_then(|_| store.save(&tech_stack))
            .and_then(|_| store.save(&last));
        if let Err(e) = saved {
            warn!(error = %e, "failed to persist state");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.json_logs);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(EnhanceError::Parse { message, raw }) => {
            error!(%message, "model output was not valid YAML");
            eprintln!("error: could not parse model output: {message}\n--- raw output ---\n{raw}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "enhancement failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
