//! Best-effort translation of non-English input into English.
//! Strategies are tried in order until one changes the text; if none does,
//! the original text is passed through with an instruction appended. Every
//! strategy failure is logged and swallowed: translation never blocks the
//! enhancement itself.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Detection;
use crate::enhance::transport::RetryingTransport;

/// Appended to untranslated text so the model still answers in English.
pub const PASSTHROUGH_INSTRUCTION: &str =
    "\n\n(Note: the description above may not be in English. Interpret it in its original language and write the result in English.)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationInfo {
    pub original_text: String,
    pub translated_text: String,
    pub detected_language_code: String,
    pub detected_language_name: String,
    pub was_translated: bool,
    pub confidence: f32,
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("provider not configured")]
    NotConfigured,
    #[error("no dictionary for language {0}")]
    UnsupportedLanguage(String),
    #[error("provider failed: {0}")]
    Provider(String),
}

#[async_trait]
pub trait TranslationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn translate(&self, text: &str, detection: &Detection) -> Result<String, TranslateError>;
}

/// Asks the same chat-completion endpoint used for enhancement.
pub struct LlmTranslation {
    transport: Arc<RetryingTransport>,
    model: String,
    cancel: CancellationToken,
}

impl LlmTranslation {
    pub fn new(transport: Arc<RetryingTransport>, model: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            transport,
            model: model.into(),
            cancel,
        }
    }
}

#[async_trait]
impl TranslationStrategy for LlmTranslation {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn translate(&self, text: &str, detection: &Detection) -> Result<String, TranslateError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": format!(
                        "Translate the user's {} text into English. Output only the translation.",
                        detection.language_name
                    )
                },
                {"role": "user", "content": text}
            ],
            "temperature": 0,
            "max_tokens": (text.chars().count() as u32 * 2).max(500),
        });
        let out = self
            .transport
            .send(&body, &self.cancel)
            .await
            .map_err(|e| TranslateError::Provider(e.to_string()))?;
        Ok(out.trim().to_string())
    }
}

/// Slot for a dedicated translation service. No provider is wired up, so it
/// always defers to the next strategy.
pub struct AlternateProvider;

#[async_trait]
impl TranslationStrategy for AlternateProvider {
    fn name(&self) -> &'static str {
        "alternate"
    }

    async fn translate(&self, _text: &str, _detection: &Detection) -> Result<String, TranslateError> {
        Err(TranslateError::NotConfigured)
    }
}

/// Word-for-word substitution from a tiny built-in dictionary.
/// The input is lowercased before substitution, so original casing is lost.
pub struct DictionaryTranslation {
    tables: Vec<(&'static str, Vec<(Regex, &'static str)>)>,
}

static DICTIONARY: &[(&str, &[(&str, &str)])] = &[
    (
        "es",
        &[
            ("inicio de sesión", "login"),
            ("formulario", "form"),
            ("crear", "create"),
            ("añadir", "add"),
            ("agregar", "add"),
            ("botón", "button"),
            ("página", "page"),
            ("usuario", "user"),
            ("contraseña", "password"),
            ("un", "a"),
            ("una", "a"),
            ("de", "of"),
            ("para", "for"),
            ("con", "with"),
        ],
    ),
    (
        "fr",
        &[
            ("formulaire de connexion", "login form"),
            ("formulaire", "form"),
            ("créer", "create"),
            ("ajouter", "add"),
            ("bouton", "button"),
            ("utilisateur", "user"),
            ("mot de passe", "password"),
            ("un", "a"),
            ("une", "a"),
            ("pour", "for"),
            ("avec", "with"),
        ],
    ),
    (
        "de",
        &[
            ("anmeldeformular", "login form"),
            ("formular", "form"),
            ("erstellen", "create"),
            ("hinzufügen", "add"),
            ("schaltfläche", "button"),
            ("seite", "page"),
            ("benutzer", "user"),
            ("passwort", "password"),
            ("ein", "a"),
            ("eine", "a"),
            ("für", "for"),
            ("mit", "with"),
        ],
    ),
    (
        "ru",
        &[
            ("форма входа", "login form"),
            ("форму", "form"),
            ("форма", "form"),
            ("добавить", "add"),
            ("создать", "create"),
            ("кнопка", "button"),
            ("кнопку", "button"),
            ("страница", "page"),
            ("пользователь", "user"),
            ("пароль", "password"),
            ("привет", "hello"),
            ("для", "for"),
            ("с", "with"),
        ],
    ),
];

impl Default for DictionaryTranslation {
    fn default() -> Self {
        let tables = DICTIONARY
            .iter()
            .map(|(code, entries)| {
                let compiled = entries
                    .iter()
                    .map(|(from, to)| {
                        let re = Regex::new(&format!(r"\b{}\b", regex::escape(from)))
                            .unwrap_or_else(|e| panic!("invalid dictionary entry {from}: {e}"));
                        (re, *to)
                    })
                    .collect();
                (*code, compiled)
            })
            .collect();
        Self { tables }
    }
}

#[async_trait]
impl TranslationStrategy for DictionaryTranslation {
    fn name(&self) -> &'static str {
        "dictionary"
    }

    async fn translate(&self, text: &str, detection: &Detection) -> Result<String, TranslateError> {
        let (_, entries) = self
            .tables
            .iter()
            .find(|(code, _)| *code == detection.language_code)
            .ok_or_else(|| TranslateError::UnsupportedLanguage(detection.language_code.clone()))?;

        let mut out = text.to_lowercase();
        for (re, replacement) in entries {
            out = re.replace_all(&out, *replacement).into_owned();
        }
        Ok(out)
    }
}

/// Ordered strategy chain with passthrough fallback.
pub struct Translator {
    strategies: Vec<Box<dyn TranslationStrategy>>,
}

impl Translator {
    pub fn new(strategies: Vec<Box<dyn TranslationStrategy>>) -> Self {
        Self { strategies }
    }

    /// LLM first, then the alternate provider, then the dictionary.
    pub fn standard(transport: Arc<RetryingTransport>, model: &str, cancel: CancellationToken) -> Self {
        Self::new(vec![
            Box::new(LlmTranslation::new(transport, model, cancel)),
            Box::new(AlternateProvider),
            Box::new(DictionaryTranslation::default()),
        ])
    }

    pub async fn translate(&self, text: &str, detection: &Detection) -> TranslationInfo {
        for strategy in &self.strategies {
            match strategy.translate(text, detection).await {
                Ok(translated) if changed(text, &translated) => {
                    debug!(strategy = strategy.name(), lang = %detection.language_code, "text translated");
                    return TranslationInfo {
                        original_text: text.to_string(),
                        translated_text: translated,
                        detected_language_code: detection.language_code.clone(),
                        detected_language_name: detection.language_name.clone(),
                        was_translated: true,
                        confidence: detection.confidence,
                    };
                }
                Ok(_) => debug!(strategy = strategy.name(), "translation left text unchanged"),
                Err(e) => warn!(strategy = strategy.name(), error = %e, "translation strategy failed"),
            }
        }

        TranslationInfo {
            original_text: text.to_string(),
            translated_text: format!("{text}{PASSTHROUGH_INSTRUCTION}"),
            detected_language_code: detection.language_code.clone(),
            detected_language_name: detection.language_name.clone(),
            was_translated: false,
            confidence: detection.confidence,
        }
    }
}

fn changed(original: &str, translated: &str) -> bool {
    let translated = translated.trim();
    !translated.is_empty() && translated != original.trim()
}
