//! Heuristic language detection.
//! Each supported language is a row in a static table of typed signatures:
//! script ranges weigh most, diacritics less, shared-alphabet function words
//! least. Scores are normalized by word count and the best-scoring language
//! wins; ties go to the earlier table row. This is a heuristic, not a
//! statistical identifier: short or mixed text can misfire.

pub mod translate;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Minimum normalized score for a non-English detection to trigger translation.
pub const TRANSLATION_THRESHOLD: f32 = 0.3;

const SCRIPT_WEIGHT: f32 = 3.0;
const DIACRITIC_WEIGHT: f32 = 1.5;
const WORD_WEIGHT: f32 = 1.0;

/// One kind of evidence for a language. Patterns are regex sources.
#[derive(Debug, Clone, Copy)]
pub enum Signature {
    /// Characters from a script (mostly) exclusive to the language.
    Script(&'static str),
    /// Accented letters typical for the language.
    Diacritics(&'static str),
    /// Common function words, matched case-insensitively on word boundaries.
    FunctionWords(&'static [&'static str]),
}

impl Signature {
    fn weight(&self) -> f32 {
        match self {
            Signature::Script(_) => SCRIPT_WEIGHT,
            Signature::Diacritics(_) => DIACRITIC_WEIGHT,
            Signature::FunctionWords(_) => WORD_WEIGHT,
        }
    }

    fn compile(&self) -> Regex {
        let source = match self {
            Signature::Script(class) | Signature::Diacritics(class) => class.to_string(),
            Signature::FunctionWords(words) => format!(r"(?i)\b(?:{})\b", words.join("|")),
        };
        // Table entries are constants; a bad one is a programming error.
        Regex::new(&source).unwrap_or_else(|e| panic!("invalid language signature {source}: {e}"))
    }
}

pub struct LanguageProfile {
    pub code: &'static str,
    pub name: &'static str,
    pub signatures: &'static [Signature],
}

/// Supported languages. English first so it wins ties.
pub static PROFILES: &[LanguageProfile] = &[
    LanguageProfile {
        code: "en",
        name: "English",
        signatures: &[Signature::FunctionWords(&[
            "the", "and", "of", "in", "on", "to", "is", "a", "an", "with", "for", "that", "this", "add", "create",
        ])],
    },
    LanguageProfile {
        code: "es",
        name: "Spanish",
        signatures: &[
            Signature::Diacritics(r"[ñáéíóúü¿¡]"),
            Signature::FunctionWords(&["el", "la", "los", "las", "de", "que", "y", "una", "para", "con", "por", "crear"]),
        ],
    },
    LanguageProfile {
        code: "fr",
        name: "French",
        signatures: &[
            Signature::Diacritics(r"[àâçéèêëîïôûùüÿœæ]"),
            Signature::FunctionWords(&["le", "la", "les", "des", "du", "et", "une", "pour", "avec", "est", "dans", "créer"]),
        ],
    },
    LanguageProfile {
        code: "de",
        name: "German",
        signatures: &[
            Signature::Diacritics(r"[äöüß]"),
            Signature::FunctionWords(&["der", "die", "das", "und", "ist", "ein", "eine", "mit", "für", "nicht", "erstellen"]),
        ],
    },
    LanguageProfile {
        code: "pt",
        name: "Portuguese",
        signatures: &[
            Signature::Diacritics(r"[ãõâêôáéíóúç]"),
            Signature::FunctionWords(&["o", "os", "as", "do", "da", "um", "uma", "não", "com", "para", "criar"]),
        ],
    },
    LanguageProfile {
        code: "it",
        name: "Italian",
        signatures: &[
            Signature::Diacritics(r"[àèéìòù]"),
            Signature::FunctionWords(&["il", "lo", "gli", "della", "che", "e", "un", "una", "per", "con", "creare"]),
        ],
    },
    LanguageProfile {
        code: "ru",
        name: "Russian",
        signatures: &[
            Signature::Script(r"[\x{0400}-\x{04FF}]"),
            Signature::FunctionWords(&["и", "в", "на", "не", "что", "как", "с", "для"]),
        ],
    },
    LanguageProfile {
        code: "ja",
        name: "Japanese",
        signatures: &[Signature::Script(r"[\x{3040}-\x{30FF}]")],
    },
    LanguageProfile {
        code: "zh",
        name: "Chinese",
        signatures: &[Signature::Script(r"[\x{4E00}-\x{9FFF}]")],
    },
    LanguageProfile {
        code: "ko",
        name: "Korean",
        signatures: &[Signature::Script(r"[\x{AC00}-\x{D7AF}\x{1100}-\x{11FF}]")],
    },
    LanguageProfile {
        code: "ar",
        name: "Arabic",
        signatures: &[Signature::Script(r"[\x{0600}-\x{06FF}]")],
    },
    LanguageProfile {
        code: "hi",
        name: "Hindi",
        signatures: &[Signature::Script(r"[\x{0900}-\x{097F}]")],
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub language_code: String,
    pub language_name: String,
    /// Normalized top score clamped to [0, 1].
    pub confidence: f32,
    pub needs_translation: bool,
}

impl Detection {
    fn english(confidence: f32) -> Self {
        Self {
            language_code: "en".into(),
            language_name: "English".into(),
            confidence,
            needs_translation: false,
        }
    }

    pub fn is_english(&self) -> bool {
        self.language_code == "en"
    }
}

struct CompiledProfile {
    profile: &'static LanguageProfile,
    matchers: Vec<(Regex, f32)>,
}

pub struct LanguageDetector {
    profiles: Vec<CompiledProfile>,
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new(PROFILES)
    }
}

impl LanguageDetector {
    pub fn new(table: &'static [LanguageProfile]) -> Self {
        let profiles = table
            .iter()
            .map(|profile| CompiledProfile {
                profile,
                matchers: profile
                    .signatures
                    .iter()
                    .map(|s| (s.compile(), s.weight()))
                    .collect(),
            })
            .collect();
        Self { profiles }
    }

    /// Score `text` against every profile and pick the best.
    /// Text with no signal at all is reported as English with zero confidence.
    pub fn detect(&self, text: &str) -> Detection {
        let words = text.split_whitespace().count().max(1) as f32;

        let mut best: Option<(&LanguageProfile, f32)> = None;
        for compiled in &self.profiles {
            let raw: f32 = compiled
                .matchers
                .iter()
                .map(|(re, weight)| re.find_iter(text).count() as f32 * weight)
                .sum();
            let score = raw / words;
            if score > 0.0 && best.map_or(true, |(_, top)| score > top) {
                best = Some((compiled.profile, score));
            }
        }

        let Some((profile, score)) = best else {
            return Detection::english(0.0);
        };
        let confidence = score.min(1.0);
        if profile.code == "en" {
            return Detection::english(confidence);
        }
        Detection {
            language_code: profile.code.into(),
            language_name: profile.name.into(),
            confidence,
            needs_translation: score > TRANSLATION_THRESHOLD,
        }
    }
}

static DEFAULT_DETECTOR: Lazy<LanguageDetector> = Lazy::new(LanguageDetector::default);

/// Detect with the built-in language table.
pub fn detect(text: &str) -> Detection {
    DEFAULT_DETECTOR.detect(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_stop_words_need_no_translation() {
        let d = detect("the and of in on");
        assert_eq!(d.language_code, "en");
        assert!(!d.needs_translation);
        assert!(d.confidence > 0.9);
    }

    #[test]
    fn cyrillic_is_detected_as_non_english() {
        let d = detect("привет как дела");
        assert_eq!(d.language_code, "ru");
        assert_eq!(d.language_name, "Russian");
        assert!(d.needs_translation);
        assert!(d.confidence <= 1.0);
    }

    #[test]
    fn script_ranges_identify_cjk() {
        assert_eq!(detect("ログインフォームを追加").language_code, "ja");
        assert_eq!(detect("添加登录表单").language_code, "zh");
        assert_eq!(detect("로그인 양식 추가").language_code, "ko");
        assert_eq!(detect("أضف نموذج تسجيل الدخول").language_code, "ar");
    }

    #[test]
    fn spanish_sentence_with_diacritics() {
        let d = detect("crear un formulario de inicio de sesión para la página");
        assert_eq!(d.language_code, "es");
        assert!(d.needs_translation);
    }

    #[test]
    fn weak_foreign_signal_stays_below_threshold() {
        // One Spanish function word among many unmatched tokens.
        let d = detect("login form widget dashboard sidebar el");
        assert_eq!(d.language_code, "es");
        assert!(d.confidence <= TRANSLATION_THRESHOLD);
        assert!(!d.needs_translation);
    }

    #[test]
    fn no_signal_defaults_to_english() {
        let d = detect("12345 !!!");
        assert_eq!(d, Detection::english(0.0));
        assert_eq!(detect("").language_code, "en");
    }

    #[test]
    fn custom_table_is_honored() {
        static ONLY_GERMAN: &[LanguageProfile] = &[LanguageProfile {
            code: "de",
            name: "German",
            signatures: &[Signature::FunctionWords(&["und"])],
        }];
        let detector = LanguageDetector::new(ONLY_GERMAN);
        let d = detector.detect("katze und hund");
        assert_eq!(d.language_code, "de");
        assert!(d.needs_translation);
    }
}
