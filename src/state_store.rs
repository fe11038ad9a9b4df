//! Persisted form state backed by SQLite.
//! Three independent slots (form inputs, tech-stack selection, last result),
//! each stored under its own key with a schema version. Missing, outdated or
//! unreadable slots load as their documented defaults.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::enhance::EnhanceResult;
use crate::request::{TechStack, WordLimit};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("state encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A persisted slot: its storage key and current schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSlot {
    FormInputs,
    TechStackSelection,
    LastResult,
}

impl StateSlot {
    pub const ALL: [StateSlot; 3] = [
        StateSlot::FormInputs,
        StateSlot::TechStackSelection,
        StateSlot::LastResult,
    ];

    pub fn storage_key(self) -> &'static str {
        match self {
            StateSlot::FormInputs => "prompt-enhancer:form-inputs",
            StateSlot::TechStackSelection => "prompt-enhancer:tech-stack",
            StateSlot::LastResult => "prompt-enhancer:last-result",
        }
    }

    pub fn version(self) -> u32 {
        match self {
            StateSlot::FormInputs => 1,
            StateSlot::TechStackSelection => 1,
            StateSlot::LastResult => 1,
        }
    }
}

/// Last-used form fields. Defaults: empty text, 200 words, no selector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormInputs {
    pub text: String,
    pub word_limit: WordLimit,
    pub selector_path: Option<String>,
}

/// Values that can live in a slot.
pub trait SlotValue: Serialize + DeserializeOwned + Default {
    const SLOT: StateSlot;
}

impl SlotValue for FormInputs {
    const SLOT: StateSlot = StateSlot::FormInputs;
}

impl SlotValue for TechStack {
    const SLOT: StateSlot = StateSlot::TechStackSelection;
}

/// `None` until a first result is saved.
impl SlotValue for Option<EnhanceResult> {
    const SLOT: StateSlot = StateSlot::LastResult;
}

pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Open (or create) the state database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StateError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::init(conn)?;
        info!(path = %db_path.display(), "state store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StateError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StateError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS app_state (
                storage_key TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn save<T: SlotValue>(&self, value: &T) -> Result<(), StateError> {
        self.save_raw(T::SLOT.storage_key(), T::SLOT.version(), &serde_json::to_string(value)?)
    }

    fn save_raw(&self, key: &str, version: u32, value: &str) -> Result<(), StateError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO app_state (storage_key, version, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, version, value, now_unix()],
        )?;
        debug!(key, "state slot saved");
        Ok(())
    }

    /// Load a slot, falling back to `T::default()` when it is absent,
    /// written by another schema version, or undecodable.
    pub fn load<T: SlotValue>(&self) -> T {
        let slot = T::SLOT;
        let row: Result<Option<(u32, String)>, _> = self
            .conn
            .lock()
            .query_row(
                "SELECT version, value FROM app_state WHERE storage_key = ?1",
                params![slot.storage_key()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional();

        match row {
            Ok(Some((version, value))) if version == slot.version() => {
                serde_json::from_str(&value).unwrap_or_else(|e| {
                    warn!(key = slot.storage_key(), error = %e, "corrupt state slot, using default");
                    T::default()
                })
            }
            Ok(Some((version, _))) => {
                debug!(key = slot.storage_key(), version, "outdated state slot, using default");
                T::default()
            }
            Ok(None) => T::default(),
            Err(e) => {
                warn!(key = slot.storage_key(), error = %e, "state read failed, using default");
                T::default()
            }
        }
    }

    pub fn clear(&self, slot: StateSlot) -> Result<(), StateError> {
        self.conn.lock().execute(
            "DELETE FROM app_state WHERE storage_key = ?1",
            params![slot.storage_key()],
        )?;
        Ok(())
    }

    pub fn clear_all(&self) -> Result<(), StateError> {
        for slot in StateSlot::ALL {
            self.clear(slot)?;
        }
        Ok(())
    }
}

/// Current time as Unix timestamp (seconds).
fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enhance::ResultMetrics;

    fn sample_result() -> EnhanceResult {
        EnhanceResult {
            payload: "task:\n  summary: x\n".into(),
            translation: None,
            metrics: ResultMetrics {
                duration_ms: 12.5,
                cache_hit: false,
            },
        }
    }

    #[test]
    fn absent_slots_load_defaults() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.load::<FormInputs>(), FormInputs::default());
        assert_eq!(store.load::<FormInputs>().word_limit, WordLimit::W200);
        assert!(store.load::<TechStack>().is_empty());
        assert!(store.load::<Option<EnhanceResult>>().is_none());
    }

    #[test]
    fn slots_round_trip_and_clear_independently() {
        let store = StateStore::open_in_memory().unwrap();
        let form = FormInputs {
            text: "add a login form".into(),
            word_limit: WordLimit::W300,
            selector_path: Some("#app".into()),
        };
        let stack = TechStack::new().with("frontend", ["React"]);
        store.save(&form).unwrap();
        store.save(&stack).unwrap();
        store.save(&Some(sample_result())).unwrap();

        assert_eq!(store.load::<FormInputs>(), form);
        assert_eq!(store.load::<TechStack>(), stack);
        assert_eq!(store.load::<Option<EnhanceResult>>(), Some(sample_result()));

        store.clear(StateSlot::FormInputs).unwrap();
        assert_eq!(store.load::<FormInputs>(), FormInputs::default());
        assert_eq!(store.load::<TechStack>(), stack);

        store.clear_all().unwrap();
        assert!(store.load::<Option<EnhanceResult>>().is_none());
    }

    #[test]
    fn outdated_or_corrupt_slots_fall_back() {
        let store = StateStore::open_in_memory().unwrap();
        let key = StateSlot::FormInputs.storage_key();

        store.save_raw(key, 0, r#"{"text":"old","word_limit":100,"selector_path":null}"#).unwrap();
        assert_eq!(store.load::<FormInputs>(), FormInputs::default());

        store.save_raw(key, StateSlot::FormInputs.version(), "{not json").unwrap();
        assert_eq!(store.load::<FormInputs>(), FormInputs::default());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let store = StateStore::open(&path).unwrap();
            store.save(&TechStack::new().with("database", ["Postgres"])).unwrap();
        }
        let store = StateStore::open(&path).unwrap();
        assert!(!store.load::<TechStack>().is_empty());
    }
}
