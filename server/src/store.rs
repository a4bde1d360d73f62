//! Durable document store for per-user placement statistics
//!
//! The on-disk document is a JSON object with one key per user id, each
//! holding an object keyed by surface id:
//!
//! ```json
//! {
//!   "_settings": { "wait": 30 },
//!   "alice": { "canvas": { "timestamp": 1700000000000, "placements": 4, "replacements": 1 } }
//! }
//! ```
//!
//! In memory the document is the typed [`StatsDocument`]; the JSON shape only
//! exists at the load/save boundary. Loading converts one field at a time, so
//! a malformed value only resets itself and never the rest of the document.

use crate::error::StoreError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared::{SurfaceId, SurfaceStats, UserId, DEFAULT_WAIT_SECONDS};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

const SETTINGS_KEY: &str = "_settings";

/// Tunables persisted alongside the statistics under `_settings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Cooldown in seconds between two commits by the same user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<u64>,
}

impl Settings {
    pub fn wait_seconds(&self) -> u64 {
        self.wait.unwrap_or(DEFAULT_WAIT_SECONDS)
    }

    fn from_json(value: &Value) -> Self {
        let Value::Object(fields) = value else {
            warn!("Ignoring malformed {}: {}", SETTINGS_KEY, value);
            return Self::default();
        };

        let wait = match fields.get("wait") {
            None | Some(Value::Null) => None,
            Some(raw) => {
                let wait = raw.as_u64();
                if wait.is_none() {
                    warn!("Ignoring invalid {}/wait: {}", SETTINGS_KEY, raw);
                }
                wait
            }
        };
        Self { wait }
    }
}

/// All counters of one user, keyed by surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserStats {
    surfaces: BTreeMap<SurfaceId, SurfaceStats>,
}

impl UserStats {
    /// Counters for `surface`, zeroed if the user never acted there.
    pub fn surface(&self, surface: &str) -> SurfaceStats {
        self.surfaces.get(surface).copied().unwrap_or_default()
    }

    pub fn timestamp(&self, surface: &str) -> i64 {
        self.surface(surface).timestamp
    }

    pub fn set_timestamp(&mut self, surface: &str, millis: i64) {
        self.entry(surface).timestamp = millis;
    }

    pub fn inc_placements(&mut self, surface: &str) {
        let stats = self.entry(surface);
        stats.placements = stats.placements.saturating_add(1);
    }

    pub fn inc_replacements(&mut self, surface: &str) {
        let stats = self.entry(surface);
        stats.replacements = stats.replacements.saturating_add(1);
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    fn entry(&mut self, surface: &str) -> &mut SurfaceStats {
        self.surfaces.entry(surface.to_string()).or_default()
    }

    fn from_json(user: &str, value: &Value) -> Option<Self> {
        let Value::Object(surfaces) = value else {
            warn!("Ignoring malformed stats of {}: {}", user, value);
            return None;
        };

        let mut stats = Self::default();
        for (surface, raw) in surfaces {
            let Value::Object(fields) = raw else {
                warn!("Ignoring malformed stats of {} on {}: {}", user, surface, raw);
                continue;
            };
            let path = format!("{}/{}", user, surface);
            stats.surfaces.insert(
                surface.clone(),
                SurfaceStats {
                    timestamp: field(fields, &path, "timestamp", Value::as_i64),
                    placements: field(fields, &path, "placements", as_counter),
                    replacements: field(fields, &path, "replacements", as_counter),
                },
            );
        }
        Some(stats)
    }
}

/// Reads one counter field, resetting absent or invalid values to zero.
fn field<T: Default>(
    fields: &Map<String, Value>,
    path: &str,
    name: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> T {
    match fields.get(name) {
        None | Some(Value::Null) => T::default(),
        Some(raw) => convert(raw).unwrap_or_else(|| {
            warn!("Resetting {}/{} from invalid value {}", path, name, raw);
            T::default()
        }),
    }
}

fn as_counter(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|count| u32::try_from(count).ok())
}

/// Root of the durable statistics tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDocument {
    #[serde(rename = "_settings", default)]
    pub settings: Settings,
    #[serde(flatten)]
    pub users: BTreeMap<UserId, UserStats>,
}

impl StatsDocument {
    /// Copy of the user's subtree, or an empty one.
    pub fn user(&self, user: &str) -> UserStats {
        self.users.get(user).cloned().unwrap_or_default()
    }

    /// Builds a document from parsed JSON, falling back to defaults per field.
    ///
    /// Returns `None` only if the top level is not an object.
    pub fn from_json(value: Value) -> Option<Self> {
        let entries: Map<String, Value> = match value {
            Value::Object(entries) => entries,
            _ => return None,
        };

        let mut document = Self::default();
        for (key, entry) in &entries {
            if key == SETTINGS_KEY {
                document.settings = Settings::from_json(entry);
            } else if let Some(stats) = UserStats::from_json(key, entry) {
                document.put_user(key, &stats);
            }
        }
        Some(document)
    }

    /// Replaces the user's subtree. Empty subtrees are not stored.
    pub fn put_user(&mut self, user: &str, stats: &UserStats) {
        if stats.is_empty() {
            return;
        }
        self.users.insert(user.to_string(), stats.clone());
    }
}

/// Hierarchical store the statistics are loaded from and saved to.
pub trait DocumentStore: Send + Sync {
    fn load(&self) -> Result<StatsDocument, StoreError>;

    fn save(&self, document: &StatsDocument) -> Result<(), StoreError>;

    fn create_empty(&self) -> StatsDocument {
        StatsDocument::default()
    }
}

/// Pretty-printed JSON file, replaced atomically on every save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentStore for JsonFileStore {
    fn load(&self) -> Result<StatsDocument, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("No stats document at {}, starting empty", self.path.display());
                return Ok(self.create_empty());
            }
            Err(err) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    reason: err.to_string(),
                });
            }
        };

        let value = serde_json::from_slice::<Value>(&bytes).map_err(|err| StoreError::Parse {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        StatsDocument::from_json(value).ok_or_else(|| StoreError::Parse {
            path: self.path.clone(),
            reason: "top level is not an object".to_string(),
        })
    }

    fn save(&self, document: &StatsDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| StoreError::Write {
                path: parent.to_path_buf(),
                reason: err.to_string(),
            })?;
        }

        let bytes = serde_json::to_vec_pretty(document).map_err(|err| StoreError::Serialize {
            reason: err.to_string(),
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, bytes).map_err(|err| StoreError::Write {
            path: temp_path.clone(),
            reason: err.to_string(),
        })?;
        fs::rename(&temp_path, &self.path).map_err(|err| StoreError::Write {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        Ok(())
    }
}

/// In-process store with switchable failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Option<StatsDocument>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: StatsDocument) -> Self {
        let store = Self::default();
        *store.lock() = Some(document);
        store
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Last successfully saved document.
    pub fn saved(&self) -> Option<StatsDocument> {
        self.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<StatsDocument>> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self) -> Result<StatsDocument, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Read {
                path: PathBuf::from("memory"),
                reason: "load failure injected".to_string(),
            });
        }
        Ok(self.lock().clone().unwrap_or_default())
    }

    fn save(&self, document: &StatsDocument) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Write {
                path: PathBuf::from("memory"),
                reason: "save failure injected".to_string(),
            });
        }
        *self.lock() = Some(document.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
