//! Persisted session identity.
//!
//! The host keeps a private key/value area inside each database copy; the
//! session uses it to remember which project, binary, and snapshot the
//! copy belongs to, and the tick it has replayed up to. Old copies used a
//! different key layout; loading migrates them transparently.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::{debug, warn};

/// String key/value storage embedded in the database copy.
pub trait StateStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

/// In-memory store. Clones share the same map, so a test can keep a handle
/// while the session owns the store.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    map: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.borrow().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.map.borrow_mut().insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.map.borrow_mut().remove(key);
    }
}

const KEY_PROJECT: &str = "project";
const KEY_BINARY: &str = "binary";
const KEY_SNAPSHOT: &str = "snapshot";
const KEY_TICK: &str = "tick";

// Pre-rename layout: what is now the project was called "group", the
// binary was "project", and the snapshot was "database".
const OLD_KEY_GROUP: &str = "group";
const OLD_KEY_DATABASE: &str = "database";

/// The identifier triple plus replay tick, as persisted in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub project: Option<String>,
    pub binary: Option<String>,
    pub snapshot: Option<String>,
    pub tick: u64,
}

impl SessionState {
    /// Load from the store, migrating the legacy key layout if present.
    ///
    /// The legacy layout is detected by its `database` key. Migration
    /// remaps the keys, deletes the old ones, and persists once under the
    /// new names; afterwards the copy loads like any other.
    pub fn load(store: &mut impl StateStore) -> Self {
        let state = if store.get(OLD_KEY_DATABASE).is_some() {
            warn!("old session layout detected, migrating");
            let state = Self {
                project: store.get(OLD_KEY_GROUP),
                binary: store.get(KEY_PROJECT),
                snapshot: store.get(OLD_KEY_DATABASE),
                tick: parse_tick(store.get(KEY_TICK)),
            };
            store.remove(OLD_KEY_GROUP);
            store.remove(OLD_KEY_DATABASE);
            store.remove(KEY_PROJECT);
            state.save(store);
            state
        } else {
            Self {
                project: store.get(KEY_PROJECT),
                binary: store.get(KEY_BINARY),
                snapshot: store.get(KEY_SNAPSHOT),
                tick: parse_tick(store.get(KEY_TICK)),
            }
        };
        debug!(
            project = state.project.as_deref().unwrap_or(""),
            binary = state.binary.as_deref().unwrap_or(""),
            snapshot = state.snapshot.as_deref().unwrap_or(""),
            tick = state.tick,
            "loaded session state"
        );
        state
    }

    /// Persist every present field.
    pub fn save(&self, store: &mut impl StateStore) {
        if let Some(project) = &self.project {
            store.set(KEY_PROJECT, project);
        }
        if let Some(binary) = &self.binary {
            store.set(KEY_BINARY, binary);
        }
        if let Some(snapshot) = &self.snapshot {
            store.set(KEY_SNAPSHOT, snapshot);
        }
        store.set(KEY_TICK, &self.tick.to_string());
    }

    /// Remove everything. Used when the dataset is closed.
    pub fn clear(&mut self, store: &mut impl StateStore) {
        store.remove(KEY_PROJECT);
        store.remove(KEY_BINARY);
        store.remove(KEY_SNAPSHOT);
        store.remove(KEY_TICK);
        *self = Self::default();
    }

    /// Whether the identifier triple is complete enough to join.
    pub fn is_complete(&self) -> bool {
        self.project.is_some() && self.binary.is_some() && self.snapshot.is_some()
    }

    /// Point this copy at a snapshot. Changing snapshots resets the tick;
    /// re-selecting the current one keeps it.
    pub fn set_snapshot(&mut self, store: &mut impl StateStore, snapshot: &str) {
        if self.snapshot.as_deref() != Some(snapshot) {
            self.snapshot = Some(snapshot.to_string());
            self.tick = 0;
        }
        self.save(store);
    }

    pub fn set_project(&mut self, store: &mut impl StateStore, project: &str) {
        self.project = Some(project.to_string());
        self.save(store);
    }

    pub fn set_binary(&mut self, store: &mut impl StateStore, binary: &str) {
        self.binary = Some(binary.to_string());
        self.save(store);
    }

    /// Advance the tick after a successful local capture.
    pub fn bump_tick(&mut self, store: &mut impl StateStore) -> u64 {
        self.tick += 1;
        store.set(KEY_TICK, &self.tick.to_string());
        self.tick
    }

    /// Adopt a server-stamped tick after a successful replay.
    pub fn adopt_tick(&mut self, store: &mut impl StateStore, tick: u64) {
        self.tick = tick;
        store.set(KEY_TICK, &self.tick.to_string());
    }
}

fn parse_tick(raw: Option<String>) -> u64 {
    raw.and_then(|s| s.parse().ok()).unwrap_or(0)
}
