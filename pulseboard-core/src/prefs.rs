//! Dashboard preferences - load, normalize, mutate, persist
//!
//! Each collection (layout, goals, saved views, live toggle) is stored as one
//! versioned JSON envelope under its own key.
//!
//! Global invariants enforced:
//! - Every applied mutation is followed by a full write of that collection
//! - Absent, corrupt, or too-new blobs load as defaults (logged, never an error)
//! - Loaded layouts are always normalized against the catalog
//! - Blobs without `schema_version` are read as version 0 and rewritten at the
//!   current version on the next mutation

use crate::goals::{Goal, GoalState};
use crate::layout::{normalize, Column, LayoutState, SectionCatalog};
use crate::store::Store;
use crate::views::{SavedView, SavedViews};
use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub const LAYOUT_KEY: &str = "dashboard_layout";
pub const GOALS_KEY: &str = "dashboard_goals";
pub const VIEWS_KEY: &str = "saved_views";
pub const LIVE_KEY: &str = "live_refresh";

/// Current envelope version written by this crate
pub const PREFS_SCHEMA_VERSION: u32 = 1;

/// Lifecycle of the in-memory preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    Loaded,
    Mutated,
    Persisted,
}

#[derive(Serialize)]
struct LayoutEnvelope<'a> {
    schema_version: u32,
    left: &'a [String],
    right: &'a [String],
}

#[derive(Deserialize)]
struct StoredLayout {
    #[serde(default)]
    schema_version: u32,
    #[serde(default)]
    left: Vec<String>,
    #[serde(default)]
    right: Vec<String>,
}

#[derive(Serialize)]
struct GoalsEnvelope<'a> {
    schema_version: u32,
    goals: &'a GoalState,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredGoals {
    Versioned {
        #[serde(default)]
        schema_version: u32,
        goals: Vec<Goal>,
    },
    Legacy(Vec<Goal>),
}

#[derive(Serialize)]
struct ViewsEnvelope<'a> {
    schema_version: u32,
    views: &'a SavedViews,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredViews {
    Versioned {
        #[serde(default)]
        schema_version: u32,
        views: Vec<SavedView>,
    },
    Legacy(Vec<SavedView>),
}

#[derive(Serialize)]
struct LiveEnvelope {
    schema_version: u32,
    enabled: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredLive {
    Versioned {
        #[serde(default)]
        schema_version: u32,
        enabled: bool,
    },
    Legacy(bool),
}

/// Preferences bound to a store
pub struct DashboardPrefs<S: Store> {
    store: S,
    catalog: SectionCatalog,
    phase: Phase,
    layout: LayoutState,
    goals: GoalState,
    views: SavedViews,
    live: bool,
}

impl<S: Store> DashboardPrefs<S> {
    /// Unloaded preferences holding defaults
    pub fn new(store: S, catalog: SectionCatalog) -> Self {
        let layout = catalog.default_layout();
        DashboardPrefs {
            store,
            catalog,
            phase: Phase::Uninitialized,
            layout,
            goals: GoalState::defaults(),
            views: SavedViews::default(),
            live: false,
        }
    }

    /// Create and load in one step
    pub fn open(store: S, catalog: SectionCatalog) -> Self {
        let mut prefs = Self::new(store, catalog);
        prefs.load();
        prefs
    }

    /// Read every collection back from the store. Never fails: anything
    /// unreadable is replaced with defaults.
    pub fn load(&mut self) {
        self.layout = match self.read_blob::<StoredLayout>(LAYOUT_KEY) {
            Some(stored) if self.supported(LAYOUT_KEY, stored.schema_version) => normalize(
                &LayoutState {
                    left: stored.left,
                    right: stored.right,
                },
                &self.catalog,
            ),
            _ => self.catalog.default_layout(),
        };

        self.goals = match self.read_blob::<StoredGoals>(GOALS_KEY) {
            Some(StoredGoals::Versioned {
                schema_version,
                goals,
            }) if self.supported(GOALS_KEY, schema_version) => merged_goals(goals),
            Some(StoredGoals::Legacy(goals)) => merged_goals(goals),
            _ => GoalState::defaults(),
        };

        self.views = match self.read_blob::<StoredViews>(VIEWS_KEY) {
            Some(StoredViews::Versioned {
                schema_version,
                views,
            }) if self.supported(VIEWS_KEY, schema_version) => SavedViews::new(views),
            Some(StoredViews::Legacy(views)) => SavedViews::new(views),
            _ => SavedViews::default(),
        };

        self.live = match self.read_blob::<StoredLive>(LIVE_KEY) {
            Some(StoredLive::Versioned {
                schema_version,
                enabled,
            }) if self.supported(LIVE_KEY, schema_version) => enabled,
            Some(StoredLive::Legacy(enabled)) => enabled,
            _ => false,
        };

        self.phase = Phase::Loaded;
        debug!(
            sections = self.layout.left.len() + self.layout.right.len(),
            goals = self.goals.goals().len(),
            views = self.views.len(),
            live = self.live,
            "loaded dashboard preferences"
        );
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn catalog(&self) -> &SectionCatalog {
        &self.catalog
    }

    pub fn layout(&self) -> &LayoutState {
        &self.layout
    }

    pub fn goals(&self) -> &GoalState {
        &self.goals
    }

    pub fn views(&self) -> &SavedViews {
        &self.views
    }

    pub fn live(&self) -> bool {
        self.live
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Move a section and persist the layout. Returns `Ok(false)` without
    /// writing when the move does not apply.
    pub fn move_section(&mut self, key: &str, from: Column, to: Column, target: Option<&str>) -> Result<bool> {
        self.ensure_loaded()?;
        if !self.layout.move_section(key, from, to, target) {
            debug!(key, %from, %to, "section move ignored");
            return Ok(false);
        }
        self.persist_layout()?;
        Ok(true)
    }

    pub fn reset_layout(&mut self) -> Result<()> {
        self.ensure_loaded()?;
        self.layout = self.catalog.default_layout();
        self.persist_layout()
    }

    pub fn set_goal(&mut self, metric_key: &str, target: f64) -> Result<()> {
        self.ensure_loaded()?;
        if metric_key.trim().is_empty() {
            bail!("goal metric key must not be empty");
        }
        if !target.is_finite() {
            bail!("goal target for '{}' must be a finite number", metric_key);
        }
        self.goals.set(metric_key, target);
        self.persist_goals()
    }

    pub fn save_view(&mut self, name: &str, value: Value) -> Result<()> {
        self.ensure_loaded()?;
        if name.trim().is_empty() {
            bail!("view name must not be empty");
        }
        self.views.save(name, value);
        self.persist_views()
    }

    /// Returns `Ok(false)` without writing when no view has that name
    pub fn delete_view(&mut self, name: &str) -> Result<bool> {
        self.ensure_loaded()?;
        if !self.views.delete(name) {
            return Ok(false);
        }
        self.persist_views()?;
        Ok(true)
    }

    pub fn set_live(&mut self, enabled: bool) -> Result<()> {
        self.ensure_loaded()?;
        self.live = enabled;
        let blob = serde_json::to_string_pretty(&LiveEnvelope {
            schema_version: PREFS_SCHEMA_VERSION,
            enabled,
        });
        self.write(LIVE_KEY, blob)
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.phase == Phase::Uninitialized {
            bail!("dashboard preferences must be loaded before they are changed");
        }
        Ok(())
    }

    fn persist_layout(&mut self) -> Result<()> {
        let blob = serde_json::to_string_pretty(&LayoutEnvelope {
            schema_version: PREFS_SCHEMA_VERSION,
            left: &self.layout.left,
            right: &self.layout.right,
        });
        self.write(LAYOUT_KEY, blob)
    }

    fn persist_goals(&mut self) -> Result<()> {
        let blob = serde_json::to_string_pretty(&GoalsEnvelope {
            schema_version: PREFS_SCHEMA_VERSION,
            goals: &self.goals,
        });
        self.write(GOALS_KEY, blob)
    }

    fn persist_views(&mut self) -> Result<()> {
        let blob = serde_json::to_string_pretty(&ViewsEnvelope {
            schema_version: PREFS_SCHEMA_VERSION,
            views: &self.views,
        });
        self.write(VIEWS_KEY, blob)
    }

    /// Phase stays `Mutated` if the write fails
    fn write(&mut self, key: &str, blob: serde_json::Result<String>) -> Result<()> {
        self.phase = Phase::Mutated;
        let blob = blob.with_context(|| format!("failed to serialize {key}"))?;
        self.store
            .set(key, &blob)
            .with_context(|| format!("failed to persist {key}"))?;
        self.phase = Phase::Persisted;
        Ok(())
    }

    fn read_blob<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %format!("{e:#}"), "failed to read stored preferences, using defaults");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "corrupt stored preferences, using defaults");
                None
            }
        }
    }

    fn supported(&self, key: &str, version: u32) -> bool {
        if version > PREFS_SCHEMA_VERSION {
            warn!(
                key,
                version,
                supported = PREFS_SCHEMA_VERSION,
                "stored preferences are from a newer version, using defaults"
            );
            return false;
        }
        if version < PREFS_SCHEMA_VERSION {
            debug!(key, version, "reading legacy preferences blob");
        }
        true
    }
}

fn merged_goals(goals: Vec<Goal>) -> GoalState {
    let mut state = GoalState::new(goals.into_iter().filter(|g| g.target.is_finite()).collect());
    state.merge_defaults();
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::WEEKLY_QUERIES;
    use crate::store::MemoryStore;
    use serde_json::json;

    struct ReadOnlyStore(MemoryStore);

    impl Store for ReadOnlyStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.get(key)
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<()> {
            bail!("store is read-only")
        }

        fn remove(&mut self, _key: &str) -> Result<()> {
            bail!("store is read-only")
        }
    }

    fn catalog() -> SectionCatalog {
        SectionCatalog::new(vec!["a".into(), "b".into()], vec!["x".into(), "y".into()]).unwrap()
    }

    #[test]
    fn test_first_load_uses_defaults() {
        let mut prefs = DashboardPrefs::new(MemoryStore::new(), catalog());
        assert_eq!(prefs.phase(), Phase::Uninitialized);
        prefs.load();
        assert_eq!(prefs.phase(), Phase::Loaded);
        assert_eq!(prefs.layout(), &catalog().default_layout());
        assert_eq!(prefs.goals(), &GoalState::defaults());
        assert!(prefs.views().is_empty());
        assert!(!prefs.live());
    }

    #[test]
    fn test_mutation_requires_load() {
        let mut prefs = DashboardPrefs::new(MemoryStore::new(), catalog());
        assert!(prefs.set_live(true).is_err());
        assert_eq!(prefs.phase(), Phase::Uninitialized);
    }

    #[test]
    fn test_move_persists_and_reloads() {
        let mut prefs = DashboardPrefs::open(MemoryStore::new(), catalog());
        assert!(prefs.move_section("a", Column::Left, Column::Right, Some("y")).unwrap());
        assert_eq!(prefs.phase(), Phase::Persisted);

        let reloaded = DashboardPrefs::open(prefs.into_store(), catalog());
        assert_eq!(reloaded.layout().left, vec!["b"]);
        assert_eq!(reloaded.layout().right, vec!["x", "a", "y"]);
    }

    #[test]
    fn test_ignored_move_does_not_write() {
        let mut prefs = DashboardPrefs::open(MemoryStore::new(), catalog());
        assert!(!prefs.move_section("x", Column::Left, Column::Right, None).unwrap());
        assert_eq!(prefs.phase(), Phase::Loaded);
        assert_eq!(prefs.store().get(LAYOUT_KEY).unwrap(), None);
    }

    #[test]
    fn test_corrupt_blob_falls_back_to_defaults() {
        let store = MemoryStore::new()
            .with_entry(LAYOUT_KEY, "{not json")
            .with_entry(GOALS_KEY, "42")
            .with_entry(VIEWS_KEY, r#"{"views": "nope"}"#);
        let prefs = DashboardPrefs::open(store, catalog());
        assert_eq!(prefs.layout(), &catalog().default_layout());
        assert_eq!(prefs.goals(), &GoalState::defaults());
        assert!(prefs.views().is_empty());
    }

    #[test]
    fn test_newer_schema_version_ignored() {
        let store = MemoryStore::new().with_entry(
            LAYOUT_KEY,
            r#"{"schema_version": 99, "left": ["y"], "right": ["a"]}"#,
        );
        let prefs = DashboardPrefs::open(store, catalog());
        assert_eq!(prefs.layout(), &catalog().default_layout());
    }

    #[test]
    fn test_legacy_layout_normalized_and_upgraded() {
        let store = MemoryStore::new().with_entry(LAYOUT_KEY, r#"{"left": ["y", "gone"], "right": ["a"]}"#);
        let mut prefs = DashboardPrefs::open(store, catalog());
        assert_eq!(prefs.layout().left, vec!["y", "b"]);
        assert_eq!(prefs.layout().right, vec!["a", "x"]);

        prefs.reset_layout().unwrap();
        let raw = prefs.store().get(LAYOUT_KEY).unwrap().unwrap();
        let stored: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored["schema_version"], json!(PREFS_SCHEMA_VERSION));
        assert_eq!(stored["left"], json!(["a", "b"]));
    }

    #[test]
    fn test_legacy_views_and_live_flag() {
        let store = MemoryStore::new()
            .with_entry(VIEWS_KEY, r#"[{"name": "errors", "value": {"status": "5xx"}}]"#)
            .with_entry(LIVE_KEY, "true");
        let prefs = DashboardPrefs::open(store, catalog());
        assert_eq!(prefs.views().get("errors"), Some(&json!({"status": "5xx"})));
        assert!(prefs.live());
    }

    #[test]
    fn test_goals_merge_missing_defaults() {
        let store = MemoryStore::new().with_entry(
            GOALS_KEY,
            r#"{"schema_version": 1, "goals": [{"metric_key": "weekly_queries", "target": -5}]}"#,
        );
        let mut prefs = DashboardPrefs::open(store, catalog());
        assert_eq!(prefs.goals().get(WEEKLY_QUERIES), Some(-5.0));
        assert_eq!(prefs.goals().goals().len(), 3);

        prefs.set_goal("streak_days", 7.0).unwrap();
        let reloaded = DashboardPrefs::open(prefs.into_store(), catalog());
        assert_eq!(reloaded.goals().get("streak_days"), Some(7.0));
        assert_eq!(reloaded.goals().get(WEEKLY_QUERIES), Some(-5.0));
    }

    #[test]
    fn test_non_finite_goal_rejected() {
        let mut prefs = DashboardPrefs::open(MemoryStore::new(), catalog());
        assert!(prefs.set_goal(WEEKLY_QUERIES, f64::INFINITY).is_err());
        assert_eq!(prefs.goals().get(WEEKLY_QUERIES), Some(75.0));
    }

    #[test]
    fn test_views_save_and_delete_roundtrip() {
        let mut prefs = DashboardPrefs::open(MemoryStore::new(), catalog());
        prefs.save_view("mine", json!({"user": "me"})).unwrap();
        prefs.save_view("mine", json!({"user": "you"})).unwrap();
        assert!(!prefs.delete_view("missing").unwrap());

        let mut reloaded = DashboardPrefs::open(prefs.into_store(), catalog());
        assert_eq!(reloaded.views().len(), 1);
        assert_eq!(reloaded.views().get("mine"), Some(&json!({"user": "you"})));
        assert!(reloaded.delete_view("mine").unwrap());
        assert!(reloaded.views().is_empty());
    }

    #[test]
    fn test_failed_write_leaves_phase_mutated() {
        let mut prefs = DashboardPrefs::open(ReadOnlyStore(MemoryStore::new()), catalog());
        let err = prefs.set_live(true).unwrap_err();
        assert!(format!("{err:#}").contains("read-only"));
        assert_eq!(prefs.phase(), Phase::Mutated);
        assert!(prefs.live());
    }
}
