//! Pulseboard core library - analytics aggregation for dashboard views

#![deny(warnings)]

// Global invariants enforced in this crate:
// - Heatmap, metrics, pivot, and trend derivations are pure and total
// - Malformed input records are dropped or zeroed, never propagated as errors
// - Date keys are computed in one explicit canonical zone, never the host zone
// - "Now" comes from an injected Clock
// - Derived shapes are rebuilt from scratch on every refresh
// - Persisted preferences are normalized on every load

pub mod clock;
pub mod config;
pub mod goals;
pub mod heatmap;
pub mod layout;
pub mod metrics;
pub mod pivot;
pub mod prefs;
pub mod report;
pub mod scheduler;
pub mod series;
pub mod store;
pub mod trends;
pub mod views;

pub use clock::{Clock, FixedClock, SystemClock, Zone};
pub use config::ResolvedConfig;
pub use heatmap::{build_heatmap, Heatmap, HeatmapCell};
pub use layout::{Column, LayoutState, SectionCatalog};
pub use pivot::{pivot, PivotRow, PivotTable};
pub use prefs::{DashboardPrefs, Phase};
pub use report::{build_report, DashboardInput, DashboardReport, Metric};
pub use scheduler::RefreshScheduler;
pub use series::{CalendarDate, DailySeries, NamedSeries, TimePoint};
pub use store::{FileStore, MemoryStore, Store};
