//! Dashboard layout - two-column section ordering
//!
//! Global invariants enforced:
//! - After `normalize`, left ∪ right equals the catalog, each key exactly once
//! - A key present in both columns belongs to the first column it appears in,
//!   left scanned before right
//! - Missing catalog keys are appended to their default column in catalog order
//! - `normalize` is idempotent

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Standard left column sections, in default order
pub const STANDARD_LEFT: &[&str] = &[
    "overview",
    "usage_trend",
    "subject_trends",
    "activity_heatmap",
    "time_of_day",
];

/// Standard right column sections, in default order
pub const STANDARD_RIGHT: &[&str] = &["goals", "quality", "anomalies", "retention", "top_queries"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Left,
    Right,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Left => "left",
            Column::Right => "right",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Column {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "left" => Ok(Column::Left),
            "right" => Ok(Column::Right),
            other => bail!("unknown column '{}': expected 'left' or 'right'", other),
        }
    }
}

/// The canonical section set and each key's default column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionCatalog {
    left: Vec<String>,
    right: Vec<String>,
}

impl SectionCatalog {
    /// Build a catalog; keys must be non-empty and unique across both columns
    pub fn new(left: Vec<String>, right: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        for key in left.iter().chain(&right) {
            if key.trim().is_empty() {
                bail!("section keys must not be empty");
            }
            if !seen.insert(key.as_str()) {
                bail!("section key '{}' appears more than once", key);
            }
        }
        Ok(SectionCatalog { left, right })
    }

    pub fn standard() -> Self {
        SectionCatalog {
            left: STANDARD_LEFT.iter().map(|s| s.to_string()).collect(),
            right: STANDARD_RIGHT.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn left(&self) -> &[String] {
        &self.left
    }

    pub fn right(&self) -> &[String] {
        &self.right
    }

    /// All keys in catalog order (left column first)
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.left.iter().chain(&self.right).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys().any(|k| k == key)
    }

    pub fn default_column(&self, key: &str) -> Option<Column> {
        if self.left.iter().any(|k| k == key) {
            Some(Column::Left)
        } else if self.right.iter().any(|k| k == key) {
            Some(Column::Right)
        } else {
            None
        }
    }

    pub fn default_layout(&self) -> LayoutState {
        LayoutState {
            left: self.left.clone(),
            right: self.right.clone(),
        }
    }
}

impl Default for SectionCatalog {
    fn default() -> Self {
        SectionCatalog::standard()
    }
}

/// Ordered section keys per column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutState {
    #[serde(default)]
    pub left: Vec<String>,
    #[serde(default)]
    pub right: Vec<String>,
}

impl LayoutState {
    pub fn column(&self, column: Column) -> &[String] {
        match column {
            Column::Left => &self.left,
            Column::Right => &self.right,
        }
    }

    fn column_mut(&mut self, column: Column) -> &mut Vec<String> {
        match column {
            Column::Left => &mut self.left,
            Column::Right => &mut self.right,
        }
    }

    /// Column currently holding `key`, left checked first
    pub fn find(&self, key: &str) -> Option<Column> {
        [Column::Left, Column::Right]
            .into_iter()
            .find(|&column| self.column(column).iter().any(|k| k == key))
    }

    /// Move `key` out of `from` and insert it into `to` at the position of
    /// `target`, or at the end when `target` is absent from `to`.
    ///
    /// Returns `false` (state untouched) when `key` is not in `from` or when
    /// `target` is `key` itself. Dropping a section onto itself leaves it where
    /// it is rather than moving it to the end of the column. With
    /// `from == to` this is a reorder.
    pub fn move_section(&mut self, key: &str, from: Column, to: Column, target: Option<&str>) -> bool {
        if target == Some(key) {
            return false;
        }
        let source = self.column_mut(from);
        let Some(index) = source.iter().position(|k| k == key) else {
            return false;
        };
        let moved = source.remove(index);

        let dest = self.column_mut(to);
        match target.and_then(|t| dest.iter().position(|k| k == t)) {
            Some(at) => dest.insert(at, moved),
            None => dest.push(moved),
        }
        true
    }

    pub fn to_json(&self) -> Result<String> {
        use anyhow::Context;
        serde_json::to_string(self).context("failed to serialize layout to JSON")
    }

    /// Render both columns side by side
    pub fn render_text(&self) -> String {
        let rows = self.left.len().max(self.right.len());
        let mut output = format!("{:<24} {}\n", "LEFT", "RIGHT");
        for i in 0..rows {
            output.push_str(&format!(
                "{:<24} {}\n",
                self.left.get(i).map_or("", String::as_str),
                self.right.get(i).map_or("", String::as_str)
            ));
        }
        output
    }
}

/// Repair a possibly stale or hand-edited layout against the catalog
pub fn normalize(layout: &LayoutState, catalog: &SectionCatalog) -> LayoutState {
    let mut seen: HashSet<String> = HashSet::new();
    let mut keep = |column: &[String]| -> Vec<String> {
        column
            .iter()
            .filter(|key| {
                let ok = catalog.contains(key) && seen.insert(key.to_string());
                if !ok {
                    debug!(key = %key, "dropping unknown or duplicate section key");
                }
                ok
            })
            .cloned()
            .collect()
    };
    let mut normalized = LayoutState {
        left: keep(&layout.left),
        right: keep(&layout.right),
    };

    let missing: Vec<&str> = catalog.keys().filter(|key| !seen.contains(*key)).collect();
    for key in missing {
        // catalog keys always have a default column
        if let Some(column) = catalog.default_column(key) {
            debug!(key = %key, column = %column, "appending missing section key");
            normalized.column_mut(column).push(key.to_string());
        }
    }
    normalized
}
