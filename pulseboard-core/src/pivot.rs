//! Multi-series pivot - merge sparse named series into one dense table
//!
//! Global invariants enforced:
//! - The cap is applied before pivoting (dropped series contribute no dates)
//! - Rows are strictly ascending by date, no duplicate dates
//! - Every row carries every kept series key, 0 where the series is silent
//! - Column order follows input series order

use crate::series::{CalendarDate, NamedSeries};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Reserved column name for the row date
pub const DATE_COLUMN: &str = "date";

/// One merged row: the date plus one value per kept series key
#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    pub date: CalendarDate,
    pub values: Vec<(String, f64)>,
}

impl PivotRow {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| *value)
    }
}

/// Serializes as a flat object: `{"date": "...", "<key>": n, ...}`
impl Serialize for PivotRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
        map.serialize_entry(DATE_COLUMN, &self.date)?;
        for (key, value) in &self.values {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Dense date-aligned table ready for a multi-line chart
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PivotTable {
    pub keys: Vec<String>,
    pub rows: Vec<PivotRow>,
}

impl PivotTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as an aligned text table
    pub fn render_text(&self) -> String {
        let mut output = format!("{:<12}", DATE_COLUMN);
        for key in &self.keys {
            output.push_str(&format!(" {:>12}", truncate(key, 12)));
        }
        output.push('\n');
        for row in &self.rows {
            output.push_str(&format!("{:<12}", row.date.to_string()));
            for (_, value) in &row.values {
                output.push_str(&format!(" {:>12}", value));
            }
            output.push('\n');
        }
        output
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width.saturating_sub(1)).collect();
        format!("{head}~")
    } else {
        s.to_string()
    }
}

/// Pivot the first `top` series into a dense table.
///
/// Series whose key is empty, equals [`DATE_COLUMN`], or repeats an earlier
/// key are skipped before the cap is applied.
pub fn pivot(series: &[NamedSeries], top: usize) -> PivotTable {
    let mut seen: HashSet<&str> = HashSet::new();
    let kept: Vec<&NamedSeries> = series
        .iter()
        .filter(|s| {
            let usable = !s.key.is_empty() && s.key != DATE_COLUMN && seen.insert(s.key.as_str());
            if !usable {
                debug!(key = %s.key, "skipping series with reserved, empty, or duplicate key");
            }
            usable
        })
        .take(top)
        .collect();

    let dates: BTreeSet<CalendarDate> = kept.iter().flat_map(|s| s.points.dates()).collect();

    let rows = dates
        .into_iter()
        .map(|date| PivotRow {
            date,
            values: kept
                .iter()
                .map(|s| (s.key.clone(), s.points.get(date).unwrap_or(0.0)))
                .collect(),
        })
        .collect();

    PivotTable {
        keys: kept.iter().map(|s| s.key.clone()).collect(),
        rows,
    }
}
