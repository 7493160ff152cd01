//! Calendar heatmap - weekday x week grid over a lookback window
//!
//! Global invariants enforced:
//! - Rows are ISO weekdays (Monday = row 0), columns are calendar weeks
//! - Exactly `window_days` cells carry a date, each window day exactly once
//! - Cells outside the window are pads (`date = null`, count 0)
//! - `max >= 1`, so callers can divide by it for intensity

use crate::clock::{Clock, Zone};
use crate::series::{CalendarDate, DailySeries};
use serde::{Deserialize, Serialize};

pub const WEEKDAYS: usize = 7;

pub const WEEKDAY_LABELS: [&str; WEEKDAYS] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// One grid cell. `date = None` marks a pad outside the window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub date: Option<CalendarDate>,
    pub count: f64,
}

impl HeatmapCell {
    pub const PAD: HeatmapCell = HeatmapCell {
        date: None,
        count: 0.0,
    };

    pub fn is_pad(&self) -> bool {
        self.date.is_none()
    }
}

/// Weekday x week grid plus the intensity denominator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Heatmap {
    /// `grid[row][col]`, 7 rows
    pub grid: Vec<Vec<HeatmapCell>>,
    pub max: f64,
    pub window_start: CalendarDate,
    pub window_end: CalendarDate,
}

impl Heatmap {
    pub fn weeks(&self) -> usize {
        self.grid.first().map_or(0, Vec::len)
    }

    /// Dated cells in row-major order
    pub fn dated_cells(&self) -> impl Iterator<Item = &HeatmapCell> {
        self.grid.iter().flatten().filter(|cell| !cell.is_pad())
    }

    /// Cell count scaled into [0, 1] against `max`
    pub fn intensity(&self, cell: &HeatmapCell) -> f64 {
        (cell.count / self.max).clamp(0.0, 1.0)
    }

    /// Render as a shaded text grid, one line per weekday
    pub fn render_text(&self) -> String {
        const SHADES: [char; 5] = ['.', '░', '▒', '▓', '█'];
        let mut output = format!("{} .. {} (max {})\n", self.window_start, self.window_end, self.max);
        for (label, row) in WEEKDAY_LABELS.iter().zip(&self.grid) {
            output.push_str(label);
            output.push(' ');
            for cell in row {
                let shade = if cell.is_pad() {
                    ' '
                } else if cell.count <= 0.0 {
                    SHADES[0]
                } else {
                    // 1..=4 for any positive count
                    let level = (self.intensity(cell) * 3.0).ceil() as usize + 1;
                    SHADES[level.min(SHADES.len() - 1)]
                };
                output.push(shade);
            }
            output.push('\n');
        }
        output
    }
}

/// Build the heatmap for the `window_days` days ending today in `zone`.
///
/// `window_days` below 1 is treated as 1. Series points outside the window
/// are ignored for placement but still count towards `max`.
pub fn build_heatmap(series: &DailySeries, window_days: u32, zone: Zone, clock: &dyn Clock) -> Heatmap {
    let today = CalendarDate::new(zone.today(clock));
    build_heatmap_ending(series, window_days, today)
}

/// Build the heatmap for the `window_days` days ending on `window_end`
pub fn build_heatmap_ending(series: &DailySeries, window_days: u32, window_end: CalendarDate) -> Heatmap {
    let mut days = window_days.max(1);
    let window_start = match window_end.sub_days(days - 1) {
        Some(start) => start,
        None => {
            days = 1;
            window_end
        }
    };

    let leading_pad = window_start.weekday_index() as usize;
    let weeks = (leading_pad + days as usize).div_ceil(WEEKDAYS);
    let mut grid = vec![vec![HeatmapCell::PAD; weeks]; WEEKDAYS];

    for offset in 0..days {
        let Some(date) = window_start.add_days(offset) else {
            break;
        };
        let index = leading_pad + offset as usize;
        grid[index % WEEKDAYS][index / WEEKDAYS] = HeatmapCell {
            date: Some(date),
            count: series.get(date).unwrap_or(0.0),
        };
    }

    let max = series.points().iter().map(|p| p.count).fold(1.0, f64::max);

    Heatmap {
        grid,
        max,
        window_start,
        window_end,
    }
}
