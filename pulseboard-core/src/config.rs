//! Configuration file support for Pulseboard
//!
//! Loads dashboard configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.pulseboardrc.json` in the working directory
//! 3. `pulseboard.config.json` in the working directory
//!
//! All fields are optional. CLI flags take precedence over config file values.

use crate::clock::{Zone, DEFAULT_UTC_OFFSET_MINUTES};
use crate::layout::SectionCatalog;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_WINDOW_DAYS: u32 = 30;
pub const MAX_WINDOW_DAYS: u32 = 366;
pub const DEFAULT_PIVOT_TOP: usize = 3;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 12;
pub const DEFAULT_STATE_DIR: &str = ".pulseboard";

const MINUTES_PER_DAY: i32 = 24 * 60;

/// Pulseboard configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PulseboardConfig {
    /// Heatmap lookback window in days (default: 30)
    #[serde(default)]
    pub window_days: Option<u32>,

    /// Number of series pivoted into the trend table (default: 3)
    #[serde(default)]
    pub pivot_top: Option<usize>,

    /// Canonical zone offset from UTC in minutes (default: 330, +05:30)
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,

    /// Live refresh period in seconds (default: 12)
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,

    /// Directory holding persisted preferences (default: .pulseboard)
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Canonical section catalog override
    #[serde(default)]
    pub sections: Option<SectionsConfig>,
}

/// Section keys per default column
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionsConfig {
    #[serde(default)]
    pub left: Vec<String>,
    #[serde(default)]
    pub right: Vec<String>,
}

/// Fully resolved configuration with all defaults applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub window_days: u32,
    pub pivot_top: usize,
    pub zone: Zone,
    pub poll_interval_secs: u64,
    pub state_dir: PathBuf,
    pub catalog: SectionCatalog,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

/// Heatmap windows are limited to 1..=MAX_WINDOW_DAYS, from a config file or a flag
pub fn check_window_days(days: u32) -> Result<()> {
    if days == 0 || days > MAX_WINDOW_DAYS {
        anyhow::bail!("window_days must be between 1 and {} (got {})", MAX_WINDOW_DAYS, days);
    }
    Ok(())
}

impl PulseboardConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if let Some(days) = self.window_days {
            check_window_days(days)?;
        }

        if self.pivot_top == Some(0) {
            anyhow::bail!("pivot_top must be at least 1");
        }

        if let Some(minutes) = self.utc_offset_minutes {
            if minutes <= -MINUTES_PER_DAY || minutes >= MINUTES_PER_DAY {
                anyhow::bail!(
                    "utc_offset_minutes must lie strictly between -{} and {} (got {})",
                    MINUTES_PER_DAY,
                    MINUTES_PER_DAY,
                    minutes
                );
            }
        }

        if self.poll_interval_secs == Some(0) {
            anyhow::bail!("poll_interval_secs must be at least 1");
        }

        if let Some(ref dir) = self.state_dir {
            if dir.as_os_str().is_empty() {
                anyhow::bail!("state_dir must not be empty");
            }
        }

        if let Some(ref sections) = self.sections {
            if sections.left.is_empty() && sections.right.is_empty() {
                anyhow::bail!("sections must list at least one section key");
            }
            SectionCatalog::new(sections.left.clone(), sections.right.clone()).context("invalid sections")?;
        }

        Ok(())
    }

    /// Resolve config into the form used by the dashboard
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let zone = Zone::from_offset_minutes(self.utc_offset_minutes.unwrap_or(DEFAULT_UTC_OFFSET_MINUTES))?;

        let catalog = match &self.sections {
            Some(sections) => SectionCatalog::new(sections.left.clone(), sections.right.clone())?,
            None => SectionCatalog::standard(),
        };

        Ok(ResolvedConfig {
            window_days: self.window_days.unwrap_or(DEFAULT_WINDOW_DAYS),
            pivot_top: self.pivot_top.unwrap_or(DEFAULT_PIVOT_TOP),
            zone,
            poll_interval_secs: self.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            state_dir: self
                .state_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
            catalog,
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Resolved defaults with no config file
    pub fn defaults() -> Result<Self> {
        PulseboardConfig::default().resolve()
    }

    /// Effective settings as JSON, for `config show`
    pub fn to_json(&self) -> Result<String> {
        let value = serde_json::json!({
            "window_days": self.window_days,
            "pivot_top": self.pivot_top,
            "utc_offset_minutes": self.zone.offset_minutes(),
            "poll_interval_secs": self.poll_interval_secs,
            "state_dir": self.state_dir,
            "sections": {
                "left": self.catalog.left(),
                "right": self.catalog.right(),
            },
            "config_path": self.config_path,
        });
        serde_json::to_string_pretty(&value).context("failed to serialize resolved config")
    }
}

/// Discover a config file in the given directory
///
/// Search order:
/// 1. `.pulseboardrc.json`
/// 2. `pulseboard.config.json`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(root: &Path) -> Result<Option<(PulseboardConfig, PathBuf)>> {
    for name in [".pulseboardrc.json", "pulseboard.config.json"] {
        let path = root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<PulseboardConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: PulseboardConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config in `root`.
/// Returns default config if nothing is found.
pub fn load_and_resolve(root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(root)? {
            Some((config, path)) => (config, Some(path)),
            None => (PulseboardConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    Ok(resolved)
}
