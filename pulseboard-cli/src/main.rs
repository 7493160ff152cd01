//! Pulseboard CLI - dashboard analytics from JSON records

#![deny(warnings)]

// Global invariants enforced:
// - Machine-readable output goes to stdout, logs and notices to stderr
// - Every preference change is persisted before the command returns

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use pulseboard_core::config::{self, ResolvedConfig};
use pulseboard_core::goals::parse_target;
use pulseboard_core::heatmap::{build_heatmap, build_heatmap_ending};
use pulseboard_core::report::{build_report, DashboardInput};
use pulseboard_core::series::{parse_daily_json, parse_named_json, CalendarDate};
use pulseboard_core::trends::{analyze_trends, DEFAULT_VOLATILITY_LIMIT};
use pulseboard_core::{pivot, Column, DashboardPrefs, FileStore, RefreshScheduler, SystemClock};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const DEFAULT_LOG_FILTER: &str = "warn,pulseboard_core=info";

#[derive(Parser)]
#[command(name = "pulseboard")]
#[command(about = "Calendar heatmaps, derived metrics, trend pivots and dashboard preferences")]
#[command(version = env!("PULSEBOARD_VERSION"))]
struct Cli {
    /// Path to config file (default: auto-discover)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for persisted preferences (overrides config file)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a weekday x week activity heatmap from daily points
    Heatmap {
        /// JSON file: array of {date, count} or {"daily": [...]}
        path: PathBuf,

        /// Lookback window in days (overrides config file)
        #[arg(long)]
        window: Option<u32>,

        /// Last day of the window, YYYY-MM-DD (default: today in the canonical zone)
        #[arg(long)]
        today: Option<String>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Compute derived metrics and the anomaly flag for a dashboard payload
    Metrics {
        /// JSON file with usage_daily, confidence_daily, retention, status, events
        path: PathBuf,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Merge named series into one date-aligned table
    Pivot {
        /// JSON file: {key: [points]} or [{key, points}]
        path: PathBuf,

        /// Number of series to pivot (overrides config file)
        #[arg(long)]
        top: Option<usize>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Rank named series by volatility and volume, and detect topic shift
    Trends {
        /// JSON file: {key: [points]} or [{key, points}]
        path: PathBuf,

        /// Number of series considered for volatility ranking
        #[arg(long, default_value_t = DEFAULT_VOLATILITY_LIMIT)]
        limit: usize,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Show or rearrange the dashboard section layout
    Layout {
        #[command(subcommand)]
        action: LayoutAction,
    },
    /// Show or edit goal targets
    Goals {
        #[command(subcommand)]
        action: GoalsAction,
    },
    /// Manage saved filter views
    Views {
        #[command(subcommand)]
        action: ViewsAction,
    },
    /// Toggle live refresh for `watch`
    Live {
        #[command(subcommand)]
        action: LiveAction,
    },
    /// Re-render the metrics report on every poll until Ctrl-C
    Watch {
        /// JSON file re-read on every refresh
        path: PathBuf,

        /// Poll interval in seconds (overrides config file)
        #[arg(long)]
        interval: Option<u64>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Validate or show configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum LayoutAction {
    /// Print the current layout
    Show {
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Move a section, optionally before another section
    Move {
        /// Section key to move
        key: String,

        /// Column the section is in now
        #[arg(long)]
        from: ColumnArg,

        /// Destination column
        #[arg(long)]
        to: ColumnArg,

        /// Insert before this section (default: end of the column)
        #[arg(long)]
        before: Option<String>,
    },
    /// Restore the default layout
    Reset,
}

#[derive(Subcommand)]
enum GoalsAction {
    /// Print goal targets
    Show {
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Set the target for a metric
    Set {
        metric_key: String,

        /// Any number; negative and out-of-range values are stored as given
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
}

#[derive(Subcommand)]
enum ViewsAction {
    /// List saved views
    List {
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Save (or replace) a view
    Save {
        name: String,

        /// View filters as a JSON object
        value: String,
    },
    /// Delete a view by name
    Delete { name: String },
}

#[derive(Subcommand)]
enum LiveAction {
    /// Enable live refresh
    On,
    /// Disable live refresh
    Off,
    /// Print whether live refresh is enabled
    Show,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file
    Validate {
        /// Path to config file (default: --config or auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: --config or auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ColumnArg {
    Left,
    Right,
}

impl From<ColumnArg> for Column {
    fn from(arg: ColumnArg) -> Self {
        match arg {
            ColumnArg::Left => Column::Left,
            ColumnArg::Right => Column::Right,
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("failed to determine current directory")?;

    if let Commands::Config { action } = &cli.command {
        return run_config(action, &cwd, cli.config.as_deref());
    }

    let resolved =
        config::load_and_resolve(&cwd, cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(config_path) = &resolved.config_path {
        eprintln!("Using config: {}", config_path.display());
    }
    let state_dir = cli.state_dir.clone().unwrap_or_else(|| resolved.state_dir.clone());

    match cli.command {
        Commands::Heatmap {
            path,
            window,
            today,
            format,
        } => {
            let series = parse_daily_json(&read_input(&path)?)
                .with_context(|| format!("invalid daily series in {}", path.display()))?;
            let window = window.unwrap_or(resolved.window_days);
            config::check_window_days(window).context("invalid --window")?;
            let heatmap = match today {
                Some(raw) => {
                    let Some(end) = CalendarDate::parse(&raw) else {
                        bail!("invalid --today '{}': expected YYYY-MM-DD", raw);
                    };
                    build_heatmap_ending(&series, window, end)
                }
                None => build_heatmap(&series, window, resolved.zone, &SystemClock),
            };
            match format {
                OutputFormat::Text => print!("{}", heatmap.render_text()),
                OutputFormat::Json => println!("{}", to_pretty_json(&heatmap)?),
            }
        }
        Commands::Metrics { path, format } => {
            let prefs = open_prefs(&state_dir, &resolved);
            let input = DashboardInput::from_json(&read_input(&path)?)
                .with_context(|| format!("invalid dashboard input in {}", path.display()))?;
            let report = build_report(&input, prefs.goals(), resolved.zone);
            match format {
                OutputFormat::Text => print!("{}", report.render_text()),
                OutputFormat::Json => println!("{}", report.to_json()?),
            }
        }
        Commands::Pivot { path, top, format } => {
            let series = parse_named_json(&read_input(&path)?)
                .with_context(|| format!("invalid named series in {}", path.display()))?;
            let table = pivot(&series, top.unwrap_or(resolved.pivot_top));
            match format {
                OutputFormat::Text => print!("{}", table.render_text()),
                OutputFormat::Json => println!("{}", to_pretty_json(&table.rows)?),
            }
        }
        Commands::Trends {
            path,
            limit,
            format,
        } => {
            let series = parse_named_json(&read_input(&path)?)
                .with_context(|| format!("invalid named series in {}", path.display()))?;
            let trends = analyze_trends(&series, limit);
            match format {
                OutputFormat::Text => print!("{}", trends.render_text()),
                OutputFormat::Json => println!("{}", trends.to_json()?),
            }
        }
        Commands::Layout { action } => {
            let mut prefs = open_prefs(&state_dir, &resolved);
            match action {
                LayoutAction::Show { format } => match format {
                    OutputFormat::Text => print!("{}", prefs.layout().render_text()),
                    OutputFormat::Json => println!("{}", to_pretty_json(prefs.layout())?),
                },
                LayoutAction::Move {
                    key,
                    from,
                    to,
                    before,
                } => {
                    if !prefs.catalog().contains(&key) {
                        bail!("unknown section '{}'", key);
                    }
                    let from = Column::from(from);
                    if !prefs.move_section(&key, from, to.into(), before.as_deref())? {
                        bail!("section '{}' is not in the {} column", key, from);
                    }
                    print!("{}", prefs.layout().render_text());
                }
                LayoutAction::Reset => {
                    prefs.reset_layout()?;
                    print!("{}", prefs.layout().render_text());
                }
            }
        }
        Commands::Goals { action } => {
            let mut prefs = open_prefs(&state_dir, &resolved);
            match action {
                GoalsAction::Show { format } => match format {
                    OutputFormat::Text => print!("{}", prefs.goals().render_text()),
                    OutputFormat::Json => println!("{}", to_pretty_json(prefs.goals())?),
                },
                GoalsAction::Set { metric_key, value } => {
                    let Some(target) = parse_target(&value) else {
                        bail!("invalid goal target '{}': expected a number", value);
                    };
                    prefs.set_goal(&metric_key, target)?;
                    print!("{}", prefs.goals().render_text());
                }
            }
        }
        Commands::Views { action } => {
            let mut prefs = open_prefs(&state_dir, &resolved);
            match action {
                ViewsAction::List { format } => match format {
                    OutputFormat::Text => print!("{}", prefs.views().render_text()),
                    OutputFormat::Json => println!("{}", to_pretty_json(prefs.views())?),
                },
                ViewsAction::Save { name, value } => {
                    let value: serde_json::Value =
                        serde_json::from_str(&value).context("view value must be valid JSON")?;
                    if !value.is_object() {
                        bail!("view value must be a JSON object");
                    }
                    prefs.save_view(&name, value)?;
                    eprintln!("Saved view '{}'", name);
                }
                ViewsAction::Delete { name } => {
                    if !prefs.delete_view(&name)? {
                        bail!("no saved view named '{}'", name);
                    }
                    eprintln!("Deleted view '{}'", name);
                }
            }
        }
        Commands::Live { action } => {
            let mut prefs = open_prefs(&state_dir, &resolved);
            match action {
                LiveAction::On => prefs.set_live(true)?,
                LiveAction::Off => prefs.set_live(false)?,
                LiveAction::Show => {}
            }
            println!("{}", if prefs.live() { "on" } else { "off" });
        }
        Commands::Watch {
            path,
            interval,
            format,
        } => {
            let prefs = open_prefs(&state_dir, &resolved);
            let mut refresh = refresher(path, prefs.goals().clone(), resolved.zone, format);
            if !prefs.live() {
                eprintln!("Live refresh is off (enable with `pulseboard live on`); rendering once");
                return refresh();
            }
            let period = Duration::from_secs(interval.unwrap_or(resolved.poll_interval_secs).max(1));
            run_watch(period, refresh)?;
        }
        Commands::Config { action } => run_config(&action, &cwd, cli.config.as_deref())?,
    }

    Ok(())
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn run_config(action: &ConfigAction, cwd: &Path, global_path: Option<&Path>) -> anyhow::Result<()> {
    match action {
        ConfigAction::Validate { path } => {
            let explicit = path.as_deref().or(global_path);
            match explicit {
                Some(p) => {
                    config::load_config_file(p)?;
                    println!("Config valid: {}", p.display());
                }
                None => match config::discover_config(cwd)? {
                    Some((_, p)) => println!("Config valid: {}", p.display()),
                    None => println!("No config file found (using defaults)"),
                },
            }
        }
        ConfigAction::Show { path } => {
            let resolved = config::load_and_resolve(cwd, path.as_deref().or(global_path))
                .context("failed to load configuration")?;
            println!("{}", resolved.to_json()?);
        }
    }
    Ok(())
}

fn open_prefs(state_dir: &Path, resolved: &ResolvedConfig) -> DashboardPrefs<FileStore> {
    DashboardPrefs::open(FileStore::new(state_dir), resolved.catalog.clone())
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn to_pretty_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize output to JSON")
}

/// Re-read the input and render a fresh report
fn refresher(
    path: PathBuf,
    goals: pulseboard_core::goals::GoalState,
    zone: pulseboard_core::Zone,
    format: OutputFormat,
) -> impl FnMut() -> anyhow::Result<()> + Send + 'static {
    move || {
        let input = DashboardInput::from_json(&read_input(&path)?)
            .with_context(|| format!("invalid dashboard input in {}", path.display()))?;
        let report = build_report(&input, &goals, zone);
        let stamp = Utc::now().with_timezone(&zone.offset()).format("%Y-%m-%d %H:%M:%S");
        eprintln!("--- refreshed {} ---", stamp);
        match format {
            OutputFormat::Text => print!("{}", report.render_text()),
            OutputFormat::Json => println!("{}", report.to_json()?),
        }
        Ok(())
    }
}

fn run_watch<F>(period: Duration, refresh: F) -> anyhow::Result<()>
where
    F: FnMut() -> anyhow::Result<()> + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        let scheduler = RefreshScheduler::start(period, refresh);
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        info!("stopping live refresh");
        scheduler.stop().await;
        Ok::<(), anyhow::Error>(())
    })
}
