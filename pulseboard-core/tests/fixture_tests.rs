//! Integration tests over the shared JSON fixtures

use pulseboard_core::goals::GoalState;
use pulseboard_core::heatmap::build_heatmap_ending;
use pulseboard_core::metrics::Direction;
use pulseboard_core::report::{build_report, DashboardInput, MetricValue};
use pulseboard_core::series::{parse_daily_json, parse_named_json};
use pulseboard_core::trends::analyze_trends;
use pulseboard_core::{pivot, CalendarDate, Zone};
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

fn date(raw: &str) -> CalendarDate {
    CalendarDate::parse(raw).unwrap()
}

fn approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_daily_fixture_tolerates_malformed_points() {
    let series = parse_daily_json(&fixture("daily.json")).unwrap();
    assert_eq!(series.len(), 7);
    assert_eq!(series.get(date("2024-06-04")), Some(7.0));
    assert_eq!(series.get(date("2024-06-05")), Some(0.0));
    // last duplicate wins
    assert_eq!(series.get(date("2024-06-08")), Some(9.0));
}

#[test]
fn test_heatmap_from_daily_fixture() {
    let series = parse_daily_json(&fixture("daily.json")).unwrap();
    let heatmap = build_heatmap_ending(&series, 7, date("2024-06-10"));

    assert_eq!(heatmap.weeks(), 2);
    assert_eq!(heatmap.window_start, date("2024-06-04"));
    // 2024-05-01 is outside the window but still sets the scale
    assert_eq!(heatmap.max, 20.0);

    let total: f64 = heatmap.dated_cells().map(|c| c.count).sum();
    assert_eq!(total, 19.0);

    let saturday = heatmap.grid[5][0];
    assert_eq!(saturday.date, Some(date("2024-06-08")));
    assert_eq!(saturday.count, 9.0);

    let monday = heatmap.grid[0][1];
    assert_eq!(monday.date, Some(date("2024-06-10")));
    assert_eq!(monday.count, 3.0);
    assert!(heatmap.grid[0][0].is_pad());
}

#[test]
fn test_pivot_from_subjects_fixture() {
    let series = parse_named_json(&fixture("subjects.json")).unwrap();
    let table = pivot(&series, 3);

    assert_eq!(table.keys, vec!["algebra", "biology", "chemistry"]);
    let dates: Vec<String> = table.rows.iter().map(|r| r.date.to_string()).collect();
    assert_eq!(
        dates,
        vec!["2024-06-03", "2024-06-04", "2024-06-05", "2024-06-06", "2024-06-07"]
    );

    let first = &table.rows[0];
    assert_eq!(first.get("algebra"), Some(5.0));
    assert_eq!(first.get("biology"), Some(0.0));
    assert_eq!(first.get("chemistry"), Some(1.0));
    assert_eq!(table.rows[4].get("chemistry"), Some(4.0));

    let json: serde_json::Value = serde_json::to_value(&table.rows).unwrap();
    assert_eq!(json[1]["date"], "2024-06-04");
    assert_eq!(json[1]["biology"], 2.0);
    assert!(json[1].get("drama").is_none());
}

#[test]
fn test_trends_from_subjects_fixture() {
    let series = parse_named_json(&fixture("subjects.json")).unwrap();
    let trends = analyze_trends(&series, 4);

    let ranked: Vec<&str> = trends.volatility.iter().map(|v| v.key.as_str()).collect();
    assert_eq!(ranked, vec!["biology", "chemistry", "algebra", "drama"]);

    let totals: Vec<&str> = trends.totals.iter().map(|t| t.key.as_str()).collect();
    assert_eq!(totals, vec!["drama", "algebra", "biology", "chemistry"]);

    assert_eq!(trends.topic_shift.from.as_deref(), Some("algebra"));
    assert_eq!(trends.topic_shift.to.as_deref(), Some("drama"));
}

#[test]
fn test_report_from_dashboard_fixture() {
    let input = DashboardInput::from_json(&fixture("dashboard_input.json")).unwrap();
    let report = build_report(&input, &GoalState::defaults(), Zone::default());

    let number = |key: &str| match report.metric(key).unwrap().value {
        MetricValue::Number(n) => n,
        MetricValue::Text(_) => panic!("{key} should be numeric"),
    };

    assert_eq!(number("total"), 154.0);
    approx(number("growth"), 0.2);
    approx(number("retention"), 0.75);
    approx(number("drift"), 0.125);
    assert_eq!(report.metric("drift").unwrap().direction, Direction::Up);
    approx(report.quality_score, 42.5);
    approx(number("error_rate"), 0.06);

    assert_eq!(
        report.metric("week_over_week").unwrap().value,
        MetricValue::Text("+20.0%".into())
    );
    // 6% errors is above the operational threshold
    assert!(report.anomaly);

    let progress: Vec<(String, f64)> = report
        .goals
        .iter()
        .map(|g| (g.metric_key.clone(), g.progress))
        .collect();
    assert_eq!(progress.len(), 3);
    approx(progress[0].1, 1.0);
    approx(progress[1].1, 1.0);
    approx(progress[2].1, 0.4);
}

#[test]
fn test_personal_context_raises_error_threshold() {
    let raw = fixture("dashboard_input.json").replace("\"operational\"", "\"personal\"");
    let input = DashboardInput::from_json(&raw).unwrap();
    let report = build_report(&input, &GoalState::defaults(), Zone::default());
    assert!(!report.anomaly);
}
