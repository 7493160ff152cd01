//! Goal targets - user-editable numeric targets per metric
//!
//! Targets are accepted as-is once they parse as a finite number: negative or
//! out-of-range values are stored without clamping. Progress towards a goal
//! is a display ratio capped at 1.

use serde::{Deserialize, Serialize};

pub const WEEKLY_QUERIES: &str = "weekly_queries";
pub const CONFIDENCE: &str = "confidence";
pub const SAVED_PAPERS: &str = "saved_papers";

/// Goals seeded on first load, and merged in when missing from stored state
pub const DEFAULT_GOALS: &[(&str, f64)] = &[(WEEKLY_QUERIES, 75.0), (CONFIDENCE, 0.8), (SAVED_PAPERS, 15.0)];

/// How a goal's progress denominator is floored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalKind {
    Count,
    Ratio,
}

impl GoalKind {
    pub fn of(metric_key: &str) -> Self {
        if metric_key == CONFIDENCE {
            GoalKind::Ratio
        } else {
            GoalKind::Count
        }
    }

    pub fn floor(&self) -> f64 {
        match self {
            GoalKind::Count => 1.0,
            GoalKind::Ratio => 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Goal {
    pub metric_key: String,
    pub target: f64,
}

/// Ordered goal list; one entry per metric key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoalState {
    goals: Vec<Goal>,
}

impl GoalState {
    /// Build from stored goals; later duplicates of a key are dropped
    pub fn new(goals: Vec<Goal>) -> Self {
        let mut state = GoalState { goals: Vec::new() };
        for goal in goals {
            if state.get(&goal.metric_key).is_none() {
                state.goals.push(goal);
            }
        }
        state
    }

    pub fn defaults() -> Self {
        GoalState {
            goals: DEFAULT_GOALS
                .iter()
                .map(|(key, target)| Goal {
                    metric_key: key.to_string(),
                    target: *target,
                })
                .collect(),
        }
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn get(&self, metric_key: &str) -> Option<f64> {
        self.goals
            .iter()
            .find(|g| g.metric_key == metric_key)
            .map(|g| g.target)
    }

    /// Replace the target for `metric_key`, or append a new goal
    pub fn set(&mut self, metric_key: &str, target: f64) {
        match self.goals.iter_mut().find(|g| g.metric_key == metric_key) {
            Some(goal) => goal.target = target,
            None => self.goals.push(Goal {
                metric_key: metric_key.to_string(),
                target,
            }),
        }
    }

    /// Append any default goal whose key is missing. Returns how many were added.
    pub fn merge_defaults(&mut self) -> usize {
        let mut added = 0;
        for (key, target) in DEFAULT_GOALS {
            if self.get(key).is_none() {
                self.set(key, *target);
                added += 1;
            }
        }
        added
    }

    /// Progress towards the goal for `metric_key`, if one is set
    pub fn progress(&self, metric_key: &str, value: f64) -> Option<f64> {
        self.get(metric_key)
            .map(|target| goal_progress(value, target, GoalKind::of(metric_key)))
    }

    pub fn render_text(&self) -> String {
        let mut output = format!("{:<24} {:>12}\n", "METRIC", "TARGET");
        for goal in &self.goals {
            output.push_str(&format!("{:<24} {:>12}\n", goal.metric_key, goal.target));
        }
        output
    }
}

impl Default for GoalState {
    fn default() -> Self {
        GoalState::defaults()
    }
}

/// Parse a user-entered target. Blank input is 0; anything that is not a
/// finite number is rejected.
pub fn parse_target(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `min(1, value / max(target, floor))`
pub fn goal_progress(value: f64, target: f64, kind: GoalKind) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let denominator = if target.is_finite() { target.max(kind.floor()) } else { kind.floor() };
    (value / denominator).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let goals = GoalState::defaults();
        assert_eq!(goals.get(WEEKLY_QUERIES), Some(75.0));
        assert_eq!(goals.get(CONFIDENCE), Some(0.8));
        assert_eq!(goals.get(SAVED_PAPERS), Some(15.0));
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("42"), Some(42.0));
        assert_eq!(parse_target(" -3.5 "), Some(-3.5));
        assert_eq!(parse_target(""), Some(0.0));
        assert_eq!(parse_target("abc"), None);
        assert_eq!(parse_target("NaN"), None);
        assert_eq!(parse_target("inf"), None);
    }

    #[test]
    fn test_negative_target_kept() {
        let mut goals = GoalState::defaults();
        goals.set(WEEKLY_QUERIES, -10.0);
        assert_eq!(goals.get(WEEKLY_QUERIES), Some(-10.0));
        goals.set("custom", 1e9);
        assert_eq!(goals.goals().len(), 4);
    }

    #[test]
    fn test_progress_floors() {
        assert_eq!(goal_progress(30.0, 75.0, GoalKind::Count), 0.4);
        assert_eq!(goal_progress(100.0, 75.0, GoalKind::Count), 1.0);
        assert_eq!(goal_progress(0.5, 0.0, GoalKind::Count), 0.5);
        assert_eq!(goal_progress(0.005, 0.0, GoalKind::Ratio), 0.5);
        assert_eq!(goal_progress(3.0, -5.0, GoalKind::Count), 1.0);
        assert_eq!(goal_progress(f64::NAN, 10.0, GoalKind::Count), 0.0);
    }

    #[test]
    fn test_non_finite_value_never_meets_goal() {
        assert_eq!(goal_progress(f64::NAN, 0.8, GoalKind::Ratio), 0.0);
        assert_eq!(goal_progress(f64::INFINITY, 75.0, GoalKind::Count), 0.0);
        assert_eq!(goal_progress(f64::NEG_INFINITY, f64::NAN, GoalKind::Count), 0.0);
    }

    #[test]
    fn test_merge_defaults_and_dedupe() {
        let mut goals = GoalState::new(vec![
            Goal { metric_key: CONFIDENCE.into(), target: 0.9 },
            Goal { metric_key: CONFIDENCE.into(), target: 0.1 },
        ]);
        assert_eq!(goals.merge_defaults(), 2);
        assert_eq!(goals.get(CONFIDENCE), Some(0.9));
        assert_eq!(goals.goals().len(), 3);
        assert_eq!(goals.merge_defaults(), 0);
        assert_eq!(goals.progress(CONFIDENCE, 0.45), Some(0.5));
    }

    #[test]
    fn test_serializes_as_list() {
        let json = serde_json::to_string(&GoalState::new(vec![Goal {
            metric_key: "x".into(),
            target: 2.0,
        }]))
        .unwrap();
        assert_eq!(json, r#"[{"metric_key":"x","target":2.0}]"#);
    }
}
