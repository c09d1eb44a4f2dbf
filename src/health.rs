//! Health scoring of a build's root coverage against per-kind thresholds.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::model::{MetricKind, Ratio};
use crate::tree::CoverageTree;

/// Explanation used when every measured kind meets its target.
pub const PERFECT: &str = "All coverage targets have been met";

/// A `{min, max}` percentage band for one metric kind. Out-of-range values
/// are accepted and corrected by [`HealthThresholds::ensure_valid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(deserialize_with = "saturating_i32")]
    pub min: i32,
    #[serde(deserialize_with = "saturating_i32")]
    pub max: i32,
}

fn saturating_i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    let value = i64::deserialize(deserializer)?;
    Ok(value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
}

impl Threshold {
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    fn ensure_valid(&mut self) {
        self.max = self.max.clamp(0, 100);
        self.min = self.min.clamp(0, self.max);
    }
}

/// Per-kind thresholds for the six scored metric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    pub statement: Threshold,
    pub branch: Threshold,
    pub basis_path: Threshold,
    pub mcdc: Threshold,
    pub function: Threshold,
    pub function_call: Threshold,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            statement: Threshold::new(0, 100),
            branch: Threshold::new(0, 70),
            basis_path: Threshold::new(0, 80),
            mcdc: Threshold::new(0, 80),
            function: Threshold::new(0, 80),
            function_call: Threshold::new(0, 80),
        }
    }
}

impl HealthThresholds {
    /// Threshold for a scored kind; complexity has none.
    pub fn get(&self, kind: MetricKind) -> Option<Threshold> {
        match kind {
            MetricKind::Statement => Some(self.statement),
            MetricKind::Branch => Some(self.branch),
            MetricKind::BasisPath => Some(self.basis_path),
            MetricKind::Mcdc => Some(self.mcdc),
            MetricKind::Function => Some(self.function),
            MetricKind::FunctionCall => Some(self.function_call),
            MetricKind::Complexity => None,
        }
    }

    /// Clamp every max into `[0, 100]`, then every min into `[0, max]`.
    pub fn ensure_valid(&mut self) {
        for t in [
            &mut self.statement,
            &mut self.branch,
            &mut self.basis_path,
            &mut self.mcdc,
            &mut self.function,
            &mut self.function_call,
        ] {
            t.ensure_valid();
        }
    }
}

/// Result of scoring a build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub score: u32,
    pub explanations: Vec<String>,
}

impl HealthReport {
    pub fn description(&self) -> String {
        format!("Coverage: {}.", self.explanations.join(". "))
    }
}

/// A scored kind whose root percentage fell below its configured minimum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdFailure {
    pub kind: MetricKind,
    pub percentage: u32,
    pub minimum: i32,
}

impl fmt::Display for ThresholdFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} coverage {}% < {}% threshold.",
            self.kind.label(),
            self.percentage,
            self.minimum
        )
    }
}

fn explanation(kind: MetricKind, ratio: &Ratio, percentage: u32) -> String {
    format!("{} {} ({}%)", kind.label(), ratio, percentage)
}

/// Linear interpolation between `min` (score 0) and `max` (no reduction).
fn update_score(score: u32, min: i32, value: i32, max: i32) -> u32 {
    if value >= max {
        return score;
    }
    if value <= min {
        return 0;
    }
    let scaled = (100.0 * f64::from(value - min) / f64::from(max - min)).floor() as u32;
    scaled.min(score)
}

/// Score the root of `tree`. `None` thresholds disable health reporting.
pub fn score(tree: &CoverageTree, thresholds: Option<&HealthThresholds>) -> Option<HealthReport> {
    let mut thresholds = *thresholds?;
    thresholds.ensure_valid();

    let mut score = 100;
    let mut explanations = Vec::new();

    for kind in MetricKind::SCORED {
        let ratio = tree.ratio(kind);
        let Some(t) = thresholds.get(kind) else {
            continue;
        };
        if !ratio.is_initialized() || t.max <= 0 {
            continue;
        }
        let percentage = ratio.percentage();
        let value = percentage as i32;
        if value < t.max {
            explanations.push(explanation(kind, ratio, percentage));
        }
        score = update_score(score, t.min, value, t.max);
    }

    if explanations.is_empty() {
        explanations.push(PERFECT.to_string());
    }

    Some(HealthReport {
        score,
        explanations,
    })
}

/// Scored kinds whose rounded root percentage is below the threshold minimum.
pub fn check_minimums(tree: &CoverageTree, thresholds: &HealthThresholds) -> Vec<ThresholdFailure> {
    let mut thresholds = *thresholds;
    thresholds.ensure_valid();

    MetricKind::SCORED
        .into_iter()
        .filter_map(|kind| {
            let ratio = tree.ratio(kind);
            let t = thresholds.get(kind)?;
            let percentage = ratio.percentage();
            (ratio.is_initialized() && (percentage as i32) < t.min).then_some(ThresholdFailure {
                kind,
                percentage,
                minimum: t.min,
            })
        })
        .collect()
}
