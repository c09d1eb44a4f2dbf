//! Build-over-build comparison.
//!
//! The history itself lives outside the engine behind [`BuildHistory`];
//! this module only walks it. The comparable predecessor of a build is the
//! most recent earlier build that did not fail and that carries coverage.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CovError, Result};
use crate::model::{MetricKind, Ratios};
use crate::tree::CoverageTree;

/// Outcome of a build. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildResult {
    Success,
    Unstable,
    Failure,
}

impl BuildResult {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildResult::Success => "success",
            BuildResult::Unstable => "unstable",
            BuildResult::Failure => "failure",
        }
    }

    /// Results only ever get worse.
    #[must_use]
    pub fn worsen(self, other: BuildResult) -> BuildResult {
        self.max(other)
    }
}

impl FromStr for BuildResult {
    type Err = CovError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "success" => Ok(BuildResult::Success),
            "unstable" => Ok(BuildResult::Unstable),
            "failure" => Ok(BuildResult::Failure),
            other => Err(CovError::Other(format!("Unknown build result: '{other}'"))),
        }
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Read access to recorded builds.
pub trait BuildHistory {
    /// The build recorded immediately before `build`, if any.
    fn previous_build(&self, build: u64) -> Result<Option<u64>>;

    /// The result of `build`, or `None` if it is unknown.
    fn result(&self, build: u64) -> Result<Option<BuildResult>>;

    /// Root coverage of `build`, or `None` if it recorded none.
    fn coverage(&self, build: u64) -> Result<Option<Ratios>>;
}

/// A build that coverage can be compared against.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparableBuild {
    pub number: u64,
    pub ratios: Ratios,
}

/// Coverage of `number` if it can be compared against.
fn comparable(history: &dyn BuildHistory, number: u64) -> Result<Option<Ratios>> {
    if history.result(number)? == Some(BuildResult::Failure) {
        return Ok(None);
    }
    Ok(history.coverage(number)?.filter(Ratios::has_coverage))
}

/// Walk back from `start` (inclusive) to the first build that did not fail
/// and carries coverage. At most `max_lookback` builds are inspected.
fn first_comparable(
    history: &dyn BuildHistory,
    start: Option<u64>,
    max_lookback: Option<usize>,
) -> Result<Option<ComparableBuild>> {
    let mut cursor = start;
    let mut inspected = 0;
    while let Some(number) = cursor {
        if max_lookback.is_some_and(|max| inspected >= max) {
            break;
        }
        inspected += 1;
        if let Some(ratios) = comparable(history, number)? {
            return Ok(Some(ComparableBuild { number, ratios }));
        }
        cursor = history.previous_build(number)?;
    }
    Ok(None)
}

/// The most recent build before `build` that can be compared against.
pub fn find_previous(
    history: &dyn BuildHistory,
    build: u64,
    max_lookback: Option<usize>,
) -> Result<Option<ComparableBuild>> {
    first_comparable(history, history.previous_build(build)?, max_lookback)
}

/// The most recent comparable build, starting at `latest` itself.
pub fn last_result(
    history: &dyn BuildHistory,
    latest: u64,
    max_lookback: Option<usize>,
) -> Result<Option<ComparableBuild>> {
    first_comparable(history, Some(latest), max_lookback)
}

/// Direction of a metric between two builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increased,
    Decreased,
    Unchanged,
}

impl Trend {
    pub fn arrow(self) -> &'static str {
        match self {
            Trend::Increased => "↑",
            Trend::Decreased => "↓",
            Trend::Unchanged => "",
        }
    }
}

/// Percentage used for absent data.
pub const ABSENT: f64 = -1.0;

/// One metric compared across two builds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDiff {
    pub kind: MetricKind,
    pub previous_percentage: f64,
    pub current_percentage: f64,
    pub trend: Trend,
}

impl MetricDiff {
    fn new(kind: MetricKind, previous: &Ratios, current: &Ratios) -> Self {
        let pct = |ratios: &Ratios| {
            let ratio = &ratios[kind];
            if ratio.is_initialized() {
                ratio.percentage_float()
            } else {
                ABSENT
            }
        };
        let previous_percentage = pct(previous);
        let current_percentage = pct(current);
        let trend = if previous_percentage == ABSENT || current_percentage == ABSENT {
            Trend::Unchanged
        } else if current_percentage > previous_percentage {
            Trend::Increased
        } else if current_percentage < previous_percentage {
            Trend::Decreased
        } else {
            Trend::Unchanged
        };
        Self {
            kind,
            previous_percentage,
            current_percentage,
            trend,
        }
    }

    pub fn is_present(&self) -> bool {
        self.previous_percentage != ABSENT && self.current_percentage != ABSENT
    }
}

/// Comparison of a build's root coverage with a previous build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageDiff {
    pub current_build: Option<u64>,
    pub previous_build: u64,
    pub metrics: Vec<MetricDiff>,
}

impl CoverageDiff {
    pub fn metric(&self, kind: MetricKind) -> Option<&MetricDiff> {
        self.metrics.iter().find(|m| m.kind == kind)
    }

    /// Statement or branch coverage went down. Other kinds never gate.
    pub fn regressed(&self) -> bool {
        [MetricKind::Statement, MetricKind::Branch]
            .into_iter()
            .filter_map(|kind| self.metric(kind))
            .any(|m| m.trend == Trend::Decreased)
    }
}

/// Compare `current` with `previous`; `None` when there is no history.
pub fn compare(current: &CoverageTree, previous: Option<&ComparableBuild>) -> Option<CoverageDiff> {
    let previous = previous?;
    let metrics = MetricKind::SCORED
        .into_iter()
        .map(|kind| MetricDiff::new(kind, &previous.ratios, current.ratios()))
        .collect();
    Some(CoverageDiff {
        current_build: current.build(),
        previous_build: previous.number,
        metrics,
    })
}

/// One point of the coverage trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub build: u64,
    /// Rounded percentage of every measured scored kind.
    pub percentages: Vec<(MetricKind, u32)>,
    /// Complexity numerator, if complexity was measured.
    pub complexity: Option<f64>,
}

impl TrendPoint {
    fn new(build: u64, ratios: &Ratios) -> Self {
        let percentages = MetricKind::SCORED
            .into_iter()
            .filter(|&k| ratios[k].is_initialized())
            .map(|k| (k, ratios[k].percentage()))
            .collect();
        let complexity = &ratios[MetricKind::Complexity];
        Self {
            build,
            percentages,
            complexity: complexity.is_initialized().then(|| complexity.numerator()),
        }
    }

    pub fn percentage(&self, kind: MetricKind) -> Option<u32> {
        self.percentages
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, p)| *p)
    }
}

/// Coverage of `build` followed by each earlier comparable build, newest
/// first. `build` itself is included whenever it has coverage.
pub fn trend_series(
    history: &dyn BuildHistory,
    build: u64,
    max_lookback: Option<usize>,
) -> Result<Vec<TrendPoint>> {
    let mut points = Vec::new();
    if let Some(ratios) = history.coverage(build)? {
        if ratios.has_coverage() {
            points.push(TrendPoint::new(build, &ratios));
        }
    }

    let mut inspected = 0;
    let mut cursor = history.previous_build(build)?;
    while let Some(number) = cursor {
        if max_lookback.is_some_and(|max| inspected >= max) {
            break;
        }
        inspected += 1;
        if let Some(ratios) = comparable(history, number)? {
            points.push(TrendPoint::new(number, &ratios));
        }
        cursor = history.previous_build(number)?;
    }
    Ok(points)
}

/// History kept in memory, keyed by build number.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    builds: BTreeMap<u64, (BuildResult, Option<Ratios>)>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, build: u64, result: BuildResult, coverage: Option<Ratios>) {
        self.builds.insert(build, (result, coverage));
    }
}

impl BuildHistory for MemoryHistory {
    fn previous_build(&self, build: u64) -> Result<Option<u64>> {
        Ok(self.builds.range(..build).next_back().map(|(n, _)| *n))
    }

    fn result(&self, build: u64) -> Result<Option<BuildResult>> {
        Ok(self.builds.get(&build).map(|(r, _)| *r))
    }

    fn coverage(&self, build: u64) -> Result<Option<Ratios>> {
        Ok(self.builds.get(&build).and_then(|(_, c)| *c))
    }
}
