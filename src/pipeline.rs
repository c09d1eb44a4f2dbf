//! End-to-end evaluation of one build: decode, enforce rules, score,
//! compare with history and gate on thresholds.
//!
//! Every step reports what it did as a console line (kept in the returned
//! [`Verdict`]) and through the `log` facade.

use crate::config::Config;
use crate::decode::{decode_partial, Diagnostic};
use crate::error::Result;
use crate::health::{self, HealthReport, ThresholdFailure};
use crate::history::{self, BuildHistory, BuildResult, CoverageDiff, MetricDiff, ABSENT};
use crate::rules::{enforce_all, RuleViolation};
use crate::tree::CoverageTree;

const PREFIX: &str = "[covtrend]";

/// Everything the pipeline decided about a build.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub build: u64,
    pub result: BuildResult,
    pub tree: Option<CoverageTree>,
    pub health: Option<HealthReport>,
    pub diff: Option<CoverageDiff>,
    pub violations: Vec<RuleViolation>,
    pub threshold_failures: Vec<ThresholdFailure>,
    pub diagnostics: Vec<Diagnostic>,
    /// Console output, one line per entry.
    pub messages: Vec<String>,
}

impl Verdict {
    fn new(build: u64, result: BuildResult) -> Self {
        Self {
            build,
            result,
            tree: None,
            health: None,
            diff: None,
            violations: Vec::new(),
            threshold_failures: Vec::new(),
            diagnostics: Vec::new(),
            messages: Vec::new(),
        }
    }

    fn info(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        log::info!("{msg}");
        self.messages.push(format!("{PREFIX} [INFO]: {msg}"));
    }

    fn fail(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        log::warn!("{msg}");
        self.messages.push(format!("{PREFIX} [FAIL]: {msg}"));
    }

    fn worsen(&mut self, result: BuildResult) {
        self.result = self.result.worsen(result);
    }
}

/// Evaluate `build` from its coverage documents. `incoming` is the result
/// the build had before coverage was looked at; the verdict never improves
/// on it. Only history lookups can fail.
pub fn evaluate<D: AsRef<[u8]>>(
    build: u64,
    documents: &[D],
    incoming: BuildResult,
    config: &Config,
    history: &dyn BuildHistory,
) -> Result<Verdict> {
    let mut verdict = Verdict::new(build, incoming);

    if documents.is_empty() {
        if incoming > BuildResult::Unstable {
            verdict.info("No coverage files found; build already failed.");
        } else {
            verdict.info("No coverage files found. Setting build to failure.");
            verdict.worsen(BuildResult::Failure);
        }
        return Ok(verdict);
    }
    verdict.info(format!("Processing {} coverage file(s)", documents.len()));

    let partial = decode_partial(documents);
    if let Some(e) = &partial.error {
        log::error!("error parsing coverage: {e}");
        verdict.info(format!("Could not parse a coverage result file: {e}"));
        verdict.info("Setting build to failure.");
        verdict.worsen(BuildResult::Failure);
    }
    let Some(decoded) = partial.decoded else {
        return Ok(verdict);
    };
    for d in &decoded.diagnostics {
        log::warn!(
            "document {} at '{}': {}",
            d.document,
            d.path.join("/"),
            d.message
        );
    }
    verdict.diagnostics = decoded.diagnostics;
    let mut tree = decoded.tree;
    tree.set_build(build);
    if partial.error.is_some() {
        // Keep what was merged so the build can still be inspected.
        verdict.tree = Some(tree);
        return Ok(verdict);
    }

    let rules = config.build_rules();
    verdict.violations = enforce_all(&rules, &mut tree);
    for v in verdict.violations.clone() {
        verdict.fail(v.to_string());
    }
    if tree.is_failed() {
        verdict.info("Code coverage enforcement failed. Setting build to unstable.");
        verdict.worsen(BuildResult::Unstable);
    }

    verdict.health = health::score(&tree, config.health_thresholds());
    match verdict.health.as_ref().map(HealthReport::description) {
        Some(description) => verdict.info(description),
        None => verdict.info("No thresholds set"),
    }

    let previous = history::find_previous(history, build, config.max_history)?;
    verdict.diff = history::compare(&tree, previous.as_ref());
    match verdict.diff.clone() {
        Some(diff) => {
            verdict.info(format!("Current  Coverage : {}", summary_line(&diff, true)));
            verdict.info(format!("Previous Coverage : {}", summary_line(&diff, false)));
            if !config.use_coverage_history {
                verdict.info("Not checking code coverage history.");
            } else if diff.regressed() {
                verdict.info("Code coverage history enforcement failed. Setting build to failure.");
                verdict.worsen(BuildResult::Failure);
            }
        }
        None => verdict.info("Could not find previous non-failing build to check code coverage history."),
    }

    if config.use_threshold {
        let failures = health::check_minimums(&tree, &config.gate_thresholds());
        if !failures.is_empty() {
            verdict.fail("Build failed due to a coverage metric below the minimum threshold");
            verdict.worsen(BuildResult::Failure);
        }
        for f in &failures {
            verdict.fail(f.to_string());
        }
        verdict.threshold_failures = failures;
    }

    verdict.tree = Some(tree);
    Ok(verdict)
}

fn summary_line(diff: &CoverageDiff, current: bool) -> String {
    diff.metrics
        .iter()
        .filter_map(|m: &MetricDiff| {
            let p = if current {
                m.current_percentage
            } else {
                m.previous_percentage
            };
            (p != ABSENT).then(|| format!("{}: {:.2}", m.kind.label(), p))
        })
        .collect::<Vec<_>>()
        .join(" | ")
}
