//! Output formatting for coverage trees, build comparisons and trends.

use std::fmt::Write;

use crate::health::HealthReport;
use crate::history::{CoverageDiff, MetricDiff, TrendPoint, ABSENT};
use crate::model::{MetricKind, Ratio};
use crate::tree::{CoverageTree, Level, NodeId};

/// Trait for formatting engine results.
pub trait ReportFormatter {
    /// Format a tree, showing nodes down to `depth` levels below the root.
    fn format_tree(&self, tree: &CoverageTree, depth: Option<usize>) -> String;

    /// Format a comparison with the previous build.
    fn format_diff(&self, diff: &CoverageDiff) -> String;
}

/// `p% (n/d)`; complexity without a denominator shows the bare count.
pub fn format_ratio(kind: MetricKind, ratio: &Ratio) -> String {
    if kind == MetricKind::Complexity && ratio.denominator() == 0.0 {
        return ratio.numerator().to_string();
    }
    format!("{}% ({})", ratio.percentage(), ratio)
}

fn format_percentage(p: f64) -> String {
    if p == ABSENT {
        "-".to_string()
    } else {
        format!("{p:.2}%")
    }
}

fn depth_of(level: Level) -> usize {
    match level {
        Level::Root => 0,
        Level::Environment => 1,
        Level::Unit => 2,
        Level::Subprogram => 3,
    }
}

/// Nodes to show, in walk order, and the kinds measured by any of them.
fn visible(tree: &CoverageTree, depth: Option<usize>) -> (Vec<NodeId>, Vec<MetricKind>) {
    let nodes: Vec<NodeId> = tree
        .walk()
        .into_iter()
        .filter(|&id| depth.map_or(true, |d| depth_of(tree.node(id).level()) <= d))
        .collect();
    let kinds = MetricKind::ALL
        .into_iter()
        .filter(|&k| nodes.iter().any(|&id| tree.node(id).has_coverage(k)))
        .collect();
    (nodes, kinds)
}

fn cell(tree: &CoverageTree, id: NodeId, kind: MetricKind) -> String {
    let node = tree.node(id);
    if node.has_coverage(kind) {
        format_ratio(kind, node.ratio(kind))
    } else {
        "-".to_string()
    }
}

/// Plain text formatter.
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn format_tree(&self, tree: &CoverageTree, depth: Option<usize>) -> String {
        let (nodes, kinds) = visible(tree, depth);
        let mut out = String::new();

        write!(out, "{:<44}", "NAME").unwrap();
        for kind in &kinds {
            write!(out, " {:>16}", kind.label().to_uppercase()).unwrap();
        }
        out.push('\n');
        writeln!(out, "{}", "-".repeat(44 + 17 * kinds.len())).unwrap();

        for id in nodes {
            let node = tree.node(id);
            let indent = "  ".repeat(depth_of(node.level()));
            let marker = if node.is_failed() { " [FAILED]" } else { "" };
            let name = format!("{indent}{}{marker}", node.name());
            write!(out, "{name:<44}").unwrap();
            for &kind in &kinds {
                write!(out, " {:>16}", cell(tree, id, kind)).unwrap();
            }
            out.push('\n');
        }
        out
    }

    fn format_diff(&self, diff: &CoverageDiff) -> String {
        let mut out = String::new();
        let current = diff
            .current_build
            .map_or_else(|| "current".to_string(), |n| format!("#{n}"));
        writeln!(
            out,
            "Coverage deltas: build {} vs previous build #{}",
            current, diff.previous_build
        )
        .unwrap();
        for m in &diff.metrics {
            if m.previous_percentage == ABSENT && m.current_percentage == ABSENT {
                continue;
            }
            writeln!(
                out,
                "  {:<14} {:>8} -> {:>8} {}",
                m.kind.label(),
                format_percentage(m.previous_percentage),
                format_percentage(m.current_percentage),
                m.trend.arrow()
            )
            .unwrap();
        }
        if diff.regressed() {
            out.push_str("\nStatement or branch coverage decreased.\n");
        }
        out
    }
}

/// Markdown formatter.
pub struct MarkdownFormatter;

fn diff_columns(diff: &CoverageDiff) -> Vec<&MetricDiff> {
    diff.metrics
        .iter()
        .filter(|m| m.previous_percentage != ABSENT || m.current_percentage != ABSENT)
        .collect()
}

impl ReportFormatter for MarkdownFormatter {
    fn format_tree(&self, tree: &CoverageTree, depth: Option<usize>) -> String {
        let (nodes, kinds) = visible(tree, depth);
        let mut md = String::new();

        md.push_str("| Name |");
        for kind in &kinds {
            write!(md, " {} |", kind.label()).unwrap();
        }
        md.push('\n');
        md.push_str("|:-----|");
        for _ in &kinds {
            md.push_str("-----:|");
        }
        md.push('\n');

        for id in nodes {
            let node = tree.node(id);
            let indent = "&nbsp;&nbsp;".repeat(depth_of(node.level()));
            let name = if node.is_failed() {
                format!("{indent}**{}** :x:", node.name())
            } else {
                format!("{indent}{}", node.name())
            };
            write!(md, "| {name} |").unwrap();
            for &kind in &kinds {
                write!(md, " {} |", cell(tree, id, kind)).unwrap();
            }
            md.push('\n');
        }
        md
    }

    fn format_diff(&self, diff: &CoverageDiff) -> String {
        let columns = diff_columns(diff);
        let mut md = String::new();

        md.push_str("### Coverage Deltas\n\n");
        md.push_str("| Build # |");
        for m in &columns {
            write!(md, " {} |", m.kind.label()).unwrap();
        }
        md.push('\n');
        md.push_str("|:--------|");
        for _ in &columns {
            md.push_str("-----:|");
        }
        md.push('\n');

        write!(md, "| Build #{} |", diff.previous_build).unwrap();
        for m in &columns {
            write!(md, " {} |", format_percentage(m.previous_percentage)).unwrap();
        }
        md.push('\n');

        match diff.current_build {
            Some(n) => write!(md, "| Build #{n} |").unwrap(),
            None => md.push_str("| Current |"),
        }
        for m in &columns {
            let arrow = m.trend.arrow();
            let value = format_percentage(m.current_percentage);
            if arrow.is_empty() {
                write!(md, " {value} |").unwrap();
            } else {
                write!(md, " {value} {arrow} |").unwrap();
            }
        }
        md.push('\n');

        if diff.regressed() {
            md.push_str("\n:warning: Statement or branch coverage decreased.\n");
        }
        md
    }
}

/// JSON formatter, for consumption by other tools.
pub struct JsonFormatter;

impl ReportFormatter for JsonFormatter {
    fn format_tree(&self, tree: &CoverageTree, _depth: Option<usize>) -> String {
        let mut json = serde_json::to_string_pretty(tree).expect("tree serializes to JSON");
        json.push('\n');
        json
    }

    fn format_diff(&self, diff: &CoverageDiff) -> String {
        let mut json = serde_json::to_string_pretty(diff).expect("diff serializes to JSON");
        json.push('\n');
        json
    }
}

/// Health score followed by one explanation per line.
pub fn format_health(report: Option<&HealthReport>) -> String {
    let Some(report) = report else {
        return "Health reporting disabled (no thresholds set).\n".to_string();
    };
    let mut out = String::new();
    writeln!(out, "Health: {}%", report.score).unwrap();
    for e in &report.explanations {
        writeln!(out, "  {e}").unwrap();
    }
    out
}

/// One row per build, newest first.
pub fn format_trend(points: &[TrendPoint]) -> String {
    if points.is_empty() {
        return "No coverage history.\n".to_string();
    }
    let kinds: Vec<MetricKind> = MetricKind::SCORED
        .into_iter()
        .filter(|&k| points.iter().any(|p| p.percentage(k).is_some()))
        .collect();
    let complexity = points.iter().any(|p| p.complexity.is_some());

    let mut out = String::new();
    write!(out, "{:<8}", "BUILD").unwrap();
    for kind in &kinds {
        write!(out, " {:>14}", kind.label().to_uppercase()).unwrap();
    }
    if complexity {
        write!(out, " {:>12}", "COMPLEXITY").unwrap();
    }
    out.push('\n');

    for point in points {
        write!(out, "{:<8}", format!("#{}", point.build)).unwrap();
        for &kind in &kinds {
            let value = point
                .percentage(kind)
                .map_or_else(|| "-".to_string(), |p| format!("{p}%"));
            write!(out, " {value:>14}").unwrap();
        }
        if complexity {
            let value = point
                .complexity
                .map_or_else(|| "-".to_string(), |c| c.to_string());
            write!(out, " {value:>12}").unwrap();
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::history::{compare, ComparableBuild};
    use crate::model::Ratios;

    const FLAT: &[u8] = include_bytes!("../tests/fixtures/coverage.xml");

    fn sample_diff() -> CoverageDiff {
        let mut previous = Ratios::new();
        previous[MetricKind::Statement] = Ratio::new(40.0, 100.0);
        previous[MetricKind::Branch] = Ratio::new(26.0, 100.0);
        let mut tree = decode([FLAT]).unwrap().tree;
        tree.set_build(2);
        compare(
            &tree,
            Some(&ComparableBuild {
                number: 1,
                ratios: previous,
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_format_ratio() {
        assert_eq!(
            format_ratio(MetricKind::Statement, &Ratio::new(23.0, 55.0)),
            "42% (23/55)"
        );
        assert_eq!(format_ratio(MetricKind::Complexity, &Ratio::new(31.0, 0.0)), "31");
    }

    #[test]
    fn test_text_tree() {
        let mut tree = decode([FLAT]).unwrap().tree;
        let unit = tree.find(&["TUTORIAL", "database.c"]).unwrap();
        tree.set_failed(unit);

        let out = TextFormatter.format_tree(&tree, None);
        assert!(out.starts_with("NAME"));
        assert!(out.contains("STATEMENT"));
        assert!(out.contains("42% (23/55)"));
        assert!(out.contains("    database.c [FAILED]"));
        assert!(out.contains("      Place_Order"));

        let shallow = TextFormatter.format_tree(&tree, Some(1));
        assert!(shallow.contains("TUTORIAL"));
        assert!(!shallow.contains("manager.c"));
    }

    #[test]
    fn test_markdown_tree() {
        let tree = decode([FLAT]).unwrap().tree;
        let md = MarkdownFormatter.format_tree(&tree, Some(2));
        assert!(md.starts_with("| Name | Statement | Branch | MC/DC | Complexity |"));
        assert!(md.contains("| VectorCAST | 42% (23/55) | 26% (13/50) | 8% (1/12) | 31 |"));
        assert!(!md.contains("Place_Order"));
    }

    #[test]
    fn test_text_diff() {
        let out = TextFormatter.format_diff(&sample_diff());
        assert!(out.contains("build #2 vs previous build #1"));
        assert!(out.contains("40.00% ->   41.82% ↑"));
        assert!(out.contains("MC/DC"));
        assert!(!out.contains("Function"));
    }

    #[test]
    fn test_markdown_diff() {
        let md = MarkdownFormatter.format_diff(&sample_diff());
        assert!(md.contains("| Build # | Statement | Branch | MC/DC |"));
        assert!(md.contains("| Build #1 | 40.00% | 26.00% | - |"));
        assert!(md.contains("| Build #2 | 41.82% ↑ | 26.00% | 8.33% |"));
        assert!(!md.contains(":warning:"));
    }

    #[test]
    fn test_json_diff() {
        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter.format_diff(&sample_diff())).unwrap();
        assert_eq!(json["previous_build"], 1);
        assert_eq!(json["metrics"][0]["kind"], "statement");
        assert_eq!(json["metrics"][0]["trend"], "increased");
        assert_eq!(json["metrics"][3]["previous_percentage"], -1.0);
    }

    #[test]
    fn test_format_trend() {
        let mut ratios = Ratios::new();
        ratios[MetricKind::Statement] = Ratio::new(1.0, 4.0);
        let mut history = crate::history::MemoryHistory::new();
        history.record(1, crate::history::BuildResult::Success, Some(ratios));
        let points = crate::history::trend_series(&history, 1, None).unwrap();

        let out = format_trend(&points);
        assert!(out.starts_with("BUILD"));
        assert!(out.contains("#1"));
        assert!(out.contains("25%"));
        assert!(!out.contains("COMPLEXITY"));
        assert_eq!(format_trend(&[]), "No coverage history.\n");
    }

    #[test]
    fn test_format_health() {
        let report = HealthReport {
            score: 20,
            explanations: vec!["Statement 23/55 (42%)".to_string()],
        };
        assert_eq!(
            format_health(Some(&report)),
            "Health: 20%\n  Statement 23/55 (42%)\n"
        );
        assert!(format_health(None).contains("disabled"));
    }
}
