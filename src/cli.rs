//! Command handler functions for the covtrend CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use rusqlite::Connection;

use crate::config::Config;
use crate::db::{self, SqliteHistory};
use crate::history::{self, BuildResult};
use crate::model::MetricKind;
use crate::report::{self, JsonFormatter, MarkdownFormatter, ReportFormatter, TextFormatter};
use crate::rules::enforce_all;

/// Output style for the `summary` and `diff` commands.
#[derive(Clone, ValueEnum)]
pub enum Style {
    Text,
    Markdown,
    Json,
}

impl Style {
    fn formatter(&self) -> &'static dyn ReportFormatter {
        match self {
            Style::Text => &TextFormatter,
            Style::Markdown => &MarkdownFormatter,
            Style::Json => &JsonFormatter,
        }
    }
}

/// Build result given on the command line.
#[derive(Clone, Copy, ValueEnum)]
pub enum ResultArg {
    Success,
    Unstable,
    Failure,
}

impl From<ResultArg> for BuildResult {
    fn from(arg: ResultArg) -> Self {
        match arg {
            ResultArg::Success => BuildResult::Success,
            ResultArg::Unstable => BuildResult::Unstable,
            ResultArg::Failure => BuildResult::Failure,
        }
    }
}

fn resolve_build(conn: &Connection, build: Option<u64>) -> Result<u64> {
    match build {
        Some(n) => Ok(n),
        None => db::get_latest_build(conn)?
            .ok_or_else(|| anyhow::anyhow!("No builds found in database")),
    }
}

pub fn cmd_record<P: AsRef<Path>>(
    conn: &mut Connection,
    files: &[P],
    build: Option<u64>,
    result: BuildResult,
    config: &Config,
) -> Result<String> {
    let verdict = crate::ingest::record(conn, files, build, result, config)
        .context("Failed to record build")?;

    let mut out = String::new();
    for line in &verdict.messages {
        writeln!(out, "{line}").unwrap();
    }
    writeln!(out, "Recorded build #{} → {}", verdict.build, verdict.result).unwrap();
    Ok(out)
}

/// Print the tree of a build. Without a build number, the most recent build
/// that did not fail is shown.
pub fn cmd_summary(
    conn: &Connection,
    build: Option<u64>,
    depth: Option<usize>,
    style: &Style,
    config: &Config,
) -> Result<String> {
    let history = SqliteHistory::new(conn, config.cache_capacity);
    let number = match build {
        Some(n) => n,
        None => {
            let latest = resolve_build(conn, None)?;
            history::last_result(&history, latest, config.max_history)?
                .map(|b| b.number)
                .ok_or_else(|| anyhow::anyhow!("No build with coverage found"))?
        }
    };
    let info = db::get_build(conn, number)?;
    let mut tree = history.tree(number)?;
    enforce_all(&config.build_rules(), &mut tree);

    let mut out = String::new();
    writeln!(out, "Build:      #{}", info.number).unwrap();
    writeln!(out, "Result:     {}", info.result).unwrap();
    writeln!(out, "Recorded:   {}", info.created_at).unwrap();
    out.push('\n');
    out.push_str(&style.formatter().format_tree(&tree, depth));
    Ok(out)
}

pub fn cmd_builds(conn: &Connection) -> Result<String> {
    let builds = db::list_builds(conn)?;
    if builds.is_empty() {
        return Ok("No builds in database.\n".to_string());
    }
    let mut out = String::new();
    writeln!(
        out,
        "{:<8} {:<10} {:>12} {:>12} CREATED",
        "BUILD", "RESULT", "STATEMENT", "BRANCH"
    )
    .unwrap();
    writeln!(out, "{}", "-".repeat(78)).unwrap();
    for b in &builds {
        let ratios = db::get_build_ratios(conn, b.number)?;
        let pct = |kind: MetricKind| {
            ratios
                .as_ref()
                .map(|r| &r[kind])
                .filter(|r| r.is_initialized())
                .map_or_else(|| "-".to_string(), |r| format!("{}%", r.percentage()))
        };
        writeln!(
            out,
            "{:<8} {:<10} {:>12} {:>12} {}",
            format!("#{}", b.number),
            b.result,
            pct(MetricKind::Statement),
            pct(MetricKind::Branch),
            b.created_at
        )
        .unwrap();
    }
    Ok(out)
}

pub fn cmd_health(conn: &Connection, build: Option<u64>, config: &Config) -> Result<String> {
    let number = resolve_build(conn, build)?;
    let history = SqliteHistory::new(conn, config.cache_capacity);
    let tree = history.tree(number)?;
    let report = crate::health::score(&tree, config.health_thresholds());
    Ok(report::format_health(report.as_ref()))
}

pub fn cmd_diff(
    conn: &Connection,
    build: Option<u64>,
    style: &Style,
    config: &Config,
) -> Result<String> {
    let number = resolve_build(conn, build)?;
    let history = SqliteHistory::new(conn, config.cache_capacity);
    let tree = history.tree(number)?;
    let previous = history::find_previous(&history, number, config.max_history)?;

    match history::compare(&tree, previous.as_ref()) {
        Some(diff) => Ok(style.formatter().format_diff(&diff)),
        None => Ok(format!(
            "No previous non-failing build to compare build #{number} with.\n"
        )),
    }
}

pub fn cmd_trend(conn: &Connection, build: Option<u64>, config: &Config) -> Result<String> {
    let number = resolve_build(conn, build)?;
    let history = SqliteHistory::new(conn, config.cache_capacity);
    let points = history::trend_series(&history, number, config.max_history)?;
    Ok(report::format_trend(&points))
}

pub fn cmd_delete(conn: &Connection, number: u64, config: &Config) -> Result<String> {
    SqliteHistory::new(conn, config.cache_capacity).delete(number)?;
    Ok(format!("Deleted build #{number}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAT: &[u8] = include_bytes!("../tests/fixtures/coverage.xml");
    const NESTED: &[u8] = include_bytes!("../tests/fixtures/coverageh.xml");

    /// Create an in-memory database with schema initialized.
    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    /// Store a build directly, bypassing file I/O.
    fn seed_build(conn: &mut Connection, number: u64, result: BuildResult, docs: &[&[u8]]) {
        let docs: Vec<Vec<u8>> = docs.iter().map(|d| d.to_vec()).collect();
        db::insert_build(conn, number, result, &docs).unwrap();
        let tree = crate::decode::decode(&docs).unwrap().tree;
        db::set_build_ratios(conn, number, tree.ratios()).unwrap();
    }

    #[test]
    fn test_cmd_builds() {
        let mut conn = test_db();
        seed_build(&mut conn, 1, BuildResult::Success, &[FLAT]);
        seed_build(&mut conn, 2, BuildResult::Failure, &[FLAT, NESTED]);

        let out = cmd_builds(&conn).unwrap();
        assert!(out.contains("BUILD"));
        assert!(out.contains("#1"));
        assert!(out.contains("failure"));
        assert!(out.contains("45%"));
        // Newest first
        assert!(out.find("#2").unwrap() < out.find("#1").unwrap());
    }

    #[test]
    fn test_cmd_builds_empty() {
        let conn = test_db();
        assert_eq!(cmd_builds(&conn).unwrap(), "No builds in database.\n");
    }

    #[test]
    fn test_cmd_summary_skips_failed_builds() {
        let mut conn = test_db();
        seed_build(&mut conn, 1, BuildResult::Success, &[FLAT]);
        seed_build(&mut conn, 2, BuildResult::Failure, &[FLAT, NESTED]);

        let out = cmd_summary(&conn, None, None, &Style::Text, &Config::default()).unwrap();
        assert!(out.contains("Build:      #1"));
        assert!(out.contains("42% (23/55)"));

        let out = cmd_summary(&conn, Some(2), Some(1), &Style::Text, &Config::default()).unwrap();
        assert!(out.contains("45% (43/95)"));
        assert!(out.contains("HARDWARE"));
        assert!(!out.contains("sensor.c"));
    }

    #[test]
    fn test_cmd_summary_marks_rule_failures() {
        let mut conn = test_db();
        seed_build(&mut conn, 1, BuildResult::Success, &[FLAT]);
        let config = Config::from_toml(
            "[[rules]]\nkind = \"statement-per-source-file\"\nmin_percentage = 50.0\n",
        )
        .unwrap();

        let out = cmd_summary(&conn, Some(1), None, &Style::Markdown, &config).unwrap();
        assert!(out.contains("**database.c** :x:"));
        assert!(!out.contains("**manager.c**"));
    }

    #[test]
    fn test_cmd_health() {
        let mut conn = test_db();
        seed_build(&mut conn, 1, BuildResult::Success, &[FLAT]);

        let out = cmd_health(&conn, None, &Config::default()).unwrap();
        assert!(out.starts_with("Health: "));
        assert!(out.contains("Statement 23/55 (42%)"));

        let disabled = Config {
            health: false,
            ..Config::default()
        };
        assert!(cmd_health(&conn, None, &disabled).unwrap().contains("disabled"));
    }

    #[test]
    fn test_cmd_diff() {
        let mut conn = test_db();
        seed_build(&mut conn, 1, BuildResult::Success, &[NESTED]);
        seed_build(&mut conn, 2, BuildResult::Success, &[FLAT]);

        let out = cmd_diff(&conn, None, &Style::Text, &Config::default()).unwrap();
        assert!(out.contains("build #2 vs previous build #1"));
        assert!(out.contains("↓"));
        assert!(out.contains("Statement or branch coverage decreased."));

        let md = cmd_diff(&conn, Some(2), &Style::Markdown, &Config::default()).unwrap();
        assert!(md.contains("| Build #1 | 50.00% |"));

        let json = cmd_diff(&conn, Some(2), &Style::Json, &Config::default()).unwrap();
        assert!(json.contains("\"current_build\": 2"));

        let first = cmd_diff(&conn, Some(1), &Style::Text, &Config::default()).unwrap();
        assert!(first.contains("No previous non-failing build"));
    }

    #[test]
    fn test_cmd_trend() {
        let mut conn = test_db();
        seed_build(&mut conn, 1, BuildResult::Success, &[NESTED]);
        seed_build(&mut conn, 2, BuildResult::Failure, &[NESTED]);
        seed_build(&mut conn, 3, BuildResult::Success, &[FLAT]);

        let out = cmd_trend(&conn, None, &Config::default()).unwrap();
        assert!(out.contains("#3"));
        assert!(!out.contains("#2"));
        assert!(out.contains("#1"));
        assert!(out.contains("COMPLEXITY"));
    }

    #[test]
    fn test_cmd_delete() {
        let mut conn = test_db();
        seed_build(&mut conn, 1, BuildResult::Success, &[FLAT]);
        assert_eq!(
            cmd_delete(&conn, 1, &Config::default()).unwrap(),
            "Deleted build #1\n"
        );
        assert!(cmd_delete(&conn, 1, &Config::default()).is_err());
    }

    #[test]
    fn test_commands_without_builds() {
        let conn = test_db();
        assert!(cmd_health(&conn, None, &Config::default()).is_err());
        assert!(cmd_summary(&conn, None, None, &Style::Text, &Config::default()).is_err());
    }
}
