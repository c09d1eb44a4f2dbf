use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use covtrend::cli::{self, ResultArg, Style};
use covtrend::config::{Config, Overrides};
use covtrend::db;

/// covtrend — Build-over-build coverage aggregation, health scoring and
/// regression checks for VectorCAST coverage reports.
#[derive(Parser)]
#[command(name = "covtrend", version, about)]
struct Cli {
    /// Path to the SQLite database (default: ./.covtrend.db)
    #[arg(long, global = true, default_value = ".covtrend.db")]
    db: PathBuf,

    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fail builds whose coverage falls below a threshold minimum.
    #[arg(long, global = true)]
    use_threshold: bool,

    /// Fail builds whose statement or branch coverage decreased.
    #[arg(long, global = true)]
    use_coverage_history: bool,

    /// Maximum number of earlier builds to inspect for history.
    #[arg(long, global = true)]
    max_history: Option<usize>,

    /// Minimum statement coverage (%) of every source file.
    #[arg(long, global = true)]
    min_file_statement: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a build from its coverage documents and evaluate it.
    Record {
        /// Coverage documents, merged in the given order.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Build number (default: one past the latest build).
        #[arg(long)]
        build: Option<u64>,

        /// Result of the build before coverage is considered.
        #[arg(long, value_enum, default_value = "success")]
        result: ResultArg,
    },

    /// Show the coverage tree of a build.
    Summary {
        /// Build number. If omitted, uses the most recent build that did not fail.
        #[arg(long)]
        build: Option<u64>,

        /// Only show nodes up to this depth (1 = environments, 2 = units).
        #[arg(long)]
        depth: Option<usize>,

        /// Output style.
        #[arg(long, value_enum, default_value = "text")]
        style: Style,
    },

    /// List all recorded builds.
    Builds,

    /// Show the health score of a build.
    Health {
        /// Build number. If omitted, uses the latest build.
        #[arg(long)]
        build: Option<u64>,
    },

    /// Compare a build with the previous build that did not fail.
    Diff {
        /// Build number. If omitted, uses the latest build.
        #[arg(long)]
        build: Option<u64>,

        /// Output style.
        #[arg(long, value_enum, default_value = "text")]
        style: Style,
    },

    /// Show coverage of a build and the comparable builds before it.
    Trend {
        /// Build number. If omitted, uses the latest build.
        #[arg(long)]
        build: Option<u64>,
    },

    /// Delete a build from the database.
    Delete {
        /// Build number to delete.
        number: u64,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply(&Overrides {
        use_threshold: cli.use_threshold,
        use_coverage_history: cli.use_coverage_history,
        max_history: cli.max_history,
        min_file_statement: cli.min_file_statement,
    });

    let mut conn = db::open(&cli.db).context("Failed to open database")?;
    db::init_schema(&conn).context("Failed to initialize schema")?;

    let output = match cli.command {
        Commands::Record {
            files,
            build,
            result,
        } => cli::cmd_record(&mut conn, &files, build, result.into(), &config)?,
        Commands::Summary {
            build,
            depth,
            style,
        } => cli::cmd_summary(&conn, build, depth, &style, &config)?,
        Commands::Builds => cli::cmd_builds(&conn)?,
        Commands::Health { build } => cli::cmd_health(&conn, build, &config)?,
        Commands::Diff { build, style } => cli::cmd_diff(&conn, build, &style, &config)?,
        Commands::Trend { build } => cli::cmd_trend(&conn, build, &config)?,
        Commands::Delete { number } => cli::cmd_delete(&conn, number, &config)?,
    };
    print!("{output}");
    Ok(())
}
