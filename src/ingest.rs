use std::path::Path;

use crate::config::Config;
use crate::db::{self, SqliteHistory};
use crate::error::Result;
use crate::history::BuildResult;
use crate::pipeline::{evaluate, Verdict};
use rusqlite::Connection;

/// Read coverage documents in the given order.
pub fn read_documents<P: AsRef<Path>>(files: &[P]) -> Result<Vec<Vec<u8>>> {
    files
        .iter()
        .map(|f| {
            let path = f.as_ref();
            log::debug!("reading {}", path.display());
            Ok(std::fs::read(path)?)
        })
        .collect()
}

/// Record a build from its coverage files: evaluate it against the stored
/// history, then persist the documents and the verdict. The build number
/// defaults to one past the latest recorded build.
pub fn record<P: AsRef<Path>>(
    conn: &mut Connection,
    files: &[P],
    number: Option<u64>,
    incoming: BuildResult,
    config: &Config,
) -> Result<Verdict> {
    let documents = read_documents(files)?;
    let number = match number {
        Some(n) => n,
        None => db::next_build_number(conn)?,
    };

    // Only lower build numbers are consulted, so the build can be evaluated
    // before anything is written.
    let verdict = {
        let history = SqliteHistory::new(conn, config.cache_capacity);
        evaluate(number, &documents, incoming, config, &history)?
    };

    db::insert_build(conn, number, verdict.result, &documents)?;
    if let Some(tree) = &verdict.tree {
        db::set_build_ratios(conn, number, tree.ratios())?;
    }
    log::info!("recorded build #{} as {}", number, verdict.result);
    Ok(verdict)
}
