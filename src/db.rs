use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::cell::RefCell;
use std::path::Path;

use crate::cache::TreeCache;
use crate::decode::decode_partial;
use crate::error::{CovError, Result};
use crate::history::{BuildHistory, BuildResult};
use crate::model::{MetricKind, Ratio, Ratios};
use crate::tree::CoverageTree;

pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &str = include_str!("../schema.sql");

/// Open (or create) the covtrend database at the given path.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
    Ok(conn)
}

/// Ensure the schema is initialized. Safe to call on an already-initialized DB.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: u32 = conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))?;
    if count == 0 {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        return Ok(());
    }

    let version: u32 =
        conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(CovError::Other(format!(
            "Database schema version {} is newer than this binary supports ({}). \
             Please upgrade covtrend.",
            version, SCHEMA_VERSION
        )));
    }
    if version < SCHEMA_VERSION {
        return Err(CovError::Other(format!(
            "No migration path from schema version {} to {}. \
             Consider deleting the database and recording builds again.",
            version, SCHEMA_VERSION
        )));
    }
    Ok(())
}

/// A recorded build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildInfo {
    pub id: i64,
    pub number: u64,
    pub result: BuildResult,
    pub created_at: String,
}

fn build_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, u64, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn to_info((id, number, result, created_at): (i64, u64, String, String)) -> Result<BuildInfo> {
    Ok(BuildInfo {
        id,
        number,
        result: result.parse()?,
        created_at,
    })
}

/// Record a build with its raw coverage documents. Returns the build id.
pub fn insert_build(
    conn: &mut Connection,
    number: u64,
    result: BuildResult,
    documents: &[Vec<u8>],
) -> Result<i64> {
    let tx = conn.transaction()?;
    let now = Utc::now().to_rfc3339();

    tx.execute(
        "INSERT INTO build (number, result, created_at) VALUES (?1, ?2, ?3)",
        params![number, result.as_str(), now],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            CovError::Other(format!(
                "Build #{} already exists. Use --build to choose a different number, or delete it first.",
                number
            ))
        }
        other => CovError::Sqlite(other),
    })?;
    let build_id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO build_document (build_id, seq, content) VALUES (?1, ?2, ?3)",
        )?;
        for (seq, content) in documents.iter().enumerate() {
            stmt.execute(params![build_id, seq as i64, content])?;
        }
    }

    tx.commit()?;
    Ok(build_id)
}

pub fn set_build_result(conn: &Connection, number: u64, result: BuildResult) -> Result<()> {
    let changed = conn.execute(
        "UPDATE build SET result = ?1 WHERE number = ?2",
        params![result.as_str(), number],
    )?;
    if changed == 0 {
        return Err(CovError::BuildNotFound(format!("#{number}")));
    }
    Ok(())
}

/// Store the root ratios of a build, replacing any earlier summary.
pub fn set_build_ratios(conn: &mut Connection, number: u64, ratios: &Ratios) -> Result<()> {
    let tx = conn.transaction()?;
    let build_id = build_id(&tx, number)?;
    tx.execute("DELETE FROM build_ratio WHERE build_id = ?1", params![build_id])?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO build_ratio (build_id, kind, numerator, denominator) \
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (kind, ratio) in ratios.iter().filter(|(_, r)| r.is_initialized()) {
            stmt.execute(params![
                build_id,
                kind.as_str(),
                ratio.numerator(),
                ratio.denominator()
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn build_id(tx: &Transaction, number: u64) -> Result<i64> {
    tx.query_row(
        "SELECT id FROM build WHERE number = ?1",
        params![number],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| CovError::BuildNotFound(format!("#{number}")))
}

pub fn get_build(conn: &Connection, number: u64) -> Result<BuildInfo> {
    let row = conn
        .query_row(
            "SELECT id, number, result, created_at FROM build WHERE number = ?1",
            params![number],
            build_from_row,
        )
        .optional()?
        .ok_or_else(|| CovError::BuildNotFound(format!("#{number}")))?;
    to_info(row)
}

/// Number of the highest recorded build, if any.
pub fn get_latest_build(conn: &Connection) -> Result<Option<u64>> {
    Ok(conn
        .query_row("SELECT MAX(number) FROM build", [], |row| {
            row.get::<_, Option<u64>>(0)
        })?)
}

pub fn next_build_number(conn: &Connection) -> Result<u64> {
    Ok(get_latest_build(conn)?.map_or(1, |n| n + 1))
}

/// All builds, newest first.
pub fn list_builds(conn: &Connection) -> Result<Vec<BuildInfo>> {
    let mut stmt =
        conn.prepare("SELECT id, number, result, created_at FROM build ORDER BY number DESC")?;
    let rows = stmt.query_map([], build_from_row)?;
    let mut result = Vec::new();
    for row in rows {
        result.push(to_info(row?)?);
    }
    Ok(result)
}

/// Raw documents of a build, in recording order.
pub fn load_documents(conn: &Connection, number: u64) -> Result<Vec<Vec<u8>>> {
    let build = get_build(conn, number)?;
    let mut stmt = conn.prepare_cached(
        "SELECT content FROM build_document WHERE build_id = ?1 ORDER BY seq",
    )?;
    let rows = stmt.query_map(params![build.id], |row| row.get::<_, Vec<u8>>(0))?;
    let mut docs = Vec::new();
    for row in rows {
        docs.push(row?);
    }
    Ok(docs)
}

/// Stored root ratios of a build; `None` when none were stored.
pub fn get_build_ratios(conn: &Connection, number: u64) -> Result<Option<Ratios>> {
    let mut stmt = conn.prepare_cached(
        "SELECT r.kind, r.numerator, r.denominator FROM build_ratio r \
         JOIN build b ON b.id = r.build_id WHERE b.number = ?1",
    )?;
    let rows = stmt.query_map(params![number], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, f64>(2)?,
        ))
    })?;

    let mut ratios = Ratios::new();
    let mut any = false;
    for row in rows {
        let (kind, n, d) = row?;
        let kind: MetricKind = kind.parse()?;
        ratios[kind] = Ratio::new(n, d);
        any = true;
    }
    Ok(any.then_some(ratios))
}

/// Delete a build together with its documents and summary.
/// Child rows are removed via ON DELETE CASCADE.
pub fn delete_build(conn: &Connection, number: u64) -> Result<()> {
    let changed = conn.execute("DELETE FROM build WHERE number = ?1", params![number])?;
    if changed == 0 {
        return Err(CovError::BuildNotFound(format!("#{number}")));
    }
    Ok(())
}

/// [`BuildHistory`] backed by the database, with decoded trees cached.
///
/// The cache lives as long as the history value, so one command that looks
/// at a build several times decodes its documents once.
pub struct SqliteHistory<'a> {
    conn: &'a Connection,
    cache: RefCell<TreeCache>,
}

impl<'a> SqliteHistory<'a> {
    pub fn new(conn: &'a Connection, cache_capacity: usize) -> Self {
        Self {
            conn,
            cache: RefCell::new(TreeCache::new(cache_capacity)),
        }
    }

    /// Decoded tree of a build, from the cache when possible. Documents
    /// stored before an unreadable one still make up the tree.
    pub fn tree(&self, number: u64) -> Result<CoverageTree> {
        if let Some(tree) = self.cache.borrow_mut().get(number) {
            return Ok(tree.clone());
        }
        let docs = load_documents(self.conn, number)?;
        let partial = decode_partial(&docs);
        let Some(decoded) = partial.decoded else {
            return Err(partial.error.unwrap_or(CovError::NoReportsFound));
        };
        if let Some(e) = &partial.error {
            log::warn!("build #{number}: {e}; using the documents before it");
        }
        let mut tree = decoded.tree;
        tree.set_build(number);
        self.cache.borrow_mut().insert(number, tree.clone());
        Ok(tree)
    }

    /// Forget a cached tree.
    pub fn invalidate(&self, number: u64) {
        self.cache.borrow_mut().evict(number);
    }

    /// Delete a build and drop its cached tree.
    pub fn delete(&self, number: u64) -> Result<()> {
        self.invalidate(number);
        delete_build(self.conn, number)
    }

    pub fn is_cached(&self, number: u64) -> bool {
        self.cache.borrow().contains(number)
    }
}

impl BuildHistory for SqliteHistory<'_> {
    fn previous_build(&self, build: u64) -> Result<Option<u64>> {
        Ok(self.conn.query_row(
            "SELECT MAX(number) FROM build WHERE number < ?1",
            params![build],
            |row| row.get::<_, Option<u64>>(0),
        )?)
    }

    fn result(&self, build: u64) -> Result<Option<BuildResult>> {
        let result: Option<String> = self
            .conn
            .query_row(
                "SELECT result FROM build WHERE number = ?1",
                params![build],
                |row| row.get(0),
            )
            .optional()?;
        result.map(|r| r.parse()).transpose()
    }

    /// Cached tree first, then the stored summary. Builds without a summary
    /// are decoded from their documents.
    fn coverage(&self, build: u64) -> Result<Option<Ratios>> {
        if let Some(tree) = self.cache.borrow_mut().get(build) {
            return Ok(Some(*tree.ratios()));
        }
        if let Some(ratios) = get_build_ratios(self.conn, build)? {
            return Ok(Some(ratios));
        }
        match self.tree(build) {
            Ok(tree) => Ok(Some(*tree.ratios())),
            Err(CovError::Sqlite(e)) => Err(e.into()),
            Err(e) => {
                log::debug!("build #{build} has no readable coverage: {e}");
                Ok(None)
            }
        }
    }
}
