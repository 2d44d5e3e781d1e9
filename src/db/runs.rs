use crate::domain::RunSummary;
use crate::errors::CrawlError;
use rusqlite::{params, Connection};
use serde::Serialize;

/// One row of `crawl_runs`, as listed by the `runs` command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRun {
    pub id: i64,
    pub layout: String,
    pub search_url: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub pages_visited: Option<i64>,
    pub listings_inserted: Option<i64>,
    pub listings_skipped: Option<i64>,
    pub stop_reason: Option<String>,
}

pub fn start_crawl_run(
    conn: &Connection,
    layout: &str,
    search_url: &str,
    now: i64,
) -> Result<i64, CrawlError> {
    conn.execute(
        "INSERT INTO crawl_runs (layout, search_url, started_at) VALUES (?, ?, ?)",
        params![layout, search_url, now],
    )
    .map_err(|e| CrawlError::StoreUnavailable(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

pub fn end_crawl_run(
    conn: &Connection,
    run_id: i64,
    now: i64,
    summary: &RunSummary,
) -> Result<(), CrawlError> {
    conn.execute(
        "UPDATE crawl_runs SET finished_at = ?, pages_visited = ?, listings_inserted = ?, \
         listings_skipped = ?, stop_reason = ? WHERE id = ?",
        params![
            now,
            summary.pages_visited,
            summary.listings_inserted,
            summary.listings_skipped,
            summary.stop_reason.as_str(),
            run_id
        ],
    )
    .map_err(|e| CrawlError::StoreUnavailable(e.to_string()))?;
    Ok(())
}

pub fn get_recent_runs(conn: &Connection, limit: u32) -> Result<Vec<CrawlRun>, CrawlError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, layout, search_url, started_at, finished_at, pages_visited, \
             listings_inserted, listings_skipped, stop_reason \
             FROM crawl_runs ORDER BY id DESC LIMIT ?",
        )
        .map_err(|e| CrawlError::StoreUnavailable(e.to_string()))?;

    let rows = stmt
        .query_map(params![limit], |row| {
            Ok(CrawlRun {
                id: row.get(0)?,
                layout: row.get(1)?,
                search_url: row.get(2)?,
                started_at: row.get(3)?,
                finished_at: row.get(4)?,
                pages_visited: row.get(5)?,
                listings_inserted: row.get(6)?,
                listings_skipped: row.get(7)?,
                stop_reason: row.get(8)?,
            })
        })
        .map_err(|e| CrawlError::StoreUnavailable(e.to_string()))?;

    let mut runs = Vec::new();
    for r in rows {
        runs.push(r.map_err(|e| CrawlError::StoreUnavailable(e.to_string()))?);
    }
    Ok(runs)
}
