use rusqlite::Connection;
use std::path::Path;
use tracing::info;

use crate::errors::CrawlError;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// One SQLite connection, owned for the whole run.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CrawlError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            CrawlError::StoreUnavailable(format!("Open DB {} failed: {e}", path.display()))
        })?;
        let db = Self { conn };
        db.init()?;
        info!(path = %path.display(), "Database ready");
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CrawlError::StoreUnavailable(format!("Open DB failed: {e}")))?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Provides the connection to the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, CrawlError>
    where
        F: FnOnce(&Connection) -> Result<T, CrawlError>,
    {
        f(&self.conn)
    }

    fn init(&self) -> Result<(), CrawlError> {
        self.add_source_url_column()?;
        self.conn
            .execute_batch(SCHEMA_SQL)
            .map_err(|e| CrawlError::StoreUnavailable(format!("Failed to apply schema: {e}")))
    }

    /// Stores created before card links were recorded lack `source_url`; the
    /// schema's index on it needs the column first.
    fn add_source_url_column(&self) -> Result<(), CrawlError> {
        let mut stmt = self.conn.prepare("SELECT name FROM pragma_table_info('listings')")?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        if !columns.is_empty() && !columns.iter().any(|c| c == "source_url") {
            self.conn.execute("ALTER TABLE listings ADD COLUMN source_url TEXT", [])?;
            info!("Added source_url column to listings");
        }
        Ok(())
    }

    pub fn close(self) -> Result<(), CrawlError> {
        self.conn
            .close()
            .map_err(|(_, e)| CrawlError::StoreUnavailable(format!("Close DB failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_applied_and_reapplied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.db");

        Database::open(&path).unwrap().close().unwrap();
        let db = Database::open(&path).unwrap();

        let tables: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master \
                     WHERE type = 'table' AND name IN ('listings', 'crawl_runs')",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn older_store_gains_the_source_url_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE listings (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    location TEXT NOT NULL,
                    min_price INTEGER NOT NULL,
                    max_price INTEGER NOT NULL,
                    per_sqft_cost INTEGER NOT NULL,
                    num_units INTEGER,
                    area_value REAL,
                    area_raw TEXT,
                    area_unit TEXT NOT NULL,
                    photo_url TEXT NOT NULL,
                    listing_url TEXT NOT NULL,
                    amenities_json TEXT NOT NULL DEFAULT '[]',
                    latitude REAL,
                    longitude REAL,
                    scrape_timestamp INTEGER NOT NULL
                );
                INSERT INTO listings (name, location, min_price, max_price, per_sqft_cost,
                    area_unit, photo_url, listing_url, scrape_timestamp)
                VALUES ('Alpha', 'Hebbal', 0, 0, 0, 'N/A', 'N/A', 'https://example.test/a', 0);",
            )
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let (rows, nulls): (i64, i64) = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*), SUM(source_url IS NULL) FROM listings",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .unwrap();
        assert_eq!((rows, nulls), (1, 1));
    }

    #[test]
    fn unopenable_path_is_store_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("crawl.db");

        assert!(matches!(
            Database::open(&path),
            Err(CrawlError::StoreUnavailable(_))
        ));
    }
}
