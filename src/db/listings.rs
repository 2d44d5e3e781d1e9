use crate::db::connection::Database;
use crate::db::runs::{end_crawl_run, get_recent_runs, start_crawl_run, CrawlRun};
use crate::domain::{DedupKey, ListingRecord, RunSummary, UNKNOWN_URL};
use crate::errors::CrawlError;
use crate::normalize::{AreaMagnitude, AreaValue};
use chrono::Utc;
use rusqlite::{params, Row};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same key was already stored; nothing was written.
    Duplicate,
}

/// Persisted listing set used to skip listings seen in earlier runs.
///
/// Records are append-only. Run bookkeeping is optional for implementors.
pub trait DedupStore {
    fn exists(&mut self, key: &DedupKey) -> Result<bool, CrawlError>;

    fn insert(&mut self, record: &ListingRecord) -> Result<InsertOutcome, CrawlError>;

    fn start_run(&mut self, _layout: &str, _search_url: &str) -> Result<(), CrawlError> {
        Ok(())
    }

    fn finish_run(&mut self, _summary: &RunSummary) -> Result<(), CrawlError> {
        Ok(())
    }

    fn close(self) -> Result<(), CrawlError>
    where
        Self: Sized;
}

pub struct SqliteStore {
    db: Database,
    run_id: Option<i64>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db, run_id: None }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, CrawlError> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Every stored record, oldest first.
    pub fn load_all(&self) -> Result<Vec<ListingRecord>, CrawlError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, location, min_price, max_price, per_sqft_cost, num_units, \
                 area_value, area_raw, area_unit, photo_url, listing_url, amenities_json, \
                 latitude, longitude, scrape_timestamp, source_url FROM listings ORDER BY id",
            )?;

            let rows = stmt.query_map([], |row| read_record(row))?;

            let mut records = Vec::new();
            for r in rows {
                records.push(r?);
            }
            Ok(records)
        })
    }

    pub fn count(&self) -> Result<i64, CrawlError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?)
        })
    }

    /// Latest crawl runs, newest first.
    pub fn recent_runs(&self, limit: u32) -> Result<Vec<CrawlRun>, CrawlError> {
        self.db.with_conn(|conn| get_recent_runs(conn, limit))
    }
}

impl DedupStore for SqliteStore {
    fn exists(&mut self, key: &DedupKey) -> Result<bool, CrawlError> {
        self.db.with_conn(|conn| {
            let found = match key {
                DedupKey::Url(url) => conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM listings \
                     WHERE listing_url = ?1 OR source_url = ?1)",
                    params![url],
                    |row| row.get::<_, bool>(0),
                )?,
                DedupKey::Composite {
                    name,
                    location,
                    min_price,
                    max_price,
                } => conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM listings WHERE listing_url = ?1 \
                     AND name = ?2 AND location = ?3 AND min_price = ?4 AND max_price = ?5)",
                    params![UNKNOWN_URL, name, location, min_price, max_price],
                    |row| row.get::<_, bool>(0),
                )?,
            };
            Ok(found)
        })
    }

    fn insert(&mut self, record: &ListingRecord) -> Result<InsertOutcome, CrawlError> {
        // also catches a canonical url that was stored as another card's link
        if self.exists(&DedupKey::for_record(record))? {
            return Ok(InsertOutcome::Duplicate);
        }

        let amenities = serde_json::to_string(&record.amenities)
            .map_err(|e| CrawlError::StoreUnavailable(format!("Encode amenities failed: {e}")))?;
        let (area_value, area_raw) = match &record.total_area.magnitude {
            AreaMagnitude::Value(v) => (Some(*v), None),
            AreaMagnitude::Raw(text) => (None, Some(text.as_str())),
        };

        self.db.with_conn(|conn| {
            let changed = conn.execute(
                r#"
                INSERT OR IGNORE INTO listings (
                    name, location, min_price, max_price, per_sqft_cost, num_units,
                    area_value, area_raw, area_unit, photo_url, listing_url,
                    amenities_json, latitude, longitude, scrape_timestamp, source_url
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                "#,
                params![
                    record.name,
                    record.location,
                    record.min_price,
                    record.max_price,
                    record.per_sqft_cost,
                    record.num_units,
                    area_value,
                    area_raw,
                    record.total_area.unit,
                    record.photo_url,
                    record.listing_url,
                    amenities,
                    record.latitude,
                    record.longitude,
                    record.scrape_timestamp,
                    record.source_url,
                ],
            )?;

            Ok(if changed == 0 {
                InsertOutcome::Duplicate
            } else {
                InsertOutcome::Inserted
            })
        })
    }

    fn start_run(&mut self, layout: &str, search_url: &str) -> Result<(), CrawlError> {
        let id = self
            .db
            .with_conn(|conn| start_crawl_run(conn, layout, search_url, Utc::now().timestamp()))?;
        debug!(run_id = id, "Crawl run recorded");
        self.run_id = Some(id);
        Ok(())
    }

    fn finish_run(&mut self, summary: &RunSummary) -> Result<(), CrawlError> {
        let Some(id) = self.run_id.take() else {
            return Ok(());
        };
        self.db
            .with_conn(|conn| end_crawl_run(conn, id, Utc::now().timestamp(), summary))
    }

    fn close(self) -> Result<(), CrawlError> {
        self.db.close()
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<ListingRecord> {
    let area_value: Option<f64> = row.get(6)?;
    let area_raw: Option<String> = row.get(7)?;
    let magnitude = match area_value {
        Some(v) => AreaMagnitude::Value(v),
        None => AreaMagnitude::Raw(area_raw.unwrap_or_default()),
    };
    let amenities_json: String = row.get(11)?;
    // a malformed column reads as no amenities rather than failing the export
    let amenities = serde_json::from_str(&amenities_json).unwrap_or_default();

    Ok(ListingRecord {
        name: row.get(0)?,
        location: row.get(1)?,
        min_price: row.get(2)?,
        max_price: row.get(3)?,
        per_sqft_cost: row.get(4)?,
        num_units: row.get(5)?,
        total_area: AreaValue {
            magnitude,
            unit: row.get(8)?,
        },
        photo_url: row.get(9)?,
        listing_url: row.get(10)?,
        source_url: row.get(15)?,
        amenities,
        latitude: row.get(12)?,
        longitude: row.get(13)?,
        scrape_timestamp: row.get(14)?,
    })
}

/// Writes every stored record to `path` as a pretty-printed JSON array.
pub fn export_json(store: &SqliteStore, path: impl AsRef<Path>) -> Result<usize, CrawlError> {
    let records = store.load_all()?;
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &records)
        .map_err(|e| CrawlError::Io(std::io::Error::other(e)))?;
    Ok(records.len())
}
