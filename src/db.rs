use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::collector::RecordSink;
use crate::model::{AdRecord, AdStatus, Asset, AssetKind};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS ads (
            id                INTEGER PRIMARY KEY,
            ad_id             TEXT UNIQUE NOT NULL,
            status            TEXT NOT NULL CHECK(status IN ('active','inactive','unknown')),
            platforms         TEXT NOT NULL DEFAULT '[]',
            start_date        TEXT,
            end_date          TEXT,
            asset_url         TEXT,
            asset_type        TEXT CHECK(asset_type IN ('image','video')),
            asset_path        TEXT,
            multiple_versions BOOLEAN NOT NULL DEFAULT 0,
            scraped_at        TEXT NOT NULL,
            created_at        TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at        TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_ads_status ON ads(status);
        CREATE INDEX IF NOT EXISTS idx_ads_start_date ON ads(start_date);
        CREATE INDEX IF NOT EXISTS idx_ads_scraped_at ON ads(scraped_at);
        ",
    )?;
    Ok(())
}

/// SQLite-backed ad store; the collector's record sink.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = connect(path)?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl RecordSink for Store {
    fn upsert(&mut self, record: &AdRecord) -> Result<Option<i64>> {
        upsert_ad(&self.conn, record)
    }
}

// ── Writes ──

/// Insert or update by `ad_id`; every collected field is last-write-wins.
pub fn upsert_ad(conn: &Connection, record: &AdRecord) -> Result<Option<i64>> {
    let platforms = serde_json::to_string(record.platforms())?;
    let asset = record.asset.as_ref();
    let mut stmt = conn.prepare_cached(
        "INSERT INTO ads
         (ad_id, status, platforms, start_date, end_date, asset_url, asset_type, asset_path,
          multiple_versions, scraped_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(ad_id) DO UPDATE SET
            status = excluded.status,
            platforms = excluded.platforms,
            start_date = excluded.start_date,
            end_date = excluded.end_date,
            asset_url = excluded.asset_url,
            asset_type = excluded.asset_type,
            asset_path = excluded.asset_path,
            multiple_versions = excluded.multiple_versions,
            scraped_at = excluded.scraped_at,
            updated_at = datetime('now')
         RETURNING id",
    )?;
    let id = stmt
        .query_row(
            rusqlite::params![
                record.id,
                record.status.as_str(),
                platforms,
                record.start_date.map(|d| d.to_string()),
                record.end_date.map(|d| d.to_string()),
                asset.map(|a| a.url.as_str()),
                asset.map(|a| a.kind.as_str()),
                record.local_path(),
                record.multiple_versions,
                timestamp(&record.observed_at),
            ],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Fixed-width UTC timestamps so text order is time order.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ── Reads ──

/// A stored ad with its surrogate key.
#[derive(Debug, Clone)]
pub struct StoredAd {
    pub row_id: i64,
    pub record: AdRecord,
}

const AD_COLUMNS: &str = "id, ad_id, status, platforms, start_date, end_date, asset_url, \
     asset_type, asset_path, multiple_versions, scraped_at";

struct AdRow {
    row_id: i64,
    ad_id: String,
    status: String,
    platforms: String,
    start_date: Option<String>,
    end_date: Option<String>,
    asset_url: Option<String>,
    asset_type: Option<String>,
    asset_path: Option<String>,
    multiple_versions: bool,
    scraped_at: String,
}

fn read_row(row: &Row) -> rusqlite::Result<AdRow> {
    Ok(AdRow {
        row_id: row.get(0)?,
        ad_id: row.get(1)?,
        status: row.get(2)?,
        platforms: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        asset_url: row.get(6)?,
        asset_type: row.get(7)?,
        asset_path: row.get(8)?,
        multiple_versions: row.get(9)?,
        scraped_at: row.get(10)?,
    })
}

impl AdRow {
    fn into_stored(self) -> Result<StoredAd> {
        let mut record = AdRecord::new(self.ad_id);
        record.status = AdStatus::parse(&self.status).unwrap_or(AdStatus::Unknown);
        let platforms: Vec<String> = serde_json::from_str(&self.platforms)
            .with_context(|| format!("Bad platforms column for ad {}", record.id))?;
        record.set_platforms(platforms);
        record.start_date = self.start_date.as_deref().map(parse_date).transpose()?;
        record.end_date = self.end_date.as_deref().map(parse_date).transpose()?;
        record.asset = self.asset_url.map(|url| Asset {
            url,
            kind: self
                .asset_type
                .as_deref()
                .and_then(AssetKind::parse)
                .unwrap_or(AssetKind::Image),
            local_path: self.asset_path,
        });
        record.multiple_versions = self.multiple_versions;
        record.observed_at = DateTime::parse_from_rfc3339(&self.scraped_at)
            .with_context(|| format!("Bad scraped_at for ad {}", record.id))?
            .with_timezone(&Utc);
        Ok(StoredAd {
            row_id: self.row_id,
            record,
        })
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Bad date {s:?}"))
}

fn collect_rows(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<StoredAd>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, read_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(AdRow::into_stored).collect()
}

/// Everything, most recently scraped first.
pub fn get_all(conn: &Connection) -> Result<Vec<StoredAd>> {
    let sql = format!("SELECT {AD_COLUMNS} FROM ads ORDER BY scraped_at DESC, id DESC");
    collect_rows(conn, &sql, &[])
}

pub fn get(conn: &Connection, ad_id: &str) -> Result<Option<StoredAd>> {
    let sql = format!("SELECT {AD_COLUMNS} FROM ads WHERE ad_id = ?1");
    Ok(collect_rows(conn, &sql, &[&ad_id])?.into_iter().next())
}

#[derive(Debug, Clone, Default)]
pub struct AdFilter {
    pub status: Option<AdStatus>,
    pub platform: Option<String>,
    /// Inclusive bounds on `start_date`.
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub multiple_versions: Option<bool>,
    pub limit: Option<usize>,
}

impl AdFilter {
    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                bail!("start of date range ({from}) is after its end ({to})");
            }
        }
        Ok(())
    }
}

pub fn query(conn: &Connection, filter: &AdFilter) -> Result<Vec<StoredAd>> {
    filter.validate()?;

    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        params.push(Box::new(status.as_str()));
    }
    if let Some(platform) = &filter.platform {
        clauses.push("EXISTS (SELECT 1 FROM json_each(ads.platforms) WHERE lower(value) = lower(?))");
        params.push(Box::new(platform.clone()));
    }
    if let Some(from) = filter.from {
        clauses.push("start_date >= ?");
        params.push(Box::new(from.to_string()));
    }
    if let Some(to) = filter.to {
        clauses.push("start_date <= ?");
        params.push(Box::new(to.to_string()));
    }
    if let Some(multiple) = filter.multiple_versions {
        clauses.push("multiple_versions = ?");
        params.push(Box::new(multiple));
    }

    let mut sql = format!("SELECT {AD_COLUMNS} FROM ads");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY start_date DESC NULLS LAST, scraped_at DESC");
    if let Some(n) = filter.limit {
        sql.push_str(&format!(" LIMIT {}", n));
    }

    let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    collect_rows(conn, &sql, &refs)
}

// ── Stats ──

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub with_multiple_versions: usize,
    /// Most common first.
    pub by_platform: Vec<(String, usize)>,
    /// Latest 30 start dates, newest first.
    pub by_date: Vec<(String, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let (total, active, inactive, with_multiple_versions) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'active'), 0),
                COALESCE(SUM(status = 'inactive'), 0),
                COALESCE(SUM(multiple_versions), 0)
         FROM ads",
        [],
        |row| {
            Ok((
                row.get::<_, i64>(0)? as usize,
                row.get::<_, i64>(1)? as usize,
                row.get::<_, i64>(2)? as usize,
                row.get::<_, i64>(3)? as usize,
            ))
        },
    )?;

    let mut stmt = conn.prepare(
        "SELECT p.value, COUNT(*) AS n
         FROM ads, json_each(ads.platforms) AS p
         GROUP BY p.value
         ORDER BY n DESC, p.value",
    )?;
    let by_platform = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT start_date, COUNT(*)
         FROM ads
         WHERE start_date IS NOT NULL
         GROUP BY start_date
         ORDER BY start_date DESC
         LIMIT 30",
    )?;
    let by_date = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stats {
        total,
        active,
        inactive,
        with_multiple_versions,
        by_platform,
        by_date,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn ad(id: &str, status: AdStatus, platforms: &[&str], start: Option<(i32, u32, u32)>) -> AdRecord {
        let mut r = AdRecord::new(id);
        r.status = status;
        r.set_platforms(platforms.iter().copied());
        r.start_date = start.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d));
        r
    }

    #[test]
    fn upsert_is_idempotent_and_last_write_wins() {
        let mut store = Store::in_memory().unwrap();
        let mut r = ad("42", AdStatus::Active, &["Facebook"], Some((2026, 1, 8)));
        let first = store.upsert(&r).unwrap().unwrap();

        r.status = AdStatus::Inactive;
        r.multiple_versions = true;
        r.set_platforms(["Facebook", "Instagram"]);
        r.asset = Some(Asset {
            url: "https://cdn/x.jpg".into(),
            kind: AssetKind::Image,
            local_path: Some("assets/images/42.jpg".into()),
        });
        let second = store.upsert(&r).unwrap().unwrap();
        assert_eq!(first, second);

        let all = get_all(store.conn()).unwrap();
        assert_eq!(all.len(), 1);
        let stored = &all[0].record;
        assert_eq!(stored.status, AdStatus::Inactive);
        assert!(stored.multiple_versions);
        assert_eq!(stored.platforms().len(), 2);
        assert_eq!(stored.local_path(), Some("assets/images/42.jpg"));
        assert_eq!(stored.start_date, NaiveDate::from_ymd_opt(2026, 1, 8));
    }

    #[test]
    fn get_all_is_newest_first() {
        let mut store = Store::in_memory().unwrap();
        let mut older = ad("1", AdStatus::Active, &["Facebook"], None);
        older.observed_at = Utc::now() - Duration::hours(1);
        store.upsert(&older).unwrap();
        store.upsert(&ad("2", AdStatus::Active, &["Facebook"], None)).unwrap();

        let ids: Vec<_> = get_all(store.conn()).unwrap().into_iter().map(|a| a.record.id).collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert!(get(store.conn(), "1").unwrap().is_some());
        assert!(get(store.conn(), "999").unwrap().is_none());
    }

    #[test]
    fn filters_and_ordering() {
        let mut store = Store::in_memory().unwrap();
        store.upsert(&ad("1", AdStatus::Active, &["Facebook"], Some((2025, 3, 1)))).unwrap();
        store
            .upsert(&ad("2", AdStatus::Inactive, &["Facebook", "Instagram"], Some((2025, 5, 1))))
            .unwrap();
        store.upsert(&ad("3", AdStatus::Active, &["Instagram"], None)).unwrap();
        let mut multi = ad("4", AdStatus::Active, &["Facebook"], Some((2025, 4, 1)));
        multi.multiple_versions = true;
        store.upsert(&multi).unwrap();

        let ids = |f: AdFilter| -> Vec<String> {
            query(store.conn(), &f).unwrap().into_iter().map(|a| a.record.id).collect()
        };

        assert_eq!(ids(AdFilter::default()), vec!["2", "4", "1", "3"]);
        assert_eq!(
            ids(AdFilter { status: Some(AdStatus::Active), ..Default::default() }),
            vec!["4", "1", "3"]
        );
        assert_eq!(
            ids(AdFilter { platform: Some("instagram".into()), ..Default::default() }),
            vec!["2", "3"]
        );
        assert_eq!(
            ids(AdFilter {
                from: NaiveDate::from_ymd_opt(2025, 3, 15),
                to: NaiveDate::from_ymd_opt(2025, 4, 30),
                ..Default::default()
            }),
            vec!["4"]
        );
        assert_eq!(
            ids(AdFilter { multiple_versions: Some(true), ..Default::default() }),
            vec!["4"]
        );
        assert_eq!(ids(AdFilter { limit: Some(1), ..Default::default() }), vec!["2"]);

        let bad = AdFilter {
            from: NaiveDate::from_ymd_opt(2025, 5, 1),
            to: NaiveDate::from_ymd_opt(2025, 1, 1),
            ..Default::default()
        };
        assert!(query(store.conn(), &bad).is_err());
    }

    #[test]
    fn stats_counts() {
        let mut store = Store::in_memory().unwrap();
        store.upsert(&ad("1", AdStatus::Active, &["Facebook"], Some((2025, 3, 1)))).unwrap();
        store
            .upsert(&ad("2", AdStatus::Inactive, &["Facebook", "Instagram"], Some((2025, 3, 1))))
            .unwrap();
        let mut r = ad("3", AdStatus::Unknown, &["Facebook"], None);
        r.multiple_versions = true;
        store.upsert(&r).unwrap();

        let s = get_stats(store.conn()).unwrap();
        assert_eq!((s.total, s.active, s.inactive, s.with_multiple_versions), (3, 1, 1, 1));
        assert_eq!(
            s.by_platform,
            vec![("Facebook".to_string(), 3), ("Instagram".to_string(), 1)]
        );
        assert_eq!(s.by_date, vec![("2025-03-01".to_string(), 2)]);
    }

    #[test]
    fn empty_store_stats() {
        let store = Store::in_memory().unwrap();
        assert_eq!(get_stats(store.conn()).unwrap(), Stats::default());
    }

    #[test]
    fn file_backed_store_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("ads.sqlite");
        let mut store = Store::open(&path).unwrap();
        store.upsert(&ad("7", AdStatus::Active, &["Facebook"], None)).unwrap();
        drop(store);

        let conn = connect(&path).unwrap();
        assert_eq!(get_all(&conn).unwrap().len(), 1);
    }
}
