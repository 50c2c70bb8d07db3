//! Keyed document store, watermark persistence, and raw-run archiving.
//!
//! Two backends implement the same `BidStore` contract: a JSON file store
//! (one map per collection, whole-file atomic overwrite) and a Postgres
//! store (unique notice-number column + jsonb payload). Watermarks live in
//! small per-kind JSON files so a scheduler-invoked one-shot sync can pick
//! up where the previous run left off.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bidwatch_core::{Announcement, Award, Keyed, RecordKind};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "bidwatch-store";

/// Per-batch reconciliation counts reported by an upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl UpsertReport {
    pub fn absorb(&mut self, other: UpsertReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

/// Keyed store over the two record collections. Upserts are last-write-wins
/// per document; a batch offers no cross-record transaction.
#[async_trait]
pub trait BidStore: Send + Sync {
    async fn load_announcements(&self) -> Result<Vec<Announcement>>;
    async fn load_awards(&self) -> Result<Vec<Award>>;
    async fn upsert_announcements(&self, batch: &[Announcement]) -> Result<UpsertReport>;
    async fn upsert_awards(&self, batch: &[Award]) -> Result<UpsertReport>;
}

/// Open the Postgres store when a database URL is configured and reachable,
/// otherwise fall back to the JSON file store under `data_dir`.
pub async fn open_store(database_url: Option<&str>, data_dir: &Path) -> Arc<dyn BidStore> {
    if let Some(url) = database_url {
        match PgStore::connect(url).await {
            Ok(store) => {
                info!("using postgres store");
                return Arc::new(store);
            }
            Err(err) => {
                warn!(error = %err, "postgres store unavailable; falling back to file store");
            }
        }
    }
    Arc::new(JsonFileStore::new(data_dir))
}

/// Write `bytes` to `path` through a temp file + rename so readers never see
/// a half-written document.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }

    let temp_path = path.with_file_name(format!(".{}.tmp", Uuid::new_v4()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    match fs::rename(&temp_path, path).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&temp_path).await;
            Err(err).with_context(|| {
                format!(
                    "atomically renaming {} -> {}",
                    temp_path.display(),
                    path.display()
                )
            })
        }
    }
}

/// File-backed store: one JSON object per collection, keyed by notice number.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, kind: RecordKind) -> PathBuf {
        self.root.join(format!("{}.json", kind.collection()))
    }

    async fn load_map<T>(&self, kind: RecordKind) -> Result<BTreeMap<String, T>>
    where
        T: DeserializeOwned,
    {
        let path = self.collection_path(kind);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    async fn write_map<T>(&self, kind: RecordKind, map: &BTreeMap<String, T>) -> Result<()>
    where
        T: Serialize,
    {
        let bytes = serde_json::to_vec_pretty(map).context("serializing collection")?;
        write_atomic(&self.collection_path(kind), &bytes).await
    }

    async fn upsert_batch<T>(&self, kind: RecordKind, batch: &[T]) -> Result<UpsertReport>
    where
        T: Keyed + Serialize + DeserializeOwned + Clone + Send + Sync,
    {
        let mut map = self.load_map::<T>(kind).await?;
        let mut report = UpsertReport::default();

        for record in batch {
            match record.natural_key() {
                None => {
                    warn!(kind = %kind, "record without notice number skipped");
                    report.skipped += 1;
                }
                Some(key) => {
                    if map.insert(key.to_string(), record.clone()).is_some() {
                        report.updated += 1;
                    } else {
                        report.inserted += 1;
                    }
                }
            }
        }

        self.write_map(kind, &map).await?;
        debug!(
            kind = %kind,
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            "collection written"
        );
        Ok(report)
    }
}

#[async_trait]
impl BidStore for JsonFileStore {
    async fn load_announcements(&self) -> Result<Vec<Announcement>> {
        let map = self.load_map::<Announcement>(RecordKind::Announcement).await?;
        Ok(map.into_values().collect())
    }

    async fn load_awards(&self) -> Result<Vec<Award>> {
        let map = self.load_map::<Award>(RecordKind::Award).await?;
        Ok(map.into_values().collect())
    }

    async fn upsert_announcements(&self, batch: &[Announcement]) -> Result<UpsertReport> {
        self.upsert_batch(RecordKind::Announcement, batch).await
    }

    async fn upsert_awards(&self, batch: &[Award]) -> Result<UpsertReport> {
        self.upsert_batch(RecordKind::Award, batch).await
    }
}

/// Postgres store: uniqueness on the notice-number column, payload as jsonb,
/// upsert via `ON CONFLICT .. DO UPDATE`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("connecting to postgres")?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        for kind in [RecordKind::Announcement, RecordKind::Award] {
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                     bid_ntce_no TEXT PRIMARY KEY,\
                     data JSONB NOT NULL,\
                     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\
                 )",
                table = kind.collection()
            );
            sqlx::query(&ddl)
                .execute(&self.pool)
                .await
                .with_context(|| format!("creating table {}", kind.collection()))?;
        }
        Ok(())
    }

    async fn load_all<T>(&self, kind: RecordKind) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let sql = format!(
            "SELECT data FROM {table} ORDER BY bid_ntce_no",
            table = kind.collection()
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("loading {}", kind.collection()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let data: JsonValue = row.try_get("data").context("reading data column")?;
            let record = serde_json::from_value(data)
                .with_context(|| format!("decoding {} row", kind.collection()))?;
            out.push(record);
        }
        Ok(out)
    }

    async fn upsert_all<T>(&self, kind: RecordKind, batch: &[T]) -> Result<UpsertReport>
    where
        T: Keyed + Serialize + Sync,
    {
        // (xmax = 0) distinguishes a fresh insert from a conflict-update.
        let sql = format!(
            "INSERT INTO {table} (bid_ntce_no, data) VALUES ($1, $2) \
             ON CONFLICT (bid_ntce_no) DO UPDATE \
             SET data = EXCLUDED.data, updated_at = NOW() \
             RETURNING (xmax = 0) AS inserted",
            table = kind.collection()
        );

        let mut report = UpsertReport::default();
        for record in batch {
            let Some(key) = record.natural_key() else {
                warn!(kind = %kind, "record without notice number skipped");
                report.skipped += 1;
                continue;
            };
            let payload = serde_json::to_value(record).context("serializing record")?;
            let row = sqlx::query(&sql)
                .bind(key)
                .bind(&payload)
                .fetch_one(&self.pool)
                .await
                .with_context(|| format!("upserting into {}", kind.collection()))?;
            let inserted: bool = row.try_get("inserted").context("reading upsert flag")?;
            if inserted {
                report.inserted += 1;
            } else {
                report.updated += 1;
            }
        }
        Ok(report)
    }
}

#[async_trait]
impl BidStore for PgStore {
    async fn load_announcements(&self) -> Result<Vec<Announcement>> {
        self.load_all(RecordKind::Announcement).await
    }

    async fn load_awards(&self) -> Result<Vec<Award>> {
        self.load_all(RecordKind::Award).await
    }

    async fn upsert_announcements(&self, batch: &[Announcement]) -> Result<UpsertReport> {
        self.upsert_all(RecordKind::Announcement, batch).await
    }

    async fn upsert_awards(&self, batch: &[Award]) -> Result<UpsertReport> {
        self.upsert_all(RecordKind::Award, batch).await
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WatermarkFile {
    #[serde(default)]
    last_collected_time: Option<String>,
}

/// One small JSON file per record kind holding the exclusive lower bound for
/// the next poll window. Load never fails: anything unreadable yields the
/// caller-supplied default.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    dir: PathBuf,
}

impl WatermarkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, kind: RecordKind) -> PathBuf {
        self.dir.join(format!("{}_watermark.json", kind.collection()))
    }

    pub async fn load(&self, kind: RecordKind, default: &str) -> String {
        let path = self.path_for(kind);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) => {
                debug!(kind = %kind, error = %err, "no watermark file; using default");
                return default.to_string();
            }
        };
        match serde_json::from_str::<WatermarkFile>(&text) {
            Ok(parsed) => parsed
                .last_collected_time
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string()),
            Err(err) => {
                warn!(
                    kind = %kind,
                    path = %path.display(),
                    error = %err,
                    "malformed watermark file; using default"
                );
                default.to_string()
            }
        }
    }

    pub async fn save(&self, kind: RecordKind, value: &str) -> Result<()> {
        let payload = WatermarkFile {
            last_collected_time: Some(value.to_string()),
        };
        let bytes = serde_json::to_vec_pretty(&payload).context("serializing watermark")?;
        write_atomic(&self.path_for(kind), &bytes).await
    }
}

#[derive(Debug, Clone)]
pub struct ArchivedRun {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub item_count: usize,
    pub deduplicated: bool,
}

/// Immutable dump of one poll cycle's raw items, hash-addressed under a
/// timestamped directory.
#[derive(Debug, Clone)]
pub struct RunArchive {
    root: PathBuf,
}

impl RunArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub async fn store_run(
        &self,
        fetched_at: DateTime<Utc>,
        kind: RecordKind,
        items: &[JsonValue],
    ) -> Result<ArchivedRun> {
        let payload = serde_json::json!({
            "timestamp": fetched_at.to_rfc3339(),
            "count": items.len(),
            "items": items,
        });
        let bytes = serde_json::to_vec_pretty(&payload).context("serializing run dump")?;
        let content_hash = Self::sha256_hex(&bytes);

        let stamp = fetched_at.format("%Y%m%d_%H%M%S").to_string();
        let relative_path = PathBuf::from(stamp)
            .join(kind.collection())
            .join(format!("{content_hash}.json"));
        let absolute_path = self.root.join(&relative_path);

        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking archive path {}", absolute_path.display()))?
        {
            return Ok(ArchivedRun {
                content_hash,
                relative_path,
                absolute_path,
                item_count: items.len(),
                deduplicated: true,
            });
        }

        write_atomic(&absolute_path, &bytes).await?;
        Ok(ArchivedRun {
            content_hash,
            relative_path,
            absolute_path,
            item_count: items.len(),
            deduplicated: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn announcement(no: &str, status: &str) -> Announcement {
        Announcement {
            bid_ntce_no: Some(no.to_string()),
            bid_ntce_nm: Some(format!("notice {no}")),
            bid_ntce_sttus_nm: Some(status.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path());
        let batch = vec![
            announcement("20250101-00123", "open"),
            announcement("20250101-00124", "open"),
        ];

        let first = store.upsert_announcements(&batch).await.expect("first pass");
        assert_eq!(first.inserted, 2);
        assert_eq!(first.updated, 0);

        let second = store.upsert_announcements(&batch).await.expect("second pass");
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 2);

        let rows = store.load_announcements().await.expect("load");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.bid_ntce_sttus_nm.as_deref() == Some("open")));
    }

    #[tokio::test]
    async fn keyless_records_are_skipped_without_failing_the_batch() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path());
        let batch = vec![
            Announcement::default(),
            announcement("20250101-00125", "open"),
            Announcement {
                bid_ntce_no: Some("  ".to_string()),
                ..Default::default()
            },
        ];

        let report = store.upsert_announcements(&batch).await.expect("upsert");
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(store.load_announcements().await.expect("load").len(), 1);
    }

    #[tokio::test]
    async fn refetched_record_overwrites_in_place() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path());
        store
            .upsert_announcements(&[announcement("20250101-00123", "open")])
            .await
            .expect("seed");

        let report = store
            .upsert_announcements(&[announcement("20250101-00123", "closed")])
            .await
            .expect("refetch");
        assert_eq!(report.inserted, 0);
        assert_eq!(report.updated, 1);

        let rows = store.load_announcements().await.expect("load");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bid_ntce_sttus_nm.as_deref(), Some("closed"));
    }

    #[tokio::test]
    async fn award_collection_is_independent_of_announcements() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path());
        let award = Award {
            bid_ntce_no: Some("20250101-00123".to_string()),
            bidwinnr_nm: Some("Acme Systems".to_string()),
            ..Default::default()
        };
        store.upsert_awards(&[award]).await.expect("upsert");

        assert_eq!(store.load_awards().await.expect("awards").len(), 1);
        assert!(store.load_announcements().await.expect("bids").is_empty());
    }

    #[tokio::test]
    async fn watermark_missing_file_yields_default() {
        let dir = tempdir().expect("tempdir");
        let store = WatermarkStore::new(dir.path());
        let value = store.load(RecordKind::Announcement, "202501010000").await;
        assert_eq!(value, "202501010000");
    }

    #[tokio::test]
    async fn watermark_malformed_file_yields_default() {
        let dir = tempdir().expect("tempdir");
        let store = WatermarkStore::new(dir.path());
        fs::write(store.path_for(RecordKind::Award), b"not json {")
            .await
            .expect("write garbage");
        let value = store.load(RecordKind::Award, "202501010000").await;
        assert_eq!(value, "202501010000");
    }

    #[tokio::test]
    async fn watermark_save_then_load_round_trips() {
        let dir = tempdir().expect("tempdir");
        let store = WatermarkStore::new(dir.path());
        store
            .save(RecordKind::Announcement, "202506010930")
            .await
            .expect("save");
        let value = store.load(RecordKind::Announcement, "fallback").await;
        assert_eq!(value, "202506010930");
    }

    #[tokio::test]
    async fn watermark_empty_field_yields_default() {
        let dir = tempdir().expect("tempdir");
        let store = WatermarkStore::new(dir.path());
        fs::write(
            store.path_for(RecordKind::Announcement),
            br#"{"last_collected_time": ""}"#,
        )
        .await
        .expect("write");
        let value = store.load(RecordKind::Announcement, "202501010000").await;
        assert_eq!(value, "202501010000");
    }

    #[tokio::test]
    async fn archive_dedupes_identical_dumps() {
        let dir = tempdir().expect("tempdir");
        let archive = RunArchive::new(dir.path());
        let fetched_at = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).single().unwrap();
        let items = vec![serde_json::json!({"bidNtceNo": "20250101-00123"})];

        let first = archive
            .store_run(fetched_at, RecordKind::Announcement, &items)
            .await
            .expect("first");
        let second = archive
            .store_run(fetched_at, RecordKind::Announcement, &items)
            .await
            .expect("second");

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.content_hash, second.content_hash);
        assert!(first.absolute_path.exists());
    }
}
