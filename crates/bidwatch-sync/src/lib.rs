//! Incremental paged sync: watermark-windowed polling of the procurement
//! API, deduplicated upsert into the keyed store, and raw-run archiving.
//!
//! Both record kinds run through one generic cycle (`run_feed`), configured
//! per feed with its endpoint, watermark field, and advance mode. Each
//! invocation is a complete, independent run; the watermark files are the
//! only state carried between runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bidwatch_client::{
    fetch_window, EndpointConfig, HttpPageFetcher, PageFetcher, QueryWindow, WindowFetch,
};
use bidwatch_core::{default_watermark, format_stamp, Announcement, Award, RecordKind};
use bidwatch_store::{open_store, BidStore, RunArchive, UpsertReport, WatermarkStore};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::fs;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "bidwatch-sync";

/// When the persisted watermark moves: after every non-empty page, or once
/// after the whole window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceMode {
    PerPage,
    PerCycle,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedRegistry {
    pub feeds: Vec<FeedSpec>,
}

/// One instance of the generic incremental sync: endpoint, page size,
/// watermark extractor field, and advance mode.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSpec {
    pub kind: RecordKind,
    pub display_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub endpoint: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub watermark_field: String,
    pub advance: AdvanceMode,
}

fn default_enabled() -> bool {
    true
}

fn default_page_size() -> u32 {
    bidwatch_client::DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub service_key: String,
    pub data_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub watermark_dir: PathBuf,
    pub database_url: Option<String>,
    pub feeds_path: PathBuf,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("BIDWATCH_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        Self {
            service_key: std::env::var("BIDWATCH_SERVICE_KEY").unwrap_or_default(),
            archive_dir: std::env::var("BIDWATCH_ARCHIVE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("archive")),
            watermark_dir: std::env::var("BIDWATCH_WATERMARK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("watermarks")),
            database_url: std::env::var("DATABASE_URL").ok(),
            feeds_path: std::env::var("BIDWATCH_FEEDS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./feeds.yaml")),
            scheduler_enabled: std::env::var("BIDWATCH_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            sync_cron: std::env::var("BIDWATCH_SYNC_CRON")
                .unwrap_or_else(|_| "0 */5 * * * *".to_string()),
            user_agent: std::env::var("BIDWATCH_USER_AGENT")
                .unwrap_or_else(|_| "bidwatch-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("BIDWATCH_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            data_dir,
        }
    }
}

/// What one feed's cycle produced. `watermark` is the value persisted by
/// this cycle, `None` when nothing advanced.
#[derive(Debug, Clone, Serialize)]
pub struct FeedOutcome {
    pub kind: RecordKind,
    pub fetched: usize,
    pub report: UpsertReport,
    pub watermark: Option<String>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub feeds: Vec<FeedOutcome>,
}

impl SyncRunSummary {
    pub fn total_fetched(&self) -> usize {
        self.feeds.iter().map(|f| f.fetched).sum()
    }

    pub fn totals(&self) -> UpsertReport {
        let mut totals = UpsertReport::default();
        for feed in &self.feeds {
            totals.absorb(feed.report);
        }
        totals
    }
}

pub struct SyncPipeline {
    config: SyncConfig,
    store: Arc<dyn BidStore>,
    watermarks: WatermarkStore,
    archive: RunArchive,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig, store: Arc<dyn BidStore>) -> Self {
        let watermarks = WatermarkStore::new(config.watermark_dir.clone());
        let archive = RunArchive::new(config.archive_dir.clone());
        Self {
            config,
            store,
            watermarks,
            archive,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn load_feed_registry(&self) -> Result<FeedRegistry> {
        let path = &self.config.feeds_path;
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// One full poll: every enabled feed, in registry order. A feed's
    /// failure never stops the others.
    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let registry = self.load_feed_registry().await?;

        let mut feeds = Vec::new();
        for feed in registry.feeds.iter().filter(|f| f.enabled) {
            let fetcher = HttpPageFetcher::new(self.endpoint_config(feed))
                .with_context(|| format!("building fetcher for {}", feed.display_name))?;
            let outcome = self.run_feed(feed, &fetcher, Utc::now()).await;
            info!(
                run_id = %run_id,
                kind = %outcome.kind,
                fetched = outcome.fetched,
                inserted = outcome.report.inserted,
                updated = outcome.report.updated,
                skipped = outcome.report.skipped,
                truncated = outcome.truncated,
                "feed cycle complete"
            );
            feeds.push(outcome);
        }

        Ok(SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            feeds,
        })
    }

    fn endpoint_config(&self, feed: &FeedSpec) -> EndpointConfig {
        let mut config = EndpointConfig::new(feed.endpoint.clone(), self.config.service_key.clone());
        config.page_size = feed.page_size;
        config.timeout = Duration::from_secs(self.config.http_timeout_secs);
        config.user_agent = Some(self.config.user_agent.clone());
        config
    }

    /// One feed's cycle: watermark -> window -> paginate -> upsert ->
    /// archive -> advance watermark. Takes the fetcher as a seam so cycles
    /// can run against scripted pages.
    pub async fn run_feed(
        &self,
        feed: &FeedSpec,
        fetcher: &dyn PageFetcher,
        now: DateTime<Utc>,
    ) -> FeedOutcome {
        let fallback = default_watermark(now);
        let begin = self.watermarks.load(feed.kind, &fallback).await;
        let window = QueryWindow {
            begin,
            end: format_stamp(now),
        };
        info!(
            kind = %feed.kind,
            begin = %window.begin,
            end = %window.end,
            "poll cycle start"
        );

        let fetch = fetch_window(fetcher, &window).await;
        let truncated = fetch.is_truncated();
        let fetched = fetch.item_count();

        if fetched == 0 {
            info!(kind = %feed.kind, "no new records in window");
            return FeedOutcome {
                kind: feed.kind,
                fetched: 0,
                report: UpsertReport::default(),
                watermark: None,
                truncated,
            };
        }

        let report = match self.upsert_items(feed.kind, &fetch).await {
            Ok(report) => report,
            Err(err) => {
                error!(
                    kind = %feed.kind,
                    error = %err,
                    "batch write failed; watermark left unchanged"
                );
                return FeedOutcome {
                    kind: feed.kind,
                    fetched,
                    report: UpsertReport::default(),
                    watermark: None,
                    truncated,
                };
            }
        };

        if let Err(err) = self
            .archive
            .store_run(now, feed.kind, &fetch.flattened())
            .await
        {
            warn!(kind = %feed.kind, error = %err, "raw run archive failed");
        }

        let watermark = self.advance_watermark(feed, &fetch).await;
        FeedOutcome {
            kind: feed.kind,
            fetched,
            report,
            watermark,
            truncated,
        }
    }

    async fn upsert_items(&self, kind: RecordKind, fetch: &WindowFetch) -> Result<UpsertReport> {
        match kind {
            RecordKind::Announcement => {
                let records: Vec<Announcement> = decode_items(kind, fetch.items());
                self.store.upsert_announcements(&records).await
            }
            RecordKind::Award => {
                let records: Vec<Award> = decode_items(kind, fetch.items());
                self.store.upsert_awards(&records).await
            }
        }
    }

    /// Progress marker rule: the designated field of the last record of the
    /// last non-empty page, as the server ordered it. A missing field leaves
    /// the watermark where it was. Under `PerPage` every non-empty page's
    /// last record is persisted in order, so a later crash resumes from the
    /// deepest page that carried the field.
    async fn advance_watermark(&self, feed: &FeedSpec, fetch: &WindowFetch) -> Option<String> {
        match feed.advance {
            AdvanceMode::PerCycle => {
                let item = fetch.last_item()?;
                match watermark_of(item, &feed.watermark_field) {
                    Some(value) => self.save_watermark(feed.kind, &value).await,
                    None => {
                        warn!(
                            kind = %feed.kind,
                            field = %feed.watermark_field,
                            "last record lacks watermark field; watermark unchanged"
                        );
                        None
                    }
                }
            }
            AdvanceMode::PerPage => {
                let mut advanced = None;
                for page in &fetch.pages {
                    let Some(value) = page
                        .last()
                        .and_then(|item| watermark_of(item, &feed.watermark_field))
                    else {
                        warn!(
                            kind = %feed.kind,
                            field = %feed.watermark_field,
                            "page's last record lacks watermark field; not advancing past it"
                        );
                        continue;
                    };
                    if let Some(value) = self.save_watermark(feed.kind, &value).await {
                        advanced = Some(value);
                    }
                }
                advanced
            }
        }
    }

    async fn save_watermark(&self, kind: RecordKind, value: &str) -> Option<String> {
        match self.watermarks.save(kind, value).await {
            Ok(()) => {
                debug!(kind = %kind, value, "watermark advanced");
                Some(value.to_string())
            }
            Err(err) => {
                error!(kind = %kind, error = %err, "failed to persist watermark");
                None
            }
        }
    }
}

fn decode_items<'a, T>(
    kind: RecordKind,
    items: impl Iterator<Item = &'a JsonValue>,
) -> Vec<T>
where
    T: DeserializeOwned,
{
    items
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(kind = %kind, error = %err, "undecodable item dropped");
                None
            }
        })
        .collect()
}

fn watermark_of(item: &JsonValue, field: &str) -> Option<String> {
    item.get(field)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Build the cron-driven scheduler when enabled by config.
pub async fn maybe_build_scheduler(pipeline: Arc<SyncPipeline>) -> Result<Option<JobScheduler>> {
    if !pipeline.config.scheduler_enabled {
        return Ok(None);
    }
    Ok(Some(build_scheduler(pipeline).await?))
}

pub async fn build_scheduler(pipeline: Arc<SyncPipeline>) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let cron = pipeline.config.sync_cron.clone();
    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let pipeline = pipeline.clone();
        Box::pin(async move {
            match pipeline.run_once().await {
                Ok(summary) => {
                    let totals = summary.totals();
                    info!(
                        run_id = %summary.run_id,
                        fetched = summary.total_fetched(),
                        inserted = totals.inserted,
                        updated = totals.updated,
                        "scheduled sync complete"
                    );
                }
                Err(err) => error!(error = %err, "scheduled sync failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(sched)
}

pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    let config = SyncConfig::from_env();
    let store = open_store(config.database_url.as_deref(), &config.data_dir).await;
    let pipeline = SyncPipeline::new(config, store);
    pipeline.run_once().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bidwatch_client::ClientError;
    use bidwatch_store::JsonFileStore;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct ScriptedFetcher {
        script: Mutex<VecDeque<Result<Vec<JsonValue>, ClientError>>>,
        calls: Mutex<Vec<u32>>,
        windows: Mutex<Vec<QueryWindow>>,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<Result<Vec<JsonValue>, ClientError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
                windows: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<u32> {
            self.calls.lock().unwrap().clone()
        }

        fn first_window(&self) -> QueryWindow {
            self.windows.lock().unwrap().first().cloned().unwrap()
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch_page(
            &self,
            window: &QueryWindow,
            page_no: u32,
        ) -> Result<Vec<JsonValue>, ClientError> {
            self.calls.lock().unwrap().push(page_no);
            self.windows.lock().unwrap().push(window.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    struct FailingStore;

    #[async_trait]
    impl BidStore for FailingStore {
        async fn load_announcements(&self) -> Result<Vec<Announcement>> {
            Ok(Vec::new())
        }
        async fn load_awards(&self) -> Result<Vec<Award>> {
            Ok(Vec::new())
        }
        async fn upsert_announcements(&self, _batch: &[Announcement]) -> Result<UpsertReport> {
            anyhow::bail!("store offline")
        }
        async fn upsert_awards(&self, _batch: &[Award]) -> Result<UpsertReport> {
            anyhow::bail!("store offline")
        }
    }

    fn test_config(root: &Path) -> SyncConfig {
        SyncConfig {
            service_key: "test-key".to_string(),
            data_dir: root.join("data"),
            archive_dir: root.join("archive"),
            watermark_dir: root.join("watermarks"),
            database_url: None,
            feeds_path: root.join("feeds.yaml"),
            scheduler_enabled: false,
            sync_cron: "0 */5 * * * *".to_string(),
            user_agent: "bidwatch-test".to_string(),
            http_timeout_secs: 5,
        }
    }

    fn pipeline_at(root: &Path) -> (SyncPipeline, Arc<JsonFileStore>) {
        let config = test_config(root);
        let store = Arc::new(JsonFileStore::new(config.data_dir.clone()));
        (SyncPipeline::new(config, store.clone()), store)
    }

    fn announcement_feed() -> FeedSpec {
        FeedSpec {
            kind: RecordKind::Announcement,
            display_name: "Bid announcements".to_string(),
            enabled: true,
            endpoint: "http://localhost/unused".to_string(),
            page_size: 100,
            watermark_field: "bidNtceBgn".to_string(),
            advance: AdvanceMode::PerPage,
        }
    }

    fn award_feed() -> FeedSpec {
        FeedSpec {
            kind: RecordKind::Award,
            display_name: "Award results".to_string(),
            enabled: true,
            endpoint: "http://localhost/unused".to_string(),
            page_size: 100,
            watermark_field: "bidNtceNo".to_string(),
            advance: AdvanceMode::PerCycle,
        }
    }

    fn now_fixed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).single().unwrap()
    }

    fn announcement_item(seq: u32) -> JsonValue {
        serde_json::json!({
            "bidNtceNo": format!("20250601-{seq:05}"),
            "bidNtceNm": format!("notice {seq}"),
            "bidNtceBgn": format!("2025060109{:02}", seq % 30),
            "bidNtceSttusNm": "open",
        })
    }

    fn award_item(seq: u32) -> JsonValue {
        serde_json::json!({
            "bidNtceNo": format!("20250601-{seq:05}"),
            "bidwinnrNm": format!("winner {seq}"),
        })
    }

    #[tokio::test]
    async fn full_page_then_empty_page_upserts_all_and_advances_watermark() {
        let dir = tempdir().expect("tempdir");
        let (pipeline, store) = pipeline_at(dir.path());
        let page: Vec<JsonValue> = (0..100).map(announcement_item).collect();
        let fetcher = ScriptedFetcher::new(vec![Ok(page.clone()), Ok(Vec::new())]);

        let outcome = pipeline
            .run_feed(&announcement_feed(), &fetcher, now_fixed())
            .await;

        assert_eq!(outcome.fetched, 100);
        assert_eq!(outcome.report.inserted, 100);
        assert!(!outcome.truncated);
        // no page 3 request after the empty page 2
        assert_eq!(fetcher.calls(), vec![1, 2]);

        let expected = page.last().unwrap()["bidNtceBgn"].as_str().unwrap();
        assert_eq!(outcome.watermark.as_deref(), Some(expected));
        let persisted = WatermarkStore::new(dir.path().join("watermarks"))
            .load(RecordKind::Announcement, "fallback")
            .await;
        assert_eq!(persisted, expected);

        assert_eq!(store.load_announcements().await.expect("load").len(), 100);
    }

    #[tokio::test]
    async fn rerunning_an_identical_window_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let (pipeline, store) = pipeline_at(dir.path());
        let page: Vec<JsonValue> = (0..5).map(announcement_item).collect();

        let first = pipeline
            .run_feed(
                &announcement_feed(),
                &ScriptedFetcher::new(vec![Ok(page.clone()), Ok(Vec::new())]),
                now_fixed(),
            )
            .await;
        let second = pipeline
            .run_feed(
                &announcement_feed(),
                &ScriptedFetcher::new(vec![Ok(page), Ok(Vec::new())]),
                now_fixed(),
            )
            .await;

        assert_eq!(first.report.inserted, 5);
        assert_eq!(second.report.inserted, 0);
        assert_eq!(second.report.updated, 5);
        assert_eq!(store.load_announcements().await.expect("load").len(), 5);
    }

    #[tokio::test]
    async fn failure_after_first_page_keeps_partial_results() {
        let dir = tempdir().expect("tempdir");
        let (pipeline, store) = pipeline_at(dir.path());
        let fetcher = ScriptedFetcher::new(vec![
            Ok(vec![announcement_item(1), announcement_item(2)]),
            Err(ClientError::Envelope {
                page_no: 2,
                detail: "missing response.body".to_string(),
                snippet: "{}".to_string(),
            }),
        ]);

        let outcome = pipeline
            .run_feed(&announcement_feed(), &fetcher, now_fixed())
            .await;

        assert!(outcome.truncated);
        assert_eq!(outcome.report.inserted, 2);
        assert!(outcome.watermark.is_some());
        assert_eq!(store.load_announcements().await.expect("load").len(), 2);
    }

    #[tokio::test]
    async fn missing_watermark_field_leaves_watermark_unchanged() {
        let dir = tempdir().expect("tempdir");
        let (pipeline, _store) = pipeline_at(dir.path());
        let watermarks = WatermarkStore::new(dir.path().join("watermarks"));
        watermarks
            .save(RecordKind::Announcement, "202505310000")
            .await
            .expect("seed watermark");

        let item = serde_json::json!({ "bidNtceNo": "20250601-00001" });
        let fetcher = ScriptedFetcher::new(vec![Ok(vec![item]), Ok(Vec::new())]);
        let outcome = pipeline
            .run_feed(&announcement_feed(), &fetcher, now_fixed())
            .await;

        assert_eq!(outcome.report.inserted, 1);
        assert_eq!(outcome.watermark, None);
        let persisted = watermarks.load(RecordKind::Announcement, "fallback").await;
        assert_eq!(persisted, "202505310000");
    }

    #[tokio::test]
    async fn award_feed_advances_by_notice_number_after_full_cycle() {
        let dir = tempdir().expect("tempdir");
        let (pipeline, store) = pipeline_at(dir.path());
        let fetcher = ScriptedFetcher::new(vec![
            Ok(vec![award_item(1), award_item(2)]),
            Ok(vec![award_item(3)]),
            Ok(Vec::new()),
        ]);

        let outcome = pipeline.run_feed(&award_feed(), &fetcher, now_fixed()).await;

        assert_eq!(outcome.report.inserted, 3);
        assert_eq!(outcome.watermark.as_deref(), Some("20250601-00003"));
        assert_eq!(store.load_awards().await.expect("load").len(), 3);
    }

    #[tokio::test]
    async fn first_run_queries_from_five_minutes_before_now() {
        let dir = tempdir().expect("tempdir");
        let (pipeline, _store) = pipeline_at(dir.path());
        let fetcher = ScriptedFetcher::new(vec![Ok(Vec::new())]);

        pipeline
            .run_feed(&announcement_feed(), &fetcher, now_fixed())
            .await;

        let window = fetcher.first_window();
        assert_eq!(window.begin, "202506010925");
        assert_eq!(window.end, "202506010930");
    }

    #[tokio::test]
    async fn batch_write_failure_does_not_advance_watermark() {
        let dir = tempdir().expect("tempdir");
        let config = test_config(dir.path());
        let pipeline = SyncPipeline::new(config, Arc::new(FailingStore));
        let fetcher = ScriptedFetcher::new(vec![Ok(vec![announcement_item(1)]), Ok(Vec::new())]);

        let outcome = pipeline
            .run_feed(&announcement_feed(), &fetcher, now_fixed())
            .await;

        assert_eq!(outcome.fetched, 1);
        assert_eq!(outcome.report, UpsertReport::default());
        assert_eq!(outcome.watermark, None);
        let persisted = WatermarkStore::new(dir.path().join("watermarks"))
            .load(RecordKind::Announcement, "fallback")
            .await;
        assert_eq!(persisted, "fallback");
    }

    #[tokio::test]
    async fn feed_registry_parses_both_kinds() {
        let dir = tempdir().expect("tempdir");
        let (pipeline, _store) = pipeline_at(dir.path());
        fs::write(
            dir.path().join("feeds.yaml"),
            r#"
feeds:
  - kind: announcement
    display_name: Bid announcements
    endpoint: http://example.invalid/getDataSetOpnStdBidPblancInfo
    watermark_field: bidNtceBgn
    advance: per_page
  - kind: award
    display_name: Award results
    endpoint: http://example.invalid/getDataSetOpnStdScsbidInfo
    watermark_field: bidNtceNo
    advance: per_cycle
    page_size: 50
"#,
        )
        .await
        .expect("write feeds.yaml");

        let registry = pipeline.load_feed_registry().await.expect("registry");
        assert_eq!(registry.feeds.len(), 2);
        assert_eq!(registry.feeds[0].kind, RecordKind::Announcement);
        assert_eq!(registry.feeds[0].advance, AdvanceMode::PerPage);
        assert_eq!(registry.feeds[0].page_size, 100);
        assert_eq!(registry.feeds[1].kind, RecordKind::Award);
        assert_eq!(registry.feeds[1].page_size, 50);
        assert!(registry.feeds.iter().all(|f| f.enabled));
    }
}
