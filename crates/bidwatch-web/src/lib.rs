//! Axum + Askama dashboard over the stored announcements and awards.
//!
//! Handlers are stateless: every request decodes an explicit `ListState`
//! from the query string, loads the collection, and applies filter / sort /
//! pagination as pure functions. There is no session or ambient "current
//! page" anywhere.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use bidwatch_core::{Announcement, Award, Keyed};
use bidwatch_store::{open_store, BidStore};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::info;

pub const CRATE_NAME: &str = "bidwatch-web";

/// Fixed dashboard page size.
pub const PAGE_SIZE: usize = 10;

/// Shown when an amount is missing or unparseable ("see the notice").
pub const AMOUNT_FALLBACK: &str = "공고 참조";

const APP_CSS: &str = include_str!("../assets/app.css");

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BidStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn BidStore>) -> Self {
        Self { store }
    }
}

/// Raw query-string surface of a list view.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    /// Comma-separated multi-select.
    pub category: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    /// Zero-based; clamped to the valid range.
    pub page: Option<usize>,
}

/// Normalized view state. All links and form fields on a list page are
/// rebuilt from this value, so the rendered page carries its whole state in
/// its URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListState {
    pub q: String,
    pub categories: Vec<String>,
    pub date_from: String,
    pub date_to: String,
    pub sort: String,
    pub order: String,
    pub page: usize,
}

fn default_order(sort: &str) -> &'static str {
    match sort {
        "posted" | "awarded" => "desc",
        _ => "asc",
    }
}

impl ListState {
    pub fn from_query(query: &ListQuery, default_sort: &str) -> Self {
        let sort = query
            .sort
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(default_sort)
            .to_string();
        let order = query
            .order
            .as_deref()
            .filter(|o| matches!(*o, "asc" | "desc"))
            .unwrap_or_else(|| default_order(&sort))
            .to_string();
        Self {
            q: query.q.clone().unwrap_or_default().trim().to_string(),
            categories: query
                .category
                .as_deref()
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(ToString::to_string)
                .collect(),
            date_from: query.date_from.clone().unwrap_or_default().trim().to_string(),
            date_to: query.date_to.clone().unwrap_or_default().trim().to_string(),
            sort,
            order,
            page: query.page.unwrap_or(0),
        }
    }

    fn params(&self, page: usize) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if !self.q.is_empty() {
            params.push(("q", self.q.clone()));
        }
        if !self.categories.is_empty() {
            params.push(("category", self.categories.join(",")));
        }
        if !self.date_from.is_empty() {
            params.push(("date_from", self.date_from.clone()));
        }
        if !self.date_to.is_empty() {
            params.push(("date_to", self.date_to.clone()));
        }
        params.push(("sort", self.sort.clone()));
        params.push(("order", self.order.clone()));
        if page > 0 {
            params.push(("page", page.to_string()));
        }
        params
    }

    pub fn href_for_page(&self, base: &str, page: usize) -> String {
        let rendered = self
            .params(page)
            .into_iter()
            .map(|(key, value)| format!("{key}={}", percent_encode(&value)))
            .collect::<Vec<_>>()
            .join("&");
        if rendered.is_empty() {
            base.to_string()
        } else {
            format!("{base}?{rendered}")
        }
    }

    /// Clicking the active column flips the order; a new column starts at
    /// its natural order. Either way the view returns to page 0.
    pub fn href_for_sort(&self, base: &str, column: &str) -> String {
        let mut next = self.clone();
        if next.sort == column {
            next.order = if next.order == "asc" { "desc" } else { "asc" }.to_string();
        } else {
            next.sort = column.to_string();
            next.order = default_order(column).to_string();
        }
        next.href_for_page(base, 0)
    }

    pub fn href_toggle_category(&self, base: &str, category: &str) -> String {
        let mut next = self.clone();
        if let Some(pos) = next.categories.iter().position(|c| c == category) {
            next.categories.remove(pos);
        } else {
            next.categories.push(category.to_string());
        }
        next.href_for_page(base, 0)
    }
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn str_key(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn parse_amount(raw: Option<&str>) -> Option<f64> {
    let cleaned = raw?.replace(',', "");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse().ok()
}

/// Budget label in Korean won units: `1.2억`, `350.0만원`, `9000원`.
pub fn format_budget(raw: Option<&str>) -> String {
    let Some(amount) = parse_amount(raw) else {
        return AMOUNT_FALLBACK.to_string();
    };
    if amount >= 100_000_000.0 {
        format!("{:.1}억", amount / 100_000_000.0)
    } else if amount >= 10_000.0 {
        format!("{:.1}만원", amount / 10_000.0)
    } else {
        format!("{}원", amount as i64)
    }
}

/// Exact won amount with thousands separators.
pub fn format_won(raw: Option<&str>) -> String {
    let Some(amount) = parse_amount(raw) else {
        return AMOUNT_FALLBACK.to_string();
    };
    format!("{}원", group_thousands(amount as i64))
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        format!("-{out}")
    } else {
        out
    }
}

/// Collapse a date-ish string to its `YYYYMMDD` digits for comparison.
/// Accepts `2025-06-01`, `2025-06-01 09:30`, and bare `20250601`.
fn normalize_date(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() >= 8 {
        Some(digits[..8].to_string())
    } else {
        None
    }
}

fn within_range(record_date: Option<&str>, from: &str, to: &str) -> bool {
    if from.is_empty() && to.is_empty() {
        return true;
    }
    let Some(date) = record_date.and_then(normalize_date) else {
        return false;
    };
    if let Some(lower) = normalize_date(from) {
        if date < lower {
            return false;
        }
    }
    if let Some(upper) = normalize_date(to) {
        if date > upper {
            return false;
        }
    }
    true
}

fn text_matches(needle: &str, fields: &[&Option<String>]) -> bool {
    needle.is_empty()
        || fields
            .iter()
            .any(|field| str_key(field).to_lowercase().contains(needle))
}

pub fn filter_announcements(rows: &mut Vec<Announcement>, state: &ListState) {
    let needle = state.q.to_lowercase();
    rows.retain(|r| {
        let text_ok = text_matches(&needle, &[&r.bid_ntce_nm, &r.ntce_instt_nm, &r.dmnd_instt_nm]);
        let category_ok = state.categories.is_empty()
            || r.bsns_div_nm
                .as_deref()
                .map(|c| state.categories.iter().any(|s| s == c))
                .unwrap_or(false);
        let date_ok = within_range(r.bid_ntce_date.as_deref(), &state.date_from, &state.date_to);
        text_ok && category_ok && date_ok
    });
}

pub fn filter_awards(rows: &mut Vec<Award>, state: &ListState) {
    let needle = state.q.to_lowercase();
    rows.retain(|r| {
        let text_ok = text_matches(&needle, &[&r.bid_ntce_nm, &r.dminstt_nm]);
        let date_ok = within_range(r.fnl_sucsf_date.as_deref(), &state.date_from, &state.date_to);
        text_ok && date_ok
    });
}

pub fn sort_announcements(rows: &mut [Announcement], state: &ListState) {
    match state.sort.as_str() {
        "title" => rows.sort_by(|a, b| str_key(&a.bid_ntce_nm).cmp(str_key(&b.bid_ntce_nm))),
        "institution" => {
            rows.sort_by(|a, b| str_key(&a.ntce_instt_nm).cmp(str_key(&b.ntce_instt_nm)))
        }
        "budget" => rows.sort_by(|a, b| {
            let left = parse_amount(a.asign_bdgt_amt.as_deref()).unwrap_or(-1.0);
            let right = parse_amount(b.asign_bdgt_amt.as_deref()).unwrap_or(-1.0);
            left.total_cmp(&right)
        }),
        // posted date, with the begin-timestamp as tiebreaker
        _ => rows.sort_by(|a, b| {
            (str_key(&a.bid_ntce_date), str_key(&a.bid_ntce_bgn))
                .cmp(&(str_key(&b.bid_ntce_date), str_key(&b.bid_ntce_bgn)))
        }),
    }
    if state.order == "desc" {
        rows.reverse();
    }
}

pub fn sort_awards(rows: &mut [Award], state: &ListState) {
    match state.sort.as_str() {
        "title" => rows.sort_by(|a, b| str_key(&a.bid_ntce_nm).cmp(str_key(&b.bid_ntce_nm))),
        "institution" => rows.sort_by(|a, b| str_key(&a.dminstt_nm).cmp(str_key(&b.dminstt_nm))),
        "amount" => rows.sort_by(|a, b| {
            let left = parse_amount(a.sucsfbid_amt.as_deref()).unwrap_or(-1.0);
            let right = parse_amount(b.sucsfbid_amt.as_deref()).unwrap_or(-1.0);
            left.total_cmp(&right)
        }),
        _ => rows.sort_by(|a, b| {
            (str_key(&a.fnl_sucsf_date), str_key(&a.bid_ntce_no))
                .cmp(&(str_key(&b.fnl_sucsf_date), str_key(&b.bid_ntce_no)))
        }),
    }
    if state.order == "desc" {
        rows.reverse();
    }
}

#[derive(Debug)]
pub struct Paged<T> {
    pub rows: Vec<T>,
    pub page: usize,
    pub total_pages: usize,
    pub total: usize,
}

/// Split into fixed-size pages; the requested page is clamped to
/// `[0, total_pages - 1]` so out-of-range requests land on a real page.
pub fn paginate<T>(rows: Vec<T>, requested: usize) -> Paged<T> {
    let total = rows.len();
    let total_pages = total.div_ceil(PAGE_SIZE).max(1);
    let page = requested.min(total_pages - 1);
    let rows = rows
        .into_iter()
        .skip(page * PAGE_SIZE)
        .take(PAGE_SIZE)
        .collect();
    Paged {
        rows,
        page,
        total_pages,
        total,
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "-".to_string())
}

#[derive(Debug, Clone)]
pub struct AnnouncementRow {
    pub notice_no: String,
    pub title: String,
    pub institution: String,
    pub category: String,
    pub budget: String,
    pub posted: String,
    pub closes: String,
    pub status: String,
    pub detail_href: String,
}

fn announcement_row(record: &Announcement) -> AnnouncementRow {
    let notice_no = record.bid_ntce_no.clone().unwrap_or_default();
    let closes = match (&record.bid_clse_date, &record.bid_clse_tm) {
        (Some(date), Some(time)) => format!("{date} {time}"),
        (Some(date), None) => date.clone(),
        _ => "-".to_string(),
    };
    AnnouncementRow {
        detail_href: format!("/announcements/{}", percent_encode(&notice_no)),
        title: text(&record.bid_ntce_nm),
        institution: text(&record.ntce_instt_nm),
        category: text(&record.bsns_div_nm),
        budget: format_budget(record.asign_bdgt_amt.as_deref()),
        posted: text(&record.bid_ntce_date),
        status: text(&record.bid_ntce_sttus_nm),
        closes,
        notice_no,
    }
}

#[derive(Debug, Clone)]
pub struct AwardRow {
    pub notice_no: String,
    pub title: String,
    pub institution: String,
    pub amount: String,
    pub rate: String,
    pub awarded_on: String,
    pub winner: String,
    pub detail_href: String,
}

fn award_row(record: &Award) -> AwardRow {
    let notice_no = record.bid_ntce_no.clone().unwrap_or_default();
    AwardRow {
        detail_href: format!("/awards/{}", percent_encode(&notice_no)),
        title: text(&record.bid_ntce_nm),
        institution: text(&record.dminstt_nm),
        amount: format_won(record.sucsfbid_amt.as_deref()),
        rate: text(&record.sucsfbid_rate),
        awarded_on: text(&record.fnl_sucsf_date),
        winner: text(&record.bidwinnr_nm),
        notice_no,
    }
}

#[derive(Debug, Clone)]
pub struct CategoryFacet {
    pub name: String,
    pub count: usize,
    pub selected: bool,
    pub href: String,
}

#[derive(Debug, Clone)]
pub struct SortLink {
    pub label: String,
    pub href: String,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct DetailField {
    pub label: &'static str,
    pub value: String,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    total_announcements: usize,
    total_awards: usize,
}

#[derive(Template)]
#[template(path = "announcements.html")]
struct AnnouncementsTemplate {
    rows: Vec<AnnouncementRow>,
    total: usize,
    page_display: usize,
    total_pages: usize,
    q: String,
    category_csv: String,
    date_from: String,
    date_to: String,
    sort: String,
    order: String,
    facets: Vec<CategoryFacet>,
    sort_links: Vec<SortLink>,
    has_prev: bool,
    prev_href: String,
    has_next: bool,
    next_href: String,
}

#[derive(Template)]
#[template(path = "awards.html")]
struct AwardsTemplate {
    rows: Vec<AwardRow>,
    total: usize,
    page_display: usize,
    total_pages: usize,
    q: String,
    date_from: String,
    date_to: String,
    sort: String,
    order: String,
    sort_links: Vec<SortLink>,
    has_prev: bool,
    prev_href: String,
    has_next: bool,
    next_href: String,
}

#[derive(Template)]
#[template(path = "announcement_detail.html")]
struct AnnouncementDetailTemplate {
    title: String,
    notice_no: String,
    url: String,
    fields: Vec<DetailField>,
}

#[derive(Template)]
#[template(path = "award_detail.html")]
struct AwardDetailTemplate {
    title: String,
    notice_no: String,
    fields: Vec<DetailField>,
}

fn sort_links(state: &ListState, base: &str, columns: &[(&str, &str)]) -> Vec<SortLink> {
    columns
        .iter()
        .map(|(column, label)| SortLink {
            label: label.to_string(),
            href: state.href_for_sort(base, column),
            active: state.sort == *column,
        })
        .collect()
}

fn announcements_view(records: Vec<Announcement>, query: &ListQuery) -> AnnouncementsTemplate {
    let state = ListState::from_query(query, "posted");
    let base = "/announcements";

    let mut counts = BTreeMap::<String, usize>::new();
    for record in &records {
        if let Some(category) = record.bsns_div_nm.as_deref() {
            *counts.entry(category.to_string()).or_default() += 1;
        }
    }
    let facets = counts
        .into_iter()
        .map(|(name, count)| CategoryFacet {
            selected: state.categories.iter().any(|c| c == &name),
            href: state.href_toggle_category(base, &name),
            name,
            count,
        })
        .collect();

    let mut filtered = records;
    filter_announcements(&mut filtered, &state);
    sort_announcements(&mut filtered, &state);
    let paged = paginate(filtered, state.page);

    AnnouncementsTemplate {
        rows: paged.rows.iter().map(announcement_row).collect(),
        total: paged.total,
        page_display: paged.page + 1,
        total_pages: paged.total_pages,
        q: state.q.clone(),
        category_csv: state.categories.join(","),
        date_from: state.date_from.clone(),
        date_to: state.date_to.clone(),
        sort: state.sort.clone(),
        order: state.order.clone(),
        sort_links: sort_links(
            &state,
            base,
            &[
                ("posted", "Posted"),
                ("title", "Title"),
                ("institution", "Institution"),
                ("budget", "Budget"),
            ],
        ),
        has_prev: paged.page > 0,
        prev_href: state.href_for_page(base, paged.page.saturating_sub(1)),
        has_next: paged.page + 1 < paged.total_pages,
        next_href: state.href_for_page(base, paged.page + 1),
        facets,
    }
}

fn awards_view(records: Vec<Award>, query: &ListQuery) -> AwardsTemplate {
    let state = ListState::from_query(query, "awarded");
    let base = "/awards";

    let mut filtered = records;
    filter_awards(&mut filtered, &state);
    sort_awards(&mut filtered, &state);
    let paged = paginate(filtered, state.page);

    AwardsTemplate {
        rows: paged.rows.iter().map(award_row).collect(),
        total: paged.total,
        page_display: paged.page + 1,
        total_pages: paged.total_pages,
        q: state.q.clone(),
        date_from: state.date_from.clone(),
        date_to: state.date_to.clone(),
        sort: state.sort.clone(),
        order: state.order.clone(),
        sort_links: sort_links(
            &state,
            base,
            &[
                ("awarded", "Awarded"),
                ("title", "Title"),
                ("institution", "Institution"),
                ("amount", "Amount"),
            ],
        ),
        has_prev: paged.page > 0,
        prev_href: state.href_for_page(base, paged.page.saturating_sub(1)),
        has_next: paged.page + 1 < paged.total_pages,
        next_href: state.href_for_page(base, paged.page + 1),
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/announcements", get(announcements_handler))
        .route("/announcements/{id}", get(announcement_detail_handler))
        .route("/awards", get(awards_handler))
        .route("/awards/{id}", get(award_detail_handler))
        .route("/assets/app.css", get(app_css_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("BIDWATCH_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let data_dir = std::env::var("BIDWATCH_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./data"));
    let database_url = std::env::var("DATABASE_URL").ok();

    let store = open_store(database_url.as_deref(), &data_dir).await;
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "dashboard listening");
    axum::serve(listener, app(AppState::new(store))).await?;
    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let announcements = match state.store.load_announcements().await {
        Ok(rows) => rows,
        Err(err) => return server_error(err),
    };
    let awards = match state.store.load_awards().await {
        Ok(rows) => rows,
        Err(err) => return server_error(err),
    };
    render_html(IndexTemplate {
        total_announcements: announcements.len(),
        total_awards: awards.len(),
    })
}

async fn announcements_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    match state.store.load_announcements().await {
        Ok(records) => render_html(announcements_view(records, &query)),
        Err(err) => server_error(err),
    }
}

async fn announcement_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let records = match state.store.load_announcements().await {
        Ok(records) => records,
        Err(err) => return server_error(err),
    };
    let Some(record) = records.into_iter().find(|r| r.natural_key() == Some(id.as_str()))
    else {
        return not_found("Announcement not found");
    };
    render_html(AnnouncementDetailTemplate {
        title: text(&record.bid_ntce_nm),
        notice_no: id,
        url: record.bid_ntce_url.clone().unwrap_or_default(),
        fields: vec![
            DetailField {
                label: "Issuing institution",
                value: text(&record.ntce_instt_nm),
            },
            DetailField {
                label: "Demanding institution",
                value: text(&record.dmnd_instt_nm),
            },
            DetailField {
                label: "Category",
                value: text(&record.bsns_div_nm),
            },
            DetailField {
                label: "Budget",
                value: format_budget(record.asign_bdgt_amt.as_deref()),
            },
            DetailField {
                label: "Posted",
                value: text(&record.bid_ntce_date),
            },
            DetailField {
                label: "Posted at",
                value: text(&record.bid_ntce_bgn),
            },
            DetailField {
                label: "Closes",
                value: text(&record.bid_clse_date),
            },
            DetailField {
                label: "Closing time",
                value: text(&record.bid_clse_tm),
            },
            DetailField {
                label: "Status",
                value: text(&record.bid_ntce_sttus_nm),
            },
            DetailField {
                label: "Eligible industries",
                value: text(&record.bidprc_psbl_indstryty_nm),
            },
        ],
    })
}

async fn awards_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    match state.store.load_awards().await {
        Ok(records) => render_html(awards_view(records, &query)),
        Err(err) => server_error(err),
    }
}

async fn award_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let records = match state.store.load_awards().await {
        Ok(records) => records,
        Err(err) => return server_error(err),
    };
    let Some(record) = records.into_iter().find(|r| r.natural_key() == Some(id.as_str()))
    else {
        return not_found("Award not found");
    };
    render_html(AwardDetailTemplate {
        title: text(&record.bid_ntce_nm),
        notice_no: id,
        fields: vec![
            DetailField {
                label: "Institution",
                value: text(&record.dminstt_nm),
            },
            DetailField {
                label: "Award amount",
                value: format_won(record.sucsfbid_amt.as_deref()),
            },
            DetailField {
                label: "Award rate",
                value: text(&record.sucsfbid_rate),
            },
            DetailField {
                label: "Awarded on",
                value: text(&record.fnl_sucsf_date),
            },
            DetailField {
                label: "Winning bidder",
                value: text(&record.bidwinnr_nm),
            },
        ],
    })
}

async fn app_css_handler() -> Response {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], APP_CSS).into_response()
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Html(message.to_string())).into_response()
}
