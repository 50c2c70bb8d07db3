//! Core domain model for bidwatch: procurement notice records and
//! the query-window timestamp conventions of the upstream API.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "bidwatch-core";

/// Timestamp layout the upstream API uses for query windows (`YYYYMMDDHHMM`).
pub const STAMP_FORMAT: &str = "%Y%m%d%H%M";

/// The two record families the poller tracks. Each has its own collection
/// in the store and its own watermark file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Announcement,
    Award,
}

impl RecordKind {
    /// Collection name in the store, also used as the watermark file stem.
    pub fn collection(&self) -> &'static str {
        match self {
            RecordKind::Announcement => "announcements",
            RecordKind::Award => "awards",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.collection())
    }
}

/// Records carrying a natural key. A missing or blank notice number means
/// the record cannot be stored.
pub trait Keyed {
    fn natural_key(&self) -> Option<&str>;
}

/// A bid announcement as returned by the open-data endpoint. Every attribute
/// is an optional string on the wire; field names follow the API schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(rename = "bidNtceNo")]
    pub bid_ntce_no: Option<String>,
    #[serde(rename = "bidNtceNm")]
    pub bid_ntce_nm: Option<String>,
    #[serde(rename = "ntceInsttNm")]
    pub ntce_instt_nm: Option<String>,
    #[serde(rename = "bsnsDivNm")]
    pub bsns_div_nm: Option<String>,
    #[serde(rename = "asignBdgtAmt")]
    pub asign_bdgt_amt: Option<String>,
    #[serde(rename = "bidNtceDate")]
    pub bid_ntce_date: Option<String>,
    #[serde(rename = "bidNtceBgn")]
    pub bid_ntce_bgn: Option<String>,
    #[serde(rename = "bidClseDate")]
    pub bid_clse_date: Option<String>,
    #[serde(rename = "bidClseTm")]
    pub bid_clse_tm: Option<String>,
    #[serde(rename = "bidNtceUrl")]
    pub bid_ntce_url: Option<String>,
    #[serde(rename = "bidNtceSttusNm")]
    pub bid_ntce_sttus_nm: Option<String>,
    #[serde(rename = "dmndInsttNm")]
    pub dmnd_instt_nm: Option<String>,
    #[serde(rename = "bidprcPsblIndstrytyNm")]
    pub bidprc_psbl_indstryty_nm: Option<String>,
}

/// An award (successful bid) result, keyed by the same notice number as the
/// announcement it closes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Award {
    #[serde(rename = "bidNtceNo")]
    pub bid_ntce_no: Option<String>,
    #[serde(rename = "bidNtceNm")]
    pub bid_ntce_nm: Option<String>,
    #[serde(rename = "dminsttNm")]
    pub dminstt_nm: Option<String>,
    #[serde(rename = "sucsfbidAmt")]
    pub sucsfbid_amt: Option<String>,
    #[serde(rename = "sucsfbidRate")]
    pub sucsfbid_rate: Option<String>,
    #[serde(rename = "fnlSucsfDate")]
    pub fnl_sucsf_date: Option<String>,
    #[serde(rename = "bidwinnrNm")]
    pub bidwinnr_nm: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

impl Keyed for Announcement {
    fn natural_key(&self) -> Option<&str> {
        non_blank(&self.bid_ntce_no)
    }
}

impl Keyed for Award {
    fn natural_key(&self) -> Option<&str> {
        non_blank(&self.bid_ntce_no)
    }
}

/// Render an instant as the API's `YYYYMMDDHHMM` window stamp (UTC).
pub fn format_stamp(at: DateTime<Utc>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

/// Fallback lower bound when no watermark survives from a previous run:
/// five minutes before the given instant.
pub fn default_watermark(now: DateTime<Utc>) -> String {
    format_stamp(now - Duration::minutes(5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stamp_format_is_twelve_digits() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 56).single().unwrap();
        assert_eq!(format_stamp(at), "202501020304");
    }

    #[test]
    fn default_watermark_is_five_minutes_back() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 2, 0).single().unwrap();
        assert_eq!(default_watermark(now), "202505312357");
    }

    #[test]
    fn blank_notice_number_yields_no_key() {
        let record = Announcement {
            bid_ntce_no: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(record.natural_key(), None);

        let keyed = Announcement {
            bid_ntce_no: Some("20250101-00123".to_string()),
            ..Default::default()
        };
        assert_eq!(keyed.natural_key(), Some("20250101-00123"));
    }

    #[test]
    fn announcement_round_trips_wire_names() {
        let json = serde_json::json!({
            "bidNtceNo": "20250101-00123",
            "bidNtceNm": "AI coding platform",
            "ntceInsttNm": "Ministry of Examples",
            "bidNtceSttusNm": "open",
            "someFutureField": "ignored"
        });
        let record: Announcement = serde_json::from_value(json).unwrap();
        assert_eq!(record.bid_ntce_no.as_deref(), Some("20250101-00123"));
        assert_eq!(record.bid_ntce_sttus_nm.as_deref(), Some("open"));
        assert_eq!(record.bsns_div_nm, None);

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["bidNtceNm"], "AI coding platform");
    }
}
