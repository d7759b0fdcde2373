use crate::error::{PipelineError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Search event as exported by the event-logging system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSearchEvent {
    #[serde(default, alias = "uuid", deserialize_with = "opt_text")]
    pub event_id: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub merged_amplitude_id: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub search_id: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub event_time: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub search_type: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub search_term: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub search_term_category: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub search_sort: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub search_dma: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub first_attribution_source: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub first_attribution_channel: Option<String>,
    #[serde(default, deserialize_with = "opt_int")]
    pub count_results: Option<i64>,
    #[serde(default, deserialize_with = "opt_flag")]
    pub is_bot: Option<bool>,
    #[serde(default, deserialize_with = "opt_flag")]
    pub is_host: Option<bool>,
    #[serde(default, deserialize_with = "opt_flag")]
    pub is_neighbor: Option<bool>,
}

/// Listing detail view event as exported by the event-logging system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawListingView {
    #[serde(default, alias = "uuid", deserialize_with = "opt_text")]
    pub event_id: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub merged_amplitude_id: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub listing_id: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub search_id: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub event_time: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub click_dma: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub first_attribution_source: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub first_attribution_channel: Option<String>,
    #[serde(default, deserialize_with = "opt_int")]
    pub search_position: Option<i64>,
    #[serde(default, deserialize_with = "opt_flag")]
    pub is_bot: Option<bool>,
    #[serde(default, deserialize_with = "opt_flag")]
    pub is_host: Option<bool>,
    #[serde(default, deserialize_with = "opt_flag")]
    pub is_neighbor: Option<bool>,
}

/// Reservation record as exported by the booking system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawReservation {
    #[serde(default, alias = "id", deserialize_with = "opt_text")]
    pub reservation_id: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub renter_user_id: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub host_user_id: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub listing_id: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub approved_at: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub successful_payment_collected_at: Option<String>,
}

/// One known user: the event-stream identity and, when the user has ever
/// transacted, the booking-system identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterEntry {
    #[serde(default, deserialize_with = "opt_text")]
    pub merged_amplitude_id: Option<String>,
    #[serde(default, alias = "renter_user_id", deserialize_with = "opt_text")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub lines: usize,
    pub records: usize,
    pub malformed: usize,
}

/// Read a JSON Lines file into records. Blank lines are skipped; malformed
/// lines are counted and skipped unless `fail_fast` is set.
pub fn read_records<T: DeserializeOwned>(path: &Path, fail_fast: bool) -> Result<(Vec<T>, LoadReport)> {
    let f = File::open(path).map_err(|source| PipelineError::Io { path: path.to_path_buf(), source })?;
    let r = BufReader::with_capacity(1 << 20, f);
    parse_records(r, path, fail_fast)
}

pub fn parse_records<T: DeserializeOwned, R: BufRead>(reader: R, origin: &Path, fail_fast: bool) -> Result<(Vec<T>, LoadReport)> {
    let mut out = Vec::new();
    let mut report = LoadReport::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| PipelineError::Io { path: origin.to_path_buf(), source })?;
        if line.trim().is_empty() {
            continue;
        }
        report.lines += 1;
        match serde_json::from_str::<T>(&line) {
            Ok(rec) => {
                out.push(rec);
                report.records += 1;
            }
            Err(source) if fail_fast => {
                return Err(PipelineError::Malformed { path: origin.to_path_buf(), line: idx + 1, source });
            }
            Err(e) => {
                report.malformed += 1;
                tracing::warn!(path = %origin.display(), line = idx + 1, error = %e, "skipping malformed record");
            }
        }
    }
    Ok((out, report))
}

/// Parse a recorded timestamp, keeping the wall clock it was written in.
/// Offsets are accepted but never applied.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    parse_ts_string(s).or_else(|| parse_ts_number_string(s))
}

fn parse_ts_string(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    let zoned = [
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M:%S%z",
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S%.f%#z",
        "%Y-%m-%d %H:%M:%S%#z",
        "%Y-%m-%dT%H:%M:%S%.f%#z",
        "%Y-%m-%dT%H:%M:%S%#z",
    ];
    for f in zoned.iter() {
        if let Ok(dt) = DateTime::parse_from_str(s, f) {
            return Some(dt.naive_local());
        }
    }
    let naive = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
    ];
    for f in naive.iter() {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, f) {
            return Some(ndt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_ts_number_string(s: &str) -> Option<NaiveDateTime> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let n = s.parse::<i64>().ok()?;
    let (secs, nanos) = match s.len() {
        10 => (n, 0),
        13 => (n / 1_000, (n % 1_000) * 1_000_000),
        16 => (n / 1_000_000, (n % 1_000_000) * 1_000),
        _ => return None,
    };
    DateTime::<Utc>::from_timestamp(secs, nanos as u32).map(|d| d.naive_utc())
}

fn opt_text<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.and_then(value_to_text))
}

fn opt_flag<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<bool>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.and_then(|v| value_to_flag(&v)))
}

fn opt_int<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i64>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.and_then(|v| value_to_int(&v)))
}

/// Exports come out of dataframes, so ids may arrive as `123`, `123.0` or
/// `"123"`, and missing values as `""`, `"nan"` or `"null"`.
pub(crate) fn value_to_text(v: Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            if is_missing_marker(t) { None } else { Some(t.to_string()) }
        }
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Some(n.to_string())
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 => Some(format!("{}", f as i64)),
                    Some(f) if f.is_finite() => Some(n.to_string()),
                    _ => None,
                }
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn value_to_flag(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "y" => Some(true),
            "false" | "f" | "0" | "no" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn value_to_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite() && f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let t = s.trim();
            if is_missing_marker(t) { return None; }
            t.parse::<i64>()
                .ok()
                .or_else(|| t.parse::<f64>().ok().filter(|f| f.is_finite() && f.fract() == 0.0).map(|f| f as i64))
        }
        _ => None,
    }
}

fn is_missing_marker(t: &str) -> bool {
    t.is_empty() || t.eq_ignore_ascii_case("null") || t.eq_ignore_ascii_case("nan") || t.eq_ignore_ascii_case("none")
}
