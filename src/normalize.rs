use crate::parser::{self, RawListingView, RawReservation, RawSearchEvent};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result-count bucket of a search. Declaration order is the report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResultCountCategory {
    #[serde(rename = "No Results")]
    NoResults,
    #[serde(rename = "1-10 Results")]
    UpTo10,
    #[serde(rename = "11-50 Results")]
    UpTo50,
    #[serde(rename = "51-100 Results")]
    UpTo100,
    #[serde(rename = "101-200 Results")]
    UpTo200,
    #[serde(rename = "200+ Results")]
    Over200,
}

impl ResultCountCategory {
    /// Negative counts have no bucket.
    pub fn from_count(count: i64) -> Option<Self> {
        match count {
            0 => Some(Self::NoResults),
            1..=10 => Some(Self::UpTo10),
            11..=50 => Some(Self::UpTo50),
            51..=100 => Some(Self::UpTo100),
            101..=200 => Some(Self::UpTo200),
            c if c > 200 => Some(Self::Over200),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NoResults => "No Results",
            Self::UpTo10 => "1-10 Results",
            Self::UpTo50 => "11-50 Results",
            Self::UpTo100 => "51-100 Results",
            Self::UpTo200 => "101-200 Results",
            Self::Over200 => "200+ Results",
        }
    }
}

impl fmt::Display for ResultCountCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Position of the clicked listing in the result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PositionCategory {
    #[serde(rename = "Top 5")]
    Top5,
    #[serde(rename = "6-10")]
    From6To10,
    #[serde(rename = "11-20")]
    From11To20,
    #[serde(rename = "20+")]
    Beyond20,
}

impl PositionCategory {
    /// Anything outside 1..=20, including an unknown position, is "20+".
    pub fn from_position(position: Option<i64>) -> Self {
        match position {
            Some(1..=5) => Self::Top5,
            Some(6..=10) => Self::From6To10,
            Some(11..=20) => Self::From11To20,
            _ => Self::Beyond20,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Top5 => "Top 5",
            Self::From6To10 => "6-10",
            Self::From11To20 => "11-20",
            Self::Beyond20 => "20+",
        }
    }
}

impl fmt::Display for PositionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Pending Payment")]
    PendingPayment,
    #[serde(rename = "Pending Approval")]
    PendingApproval,
}

impl ReservationStatus {
    /// A collected payment wins regardless of the approval timestamp.
    pub fn derive(approved_at: Option<NaiveDateTime>, paid_at: Option<NaiveDateTime>) -> Self {
        match (approved_at, paid_at) {
            (_, Some(_)) => Self::Completed,
            (Some(_), None) => Self::PendingPayment,
            (None, None) => Self::PendingApproval,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::PendingPayment => "Pending Payment",
            Self::PendingApproval => "Pending Approval",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEvent {
    pub event_id: String,
    pub user_id: String,
    pub search_id: String,
    pub event_time: NaiveDateTime,
    pub search_type: Option<String>,
    pub search_term: Option<String>,
    pub search_term_category: Option<String>,
    pub search_sort: Option<String>,
    pub search_dma: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub attribution_source: Option<String>,
    pub attribution_channel: Option<String>,
    pub is_host: bool,
    pub is_neighbor: bool,
    pub result_count: Option<i64>,
    pub result_count_category: Option<ResultCountCategory>,
    pub search_hour: u32,
    pub search_session_id: String,
    pub day_of_week: Weekday,
    pub month: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingViewEvent {
    pub event_id: String,
    pub user_id: String,
    pub listing_id: String,
    pub search_id: Option<String>,
    pub event_time: NaiveDateTime,
    pub source: Option<String>,
    pub click_dma: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub attribution_source: Option<String>,
    pub attribution_channel: Option<String>,
    pub is_host: bool,
    pub is_neighbor: bool,
    pub search_position: Option<i64>,
    pub position_category: PositionCategory,
    pub view_hour: u32,
    pub month: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: String,
    pub renter_user_id: String,
    pub host_user_id: Option<String>,
    pub listing_id: String,
    pub created_at: NaiveDateTime,
    pub approved_at: Option<NaiveDateTime>,
    pub payment_collected_at: Option<NaiveDateTime>,
    pub reservation_status: ReservationStatus,
    pub hours_to_approval: Option<f64>,
    pub hours_to_payment: Option<f64>,
    pub reservation_month: u32,
    pub reservation_hour: u32,
}

impl Reservation {
    pub fn is_paid(&self) -> bool {
        self.reservation_status == ReservationStatus::Completed
    }
}

/// Rows that survived cleaning plus how many were dropped.
#[derive(Debug, Clone, Default)]
pub struct Cleaned<T> {
    pub rows: Vec<T>,
    pub dropped: usize,
}

fn clean_all<R, T>(raw: &[R], f: impl Fn(&R) -> Option<T>) -> Cleaned<T> {
    let rows: Vec<T> = raw.iter().filter_map(f).collect();
    let dropped = raw.len() - rows.len();
    Cleaned { rows, dropped }
}

pub fn clean_searches(raw: &[RawSearchEvent]) -> Cleaned<SearchEvent> {
    clean_all(raw, normalize_search)
}

pub fn clean_views(raw: &[RawListingView]) -> Cleaned<ListingViewEvent> {
    clean_all(raw, normalize_view)
}

pub fn clean_reservations(raw: &[RawReservation]) -> Cleaned<Reservation> {
    clean_all(raw, normalize_reservation)
}

/// User identity plus calendar day. The date suffix is fixed width, so the
/// key splits unambiguously at the last separator.
pub fn session_key(user_id: &str, date: NaiveDate) -> String {
    format!("{}_{}", user_id, date.format("%Y-%m-%d"))
}

pub fn normalize_search(raw: &RawSearchEvent) -> Option<SearchEvent> {
    if raw.is_bot.unwrap_or(false) {
        return None;
    }
    let user_id = raw.merged_amplitude_id.clone()?;
    let search_id = raw.search_id.clone()?;
    let event_time = raw.event_time.as_deref().and_then(parser::parse_timestamp)?;
    let event_id = raw
        .event_id
        .clone()
        .unwrap_or_else(|| format!("{search_id}@{}", event_time.format("%Y-%m-%dT%H:%M:%S%.f")));
    Some(SearchEvent {
        event_id,
        search_session_id: session_key(&user_id, event_time.date()),
        user_id,
        search_id,
        event_time,
        search_type: raw.search_type.clone(),
        search_term: raw.search_term.clone(),
        search_term_category: raw.search_term_category.clone(),
        search_sort: raw.search_sort.clone(),
        search_dma: raw.search_dma.clone(),
        country: raw.country.clone(),
        region: raw.region.clone(),
        city: raw.city.clone(),
        attribution_source: raw.first_attribution_source.clone(),
        attribution_channel: raw.first_attribution_channel.clone(),
        is_host: raw.is_host.unwrap_or(false),
        is_neighbor: raw.is_neighbor.unwrap_or(false),
        result_count: raw.count_results,
        result_count_category: raw.count_results.and_then(ResultCountCategory::from_count),
        search_hour: event_time.hour(),
        day_of_week: event_time.weekday(),
        month: event_time.month(),
    })
}

pub fn normalize_view(raw: &RawListingView) -> Option<ListingViewEvent> {
    if raw.is_bot.unwrap_or(false) {
        return None;
    }
    let user_id = raw.merged_amplitude_id.clone()?;
    let listing_id = raw.listing_id.clone()?;
    let event_time = raw.event_time.as_deref().and_then(parser::parse_timestamp)?;
    let event_id = raw
        .event_id
        .clone()
        .unwrap_or_else(|| format!("{user_id}:{listing_id}@{}", event_time.format("%Y-%m-%dT%H:%M:%S%.f")));
    Some(ListingViewEvent {
        event_id,
        user_id,
        listing_id,
        search_id: raw.search_id.clone(),
        event_time,
        source: raw.source.clone(),
        click_dma: raw.click_dma.clone(),
        country: raw.country.clone(),
        region: raw.region.clone(),
        city: raw.city.clone(),
        attribution_source: raw.first_attribution_source.clone(),
        attribution_channel: raw.first_attribution_channel.clone(),
        is_host: raw.is_host.unwrap_or(false),
        is_neighbor: raw.is_neighbor.unwrap_or(false),
        search_position: raw.search_position,
        position_category: PositionCategory::from_position(raw.search_position),
        view_hour: event_time.hour(),
        month: event_time.month(),
    })
}

pub fn normalize_reservation(raw: &RawReservation) -> Option<Reservation> {
    let renter_user_id = raw.renter_user_id.clone()?;
    let listing_id = raw.listing_id.clone()?;
    let created_at = raw.created_at.as_deref().and_then(parser::parse_timestamp)?;
    let approved_at = raw.approved_at.as_deref().and_then(parser::parse_timestamp);
    let payment_collected_at = raw.successful_payment_collected_at.as_deref().and_then(parser::parse_timestamp);
    let reservation_id = raw
        .reservation_id
        .clone()
        .unwrap_or_else(|| format!("{renter_user_id}:{listing_id}@{}", created_at.format("%Y-%m-%dT%H:%M:%S%.f")));
    Some(Reservation {
        reservation_id,
        renter_user_id,
        host_user_id: raw.host_user_id.clone(),
        listing_id,
        created_at,
        approved_at,
        payment_collected_at,
        reservation_status: ReservationStatus::derive(approved_at, payment_collected_at),
        hours_to_approval: approved_at.map(|t| hours_between(created_at, t)),
        hours_to_payment: payment_collected_at.map(|t| hours_between(created_at, t)),
        reservation_month: created_at.month(),
        reservation_hour: created_at.hour(),
    })
}

fn hours_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}
