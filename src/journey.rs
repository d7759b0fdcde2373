//! Per-user journey table.
//!
//! The roster is the join anchor: every known user yields exactly one row,
//! in roster order, whether or not they did anything. Searches and views are
//! matched on the platform identity, reservations on the transactional
//! identity the roster carries for that user.

use crate::normalize::{ListingViewEvent, Reservation, SearchEvent};
use crate::parser::RosterEntry;
use ahash::{AHashMap, AHashSet};
use chrono::NaiveDateTime;
use itertools::{Itertools, MinMaxResult};
use serde::ser::{Serialize, SerializeStruct, Serializer};

#[derive(Debug, Clone, PartialEq)]
pub struct UserJourney {
    pub user_id: String,
    pub transactional_id: Option<String>,
    pub total_searches: usize,
    pub total_search_events: usize,
    pub unique_listings_viewed: usize,
    pub total_view_events: usize,
    pub total_reservations: usize,
    pub successful_payments: usize,
    pub first_search_at: Option<NaiveDateTime>,
    pub last_search_at: Option<NaiveDateTime>,
    pub first_view_at: Option<NaiveDateTime>,
    pub last_view_at: Option<NaiveDateTime>,
}

impl UserJourney {
    fn idle(user_id: String, transactional_id: Option<String>) -> Self {
        Self {
            user_id,
            transactional_id,
            total_searches: 0,
            total_search_events: 0,
            unique_listings_viewed: 0,
            total_view_events: 0,
            total_reservations: 0,
            successful_payments: 0,
            first_search_at: None,
            last_search_at: None,
            first_view_at: None,
            last_view_at: None,
        }
    }

    pub fn has_searched(&self) -> bool {
        self.total_searches > 0
    }

    pub fn has_viewed_listing(&self) -> bool {
        self.unique_listings_viewed > 0
    }

    pub fn has_made_reservation(&self) -> bool {
        self.total_reservations > 0
    }

    pub fn has_completed_payment(&self) -> bool {
        self.successful_payments > 0
    }
}

// Flags are serialized from the counts.
impl Serialize for UserJourney {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("UserJourney", 15)?;
        s.serialize_field("user_id", &self.user_id)?;
        s.serialize_field("transactional_id", &self.transactional_id)?;
        s.serialize_field("total_searches", &self.total_searches)?;
        s.serialize_field("total_search_events", &self.total_search_events)?;
        s.serialize_field("unique_listings_viewed", &self.unique_listings_viewed)?;
        s.serialize_field("total_view_events", &self.total_view_events)?;
        s.serialize_field("total_reservations", &self.total_reservations)?;
        s.serialize_field("successful_payments", &self.successful_payments)?;
        s.serialize_field("first_search_at", &self.first_search_at)?;
        s.serialize_field("last_search_at", &self.last_search_at)?;
        s.serialize_field("first_view_at", &self.first_view_at)?;
        s.serialize_field("last_view_at", &self.last_view_at)?;
        s.serialize_field("has_viewed_listing", &self.has_viewed_listing())?;
        s.serialize_field("has_made_reservation", &self.has_made_reservation())?;
        s.serialize_field("has_completed_payment", &self.has_completed_payment())?;
        s.end()
    }
}

#[derive(Default)]
struct SearchActivity<'a> {
    search_ids: AHashSet<&'a str>,
    event_ids: AHashSet<&'a str>,
    times: Vec<NaiveDateTime>,
}

#[derive(Default)]
struct ViewActivity<'a> {
    listing_ids: AHashSet<&'a str>,
    event_ids: AHashSet<&'a str>,
    times: Vec<NaiveDateTime>,
}

#[derive(Default)]
struct BookingActivity<'a> {
    reservation_ids: AHashSet<&'a str>,
    paid_ids: AHashSet<&'a str>,
}

fn span(times: &[NaiveDateTime]) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
    match times.iter().minmax() {
        MinMaxResult::NoElements => (None, None),
        MinMaxResult::OneElement(t) => (Some(*t), Some(*t)),
        MinMaxResult::MinMax(a, b) => (Some(*a), Some(*b)),
    }
}

/// Distinct platform identities in roster order; the first row wins when an
/// identity repeats.
pub fn dedup_roster(roster: &[RosterEntry]) -> Vec<(&str, Option<&str>)> {
    let mut seen: AHashSet<&str> = AHashSet::with_capacity(roster.len());
    let mut out = Vec::with_capacity(roster.len());
    for entry in roster {
        let Some(uid) = entry.merged_amplitude_id.as_deref() else { continue };
        if seen.insert(uid) {
            out.push((uid, entry.user_id.as_deref()));
        }
    }
    out
}

pub fn build_journeys(
    roster: &[RosterEntry],
    searches: &[SearchEvent],
    views: &[ListingViewEvent],
    reservations: &[Reservation],
) -> Vec<UserJourney> {
    let mut search_by_user: AHashMap<&str, SearchActivity<'_>> = AHashMap::new();
    for s in searches {
        let a = search_by_user.entry(s.user_id.as_str()).or_default();
        a.search_ids.insert(s.search_id.as_str());
        a.event_ids.insert(s.event_id.as_str());
        a.times.push(s.event_time);
    }

    let mut view_by_user: AHashMap<&str, ViewActivity<'_>> = AHashMap::new();
    for v in views {
        let a = view_by_user.entry(v.user_id.as_str()).or_default();
        a.listing_ids.insert(v.listing_id.as_str());
        a.event_ids.insert(v.event_id.as_str());
        a.times.push(v.event_time);
    }

    let mut booking_by_renter: AHashMap<&str, BookingActivity<'_>> = AHashMap::new();
    for r in reservations {
        let a = booking_by_renter.entry(r.renter_user_id.as_str()).or_default();
        a.reservation_ids.insert(r.reservation_id.as_str());
        if r.is_paid() {
            a.paid_ids.insert(r.reservation_id.as_str());
        }
    }

    let users = dedup_roster(roster);
    if users.len() < roster.len() {
        tracing::debug!(roster = roster.len(), distinct = users.len(), "roster rows collapsed");
    }

    users
        .into_iter()
        .map(|(uid, txn)| {
            let mut j = UserJourney::idle(uid.to_string(), txn.map(str::to_string));
            if let Some(a) = search_by_user.get(uid) {
                j.total_searches = a.search_ids.len();
                j.total_search_events = a.event_ids.len();
                (j.first_search_at, j.last_search_at) = span(&a.times);
            }
            if let Some(a) = view_by_user.get(uid) {
                j.unique_listings_viewed = a.listing_ids.len();
                j.total_view_events = a.event_ids.len();
                (j.first_view_at, j.last_view_at) = span(&a.times);
            }
            if let Some(a) = txn.and_then(|t| booking_by_renter.get(t)) {
                j.total_reservations = a.reservation_ids.len();
                j.successful_payments = a.paid_ids.len();
            }
            j
        })
        .collect()
}
