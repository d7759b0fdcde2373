//! Month and hour-of-day trends.
//!
//! Each bucket compares four independently drawn populations: users who
//! searched in the bucket, users who viewed in it, and renters whose
//! reservation was created in it. Nothing ties a viewer to an earlier search,
//! so the stage ratios are correlations across populations rather than a
//! per-user funnel, and every row says so through `cross_population`.

use crate::analyzers::AnalysisContext;
use crate::normalize::{ListingViewEvent, Reservation, SearchEvent};
use crate::rate::{conversion_rate, mean_present};
use ahash::AHashSet;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalStats {
    pub unique_searchers: usize,
    pub unique_viewers: usize,
    pub unique_reservers: usize,
    pub unique_payers: usize,
    pub total_searches: usize,
    pub avg_search_results: Option<f64>,
    pub search_to_view_rate: Option<f64>,
    pub view_to_reserve_rate: Option<f64>,
    pub reserve_to_pay_rate: Option<f64>,
    pub cross_population: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRow {
    pub month: u32,
    #[serde(flatten)]
    pub stats: TemporalStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyRow {
    pub hour: u32,
    #[serde(flatten)]
    pub stats: TemporalStats,
}

#[derive(Default)]
struct Bucket<'a> {
    searchers: AHashSet<&'a str>,
    search_ids: AHashSet<&'a str>,
    results: Vec<Option<f64>>,
    viewers: AHashSet<&'a str>,
    reservers: AHashSet<&'a str>,
    payers: AHashSet<&'a str>,
}

impl Bucket<'_> {
    fn finish(self) -> TemporalStats {
        TemporalStats {
            unique_searchers: self.searchers.len(),
            unique_viewers: self.viewers.len(),
            unique_reservers: self.reservers.len(),
            unique_payers: self.payers.len(),
            total_searches: self.search_ids.len(),
            avg_search_results: mean_present(self.results),
            search_to_view_rate: conversion_rate(self.viewers.len(), self.searchers.len()),
            view_to_reserve_rate: conversion_rate(self.reservers.len(), self.viewers.len()),
            reserve_to_pay_rate: conversion_rate(self.payers.len(), self.reservers.len()),
            cross_population: true,
        }
    }
}

/// Buckets are opened by searches only; views and reservations landing in a
/// bucket nobody searched in are not reported.
fn bucketed<'a>(
    ctx: &AnalysisContext<'a>,
    search_key: impl Fn(&SearchEvent) -> u32,
    view_key: impl Fn(&ListingViewEvent) -> u32,
    reservation_key: impl Fn(&Reservation) -> u32,
) -> BTreeMap<u32, TemporalStats> {
    let mut buckets: BTreeMap<u32, Bucket<'a>> = BTreeMap::new();
    for s in ctx.searches {
        let b = buckets.entry(search_key(s)).or_default();
        b.searchers.insert(s.user_id.as_str());
        b.search_ids.insert(s.search_id.as_str());
        b.results.push(s.result_count.map(|c| c as f64));
    }
    for v in ctx.views {
        if let Some(b) = buckets.get_mut(&view_key(v)) {
            b.viewers.insert(v.user_id.as_str());
        }
    }
    for r in ctx.reservations {
        if let Some(b) = buckets.get_mut(&reservation_key(r)) {
            b.reservers.insert(r.renter_user_id.as_str());
            if r.is_paid() {
                b.payers.insert(r.renter_user_id.as_str());
            }
        }
    }
    buckets.into_iter().map(|(k, b)| (k, b.finish())).collect()
}

pub fn monthly_correlation(ctx: &AnalysisContext<'_>) -> Vec<MonthlyRow> {
    bucketed(ctx, |s| s.month, |v| v.month, |r| r.reservation_month)
        .into_iter()
        .map(|(month, stats)| MonthlyRow { month, stats })
        .collect()
}

pub fn hourly_correlation(ctx: &AnalysisContext<'_>) -> Vec<HourlyRow> {
    bucketed(ctx, |s| s.search_hour, |v| v.view_hour, |r| r.reservation_hour)
        .into_iter()
        .map(|(hour, stats)| HourlyRow { hour, stats })
        .collect()
}

/// Six-hour band of the day, half-open at the upper edge.
pub fn time_of_day(hour: u32) -> &'static str {
    match hour {
        0..=5 => "Night (0-6)",
        6..=11 => "Morning (6-12)",
        12..=17 => "Afternoon (12-18)",
        _ => "Evening (18-24)",
    }
}
