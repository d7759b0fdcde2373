//! Listing-side conversion: how often views of a listing are followed by a
//! reservation of that same listing.
//!
//! Reservations are matched to views through `listing_id` only. A category's
//! reservation count is the number of reservations of any listing viewed in
//! that category, so one listing seen from two markets counts in both.

use crate::analyzers::AnalysisContext;
use crate::cohorts::weekday_name;
use crate::normalize::ListingViewEvent;
use crate::rate::conversion_rate;
use crate::segments::rate_desc;
use crate::temporal::time_of_day;
use ahash::{AHashMap, AHashSet};
use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingConversionRow {
    pub dimension: &'static str,
    pub category: String,
    pub total_views: usize,
    pub total_reservations: usize,
    pub conversion_rate: Option<f64>,
    pub unique_listings: usize,
    pub reserved_listings: usize,
    pub listing_reservation_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingPerformanceRow {
    pub listing_id: String,
    pub total_views: usize,
    pub total_reservations: usize,
    pub conversion_rate: Option<f64>,
}

/// View attributes the listing report is cut by, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewDimension {
    SearchPosition,
    SourceScreen,
    ClickDma,
    AttributionSource,
    AttributionChannel,
    HostStatus,
    Month,
    DayOfWeek,
    TimeOfDay,
}

impl ViewDimension {
    pub const REPORTED: [Self; 9] = [
        Self::SearchPosition,
        Self::SourceScreen,
        Self::ClickDma,
        Self::AttributionSource,
        Self::AttributionChannel,
        Self::HostStatus,
        Self::Month,
        Self::DayOfWeek,
        Self::TimeOfDay,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::SearchPosition => "search_position",
            Self::SourceScreen => "source_screen",
            Self::ClickDma => "click_dma",
            Self::AttributionSource => "attribution_source",
            Self::AttributionChannel => "attribution_channel",
            Self::HostStatus => "host_status",
            Self::Month => "month",
            Self::DayOfWeek => "day_of_week",
            Self::TimeOfDay => "time_of_day",
        }
    }

    pub fn category(self, v: &ListingViewEvent) -> Option<String> {
        match self {
            Self::SearchPosition => Some(v.position_category.to_string()),
            Self::SourceScreen => v.source.clone(),
            Self::ClickDma => v.click_dma.clone(),
            Self::AttributionSource => v.attribution_source.clone(),
            Self::AttributionChannel => v.attribution_channel.clone(),
            Self::HostStatus => Some(if v.is_host { "Hosts" } else { "Non-Hosts" }.to_string()),
            Self::Month => Some(v.month.to_string()),
            Self::DayOfWeek => Some(weekday_name(v.event_time.weekday()).to_string()),
            Self::TimeOfDay => Some(time_of_day(v.view_hour).to_string()),
        }
    }
}

fn reservations_by_listing<'a>(ctx: &AnalysisContext<'a>) -> AHashMap<&'a str, usize> {
    let mut counts: AHashMap<&'a str, usize> = AHashMap::new();
    for r in ctx.reservations {
        *counts.entry(r.listing_id.as_str()).or_default() += 1;
    }
    counts
}

/// View-to-reservation conversion per category of every [`ViewDimension`].
/// Categories with fewer than `min_views` views are dropped; within a
/// dimension the best converting category comes first.
pub fn listing_conversion_breakdown(ctx: &AnalysisContext<'_>, min_views: usize) -> Vec<ListingConversionRow> {
    let reserved = reservations_by_listing(ctx);
    let mut rows = Vec::new();
    for dimension in ViewDimension::REPORTED {
        let mut by_category: BTreeMap<String, (usize, AHashSet<&str>)> = BTreeMap::new();
        for v in ctx.views {
            if let Some(category) = dimension.category(v) {
                let e = by_category.entry(category).or_default();
                e.0 += 1;
                e.1.insert(v.listing_id.as_str());
            }
        }
        let mut dim_rows: Vec<ListingConversionRow> = by_category
            .into_iter()
            .filter(|(_, (views, _))| *views >= min_views)
            .map(|(category, (total_views, listings))| {
                let total_reservations = listings.iter().filter_map(|l| reserved.get(l)).sum();
                let reserved_listings = listings.iter().filter(|l| reserved.contains_key(*l)).count();
                ListingConversionRow {
                    dimension: dimension.name(),
                    category,
                    total_views,
                    total_reservations,
                    conversion_rate: conversion_rate(total_reservations, total_views),
                    unique_listings: listings.len(),
                    reserved_listings,
                    listing_reservation_rate: conversion_rate(reserved_listings, listings.len()),
                }
            })
            .collect();
        dim_rows.sort_by(|a, b| rate_desc(a.conversion_rate, b.conversion_rate));
        rows.extend(dim_rows);
    }
    rows
}

/// Listings viewed at least `min_views` times, best converting first.
pub fn high_volume_listings(ctx: &AnalysisContext<'_>, min_views: usize) -> Vec<ListingPerformanceRow> {
    let reserved = reservations_by_listing(ctx);
    let mut views: BTreeMap<&str, usize> = BTreeMap::new();
    for v in ctx.views {
        *views.entry(v.listing_id.as_str()).or_default() += 1;
    }
    let mut rows: Vec<ListingPerformanceRow> = views
        .into_iter()
        .filter(|(_, n)| *n >= min_views)
        .map(|(listing_id, total_views)| {
            let total_reservations = reserved.get(listing_id).copied().unwrap_or(0);
            ListingPerformanceRow {
                listing_id: listing_id.to_string(),
                total_views,
                total_reservations,
                conversion_rate: conversion_rate(total_reservations, total_views),
            }
        })
        .collect();
    rows.sort_by(|a, b| rate_desc(a.conversion_rate, b.conversion_rate));
    rows
}
