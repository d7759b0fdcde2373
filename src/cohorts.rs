//! Breakdowns that score each group against the users' own journeys rather
//! than against a joined event stream.

use crate::analyzers::AnalysisContext;
use crate::journey::UserJourney;
use crate::normalize::{PositionCategory, SearchEvent};
use crate::rate::{conversion_rate, mean_present, per_unit};
use crate::segments::rate_desc;
use crate::temporal::time_of_day;
use ahash::AHashSet;
use chrono::Weekday;
use serde::Serialize;
use std::collections::BTreeMap;

const WEEKDAYS: [&str; 7] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayOfWeekRow {
    pub day_of_week: String,
    pub total_searchers: usize,
    pub funnel_users: usize,
    pub conversion_rate: Option<f64>,
}

/// Searchers in one category of one search attribute and how many of them
/// never completed search, view and reservation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NonConversionRow {
    pub dimension: &'static str,
    pub category: String,
    pub total_searchers: usize,
    pub non_converting_users: usize,
    pub non_conversion_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostStatusRow {
    pub user_type: String,
    pub total_searchers: usize,
    pub funnel_users: usize,
    pub conversion_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSortRow {
    pub search_sort: String,
    pub total_users: usize,
    pub converting_users: usize,
    pub total_searches: usize,
    pub avg_searches_per_user: Option<f64>,
    pub avg_results_per_search: Option<f64>,
    pub conversion_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPositionRow {
    pub position_category: PositionCategory,
    pub unique_viewers: usize,
    pub total_views: usize,
    pub converting_viewers: usize,
    pub conversion_rate: Option<f64>,
}

/// Users whose journey passes `pred`. Identities missing from the roster
/// have no journey and never count.
fn count_users(ctx: &AnalysisContext<'_>, users: &AHashSet<&str>, pred: impl Fn(&UserJourney) -> bool) -> usize {
    users.iter().filter(|u| ctx.journey(u).is_some_and(&pred)).count()
}

/// Viewed a listing and reserved, the funnel the weekday and host reports use.
fn reached_reservation(j: &UserJourney) -> bool {
    j.has_viewed_listing() && j.has_made_reservation()
}

pub(crate) fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAYS[day.num_days_from_monday() as usize]
}

fn host_label(is_host: bool) -> &'static str {
    if is_host { "Hosts" } else { "Non-Hosts" }
}

fn completed_funnel(j: &UserJourney) -> bool {
    j.has_searched() && j.has_viewed_listing() && j.has_made_reservation()
}

pub fn day_of_week_breakdown(ctx: &AnalysisContext<'_>) -> Vec<DayOfWeekRow> {
    let mut by_day: BTreeMap<usize, AHashSet<&str>> = BTreeMap::new();
    for s in ctx.searches {
        by_day
            .entry(s.day_of_week.num_days_from_monday() as usize)
            .or_default()
            .insert(s.user_id.as_str());
    }
    by_day
        .into_iter()
        .map(|(day, users)| {
            let funnel_users = count_users(ctx, &users, reached_reservation);
            DayOfWeekRow {
                day_of_week: WEEKDAYS[day].to_string(),
                total_searchers: users.len(),
                funnel_users,
                conversion_rate: conversion_rate(funnel_users, users.len()),
            }
        })
        .collect()
}

pub fn host_status_breakdown(ctx: &AnalysisContext<'_>) -> Vec<HostStatusRow> {
    let mut by_host: BTreeMap<bool, AHashSet<&str>> = BTreeMap::new();
    for s in ctx.searches {
        by_host.entry(s.is_host).or_default().insert(s.user_id.as_str());
    }
    by_host
        .into_iter()
        .map(|(is_host, users)| {
            let funnel_users = count_users(ctx, &users, reached_reservation);
            HostStatusRow {
                user_type: host_label(is_host).to_string(),
                total_searchers: users.len(),
                funnel_users,
                conversion_rate: conversion_rate(funnel_users, users.len()),
            }
        })
        .collect()
}

#[derive(Default)]
struct SortAcc<'a> {
    users: AHashSet<&'a str>,
    searches: usize,
    results: Vec<Option<f64>>,
}

/// Converting users for a sort order are its searchers who went on to view
/// any listing.
pub fn search_sort_breakdown(ctx: &AnalysisContext<'_>) -> Vec<SearchSortRow> {
    let mut by_sort: BTreeMap<&str, SortAcc<'_>> = BTreeMap::new();
    for s in ctx.searches {
        let Some(sort) = s.search_sort.as_deref() else { continue };
        let acc = by_sort.entry(sort).or_default();
        acc.users.insert(s.user_id.as_str());
        acc.searches += 1;
        acc.results.push(s.result_count.map(|c| c as f64));
    }
    let mut rows: Vec<SearchSortRow> = by_sort
        .into_iter()
        .map(|(sort, acc)| {
            let converting_users = count_users(ctx, &acc.users, UserJourney::has_viewed_listing);
            SearchSortRow {
                search_sort: sort.to_string(),
                total_users: acc.users.len(),
                converting_users,
                total_searches: acc.searches,
                avg_searches_per_user: per_unit(acc.searches, acc.users.len()),
                avg_results_per_search: mean_present(acc.results),
                conversion_rate: conversion_rate(converting_users, acc.users.len()),
            }
        })
        .collect();
    rows.sort_by(|a, b| rate_desc(a.conversion_rate, b.conversion_rate));
    rows
}

/// Viewers per result-page position bucket and how many of them reserved.
pub fn search_position_breakdown(ctx: &AnalysisContext<'_>) -> Vec<SearchPositionRow> {
    let mut by_position: BTreeMap<PositionCategory, (AHashSet<&str>, usize)> = BTreeMap::new();
    for v in ctx.views {
        let e = by_position.entry(v.position_category).or_default();
        e.0.insert(v.user_id.as_str());
        e.1 += 1;
    }
    by_position
        .into_iter()
        .map(|(position_category, (viewers, total_views))| {
            let converting_viewers = count_users(ctx, &viewers, UserJourney::has_made_reservation);
            SearchPositionRow {
                position_category,
                unique_viewers: viewers.len(),
                total_views,
                converting_viewers,
                conversion_rate: conversion_rate(converting_viewers, viewers.len()),
            }
        })
        .collect()
}

/// Search attributes the non-conversion report is cut by, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDimension {
    SearchType,
    SearchTermCategory,
    SearchSort,
    SearchDma,
    ResultCount,
    HostStatus,
    Month,
    DayOfWeek,
    TimeOfDay,
    AttributionSource,
    AttributionChannel,
}

impl SearchDimension {
    pub const REPORTED: [Self; 11] = [
        Self::SearchType,
        Self::SearchTermCategory,
        Self::SearchSort,
        Self::SearchDma,
        Self::ResultCount,
        Self::HostStatus,
        Self::Month,
        Self::DayOfWeek,
        Self::TimeOfDay,
        Self::AttributionSource,
        Self::AttributionChannel,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::SearchType => "search_type",
            Self::SearchTermCategory => "search_term_category",
            Self::SearchSort => "search_sort",
            Self::SearchDma => "search_dma",
            Self::ResultCount => "result_count",
            Self::HostStatus => "host_status",
            Self::Month => "month",
            Self::DayOfWeek => "day_of_week",
            Self::TimeOfDay => "time_of_day",
            Self::AttributionSource => "attribution_source",
            Self::AttributionChannel => "attribution_channel",
        }
    }

    /// `None` leaves the search out of this dimension.
    pub fn category(self, s: &SearchEvent) -> Option<String> {
        match self {
            Self::SearchType => s.search_type.clone(),
            Self::SearchTermCategory => s.search_term_category.clone(),
            Self::SearchSort => s.search_sort.clone(),
            Self::SearchDma => s.search_dma.clone(),
            Self::ResultCount => s.result_count_category.map(|c| c.label().to_string()),
            Self::HostStatus => Some(host_label(s.is_host).to_string()),
            Self::Month => Some(s.month.to_string()),
            Self::DayOfWeek => Some(weekday_name(s.day_of_week).to_string()),
            Self::TimeOfDay => Some(time_of_day(s.search_hour).to_string()),
            Self::AttributionSource => s.attribution_source.clone(),
            Self::AttributionChannel => s.attribution_channel.clone(),
        }
    }
}

/// Share of each category's searchers who did not complete the funnel, for
/// every [`SearchDimension`]. Categories with fewer than `min_searchers`
/// distinct searchers are dropped; within a dimension the worst category
/// comes first. Searchers missing from the roster count as non-converting.
pub fn non_conversion_breakdown(ctx: &AnalysisContext<'_>, min_searchers: usize) -> Vec<NonConversionRow> {
    let mut rows = Vec::new();
    for dimension in SearchDimension::REPORTED {
        let mut by_category: BTreeMap<String, AHashSet<&str>> = BTreeMap::new();
        for s in ctx.searches {
            if let Some(category) = dimension.category(s) {
                by_category.entry(category).or_default().insert(s.user_id.as_str());
            }
        }
        let mut dim_rows: Vec<NonConversionRow> = by_category
            .into_iter()
            .filter(|(_, users)| users.len() >= min_searchers)
            .map(|(category, users)| {
                let non_converting_users = users.len() - count_users(ctx, &users, completed_funnel);
                NonConversionRow {
                    dimension: dimension.name(),
                    category,
                    total_searchers: users.len(),
                    non_converting_users,
                    non_conversion_rate: conversion_rate(non_converting_users, users.len()),
                }
            })
            .collect();
        dim_rows.sort_by(|a, b| rate_desc(a.non_conversion_rate, b.non_conversion_rate));
        rows.extend(dim_rows);
    }
    rows
}
