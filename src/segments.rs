//! Search-side segment breakdowns.
//!
//! Every breakdown groups cleaned search events by one dimension and joins
//! listing views onto them, either through the originating search id or, for
//! geography, through the DMA value itself.

use crate::analyzers::AnalysisContext;
use crate::normalize::{Reservation, ResultCountCategory, SearchEvent};
use crate::rate::{conversion_rate, mean_present};
use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Search → view conversion of one group of searches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchViewStats {
    pub unique_searchers: usize,
    pub unique_viewers: usize,
    pub total_searches: usize,
    pub avg_results_per_search: Option<f64>,
    pub conversion_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchTypeRow {
    pub search_type: Option<String>,
    #[serde(flatten)]
    pub stats: SearchViewStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionRow {
    pub attribution_source: Option<String>,
    pub attribution_channel: Option<String>,
    #[serde(flatten)]
    pub stats: SearchViewStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchTermCategoryRow {
    pub search_term_category: Option<String>,
    #[serde(flatten)]
    pub stats: SearchViewStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultCountRow {
    pub result_count_category: ResultCountCategory,
    #[serde(flatten)]
    pub stats: SearchViewStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeographyRow {
    pub search_dma: Option<String>,
    pub unique_searchers: usize,
    pub unique_viewers: usize,
    pub unique_reservers: usize,
    pub unique_payers: usize,
    pub search_to_view_rate: Option<f64>,
    pub view_to_reserve_rate: Option<f64>,
    pub reserve_to_pay_rate: Option<f64>,
}

#[derive(Default)]
struct SearchViewAcc<'a> {
    searchers: AHashSet<&'a str>,
    viewers: AHashSet<&'a str>,
    search_ids: AHashSet<&'a str>,
    results: Vec<Option<f64>>,
}

impl<'a> SearchViewAcc<'a> {
    fn add(&mut self, s: &'a SearchEvent, ctx: &AnalysisContext<'a>) {
        self.searchers.insert(s.user_id.as_str());
        self.results.push(s.result_count.map(|c| c as f64));
        // A search id shared by several events contributes its viewers once.
        if self.search_ids.insert(s.search_id.as_str()) {
            if let Some(v) = ctx.viewers_of_search(&s.search_id) {
                self.viewers.extend(v.iter().copied());
            }
        }
    }

    fn finish(self) -> SearchViewStats {
        SearchViewStats {
            unique_searchers: self.searchers.len(),
            unique_viewers: self.viewers.len(),
            total_searches: self.search_ids.len(),
            avg_results_per_search: mean_present(self.results),
            conversion_rate: conversion_rate(self.viewers.len(), self.searchers.len()),
        }
    }
}

/// Groups come back in key order; searches whose key is `None` are skipped.
fn search_view_breakdown<'a, K, F>(ctx: &AnalysisContext<'a>, key: F) -> BTreeMap<K, SearchViewStats>
where
    K: Ord,
    F: Fn(&'a SearchEvent) -> Option<K>,
{
    let mut groups: BTreeMap<K, SearchViewAcc<'a>> = BTreeMap::new();
    for s in ctx.searches {
        if let Some(k) = key(s) {
            groups.entry(k).or_default().add(s, ctx);
        }
    }
    groups.into_iter().map(|(k, acc)| (k, acc.finish())).collect()
}

/// Descending by rate with missing rates last. Callers rely on a stable sort
/// over key-ordered input to break ties.
pub(crate) fn rate_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn search_type_breakdown(ctx: &AnalysisContext<'_>) -> Vec<SearchTypeRow> {
    let mut rows: Vec<SearchTypeRow> = search_view_breakdown(ctx, |s| Some(s.search_type.clone()))
        .into_iter()
        .map(|(search_type, stats)| SearchTypeRow { search_type, stats })
        .collect();
    rows.sort_by(|a, b| rate_desc(a.stats.conversion_rate, b.stats.conversion_rate));
    rows
}

/// Source/channel pairs with at least `min_searchers` distinct searchers,
/// largest first.
pub fn attribution_breakdown(ctx: &AnalysisContext<'_>, min_searchers: usize) -> Vec<AttributionRow> {
    let mut rows: Vec<AttributionRow> =
        search_view_breakdown(ctx, |s| Some((s.attribution_source.clone(), s.attribution_channel.clone())))
            .into_iter()
            .filter(|(_, stats)| stats.unique_searchers >= min_searchers)
            .map(|((attribution_source, attribution_channel), stats)| AttributionRow {
                attribution_source,
                attribution_channel,
                stats,
            })
            .collect();
    rows.sort_by(|a, b| b.stats.unique_searchers.cmp(&a.stats.unique_searchers));
    rows
}

pub fn search_term_category_breakdown(ctx: &AnalysisContext<'_>) -> Vec<SearchTermCategoryRow> {
    let mut rows: Vec<SearchTermCategoryRow> = search_view_breakdown(ctx, |s| Some(s.search_term_category.clone()))
        .into_iter()
        .map(|(search_term_category, stats)| SearchTermCategoryRow { search_term_category, stats })
        .collect();
    rows.sort_by(|a, b| b.stats.unique_searchers.cmp(&a.stats.unique_searchers));
    rows
}

/// One row per populated bucket, in bucket order. Searches without a result
/// count are left out.
pub fn result_count_breakdown(ctx: &AnalysisContext<'_>) -> Vec<ResultCountRow> {
    search_view_breakdown(ctx, |s| s.result_count_category)
        .into_iter()
        .map(|(result_count_category, stats)| ResultCountRow { result_count_category, stats })
        .collect()
}

#[derive(Default)]
struct DmaViews<'a> {
    viewers: AHashSet<&'a str>,
    listings: AHashSet<&'a str>,
}

/// Searchers per search DMA against viewers clicking in the same DMA and the
/// renters of the listings those viewers opened. The join runs on geography,
/// so viewers and renters are not necessarily the searchers themselves.
pub fn geography_breakdown(ctx: &AnalysisContext<'_>, min_searchers: usize) -> Vec<GeographyRow> {
    let mut searchers_by_dma: BTreeMap<Option<&str>, AHashSet<&str>> = BTreeMap::new();
    for s in ctx.searches {
        searchers_by_dma.entry(s.search_dma.as_deref()).or_default().insert(s.user_id.as_str());
    }

    let mut views_by_dma: AHashMap<&str, DmaViews<'_>> = AHashMap::new();
    for v in ctx.views {
        if let Some(dma) = v.click_dma.as_deref() {
            let e = views_by_dma.entry(dma).or_default();
            e.viewers.insert(v.user_id.as_str());
            e.listings.insert(v.listing_id.as_str());
        }
    }

    let mut reservations_by_listing: AHashMap<&str, Vec<&Reservation>> = AHashMap::new();
    for r in ctx.reservations {
        reservations_by_listing.entry(r.listing_id.as_str()).or_default().push(r);
    }

    let mut rows = Vec::new();
    for (dma, searchers) in searchers_by_dma {
        if searchers.len() < min_searchers {
            continue;
        }
        let mut reservers: AHashSet<&str> = AHashSet::new();
        let mut payers: AHashSet<&str> = AHashSet::new();
        // A null DMA never equals a click DMA.
        let views = dma.and_then(|d| views_by_dma.get(d));
        let unique_viewers = views.map_or(0, |v| v.viewers.len());
        if let Some(v) = views {
            for listing in &v.listings {
                for r in reservations_by_listing.get(listing).into_iter().flatten() {
                    reservers.insert(r.renter_user_id.as_str());
                    if r.is_paid() {
                        payers.insert(r.renter_user_id.as_str());
                    }
                }
            }
        }
        rows.push(GeographyRow {
            search_dma: dma.map(str::to_string),
            unique_searchers: searchers.len(),
            unique_viewers,
            unique_reservers: reservers.len(),
            unique_payers: payers.len(),
            search_to_view_rate: conversion_rate(unique_viewers, searchers.len()),
            view_to_reserve_rate: conversion_rate(reservers.len(), unique_viewers),
            reserve_to_pay_rate: conversion_rate(payers.len(), reservers.len()),
        });
    }
    rows.sort_by(|a, b| b.unique_searchers.cmp(&a.unique_searchers));
    rows
}
