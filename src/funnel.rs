use crate::journey::UserJourney;
use crate::rate::conversion_rate;
use serde::{Deserialize, Serialize};

/// Global search → view → reserve → pay funnel.
///
/// Each step requires all previous ones, so the populations only narrow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelMetrics {
    pub total_users: usize,
    pub total_searchers: usize,
    pub total_viewers: usize,
    pub total_reservers: usize,
    pub total_payers: usize,
    pub search_to_view_rate: Option<f64>,
    pub view_to_reserve_rate: Option<f64>,
    pub reserve_to_pay_rate: Option<f64>,
    pub overall_conversion_rate: Option<f64>,
}

pub fn aggregate(journeys: &[UserJourney]) -> FunnelMetrics {
    let mut steps = [0usize; 4];
    for j in journeys {
        let reached = [
            j.has_searched(),
            j.has_viewed_listing(),
            j.has_made_reservation(),
            j.has_completed_payment(),
        ];
        for (step, _) in reached.iter().enumerate().take_while(|(_, hit)| **hit) {
            steps[step] += 1;
        }
    }
    let [searchers, viewers, reservers, payers] = steps;
    FunnelMetrics {
        total_users: journeys.len(),
        total_searchers: searchers,
        total_viewers: viewers,
        total_reservers: reservers,
        total_payers: payers,
        search_to_view_rate: conversion_rate(viewers, searchers),
        view_to_reserve_rate: conversion_rate(reservers, viewers),
        reserve_to_pay_rate: conversion_rate(payers, reservers),
        overall_conversion_rate: conversion_rate(payers, searchers),
    }
}
