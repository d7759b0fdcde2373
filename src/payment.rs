//! Reservation outcomes, independent of the search and view streams.

use crate::normalize::{Reservation, ReservationStatus};
use crate::rate::{conversion_rate, mean_present};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentSummary {
    pub total_reservations: usize,
    pub successful_payments: usize,
    pub pending_payments: usize,
    pub pending_approvals: usize,
    pub payment_completion_rate: Option<f64>,
    pub avg_hours_to_approval: Option<f64>,
    pub avg_hours_to_payment: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentMonthlyRow {
    pub reservation_month: u32,
    #[serde(flatten)]
    pub summary: PaymentSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentReport {
    pub overall: PaymentSummary,
    pub monthly: Vec<PaymentMonthlyRow>,
}

pub fn summarize<'a, I>(reservations: I) -> PaymentSummary
where
    I: IntoIterator<Item = &'a Reservation>,
{
    let mut out = PaymentSummary::default();
    let mut approval = Vec::new();
    let mut payment = Vec::new();
    for r in reservations {
        out.total_reservations += 1;
        match r.reservation_status {
            ReservationStatus::Completed => out.successful_payments += 1,
            ReservationStatus::PendingPayment => out.pending_payments += 1,
            ReservationStatus::PendingApproval => out.pending_approvals += 1,
        }
        approval.push(r.hours_to_approval);
        payment.push(r.hours_to_payment);
    }
    out.payment_completion_rate = conversion_rate(out.successful_payments, out.total_reservations);
    out.avg_hours_to_approval = mean_present(approval);
    out.avg_hours_to_payment = mean_present(payment);
    out
}

/// Overall figures plus one row per creation month, in month order.
pub fn analyze(reservations: &[Reservation]) -> PaymentReport {
    let mut by_month: BTreeMap<u32, Vec<&Reservation>> = BTreeMap::new();
    for r in reservations {
        by_month.entry(r.reservation_month).or_default().push(r);
    }
    PaymentReport {
        overall: summarize(reservations),
        monthly: by_month
            .into_iter()
            .map(|(reservation_month, rs)| PaymentMonthlyRow {
                reservation_month,
                summary: summarize(rs),
            })
            .collect(),
    }
}
