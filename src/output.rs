//! Assembly of every metric table into one tagged row stream.

use crate::analyzers::AnalysisResults;
use crate::cohorts::{DayOfWeekRow, HostStatusRow, NonConversionRow, SearchPositionRow, SearchSortRow};
use crate::funnel::FunnelMetrics;
use crate::listings::{ListingConversionRow, ListingPerformanceRow};
use crate::payment::{PaymentMonthlyRow, PaymentSummary};
use crate::pipeline::PipelineOpts;
use crate::segments::{AttributionRow, GeographyRow, ResultCountRow, SearchTermCategoryRow, SearchTypeRow};
use crate::temporal::{HourlyRow, MonthlyRow};
use serde::Serialize;
use serde_json::{Map, Value};

/// One output row. The `analysis_type` tag is the first field of every
/// serialized row; the remaining fields depend on the variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "analysis_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisRow {
    FunnelMetrics(FunnelMetrics),
    SearchType(SearchTypeRow),
    Attribution(AttributionRow),
    Geographic(GeographyRow),
    Monthly(MonthlyRow),
    Hourly(HourlyRow),
    SearchTermCategory(SearchTermCategoryRow),
    ResultCount(ResultCountRow),
    DayOfWeek(DayOfWeekRow),
    HostStatus(HostStatusRow),
    SearchSort(SearchSortRow),
    SearchPosition(SearchPositionRow),
    NonConversion(NonConversionRow),
    ListingConversion(ListingConversionRow),
    HighVolumeListing(ListingPerformanceRow),
    Payment(PaymentSummary),
    PaymentMonthly(PaymentMonthlyRow),
}

impl AnalysisRow {
    pub fn analysis_type(&self) -> &'static str {
        match self {
            Self::FunnelMetrics(_) => "FUNNEL_METRICS",
            Self::SearchType(_) => "SEARCH_TYPE",
            Self::Attribution(_) => "ATTRIBUTION",
            Self::Geographic(_) => "GEOGRAPHIC",
            Self::Monthly(_) => "MONTHLY",
            Self::Hourly(_) => "HOURLY",
            Self::SearchTermCategory(_) => "SEARCH_TERM_CATEGORY",
            Self::ResultCount(_) => "RESULT_COUNT",
            Self::DayOfWeek(_) => "DAY_OF_WEEK",
            Self::HostStatus(_) => "HOST_STATUS",
            Self::SearchSort(_) => "SEARCH_SORT",
            Self::SearchPosition(_) => "SEARCH_POSITION",
            Self::NonConversion(_) => "NON_CONVERSION",
            Self::ListingConversion(_) => "LISTING_CONVERSION",
            Self::HighVolumeListing(_) => "HIGH_VOLUME_LISTING",
            Self::Payment(_) => "PAYMENT",
            Self::PaymentMonthly(_) => "PAYMENT_MONTHLY",
        }
    }
}

/// Flatten the funnel and every analyzer table into output order. Attribution,
/// geography and the high-volume listings are cut to `opts.top_rows` after
/// their own sorting.
pub fn assemble(funnel: &FunnelMetrics, results: &AnalysisResults, opts: &PipelineOpts) -> Vec<AnalysisRow> {
    let top = opts.top_rows;
    let mut rows = vec![AnalysisRow::FunnelMetrics(funnel.clone())];
    rows.extend(results.search_type.iter().cloned().map(AnalysisRow::SearchType));
    rows.extend(results.attribution.iter().take(top).cloned().map(AnalysisRow::Attribution));
    rows.extend(results.geography.iter().take(top).cloned().map(AnalysisRow::Geographic));
    rows.extend(results.monthly.iter().cloned().map(AnalysisRow::Monthly));
    rows.extend(results.hourly.iter().cloned().map(AnalysisRow::Hourly));
    rows.extend(results.search_term_category.iter().cloned().map(AnalysisRow::SearchTermCategory));
    rows.extend(results.result_count.iter().cloned().map(AnalysisRow::ResultCount));
    rows.extend(results.day_of_week.iter().cloned().map(AnalysisRow::DayOfWeek));
    rows.extend(results.host_status.iter().cloned().map(AnalysisRow::HostStatus));
    rows.extend(results.search_sort.iter().cloned().map(AnalysisRow::SearchSort));
    rows.extend(results.search_position.iter().cloned().map(AnalysisRow::SearchPosition));
    rows.extend(results.non_conversion.iter().cloned().map(AnalysisRow::NonConversion));
    rows.extend(results.listing_conversion.iter().cloned().map(AnalysisRow::ListingConversion));
    rows.extend(results.high_volume_listings.iter().take(top).cloned().map(AnalysisRow::HighVolumeListing));
    if let Some(report) = &results.payment {
        rows.push(AnalysisRow::Payment(report.overall.clone()));
        rows.extend(report.monthly.iter().cloned().map(AnalysisRow::PaymentMonthly));
    }
    rows
}

/// The row stream as one rectangular table: `analysis_type` first, then the
/// union of all other field names in first-seen order. Absent cells are null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl UniformTable {
    pub fn from_rows(rows: &[AnalysisRow]) -> crate::error::Result<Self> {
        let mut columns: Vec<String> = vec!["analysis_type".to_string()];
        let mut objects: Vec<Map<String, Value>> = Vec::with_capacity(rows.len());
        for row in rows {
            let Value::Object(obj) = serde_json::to_value(row)? else { continue };
            for key in obj.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
            objects.push(obj);
        }
        let rows = objects
            .into_iter()
            .map(|mut obj| columns.iter().map(|c| obj.remove(c).unwrap_or(Value::Null)).collect())
            .collect();
        Ok(Self { columns, rows })
    }
}
