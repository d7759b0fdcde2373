use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;

use crate::cohorts::{self, DayOfWeekRow, HostStatusRow, NonConversionRow, SearchPositionRow, SearchSortRow};
use crate::journey::UserJourney;
use crate::listings::{self, ListingConversionRow, ListingPerformanceRow};
use crate::normalize::{ListingViewEvent, Reservation, SearchEvent};
use crate::payment::{self, PaymentReport};
use crate::pipeline::PipelineOpts;
use crate::segments::{self, AttributionRow, GeographyRow, ResultCountRow, SearchTermCategoryRow, SearchTypeRow};
use crate::temporal::{self, HourlyRow, MonthlyRow};

/// Common data passed to all analyzers: the cleaned streams, the journey
/// table, and the two lookups most analyzers join through.
#[derive(Debug)]
pub struct AnalysisContext<'a> {
    pub searches: &'a [SearchEvent],
    pub views: &'a [ListingViewEvent],
    pub reservations: &'a [Reservation],
    pub journeys: &'a [UserJourney],
    viewers_by_search: AHashMap<&'a str, AHashSet<&'a str>>,
    journeys_by_user: AHashMap<&'a str, &'a UserJourney>,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(
        searches: &'a [SearchEvent],
        views: &'a [ListingViewEvent],
        reservations: &'a [Reservation],
        journeys: &'a [UserJourney],
    ) -> Self {
        let mut viewers_by_search: AHashMap<&'a str, AHashSet<&'a str>> = AHashMap::new();
        for v in views {
            if let Some(sid) = v.search_id.as_deref() {
                viewers_by_search.entry(sid).or_default().insert(v.user_id.as_str());
            }
        }
        let journeys_by_user = journeys.iter().map(|j| (j.user_id.as_str(), j)).collect();
        Self {
            searches,
            views,
            reservations,
            journeys,
            viewers_by_search,
            journeys_by_user,
        }
    }

    /// Distinct users who viewed a listing reached from this search.
    pub fn viewers_of_search(&self, search_id: &str) -> Option<&AHashSet<&'a str>> {
        self.viewers_by_search.get(search_id)
    }

    pub fn journey(&self, user_id: &str) -> Option<&'a UserJourney> {
        self.journeys_by_user.get(user_id).copied()
    }
}

/// Results from all analyzers combined
#[derive(Debug, Clone, Default)]
pub struct AnalysisResults {
    pub search_type: Vec<SearchTypeRow>,
    pub attribution: Vec<AttributionRow>,
    pub geography: Vec<GeographyRow>,
    pub monthly: Vec<MonthlyRow>,
    pub hourly: Vec<HourlyRow>,
    pub search_term_category: Vec<SearchTermCategoryRow>,
    pub result_count: Vec<ResultCountRow>,
    pub day_of_week: Vec<DayOfWeekRow>,
    pub host_status: Vec<HostStatusRow>,
    pub search_sort: Vec<SearchSortRow>,
    pub search_position: Vec<SearchPositionRow>,
    pub non_conversion: Vec<NonConversionRow>,
    pub listing_conversion: Vec<ListingConversionRow>,
    pub high_volume_listings: Vec<ListingPerformanceRow>,
    pub payment: Option<PaymentReport>,
}

/// Trait that all analyzers must implement
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;
    fn analyze(&self, context: &AnalysisContext<'_>, opts: &PipelineOpts) -> Box<dyn AnalysisResult>;
}

/// Base trait for analysis results
pub trait AnalysisResult: Send {
    fn merge_into(self: Box<Self>, results: &mut AnalysisResults);
}

/// Rows of one segment table plus the slot they land in.
pub struct SegmentResult<T> {
    rows: Vec<T>,
    slot: fn(&mut AnalysisResults) -> &mut Vec<T>,
}

impl<T: Send> AnalysisResult for SegmentResult<T> {
    fn merge_into(self: Box<Self>, results: &mut AnalysisResults) {
        let this = *self;
        (this.slot)(results).extend(this.rows);
    }
}

pub struct SearchTypeAnalyzer;

impl Analyzer for SearchTypeAnalyzer {
    fn name(&self) -> &'static str {
        "search_type"
    }

    fn analyze(&self, context: &AnalysisContext<'_>, _opts: &PipelineOpts) -> Box<dyn AnalysisResult> {
        Box::new(SegmentResult {
            rows: segments::search_type_breakdown(context),
            slot: |r| &mut r.search_type,
        })
    }
}

/// Attribution pairs below `min_attribution_searchers` are dropped here;
/// the presentation limit is applied later by the assembler.
pub struct AttributionAnalyzer;

impl Analyzer for AttributionAnalyzer {
    fn name(&self) -> &'static str {
        "attribution"
    }

    fn analyze(&self, context: &AnalysisContext<'_>, opts: &PipelineOpts) -> Box<dyn AnalysisResult> {
        Box::new(SegmentResult {
            rows: segments::attribution_breakdown(context, opts.min_attribution_searchers),
            slot: |r| &mut r.attribution,
        })
    }
}

pub struct GeographyAnalyzer;

impl Analyzer for GeographyAnalyzer {
    fn name(&self) -> &'static str {
        "geography"
    }

    fn analyze(&self, context: &AnalysisContext<'_>, opts: &PipelineOpts) -> Box<dyn AnalysisResult> {
        Box::new(SegmentResult {
            rows: segments::geography_breakdown(context, opts.min_dma_searchers),
            slot: |r| &mut r.geography,
        })
    }
}

pub struct MonthlyAnalyzer;

impl Analyzer for MonthlyAnalyzer {
    fn name(&self) -> &'static str {
        "monthly"
    }

    fn analyze(&self, context: &AnalysisContext<'_>, _opts: &PipelineOpts) -> Box<dyn AnalysisResult> {
        Box::new(SegmentResult {
            rows: temporal::monthly_correlation(context),
            slot: |r| &mut r.monthly,
        })
    }
}

pub struct HourlyAnalyzer;

impl Analyzer for HourlyAnalyzer {
    fn name(&self) -> &'static str {
        "hourly"
    }

    fn analyze(&self, context: &AnalysisContext<'_>, _opts: &PipelineOpts) -> Box<dyn AnalysisResult> {
        Box::new(SegmentResult {
            rows: temporal::hourly_correlation(context),
            slot: |r| &mut r.hourly,
        })
    }
}

pub struct SearchTermCategoryAnalyzer;

impl Analyzer for SearchTermCategoryAnalyzer {
    fn name(&self) -> &'static str {
        "search_term_category"
    }

    fn analyze(&self, context: &AnalysisContext<'_>, _opts: &PipelineOpts) -> Box<dyn AnalysisResult> {
        Box::new(SegmentResult {
            rows: segments::search_term_category_breakdown(context),
            slot: |r| &mut r.search_term_category,
        })
    }
}

pub struct ResultCountAnalyzer;

impl Analyzer for ResultCountAnalyzer {
    fn name(&self) -> &'static str {
        "result_count"
    }

    fn analyze(&self, context: &AnalysisContext<'_>, _opts: &PipelineOpts) -> Box<dyn AnalysisResult> {
        Box::new(SegmentResult {
            rows: segments::result_count_breakdown(context),
            slot: |r| &mut r.result_count,
        })
    }
}

pub struct DayOfWeekAnalyzer;

impl Analyzer for DayOfWeekAnalyzer {
    fn name(&self) -> &'static str {
        "day_of_week"
    }

    fn analyze(&self, context: &AnalysisContext<'_>, _opts: &PipelineOpts) -> Box<dyn AnalysisResult> {
        Box::new(SegmentResult {
            rows: cohorts::day_of_week_breakdown(context),
            slot: |r| &mut r.day_of_week,
        })
    }
}

pub struct HostStatusAnalyzer;

impl Analyzer for HostStatusAnalyzer {
    fn name(&self) -> &'static str {
        "host_status"
    }

    fn analyze(&self, context: &AnalysisContext<'_>, _opts: &PipelineOpts) -> Box<dyn AnalysisResult> {
        Box::new(SegmentResult {
            rows: cohorts::host_status_breakdown(context),
            slot: |r| &mut r.host_status,
        })
    }
}

pub struct SearchSortAnalyzer;

impl Analyzer for SearchSortAnalyzer {
    fn name(&self) -> &'static str {
        "search_sort"
    }

    fn analyze(&self, context: &AnalysisContext<'_>, _opts: &PipelineOpts) -> Box<dyn AnalysisResult> {
        Box::new(SegmentResult {
            rows: cohorts::search_sort_breakdown(context),
            slot: |r| &mut r.search_sort,
        })
    }
}

pub struct SearchPositionAnalyzer;

impl Analyzer for SearchPositionAnalyzer {
    fn name(&self) -> &'static str {
        "search_position"
    }

    fn analyze(&self, context: &AnalysisContext<'_>, _opts: &PipelineOpts) -> Box<dyn AnalysisResult> {
        Box::new(SegmentResult {
            rows: cohorts::search_position_breakdown(context),
            slot: |r| &mut r.search_position,
        })
    }
}

pub struct NonConversionAnalyzer;

impl Analyzer for NonConversionAnalyzer {
    fn name(&self) -> &'static str {
        "non_conversion"
    }

    fn analyze(&self, context: &AnalysisContext<'_>, opts: &PipelineOpts) -> Box<dyn AnalysisResult> {
        Box::new(SegmentResult {
            rows: cohorts::non_conversion_breakdown(context, opts.min_non_conversion_searchers),
            slot: |r| &mut r.non_conversion,
        })
    }
}

/// Per-category listing conversion plus the high-volume listing table.
pub struct ListingConversionAnalyzer;

pub struct ListingResult {
    conversion: Vec<ListingConversionRow>,
    high_volume: Vec<ListingPerformanceRow>,
}

impl AnalysisResult for ListingResult {
    fn merge_into(self: Box<Self>, results: &mut AnalysisResults) {
        let this = *self;
        results.listing_conversion.extend(this.conversion);
        results.high_volume_listings.extend(this.high_volume);
    }
}

impl Analyzer for ListingConversionAnalyzer {
    fn name(&self) -> &'static str {
        "listing_conversion"
    }

    fn analyze(&self, context: &AnalysisContext<'_>, opts: &PipelineOpts) -> Box<dyn AnalysisResult> {
        Box::new(ListingResult {
            conversion: listings::listing_conversion_breakdown(context, opts.min_listing_views),
            high_volume: listings::high_volume_listings(context, opts.min_high_volume_views),
        })
    }
}

/// Payment outcomes only look at reservations.
pub struct PaymentAnalyzer;

impl Analyzer for PaymentAnalyzer {
    fn name(&self) -> &'static str {
        "payment"
    }

    fn analyze(&self, context: &AnalysisContext<'_>, _opts: &PipelineOpts) -> Box<dyn AnalysisResult> {
        Box::new(PaymentResult {
            report: payment::analyze(context.reservations),
        })
    }
}

pub struct PaymentResult {
    report: PaymentReport,
}

impl AnalysisResult for PaymentResult {
    fn merge_into(self: Box<Self>, results: &mut AnalysisResults) {
        results.payment = Some(self.report);
    }
}

/// Main analyzer registry that manages all analyzers
pub struct AnalyzerRegistry {
    analyzers: Vec<Box<dyn Analyzer>>,
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self {
            analyzers: vec![
                Box::new(SearchTypeAnalyzer),
                Box::new(AttributionAnalyzer),
                Box::new(GeographyAnalyzer),
                Box::new(MonthlyAnalyzer),
                Box::new(HourlyAnalyzer),
                Box::new(SearchTermCategoryAnalyzer),
                Box::new(ResultCountAnalyzer),
                Box::new(DayOfWeekAnalyzer),
                Box::new(HostStatusAnalyzer),
                Box::new(SearchSortAnalyzer),
                Box::new(SearchPositionAnalyzer),
                Box::new(NonConversionAnalyzer),
                Box::new(ListingConversionAnalyzer),
                Box::new(PaymentAnalyzer),
            ],
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.analyzers.iter().map(|a| a.name()).collect()
    }

    /// Runs every analyzer, in parallel when `opts.parallel` is set. Results
    /// are merged in registry order either way.
    pub fn analyze(&self, context: &AnalysisContext<'_>, opts: &PipelineOpts) -> AnalysisResults {
        let run = |analyzer: &Box<dyn Analyzer>| {
            tracing::debug!(analyzer = analyzer.name(), "running analyzer");
            analyzer.analyze(context, opts)
        };
        let partials: Vec<Box<dyn AnalysisResult>> = if opts.parallel {
            self.analyzers.par_iter().map(run).collect()
        } else {
            self.analyzers.iter().map(run).collect()
        };

        let mut results = AnalysisResults::default();
        for partial in partials {
            partial.merge_into(&mut results);
        }
        results
    }
}
