//! End-to-end batch run: load, normalize, join, aggregate, assemble.

use crate::analyzers::{AnalysisContext, AnalysisResults, AnalyzerRegistry};
use crate::error::{PipelineError, Result};
use crate::funnel::{self, FunnelMetrics};
use crate::journey::{self, UserJourney};
use crate::normalize::{self, Cleaned, ListingViewEvent, Reservation, SearchEvent};
use crate::output::{self, AnalysisRow};
use crate::parser::{self, LoadReport, RawListingView, RawReservation, RawSearchEvent, RosterEntry};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Thresholds and switches for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOpts {
    /// Attribution pairs need at least this many distinct searchers.
    pub min_attribution_searchers: usize,
    /// DMAs need at least this many distinct searchers.
    pub min_dma_searchers: usize,
    /// Non-conversion categories need at least this many distinct searchers.
    pub min_non_conversion_searchers: usize,
    /// Listing-conversion categories need at least this many views.
    pub min_listing_views: usize,
    /// A listing with at least this many views is high volume.
    pub min_high_volume_views: usize,
    /// Presentation limit for the attribution, geography and high-volume
    /// listing tables.
    pub top_rows: usize,
    pub parallel: bool,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            min_attribution_searchers: 10,
            min_dma_searchers: 50,
            min_non_conversion_searchers: 50,
            min_listing_views: 50,
            min_high_volume_views: 100,
            top_rows: 10,
            parallel: true,
        }
    }
}

/// Raw inputs for one run. The roster is optional only so that its absence
/// can be reported as an error by [`run`].
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub searches: Vec<RawSearchEvent>,
    pub views: Vec<RawListingView>,
    pub reservations: Vec<RawReservation>,
    pub roster: Option<Vec<RosterEntry>>,
    pub load_reports: Vec<(String, LoadReport)>,
}

impl PipelineInputs {
    /// Load the four JSON Lines files. A roster path of `None` leaves the
    /// roster unset.
    pub fn load(
        searches: &Path,
        views: &Path,
        reservations: &Path,
        roster: Option<&Path>,
        fail_fast: bool,
    ) -> Result<Self> {
        let (searches_raw, s_report) = parser::read_records(searches, fail_fast)?;
        let (views_raw, v_report) = parser::read_records(views, fail_fast)?;
        let (reservations_raw, r_report) = parser::read_records(reservations, fail_fast)?;
        let mut load_reports = vec![
            ("searches".to_string(), s_report),
            ("views".to_string(), v_report),
            ("reservations".to_string(), r_report),
        ];
        let roster = match roster {
            Some(path) => {
                let (rows, report) = parser::read_records(path, fail_fast)?;
                load_reports.push(("roster".to_string(), report));
                Some(rows)
            }
            None => None,
        };
        for (name, report) in &load_reports {
            tracing::info!(input = %name, records = report.records, malformed = report.malformed, "loaded input");
        }
        Ok(Self {
            searches: searches_raw,
            views: views_raw,
            reservations: reservations_raw,
            roster,
            load_reports,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamCounts {
    pub raw: usize,
    pub clean: usize,
    pub dropped: usize,
}

impl<T> From<(&Cleaned<T>, usize)> for StreamCounts {
    fn from((cleaned, raw): (&Cleaned<T>, usize)) -> Self {
        Self { raw, clean: cleaned.rows.len(), dropped: cleaned.dropped }
    }
}

/// What a run consumed, discarded and produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub searches: StreamCounts,
    pub views: StreamCounts,
    pub reservations: StreamCounts,
    pub roster_rows: usize,
    pub journeys: usize,
    pub malformed_lines: usize,
    pub output_rows: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub summary: RunSummary,
    pub searches: Vec<SearchEvent>,
    pub views: Vec<ListingViewEvent>,
    pub reservations: Vec<Reservation>,
    pub journeys: Vec<UserJourney>,
    pub funnel: FunnelMetrics,
    pub results: AnalysisResults,
    pub rows: Vec<AnalysisRow>,
}

pub fn run(inputs: &PipelineInputs, opts: &PipelineOpts) -> Result<PipelineOutput> {
    let roster = inputs.roster.as_deref().ok_or(PipelineError::MissingInput("roster"))?;

    let (searches, (views, reservations)) = if opts.parallel {
        rayon::join(
            || normalize::clean_searches(&inputs.searches),
            || {
                rayon::join(
                    || normalize::clean_views(&inputs.views),
                    || normalize::clean_reservations(&inputs.reservations),
                )
            },
        )
    } else {
        (
            normalize::clean_searches(&inputs.searches),
            (normalize::clean_views(&inputs.views), normalize::clean_reservations(&inputs.reservations)),
        )
    };
    tracing::info!(
        searches = searches.rows.len(),
        views = views.rows.len(),
        reservations = reservations.rows.len(),
        "normalized streams"
    );
    tracing::debug!(
        searches = searches.dropped,
        views = views.dropped,
        reservations = reservations.dropped,
        "dropped rows"
    );

    let journeys = journey::build_journeys(roster, &searches.rows, &views.rows, &reservations.rows);
    tracing::info!(users = journeys.len(), "built journeys");

    let funnel = funnel::aggregate(&journeys);
    let context = AnalysisContext::new(&searches.rows, &views.rows, &reservations.rows, &journeys);
    let results = AnalyzerRegistry::new().analyze(&context, opts);
    let rows = output::assemble(&funnel, &results, opts);
    tracing::info!(rows = rows.len(), "assembled output");

    let summary = RunSummary {
        searches: (&searches, inputs.searches.len()).into(),
        views: (&views, inputs.views.len()).into(),
        reservations: (&reservations, inputs.reservations.len()).into(),
        roster_rows: roster.len(),
        journeys: journeys.len(),
        malformed_lines: inputs.load_reports.iter().map(|(_, r)| r.malformed).sum(),
        output_rows: rows.len(),
    };

    Ok(PipelineOutput {
        summary,
        searches: searches.rows,
        views: views.rows,
        reservations: reservations.rows,
        journeys,
        funnel,
        results,
        rows,
    })
}

/// Write one JSON document per line.
pub fn write_jsonl<T: Serialize, W: Write>(mut w: W, items: &[T]) -> Result<()> {
    for item in items {
        serde_json::to_writer(&mut w, item)?;
        w.write_all(b"\n").map_err(|source| PipelineError::Io { path: "<writer>".into(), source })?;
    }
    w.flush().map_err(|source| PipelineError::Io { path: "<writer>".into(), source })
}

fn dump_file<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let f = File::create(path).map_err(|source| PipelineError::Io { path: path.to_path_buf(), source })?;
    write_jsonl(BufWriter::new(f), items)
}

impl PipelineOutput {
    /// Persist the cleaned intermediate datasets and the journey table.
    pub fn dump(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|source| PipelineError::Io { path: dir.to_path_buf(), source })?;
        dump_file(&dir.join("cleaned_search_events.jsonl"), &self.searches)?;
        dump_file(&dir.join("cleaned_listing_views.jsonl"), &self.views)?;
        dump_file(&dir.join("cleaned_reservations.jsonl"), &self.reservations)?;
        dump_file(&dir.join("user_journeys.jsonl"), &self.journeys)?;
        tracing::info!(dir = %dir.display(), "wrote intermediate datasets");
        Ok(())
    }
}
