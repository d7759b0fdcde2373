use anyhow::{bail, Context};
use clap::Parser;
use funnelscope::output::{AnalysisRow, UniformTable};
use funnelscope::pipeline::{self, PipelineInputs, PipelineOpts};
use itertools::Itertools;
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

fn init_parallelism() {
    static START: Once = Once::new();
    START.call_once(|| {
        let n = num_cpus::get();
        let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
    });
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();
}

#[derive(Parser, Debug)]
#[command(name = "funnelscope", version, about = "Marketplace conversion funnel analysis")]
struct Cli {
    /// Search events (JSON Lines)
    #[arg(long = "searches")]
    searches: PathBuf,
    /// Listing view events (JSON Lines)
    #[arg(long = "views")]
    views: PathBuf,
    /// Reservations (JSON Lines)
    #[arg(long = "reservations")]
    reservations: PathBuf,
    /// User roster (JSON Lines); the run fails without it
    #[arg(long = "roster")]
    roster: Option<PathBuf>,

    /// Output format: json | jsonl | table (default: table on a terminal, jsonl otherwise)
    #[arg(long = "format")]
    format: Option<String>,
    /// Print only a specific section: rows | funnel | journeys | summary
    #[arg(long = "only", default_value = "rows")]
    only: String,

    #[arg(long = "min-attribution-searchers", default_value_t = 10)] min_attribution_searchers: usize,
    #[arg(long = "min-dma-searchers", default_value_t = 50)] min_dma_searchers: usize,
    #[arg(long = "min-non-conversion-searchers", default_value_t = 50)] min_non_conversion_searchers: usize,
    #[arg(long = "min-listing-views", default_value_t = 50)] min_listing_views: usize,
    #[arg(long = "min-high-volume-views", default_value_t = 100)] min_high_volume_views: usize,
    /// Rows kept in the attribution, geography and high-volume listing tables
    #[arg(long = "top", default_value_t = 10)] top: usize,

    /// Write cleaned datasets and the journey table into this directory
    #[arg(long = "dump-dir")]
    dump_dir: Option<PathBuf>,
    /// Fail fast on malformed input lines
    #[arg(long = "fail-fast", default_value_t = false)] fail_fast: bool,
    /// Run analyzers one after another
    #[arg(long = "sequential", default_value_t = false)] sequential: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Jsonl,
    Table,
}

fn resolve_format(requested: Option<&str>) -> anyhow::Result<Format> {
    Ok(match requested {
        Some("json") => Format::Json,
        Some("jsonl") => Format::Jsonl,
        Some("table") => Format::Table,
        Some(other) => bail!("unknown format '{other}' (expected json, jsonl or table)"),
        None if atty::is(atty::Stream::Stdout) => Format::Table,
        None => Format::Jsonl,
    })
}

fn main() -> anyhow::Result<()> {
    init_logging();
    init_parallelism();
    let cli = Cli::parse();
    let format = resolve_format(cli.format.as_deref())?;

    let opts = PipelineOpts {
        min_attribution_searchers: cli.min_attribution_searchers,
        min_dma_searchers: cli.min_dma_searchers,
        min_non_conversion_searchers: cli.min_non_conversion_searchers,
        min_listing_views: cli.min_listing_views,
        min_high_volume_views: cli.min_high_volume_views,
        top_rows: cli.top,
        parallel: !cli.sequential,
    };
    let inputs = PipelineInputs::load(
        &cli.searches,
        &cli.views,
        &cli.reservations,
        cli.roster.as_deref(),
        cli.fail_fast,
    )
    .context("loading inputs")?;
    let out = pipeline::run(&inputs, &opts)?;

    if let Some(dir) = &cli.dump_dir {
        out.dump(dir).with_context(|| format!("writing datasets to {}", dir.display()))?;
    }

    let stdout = io::stdout();
    let mut w = stdout.lock();
    match cli.only.as_str() {
        "rows" => match format {
            Format::Table => print_rows_table(&mut w, &out.rows)?,
            _ => emit(&mut w, format, &out.rows)?,
        },
        "funnel" => {
            let rows = vec![AnalysisRow::FunnelMetrics(out.funnel.clone())];
            match format {
                Format::Table => print_rows_table(&mut w, &rows)?,
                _ => emit(&mut w, format, &rows)?,
            }
        }
        "journeys" => match format {
            Format::Table => {
                let values = out.journeys.iter().map(serde_json::to_value).collect::<Result<Vec<_>, _>>()?;
                print_table(&mut w, &values)?;
            }
            _ => emit(&mut w, format, &out.journeys)?,
        },
        "summary" => match format {
            Format::Table => print_summary(&mut w, &serde_json::to_value(&out.summary)?, "")?,
            _ => emit(&mut w, format, std::slice::from_ref(&out.summary))?,
        },
        other => bail!("unknown section '{other}' (expected rows, funnel, journeys or summary)"),
    }
    w.flush()?;
    Ok(())
}

fn emit<T: Serialize>(w: &mut impl Write, format: Format, items: &[T]) -> anyhow::Result<()> {
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut *w, items)?;
            writeln!(w)?;
        }
        _ => pipeline::write_jsonl(&mut *w, items)?,
    }
    Ok(())
}

fn cell(v: &Value) -> String {
    match v {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One block per analysis type, each with its own columns.
fn print_rows_table(w: &mut impl Write, rows: &[AnalysisRow]) -> anyhow::Result<()> {
    for (kind, group) in &rows.iter().chunk_by(|r| r.analysis_type()) {
        let group: Vec<AnalysisRow> = group.cloned().collect();
        let table = UniformTable::from_rows(&group)?;
        writeln!(w, "\n# {kind}")?;
        // The tag column repeats the heading.
        write_aligned(w, &table.columns[1..], table.rows.iter().map(|r| r[1..].iter().map(cell).collect()))?;
    }
    Ok(())
}

fn print_table(w: &mut impl Write, values: &[Value]) -> anyhow::Result<()> {
    let mut columns: Vec<String> = Vec::new();
    for v in values {
        if let Value::Object(obj) = v {
            for k in obj.keys() {
                if !columns.contains(k) {
                    columns.push(k.clone());
                }
            }
        }
    }
    let rows = values
        .iter()
        .map(|v| columns.iter().map(|c| cell(v.get(c).unwrap_or(&Value::Null))).collect());
    write_aligned(w, &columns, rows)
}

fn write_aligned(w: &mut impl Write, columns: &[String], rows: impl Iterator<Item = Vec<String>>) -> anyhow::Result<()> {
    let rows: Vec<Vec<String>> = rows.collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| rows.iter().map(|r| r[i].len()).chain(std::iter::once(c.len())).max().unwrap_or(0))
        .collect();
    let line = |cells: &[String]| cells.iter().zip(&widths).map(|(c, &n)| format!("{c:<n$}")).join("  ");
    writeln!(w, "{}", line(columns).trim_end())?;
    for r in &rows {
        writeln!(w, "{}", line(r.as_slice()).trim_end())?;
    }
    Ok(())
}

fn print_summary(w: &mut impl Write, v: &Value, prefix: &str) -> anyhow::Result<()> {
    match v {
        Value::Object(obj) => {
            for (k, child) in obj {
                let key = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
                print_summary(w, child, &key)?;
            }
        }
        leaf => writeln!(w, "{:<28} {}", prefix, cell(leaf))?,
    }
    Ok(())
}
