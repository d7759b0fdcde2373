use funnelscope::analyzers::AnalyzerRegistry;
use funnelscope::pipeline::{self, PipelineInputs, PipelineOpts};
use funnelscope::PipelineError;
use serde_json::{json, Value};
use std::fs;
use std::io::Write;

fn sample() -> PipelineInputs {
    let mut searches = Vec::new();
    let mut views = Vec::new();
    let mut reservations = Vec::new();
    let mut roster = Vec::new();
    for i in 0..60 {
        let user = format!("u{i}");
        let month = 1 + i % 3;
        let day = i % 7;
        let search_type = if i % 2 == 0 { "map" } else { "list" };
        let dma = if i % 4 == 0 { "Denver" } else { "Austin" };
        let channel = if i % 3 == 0 { "seo" } else { "direct" };
        roster.push(json!({"merged_amplitude_id": user, "user_id": format!("t{i}")}));
        searches.push(json!({
            "merged_amplitude_id": user,
            "search_id": format!("s{i}"),
            "event_time": format!("2024-0{month}-1{day} {:02}:00:00", i % 24),
            "count_results": i * 5,
            "search_type": search_type,
            "search_dma": dma,
            "search_sort": "relevance",
            "first_attribution_source": "organic",
            "first_attribution_channel": channel,
            "is_bot": i == 59
        }));
        if i % 2 == 0 {
            views.push(json!({
                "merged_amplitude_id": user,
                "listing_id": format!("l{}", i % 5),
                "search_id": format!("s{i}"),
                "event_time": format!("2024-0{month}-1{day} {:02}:30:00", i % 24),
                "click_dma": "Austin",
                "search_position": i % 25
            }));
        }
        if i % 6 == 0 {
            let approved = (i % 12 == 0).then(|| format!("2024-0{month}-2{day} 12:00:00"));
            let paid = (i % 24 == 0).then(|| format!("2024-0{month}-2{day} 15:00:00"));
            reservations.push(json!({
                "id": format!("r{i}"),
                "renter_user_id": format!("t{i}"),
                "listing_id": format!("l{}", i % 5),
                "created_at": format!("2024-0{month}-2{day} 10:00:00"),
                "approved_at": approved,
                "successful_payment_collected_at": paid
            }));
        }
    }
    PipelineInputs {
        searches: serde_json::from_value(Value::Array(searches)).unwrap(),
        views: serde_json::from_value(Value::Array(views)).unwrap(),
        reservations: serde_json::from_value(Value::Array(reservations)).unwrap(),
        roster: Some(serde_json::from_value(Value::Array(roster)).unwrap()),
        load_reports: Vec::new(),
    }
}

fn serialized_rows(inputs: &PipelineInputs, opts: &PipelineOpts) -> Vec<u8> {
    let out = pipeline::run(inputs, opts).unwrap();
    let mut buf = Vec::new();
    pipeline::write_jsonl(&mut buf, &out.rows).unwrap();
    buf
}

#[test]
fn missing_roster_is_an_error() {
    let mut inputs = sample();
    inputs.roster = None;
    let err = pipeline::run(&inputs, &PipelineOpts::default()).unwrap_err();
    assert!(matches!(err, PipelineError::MissingInput("roster")));
}

#[test]
fn reruns_are_byte_identical() {
    let inputs = sample();
    let opts = PipelineOpts::default();
    let first = serialized_rows(&inputs, &opts);
    let second = serialized_rows(&inputs, &opts);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn parallel_and_sequential_runs_agree() {
    let inputs = sample();
    let parallel = serialized_rows(&inputs, &PipelineOpts::default());
    let sequential = serialized_rows(&inputs, &PipelineOpts { parallel: false, ..PipelineOpts::default() });
    assert_eq!(parallel, sequential);
}

#[test]
fn summary_counts_dropped_rows() {
    let out = pipeline::run(&sample(), &PipelineOpts::default()).unwrap();
    assert_eq!(out.summary.searches.raw, 60);
    assert_eq!(out.summary.searches.clean, 59);
    assert_eq!(out.summary.searches.dropped, 1);
    assert_eq!(out.summary.journeys, 60);
    assert_eq!(out.summary.output_rows, out.rows.len());
    assert_eq!(out.funnel.total_users, 60);
    assert_eq!(out.funnel.total_searchers, 59);
    assert_eq!(out.funnel.total_viewers, 30);
}

#[test]
fn registry_runs_analyzers_in_report_order() {
    assert_eq!(
        AnalyzerRegistry::new().names(),
        vec![
            "search_type",
            "attribution",
            "geography",
            "monthly",
            "hourly",
            "search_term_category",
            "result_count",
            "day_of_week",
            "host_status",
            "search_sort",
            "search_position",
            "non_conversion",
            "listing_conversion",
            "payment",
        ]
    );
}

#[test]
fn rows_follow_analyzer_order() {
    let out = pipeline::run(&sample(), &PipelineOpts::default()).unwrap();
    let order = [
        "FUNNEL_METRICS",
        "SEARCH_TYPE",
        "ATTRIBUTION",
        "GEOGRAPHIC",
        "MONTHLY",
        "HOURLY",
        "SEARCH_TERM_CATEGORY",
        "RESULT_COUNT",
        "DAY_OF_WEEK",
        "HOST_STATUS",
        "SEARCH_SORT",
        "SEARCH_POSITION",
        "NON_CONVERSION",
        "LISTING_CONVERSION",
        "HIGH_VOLUME_LISTING",
        "PAYMENT",
        "PAYMENT_MONTHLY",
    ];
    let rank = |t: &str| order.iter().position(|o| *o == t).unwrap();
    let ranks: Vec<usize> = out.rows.iter().map(|r| rank(r.analysis_type())).collect();
    assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(out.rows[0].analysis_type(), "FUNNEL_METRICS");
    // 15 Denver searchers fall under the default DMA threshold of 50.
    assert!(out.rows.iter().all(|r| r.analysis_type() != "GEOGRAPHIC"));
}

#[test]
fn load_and_dump_round_trip_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, lines: &[Value]| {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
        path
    };
    let searches = write(
        "searches.jsonl",
        &[json!({"merged_amplitude_id": "a", "search_id": "s1", "event_time": "2024-01-01 10:00:00"})],
    );
    let views = write(
        "views.jsonl",
        &[json!({"merged_amplitude_id": "a", "listing_id": "l1", "event_time": "2024-01-01 10:05:00"})],
    );
    let reservations = write("reservations.jsonl", &[]);
    let roster = write("roster.jsonl", &[json!({"merged_amplitude_id": "a"})]);

    let inputs = PipelineInputs::load(&searches, &views, &reservations, Some(roster.as_path()), false).unwrap();
    let out = pipeline::run(&inputs, &PipelineOpts::default()).unwrap();
    assert_eq!(out.funnel.search_to_view_rate, Some(100.0));

    let dump = dir.path().join("dump");
    out.dump(&dump).unwrap();
    let journeys = fs::read_to_string(dump.join("user_journeys.jsonl")).unwrap();
    assert_eq!(journeys.lines().count(), 1);
    let row: Value = serde_json::from_str(journeys.lines().next().unwrap()).unwrap();
    assert_eq!(row["user_id"], json!("a"));
    assert_eq!(row["has_viewed_listing"], json!(true));
    assert_eq!(fs::read_to_string(dump.join("cleaned_reservations.jsonl")).unwrap(), "");
    assert_eq!(fs::read_to_string(dump.join("cleaned_search_events.jsonl")).unwrap().lines().count(), 1);
}
