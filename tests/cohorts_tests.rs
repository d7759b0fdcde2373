use funnelscope::analyzers::AnalysisContext;
use funnelscope::cohorts;
use funnelscope::normalize::PositionCategory;
use funnelscope::pipeline::{self, PipelineInputs, PipelineOpts, PipelineOutput};
use serde_json::{json, Value};

fn run(searches: Value, views: Value, reservations: Value, roster: Value) -> PipelineOutput {
    let inp = PipelineInputs {
        searches: serde_json::from_value(searches).unwrap(),
        views: serde_json::from_value(views).unwrap(),
        reservations: serde_json::from_value(reservations).unwrap(),
        roster: Some(serde_json::from_value(roster).unwrap()),
        load_reports: Vec::new(),
    };
    pipeline::run(&inp, &PipelineOpts::default()).unwrap()
}

// "a" searches on a Monday and converts; "b" searches on Monday and Sunday and
// only views; "h" is a host searching on Sunday.
fn fixture() -> PipelineOutput {
    run(
        json!([
            {"merged_amplitude_id": "a", "search_id": "s1", "event_time": "2024-04-01 09:00:00", "search_sort": "price", "count_results": 10},
            {"merged_amplitude_id": "b", "search_id": "s2", "event_time": "2024-04-01 10:00:00", "search_sort": "price", "count_results": 30},
            {"merged_amplitude_id": "b", "search_id": "s3", "event_time": "2024-04-07 10:00:00", "search_sort": "distance"},
            {"merged_amplitude_id": "h", "search_id": "s4", "event_time": "2024-04-07 11:00:00", "is_host": "True"},
            {"merged_amplitude_id": "ghost", "search_id": "s5", "event_time": "2024-04-07 11:00:00"}
        ]),
        json!([
            {"merged_amplitude_id": "a", "listing_id": "l1", "event_time": "2024-04-01 09:10:00", "search_position": 3},
            {"merged_amplitude_id": "b", "listing_id": "l2", "event_time": "2024-04-01 10:10:00", "search_position": 3},
            {"merged_amplitude_id": "b", "listing_id": "l3", "event_time": "2024-04-01 10:11:00", "search_position": 40}
        ]),
        json!([
            {"renter_user_id": "ta", "listing_id": "l1", "created_at": "2024-04-02 10:00:00"}
        ]),
        json!([
            {"merged_amplitude_id": "a", "user_id": "ta"},
            {"merged_amplitude_id": "b"},
            {"merged_amplitude_id": "h"}
        ]),
    )
}

#[test]
fn day_of_week_rows_in_calendar_order() {
    let out = fixture();
    let days: Vec<&str> = out.results.day_of_week.iter().map(|r| r.day_of_week.as_str()).collect();
    assert_eq!(days, vec!["Monday", "Sunday"]);

    let monday = &out.results.day_of_week[0];
    assert_eq!(monday.total_searchers, 2);
    assert_eq!(monday.funnel_users, 1);
    assert_eq!(monday.conversion_rate, Some(50.0));

    // "ghost" is not on the roster, so it is a searcher but never a funnel user.
    let sunday = &out.results.day_of_week[1];
    assert_eq!(sunday.total_searchers, 3);
    assert_eq!(sunday.funnel_users, 0);
}

#[test]
fn host_status_splits_searchers() {
    let out = fixture();
    let rows = &out.results.host_status;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].user_type, "Non-Hosts");
    assert_eq!(rows[0].total_searchers, 3);
    assert_eq!(rows[0].funnel_users, 1);
    assert_eq!(rows[0].conversion_rate, Some(33.33));
    assert_eq!(rows[1].user_type, "Hosts");
    assert_eq!(rows[1].total_searchers, 1);
    assert_eq!(rows[1].conversion_rate, Some(0.0));
}

#[test]
fn search_sort_counts_viewing_users() {
    let out = fixture();
    let rows = &out.results.search_sort;
    assert_eq!(rows.len(), 2);
    // both sorts convert at 100%, so key order decides
    assert_eq!(rows[0].search_sort, "distance");
    assert_eq!(rows[0].total_users, 1);
    assert_eq!(rows[0].avg_results_per_search, None);

    let price = &rows[1];
    assert_eq!(price.search_sort, "price");
    assert_eq!(price.total_users, 2);
    assert_eq!(price.converting_users, 2);
    assert_eq!(price.total_searches, 2);
    assert_eq!(price.avg_searches_per_user, Some(1.0));
    assert_eq!(price.avg_results_per_search, Some(20.0));
    assert_eq!(price.conversion_rate, Some(100.0));
}

#[test]
fn search_position_rows_in_rank_order() {
    let out = fixture();
    let rows = &out.results.search_position;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].position_category, PositionCategory::Top5);
    assert_eq!(rows[0].unique_viewers, 2);
    assert_eq!(rows[0].total_views, 2);
    assert_eq!(rows[0].converting_viewers, 1);
    assert_eq!(rows[0].conversion_rate, Some(50.0));
    assert_eq!(rows[1].position_category, PositionCategory::Beyond20);
    assert_eq!(rows[1].unique_viewers, 1);
    assert_eq!(rows[1].converting_viewers, 0);
}

#[test]
fn non_conversion_counts_searchers_short_of_a_reservation() {
    let out = fixture();
    let ctx = AnalysisContext::new(&out.searches, &out.views, &out.reservations, &out.journeys);

    let rows = cohorts::non_conversion_breakdown(&ctx, 1);
    let sorts: Vec<(&str, usize, Option<f64>)> = rows
        .iter()
        .filter(|r| r.dimension == "search_sort")
        .map(|r| (r.category.as_str(), r.total_searchers, r.non_conversion_rate))
        .collect();
    assert_eq!(sorts, vec![("distance", 1, Some(100.0)), ("price", 2, Some(50.0))]);

    let hosts: Vec<(&str, usize)> = rows
        .iter()
        .filter(|r| r.dimension == "host_status")
        .map(|r| (r.category.as_str(), r.non_converting_users))
        .collect();
    // "ghost" has no journey and counts as non-converting
    assert_eq!(hosts, vec![("Hosts", 1), ("Non-Hosts", 2)]);

    let supported = cohorts::non_conversion_breakdown(&ctx, 3);
    let kept: Vec<(&str, &str)> = supported.iter().map(|r| (r.dimension, r.category.as_str())).collect();
    assert_eq!(
        kept,
        vec![
            ("host_status", "Non-Hosts"),
            ("month", "4"),
            ("day_of_week", "Sunday"),
            ("time_of_day", "Morning (6-12)"),
        ]
    );
    assert_eq!(supported[1].non_conversion_rate, Some(75.0));
}
