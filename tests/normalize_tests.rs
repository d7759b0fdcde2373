use chrono::{NaiveDate, Weekday};
use funnelscope::normalize::{self, PositionCategory, ReservationStatus, ResultCountCategory};
use funnelscope::parser::{RawListingView, RawReservation, RawSearchEvent};
use serde_json::json;

fn search(v: serde_json::Value) -> RawSearchEvent {
    serde_json::from_value(v).unwrap()
}

#[test]
fn result_count_buckets_are_boundary_exact() {
    let cases = [
        (0, "No Results"),
        (1, "1-10 Results"),
        (10, "1-10 Results"),
        (11, "11-50 Results"),
        (50, "11-50 Results"),
        (51, "51-100 Results"),
        (100, "51-100 Results"),
        (101, "101-200 Results"),
        (200, "101-200 Results"),
        (201, "200+ Results"),
        (100_000, "200+ Results"),
    ];
    for (count, label) in cases {
        let cat = ResultCountCategory::from_count(count).unwrap();
        assert_eq!(cat.label(), label, "count {count}");
        assert_eq!(serde_json::to_value(cat).unwrap(), json!(label));
    }
    assert_eq!(ResultCountCategory::from_count(-1), None);
}

#[test]
fn result_count_buckets_sort_in_rank_order() {
    let mut v: Vec<ResultCountCategory> = [0, 500, 150, 7, 80, 30]
        .into_iter()
        .filter_map(ResultCountCategory::from_count)
        .collect();
    v.sort();
    let labels: Vec<&str> = v.iter().map(|c| c.label()).collect();
    assert_eq!(
        labels,
        ["No Results", "1-10 Results", "11-50 Results", "51-100 Results", "101-200 Results", "200+ Results"]
    );
}

#[test]
fn position_categories() {
    assert_eq!(PositionCategory::from_position(Some(1)), PositionCategory::Top5);
    assert_eq!(PositionCategory::from_position(Some(5)), PositionCategory::Top5);
    assert_eq!(PositionCategory::from_position(Some(6)), PositionCategory::From6To10);
    assert_eq!(PositionCategory::from_position(Some(11)), PositionCategory::From11To20);
    assert_eq!(PositionCategory::from_position(Some(20)), PositionCategory::From11To20);
    assert_eq!(PositionCategory::from_position(Some(21)), PositionCategory::Beyond20);
    assert_eq!(PositionCategory::from_position(Some(0)), PositionCategory::Beyond20);
    assert_eq!(PositionCategory::from_position(None), PositionCategory::Beyond20);
    assert_eq!(PositionCategory::Top5.to_string(), "Top 5");
}

#[test]
fn reservation_status_from_timestamps() {
    let t = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
    assert_eq!(ReservationStatus::derive(Some(t), Some(t)), ReservationStatus::Completed);
    assert_eq!(ReservationStatus::derive(None, Some(t)), ReservationStatus::Completed);
    assert_eq!(ReservationStatus::derive(Some(t), None), ReservationStatus::PendingPayment);
    assert_eq!(ReservationStatus::derive(None, None), ReservationStatus::PendingApproval);
}

#[test]
fn session_key_is_user_and_day() {
    let d = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
    assert_eq!(normalize::session_key("u_1", d), "u_1_2024-03-07");
}

#[test]
fn search_derives_hour_weekday_and_bucket() {
    let s = normalize::normalize_search(&search(json!({
        "merged_amplitude_id": 42,
        "search_id": "s1",
        "event_time": "2024-03-07 23:15:00",
        "count_results": "15",
        "is_bot": "False",
        "is_host": 1,
        "search_dma": "Denver"
    })))
    .unwrap();
    assert_eq!(s.user_id, "42");
    assert_eq!(s.search_hour, 23);
    assert_eq!(s.month, 3);
    assert_eq!(s.day_of_week, Weekday::Thu);
    assert_eq!(s.result_count_category, Some(ResultCountCategory::UpTo50));
    assert_eq!(s.search_session_id, "42_2024-03-07");
    assert!(s.is_host);
    assert!(!s.is_neighbor);
}

#[test]
fn hour_uses_recorded_wall_clock() {
    let s = normalize::normalize_search(&search(json!({
        "merged_amplitude_id": "u",
        "search_id": "s",
        "event_time": "2024-03-07T23:15:00-07:00"
    })))
    .unwrap();
    assert_eq!(s.search_hour, 23);
    assert_eq!(s.search_session_id, "u_2024-03-07");
}

#[test]
fn invalid_searches_are_dropped() {
    let raws = vec![
        search(json!({"merged_amplitude_id": "u", "search_id": "s1", "event_time": "2024-01-01 00:00:00"})),
        search(json!({"merged_amplitude_id": "u", "search_id": "s2", "event_time": "2024-01-01 00:00:00", "is_bot": true})),
        search(json!({"search_id": "s3", "event_time": "2024-01-01 00:00:00"})),
        search(json!({"merged_amplitude_id": "u", "event_time": "2024-01-01 00:00:00"})),
        search(json!({"merged_amplitude_id": "u", "search_id": "s5"})),
        search(json!({"merged_amplitude_id": "u", "search_id": "s6", "event_time": "not a time"})),
    ];
    let cleaned = normalize::clean_searches(&raws);
    assert_eq!(cleaned.rows.len(), 1);
    assert_eq!(cleaned.dropped, 5);
    assert_eq!(cleaned.rows[0].search_id, "s1");
}

#[test]
fn missing_result_count_has_no_bucket() {
    let s = normalize::normalize_search(&search(json!({
        "merged_amplitude_id": "u",
        "search_id": "s",
        "event_time": "2024-01-01 00:00:00",
        "count_results": "nan"
    })))
    .unwrap();
    assert_eq!(s.result_count, None);
    assert_eq!(s.result_count_category, None);
}

#[test]
fn views_need_user_listing_and_time() {
    let raws: Vec<RawListingView> = vec![
        serde_json::from_value(json!({"merged_amplitude_id": "u", "listing_id": "l1", "event_time": "2024-01-01 08:00:00", "search_position": 7})).unwrap(),
        serde_json::from_value(json!({"merged_amplitude_id": "u", "event_time": "2024-01-01 08:00:00"})).unwrap(),
        serde_json::from_value(json!({"merged_amplitude_id": "u", "listing_id": "l1", "event_time": "2024-01-01 08:00:00", "is_bot": 1})).unwrap(),
    ];
    let cleaned = normalize::clean_views(&raws);
    assert_eq!(cleaned.rows.len(), 1);
    assert_eq!(cleaned.dropped, 2);
    let v = &cleaned.rows[0];
    assert_eq!(v.view_hour, 8);
    assert_eq!(v.position_category, PositionCategory::From6To10);
    assert_eq!(v.search_id, None);
}

#[test]
fn reservation_durations_and_status() {
    let raw: RawReservation = serde_json::from_value(json!({
        "id": 9,
        "renter_user_id": "r1",
        "listing_id": "l1",
        "created_at": "2024-06-01 10:00:00",
        "approved_at": "2024-06-01 11:30:00",
        "successful_payment_collected_at": null
    }))
    .unwrap();
    let r = normalize::normalize_reservation(&raw).unwrap();
    assert_eq!(r.reservation_id, "9");
    assert_eq!(r.reservation_status, ReservationStatus::PendingPayment);
    assert_eq!(r.hours_to_approval, Some(1.5));
    assert_eq!(r.hours_to_payment, None);
    assert_eq!(r.reservation_month, 6);
    assert_eq!(r.reservation_hour, 10);
    assert!(!r.is_paid());
}

#[test]
fn reservation_durations_keep_sub_second_precision() {
    let raws: Vec<RawReservation> = serde_json::from_value(json!([{
        "id": "r1",
        "renter_user_id": "t1",
        "listing_id": "l1",
        "created_at": "2024-01-01 10:00:00.900+00",
        "approved_at": "2024-01-01 10:00:01.800+00"
    }]))
    .unwrap();
    let cleaned = normalize::clean_reservations(&raws);
    assert_eq!(cleaned.dropped, 0);
    let hours = cleaned.rows[0].hours_to_approval.unwrap();
    assert!((hours - 0.9 / 3600.0).abs() < 1e-12, "{hours}");
}

#[test]
fn reservation_without_created_at_is_dropped() {
    let raw: RawReservation =
        serde_json::from_value(json!({"renter_user_id": "r1", "listing_id": "l1"})).unwrap();
    assert!(normalize::normalize_reservation(&raw).is_none());
}
