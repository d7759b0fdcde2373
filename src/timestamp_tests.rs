#[cfg(test)]
mod timestamp_parsing_tests {
    use crate::parser::{self, value_to_flag, value_to_int, value_to_text};
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::json;

    struct TimestampTestCase {
        input: &'static str,
        expected: Option<(i32, u32, u32, u32, u32, u32, u32)>,
        description: &'static str,
    }

    const TEST_CASES: &[TimestampTestCase] = &[
        TimestampTestCase {
            input: "2025-08-07T06:41:18.123456Z",
            expected: Some((2025, 8, 7, 6, 41, 18, 123_456_000)),
            description: "RFC 3339 with microseconds and Z",
        },
        TimestampTestCase {
            input: "2025-01-01T12:00:00+05:30",
            expected: Some((2025, 1, 1, 12, 0, 0, 0)),
            description: "offset is kept as recorded wall clock",
        },
        TimestampTestCase {
            input: "2024-12-09 14:30:45.999-0800",
            expected: Some((2024, 12, 9, 14, 30, 45, 999_000_000)),
            description: "space separated with compact offset",
        },
        TimestampTestCase {
            input: "2024-01-01 10:00:00+00",
            expected: Some((2024, 1, 1, 10, 0, 0, 0)),
            description: "hour-only offset from a database export",
        },
        TimestampTestCase {
            input: "2024-01-01T10:00:00.25-05",
            expected: Some((2024, 1, 1, 10, 0, 0, 250_000_000)),
            description: "hour-only negative offset with fraction",
        },
        TimestampTestCase {
            input: "2024-03-05 07:08:09",
            expected: Some((2024, 3, 5, 7, 8, 9, 0)),
            description: "naive warehouse export",
        },
        TimestampTestCase {
            input: "2024/03/05 07:08:09",
            expected: Some((2024, 3, 5, 7, 8, 9, 0)),
            description: "slash separated date",
        },
        TimestampTestCase {
            input: "2024-03-05",
            expected: Some((2024, 3, 5, 0, 0, 0, 0)),
            description: "bare date is midnight",
        },
        TimestampTestCase {
            input: "1700000000",
            expected: Some((2023, 11, 14, 22, 13, 20, 0)),
            description: "epoch seconds",
        },
        TimestampTestCase {
            input: "1700000000123",
            expected: Some((2023, 11, 14, 22, 13, 20, 123_000_000)),
            description: "epoch milliseconds",
        },
        TimestampTestCase {
            input: "12345",
            expected: None,
            description: "short number is not a timestamp",
        },
        TimestampTestCase {
            input: "yesterday",
            expected: None,
            description: "free text",
        },
    ];

    fn at(parts: (i32, u32, u32, u32, u32, u32, u32)) -> NaiveDateTime {
        let (y, mo, d, h, mi, s, n) = parts;
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_nano_opt(h, mi, s, n).unwrap()
    }

    #[test]
    fn test_timestamp_formats() {
        for case in TEST_CASES {
            let got = parser::parse_timestamp(case.input);
            assert_eq!(got, case.expected.map(at), "{}: {}", case.description, case.input);
        }
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert_eq!(parser::parse_timestamp("  2024-03-05 07:08:09 "), Some(at((2024, 3, 5, 7, 8, 9, 0))));
    }

    #[test]
    fn test_text_values_from_dataframe_exports() {
        assert_eq!(value_to_text(json!("abc")), Some("abc".to_string()));
        assert_eq!(value_to_text(json!(" abc ")), Some("abc".to_string()));
        assert_eq!(value_to_text(json!(123)), Some("123".to_string()));
        assert_eq!(value_to_text(json!(123.0)), Some("123".to_string()));
        assert_eq!(value_to_text(json!("nan")), None);
        assert_eq!(value_to_text(json!("NULL")), None);
        assert_eq!(value_to_text(json!("")), None);
        assert_eq!(value_to_text(json!(null)), None);
    }

    #[test]
    fn test_flag_values() {
        assert_eq!(value_to_flag(&json!(true)), Some(true));
        assert_eq!(value_to_flag(&json!("False")), Some(false));
        assert_eq!(value_to_flag(&json!(0)), Some(false));
        assert_eq!(value_to_flag(&json!(1)), Some(true));
        assert_eq!(value_to_flag(&json!("maybe")), None);
    }

    #[test]
    fn test_int_values() {
        assert_eq!(value_to_int(&json!(15)), Some(15));
        assert_eq!(value_to_int(&json!(15.0)), Some(15));
        assert_eq!(value_to_int(&json!("15")), Some(15));
        assert_eq!(value_to_int(&json!("15.0")), Some(15));
        assert_eq!(value_to_int(&json!(15.5)), None);
        assert_eq!(value_to_int(&json!("nan")), None);
    }
}
