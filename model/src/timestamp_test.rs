use super::*;

// 2024-03-05T06:07:08.123Z
const SAMPLE_MS: i64 = 1_709_618_828_123;

#[test]
fn parses_integer_millis() {
    assert_eq!(parse_flexible("1700000000000").unwrap(), 1_700_000_000_000);
    assert_eq!(parse_flexible(" 0 ").unwrap(), 0);
}

#[test]
fn parses_rfc3339_with_and_without_fraction() {
    assert_eq!(parse_flexible("2024-03-05T06:07:08.123Z").unwrap(), SAMPLE_MS);
    assert_eq!(parse_flexible("2024-03-05T06:07:08.123456789Z").unwrap(), SAMPLE_MS);
    assert_eq!(parse_flexible("2024-03-05T06:07:08Z").unwrap(), SAMPLE_MS - 123);
    assert_eq!(parse_flexible("2024-03-05T07:07:08+01:00").unwrap(), SAMPLE_MS - 123);
}

#[test]
fn parses_sql_server_style_datetime() {
    assert_eq!(parse_flexible("2024-03-05 06:07:08.1230000").unwrap(), SAMPLE_MS);
    assert_eq!(parse_flexible("2024-03-05 06:07:08").unwrap(), SAMPLE_MS - 123);
}

#[test]
fn rejects_garbage() {
    assert_eq!(parse_flexible("yesterday"), Err(TimestampError::Unrecognized("yesterday".into())));
}

#[test]
fn rfc3339_output_parses_back() {
    let rendered = format_rfc3339(SAMPLE_MS);
    assert_eq!(parse_flexible(&rendered).unwrap(), SAMPLE_MS);
}

#[test]
fn display_format_is_day_first() {
    assert_eq!(format_display(SAMPLE_MS), "05.03.2024 06:07");
}

#[test]
fn now_is_after_2020() {
    assert!(now_ms() > 1_577_836_800_000);
}
