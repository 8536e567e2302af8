use super::*;
use chrono::TimeZone;

#[test]
fn column_widths_cover_headers_and_cells() {
    let rows = vec![
        vec!["wasde".to_string(), "World Agricultural Supply".to_string()],
        vec!["fas_psd".to_string(), "PSD".to_string()],
    ];
    assert_eq!(calculate_column_widths(&["code", "name"], &rows), vec![7, 25]);
}

#[test]
fn column_widths_ignore_extra_cells() {
    let rows = vec![vec!["a".to_string(), "bbb".to_string(), "extra".to_string()]];
    assert_eq!(calculate_column_widths(&["x", "y"], &rows), vec![1, 3]);
}

#[test]
fn observed_at_accepts_dates_and_rfc3339() {
    let midnight = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
    assert_eq!(parse_observed_at("2024-09-01").unwrap(), midnight);
    assert_eq!(parse_observed_at("2024-09-01T00:00:00Z").unwrap(), midnight);
    assert_eq!(
        parse_observed_at("2024-09-01T02:00:00+02:00").unwrap(),
        midnight
    );
    assert!(parse_observed_at("2024/25").is_err());
}

#[test]
fn json_args_report_the_flag() {
    assert_eq!(parse_json_arg("params", None).unwrap(), None);
    assert_eq!(
        parse_json_arg("params", Some(r#"{"month": 9}"#)).unwrap(),
        Some(serde_json::json!({"month": 9}))
    );
    let err = parse_json_arg("params", Some("{oops")).unwrap_err();
    assert!(err.to_string().contains("--params"));
}

#[test]
fn optional_values_render_as_dash() {
    assert_eq!(format_opt::<i64>(None), "-");
    assert_eq!(format_opt(Some(7)), "7");
}

#[test]
fn read_input_reads_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.json");
    std::fs::write(&path, "[]").unwrap();
    assert_eq!(read_input(path.to_str().unwrap()).unwrap(), "[]");
    assert!(read_input(dir.path().join("missing.json").to_str().unwrap()).is_err());
}
