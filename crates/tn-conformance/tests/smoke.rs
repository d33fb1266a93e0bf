use std::path::Path;

use tn_conformance::{HarnessConfig, KeyMode, fixture_registry, run_nesting_conformance, write_case_logs};
use tn_core::{DimensionType, at};
use tn_json::{CodecError, TensorCodec, TokenKind};

#[test]
fn nesting_fixture_passes_in_plain_mode() {
    let cfg = HarnessConfig::default_paths();
    let (report, cases) =
        run_nesting_conformance(&cfg, KeyMode::Plain).expect("plain conformance should run");

    assert_eq!(report.suite, "nesting");
    assert!(!report.complex_keys);
    assert_eq!(report.cases_total, cases.len());
    let failed: Vec<&str> = cases.iter().filter(|c| !c.passed()).map(|c| c.name.as_str()).collect();
    assert!(failed.is_empty(), "failed cases: {failed:?}");
}

#[test]
fn nesting_fixture_passes_in_complex_mode() {
    let cfg = HarnessConfig::default_paths();
    let (report, cases) =
        run_nesting_conformance(&cfg, KeyMode::Complex).expect("complex conformance should run");

    assert!(report.complex_keys);
    assert_eq!(report.cases_total, report.cases_passed, "{cases:#?}");
}

#[test]
fn record_case_reports_expected_read_error() {
    let cfg = HarnessConfig::default_paths();
    let (_, cases) = run_nesting_conformance(&cfg, KeyMode::Plain).expect("plain conformance");
    let record = cases
        .iter()
        .find(|case| case.name == "record_keys")
        .expect("record_keys fixture present");

    assert_eq!(record.forensic_log.reason_code, "expected_error_observed");
    assert_eq!(record.forensic_log.mode, "plain");
    let message = record
        .forensic_log
        .extra_fields
        .get("read_error")
        .and_then(|value| value.as_str())
        .expect("read error recorded");
    assert!(message.contains("expected BEGIN_OBJECT but was STRING"), "{message}");
}

#[test]
fn case_logs_are_json_lines() {
    let cfg = HarnessConfig::default_paths();
    let (_, cases) = run_nesting_conformance(&cfg, KeyMode::Complex).expect("complex conformance");

    let path = std::env::temp_dir().join(format!("tn_conformance_logs_{}.jsonl", std::process::id()));
    let written = write_case_logs(&path, &cases).expect("logs writable");
    let raw = std::fs::read_to_string(&path).expect("logs readable");
    let _ = std::fs::remove_file(&path);

    assert_eq!(written, cases.len());
    assert_eq!(raw.lines().count(), cases.len());
    for line in raw.lines() {
        let value: serde_json::Value = serde_json::from_str(line).expect("each line is json");
        assert_eq!(value["suite"], "nesting");
        assert_eq!(value["mode"], "complex");
    }
}

#[test]
fn missing_fixture_root_is_reported() {
    let cfg = HarnessConfig {
        fixture_root: Path::new("/nonexistent/tn-conformance").to_path_buf(),
    };
    let err = run_nesting_conformance(&cfg, KeyMode::Plain).expect_err("no fixtures");
    assert!(err.contains("failed reading fixture metadata"), "{err}");
}

#[test]
fn fixture_registry_reads_pair_arrays_without_complex_mode() {
    let registry = fixture_registry();
    let codec = TensorCodec::<f64>::new(
        &registry,
        vec![DimensionType::of::<tn_conformance::Pair>()],
        KeyMode::Plain.codec_config(),
    )
    .expect("Pair is registered");

    let tensor = codec
        .read_str(r#"[[{"a":"a1","b":"b1"},0.5]]"#)
        .expect("pair arrays are always accepted");
    let key = tn_conformance::Pair {
        a: "a1".to_string(),
        b: "b1".to_string(),
    };
    assert_eq!(tensor.get(&at!(key).expect("position")), Some(&0.5));

    let err = codec
        .read_str(r#"[{"a":"a1","b":"b1"}]"#)
        .expect_err("pair elements must be arrays");
    assert!(matches!(
        err,
        CodecError::MalformedInput {
            expected: TokenKind::BeginArray,
            found: TokenKind::BeginObject,
            ..
        }
    ));
}
