#![forbid(unsafe_code)]

use std::path::PathBuf;

use serde_json::json;
use tn_conformance::{HarnessConfig, KeyMode, mode_label, run_nesting_conformance, write_case_logs};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), String> {
    let mut mode = String::from("both");
    let mut fixtures: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mode" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--mode requires one of: plain|complex|both".to_string())?;
                mode = value;
            }
            "--fixtures" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--fixtures requires a directory".to_string())?;
                fixtures = Some(PathBuf::from(value));
            }
            "--output" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--output requires a file path".to_string())?;
                output = Some(PathBuf::from(value));
            }
            other => {
                return Err(format!(
                    "unknown arg '{other}'. usage: run_conformance [--mode plain|complex|both] [--fixtures dir] [--output path]"
                ));
            }
        }
    }

    init_tracing();

    let modes = parse_modes(mode.as_str())?;
    let mut config = HarnessConfig::default_paths();
    if let Some(root) = fixtures {
        config.fixture_root = root;
    }

    let mut summaries = Vec::with_capacity(modes.len());
    let mut all_cases = Vec::new();
    for mode in modes {
        let (report, cases) = run_nesting_conformance(&config, mode)?;
        summaries.push(json!({
            "suite": report.suite,
            "mode": mode_label(mode),
            "cases_total": report.cases_total,
            "cases_passed": report.cases_passed,
            "failed": cases
                .iter()
                .filter(|case| !case.passed())
                .map(|case| case.name.as_str())
                .collect::<Vec<_>>(),
        }));
        all_cases.extend(cases);
    }

    let logs_written = match output.as_deref() {
        Some(path) => Some(write_case_logs(path, &all_cases)?),
        None => None,
    };
    let all_passed = all_cases.iter().all(|case| case.passed());

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "fixture_root": config.fixture_root.display().to_string(),
            "output": output.map(|path| path.display().to_string()),
            "logs_written": logs_written,
            "all_passed": all_passed,
            "reports": summaries,
        }))
        .map_err(|error| format!("failed to serialize summary: {error}"))?
    );

    if all_passed {
        Ok(())
    } else {
        Err("conformance failures detected".to_string())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed by an embedding process.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_modes(raw: &str) -> Result<Vec<KeyMode>, String> {
    match raw {
        "plain" => Ok(vec![KeyMode::Plain]),
        "complex" => Ok(vec![KeyMode::Complex]),
        "both" => Ok(vec![KeyMode::Plain, KeyMode::Complex]),
        other => Err(format!(
            "unsupported mode '{other}', expected plain|complex|both"
        )),
    }
}
