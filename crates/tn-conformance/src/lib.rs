#![forbid(unsafe_code)]

mod logging;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tn_core::{Coordinate, CoordinateType, DimensionType, Position, Tensor, TensorBuilder};
use tn_json::{CodecConfig, CodecRegistry, TensorCodec};
use tn_nest::{Nested, flatten, unflatten};

pub use logging::{StructuredCaseLog, mode_label};

const MAX_FIXTURE_BYTES: u64 = 1_048_576;
const NESTING_FIXTURE: &str = "nesting_cases.json";

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

/// How levels with structured keys are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyMode {
    Plain,
    Complex,
}

impl KeyMode {
    #[must_use]
    pub fn codec_config(self) -> CodecConfig {
        CodecConfig::default().with_complex_map_keys(self == Self::Complex)
    }
}

/// Record coordinate used by fixtures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub a: String,
    pub b: String,
}

impl CoordinateType for Pair {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl CoordinateType for Side {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessReport {
    pub suite: &'static str,
    pub fixture_count: usize,
    pub complex_keys: bool,
    pub cases_total: usize,
    pub cases_passed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestingCaseReport {
    pub name: String,
    pub mode: KeyMode,
    pub write_ok: bool,
    pub read_ok: bool,
    pub engine_ok: bool,
    pub forensic_log: StructuredCaseLog,
}

impl NestingCaseReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.write_ok && self.read_ok && self.engine_ok
    }
}

#[derive(Debug, Clone, Deserialize)]
struct NestingFixtureFile {
    cases: Vec<NestingCase>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct NestingCase {
    name: String,
    dimensions: Vec<String>,
    entries: Vec<FixtureEntry>,
    #[serde(default)]
    expect_json: Option<String>,
    #[serde(default)]
    complex_expect_json: Option<String>,
    #[serde(default)]
    expect_read_error_contains: Option<String>,
    #[serde(default)]
    complex_expect_read_error_contains: Option<String>,
}

impl NestingCase {
    fn expected_json(&self, mode: KeyMode) -> Option<&str> {
        match mode {
            KeyMode::Plain => self.expect_json.as_deref(),
            KeyMode::Complex => self
                .complex_expect_json
                .as_deref()
                .or(self.expect_json.as_deref()),
        }
    }

    fn expected_read_error(&self, mode: KeyMode) -> Option<&str> {
        match mode {
            KeyMode::Plain => self.expect_read_error_contains.as_deref(),
            KeyMode::Complex => self.complex_expect_read_error_contains.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FixtureEntry {
    position: Vec<Value>,
    value: f64,
}

/// The key codecs every fixture may name: built-ins plus [`Pair`] and [`Side`].
#[must_use]
pub fn fixture_registry() -> CodecRegistry {
    let mut registry = CodecRegistry::with_defaults();
    registry
        .register_coordinate::<Pair>()
        .register_coordinate::<Side>();
    registry
}

pub fn run_nesting_conformance(
    config: &HarnessConfig,
    mode: KeyMode,
) -> Result<(HarnessReport, Vec<NestingCaseReport>), String> {
    let fixture_path = config.fixture_root.join(NESTING_FIXTURE);
    let fixture: NestingFixtureFile = load_fixture(&fixture_path)?;
    let registry = fixture_registry();

    let mut case_reports = Vec::with_capacity(fixture.cases.len());
    for case in &fixture.cases {
        case_reports.push(run_nesting_case(&registry, case, mode)?);
    }

    let (cases_total, cases_passed) =
        summarize_passes(case_reports.iter().map(NestingCaseReport::passed));

    let report = HarnessReport {
        suite: "nesting",
        fixture_count: 1,
        complex_keys: mode == KeyMode::Complex,
        cases_total,
        cases_passed,
    };

    Ok((report, case_reports))
}

/// Writes one JSON line per case log to `path`, creating parent directories.
pub fn write_case_logs(path: &Path, reports: &[NestingCaseReport]) -> Result<usize, String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| format!("failed creating {}: {error}", parent.display()))?;
    }
    let mut file = fs::File::create(path)
        .map_err(|error| format!("failed creating {}: {error}", path.display()))?;
    for report in reports {
        let line = report.forensic_log.to_json_line()?;
        writeln!(file, "{line}")
            .map_err(|error| format!("failed writing {}: {error}", path.display()))?;
    }
    Ok(reports.len())
}

fn run_nesting_case(
    registry: &CodecRegistry,
    case: &NestingCase,
    mode: KeyMode,
) -> Result<NestingCaseReport, String> {
    let dimensions = case_dimensions(registry, case)?;
    let tensor = case_tensor(registry, case, &dimensions)?;
    let codec = TensorCodec::<f64>::new(registry, dimensions.clone(), mode.codec_config())
        .map_err(|error| format!("nesting case '{}' codec failed: {error}", case.name))?;

    let output = codec
        .to_json_string(&tensor)
        .map_err(|error| format!("nesting case '{}' write failed: {error}", case.name))?;
    let write_ok = case.expected_json(mode).is_none_or(|expected| expected == output);

    let expected_error = case.expected_read_error(mode);
    let (read_ok, read_error_message) = match (codec.read_str(&output), expected_error) {
        (Ok(read), None) => (read == tensor, None),
        (Ok(_), Some(_)) => (
            false,
            Some("read unexpectedly succeeded for expected-error case".to_string()),
        ),
        (Err(error), Some(needle)) => {
            let message = error.to_string();
            (message.contains(needle), Some(message))
        }
        (Err(error), None) => (false, Some(error.to_string())),
    };

    let engine_ok = engine_round_trip(&tensor, &dimensions)
        .map_err(|error| format!("nesting case '{}' engine failed: {error}", case.name))?;

    let passed = write_ok && read_ok && engine_ok;
    let reason_code = if expected_error.is_some() {
        if read_ok {
            "expected_error_observed"
        } else {
            "expected_error_not_observed"
        }
    } else if passed {
        "nesting_parity_ok"
    } else {
        "nesting_expectation_mismatch"
    };

    let mut extra_fields = BTreeMap::new();
    extra_fields.insert("dimensions".to_string(), json!(case.dimensions));
    extra_fields.insert("entries".to_string(), json!(tensor.len()));
    extra_fields.insert("output".to_string(), json!(output));
    if let Some(message) = read_error_message {
        extra_fields.insert("read_error".to_string(), json!(message));
    }

    let forensic_log = StructuredCaseLog::new(
        "nesting",
        NESTING_FIXTURE,
        case.name.as_str(),
        mode,
        format!(
            "cargo run -p tn-conformance --bin run_conformance -- --mode {}",
            mode_label(mode)
        ),
        if passed { "pass" } else { "fail" },
        reason_code,
    )
    .with_extra_fields(extra_fields);
    forensic_log.emit();

    Ok(NestingCaseReport {
        name: case.name.clone(),
        mode,
        write_ok,
        read_ok,
        engine_ok,
        forensic_log,
    })
}

fn case_dimensions(registry: &CodecRegistry, case: &NestingCase) -> Result<Vec<DimensionType>, String> {
    case.dimensions
        .iter()
        .map(|name| {
            registry.dimension_named(name).ok_or_else(|| {
                format!("nesting case '{}' names unknown dimension '{name}'", case.name)
            })
        })
        .collect()
}

fn case_tensor(
    registry: &CodecRegistry,
    case: &NestingCase,
    dimensions: &[DimensionType],
) -> Result<Tensor<f64>, String> {
    let mut builder = TensorBuilder::new(dimensions.to_vec())
        .map_err(|error| format!("nesting case '{}' dimensions: {error}", case.name))?;
    for entry in &case.entries {
        if entry.position.len() != dimensions.len() {
            return Err(format!(
                "nesting case '{}' entry has {} coordinates for {} dimensions",
                case.name,
                entry.position.len(),
                dimensions.len()
            ));
        }
        let coordinates = dimensions
            .iter()
            .zip(&entry.position)
            .map(|(dimension, raw)| fixture_coordinate(registry, dimension, raw))
            .collect::<Result<Vec<Coordinate>, String>>()
            .map_err(|error| format!("nesting case '{}': {error}", case.name))?;
        let position = Position::of(coordinates)
            .map_err(|error| format!("nesting case '{}' position: {error}", case.name))?;
        builder
            .put(position, entry.value)
            .map_err(|error| format!("nesting case '{}' entry: {error}", case.name))?;
    }
    Ok(builder.build())
}

fn fixture_coordinate(
    registry: &CodecRegistry,
    dimension: &DimensionType,
    raw: &Value,
) -> Result<Coordinate, String> {
    let codec = registry
        .key_codec(dimension)
        .ok_or_else(|| format!("no key codec for {dimension}"))?;
    codec
        .decode_value(raw.clone())
        .map_err(|error| format!("coordinate {raw} is not a {dimension}: {error}"))
}

fn engine_round_trip(tensor: &Tensor<f64>, dimensions: &[DimensionType]) -> Result<bool, String> {
    let nested = flatten(tensor, dimensions)
        .map_err(|error| error.to_string())?
        .map(Nested::cloned);
    let rebuilt = unflatten(nested, dimensions).map_err(|error| error.to_string())?;
    Ok(&rebuilt == tensor)
}

/// Reads a nesting fixture file, refusing anything over `MAX_FIXTURE_BYTES` before parsing.
fn load_fixture<T>(path: &Path) -> Result<T, String>
where
    T: for<'de> Deserialize<'de>,
{
    let size = fs::metadata(path)
        .map_err(|error| {
            format!(
                "failed reading fixture metadata {}: {error}",
                path.display()
            )
        })?
        .len();
    if size > MAX_FIXTURE_BYTES {
        return Err(format!(
            "nesting fixture {} is {size} bytes, over the {MAX_FIXTURE_BYTES} byte limit",
            path.display()
        ));
    }

    let bytes = fs::read(path)
        .map_err(|error| format!("failed reading fixture {}: {error}", path.display()))?;
    serde_json::from_slice::<T>(&bytes)
        .map_err(|error| format!("failed parsing nesting fixture {}: {error}", path.display()))
}

fn summarize_passes<I>(iter: I) -> (usize, usize)
where
    I: Iterator<Item = bool>,
{
    iter.fold((0, 0), |(total, passed), is_passed| {
        (total + 1, passed + usize::from(is_passed))
    })
}
