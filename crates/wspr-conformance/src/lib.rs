#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};
use wspr_fixture::{FixtureError, FixtureRecord, write_fixture_file};
use wspr_types::generate::random_message;
use wspr_types::{FieldError, Message};

pub mod oracle;
pub mod report;
pub mod sink;
pub mod validate;

pub use oracle::{Oracle, WsprCodeOracle, locate_oracle};
pub use report::{ParsedRecord, ReportScanner, parse_oracle_report};
pub use sink::{FileSink, MemorySink, RawSink};
pub use validate::{OracleMismatch, ValidationOutcome, validate_record, validate_records};

pub const DEFAULT_ITERATIONS: usize = 5000;
pub const DEFAULT_ORACLE_BIN: &str = "WSPRcode";
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Message used to check the oracle's output format before a long run.
pub const CONTRACT_PROBE_MESSAGE: &str = "K1ABC FN42 37";

const PROGRESS_EVERY: usize = 500;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub repo_root: PathBuf,
    pub oracle_bin: PathBuf,
    pub fixture_path: PathBuf,
    pub raw_output_path: PathBuf,
    pub report_path: Option<PathBuf>,
    pub keep_raw_output: bool,
    pub iterations: usize,
    pub seed: Option<u64>,
    pub oracle_timeout: Duration,
    pub jobs: usize,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        let repo_root = manifest_dir
            .ancestors()
            .nth(2)
            .unwrap_or(manifest_dir)
            .to_path_buf();
        let fixture_root = manifest_dir.join("fixtures");
        Self {
            oracle_bin: PathBuf::from(DEFAULT_ORACLE_BIN),
            fixture_path: fixture_root.join("wspr.txt"),
            raw_output_path: fixture_root.join("wspr_raw.txt"),
            report_path: Some(fixture_root.join("wspr_run_report.json")),
            keep_raw_output: false,
            iterations: DEFAULT_ITERATIONS,
            seed: None,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
            jobs: 1,
            repo_root,
        }
    }

    /// Points every output file into `root`, keeping the default names.
    #[must_use]
    pub fn with_fixture_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.fixture_path = root.join("wspr.txt");
        self.raw_output_path = root.join("wspr_raw.txt");
        self.report_path = Some(root.join("wspr_run_report.json"));
        self
    }

    /// `path` relative to `repo_root` when it lies inside it; run reports
    /// record paths this way.
    #[must_use]
    pub fn repo_relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.repo_root)
            .map_or_else(|_| path.to_path_buf(), Path::to_path_buf)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Fixture(#[from] FixtureError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("oracle is unavailable: {0}")]
    OracleUnavailable(String),
    #[error("oracle command failed: status={status}, stderr={stderr}")]
    OracleCommandFailed { status: i32, stderr: String },
    #[error("oracle timed out after {timeout_ms} ms encoding {message:?}")]
    OracleTimeout { message: String, timeout_ms: u64 },
    #[error(
        "malformed oracle report: record {echoed:?} opened at line {opened_at_line} ended before {marker}"
    )]
    MalformedReport {
        marker: &'static str,
        opened_at_line: usize,
        echoed: String,
    },
    #[error("oracle report has {parsed} records for {expected} invocations")]
    RecordCountMismatch { expected: usize, parsed: usize },
    #[error("oracle output contract violated: {0}")]
    ContractViolation(String),
    #[error("oracle worker thread panicked")]
    WorkerPanicked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub iterations: usize,
    pub jobs: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            jobs: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub generated: usize,
    pub parsed: usize,
    pub accepted: Vec<FixtureRecord>,
    pub mismatches: Vec<OracleMismatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub suite: String,
    pub seed: u64,
    pub iterations: usize,
    pub parsed: usize,
    pub accepted: usize,
    pub mismatched: usize,
    pub mismatches: Vec<OracleMismatch>,
    pub fixture_path: PathBuf,
    pub fixture_sha256: String,
}

impl RunReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.parsed == self.iterations && self.accepted + self.mismatched == self.parsed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub suite: &'static str,
    pub oracle_present: bool,
    pub oracle_path: Option<PathBuf>,
    pub fixture_present: bool,
    pub fixture_count: usize,
    /// Set when the contract probe ran and the oracle passed it.
    pub contract: Option<FixtureRecord>,
}

/// Environment check before a long run: is the oracle installed and is there
/// a fixture from an earlier run. With `check` the contract probe is also
/// sent through the located oracle.
pub fn run_preflight(config: &HarnessConfig, check: bool) -> Result<PreflightReport, HarnessError> {
    let oracle_path = locate_oracle(&config.oracle_bin);
    let fixture_count = fs::read_to_string(&config.fixture_path)
        .map(|body| body.lines().filter(|line| !line.trim().is_empty()).count())
        .unwrap_or(0);

    let contract = match (&oracle_path, check) {
        (Some(path), true) => {
            let oracle = WsprCodeOracle::new(path.clone(), config.oracle_timeout);
            let record = check_oracle_contract(&oracle)?;
            info!(symbols = %record.symbols, "oracle passed contract probe");
            Some(record)
        }
        (None, true) => return Err(oracle::missing_oracle(&config.oracle_bin)),
        (_, false) => None,
    };

    Ok(PreflightReport {
        suite: "preflight",
        oracle_present: oracle_path.is_some(),
        oracle_path,
        fixture_present: config.fixture_path.exists(),
        fixture_count,
        contract,
    })
}

/// Runs [`CONTRACT_PROBE_MESSAGE`] through the oracle and the full
/// scan/validate path.
pub fn check_oracle_contract<O: Oracle>(oracle: &O) -> Result<FixtureRecord, HarnessError> {
    let message = Message::parse(CONTRACT_PROBE_MESSAGE)?;
    let raw = oracle.encode(&message)?;
    let mut records = parse_oracle_report(&raw)?;
    if records.len() != 1 {
        return Err(HarnessError::ContractViolation(format!(
            "expected exactly one record for {CONTRACT_PROBE_MESSAGE:?}, found {}",
            records.len()
        )));
    }
    let record = records.remove(0);
    if record.echoed != CONTRACT_PROBE_MESSAGE {
        return Err(HarnessError::ContractViolation(format!(
            "oracle echoed {:?} for {CONTRACT_PROBE_MESSAGE:?}",
            record.echoed
        )));
    }
    validate_record(record).map_err(|mismatch| {
        HarnessError::ContractViolation(format!(
            "oracle decoded {:?} for {:?}",
            mismatch.decoded, mismatch.source
        ))
    })
}

pub fn generate_messages<R: Rng>(rng: &mut R, count: usize) -> Vec<Message> {
    (0..count)
        .map(|_| {
            let message = random_message(rng);
            debug!(callsign = %message.callsign.as_str(), %message, "generated");
            message
        })
        .collect()
}

/// Encodes every message and appends each report to `sink` in message
/// order. With `jobs > 1` the oracle runs on scoped worker threads over
/// contiguous chunks and the reports are appended once all chunks finish.
pub fn invoke_oracle<O, S>(
    oracle: &O,
    messages: &[Message],
    sink: &mut S,
    jobs: usize,
) -> Result<(), HarnessError>
where
    O: Oracle + Sync,
    S: RawSink,
{
    if jobs <= 1 || messages.len() <= 1 {
        for (idx, message) in messages.iter().enumerate() {
            let raw = oracle.encode(message)?;
            sink.append(&raw)?;
            log_progress(idx + 1, messages.len());
        }
        return Ok(());
    }

    let chunk_len = messages.len().div_ceil(jobs);
    let reports = thread::scope(|scope| {
        let workers = messages
            .chunks(chunk_len)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|message| oracle.encode(message))
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect::<Vec<_>>();

        let mut reports = Vec::with_capacity(messages.len());
        for worker in workers {
            reports.extend(worker.join().map_err(|_| HarnessError::WorkerPanicked)??);
        }
        Ok::<_, HarnessError>(reports)
    })?;

    for (idx, raw) in reports.iter().enumerate() {
        sink.append(raw)?;
        log_progress(idx + 1, reports.len());
    }
    Ok(())
}

fn log_progress(done: usize, total: usize) {
    if done % PROGRESS_EVERY == 0 || done == total {
        info!(done, total, "oracle invocations");
    }
}

/// Generate, encode, scan and filter. Writing the fixture is left to the
/// caller.
pub fn run_pipeline<O, S, R>(
    oracle: &O,
    sink: &mut S,
    rng: &mut R,
    options: &PipelineOptions,
) -> Result<PipelineOutcome, HarnessError>
where
    O: Oracle + Sync,
    S: RawSink,
    R: Rng,
{
    let messages = generate_messages(rng, options.iterations);
    info!(count = messages.len(), "generated messages");

    invoke_oracle(oracle, &messages, sink, options.jobs)?;

    let records = parse_oracle_report(&sink.contents()?)?;
    if records.len() != messages.len() {
        return Err(HarnessError::RecordCountMismatch {
            expected: messages.len(),
            parsed: records.len(),
        });
    }
    let parsed = records.len();
    info!(parsed, "scanned oracle report");

    let ValidationOutcome {
        accepted,
        mismatches,
    } = validate_records(records);
    info!(
        accepted = accepted.len(),
        mismatched = mismatches.len(),
        "validated oracle records"
    );

    Ok(PipelineOutcome {
        generated: messages.len(),
        parsed,
        accepted,
        mismatches,
    })
}

/// Full run against the configured external oracle: accumulates raw output
/// in a file sink, writes the fixture and the optional JSON run report.
pub fn run_harness(config: &HarnessConfig) -> Result<RunReport, HarnessError> {
    let oracle = WsprCodeOracle::located(&config.oracle_bin, config.oracle_timeout)?;
    run_harness_with_oracle(config, &oracle)
}

pub fn run_harness_with_oracle<O: Oracle + Sync>(
    config: &HarnessConfig,
    oracle: &O,
) -> Result<RunReport, HarnessError> {
    let seed = config.seed.unwrap_or_else(rand::random);
    info!(seed, iterations = config.iterations, "starting fixture run");
    let mut rng = StdRng::seed_from_u64(seed);

    let mut sink = FileSink::create_fresh(&config.raw_output_path)?;
    let options = PipelineOptions {
        iterations: config.iterations,
        jobs: config.jobs.max(1),
    };
    let outcome = run_pipeline(oracle, &mut sink, &mut rng, &options)?;

    let written = write_fixture_file(&config.fixture_path, &outcome.accepted)?;
    info!(written, path = %config.fixture_path.display(), "wrote fixture");
    if !config.keep_raw_output {
        sink.discard()?;
    }

    let report = RunReport {
        suite: "wspr_oracle_fixtures".to_owned(),
        seed,
        iterations: outcome.generated,
        parsed: outcome.parsed,
        accepted: outcome.accepted.len(),
        mismatched: outcome.mismatches.len(),
        mismatches: outcome.mismatches,
        fixture_path: config.repo_relative(&config.fixture_path),
        fixture_sha256: format!("sha256:{}", hash_bytes(&fs::read(&config.fixture_path)?)),
    };
    if let Some(path) = config.report_path.as_deref() {
        write_run_report(path, &report)?;
    }
    Ok(report)
}

pub fn write_run_report(path: &Path, report: &RunReport) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(report)?)?;
    Ok(())
}

fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use wspr_types::Message;

    use super::{
        HarnessConfig, HarnessError, MemorySink, Oracle, PipelineOptions, RunReport,
        check_oracle_contract, invoke_oracle, run_pipeline, run_preflight,
    };

    /// Echoes the message back in WSPRcode's layout, optionally corrupting
    /// every `corrupt_every`-th decode.
    struct EchoOracle {
        calls: AtomicUsize,
        corrupt_every: Option<usize>,
    }

    impl EchoOracle {
        fn new(corrupt_every: Option<usize>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                corrupt_every,
            }
        }
    }

    impl Oracle for EchoOracle {
        fn encode(&self, message: &Message) -> Result<String, HarnessError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let text = message.to_string();
            let decoded = match self.corrupt_every {
                Some(every) if call % every == 0 => format!("{text}X"),
                _ => text.clone(),
            };
            let mut out = format!("Message: {text}\nChannel symbols:\n");
            for group in 0..6 {
                out.push_str(&format!("  {group} {}\n", text.len()));
            }
            out.push_str(&format!("Decoded message: {decoded}   ntype: 0\n"));
            Ok(out)
        }
    }

    struct BrokenOracle;

    impl Oracle for BrokenOracle {
        fn encode(&self, _message: &Message) -> Result<String, HarnessError> {
            Ok("WSPRcode: unrecognized option\n".to_owned())
        }
    }

    #[test]
    fn pipeline_accepts_every_consistent_record() {
        let oracle = EchoOracle::new(None);
        let mut sink = MemorySink::new();
        let mut rng = StdRng::seed_from_u64(1);
        let options = PipelineOptions {
            iterations: 40,
            jobs: 1,
        };
        let outcome = run_pipeline(&oracle, &mut sink, &mut rng, &options).expect("pipeline");
        assert_eq!(outcome.generated, 40);
        assert_eq!(outcome.parsed, 40);
        assert_eq!(outcome.accepted.len(), 40);
        assert!(outcome.mismatches.is_empty());
    }

    #[test]
    fn pipeline_drops_mismatches_without_failing() {
        let oracle = EchoOracle::new(Some(4));
        let mut sink = MemorySink::new();
        let mut rng = StdRng::seed_from_u64(2);
        let options = PipelineOptions {
            iterations: 20,
            jobs: 1,
        };
        let outcome = run_pipeline(&oracle, &mut sink, &mut rng, &options).expect("pipeline");
        assert_eq!(outcome.accepted.len(), 15);
        assert_eq!(outcome.mismatches.len(), 5);
    }

    #[test]
    fn parallel_invocation_matches_sequential_sink() {
        let messages = {
            let mut rng = StdRng::seed_from_u64(3);
            super::generate_messages(&mut rng, 37)
        };

        let mut sequential = MemorySink::new();
        invoke_oracle(&EchoOracle::new(None), &messages, &mut sequential, 1).expect("seq");
        let mut parallel = MemorySink::new();
        invoke_oracle(&EchoOracle::new(None), &messages, &mut parallel, 4).expect("par");

        assert_eq!(sequential.as_str(), parallel.as_str());
    }

    #[test]
    fn missing_records_are_fatal() {
        let mut sink = MemorySink::new();
        let mut rng = StdRng::seed_from_u64(4);
        let options = PipelineOptions {
            iterations: 3,
            jobs: 1,
        };
        let err = run_pipeline(&BrokenOracle, &mut sink, &mut rng, &options).expect_err("fatal");
        assert!(matches!(
            err,
            HarnessError::RecordCountMismatch {
                expected: 3,
                parsed: 0
            }
        ));
    }

    #[test]
    fn contract_probe_accepts_conforming_oracle() {
        let record = check_oracle_contract(&EchoOracle::new(None)).expect("contract");
        assert_eq!(record.message, "K1ABC FN42 37");
    }

    #[test]
    fn contract_probe_rejects_self_inconsistent_oracle() {
        let err = check_oracle_contract(&EchoOracle::new(Some(1))).expect_err("violation");
        assert!(matches!(err, HarnessError::ContractViolation(_)), "{err}");
    }

    #[test]
    fn preflight_reports_missing_oracle_and_fixture() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = HarnessConfig::default_paths().with_fixture_root(dir.path());
        cfg.oracle_bin = "wsprcode-definitely-not-installed-here".into();
        let report = run_preflight(&cfg, false).expect("preflight");
        assert_eq!(report.suite, "preflight");
        assert!(!report.oracle_present);
        assert!(!report.fixture_present);
        assert_eq!(report.fixture_count, 0);
        assert!(report.contract.is_none());
    }

    #[test]
    fn preflight_check_without_oracle_is_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = HarnessConfig::default_paths().with_fixture_root(dir.path());
        cfg.oracle_bin = "wsprcode-definitely-not-installed-here".into();
        let err = run_preflight(&cfg, true).expect_err("no oracle");
        assert!(matches!(err, HarnessError::OracleUnavailable(_)));
    }

    #[test]
    fn report_paths_are_relative_to_the_repo_root() {
        let cfg = HarnessConfig::default_paths();
        assert!(cfg.repo_root.join("Cargo.toml").exists());
        assert_eq!(
            cfg.repo_relative(&cfg.fixture_path),
            std::path::Path::new("crates/wspr-conformance/fixtures/wspr.txt")
        );

        let dir = tempfile::tempdir().expect("tempdir");
        let outside = dir.path().join("wspr.txt");
        assert_eq!(cfg.repo_relative(&outside), outside);
    }

    #[test]
    fn run_report_completeness_tracks_counts() {
        let report = RunReport {
            suite: "wspr_oracle_fixtures".to_owned(),
            seed: 9,
            iterations: 10,
            parsed: 10,
            accepted: 8,
            mismatched: 2,
            mismatches: Vec::new(),
            fixture_path: "wspr.txt".into(),
            fixture_sha256: "sha256:00".to_owned(),
        };
        assert!(report.is_complete());
        let json = serde_json::to_string(&report).expect("serialize");
        let back: RunReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, report);
    }
}
