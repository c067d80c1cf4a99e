#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use tracing::Level;
use wspr_conformance::{HarnessConfig, run_harness, run_preflight};

struct CliArgs {
    config: HarnessConfig,
    check: bool,
    level: Level,
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => return ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("wspr-fixture-gen error: {error}");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(args.level)
        .with_target(false)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("wspr-fixture-gen error: {error}");
            ExitCode::from(1)
        }
    }
}

fn run(args: &CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.check {
        let report = run_preflight(&args.config, true)?;
        println!(
            "suite={} oracle={} fixture_present={} fixture_records={} contract_ok={}",
            report.suite,
            report
                .oracle_path
                .as_deref()
                .map_or_else(|| "<missing>".to_owned(), |p| p.display().to_string()),
            report.fixture_present,
            report.fixture_count,
            report.contract.is_some()
        );
        return Ok(());
    }

    let report = run_harness(&args.config)?;
    println!(
        "suite={} seed={} iterations={} parsed={} accepted={} mismatched={} fixture={} {}",
        report.suite,
        report.seed,
        report.iterations,
        report.parsed,
        report.accepted,
        report.mismatched,
        report.fixture_path.display(),
        report.fixture_sha256
    );
    if let Some(path) = args.config.report_path.as_deref() {
        println!("wrote run_report={}", path.display());
    }
    Ok(())
}

fn parse_args() -> Result<Option<CliArgs>, Box<dyn std::error::Error>> {
    let mut config = HarnessConfig::default_paths();
    let mut check = false;
    let mut level = Level::INFO;

    let mut args = std::env::args().skip(1).peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--iterations" => {
                let value = args.next().ok_or("--iterations requires a count")?;
                config.iterations = value
                    .parse()
                    .map_err(|_| format!("invalid --iterations value: {value}"))?;
            }
            "--seed" => {
                let value = args.next().ok_or("--seed requires an unsigned integer")?;
                config.seed = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid --seed value: {value}"))?,
                );
            }
            "--oracle" => {
                let value = args.next().ok_or("--oracle requires a program name or path")?;
                config.oracle_bin = PathBuf::from(value);
            }
            "--out" => {
                let value = args.next().ok_or("--out requires a path")?;
                config.fixture_path = PathBuf::from(value);
            }
            "--raw-out" => {
                let value = args.next().ok_or("--raw-out requires a path")?;
                config.raw_output_path = PathBuf::from(value);
                config.keep_raw_output = true;
            }
            "--report" => {
                let value = args.next().ok_or("--report requires a path or `none`")?;
                config.report_path = match value.as_str() {
                    "none" => None,
                    _ => Some(PathBuf::from(value)),
                };
            }
            "--timeout-secs" => {
                let value = args.next().ok_or("--timeout-secs requires seconds")?;
                let secs: u64 = value
                    .parse()
                    .map_err(|_| format!("invalid --timeout-secs value: {value}"))?;
                config.oracle_timeout = Duration::from_secs(secs);
            }
            "--jobs" => {
                let value = args.next().ok_or("--jobs requires a count")?;
                let jobs: usize = value
                    .parse()
                    .map_err(|_| format!("invalid --jobs value: {value}"))?;
                if jobs == 0 {
                    return Err("--jobs must be at least 1".into());
                }
                config.jobs = jobs;
            }
            "--verbose" | "-v" => {
                level = Level::DEBUG;
            }
            "--quiet" | "-q" => {
                level = Level::WARN;
            }
            "--check" => {
                check = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            other => return Err(format!("unknown argument: {other}").into()),
        }
    }

    Ok(Some(CliArgs {
        config,
        check,
        level,
    }))
}

fn print_help() {
    println!(
        "wspr-fixture-gen\n\
         Usage:\n\
         \twspr-fixture-gen [--iterations 5000] [--seed <u64>] [--oracle WSPRcode] [--out <path>] [--jobs 1]\n\
         \twspr-fixture-gen --check [--oracle <path>]\n\
         Options:\n\
         \t--iterations <n>     Number of random messages to encode (default 5000)\n\
         \t--seed <u64>         Seed for message generation (default: random, recorded in the run report)\n\
         \t--oracle <program>   Reference encoder binary, bare name searched on PATH (default WSPRcode)\n\
         \t--out <path>         Fixture file to overwrite (default crates/wspr-conformance/fixtures/wspr.txt)\n\
         \t--raw-out <path>     Keep raw oracle output at this path instead of deleting it\n\
         \t--report <path|none> JSON run report location (default next to the fixture)\n\
         \t--timeout-secs <n>   Per-invocation oracle timeout (default 30)\n\
         \t--jobs <n>           Oracle invocations in flight (default 1)\n\
         \t--check              Only verify the oracle is installed and honours its output contract\n\
         \t-v, --verbose        Log every generated message and oracle call\n\
         \t-q, --quiet          Only log warnings and errors\n\
         \t-h, --help           Show this help"
    );
}
