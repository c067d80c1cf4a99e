use std::env;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::debug;
use wait_timeout::ChildExt;
use wspr_types::Message;

use crate::HarnessError;

/// Anything that turns one message into the reference encoder's console
/// report. The real implementation shells out to `WSPRcode`; tests plug in
/// deterministic fakes.
pub trait Oracle {
    fn encode(&self, message: &Message) -> Result<String, HarnessError>;
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn encode(&self, message: &Message) -> Result<String, HarnessError> {
        (**self).encode(message)
    }
}

/// Runs an external `WSPRcode`-compatible binary once per message.
#[derive(Debug, Clone)]
pub struct WsprCodeOracle {
    program: PathBuf,
    timeout: Duration,
}

impl WsprCodeOracle {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Like [`WsprCodeOracle::new`] but fails up front when the binary
    /// cannot be found, instead of on the first invocation.
    pub fn located(program: &Path, timeout: Duration) -> Result<Self, HarnessError> {
        let resolved = locate_oracle(program).ok_or_else(|| missing_oracle(program))?;
        debug!(program = %resolved.display(), "resolved oracle binary");
        Ok(Self::new(resolved, timeout))
    }
}

impl Oracle for WsprCodeOracle {
    fn encode(&self, message: &Message) -> Result<String, HarnessError> {
        let argument = message.to_string();
        let mut child = Command::new(&self.program)
            .arg(&argument)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => missing_oracle(&self.program),
                _ => HarnessError::Io(err),
            })?;

        // Drain both pipes while waiting so a chatty oracle cannot block on a
        // full pipe buffer.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let Some(status) = child.wait_timeout(self.timeout)? else {
            kill_and_reap(&mut child);
            return Err(HarnessError::OracleTimeout {
                message: argument,
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            });
        };

        let stdout = join_pipe(stdout)?;
        let stderr = join_pipe(stderr)?;

        if !status.success() {
            return Err(HarnessError::OracleCommandFailed {
                status: status.code().unwrap_or(-1),
                stderr: format!(
                    "{}\nmessage={argument}",
                    String::from_utf8_lossy(&stderr).trim_end()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

/// Resolves `program` the way a shell would: paths with a directory
/// component are taken as-is, bare names are searched on `PATH`.
#[must_use]
pub fn locate_oracle(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }

    let search_path = env::var_os("PATH")?;
    env::split_paths(&search_path).find_map(|dir| {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        let with_suffix = dir.join(format!(
            "{}{}",
            program.display(),
            env::consts::EXE_SUFFIX
        ));
        with_suffix.is_file().then_some(with_suffix)
    })
}

pub(crate) fn missing_oracle(program: &Path) -> HarnessError {
    HarnessError::OracleUnavailable(format!(
        "reference encoder `{}` was not found; install WSPRcode and make sure it is on PATH \
         (or pass --oracle <path>)",
        program.display()
    ))
}

type PipeReader = Option<thread::JoinHandle<io::Result<Vec<u8>>>>;

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> PipeReader {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn join_pipe(reader: PipeReader) -> Result<Vec<u8>, HarnessError> {
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| HarnessError::Io(io::Error::other("oracle pipe reader panicked")))?
            .map_err(HarnessError::from),
        None => Ok(Vec::new()),
    }
}

fn kill_and_reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(error = %err, "failed to kill timed-out oracle");
    }
    if let Err(err) = child.wait() {
        debug!(error = %err, "failed to reap timed-out oracle");
    }
}
