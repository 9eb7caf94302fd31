use std::ffi::OsString;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Cap on captured stderr; the rest is drained and dropped.
const STDERR_CAP: u64 = 64 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors from a bounded subprocess run
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} timed out after {}ms", .timeout.as_millis())]
    Timeout { program: String, timeout: Duration },

    #[error("{program} output exceeded {limit} bytes")]
    OutputTooLarge { program: String, limit: usize },

    #[error("{program} failed ({}): {stderr}", describe_exit(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit {}", c),
        None => "killed by signal".to_string(),
    }
}

/// Time and size bounds applied to every subprocess
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub timeout: Duration,
    pub max_output: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_output: 10 * 1024 * 1024,
        }
    }
}

/// A program plus discrete arguments. Never passed through a shell.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    #[cfg(test)]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().to_string()
    }
}

/// Captured output of a process that ran to completion
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Run `spec` to completion within `limits`.
///
/// The child is killed when it outlives the timeout or writes more than
/// `max_output` bytes to stdout. A non-zero exit is not an error here; see
/// [`run_checked`].
pub fn run_bounded(spec: &CommandSpec, limits: Limits) -> Result<ProcessOutput, VcsError> {
    let program = spec.program_name();
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(ref dir) = spec.cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| VcsError::Spawn {
        program: program.clone(),
        source,
    })?;

    let overflow = Arc::new(AtomicBool::new(false));
    let stdout_reader = child.stdout.take().map(|pipe| {
        let overflow = Arc::clone(&overflow);
        let cap = limits.max_output as u64;
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.take(cap + 1).read_to_end(&mut buf);
            if buf.len() as u64 > cap {
                overflow.store(true, Ordering::SeqCst);
            }
            buf
        })
    });
    let stderr_reader = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = (&mut pipe).take(STDERR_CAP).read_to_end(&mut buf);
            let _ = io::copy(&mut pipe, &mut io::sink());
            buf
        })
    });

    let deadline = Instant::now() + limits.timeout;
    let status = loop {
        if overflow.load(Ordering::SeqCst) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(VcsError::OutputTooLarge {
                program,
                limit: limits.max_output,
            });
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                log::warn!("{} killed after {}ms", program, limits.timeout.as_millis());
                return Err(VcsError::Timeout {
                    program,
                    timeout: limits.timeout,
                });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                let _ = child.kill();
                return Err(VcsError::Spawn { program, source });
            }
        }
    };

    let stdout = stdout_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let stderr = stderr_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();

    // The reader may hit the cap after the child already exited
    if stdout.len() > limits.max_output {
        return Err(VcsError::OutputTooLarge {
            program,
            limit: limits.max_output,
        });
    }

    Ok(ProcessOutput {
        stdout,
        stderr,
        exit_code: status.code(),
    })
}

/// Like [`run_bounded`], but a non-zero exit becomes [`VcsError::Failed`].
pub fn run_checked(spec: &CommandSpec, limits: Limits) -> Result<Vec<u8>, VcsError> {
    let output = run_bounded(spec, limits)?;
    if !output.success() {
        return Err(VcsError::Failed {
            program: spec.program_name(),
            code: output.exit_code,
            stderr: output.stderr_string(),
        });
    }
    Ok(output.stdout)
}
