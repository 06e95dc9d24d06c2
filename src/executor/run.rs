// src/executor/run.rs
//
// Runs one script in an isolated child process. Output is streamed line by
// line as it is produced; stdout and stderr are combined. A non-zero exit is
// a normal negative outcome, not an error; only engine faults (temp file,
// spawn) are errors.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::config::ExecutionConfig;
use crate::state::{ExecutionOutcome, ExitStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long after a timeout kill we keep draining output before giving up
/// on pipes held open by orphaned grandchildren.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

pub struct ScriptEngine {
    interpreter: String,
    suffix: String,
    timeout: Duration,
}

impl ScriptEngine {
    pub fn new(interpreter: &str, suffix: &str, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.to_string(),
            suffix: suffix.to_string(),
            timeout,
        }
    }

    pub fn from_config(cfg: &ExecutionConfig) -> Self {
        Self::new(
            &cfg.interpreter,
            &cfg.script_suffix,
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    /// Write the script to a transient file and spawn the interpreter over
    /// it. The file lives exactly as long as the returned run.
    pub fn start(&self, script: &str) -> Result<RunningScript, String> {
        let temp = TempScript::create(script, &self.suffix)?;

        let mut child = Command::new(&self.interpreter)
            .arg(temp.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {}", self.interpreter, e))?;

        let (tx, rx) = crossbeam_channel::unbounded::<String>();

        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, tx);
        }

        let now = Instant::now();
        Ok(RunningScript {
            child,
            lines: rx,
            started: now,
            deadline: now + self.timeout,
            drain_deadline: None,
            output: String::new(),
            timed_out: false,
            _temp: temp,
        })
    }
}

fn spawn_reader(stream: impl std::io::Read + Send + 'static, tx: Sender<String>) {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

/// One in-flight script run. Dropping it kills the child and removes the
/// temp file, so disconnection mid-run cannot leak either.
pub struct RunningScript {
    child: Child,
    lines: Receiver<String>,
    started: Instant,
    deadline: Instant,
    drain_deadline: Option<Instant>,
    output: String,
    timed_out: bool,
    _temp: TempScript,
}

impl RunningScript {
    /// Lazily yield the next output line. Returns None once the run is over
    /// (pipes closed, or deadline hit and the drain grace expired). Enforces
    /// the timeout: an overdue child is killed here.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            match self.lines.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    self.output.push_str(&line);
                    self.output.push('\n');
                    return Some(line);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !self.timed_out && Instant::now() >= self.deadline {
                        let _ = self.child.kill();
                        self.timed_out = true;
                        self.drain_deadline = Some(Instant::now() + DRAIN_GRACE);
                    }
                    if let Some(drain) = self.drain_deadline {
                        if Instant::now() >= drain {
                            return None;
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Drain remaining output, wait for the child, and produce the outcome.
    pub fn finish(mut self) -> ExecutionOutcome {
        while self.next_line().is_some() {}

        let status = self.wait_child();
        ExecutionOutcome {
            status,
            output: std::mem::take(&mut self.output),
            duration: self.started.elapsed(),
        }
    }

    pub fn kill(&mut self) {
        let _ = self.child.kill();
    }

    fn wait_child(&mut self) -> ExitStatus {
        if self.timed_out {
            let _ = self.child.wait();
            return ExitStatus::Timeout;
        }

        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    return if status.success() {
                        ExitStatus::Success
                    } else {
                        ExitStatus::Failed(status.code().unwrap_or(-1))
                    };
                }
                Ok(None) => {
                    if Instant::now() >= self.deadline {
                        let _ = self.child.kill();
                        let _ = self.child.wait();
                        return ExitStatus::Timeout;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(_) => return ExitStatus::Failed(-1),
            }
        }
    }
}

impl Drop for RunningScript {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Scoped temp-file acquisition: removal happens on every exit path.
struct TempScript {
    path: PathBuf,
}

impl TempScript {
    fn create(script: &str, suffix: &str) -> Result<Self, String> {
        let path = std::env::temp_dir().join(format!(
            "testforge_{}.{}",
            uuid::Uuid::new_v4().simple(),
            suffix
        ));
        fs::write(&path, script).map_err(|e| format!("failed to write temp script: {}", e))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempScript {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
