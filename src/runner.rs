//! Shell command runner
//!
//! Every step runs as `sh -c <command>`, wrapped in sudo when elevated.
//! With a password, sudo reads it from stdin (`-S`); without one it must
//! not prompt (`-n`). Output is captured on reader threads so a chatty
//! command cannot fill a pipe and stall the timeout loop.
//!
//! Each step leads its own process group. On timeout the whole group is
//! killed, and output readers get a short grace period before whatever
//! they captured is returned.

use planrun::{CommandOutput, CommandRequest, CommandRunner};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long readers may keep draining after a timed-out step was killed
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Runs step commands through the system shell
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self { shell: "sh".into() }
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(&self, request: &CommandRequest<'_>) -> Command {
        let mut cmd = if request.elevated {
            let mut sudo = Command::new("sudo");
            if request.password.is_some() {
                sudo.args(["-S", "-p", ""]);
            } else {
                sudo.arg("-n");
            }
            sudo.arg(&self.shell);
            sudo
        } else {
            Command::new(&self.shell)
        };
        cmd.args(["-c", request.command]);
        cmd.stdin(if request.password.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, request: &CommandRequest<'_>) -> io::Result<CommandOutput> {
        let mut child = self.command(request).spawn()?;

        if let (Some(password), Some(mut stdin)) = (request.password, child.stdin.take()) {
            writeln!(stdin, "{password}")?;
        }

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = wait_with_timeout(&mut child, request.timeout)?;

        // Descendants that escaped the kill may still hold the pipes
        let drain_deadline = status.is_none().then(|| Instant::now() + DRAIN_GRACE);
        let mut output = CommandOutput {
            stdout: stdout.finish(drain_deadline),
            stderr: stderr.finish(drain_deadline),
            ..Default::default()
        };
        match status {
            Some(status) => {
                output.success = status.success();
                output.code = status.code();
            }
            None => {
                log::warn!(
                    "Step {} exceeded {}s, killed",
                    request.step_id,
                    request.timeout.as_secs()
                );
                output.timed_out = true;
            }
        }
        Ok(output)
    }
}

/// Output of one pipe, filled by a reader thread
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl Capture {
    /// Waits for the reader, or only until `deadline` when one is given
    fn finish(self, deadline: Option<Instant>) -> Vec<u8> {
        match deadline {
            None => {
                let _ = self.reader.join();
            }
            Some(deadline) => {
                while !self.reader.is_finished() && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(10));
                }
                if self.reader.is_finished() {
                    let _ = self.reader.join();
                }
            }
        }
        std::mem::take(&mut *self.buf.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Capture {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buf);
    let reader = thread::spawn(move || {
        let Some(mut pipe) = pipe else { return };
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => break,
            }
        }
    });
    Capture { buf, reader }
}

/// `None` when the deadline passed and the child's group was killed
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            kill_group(child);
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill takes no pointers; a negative pid addresses the group led by the child
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

/// Version lists from configured shell commands, one version per line
#[derive(Debug, Clone, Default)]
pub struct CommandVersions {
    sources: BTreeMap<String, String>,
}

impl CommandVersions {
    pub fn new(sources: BTreeMap<String, String>) -> Self {
        Self { sources }
    }
}

impl resolver::VersionProvider for CommandVersions {
    fn versions(&self, tool: &str, source: &str) -> Result<Vec<String>, String> {
        let command = self
            .sources
            .get(source)
            .ok_or_else(|| format!("no version source named '{source}'"))?;
        log::debug!("Fetching versions of {tool} from '{source}'");

        let output = Command::new("sh")
            .args(["-c", command])
            .output()
            .map_err(|e| format!("failed to run version source '{source}': {e}"))?;
        if !output.status.success() {
            return Err(format!(
                "version source '{source}' failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(parse_versions(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_versions(stdout: &str) -> Vec<String> {
    let mut versions: Vec<String> = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !versions.iter().any(|v| v == line) {
            versions.push(line.to_string());
        }
    }
    versions
}
