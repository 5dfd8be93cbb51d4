//! Bounded external probes: run a command with a timeout and a cap on how
//! much output is kept.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Output of a finished (or killed) probe.
#[derive(Debug)]
pub struct ProbeOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub timed_out: bool,
}

impl ProbeOutput {
    /// Stdout, but only when the command exited successfully in time.
    pub fn success_stdout(self) -> Option<String> {
        (self.status.success() && !self.timed_out).then_some(self.stdout)
    }
}

/// Run `cmd` with stdin closed, killing it after `timeout`.
///
/// Stdout is drained on a separate thread so a chatty child cannot block on a
/// full pipe; at most `output_limit_bytes` are kept. Stderr is discarded.
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_ms = timeout.as_millis()))]
pub fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<ProbeOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().context("spawn probe")?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let reader = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for probe")? {
        Some(status) => status,
        None => {
            warn!(timeout_ms = timeout.as_millis(), "probe timed out, killing");
            timed_out = true;
            child.kill().context("kill probe")?;
            child.wait().context("wait probe after kill")?
        }
    };

    let bytes = reader
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))??;
    debug!(exit_code = ?status.code(), timed_out, bytes = bytes.len(), "probe finished");
    Ok(ProbeOutput {
        status,
        stdout: String::from_utf8_lossy(&bytes).into_owned(),
        timed_out,
    })
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = reader.read(&mut chunk).context("read probe output")?;
        if n == 0 {
            break;
        }
        let keep = n.min(limit.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..keep]);
    }
    Ok(buf)
}
