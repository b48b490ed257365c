//! Password prompt monitoring for self-elevating tools.
//!
//! Tools like AUR helpers call sudo themselves, somewhere in the middle of
//! their run. [`monitor`] polls the combined output of such a process, answers
//! the first password prompt with the secret and collects everything until the
//! process exits or the timeout expires. The same loop drives a local pty and
//! a remote shell channel through the [`PromptStream`] trait.

use crate::error::{Error, Result};
use crate::types::{Secret, TIMEOUT_EXIT_CODE};
use regex::bytes::{Regex, RegexBuilder};
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

/// Default interval between polls when no output is available.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Bytes kept from the previous scan so prompts split across reads still match.
const PROMPT_WINDOW: usize = 32;

static PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"\[sudo\] password|password for|password:")
        .case_insensitive(true)
        .build()
        .expect("prompt pattern is valid")
});

/// A running process whose output can be polled without blocking.
pub trait PromptStream {
    /// Read whatever output is available right now. Returns 0 when nothing is.
    fn poll_output(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write to the process input.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Exit code once the process has finished and its output is complete.
    fn try_exit(&mut self) -> Result<Option<i32>>;

    /// Stop the process.
    fn terminate(&mut self) -> Result<()>;
}

/// Options for [`monitor`].
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Wall-clock limit for the whole run
    pub timeout: Duration,
    /// Sleep between polls when idle
    pub poll_interval: Duration,
}

impl MonitorOptions {
    /// Options with the default poll interval.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What a monitored run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOutcome {
    /// Exit code, or [`TIMEOUT_EXIT_CODE`]
    pub exit_code: i32,
    /// Combined output
    pub output: String,
    /// Whether the timeout expired
    pub timed_out: bool,
    /// How many times the secret was written
    pub secret_writes: usize,
}

/// Drive `stream` to completion, answering one password prompt with `secret`.
///
/// A prompt with no secret available aborts with
/// [`Error::CredentialRequired`]. A second prompt after the secret was sent
/// means it was rejected and aborts with [`Error::CredentialRejected`].
pub fn monitor<S>(
    stream: &mut S,
    secret: Option<&Secret>,
    options: &MonitorOptions,
) -> Result<MonitorOutcome>
where
    S: PromptStream + ?Sized,
{
    let started = Instant::now();
    let mut output: Vec<u8> = Vec::new();
    let mut cursor = 0;
    let mut secret_writes = 0;
    let mut buf = [0u8; 4096];

    loop {
        if started.elapsed() >= options.timeout {
            stop(stream);
            return Ok(MonitorOutcome {
                exit_code: TIMEOUT_EXIT_CODE,
                output: render(&output, secret),
                timed_out: true,
                secret_writes,
            });
        }

        let n = stream.poll_output(&mut buf)?;
        if n > 0 {
            output.extend_from_slice(&buf[..n]);

            // A chunk can carry several prompts, e.g. a retry right after a
            // rejected password
            while let Some(end) = find_prompt(&output, &mut cursor) {
                cursor = end;
                match secret {
                    None => {
                        stop(stream);
                        return Err(Error::CredentialRequired {
                            context: "interactive sudo prompt".to_string(),
                        });
                    }
                    Some(_) if secret_writes > 0 => {
                        stop(stream);
                        return Err(Error::CredentialRejected);
                    }
                    Some(secret) => {
                        log::debug!("Password prompt detected, sending sudo password");
                        stream.send(&secret.line())?;
                        secret_writes += 1;
                    }
                }
            }
            continue;
        }

        if let Some(exit_code) = stream.try_exit()? {
            loop {
                let n = stream.poll_output(&mut buf)?;
                if n == 0 {
                    break;
                }
                output.extend_from_slice(&buf[..n]);
            }
            return Ok(MonitorOutcome {
                exit_code,
                output: render(&output, secret),
                timed_out: false,
                secret_writes,
            });
        }

        thread::sleep(options.poll_interval);
    }
}

/// Search for a prompt after `cursor`. Returns the end offset of a match and
/// otherwise advances `cursor`, keeping a small window for split prompts.
fn find_prompt(output: &[u8], cursor: &mut usize) -> Option<usize> {
    let start = (*cursor).min(output.len());
    match PROMPT.find(&output[start..]) {
        Some(m) => Some(start + m.end()),
        None => {
            *cursor = start.max(output.len().saturating_sub(PROMPT_WINDOW));
            None
        }
    }
}

/// Output as text, with any echo of the secret masked.
fn render(output: &[u8], secret: Option<&Secret>) -> String {
    let text = String::from_utf8_lossy(output);
    match secret {
        Some(secret) => secret.mask(&text),
        None => text.into_owned(),
    }
}

fn stop<S: PromptStream + ?Sized>(stream: &mut S) {
    if let Err(e) = stream.terminate() {
        log::warn!("Failed to stop monitored process: {}", e);
    }
}

/// Scripted stream for tests: replays chunks, then reports an exit code.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::VecDeque;

    pub struct ScriptedStream {
        pub chunks: VecDeque<Vec<u8>>,
        pub exit_code: Option<i32>,
        pub writes: Vec<Vec<u8>>,
        pub terminated: bool,
    }

    impl ScriptedStream {
        pub fn new(chunks: &[&str], exit_code: Option<i32>) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
                exit_code,
                writes: Vec::new(),
                terminated: false,
            }
        }
    }

    impl PromptStream for ScriptedStream {
        fn poll_output(&mut self, buf: &mut [u8]) -> Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }

        fn send(&mut self, data: &[u8]) -> Result<()> {
            self.writes.push(data.to_vec());
            Ok(())
        }

        fn try_exit(&mut self) -> Result<Option<i32>> {
            if self.chunks.is_empty() {
                Ok(self.exit_code)
            } else {
                Ok(None)
            }
        }

        fn terminate(&mut self) -> Result<()> {
            self.terminated = true;
            Ok(())
        }
    }
}
