//! Local command execution.
//!
//! Commands run through `sh -c`. Most run buffered with stdout and stderr
//! captured separately. Self-elevating tools that will prompt for a password
//! run under a pseudo-terminal so the prompt can be seen and answered.

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::prompt::{self, MonitorOptions, PromptStream};
use crate::types::{CommandResult, Elevation, Invocation, Secret};
use portable_pty::{ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// Interval between `try_wait` polls of a buffered child.
const WAIT_POLL: Duration = Duration::from_millis(20);

/// How long output readers get to finish after the child is gone.
const READER_GRACE: Duration = Duration::from_secs(2);

/// Runs commands on this machine.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    shell: String,
    poll_interval: Duration,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            poll_interval: prompt::DEFAULT_POLL_INTERVAL,
        }
    }
}

impl LocalExecutor {
    /// Executor using `sh`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different shell. It is invoked as `<shell> -c <command>`.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Poll interval for pty-monitored commands.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run a command, choosing the buffered or monitored path from its
    /// elevation.
    pub fn run(&self, invocation: &Invocation, secret: Option<&Secret>) -> Result<CommandResult> {
        log::debug!("Running locally [{}]: {}", invocation.elevation, invocation.command);
        match invocation.elevation {
            Elevation::Direct => self.run_buffered(invocation, None),
            Elevation::PipedSecret => {
                let secret = secret.ok_or_else(|| Error::CredentialRequired {
                    context: format!("`{}` reads the password from stdin", invocation.command),
                })?;
                self.run_buffered(invocation, Some(secret))
            }
            Elevation::Interactive => self.run_monitored(invocation, secret),
        }
    }

    fn run_buffered(
        &self,
        invocation: &Invocation,
        stdin_secret: Option<&Secret>,
    ) -> Result<CommandResult> {
        let started = Instant::now();

        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(&invocation.command)
            .stdin(if stdin_secret.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group so a timeout kills the whole tree
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            command: invocation.command.clone(),
            source,
        })?;

        if let (Some(secret), Some(mut stdin)) = (stdin_secret, child.stdin.take()) {
            // sudo may exit before reading (cached credentials), so a broken
            // pipe here is not a failure
            if let Err(e) = stdin.write_all(&secret.line()) {
                log::debug!("Could not write password to stdin: {}", e);
            }
        }

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if started.elapsed() >= invocation.timeout {
                log::warn!(
                    "Command timed out after {:.1}s: {}",
                    invocation.timeout.as_secs_f64(),
                    invocation.command
                );
                kill_tree(&mut child);
                break None;
            }
            thread::sleep(WAIT_POLL);
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);
        let duration = started.elapsed();

        Ok(match status {
            Some(status) => {
                CommandResult::new(&invocation.command, exit_code(status), stdout, stderr, duration)
            }
            None => CommandResult::timed_out(
                &invocation.command,
                stdout,
                &stderr,
                invocation.timeout,
                duration,
            ),
        })
    }

    fn run_monitored(&self, invocation: &Invocation, secret: Option<&Secret>) -> Result<CommandResult> {
        let started = Instant::now();
        let mut stream = PtyStream::spawn(&self.shell, &invocation.command)?;

        let options = MonitorOptions {
            timeout: invocation.timeout,
            poll_interval: self.poll_interval,
        };
        let outcome = prompt::monitor(&mut stream, secret, &options)?;
        let duration = started.elapsed();

        if outcome.timed_out {
            log::warn!(
                "Command timed out after {:.1}s: {}",
                invocation.timeout.as_secs_f64(),
                invocation.command
            );
            return Ok(CommandResult::timed_out(
                &invocation.command,
                outcome.output,
                "",
                invocation.timeout,
                duration,
            ));
        }

        Ok(CommandResult::new(
            &invocation.command,
            outcome.exit_code,
            outcome.output,
            "",
            duration,
        ))
    }
}

impl Executor for LocalExecutor {
    fn target(&self) -> &str {
        "localhost"
    }

    fn execute(&mut self, invocation: &Invocation, secret: Option<&Secret>) -> Result<CommandResult> {
        self.run(invocation, secret)
    }
}

/// Read a pipe to the end on its own thread.
fn drain<R: Read + Send + 'static>(mut reader: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

fn collect(rx: Option<Receiver<Vec<u8>>>) -> String {
    let Some(rx) = rx else {
        return String::new();
    };
    match rx.recv_timeout(READER_GRACE) {
        Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
        Err(RecvTimeoutError::Timeout) => {
            // A detached grandchild still holds the pipe open
            log::debug!("Output reader did not finish, dropping remaining output");
            String::new()
        }
        Err(RecvTimeoutError::Disconnected) => String::new(),
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let pgid = child.id() as libc::pid_t;
        // SAFETY: kill(2) on the process group created for this child
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// A command running under a pseudo-terminal.
struct PtyStream {
    child: Box<dyn portable_pty::Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    output: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    reader_done: bool,
    exited: Option<(i32, Instant)>,
    // The master must outlive the reader and writer
    _master: Box<dyn MasterPty + Send>,
}

impl PtyStream {
    fn spawn(shell: &str, command_text: &str) -> Result<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 200,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::Pty(e.to_string()))?;

        let mut command = CommandBuilder::new(shell);
        command.arg("-c");
        command.arg(command_text);
        if let Ok(cwd) = std::env::current_dir() {
            command.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| Error::Pty(e.to_string()))?;
        // Only the child keeps the slave side open, so the reader sees EOF on exit
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| Error::Pty(e.to_string()))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| Error::Pty(e.to_string()))?;

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            child,
            writer,
            output: rx,
            pending: Vec::new(),
            reader_done: false,
            exited: None,
            _master: pair.master,
        })
    }
}

impl PromptStream for PtyStream {
    fn poll_output(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pending.is_empty() {
            match self.output.try_recv() {
                Ok(chunk) => self.pending = chunk,
                Err(TryRecvError::Empty) => return Ok(0),
                Err(TryRecvError::Disconnected) => {
                    self.reader_done = true;
                    return Ok(0);
                }
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    fn try_exit(&mut self) -> Result<Option<i32>> {
        if self.exited.is_none()
            && let Some(status) = self.child.try_wait()?
        {
            self.exited = Some((status.exit_code() as i32, Instant::now()));
        }
        Ok(match self.exited {
            // Wait for the reader to hit EOF so no trailing output is lost
            Some((code, at)) if self.reader_done || at.elapsed() >= READER_GRACE => Some(code),
            _ => None,
        })
    }

    fn terminate(&mut self) -> Result<()> {
        if self.exited.is_some() {
            return Ok(());
        }
        self.child.kill()?;
        Ok(())
    }
}

impl Drop for PtyStream {
    fn drop(&mut self) {
        if self.exited.is_none() && matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
        }
        let _ = self.child.try_wait();
    }
}
