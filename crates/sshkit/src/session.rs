//! Remote session lifecycle and command execution.

use crate::transport::{Channel, Connector, Transport};
use execkit::prompt::{self, MonitorOptions, PromptStream};
use execkit::{
    CommandResult, Elevation, Error, Executor, Invocation, Result, RetryCallback, RetryConfig,
    Secret, with_retry,
};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// Marker echoed back to prove a fresh connection can run commands.
const CANARY: &str = "updall-canary";

/// Upper bound for the canary round-trip.
const CANARY_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport
    Disconnected,
    /// A connect attempt is in progress
    Connecting,
    /// Ready to execute commands
    Connected,
    /// Terminal; the session cannot be reused
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A session with one remote host.
///
/// Commands only run while [`SessionState::Connected`]. [`close`](Self::close)
/// is idempotent and also runs on drop.
pub struct Session<C: Connector> {
    connector: C,
    hostname: String,
    state: SessionState,
    attempts: u32,
    transport: Option<C::Transport>,
    poll_interval: Duration,
}

impl<C: Connector> Session<C> {
    /// Create a disconnected session.
    pub fn new(connector: C) -> Self {
        let hostname = connector.hostname().to_string();
        Self {
            connector,
            hostname,
            state: SessionState::Disconnected,
            attempts: 0,
            transport: None,
            poll_interval: prompt::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Interval between polls of a channel with no pending output.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Remote host name.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Connection attempts made by the last [`connect`](Self::connect).
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Establish the session, retrying every failed attempt.
    pub fn connect(&mut self, retry: &RetryConfig) -> Result<()> {
        self.connect_with_callback(retry, Some(&execkit::LogCallback))
    }

    /// Establish the session with a custom retry callback.
    ///
    /// Every attempt opens a fresh transport and runs an `echo` canary on it.
    /// After the last failed attempt the error is
    /// [`Error::ConnectionFailed`] with the number of attempts made.
    pub fn connect_with_callback(
        &mut self,
        retry: &RetryConfig,
        callback: Option<&dyn RetryCallback>,
    ) -> Result<()> {
        match self.state {
            SessionState::Connected => return Ok(()),
            SessionState::Closed => return Err(Error::NotConnected(self.hostname.clone())),
            _ => {}
        }

        self.state = SessionState::Connecting;
        self.attempts = 0;

        let connector = &self.connector;
        let hostname = &self.hostname;
        let attempts = &mut self.attempts;
        let poll_interval = self.poll_interval;

        let result = with_retry(retry, callback, || {
            *attempts += 1;
            log::debug!("Connecting to {} (attempt {})", hostname, *attempts);

            let mut transport = connector.connect()?;
            if let Err(e) = canary(&mut transport, hostname, poll_interval) {
                if let Err(e) = transport.disconnect() {
                    log::debug!("Disconnect after failed canary: {}", e);
                }
                return Err(e);
            }
            Ok(transport)
        });

        match result {
            Ok(transport) => {
                log::info!("Connected to {}", self.hostname);
                self.transport = Some(transport);
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                Err(Error::ConnectionFailed {
                    hostname: self.hostname.clone(),
                    attempts: self.attempts,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Whether the connection still answers the canary.
    pub fn is_alive(&mut self) -> bool {
        let poll_interval = self.poll_interval;
        match (self.state, self.transport.as_mut()) {
            (SessionState::Connected, Some(transport)) => {
                canary(transport, &self.hostname, poll_interval).is_ok()
            }
            _ => false,
        }
    }

    /// Run one command on the remote host.
    ///
    /// `Direct` commands use a plain exec channel. `PipedSecret` commands use a
    /// pty-backed exec channel and get the secret written once up front.
    /// `Interactive` commands run in a login shell watched for password
    /// prompts. All three honor the invocation's wall-clock timeout.
    pub fn execute(
        &mut self,
        invocation: &Invocation,
        secret: Option<&Secret>,
    ) -> Result<CommandResult> {
        let transport = match (self.state, self.transport.as_mut()) {
            (SessionState::Connected, Some(transport)) => transport,
            _ => return Err(Error::NotConnected(self.hostname.clone())),
        };

        log::debug!(
            "Running on {} [{}]: {}",
            self.hostname,
            invocation.elevation,
            invocation.command
        );

        let started = Instant::now();
        match invocation.elevation {
            Elevation::Direct => {
                let mut channel = transport.exec(&invocation.command, false)?;
                run_to_completion(&mut channel, invocation, None, started, self.poll_interval)
            }
            Elevation::PipedSecret => {
                let secret = secret.ok_or_else(|| Error::CredentialRequired {
                    context: format!("`{}` reads the password from stdin", invocation.command),
                })?;
                let mut channel = transport.exec(&invocation.command, true)?;
                if let Err(e) = channel.write_input(&secret.line()) {
                    close_channel(&mut channel);
                    return Err(e);
                }
                run_to_completion(
                    &mut channel,
                    invocation,
                    Some(secret),
                    started,
                    self.poll_interval,
                )
            }
            Elevation::Interactive => {
                let mut channel = transport.shell()?;
                let result = run_in_shell(&mut channel, invocation, secret, started, self.poll_interval);
                close_channel(&mut channel);
                result
            }
        }
    }

    /// Close the session. Safe to call any number of times.
    pub fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;

        if let Some(mut transport) = self.transport.take() {
            log::debug!("Closing session to {}", self.hostname);
            transport.disconnect()?;
        }
        Ok(())
    }
}

impl<C: Connector> Executor for Session<C> {
    fn target(&self) -> &str {
        &self.hostname
    }

    fn execute(
        &mut self,
        invocation: &Invocation,
        secret: Option<&Secret>,
    ) -> Result<CommandResult> {
        Session::execute(self, invocation, secret)
    }

    fn close(&mut self) -> Result<()> {
        Session::close(self)
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to close session to {}: {}", self.hostname, e);
        }
    }
}

impl<C: Connector> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("hostname", &self.hostname)
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

fn canary<T: Transport>(transport: &mut T, hostname: &str, poll_interval: Duration) -> Result<()> {
    let as_connect = |e: Error| Error::Connect {
        hostname: hostname.to_string(),
        message: e.to_string(),
    };

    let mut channel = transport.exec(&format!("echo {CANARY}"), false).map_err(as_connect)?;
    let drained = drain(&mut channel, Instant::now() + CANARY_TIMEOUT, poll_interval);
    close_channel(&mut channel);
    let drained = drained.map_err(as_connect)?;

    if drained.exit_code == Some(0) && String::from_utf8_lossy(&drained.stdout).trim() == CANARY {
        Ok(())
    } else {
        Err(Error::Connect {
            hostname: hostname.to_string(),
            message: "connection test failed".to_string(),
        })
    }
}

/// Output collected from a channel until exit or deadline.
struct Drained {
    exit_code: Option<i32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Read both streams until the remote side exits or `deadline` passes.
fn drain<Ch: Channel>(channel: &mut Ch, deadline: Instant, poll_interval: Duration) -> Result<Drained> {
    let mut drained = Drained {
        exit_code: None,
        stdout: Vec::new(),
        stderr: Vec::new(),
    };
    let mut buf = [0u8; 8192];

    loop {
        let progressed = read_available(channel, &mut buf, &mut drained)?;

        if Instant::now() >= deadline {
            return Ok(drained);
        }
        if progressed {
            continue;
        }

        if let Some(code) = channel.exit_status()? {
            while read_available(channel, &mut buf, &mut drained)? {}
            drained.exit_code = Some(code);
            return Ok(drained);
        }

        thread::sleep(poll_interval);
    }
}

fn read_available<Ch: Channel>(channel: &mut Ch, buf: &mut [u8], drained: &mut Drained) -> Result<bool> {
    let mut progressed = false;

    let n = channel.read_stdout(buf)?;
    if n > 0 {
        drained.stdout.extend_from_slice(&buf[..n]);
        progressed = true;
    }

    let n = channel.read_stderr(buf)?;
    if n > 0 {
        drained.stderr.extend_from_slice(&buf[..n]);
        progressed = true;
    }

    Ok(progressed)
}

fn run_to_completion<Ch: Channel>(
    channel: &mut Ch,
    invocation: &Invocation,
    secret: Option<&Secret>,
    started: Instant,
    poll_interval: Duration,
) -> Result<CommandResult> {
    let drained = drain(channel, started + invocation.timeout, poll_interval);
    close_channel(channel);
    let drained = drained?;

    let text = |bytes: &[u8]| {
        let text = String::from_utf8_lossy(bytes);
        match secret {
            Some(secret) => secret.mask(&text),
            None => text.into_owned(),
        }
    };
    let stdout = text(&drained.stdout);
    let stderr = text(&drained.stderr);
    let duration = started.elapsed();

    Ok(match drained.exit_code {
        Some(code) => CommandResult::new(&invocation.command, code, stdout, stderr, duration),
        None => {
            log::warn!(
                "Command timed out after {:.1}s: {}",
                invocation.timeout.as_secs_f64(),
                invocation.command
            );
            CommandResult::timed_out(&invocation.command, stdout, &stderr, invocation.timeout, duration)
        }
    })
}

fn run_in_shell<Ch: Channel>(
    channel: &mut Ch,
    invocation: &Invocation,
    secret: Option<&Secret>,
    started: Instant,
    poll_interval: Duration,
) -> Result<CommandResult> {
    // The shell exits with the command's status, closing the channel
    channel.write_input(format!("{}; exit $?\n", invocation.command).as_bytes())?;

    let options = MonitorOptions {
        timeout: invocation.timeout.saturating_sub(started.elapsed()),
        poll_interval,
    };
    let outcome = prompt::monitor(&mut ShellStream { channel }, secret, &options)?;
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

fn close_channel<Ch: Channel>(channel: &mut Ch) {
    if let Err(e) = channel.close() {
        log::debug!("Failed to close channel: {}", e);
    }
}

/// Adapts a shell channel to the prompt monitor.
struct ShellStream<'a, Ch: Channel> {
    channel: &'a mut Ch,
}

impl<Ch: Channel> PromptStream for ShellStream<'_, Ch> {
    fn poll_output(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.channel.read_stdout(buf)? {
            0 => self.channel.read_stderr(buf),
            n => Ok(n),
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.channel.write_input(data)
    }

    fn try_exit(&mut self) -> Result<Option<i32>> {
        self.channel.exit_status()
    }

    fn terminate(&mut self) -> Result<()> {
        self.channel.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use execkit::TIMEOUT_EXIT_CODE;
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Script {
        stdout: Vec<&'static str>,
        stderr: Vec<&'static str>,
        exit_code: Option<i32>,
    }

    impl Script {
        fn exits(code: i32, stdout: &[&'static str]) -> Self {
            Self {
                stdout: stdout.to_vec(),
                stderr: Vec::new(),
                exit_code: Some(code),
            }
        }

        fn hangs() -> Self {
            Self::default()
        }
    }

    #[derive(Default)]
    struct Remote {
        fail_first: u32,
        auth_failure: bool,
        connects: u32,
        disconnects: u32,
        scripts: HashMap<String, Script>,
        shell: Option<Script>,
        executed: Vec<(String, bool)>,
        writes: Vec<Vec<u8>>,
        channels_closed: u32,
    }

    type Shared = Rc<RefCell<Remote>>;

    struct FakeConnector(Shared);

    impl Connector for FakeConnector {
        type Transport = FakeTransport;

        fn hostname(&self) -> &str {
            "edge01"
        }

        fn connect(&self) -> Result<FakeTransport> {
            let mut remote = self.0.borrow_mut();
            remote.connects += 1;
            if remote.auth_failure {
                return Err(Error::Auth {
                    hostname: "edge01".to_string(),
                    message: "publickey rejected".to_string(),
                });
            }
            if remote.connects <= remote.fail_first {
                return Err(Error::Connect {
                    hostname: "edge01".to_string(),
                    message: "Connection refused".to_string(),
                });
            }
            Ok(FakeTransport(self.0.clone()))
        }
    }

    struct FakeTransport(Shared);

    impl Transport for FakeTransport {
        type Channel = FakeChannel;

        fn exec(&mut self, command: &str, pty: bool) -> Result<FakeChannel> {
            let mut remote = self.0.borrow_mut();
            remote.executed.push((command.to_string(), pty));
            let script = match remote.scripts.get(command) {
                Some(script) => script.clone(),
                None if command == format!("echo {CANARY}") => {
                    Script::exits(0, &["updall-canary\n"])
                }
                None => Script::exits(0, &[]),
            };
            Ok(FakeChannel::new(script, self.0.clone()))
        }

        fn shell(&mut self) -> Result<FakeChannel> {
            let script = self.0.borrow().shell.clone().unwrap_or_default();
            Ok(FakeChannel::new(script, self.0.clone()))
        }

        fn disconnect(&mut self) -> Result<()> {
            self.0.borrow_mut().disconnects += 1;
            Ok(())
        }
    }

    struct FakeChannel {
        stdout: VecDeque<&'static str>,
        stderr: VecDeque<&'static str>,
        exit_code: Option<i32>,
        remote: Shared,
    }

    impl FakeChannel {
        fn new(script: Script, remote: Shared) -> Self {
            Self {
                stdout: script.stdout.into(),
                stderr: script.stderr.into(),
                exit_code: script.exit_code,
                remote,
            }
        }
    }

    fn pop(queue: &mut VecDeque<&'static str>, buf: &mut [u8]) -> usize {
        match queue.pop_front() {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(chunk.as_bytes());
                chunk.len()
            }
            None => 0,
        }
    }

    impl Channel for FakeChannel {
        fn read_stdout(&mut self, buf: &mut [u8]) -> Result<usize> {
            Ok(pop(&mut self.stdout, buf))
        }

        fn read_stderr(&mut self, buf: &mut [u8]) -> Result<usize> {
            Ok(pop(&mut self.stderr, buf))
        }

        fn write_input(&mut self, data: &[u8]) -> Result<()> {
            self.remote.borrow_mut().writes.push(data.to_vec());
            Ok(())
        }

        fn exit_status(&mut self) -> Result<Option<i32>> {
            if self.stdout.is_empty() && self.stderr.is_empty() {
                Ok(self.exit_code)
            } else {
                Ok(None)
            }
        }

        fn close(&mut self) -> Result<()> {
            self.remote.borrow_mut().channels_closed += 1;
            Ok(())
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(20),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(20),
        }
    }

    fn session(remote: &Shared) -> Session<FakeConnector> {
        Session::new(FakeConnector(remote.clone())).with_poll_interval(Duration::from_millis(1))
    }

    fn connected(remote: &Shared) -> Session<FakeConnector> {
        let mut session = session(remote);
        session.connect(&RetryConfig::no_retry()).unwrap();
        session
    }

    fn invocation(command: &str, elevation: Elevation) -> Invocation {
        Invocation::new(command, elevation, Duration::from_secs(5))
    }

    #[test]
    fn test_connect_runs_canary() {
        let remote = Shared::default();
        let session = connected(&remote);

        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.attempts(), 1);
        assert_eq!(remote.borrow().executed[0].0, "echo updall-canary");
    }

    #[test]
    fn test_connect_exhausts_attempts() {
        let remote = Shared::default();
        remote.borrow_mut().fail_first = 10;
        let mut session = session(&remote);
        let started = Instant::now();

        let err = session.connect(&fast_retry(3)).unwrap_err();

        match err {
            Error::ConnectionFailed { attempts, ref hostname, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(hostname, "edge01");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("connect"));
        assert_eq!(remote.borrow().connects, 3);
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_connect_eventually_succeeds() {
        let remote = Shared::default();
        remote.borrow_mut().fail_first = 2;
        let mut session = session(&remote);

        session.connect(&fast_retry(3)).unwrap();

        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.attempts(), 3);
    }

    #[test]
    fn test_auth_failure_retried_until_exhausted() {
        let remote = Shared::default();
        remote.borrow_mut().auth_failure = true;
        let mut session = session(&remote);

        let err = session.connect(&fast_retry(3)).unwrap_err();

        assert!(matches!(err, Error::ConnectionFailed { attempts: 3, .. }));
        assert!(err.to_string().contains("publickey rejected"));
        assert_eq!(remote.borrow().connects, 3);
        assert_eq!(session.attempts(), 3);
    }

    #[test]
    fn test_failed_canary_retried_and_disconnected() {
        let remote = Shared::default();
        remote
            .borrow_mut()
            .scripts
            .insert(format!("echo {CANARY}"), Script::exits(0, &["garbage\n"]));
        let mut session = session(&remote);

        let err = session.connect(&fast_retry(2)).unwrap_err();

        assert!(matches!(err, Error::ConnectionFailed { attempts: 2, .. }));
        assert_eq!(remote.borrow().disconnects, 2);
    }

    #[test]
    fn test_execute_before_connect() {
        let remote = Shared::default();
        let mut session = session(&remote);

        let err = session.execute(&invocation("uptime", Elevation::Direct), None).unwrap_err();
        assert!(matches!(err, Error::NotConnected(_)));
    }

    #[test]
    fn test_double_close_is_noop() {
        let remote = Shared::default();
        let mut session = connected(&remote);

        session.close().unwrap();
        session.close().unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(remote.borrow().disconnects, 1);

        let err = session.execute(&invocation("uptime", Elevation::Direct), None).unwrap_err();
        assert!(matches!(err, Error::NotConnected(_)));
    }

    #[test]
    fn test_close_without_connect() {
        let remote = Shared::default();
        let mut session = session(&remote);

        session.close().unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(remote.borrow().disconnects, 0);
        assert!(session.connect(&RetryConfig::no_retry()).is_err());
    }

    #[test]
    fn test_drop_closes() {
        let remote = Shared::default();
        {
            let _session = connected(&remote);
        }
        assert_eq!(remote.borrow().disconnects, 1);
    }

    #[test]
    fn test_simple_execute() {
        let remote = Shared::default();
        remote.borrow_mut().scripts.insert(
            "rustup update".to_string(),
            Script {
                stdout: vec!["info: syncing channel updates\n", "stable unchanged\n"],
                stderr: vec!["warning: self-update disabled\n"],
                exit_code: Some(0),
            },
        );
        let mut session = connected(&remote);

        let result = session
            .execute(&invocation("rustup update", Elevation::Direct), None)
            .unwrap();

        assert!(result.success());
        assert!(result.stdout().contains("stable unchanged"));
        assert!(result.stderr().contains("self-update"));
        assert_eq!(remote.borrow().executed[1], ("rustup update".to_string(), false));
    }

    #[test]
    fn test_nonzero_exit_recorded() {
        let remote = Shared::default();
        remote
            .borrow_mut()
            .scripts
            .insert("npm update -g".to_string(), Script::exits(127, &[]));
        let mut session = connected(&remote);

        let result = session
            .execute(&invocation("npm update -g", Elevation::Direct), None)
            .unwrap();

        assert_eq!(result.exit_code(), 127);
        assert!(!result.success());
    }

    #[test]
    fn test_piped_secret_written_once() {
        let command = "sudo -S -p '' apt update";
        let remote = Shared::default();
        remote
            .borrow_mut()
            .scripts
            .insert(command.to_string(), Script::exits(0, &["hunter2\r\n", "Reading package lists...\r\n"]));
        let mut session = connected(&remote);
        let secret = Secret::new("hunter2");

        let result = session
            .execute(&invocation(command, Elevation::PipedSecret), Some(&secret))
            .unwrap();

        assert!(result.success());
        assert!(!result.stdout().contains("hunter2"));
        let remote = remote.borrow();
        assert_eq!(remote.writes, vec![b"hunter2\n".to_vec()]);
        assert_eq!(remote.executed[1], (command.to_string(), true));
    }

    #[test]
    fn test_piped_without_secret() {
        let remote = Shared::default();
        let mut session = connected(&remote);

        let err = session
            .execute(&invocation("sudo -S -p '' apt update", Elevation::PipedSecret), None)
            .unwrap_err();
        assert!(matches!(err, Error::CredentialRequired { .. }));
    }

    #[test]
    fn test_simple_timeout() {
        let remote = Shared::default();
        remote
            .borrow_mut()
            .scripts
            .insert("sleep 600".to_string(), Script::hangs());
        let mut session = connected(&remote);
        let closed_before = remote.borrow().channels_closed;

        let result = session
            .execute(
                &Invocation::new("sleep 600", Elevation::Direct, Duration::from_millis(50)),
                None,
            )
            .unwrap();

        assert_eq!(result.exit_code(), TIMEOUT_EXIT_CODE);
        assert!(!result.stderr().is_empty());
        assert_eq!(remote.borrow().channels_closed, closed_before + 1);
    }

    #[test]
    fn test_interactive_prompt_answered() {
        let remote = Shared::default();
        remote.borrow_mut().shell = Some(Script::exits(
            0,
            &[
                "$ paru -Syu --noconfirm; exit $?\r\n",
                ":: Synchronizing package databases...\r\n",
                "[sudo] password for alice: ",
                "\r\n:: Starting full system upgrade...\r\n",
            ],
        ));
        let mut session = connected(&remote);
        let secret = Secret::new("hunter2");

        let result = session
            .execute(
                &invocation("paru -Syu --noconfirm", Elevation::Interactive),
                Some(&secret),
            )
            .unwrap();

        assert!(result.success());
        assert!(result.stdout().contains("full system upgrade"));
        let remote = remote.borrow();
        assert_eq!(remote.writes.len(), 2);
        assert_eq!(remote.writes[0], b"paru -Syu --noconfirm; exit $?\n".to_vec());
        assert_eq!(remote.writes[1], b"hunter2\n".to_vec());
    }

    #[test]
    fn test_interactive_exit_status_propagated() {
        let remote = Shared::default();
        remote.borrow_mut().shell = Some(Script::exits(1, &["error: target not found\r\n"]));
        let mut session = connected(&remote);
        let secret = Secret::new("hunter2");

        let result = session
            .execute(&invocation("paru -Sua --noconfirm", Elevation::Interactive), Some(&secret))
            .unwrap();

        assert_eq!(result.exit_code(), 1);
        assert_eq!(remote.borrow().writes.len(), 1);
    }

    #[test]
    fn test_interactive_timeout() {
        let remote = Shared::default();
        remote.borrow_mut().shell = Some(Script::hangs());
        let mut session = connected(&remote);
        let started = Instant::now();

        let result = session
            .execute(
                &Invocation::new("paru -Syu", Elevation::Interactive, Duration::from_millis(50)),
                Some(&Secret::new("pw")),
            )
            .unwrap();

        assert!(result.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_interactive_prompt_without_secret() {
        let remote = Shared::default();
        remote.borrow_mut().shell = Some(Script::exits(1, &["[sudo] password for alice: "]));
        let mut session = connected(&remote);

        let err = session
            .execute(&invocation("paru -Syu", Elevation::Interactive), None)
            .unwrap_err();

        assert!(matches!(err, Error::CredentialRequired { .. }));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_is_alive() {
        let remote = Shared::default();
        let mut session = session(&remote);
        assert!(!session.is_alive());

        session.connect(&RetryConfig::no_retry()).unwrap();
        assert!(session.is_alive());
    }
}
