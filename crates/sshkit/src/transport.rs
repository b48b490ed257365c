//! Transport abstraction.
//!
//! [`Session`](crate::Session) only talks to these traits, so the connection
//! lifecycle and the three execution protocols can be driven by a real SSH
//! library or by a scripted fake.

use execkit::Result;

/// Creates fresh transports to one host.
pub trait Connector {
    /// Transport produced by a successful connection.
    type Transport: Transport;

    /// Host this connector reaches.
    fn hostname(&self) -> &str;

    /// Open a new authenticated transport.
    ///
    /// Connection-class failures should be [`execkit::Error::Connect`], key
    /// and authentication failures [`execkit::Error::Auth`]. Both are
    /// retried by [`crate::Session::connect`].
    fn connect(&self) -> Result<Self::Transport>;
}

/// An established, authenticated connection.
pub trait Transport {
    /// Channel type opened on this transport.
    type Channel: Channel;

    /// Start `command` on a new exec channel, optionally backed by a pty.
    fn exec(&mut self, command: &str, pty: bool) -> Result<Self::Channel>;

    /// Start an interactive login shell on a pty-backed channel.
    fn shell(&mut self) -> Result<Self::Channel>;

    /// Tear the connection down.
    fn disconnect(&mut self) -> Result<()>;
}

/// One running remote command or shell.
///
/// Reads never block: they return 0 when no data is available.
pub trait Channel {
    /// Read available standard output.
    fn read_stdout(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Read available standard error. Pty-backed channels merge it into stdout.
    fn read_stderr(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write to the remote input.
    fn write_input(&mut self, data: &[u8]) -> Result<()>;

    /// Exit status once the remote side finished and sent all of its output.
    fn exit_status(&mut self) -> Result<Option<i32>>;

    /// Close the channel.
    fn close(&mut self) -> Result<()>;
}
