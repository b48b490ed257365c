//! Executors backed by this machine and by SSH sessions.

use execkit::{Error, Executor, LocalExecutor, RetryConfig};
use fleet::{Backend, TargetSystem};
use sshkit::{Session, SshConnector};
use std::time::Duration;

pub struct SshBackend {
    retry: RetryConfig,
    connect_timeout: Duration,
}

impl SshBackend {
    pub fn new(retry: RetryConfig, connect_timeout: Duration) -> Self {
        Self {
            retry,
            connect_timeout,
        }
    }

    fn connector(&self, system: &TargetSystem) -> Result<SshConnector, Error> {
        let remote = system.remote.as_ref().ok_or_else(|| Error::ConnectionFailed {
            hostname: system.hostname.clone(),
            attempts: 0,
            message: "no ssh credentials configured".to_string(),
        })?;

        Ok(
            SshConnector::new(&system.hostname, remote.port, &remote.user, &remote.key_file)
                .with_connect_timeout(self.connect_timeout),
        )
    }
}

impl Backend for SshBackend {
    fn local(&self) -> Box<dyn Executor> {
        Box::new(LocalExecutor::new())
    }

    fn connect(&self, system: &TargetSystem) -> execkit::Result<Box<dyn Executor>> {
        let mut session = Session::new(self.connector(system)?);
        session.connect(&self.retry)?;
        Ok(Box::new(session))
    }
}
