//! Runs every update type of one system.
//!
//! Failures are contained at the smallest scope possible: a failed command
//! does not stop its update type, a failed update type does not stop the
//! system, and an unreachable system only produces a connection error.

use crate::capability::CapabilityProvider;
use crate::observer::{NoObserver, RunObserver};
use crate::result::{SystemResult, UpdateTypeResult};
use crate::system::{Locality, TargetSystem};
use execkit::{CommandResult, CommandSpec, Executor, Invocation, Result, privilege};
use std::time::{Duration, Instant};

/// Default per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3600);

/// Provides executors for systems.
pub trait Backend {
    /// Executor for this machine.
    fn local(&self) -> Box<dyn Executor>;

    /// Connected executor for a remote system.
    ///
    /// Errors here mean the system is unreachable.
    fn connect(&self, system: &TargetSystem) -> Result<Box<dyn Executor>>;
}

/// A finalized command in a dry-run plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedCommand {
    /// Would run as shown
    Ready(Invocation),
    /// Could not be prepared
    Blocked {
        /// Original command text
        command: String,
        /// Why it could not be prepared
        reason: String,
    },
}

/// Dry-run plan for one update type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpdate {
    /// Update type id
    pub update_type: String,
    /// Commands, or the lookup error
    pub commands: std::result::Result<Vec<PlannedCommand>, String>,
}

/// Sequences update types over one executor per system.
pub struct Orchestrator<B: Backend> {
    backend: B,
    command_timeout: Duration,
    observer: Box<dyn RunObserver>,
}

impl<B: Backend> Orchestrator<B> {
    /// Create an orchestrator with the default timeout and no observer.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            observer: Box::new(NoObserver),
        }
    }

    /// Set the per-command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the lifecycle observer.
    pub fn with_observer(mut self, observer: Box<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run all update types of `system`.
    ///
    /// The executor is closed on every path once it was obtained.
    pub fn run(&mut self, system: &TargetSystem, capabilities: &dyn CapabilityProvider) -> SystemResult {
        let started = Instant::now();
        self.observer.on_system_start(system);

        let mut executor = match system.locality() {
            Locality::Local => self.backend.local(),
            Locality::Remote => match self.backend.connect(system) {
                Ok(executor) => executor,
                Err(e) => {
                    let result = SystemResult::connection_error(e.to_string());
                    self.observer.on_system_complete(system, &result, started.elapsed());
                    return result;
                }
            },
        };

        let mut updates = Vec::with_capacity(system.update_types.len());
        for update_type in &system.update_types {
            self.observer.on_update_type_start(update_type);
            let result = self.run_update_type(executor.as_mut(), system, update_type, capabilities);
            self.observer.on_update_type_complete(update_type, &result);
            updates.push((update_type.clone(), result));
        }

        if let Err(e) = executor.close() {
            log::warn!("Cleanup for {} failed: {}", system.name, e);
        }

        let result = SystemResult::Completed(updates);
        self.observer.on_system_complete(system, &result, started.elapsed());
        result
    }

    /// Finalized commands per update type, without executing anything.
    pub fn plan(&self, system: &TargetSystem, capabilities: &dyn CapabilityProvider) -> Vec<PlannedUpdate> {
        system
            .update_types
            .iter()
            .map(|update_type| PlannedUpdate {
                update_type: update_type.clone(),
                commands: capabilities
                    .lookup(update_type)
                    .map(|specs| specs.iter().map(|spec| self.plan_command(system, spec)).collect())
                    .map_err(|e| e.to_string()),
            })
            .collect()
    }

    fn plan_command(&self, system: &TargetSystem, spec: &CommandSpec) -> PlannedCommand {
        match privilege::prepare(spec, &system.sudo, self.command_timeout) {
            Ok(invocation) => PlannedCommand::Ready(invocation),
            Err(e) => PlannedCommand::Blocked {
                command: spec.command.clone(),
                reason: e.to_string(),
            },
        }
    }

    fn run_update_type(
        &mut self,
        executor: &mut dyn Executor,
        system: &TargetSystem,
        update_type: &str,
        capabilities: &dyn CapabilityProvider,
    ) -> UpdateTypeResult {
        let specs = match capabilities.lookup(update_type) {
            Ok(specs) => specs,
            Err(e) => {
                log::error!("{}: {}", system.name, e);
                return UpdateTypeResult::error(e.to_string());
            }
        };

        let mut commands = Vec::with_capacity(specs.len());
        for spec in &specs {
            commands.push(self.run_command(executor, system, spec));
        }
        UpdateTypeResult::from_commands(commands)
    }

    fn run_command(
        &mut self,
        executor: &mut dyn Executor,
        system: &TargetSystem,
        spec: &CommandSpec,
    ) -> CommandResult {
        let started = Instant::now();

        let result = match privilege::prepare(spec, &system.sudo, self.command_timeout) {
            Ok(invocation) => {
                self.observer.on_command_start(&invocation);
                executor
                    .execute(&invocation, system.sudo.secret.as_ref())
                    .unwrap_or_else(|e| {
                        CommandResult::from_error(&invocation.command, &e, started.elapsed())
                    })
            }
            Err(e) => CommandResult::from_error(&spec.command, &e, started.elapsed()),
        };

        self.observer.on_command_complete(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityTable, NODE, RUST, SYSTEM_PACKAGES};
    use crate::result::UpdateStatus;
    use crate::system::Flavor;
    use execkit::{Elevation, Error, Secret, SudoConfig};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        executed: Vec<Invocation>,
        secrets: Vec<Option<String>>,
        closes: u32,
        connects: u32,
        events: Vec<String>,
    }

    type Shared = Rc<RefCell<Recorder>>;

    /// Exit codes per command; unknown commands exit 0.
    struct ScriptedExecutor {
        exits: HashMap<String, std::result::Result<i32, String>>,
        recorder: Shared,
    }

    impl Executor for ScriptedExecutor {
        fn target(&self) -> &str {
            "scripted"
        }

        fn execute(&mut self, invocation: &Invocation, secret: Option<&Secret>) -> Result<CommandResult> {
            {
                let mut recorder = self.recorder.borrow_mut();
                recorder.executed.push(invocation.clone());
                recorder.secrets.push(secret.map(|s| s.expose().to_string()));
            }
            match self.exits.get(&invocation.command) {
                Some(Err(message)) => Err(Error::Transport(message.clone())),
                Some(Ok(code)) => Ok(CommandResult::new(&invocation.command, *code, "", "", Duration::ZERO)),
                None => Ok(CommandResult::new(&invocation.command, 0, "ok", "", Duration::ZERO)),
            }
        }

        fn close(&mut self) -> Result<()> {
            self.recorder.borrow_mut().closes += 1;
            Ok(())
        }
    }

    struct FakeBackend {
        exits: HashMap<String, std::result::Result<i32, String>>,
        unreachable: bool,
        recorder: Shared,
    }

    impl FakeBackend {
        fn new(recorder: &Shared) -> Self {
            Self {
                exits: HashMap::new(),
                unreachable: false,
                recorder: recorder.clone(),
            }
        }

        fn exit(mut self, command: &str, code: i32) -> Self {
            self.exits.insert(command.to_string(), Ok(code));
            self
        }

        fn broken(mut self, command: &str) -> Self {
            self.exits.insert(command.to_string(), Err("channel closed".to_string()));
            self
        }

        fn executor(&self) -> Box<dyn Executor> {
            Box::new(ScriptedExecutor {
                exits: self.exits.clone(),
                recorder: self.recorder.clone(),
            })
        }
    }

    impl Backend for FakeBackend {
        fn local(&self) -> Box<dyn Executor> {
            self.executor()
        }

        fn connect(&self, system: &TargetSystem) -> Result<Box<dyn Executor>> {
            self.recorder.borrow_mut().connects += 1;
            if self.unreachable {
                return Err(Error::ConnectionFailed {
                    hostname: system.hostname.clone(),
                    attempts: 3,
                    message: "Connection refused".to_string(),
                });
            }
            Ok(self.executor())
        }
    }

    struct EventObserver(Shared);

    impl RunObserver for EventObserver {
        fn on_system_start(&mut self, system: &TargetSystem) {
            self.0.borrow_mut().events.push(format!("system:{}", system.name));
        }
        fn on_update_type_start(&mut self, update_type: &str) {
            self.0.borrow_mut().events.push(format!("type:{update_type}"));
        }
        fn on_command_start(&mut self, invocation: &Invocation) {
            self.0.borrow_mut().events.push(format!("cmd:{}", invocation.command));
        }
        fn on_command_complete(&mut self, result: &CommandResult) {
            self.0.borrow_mut().events.push(format!("done:{}", result.exit_code()));
        }
        fn on_update_type_complete(&mut self, update_type: &str, result: &UpdateTypeResult) {
            self.0.borrow_mut().events.push(format!("type-done:{update_type}:{}", result.status()));
        }
        fn on_system_complete(&mut self, system: &TargetSystem, _result: &SystemResult, _duration: Duration) {
            self.0.borrow_mut().events.push(format!("system-done:{}", system.name));
        }
    }

    fn build_box() -> TargetSystem {
        TargetSystem::new("build-box", "localhost", Flavor::Debian)
            .with_sudo(SudoConfig::nopasswd())
            .with_update_types([SYSTEM_PACKAGES])
    }

    fn edge01() -> TargetSystem {
        TargetSystem::new("edge01", "edge01.example.invalid", Flavor::Debian)
            .with_sudo(SudoConfig::nopasswd())
            .with_update_types([SYSTEM_PACKAGES, RUST])
    }

    #[test]
    fn test_local_nopasswd_success() {
        let recorder = Shared::default();
        let mut orchestrator = Orchestrator::new(FakeBackend::new(&recorder));
        let table = CapabilityTable::for_flavor(Flavor::Debian);

        let result = orchestrator.run(&build_box(), &table);

        let packages = result.get(SYSTEM_PACKAGES).unwrap();
        assert_eq!(packages.status(), UpdateStatus::Success);
        assert!(packages.success());
        assert!(result.success());

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["system_packages"]["status"], "success");
        assert_eq!(value["system_packages"]["success"], true);

        let recorder = recorder.borrow();
        assert_eq!(recorder.connects, 0);
        assert_eq!(recorder.closes, 1);
        assert_eq!(recorder.executed[0].command, "sudo -n apt update");
        assert_eq!(recorder.executed.len(), 4);
    }

    #[test]
    fn test_unreachable_remote() {
        let recorder = Shared::default();
        let mut backend = FakeBackend::new(&recorder);
        backend.unreachable = true;
        let mut orchestrator = Orchestrator::new(backend);
        let table = CapabilityTable::for_flavor(Flavor::Debian);

        let result = orchestrator.run(&edge01(), &table);

        let message = result.connection_error_message().unwrap();
        assert!(message.contains("connect"));
        assert!(result.updates().is_empty());

        let value = serde_json::to_value(&result).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["connection_error"]);
        assert!(recorder.borrow().executed.is_empty());
    }

    #[test]
    fn test_failing_type_does_not_stop_others() {
        let recorder = Shared::default();
        let mut orchestrator = Orchestrator::new(FakeBackend::new(&recorder));
        let table = CapabilityTable::for_flavor(Flavor::Debian);
        let system = TargetSystem::new("laptop", "localhost", Flavor::Debian)
            .with_sudo(SudoConfig::nopasswd())
            .with_update_types([RUST, "flatpak", NODE]);

        let result = orchestrator.run(&system, &table);

        let types: Vec<_> = result.updates().iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(types, [RUST, "flatpak", NODE]);
        assert_eq!(result.get(RUST).unwrap().status(), UpdateStatus::Success);
        assert_eq!(result.get("flatpak").unwrap().status(), UpdateStatus::Error);
        assert_eq!(result.get(NODE).unwrap().status(), UpdateStatus::Success);
        assert!(!result.success());
        assert_eq!(recorder.borrow().closes, 1);
    }

    #[test]
    fn test_failed_command_does_not_stop_type() {
        let recorder = Shared::default();
        let backend = FakeBackend::new(&recorder)
            .exit("sudo -n apt update", 100)
            .broken("sudo -n apt upgrade -y");
        let mut orchestrator = Orchestrator::new(backend);
        let table = CapabilityTable::for_flavor(Flavor::Debian);

        let result = orchestrator.run(&build_box(), &table);

        let packages = result.get(SYSTEM_PACKAGES).unwrap();
        assert_eq!(packages.status(), UpdateStatus::Failed);
        assert_eq!(packages.commands().len(), 4);
        assert_eq!(packages.commands()[0].exit_code(), 100);
        assert!(!packages.commands()[1].success());
        assert!(packages.commands()[1].stderr().contains("channel closed"));
        assert!(packages.commands()[2].success());
        assert_eq!(recorder.borrow().executed.len(), 4);
    }

    #[test]
    fn test_missing_secret_recorded_not_thrown() {
        let recorder = Shared::default();
        let mut orchestrator = Orchestrator::new(FakeBackend::new(&recorder));
        let table = CapabilityTable::for_flavor(Flavor::Debian);
        let system = build_box()
            .with_sudo(SudoConfig::password(None))
            .with_update_types([SYSTEM_PACKAGES, RUST]);

        let result = orchestrator.run(&system, &table);

        let packages = result.get(SYSTEM_PACKAGES).unwrap();
        assert_eq!(packages.status(), UpdateStatus::Failed);
        assert_eq!(packages.commands().len(), 4);
        assert!(packages.commands().iter().all(|c| c.stderr().contains("password")));
        assert!(result.get(RUST).unwrap().success());

        // Only the user-level commands reached the executor
        let recorder = recorder.borrow();
        assert_eq!(recorder.executed.len(), 2);
        assert!(recorder.executed.iter().all(|i| !i.command.starts_with("sudo")));
    }

    #[test]
    fn test_secret_passed_to_executor() {
        let recorder = Shared::default();
        let mut orchestrator = Orchestrator::new(FakeBackend::new(&recorder));
        let table = CapabilityTable::for_flavor(Flavor::Arch);
        let system = TargetSystem::new("laptop", "localhost", Flavor::Arch)
            .with_sudo(SudoConfig::password(Some(Secret::new("hunter2"))))
            .with_update_types([SYSTEM_PACKAGES]);

        orchestrator.run(&system, &table);

        let recorder = recorder.borrow();
        assert_eq!(recorder.executed[0].command, "paru -Syu --noconfirm");
        assert_eq!(recorder.executed[0].elevation, Elevation::Interactive);
        assert_eq!(recorder.secrets[0].as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_remote_session_closed() {
        let recorder = Shared::default();
        let mut orchestrator = Orchestrator::new(FakeBackend::new(&recorder));
        let table = CapabilityTable::for_flavor(Flavor::Debian);

        let result = orchestrator.run(&edge01(), &table);

        assert!(result.success());
        let recorder = recorder.borrow();
        assert_eq!(recorder.connects, 1);
        assert_eq!(recorder.closes, 1);
    }

    #[test]
    fn test_observer_events() {
        let recorder = Shared::default();
        let mut orchestrator = Orchestrator::new(FakeBackend::new(&recorder))
            .with_observer(Box::new(EventObserver(recorder.clone())));
        let table = CapabilityTable::for_flavor(Flavor::Debian);
        let system = TargetSystem::new("laptop", "localhost", Flavor::Debian)
            .with_update_types([NODE]);

        orchestrator.run(&system, &table);

        assert_eq!(
            recorder.borrow().events,
            [
                "system:laptop",
                "type:node",
                "cmd:npm update -g",
                "done:0",
                "type-done:node:success",
                "system-done:laptop",
            ]
        );
    }

    #[test]
    fn test_plan_executes_nothing() {
        let recorder = Shared::default();
        let orchestrator = Orchestrator::new(FakeBackend::new(&recorder));
        let table = CapabilityTable::for_flavor(Flavor::Debian);
        let system = build_box().with_update_types([SYSTEM_PACKAGES, "flatpak"]);

        let plan = orchestrator.plan(&system, &table);

        assert_eq!(plan.len(), 2);
        let commands = plan[0].commands.as_ref().unwrap();
        assert_eq!(commands.len(), 4);
        assert!(matches!(
            &commands[0],
            PlannedCommand::Ready(invocation) if invocation.command == "sudo -n apt update"
        ));
        assert!(plan[1].commands.is_err());
        assert!(recorder.borrow().executed.is_empty());
    }

    #[test]
    fn test_plan_blocked_without_secret() {
        let recorder = Shared::default();
        let orchestrator = Orchestrator::new(FakeBackend::new(&recorder));
        let table = CapabilityTable::for_flavor(Flavor::Debian);
        let system = build_box().with_sudo(SudoConfig::password(None));

        let plan = orchestrator.plan(&system, &table);

        let commands = plan[0].commands.as_ref().unwrap();
        assert!(commands.iter().all(|c| matches!(c, PlannedCommand::Blocked { .. })));
    }
}
