//! Per-update-type and per-system results.

use execkit::CommandResult;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Outcome class of an update type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    /// Every command exited 0
    Success,
    /// At least one command failed
    Failed,
    /// The update type could not be resolved
    Error,
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateStatus::Success => write!(f, "success"),
            UpdateStatus::Failed => write!(f, "failed"),
            UpdateStatus::Error => write!(f, "error"),
        }
    }
}

/// Results of all commands of one update type.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateTypeResult {
    status: UpdateStatus,
    success: bool,
    commands: Vec<CommandResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl UpdateTypeResult {
    /// Aggregate command results. Succeeds only if every command succeeded.
    pub fn from_commands(commands: Vec<CommandResult>) -> Self {
        let failed = commands.iter().find(|c| !c.success());
        let error = failed.map(|c| format!("`{}` exited with {}", c.command(), c.exit_code()));
        let success = failed.is_none();

        Self {
            status: if success {
                UpdateStatus::Success
            } else {
                UpdateStatus::Failed
            },
            success,
            commands,
            error,
        }
    }

    /// An update type that could not be resolved to commands.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: UpdateStatus::Error,
            success: false,
            commands: Vec::new(),
            error: Some(message.into()),
        }
    }

    /// Status.
    pub fn status(&self) -> UpdateStatus {
        self.status
    }

    /// Whether every command succeeded.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Command results in execution order.
    pub fn commands(&self) -> &[CommandResult] {
        &self.commands
    }

    /// Error message for failed and unresolved types.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// First failed command.
    pub fn first_failure(&self) -> Option<&CommandResult> {
        self.commands.iter().find(|c| !c.success())
    }

    /// Total time spent in commands.
    pub fn duration(&self) -> Duration {
        self.commands.iter().map(CommandResult::duration).sum()
    }
}

/// Everything that happened on one system.
#[derive(Debug, Clone)]
pub enum SystemResult {
    /// The system was reached; one entry per update type in configured order
    Completed(Vec<(String, UpdateTypeResult)>),
    /// The session could not be established; no update type ran
    ConnectionError(String),
}

impl SystemResult {
    /// Result for a system that could not be reached.
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError(message.into())
    }

    /// Whether the system was reached and every update type succeeded.
    pub fn success(&self) -> bool {
        match self {
            SystemResult::Completed(updates) => updates.iter().all(|(_, r)| r.success()),
            SystemResult::ConnectionError(_) => false,
        }
    }

    /// Update type results, empty on connection failure.
    pub fn updates(&self) -> &[(String, UpdateTypeResult)] {
        match self {
            SystemResult::Completed(updates) => updates,
            SystemResult::ConnectionError(_) => &[],
        }
    }

    /// Result for one update type.
    pub fn get(&self, update_type: &str) -> Option<&UpdateTypeResult> {
        self.updates()
            .iter()
            .find(|(id, _)| id == update_type)
            .map(|(_, r)| r)
    }

    /// Connection error message, if the system was unreachable.
    pub fn connection_error_message(&self) -> Option<&str> {
        match self {
            SystemResult::ConnectionError(message) => Some(message),
            SystemResult::Completed(_) => None,
        }
    }

    /// Total time spent in commands.
    pub fn duration(&self) -> Duration {
        self.updates().iter().map(|(_, r)| r.duration()).sum()
    }
}

#[derive(Serialize)]
struct ConnectionErrorEntry<'a> {
    status: UpdateStatus,
    success: bool,
    error: &'a str,
}

impl Serialize for SystemResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SystemResult::Completed(updates) => {
                let mut map = serializer.serialize_map(Some(updates.len()))?;
                for (update_type, result) in updates {
                    map.serialize_entry(update_type, result)?;
                }
                map.end()
            }
            SystemResult::ConnectionError(message) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(
                    "connection_error",
                    &ConnectionErrorEntry {
                        status: UpdateStatus::Failed,
                        success: false,
                        error: message,
                    },
                )?;
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(command: &str) -> CommandResult {
        CommandResult::new(command, 0, "", "", Duration::from_millis(10))
    }

    fn failed(command: &str, code: i32) -> CommandResult {
        CommandResult::new(command, code, "", "boom", Duration::from_millis(5))
    }

    #[test]
    fn test_success_requires_all_commands() {
        let result = UpdateTypeResult::from_commands(vec![ok("a"), ok("b")]);
        assert!(result.success());
        assert_eq!(result.status(), UpdateStatus::Success);
        assert_eq!(result.duration(), Duration::from_millis(20));

        let result = UpdateTypeResult::from_commands(vec![ok("a"), failed("b", 2), ok("c")]);
        assert!(!result.success());
        assert_eq!(result.status(), UpdateStatus::Failed);
        assert_eq!(result.first_failure().unwrap().command(), "b");
        assert_eq!(result.commands().len(), 3);
        assert!(result.error_message().unwrap().contains("`b` exited with 2"));
    }

    #[test]
    fn test_error_result() {
        let result = UpdateTypeResult::error("unknown update type: flatpak");
        assert_eq!(result.status(), UpdateStatus::Error);
        assert!(!result.success());
        assert!(result.commands().is_empty());
    }

    #[test]
    fn test_system_json_preserves_order() {
        let result = SystemResult::Completed(vec![
            ("system_packages".to_string(), UpdateTypeResult::from_commands(vec![ok("apt update")])),
            ("rust".to_string(), UpdateTypeResult::error("nope")),
        ]);

        let value = serde_json::to_string(&result).unwrap();
        assert!(value.find("system_packages").unwrap() < value.find("rust").unwrap());

        let value: serde_json::Value = serde_json::from_str(&value).unwrap();
        assert_eq!(value["system_packages"]["status"], "success");
        assert_eq!(value["system_packages"]["success"], true);
        assert_eq!(value["system_packages"]["commands"][0]["exit_code"], 0);
        assert_eq!(value["rust"]["status"], "error");
        assert!(value["system_packages"].get("error").is_none());
    }

    #[test]
    fn test_connection_error_json() {
        let result = SystemResult::connection_error("failed to connect to edge01");

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "connection_error": {
                    "status": "failed",
                    "success": false,
                    "error": "failed to connect to edge01"
                }
            })
        );
        assert!(!result.success());
        assert!(result.updates().is_empty());
    }
}
