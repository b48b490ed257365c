//! Run summary, as colored text or JSON.

use anyhow::Result;
use chrono::{DateTime, Local};
use colored::Colorize;
use execkit::{classify_command_failure, classify_connection_message};
use fleet::{SystemResult, UpdateStatus, UpdateTypeResult};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use std::fmt::Write;
use std::time::Duration;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct RunReport {
    started: DateTime<Local>,
    finished: Option<DateTime<Local>>,
    systems: Vec<(String, SystemResult)>,
}

impl RunReport {
    pub fn start() -> Self {
        Self {
            started: Local::now(),
            finished: None,
            systems: Vec::new(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, result: SystemResult) {
        self.systems.push((name.into(), result));
    }

    pub fn finish(&mut self) {
        self.finished = Some(Local::now());
    }

    /// Whether every system was reached and every update type succeeded.
    pub fn success(&self) -> bool {
        self.systems.iter().all(|(_, r)| r.success())
    }

    pub fn successful_systems(&self) -> usize {
        self.systems.iter().filter(|(_, r)| r.success()).count()
    }

    /// End of the run, or now while it is still going, and the time taken.
    fn elapsed(&self) -> (DateTime<Local>, Duration) {
        let finished = self.finished.unwrap_or_else(Local::now);
        (finished, (finished - self.started).to_std().unwrap_or_default())
    }

    /// Run envelope with the map of system name to result, in run order.
    pub fn to_json(&self) -> Result<String> {
        let (finished, elapsed) = self.elapsed();
        let successful = self.successful_systems();
        let report = JsonReport {
            start_time: self.started,
            end_time: finished,
            duration_seconds: elapsed.as_secs_f64(),
            summary: JsonSummary {
                total: self.systems.len(),
                successful,
                failed: self.systems.len() - successful,
            },
            systems: JsonSystems(&self.systems),
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let (finished, elapsed) = self.elapsed();

        let title = "Update Summary";
        let _ = writeln!(out, "{}", title.bold());
        let _ = writeln!(out, "{}", "─".repeat(title.len()).dimmed());
        let _ = writeln!(out, "  {}: {}", "Started".dimmed(), self.started.format(TIME_FORMAT));
        let _ = writeln!(out, "  {}: {}", "Finished".dimmed(), finished.format(TIME_FORMAT));
        let _ = writeln!(out, "  {}: {}", "Duration".dimmed(), format_duration(elapsed));

        for (name, result) in &self.systems {
            let _ = writeln!(out);
            render_system(&mut out, name, result);
        }

        let _ = writeln!(out);
        let summary = format!(
            "Summary: {}/{} systems updated successfully",
            self.successful_systems(),
            self.systems.len()
        );
        if self.success() {
            let _ = writeln!(out, "{}", summary.green().bold());
        } else {
            let _ = writeln!(out, "{}", summary.red().bold());
        }
        out
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

fn render_system(out: &mut String, name: &str, result: &SystemResult) {
    let heading = match result {
        SystemResult::Completed(_) => format!("{} ({})", name, format_duration(result.duration())),
        SystemResult::ConnectionError(_) => name.to_string(),
    };
    let _ = writeln!(out, "{}", heading.cyan().bold());

    if let Some(message) = result.connection_error_message() {
        let category = classify_connection_message(message);
        let _ = writeln!(out, "  {} connection error: {}", "✗".red(), message);
        let _ = writeln!(out, "      {} {}", "hint:".dimmed(), category.advice());
        return;
    }

    if result.updates().is_empty() {
        let _ = writeln!(out, "  {}", "no update types selected".dimmed());
    }

    for (update_type, update) in result.updates() {
        render_update(out, update_type, update);
    }
}

fn render_update(out: &mut String, update_type: &str, update: &UpdateTypeResult) {
    let mark = if update.success() {
        "✓".green()
    } else {
        "✗".red()
    };
    let status = match update.status() {
        UpdateStatus::Success => "success".green(),
        UpdateStatus::Failed => "failed".red(),
        UpdateStatus::Error => "error".red(),
    };
    let _ = writeln!(
        out,
        "  {} {} {} {}",
        mark,
        update_type,
        status,
        format!("({})", format_duration(update.duration())).dimmed()
    );

    if let Some(failure) = update.first_failure() {
        let _ = writeln!(
            out,
            "      `{}` exited with {}",
            failure.command(),
            failure.exit_code()
        );
        let hint = if failure.is_timeout() {
            "Raise command_timeout in [settings] if the update is just slow".to_string()
        } else {
            classify_command_failure(failure.command(), failure.stderr()).hint
        };
        let _ = writeln!(out, "      {} {}", "hint:".dimmed(), hint);
    } else if let Some(message) = update.error_message() {
        let _ = writeln!(out, "      {message}");
    }
}

/// Seconds with one decimal below a minute, then minutes and seconds, then
/// hours and minutes.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    let whole = duration.as_secs();
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if whole < 3600 {
        format!("{}m {:02}s", whole / 60, whole % 60)
    } else {
        format!("{}h {}m", whole / 3600, whole % 3600 / 60)
    }
}
#[derive(Serialize)]
struct JsonReport<'a> {
    start_time: DateTime<Local>,
    end_time: DateTime<Local>,
    duration_seconds: f64,
    summary: JsonSummary,
    systems: JsonSystems<'a>,
}

#[derive(Serialize)]
struct JsonSummary {
    total: usize,
    successful: usize,
    failed: usize,
}

struct JsonSystems<'a>(&'a [(String, SystemResult)]);

impl Serialize for JsonSystems<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, result) in self.0 {
            map.serialize_entry(name, result)?;
        }
        map.end()
    }
}
