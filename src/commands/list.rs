use anyhow::Result;
use colored::Colorize;

use crate::config::Config;
use crate::ui;

pub fn run(config: &Config) -> Result<()> {
    ui::header(&format!("Systems ({})", config.systems.len()));

    for (name, system) in &config.systems {
        let locality = if system.is_local() { "local" } else { "remote" };
        println!();
        println!("{} {}", name.cyan().bold(), format!("[{locality}]").dimmed());
        ui::kv("hostname", &system.hostname);
        ui::kv("type", &system.flavor.to_string());
        ui::kv("sudo", &system.sudo_method.to_string());
        if let Some(ssh) = &system.ssh {
            ui::kv("ssh", &format!("{}@{}:{}", ssh.user, system.hostname, ssh.port));
        }
        if system.updates.is_empty() {
            ui::kv("updates", &"none".dimmed().to_string());
        } else {
            ui::kv("updates", &system.updates.join(", "));
        }
    }

    Ok(())
}
