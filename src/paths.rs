//! Config file discovery for updall
//!
//! # Environment Variables
//!
//! - `UPDALL_CONFIG` - Use this config file instead of searching
//!
//! # Resolution Priority
//!
//! 1. `--config <path>`
//! 2. `UPDALL_CONFIG` environment variable
//! 3. `./updall.toml`
//! 4. `XDG_CONFIG_HOME/updall/config.toml` (if set)
//! 5. `~/.config/updall/config.toml`
//! 6. `/etc/updall/config.toml`
//!
//! An explicit path (1 or 2) must exist; the search never falls through
//! past it.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// Environment variable for config file override
pub const ENV_CONFIG: &str = "UPDALL_CONFIG";

/// File name looked up in the working directory
const LOCAL_CONFIG: &str = "updall.toml";

/// System-wide config file
const SYSTEM_CONFIG: &str = "/etc/updall/config.toml";

/// Locate the config file.
pub fn config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        let path = expand(&path.to_string_lossy());
        log::debug!("Using config from --config: {}", path.display());
        return require_exists(path);
    }

    if let Ok(file) = std::env::var(ENV_CONFIG) {
        let path = expand(&file);
        log::debug!("Using config from {}: {}", ENV_CONFIG, path.display());
        return require_exists(path);
    }

    let candidates = search_path()?;
    for candidate in &candidates {
        if candidate.is_file() {
            log::debug!("Found config: {}", candidate.display());
            return Ok(candidate.clone());
        }
        log::trace!("No config at {}", candidate.display());
    }

    let searched = candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    bail!("No config file found (searched: {searched})")
}

/// Default locations in lookup order.
pub fn search_path() -> Result<Vec<PathBuf>> {
    let mut candidates = vec![PathBuf::from(LOCAL_CONFIG)];

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        candidates.push(PathBuf::from(xdg_config).join("updall").join("config.toml"));
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    candidates.push(home.join(".config").join("updall").join("config.toml"));
    candidates.push(PathBuf::from(SYSTEM_CONFIG));

    Ok(candidates)
}

fn require_exists(path: PathBuf) -> Result<PathBuf> {
    if !path.is_file() {
        bail!("Config file not found: {}", path.display());
    }
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// Every path that comes from the config or the command line goes through
/// here.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
