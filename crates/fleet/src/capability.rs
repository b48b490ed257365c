//! Which commands an update type runs on a given flavor.

use crate::system::Flavor;
use execkit::{CommandSpec, Error, Result};
use std::collections::BTreeMap;

/// OS package upgrades.
pub const SYSTEM_PACKAGES: &str = "system_packages";
/// Rust toolchains and cargo-installed binaries.
pub const RUST: &str = "rust";
/// Global npm packages.
pub const NODE: &str = "node";
/// SDKMAN! candidates.
pub const SDKMAN: &str = "sdkman";
/// Google Cloud SDK components.
pub const GCLOUD: &str = "gcloud";

/// Script that defines the `sdk` shell function.
pub const SDKMAN_INIT: &str = "$HOME/.sdkman/bin/sdkman-init.sh";

/// An `sdk` invocation. `sdk` is a bash function rather than a program, so
/// every call sources the init script in its own bash.
pub fn sdkman_command(args: &str) -> String {
    format!("bash -c 'source \"{SDKMAN_INIT}\" && sdk {args}'")
}

/// Resolves update types to command specs.
pub trait CapabilityProvider {
    /// Commands for `update_type`, in order. Unknown types are
    /// [`Error::UnknownUpdateType`].
    fn lookup(&self, update_type: &str) -> Result<Vec<CommandSpec>>;

    /// Every update type this provider knows.
    fn update_types(&self) -> Vec<String>;

    /// Whether `update_type` is known.
    fn supports(&self, update_type: &str) -> bool {
        self.lookup(update_type).is_ok()
    }
}

/// Static table of update types for one flavor.
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    flavor: Flavor,
    entries: BTreeMap<String, Vec<CommandSpec>>,
}

impl CapabilityTable {
    /// An empty table.
    pub fn empty(flavor: Flavor) -> Self {
        Self {
            flavor,
            entries: BTreeMap::new(),
        }
    }

    /// The built-in update types for `flavor`.
    pub fn for_flavor(flavor: Flavor) -> Self {
        let mut table = Self::empty(flavor);

        let packages = match flavor {
            // paru calls sudo itself and must never be wrapped
            Flavor::Arch => vec![
                CommandSpec::self_elevating("paru -Syu --noconfirm"),
                CommandSpec::self_elevating("paru -Sua --noconfirm"),
            ],
            Flavor::Debian => vec![
                CommandSpec::privileged("apt update"),
                CommandSpec::privileged("apt upgrade -y"),
                CommandSpec::privileged("apt autoremove -y"),
                CommandSpec::privileged("apt autoclean"),
            ],
        };

        table
            .register(SYSTEM_PACKAGES, packages)
            .register(
                RUST,
                vec![
                    CommandSpec::user("rustup update"),
                    CommandSpec::user("cargo install-update -a"),
                ],
            )
            .register(NODE, vec![CommandSpec::user("npm update -g")])
            .register(
                SDKMAN,
                vec![
                    CommandSpec::user(sdkman_command("selfupdate")),
                    CommandSpec::user(sdkman_command("update")),
                    CommandSpec::user(sdkman_command("upgrade")),
                ],
            )
            .register(GCLOUD, vec![CommandSpec::user("gcloud components update --quiet")]);

        table
    }

    /// Add or replace an update type.
    pub fn register(&mut self, update_type: impl Into<String>, commands: Vec<CommandSpec>) -> &mut Self {
        self.entries.insert(update_type.into(), commands);
        self
    }

    /// Flavor this table describes.
    pub fn flavor(&self) -> Flavor {
        self.flavor
    }
}

impl CapabilityProvider for CapabilityTable {
    fn lookup(&self, update_type: &str) -> Result<Vec<CommandSpec>> {
        self.entries
            .get(update_type)
            .cloned()
            .ok_or_else(|| Error::UnknownUpdateType(update_type.to_string()))
    }

    fn update_types(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn supports(&self, update_type: &str) -> bool {
        self.entries.contains_key(update_type)
    }
}
