//! Mechanism lookup table
//!
//! A mechanism is a named way of installing something: a system package
//! manager, a universal packaging system, a language package manager, or
//! the generic fallback. The table is built once and consulted by the
//! selector, the collector (batching), the assembler (locks, elevation)
//! and the rollback generator (undo commands).

use crate::profile::EnvironmentProfile;
use std::collections::BTreeMap;

/// Name of the generic fallback mechanism (usually a curl/script install)
pub const FALLBACK: &str = "fallback";
/// Mechanism used by build recipes
pub const SOURCE: &str = "source";
/// Mechanism used by data download recipes
pub const DOWNLOAD: &str = "download";
/// Mechanism used by config recipes
pub const CONFIG: &str = "config";

/// Preference order for universal packaging systems
pub const UNIVERSAL_ORDER: &[&str] = &["snap", "brew", "flatpak"];

/// Broad class of a mechanism, decides how availability is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MechanismClass {
    /// Distribution package manager (apt, dnf, ...)
    System,
    /// Distribution-independent packaging (snap, flatpak, brew)
    Universal,
    /// Language ecosystem manager (pip, npm, cargo)
    Language,
    /// Arbitrary command, always usable
    Fallback,
    /// Internal mechanisms for build/data/config recipes
    Builtin,
}

/// Static description of one mechanism
#[derive(Debug, Clone)]
pub struct MechanismSpec {
    pub name: String,
    /// Executable that must be present for the mechanism to work
    pub program: Option<String>,
    pub class: MechanismClass,
    /// Canonical "install packages" prefix, e.g. `apt-get install -y`
    pub install_prefix: Option<String>,
    /// Canonical "remove packages" prefix, e.g. `apt-get remove -y`
    pub remove_prefix: Option<String>,
    /// Whether the mechanism normally runs elevated
    pub elevated: bool,
    /// Whether the mechanism must never run elevated
    pub never_elevated: bool,
    /// Exclusive lock group; steps sharing a group never run concurrently
    pub lock: Option<String>,
}

impl MechanismSpec {
    fn new(name: &str, class: MechanismClass) -> Self {
        Self {
            name: name.to_string(),
            program: None,
            class,
            install_prefix: None,
            remove_prefix: None,
            elevated: false,
            never_elevated: false,
            lock: None,
        }
    }

    fn program(mut self, program: &str) -> Self {
        self.program = Some(program.to_string());
        self
    }

    fn prefixes(mut self, install: &str, remove: &str) -> Self {
        self.install_prefix = Some(install.to_string());
        self.remove_prefix = Some(remove.to_string());
        self
    }

    fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    fn never_elevated(mut self) -> Self {
        self.never_elevated = true;
        self
    }

    fn lock(mut self, group: &str) -> Self {
        self.lock = Some(group.to_string());
        self
    }
}

/// Lookup table from mechanism name to its spec
#[derive(Debug, Clone, Default)]
pub struct MechanismRegistry {
    specs: BTreeMap<String, MechanismSpec>,
}

impl MechanismRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in mechanism
    pub fn builtin() -> Self {
        use MechanismClass::{Builtin, Fallback, Language, System, Universal};

        let mut registry = Self::new();
        let specs = [
            MechanismSpec::new("apt", System)
                .program("apt-get")
                .prefixes("apt-get install -y", "apt-get remove -y")
                .elevated()
                .lock("dpkg"),
            MechanismSpec::new("dnf", System)
                .program("dnf")
                .prefixes("dnf install -y", "dnf remove -y")
                .elevated()
                .lock("rpm"),
            MechanismSpec::new("yum", System)
                .program("yum")
                .prefixes("yum install -y", "yum remove -y")
                .elevated()
                .lock("rpm"),
            MechanismSpec::new("zypper", System)
                .program("zypper")
                .prefixes(
                    "zypper --non-interactive install",
                    "zypper --non-interactive remove",
                )
                .elevated()
                .lock("rpm"),
            MechanismSpec::new("pacman", System)
                .program("pacman")
                .prefixes("pacman -S --noconfirm --needed", "pacman -R --noconfirm")
                .elevated()
                .lock("pacman"),
            MechanismSpec::new("apk", System)
                .program("apk")
                .prefixes("apk add", "apk del")
                .elevated()
                .lock("apk"),
            MechanismSpec::new("brew", Universal)
                .program("brew")
                .prefixes("brew install", "brew uninstall")
                .never_elevated()
                .lock("brew"),
            MechanismSpec::new("snap", Universal)
                .program("snap")
                .prefixes("snap install", "snap remove")
                .elevated()
                .lock("snap"),
            MechanismSpec::new("flatpak", Universal)
                .program("flatpak")
                .prefixes("flatpak install -y", "flatpak uninstall -y")
                .lock("flatpak"),
            MechanismSpec::new("pip", Language)
                .program("pip3")
                .prefixes("pip3 install", "pip3 uninstall -y"),
            MechanismSpec::new("npm", Language)
                .program("npm")
                .prefixes("npm install -g", "npm uninstall -g"),
            MechanismSpec::new("cargo", Language)
                .program("cargo")
                .prefixes("cargo install", "cargo uninstall"),
            MechanismSpec::new(FALLBACK, Fallback),
            MechanismSpec::new(SOURCE, Builtin),
            MechanismSpec::new(DOWNLOAD, Builtin),
            MechanismSpec::new(CONFIG, Builtin),
        ];
        for spec in specs {
            registry.register(spec);
        }
        registry
    }

    /// Add or replace a mechanism
    pub fn register(&mut self, spec: MechanismSpec) {
        self.specs.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&MechanismSpec> {
        self.specs.get(name)
    }

    /// Executable backing a mechanism; unknown mechanisms are their own program
    pub fn program<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        match self.specs.get(name) {
            Some(spec) => spec.program.as_deref(),
            None => Some(name),
        }
    }

    /// Whether a mechanism can actually be used on this environment
    pub fn is_usable(&self, name: &str, env: &EnvironmentProfile) -> bool {
        let Some(spec) = self.specs.get(name) else {
            return env.has_binary(name);
        };
        match spec.class {
            MechanismClass::Fallback | MechanismClass::Builtin => true,
            MechanismClass::System => env.has_package_manager(name),
            MechanismClass::Universal => env.has_universal(name),
            MechanismClass::Language => spec
                .program
                .as_deref()
                .is_some_and(|program| env.has_binary(program)),
        }
    }

    /// Whether the underlying program is on the search path
    pub fn program_present(&self, name: &str, env: &EnvironmentProfile) -> bool {
        self.program(name)
            .is_some_and(|program| env.has_binary(program))
    }

    /// Whether the mechanism is a universal packaging system
    pub fn is_universal(&self, name: &str) -> bool {
        self.specs
            .get(name)
            .is_some_and(|s| s.class == MechanismClass::Universal)
    }

    /// Extract package names when a command has the canonical install shape
    ///
    /// Returns `None` if the command carries flags, pipes or anything else
    /// that a merged invocation would lose.
    pub fn batch_packages(&self, name: &str, command: &str) -> Option<Vec<String>> {
        let prefix = self.specs.get(name)?.install_prefix.as_deref()?;
        let rest = command.trim().strip_prefix(prefix)?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let packages: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
        if packages.is_empty() || !packages.iter().all(|p| is_package_token(p)) {
            return None;
        }
        Some(packages)
    }

    /// Build a single install invocation for a set of packages
    pub fn install_command(&self, name: &str, packages: &[String]) -> Option<String> {
        let prefix = self.specs.get(name)?.install_prefix.as_deref()?;
        Some(format!("{prefix} {}", packages.join(" ")))
    }

    /// Build the undo invocation for a set of packages
    pub fn remove_command(&self, name: &str, packages: &[String]) -> Option<String> {
        let prefix = self.specs.get(name)?.remove_prefix.as_deref()?;
        Some(format!("{prefix} {}", packages.join(" ")))
    }

    /// Exclusive lock group for a mechanism
    pub fn lock(&self, name: &str) -> Option<&str> {
        self.specs.get(name).and_then(|s| s.lock.as_deref())
    }

    /// Whether the mechanism normally needs elevation
    pub fn runs_elevated(&self, name: &str) -> bool {
        self.specs.get(name).is_some_and(|s| s.elevated)
    }

    /// Whether the mechanism must never run elevated
    pub fn never_elevated(&self, name: &str) -> bool {
        self.specs.get(name).is_some_and(|s| s.never_elevated)
    }

    /// Names of every registered mechanism
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }
}

fn is_package_token(token: &str) -> bool {
    !token.starts_with('-')
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@._+:=/-".contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(primary: &str, binaries: &[&str]) -> EnvironmentProfile {
        let mut env = EnvironmentProfile::default();
        env.package_managers.primary = Some(primary.to_string());
        env.package_managers.available.insert(primary.to_string());
        env.binaries = binaries.iter().map(|b| (*b).to_string()).collect();
        env
    }

    #[test]
    fn test_batch_packages_canonical_shape() {
        let registry = MechanismRegistry::builtin();
        assert_eq!(
            registry.batch_packages("apt", "apt-get install -y jq curl"),
            Some(vec!["jq".to_string(), "curl".to_string()])
        );
    }

    #[test]
    fn test_batch_packages_rejects_flags_and_pipes() {
        let registry = MechanismRegistry::builtin();
        assert_eq!(
            registry.batch_packages("apt", "apt-get install -y --no-install-recommends jq"),
            None
        );
        assert_eq!(
            registry.batch_packages("apt", "apt-get install -y jq && echo done"),
            None
        );
        assert_eq!(registry.batch_packages("apt", "apt-get install -y"), None);
        assert_eq!(registry.batch_packages("fallback", "curl x | sh"), None);
    }

    #[test]
    fn test_usability_by_class() {
        let registry = MechanismRegistry::builtin();
        let env = env_with("apt", &["pip3"]);
        assert!(registry.is_usable("apt", &env));
        assert!(!registry.is_usable("dnf", &env));
        assert!(!registry.is_usable("snap", &env));
        assert!(registry.is_usable("pip", &env));
        assert!(!registry.is_usable("npm", &env));
        assert!(registry.is_usable(FALLBACK, &env));
    }

    #[test]
    fn test_unknown_mechanism_uses_program_name() {
        let registry = MechanismRegistry::builtin();
        let env = env_with("apt", &["go"]);
        assert!(registry.is_usable("go", &env));
        assert!(!registry.is_usable("nix", &env));
    }

    #[test]
    fn test_brew_never_elevated() {
        let registry = MechanismRegistry::builtin();
        assert!(registry.never_elevated("brew"));
        assert!(!registry.runs_elevated("brew"));
        assert!(registry.runs_elevated("apt"));
        assert_eq!(registry.lock("dnf"), registry.lock("yum"));
    }
}
