//! Environment profile - the read-only snapshot of a target system
//!
//! The profile is produced by an external detector and handed to every
//! resolution call. Nothing in this workspace's library crates probes the
//! machine; presence checks are answered from the snapshot so that two
//! resolutions against the same snapshot agree.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Operating system family, used to key required system packages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Debian,
    Rhel,
    Arch,
    Suse,
    Alpine,
    Macos,
    #[default]
    Other,
}

impl OsFamily {
    /// Key used in recipe package tables (`[requires.packages] debian = [...]`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debian => "debian",
            Self::Rhel => "rhel",
            Self::Arch => "arch",
            Self::Suse => "suse",
            Self::Alpine => "alpine",
            Self::Macos => "macos",
            Self::Other => "other",
        }
    }

    /// Parse a family name, accepting common distribution ids
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debian" | "ubuntu" | "linuxmint" | "pop" | "raspbian" => Self::Debian,
            "rhel" | "fedora" | "centos" | "rocky" | "almalinux" | "amzn" => Self::Rhel,
            "arch" | "manjaro" | "endeavouros" => Self::Arch,
            "suse" | "opensuse" | "opensuse-leap" | "opensuse-tumbleweed" | "sles" => Self::Suse,
            "alpine" => Self::Alpine,
            "macos" | "darwin" => Self::Macos,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating system facts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsInfo {
    pub family: OsFamily,
    /// Distribution id, e.g. "ubuntu"
    pub distro: String,
    pub version: String,
    /// CPU architecture, e.g. "x86_64"
    pub arch: String,
}

/// Package managers present on the system
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageManagers {
    /// The distribution's native package manager
    pub primary: Option<String>,
    /// Every package manager found, including the primary one
    pub available: BTreeSet<String>,
    /// Universal packaging systems that are installed (snap, flatpak, brew)
    pub universal: BTreeSet<String>,
}

/// Privilege and elevation capability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Privileges {
    pub is_root: bool,
    /// sudo (or equivalent) is installed and the user may use it
    pub can_elevate: bool,
    /// sudo works without a password
    pub passwordless: bool,
}

/// Container and virtualization context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerInfo {
    pub in_container: bool,
    pub in_wsl: bool,
    pub virtualization: Option<String>,
}

/// GPU facts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuInfo {
    /// Lowercase vendor: "nvidia", "amd", "intel"
    pub vendor: String,
    pub model: String,
    pub driver_version: Option<String>,
    /// Compute runtime version, e.g. a CUDA version
    pub compute_version: Option<String>,
}

/// Hardware facts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hardware {
    pub cpu_count: u32,
    pub memory_mb: u64,
    pub gpu: Option<GpuInfo>,
}

/// Kernel facts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelInfo {
    pub release: String,
    pub headers_installed: bool,
    pub secure_boot: bool,
}

/// Network reachability facts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkInfo {
    pub online: bool,
    pub proxy: Option<String>,
}

/// Immutable description of the target system for one resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentProfile {
    pub os: OsInfo,
    pub package_managers: PackageManagers,
    pub privileges: Privileges,
    pub container: ContainerInfo,
    /// Init/service manager, e.g. "systemd"
    pub service_manager: Option<String>,
    pub hardware: Hardware,
    pub kernel: KernelInfo,
    pub network: NetworkInfo,
    /// Executables resolvable on the search path
    pub binaries: BTreeSet<String>,
    /// Installed system packages
    pub packages: BTreeSet<String>,
    /// Directories on the search path, in order
    pub path_dirs: Vec<String>,
    pub home: Option<String>,
}

impl EnvironmentProfile {
    /// Whether an executable resolves on the search path
    pub fn has_binary(&self, name: &str) -> bool {
        self.binaries.contains(name)
    }

    /// Whether a system package is installed
    pub fn has_package(&self, name: &str) -> bool {
        self.packages.contains(name)
    }

    /// The primary package manager, if any
    pub fn primary_package_manager(&self) -> Option<&str> {
        self.package_managers.primary.as_deref()
    }

    /// Whether a package manager (system or universal) is installed
    pub fn has_package_manager(&self, name: &str) -> bool {
        self.package_managers.primary.as_deref() == Some(name)
            || self.package_managers.available.contains(name)
            || self.package_managers.universal.contains(name)
    }

    /// Whether a universal packaging system is installed
    pub fn has_universal(&self, name: &str) -> bool {
        self.package_managers.universal.contains(name)
    }

    pub fn has_service_manager(&self) -> bool {
        self.service_manager.is_some() && !self.container.in_container
    }

    /// Whether a directory is already on the search path
    ///
    /// `$HOME` and `~` prefixes are expanded against the snapshot's home.
    pub fn on_search_path(&self, dir: &str) -> bool {
        let expanded = self.expand_home(dir);
        self.path_dirs
            .iter()
            .any(|d| d == dir || *d == expanded)
    }

    fn expand_home(&self, dir: &str) -> String {
        let Some(home) = self.home.as_deref() else {
            return dir.to_string();
        };
        if let Some(rest) = dir.strip_prefix("$HOME") {
            format!("{home}{rest}")
        } else if let Some(rest) = dir.strip_prefix("${HOME}") {
            format!("{home}{rest}")
        } else if let Some(rest) = dir.strip_prefix('~') {
            format!("{home}{rest}")
        } else {
            dir.to_string()
        }
    }

    /// Vendor of the first GPU, lowercase
    pub fn gpu_vendor(&self) -> Option<&str> {
        self.hardware.gpu.as_ref().map(|g| g.vendor.as_str())
    }
}
