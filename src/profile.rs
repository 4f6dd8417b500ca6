//! Local environment detection
//!
//! Builds the [`EnvironmentProfile`] snapshot the resolver works from.
//! Probing happens once per command; everything after this point answers
//! presence questions from the snapshot.

use anyhow::{Context, Result};
use blueprint::profile::{GpuInfo, PackageManagers, Privileges};
use blueprint::{Catalog, EnvironmentProfile, MechanismClass, MechanismRegistry, OsFamily};
use std::collections::BTreeSet;
use std::fs;
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use sysinfo::System;

/// Executables worth knowing about regardless of the catalog
const BASE_BINARIES: &[&str] = &[
    "sh", "bash", "curl", "wget", "git", "sudo", "systemctl", "tar", "unzip", "gpg", "make",
    "gcc", "python3", "sha256sum", "shasum", "nvidia-smi", "lspci", "mokutil", "rc-service",
];

/// Native package manager per family, in preference order
const NATIVE_MANAGERS: &[(OsFamily, &[&str])] = &[
    (OsFamily::Debian, &["apt"]),
    (OsFamily::Rhel, &["dnf", "yum"]),
    (OsFamily::Arch, &["pacman"]),
    (OsFamily::Suse, &["zypper"]),
    (OsFamily::Alpine, &["apk"]),
    (OsFamily::Macos, &["brew"]),
];

const ONLINE_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Load a snapshot saved with `rigger profile --json`
pub fn load(path: &Path) -> Result<EnvironmentProfile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read profile {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid profile snapshot in {}", path.display()))
}

/// Probe this machine
///
/// Binaries named anywhere in the catalog are probed so the resolver can
/// tell what is already installed.
pub fn detect(catalog: &Catalog, mechanisms: &MechanismRegistry) -> EnvironmentProfile {
    let mut env = EnvironmentProfile::default();

    env.os.distro = if cfg!(target_os = "macos") {
        "macos".to_string()
    } else {
        System::distribution_id()
    };
    env.os.family = OsFamily::parse(&env.os.distro);
    env.os.version = System::os_version().unwrap_or_default();
    env.os.arch = System::cpu_arch();

    env.home = dirs::home_dir().map(|h| h.display().to_string());
    env.path_dirs = std::env::var_os("PATH")
        .map(|path| {
            std::env::split_paths(&path)
                .map(|p| p.display().to_string())
                .collect()
        })
        .unwrap_or_default();

    for name in probe_list(catalog, mechanisms) {
        if which::which(&name).is_ok() {
            env.binaries.insert(name);
        }
    }

    detect_package_managers(&mut env, mechanisms);
    detect_privileges(&mut env);
    detect_container(&mut env);
    detect_hardware(&mut env);
    env.packages = installed_packages(env.primary_package_manager());

    env.network.proxy = ["https_proxy", "HTTPS_PROXY", "http_proxy", "HTTP_PROXY"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()));
    env.network.online = env.network.proxy.is_some() || online();

    log::debug!(
        "Detected {} {} ({}), primary package manager {:?}",
        env.os.distro,
        env.os.version,
        env.os.family,
        env.package_managers.primary
    );
    env
}

fn probe_list(catalog: &Catalog, mechanisms: &MechanismRegistry) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = BASE_BINARIES.iter().map(|b| (*b).to_string()).collect();
    for name in mechanisms.names() {
        if let Some(program) = mechanisms.program(name) {
            names.insert(program.to_string());
        }
    }
    for recipe in catalog.iter() {
        names.insert(recipe.binary_name().to_string());
        names.extend(recipe.requires.binaries.iter().cloned());
        for choice in &recipe.choices {
            for option in &choice.options {
                names.extend(option.requires.binaries.iter().cloned());
                names.extend(option.binaries.iter().cloned());
            }
        }
    }
    names
}

fn detect_package_managers(env: &mut EnvironmentProfile, mechanisms: &MechanismRegistry) {
    for name in mechanisms.names() {
        let Some(spec) = mechanisms.get(name) else {
            continue;
        };
        let present = spec
            .program
            .as_deref()
            .is_some_and(|program| env.binaries.contains(program));
        if !present {
            continue;
        }
        match spec.class {
            MechanismClass::Universal => {
                env.package_managers.universal.insert(name.to_string());
            }
            MechanismClass::System | MechanismClass::Language => {
                env.package_managers.available.insert(name.to_string());
            }
            _ => {}
        }
    }
    env.package_managers.primary = native_manager(env.os.family, &env.package_managers);
}

/// The family's native manager, when installed
fn native_manager(family: OsFamily, managers: &PackageManagers) -> Option<String> {
    NATIVE_MANAGERS
        .iter()
        .find(|(f, _)| *f == family)
        .and_then(|(_, names)| {
            names.iter().find(|name| {
                managers.available.contains(**name) || managers.universal.contains(**name)
            })
        })
        .map(|name| (*name).to_string())
}

fn detect_privileges(env: &mut EnvironmentProfile) {
    env.privileges = privileges_with(env.binaries.contains("sudo"));
}

/// Privileges of the current user, without a full profile probe
pub fn privileges() -> Privileges {
    privileges_with(which::which("sudo").is_ok())
}

fn privileges_with(has_sudo: bool) -> Privileges {
    let is_root = is_root();
    Privileges {
        is_root,
        can_elevate: is_root || has_sudo,
        passwordless: !is_root && has_sudo && succeeds("sudo", &["-n", "true"]),
    }
}

#[cfg(unix)]
fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

fn detect_container(env: &mut EnvironmentProfile) {
    let cgroup = fs::read_to_string("/proc/1/cgroup").unwrap_or_default();
    let runtime = if Path::new("/.dockerenv").exists() {
        Some("docker")
    } else if Path::new("/run/.containerenv").exists() {
        Some("podman")
    } else {
        container_from_cgroup(&cgroup)
    };
    env.container.in_container = runtime.is_some();
    env.container.virtualization = runtime.map(str::to_string);

    env.kernel.release = System::kernel_version().unwrap_or_default();
    env.container.in_wsl =
        std::env::var_os("WSL_DISTRO_NAME").is_some() || is_wsl_kernel(&env.kernel.release);

    env.service_manager = if Path::new("/run/systemd/system").exists() {
        Some("systemd".to_string())
    } else if cfg!(target_os = "macos") {
        Some("launchd".to_string())
    } else if env.binaries.contains("rc-service") {
        Some("openrc".to_string())
    } else {
        None
    };
}

fn container_from_cgroup(cgroup: &str) -> Option<&'static str> {
    ["docker", "kubepods", "containerd", "lxc", "podman"]
        .into_iter()
        .find(|runtime| cgroup.contains(runtime))
}

fn is_wsl_kernel(release: &str) -> bool {
    let release = release.to_lowercase();
    release.contains("microsoft") || release.contains("wsl")
}

fn detect_hardware(env: &mut EnvironmentProfile) {
    env.hardware.cpu_count = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1);

    let mut sys = System::new();
    sys.refresh_memory();
    env.hardware.memory_mb = sys.total_memory() / (1024 * 1024);

    env.hardware.gpu = if env.binaries.contains("nvidia-smi") {
        capture(
            "nvidia-smi",
            &["--query-gpu=name,driver_version", "--format=csv,noheader"],
        )
        .and_then(|out| parse_nvidia_smi(&out))
    } else {
        capture("lspci", &[]).and_then(|out| gpu_from_lspci(&out))
    };

    if !env.kernel.release.is_empty() {
        env.kernel.headers_installed = Path::new("/lib/modules")
            .join(&env.kernel.release)
            .join("build")
            .exists();
    }
    env.kernel.secure_boot = capture("mokutil", &["--sb-state"])
        .is_some_and(|out| out.contains("SecureBoot enabled"));
}

/// First line of `nvidia-smi --query-gpu=name,driver_version --format=csv,noheader`
fn parse_nvidia_smi(output: &str) -> Option<GpuInfo> {
    let line = output.lines().next()?.trim();
    let (model, driver) = line.split_once(',')?;
    Some(GpuInfo {
        vendor: "nvidia".to_string(),
        model: model.trim().to_string(),
        driver_version: Some(driver.trim().to_string()).filter(|d| !d.is_empty()),
        compute_version: None,
    })
}

/// First display controller in `lspci` output
fn gpu_from_lspci(output: &str) -> Option<GpuInfo> {
    let line = output.lines().find(|l| {
        l.contains("VGA compatible controller")
            || l.contains("3D controller")
            || l.contains("Display controller")
    })?;
    let model = line.split_once(": ").map_or(line, |(_, m)| m).trim();
    let lower = model.to_lowercase();
    let vendor = if lower.contains("nvidia") {
        "nvidia"
    } else if lower.contains("amd") || lower.contains("ati ") || lower.contains("radeon") {
        "amd"
    } else if lower.contains("intel") {
        "intel"
    } else {
        return None;
    };
    Some(GpuInfo {
        vendor: vendor.to_string(),
        model: model.to_string(),
        ..Default::default()
    })
}

fn installed_packages(manager: Option<&str>) -> BTreeSet<String> {
    let query: Option<(&str, &[&str])> = match manager {
        Some("apt") => Some(("dpkg-query", &["-W", "-f=${Package}\\n"][..])),
        Some("dnf" | "yum" | "zypper") => Some(("rpm", &["-qa", "--qf", "%{NAME}\\n"][..])),
        Some("pacman") => Some(("pacman", &["-Qq"][..])),
        Some("apk") => Some(("apk", &["info"][..])),
        Some("brew") => Some(("brew", &["list", "--formula", "-1"][..])),
        _ => None,
    };
    query
        .and_then(|(program, args)| capture(program, args))
        .map(|out| {
            out.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn online() -> bool {
    let addr = SocketAddr::from(([1, 1, 1, 1], 443));
    TcpStream::connect_timeout(&addr, ONLINE_PROBE_TIMEOUT).is_ok()
}

/// Stdout of a successful command
fn capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).to_string())
}

fn succeeds(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}
