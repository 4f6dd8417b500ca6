//! Synthetic environments and recipes shared by the unit tests

use blueprint::recipe::{PostInstallAction, RecipeKind};
use blueprint::{Catalog, EnvironmentProfile, OsFamily, Recipe};

/// Ubuntu workstation: apt, systemd, sudo with a password
pub fn debian() -> EnvironmentProfile {
    let mut env = EnvironmentProfile::default();
    env.os.family = OsFamily::Debian;
    env.os.distro = "ubuntu".into();
    env.os.version = "24.04".into();
    env.os.arch = "x86_64".into();
    env.package_managers.primary = Some("apt".into());
    env.package_managers.available.insert("apt".into());
    env.privileges.can_elevate = true;
    env.service_manager = Some("systemd".into());
    env.hardware.cpu_count = 8;
    env.hardware.memory_mb = 16_384;
    env.network.online = true;
    env.home = Some("/home/dev".into());
    env.path_dirs = vec!["/usr/local/bin".into(), "/usr/bin".into(), "/bin".into()];
    for binary in ["sh", "curl", "apt-get", "systemctl"] {
        env.binaries.insert(binary.into());
    }
    env
}

/// macOS laptop with Homebrew as the package manager
pub fn macos() -> EnvironmentProfile {
    let mut env = EnvironmentProfile::default();
    env.os.family = OsFamily::Macos;
    env.os.distro = "macos".into();
    env.os.arch = "aarch64".into();
    env.package_managers.primary = Some("brew".into());
    env.package_managers.universal.insert("brew".into());
    env.privileges.can_elevate = true;
    env.network.online = true;
    env.home = Some("/Users/dev".into());
    env.path_dirs = vec!["/opt/homebrew/bin".into(), "/usr/bin".into()];
    for binary in ["sh", "curl", "brew"] {
        env.binaries.insert(binary.into());
    }
    env
}

/// Debian container: no service manager, running as root
pub fn container() -> EnvironmentProfile {
    let mut env = debian();
    env.container.in_container = true;
    env.privileges.is_root = true;
    env.binaries.remove("systemctl");
    env
}

/// Scenario recipes: a standalone fallback tool, a dependency chain on
/// system packages, a tool with only unusable mechanisms, and a service
pub fn catalog() -> Catalog {
    let starship = Recipe::tool("starship", "Starship").with_install(
        "fallback",
        "curl -fsSL https://starship.rs/install.sh | sh -s -- -y",
        false,
    );

    let mut python = Recipe::tool("python3", "Python 3")
        .with_install("apt", "apt-get install -y python3", true)
        .with_install("brew", "brew install python", false);
    python
        .requires
        .packages
        .insert("debian".into(), vec!["libssl-dev".into()]);

    let mut poetry = Recipe::tool("poetry", "Poetry").with_install(
        "fallback",
        "curl -sSL https://install.python-poetry.org | python3 -",
        false,
    );
    poetry.requires.binaries = vec!["python3".into()];
    poetry
        .requires
        .packages
        .insert("debian".into(), vec!["build-essential".into()]);
    poetry.path_additions = vec!["$HOME/.local/bin".into()];
    poetry.verify = Some("poetry --version".into());

    let zed = Recipe::tool("zed", "Zed")
        .with_install("flatpak", "flatpak install -y flathub dev.zed.Zed", false)
        .with_install("snap", "snap install zed --classic", true);

    let mut docker = Recipe::tool("docker", "Docker Engine")
        .with_install("apt", "apt-get install -y docker.io", true);
    docker.post_install = vec![
        PostInstallAction {
            label: "Enable the Docker service".into(),
            command: "systemctl enable --now docker".into(),
            condition: Some("has-service-manager".into()),
            needs_sudo: true,
            service: true,
            ..Default::default()
        },
        PostInstallAction {
            label: "Add user to the docker group".into(),
            command: "usermod -aG docker \"$USER\"".into(),
            condition: Some("not-privileged-user".into()),
            needs_sudo: true,
            ..Default::default()
        },
    ];

    let mut uv = Recipe::tool("uv", "uv").with_install(
        "fallback",
        "curl -LsSf https://astral.sh/uv/install.sh | sh",
        false,
    );
    uv.path_additions = vec!["$HOME/.cargo/bin".into()];

    let mut ruff = Recipe::tool("ruff", "Ruff").with_install(
        "fallback",
        "uv tool install ruff",
        false,
    );
    ruff.requires.binaries = vec!["uv".into()];

    let mut hello = Recipe::tool("hello", "GNU Hello");
    hello.kind = RecipeKind::Build {
        stages: vec![
            blueprint::BuildStage {
                label: "configure".into(),
                command: "./configure --prefix=/usr/local".into(),
                needs_sudo: false,
            },
            blueprint::BuildStage {
                label: "install".into(),
                command: "make install".into(),
                needs_sudo: true,
            },
        ],
    };

    [starship, python, poetry, zed, docker, uv, ruff, hello]
        .into_iter()
        .collect()
}
