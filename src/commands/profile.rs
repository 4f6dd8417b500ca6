//! Environment profile display

use anyhow::Result;
use blueprint::EnvironmentProfile;

use crate::Context;
use crate::commands::Session;
use crate::ui;

pub fn run(_ctx: &Context, json: bool) -> Result<()> {
    let session = Session::open()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&session.env)?);
    } else {
        show(&session.env);
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn show(env: &EnvironmentProfile) {
    ui::header("Environment");
    ui::kv(
        "OS",
        &format!("{} {} ({})", env.os.distro, env.os.version, env.os.family.as_str()),
    );
    ui::kv("Arch", &env.os.arch);
    ui::kv("Kernel", &env.kernel.release);

    ui::section("Package managers");
    ui::kv("Primary", env.package_managers.primary.as_deref().unwrap_or("none"));
    let available: Vec<&str> = env.package_managers.available.iter().map(String::as_str).collect();
    ui::kv("Available", &available.join(", "));
    let universal: Vec<&str> = env.package_managers.universal.iter().map(String::as_str).collect();
    if !universal.is_empty() {
        ui::kv("Universal", &universal.join(", "));
    }

    ui::section("Privileges");
    ui::kv("Root", yes_no(env.privileges.is_root));
    ui::kv("Can elevate", yes_no(env.privileges.can_elevate));
    ui::kv("Passwordless sudo", yes_no(env.privileges.passwordless));

    ui::section("System");
    ui::kv("Container", yes_no(env.container.in_container));
    if env.container.in_wsl {
        ui::kv("WSL", "yes");
    }
    ui::kv("Service manager", env.service_manager.as_deref().unwrap_or("none"));
    ui::kv("CPUs", &env.hardware.cpu_count.to_string());
    ui::kv("Memory", &format!("{} MB", env.hardware.memory_mb));
    match &env.hardware.gpu {
        Some(gpu) => ui::kv("GPU", &format!("{} {}", gpu.vendor, gpu.model)),
        None => ui::kv("GPU", "none"),
    }
    ui::kv("Kernel headers", yes_no(env.kernel.headers_installed));
    ui::kv("Online", yes_no(env.network.online));
    if let Some(proxy) = &env.network.proxy {
        ui::kv("Proxy", proxy);
    }
    ui::kv("Known binaries", &env.binaries.len().to_string());
}
