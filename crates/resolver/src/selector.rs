//! Method selection
//!
//! Picks the mechanism a recipe is installed with on a given environment.
//! Order:
//!
//! 1. the recipe's `prefer` list, keeping only mechanisms usable here
//! 2. the environment's primary package manager
//! 3. an installed universal packaging system (snap, brew, flatpak)
//! 4. the recipe's `fallback` command
//! 5. any mechanism whose program happens to be on the search path
//!
//! Returning `None` is not an error here; the collector reports it.

use blueprint::mechanism::{FALLBACK, UNIVERSAL_ORDER};
use blueprint::{EnvironmentProfile, MechanismRegistry, Recipe, RecipeKind};

/// Select the install mechanism for a recipe
pub fn select(
    recipe: &Recipe,
    env: &EnvironmentProfile,
    registry: &MechanismRegistry,
) -> Option<String> {
    if !matches!(recipe.kind, RecipeKind::Tool { .. }) {
        return recipe.mechanisms().first().map(|m| (*m).to_string());
    }
    let family = env.os.family;
    let defines = |mechanism: &str| recipe.supports(mechanism, family);

    if let Some(preferred) = recipe
        .prefer
        .iter()
        .find(|m| defines(m.as_str()) && registry.is_usable(m.as_str(), env))
    {
        return Some(preferred.clone());
    }

    if let Some(primary) = env.primary_package_manager()
        && defines(primary)
    {
        return Some(primary.to_string());
    }

    if let Some(universal) = UNIVERSAL_ORDER
        .iter()
        .find(|&&m| defines(m) && env.has_universal(m))
    {
        return Some((*universal).to_string());
    }

    if defines(FALLBACK) {
        return Some(FALLBACK.to_string());
    }

    recipe
        .mechanisms()
        .into_iter()
        .find(|&m| defines(m) && registry.program_present(m, env))
        .map(str::to_string)
}

/// Mechanisms the recipe defines that cannot be used on this environment
pub fn unusable(
    recipe: &Recipe,
    env: &EnvironmentProfile,
    registry: &MechanismRegistry,
) -> Vec<String> {
    recipe
        .mechanisms()
        .into_iter()
        .filter(|m| !registry.is_usable(m, env) || !recipe.supports(m, env.os.family))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{debian, macos};

    fn registry() -> MechanismRegistry {
        MechanismRegistry::builtin()
    }

    #[test]
    fn test_primary_package_manager_wins() {
        let recipe = Recipe::tool("jq", "jq")
            .with_install("apt", "apt-get install -y jq", true)
            .with_install("brew", "brew install jq", false);
        assert_eq!(select(&recipe, &debian(), &registry()).as_deref(), Some("apt"));
        assert_eq!(select(&recipe, &macos(), &registry()).as_deref(), Some("brew"));
    }

    #[test]
    fn test_preference_skips_unusable() {
        let mut recipe = Recipe::tool("code", "VS Code")
            .with_install("snap", "snap install code --classic", true)
            .with_install("apt", "apt-get install -y code", true);
        recipe.prefer = vec!["snap".into()];

        let env = debian();
        assert_eq!(select(&recipe, &env, &registry()).as_deref(), Some("apt"));

        let mut with_snap = debian();
        with_snap.package_managers.universal.insert("snap".into());
        assert_eq!(select(&recipe, &with_snap, &registry()).as_deref(), Some("snap"));
    }

    #[test]
    fn test_universal_then_fallback() {
        let recipe = Recipe::tool("zed", "Zed")
            .with_install("flatpak", "flatpak install -y dev.zed.Zed", false)
            .with_install("fallback", "curl -fsSL https://zed.dev/install.sh | sh", false);
        assert_eq!(select(&recipe, &debian(), &registry()).as_deref(), Some("fallback"));

        let mut env = debian();
        env.package_managers.universal.insert("flatpak".into());
        assert_eq!(select(&recipe, &env, &registry()).as_deref(), Some("flatpak"));
    }

    #[test]
    fn test_last_resort_program_on_path() {
        let recipe = Recipe::tool("ruff", "ruff").with_install("pip", "pip3 install ruff", false);
        assert_eq!(select(&recipe, &debian(), &registry()), None);

        let mut env = debian();
        env.binaries.insert("pip3".into());
        assert_eq!(select(&recipe, &env, &registry()).as_deref(), Some("pip"));
    }

    #[test]
    fn test_unusable_lists_missing_mechanisms() {
        let recipe = Recipe::tool("zed", "Zed")
            .with_install("flatpak", "flatpak install -y dev.zed.Zed", false)
            .with_install("snap", "snap install zed", true);
        assert_eq!(select(&recipe, &debian(), &registry()), None);
        assert_eq!(unusable(&recipe, &debian(), &registry()), vec!["flatpak", "snap"]);
    }
}
