//! `{name}` placeholders in command templates
//!
//! Shell expansions such as `${HOME}` are left untouched; only bare
//! lowercase `{name}` placeholders are substituted.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\$?)\{([a-z][a-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Substitute known placeholders, leaving unknown ones in place
pub fn render(template: &str, values: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let whole = caps[0].to_string();
            if !caps[1].is_empty() {
                return whole;
            }
            values.get(&caps[2]).cloned().unwrap_or(whole)
        })
        .into_owned()
}

/// Names of the placeholders a template still contains
pub fn placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(template)
        .filter(|caps| caps[1].is_empty())
        .map(|caps| caps[2].to_string())
        .collect()
}
