//! Risk levels shared by recipes, options and plan steps

use serde::{Deserialize, Serialize};
use std::fmt;

/// How much damage a change can do if it goes wrong
///
/// Ordered so that `max()` yields the aggregate risk of a set.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// User-space only, trivially reversible
    #[default]
    Low,
    /// Touches system packages or services
    Medium,
    /// Drivers, kernel modules, boot configuration
    High,
    /// Can leave the machine unbootable
    Critical,
}

impl RiskLevel {
    /// Lowercase name used in catalogs and output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Whether this level needs a typed confirmation
    pub fn is_high(&self) -> bool {
        *self >= Self::High
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
