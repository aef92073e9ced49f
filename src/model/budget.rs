//! Per-lane cost accounting.

use serde::{Deserialize, Serialize};

/// A lane's configured spending limits. All limits are optional; `None`
/// means unbounded on that dimension.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_out: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_api_calls: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wall_time_ms: Option<u64>,
    /// Percentage (0-100) of a limit at which a warning is emitted instead
    /// of a hard failure. Default 90.
    #[serde(default = "default_alert_threshold_pct")]
    pub alert_threshold_pct: u8,
}

fn default_alert_threshold_pct() -> u8 {
    90
}

/// Accumulated spend, folded in from each accepted transition's cost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostRecord {
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub api_calls: u64,
    #[serde(default)]
    pub wall_time_ms: u64,
}

impl CostRecord {
    /// Returns `self + other`, saturating rather than overflowing.
    #[must_use]
    pub fn plus(&self, other: &Self) -> Self {
        Self {
            tokens_in: self.tokens_in.saturating_add(other.tokens_in),
            tokens_out: self.tokens_out.saturating_add(other.tokens_out),
            api_calls: self.api_calls.saturating_add(other.api_calls),
            wall_time_ms: self.wall_time_ms.saturating_add(other.wall_time_ms),
        }
    }
}

/// One dimension of a budget that was exceeded or is approaching its limit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BudgetCheck {
    pub dimension: &'static str,
    pub limit: u64,
    pub would_be: u64,
}

/// Checks a proposed additional cost against a lane's accumulated spend and
/// configured limits.
///
/// Returns `Err(exceeded)` for the first dimension that would go over its
/// hard limit, and a list of dimensions within the alert threshold (for the
/// caller to log a warning) alongside `Ok(warnings)` otherwise.
pub fn check_budget(
    config: &BudgetConfig,
    spent: &CostRecord,
    additional: &CostRecord,
) -> Result<Vec<BudgetCheck>, BudgetCheck> {
    let total = spent.plus(additional);
    let dims: [(Option<u64>, &'static str, u64); 4] = [
        (config.max_tokens_in, "max_tokens_in", total.tokens_in),
        (config.max_tokens_out, "max_tokens_out", total.tokens_out),
        (config.max_api_calls, "max_api_calls", total.api_calls),
        (config.max_wall_time_ms, "max_wall_time_ms", total.wall_time_ms),
    ];
    let mut warnings = Vec::new();
    for (limit, name, would_be) in dims {
        let Some(limit) = limit else { continue };
        if would_be > limit {
            return Err(BudgetCheck {
                dimension: name,
                limit,
                would_be,
            });
        }
        let threshold = u128::from(limit) * u128::from(config.alert_threshold_pct) / 100;
        if u128::from(would_be) >= threshold {
            warnings.push(BudgetCheck {
                dimension: name,
                limit,
                would_be,
            });
        }
    }
    Ok(warnings)
}
