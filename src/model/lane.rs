//! Named parallel workstreams.

use serde::{Deserialize, Serialize};

use crate::ids::{LaneName, StateId};
use crate::model::budget::{BudgetConfig, CostRecord};

/// A lane's persisted record. `fork_base` is set once at creation and
/// advanced only by an accepted promote-tagged transition — it is never
/// recomputed by walking the state graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub name: LaneName,
    pub head_state: Option<StateId>,
    pub fork_base: Option<StateId>,
    pub created_at: f64,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub spent: CostRecord,
}

impl Lane {
    /// A freshly created lane with both head and fork base at `base`.
    #[must_use]
    pub fn new(name: LaneName, base: Option<StateId>, created_at: f64) -> Self {
        Self {
            name,
            head_state: base.clone(),
            fork_base: base,
            created_at,
            budget: BudgetConfig::default(),
            spent: CostRecord::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lane_has_matching_head_and_fork_base() {
        let lane = Lane::new(LaneName::new("main").unwrap(), None, 0.0);
        assert_eq!(lane.head_state, lane.fork_base);
    }
}
