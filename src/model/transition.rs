//! The causal link between two states.

use serde::{Deserialize, Serialize};

use crate::ids::{IntentId, LaneName, StateId, TransitionId};
use crate::model::budget::CostRecord;

/// Lifecycle status of a transition. Exactly the values named in the
/// external status vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStatus {
    Proposed,
    Evaluating,
    Accepted,
    Rejected,
    Superseded,
}

impl TransitionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Evaluating => "evaluating",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Superseded => "superseded",
        }
    }
}

impl std::fmt::Display for TransitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransitionStatus {
    type Err = crate::ids::ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(Self::Proposed),
            "evaluating" => Ok(Self::Evaluating),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "superseded" => Ok(Self::Superseded),
            other => Err(crate::ids::ValidationError {
                value: other.to_owned(),
                reason: "expected proposed, evaluating, accepted, rejected, or superseded".to_owned(),
            }),
        }
    }
}

/// The verdict attached to a transition by an evaluator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub passed: bool,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl EvaluationResult {
    #[must_use]
    pub fn passed(summary: impl Into<String>) -> Self {
        Self {
            passed: true,
            summary: summary.into(),
            detail: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn failed(summary: impl Into<String>) -> Self {
        Self {
            passed: false,
            summary: summary.into(),
            detail: serde_json::Value::Null,
        }
    }
}

/// A proposed (and possibly evaluated) move from one state to another on a
/// lane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: TransitionId,
    pub from_state: Option<StateId>,
    pub to_state: StateId,
    pub intent_id: IntentId,
    pub lane: LaneName,
    pub status: TransitionStatus,
    #[serde(default)]
    pub evaluation: Option<EvaluationResult>,
    #[serde(default)]
    pub cost: CostRecord,
    pub created_at: f64,
    pub updated_at: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            TransitionStatus::Proposed,
            TransitionStatus::Evaluating,
            TransitionStatus::Accepted,
            TransitionStatus::Rejected,
            TransitionStatus::Superseded,
        ] {
            assert_eq!(TransitionStatus::from_str(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn status_rejects_unknown() {
        assert!(TransitionStatus::from_str("pending").is_err());
    }
}
