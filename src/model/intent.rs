//! The structured "why" behind a transition.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{AgentId, IntentId};

/// Identity of whoever (or whatever) proposed a transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub agent_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Agent {
    #[must_use]
    pub fn new(agent_id: AgentId, agent_type: impl Into<String>) -> Self {
        Self {
            agent_id,
            agent_type: agent_type.into(),
            model: None,
            session_id: None,
        }
    }
}

/// An immutable record of the instruction that caused a change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub id: IntentId,
    pub prompt: String,
    pub agent: Agent,
    #[serde(default)]
    pub context_refs: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: f64,
}

impl Intent {
    /// Tag name used to mark a transition as the result of a promote, so
    /// `accept` knows to advance the source lane's fork base.
    pub const PROMOTE_TAG: &'static str = "promote";

    /// Builds the `from:<lane>` tag recorded alongside [`Self::PROMOTE_TAG`].
    #[must_use]
    pub fn from_lane_tag(lane: &crate::ids::LaneName) -> String {
        format!("from:{lane}")
    }

    /// Whether this intent is tagged as a promote from the given lane.
    #[must_use]
    pub fn is_promote_from(&self, lane: &crate::ids::LaneName) -> bool {
        let from_tag = Self::from_lane_tag(lane);
        self.tags.iter().any(|t| t == Self::PROMOTE_TAG) && self.tags.iter().any(|t| t == &from_tag)
    }

    /// The source lane recorded by [`Self::from_lane_tag`], if this intent
    /// is a promote.
    #[must_use]
    pub fn promoted_from_lane(&self) -> Option<crate::ids::LaneName> {
        if !self.tags.iter().any(|t| t == Self::PROMOTE_TAG) {
            return None;
        }
        self.tags.iter().find_map(|t| t.strip_prefix("from:").and_then(|name| name.parse().ok()))
    }

    /// Substring match used by `search_intents`: true if `query` occurs in
    /// the prompt or any tag, case-insensitively.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.prompt.to_lowercase().contains(&query)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Intent {
        Intent {
            id: IntentId::generate(),
            prompt: "Refactor the parser for clarity".to_owned(),
            agent: Agent::new(AgentId::new("agent-1").unwrap(), "coding"),
            context_refs: vec![],
            tags: vec!["parser".to_owned()],
            metadata: Value::Null,
            created_at: 0.0,
        }
    }

    #[test]
    fn matches_is_case_insensitive_on_prompt() {
        assert!(sample().matches("PARSER"));
    }

    #[test]
    fn matches_checks_tags_too() {
        assert!(sample().matches("parser"));
        assert!(!sample().matches("nonexistent"));
    }

    #[test]
    fn is_promote_from_requires_both_tags() {
        let lane = crate::ids::LaneName::new("feature").unwrap();
        let mut intent = sample();
        assert!(!intent.is_promote_from(&lane));
        intent.tags = vec![Intent::PROMOTE_TAG.to_owned(), Intent::from_lane_tag(&lane)];
        assert!(intent.is_promote_from(&lane));
    }
}
