// ABOUTME: Defines the transcript message types exchanged between agents during a run.
// ABOUTME: Also defines PerformanceMetrics, the per-run measurements attached to a result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// The originator class of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
    Assistant,
    Tool,
}

impl Role {
    /// Wire-format name of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::System => "system",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a run's transcript. The transcript is append-only:
/// messages are created, never edited or reordered.
///
/// Assistant messages with content always carry the acting agent's name;
/// the constructors enforce this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Ulid,
    pub role: Role,
    pub content: Option<String>,
    pub agent_name: Option<String>,
    /// Short annotation of what happened at this step, for the interaction log.
    pub decision: Option<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn base(role: Role, content: Option<String>) -> Self {
        Self {
            message_id: Ulid::new(),
            role,
            content,
            agent_name: None,
            decision: None,
            tools_used: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// A message authored by the human caller.
    pub fn user(content: impl Into<String>) -> Self {
        Self::base(Role::User, Some(content.into()))
    }

    /// An instruction or orchestration note injected by the system.
    pub fn system(content: impl Into<String>) -> Self {
        Self::base(Role::System, Some(content.into()))
    }

    /// Free text produced by a named agent.
    pub fn assistant(agent_name: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::base(Role::Assistant, Some(content.into()));
        msg.agent_name = Some(agent_name.into());
        msg
    }

    /// The result of executing a named tool.
    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::base(Role::Tool, Some(content.into()));
        msg.tools_used = vec![tool_name.into()];
        msg
    }

    /// Attach a decision annotation describing what this step did.
    pub fn with_decision(mut self, decision: impl Into<String>) -> Self {
        self.decision = Some(decision.into());
        self
    }

    /// The message text, or "" when the message carries no content.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Measurements computed once per run and returned alongside the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Wall-clock duration of the run in seconds.
    pub execution_time: f64,
    /// Number of clarification rounds the refinement loop used.
    pub iterations_used: u32,
    /// Structural quality of the final story, in [0, 1].
    pub quality_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_messages_carry_agent_name() {
        let msg = Message::assistant("Quality Assurance Agent", "Looks testable to me.");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.agent_name.as_deref(), Some("Quality Assurance Agent"));
        assert_eq!(msg.text(), "Looks testable to me.");
    }

    #[test]
    fn tool_messages_record_the_tool_used() {
        let msg = Message::tool("look_up_item", "Item 42 details: ...");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tools_used, vec!["look_up_item".to_string()]);
        assert!(msg.agent_name.is_none());
    }

    #[test]
    fn message_round_trip() {
        let msg = Message::user("As a user, I want to log in.").with_decision("initial story");
        let json = serde_json::to_string(&msg).expect("serialize");
        let deser: Message = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(msg.message_id, deser.message_id);
        assert_eq!(deser.role, Role::User);
        assert_eq!(deser.decision.as_deref(), Some("initial story"));
    }

    #[test]
    fn role_wire_names() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::System.as_str(), "system");
        assert_eq!(Role::Assistant.as_str(), "assistant");
        assert_eq!(Role::Tool.as_str(), "tool");
    }
}
