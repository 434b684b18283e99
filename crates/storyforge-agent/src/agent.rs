// ABOUTME: Agent persona and single-turn execution against the completion client.
// ABOUTME: A turn yields new messages, a decision summary, and an optional control signal.

use std::sync::Arc;

use storyforge_core::message::{Message, Role};

use crate::client::{ChatMessage, CompletionClient, CompletionError, CompletionRequest};
use crate::tools::{ToolError, ToolOutcome, ToolRegistry};

/// A configured persona: instructions, a permitted tool subset, and the
/// model it runs on. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Agent {
    pub name: String,
    pub instructions: String,
    pub tools: Vec<String>,
    pub model: String,
}

/// Control signal extracted from a turn's tool outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    Handoff(String),
    Consultation { agent: String, question: String },
}

/// Everything one agent turn produced.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub agent_name: String,
    pub messages: Vec<Message>,
    pub decision: String,
    pub signal: Option<ControlSignal>,
}

impl TurnResult {
    /// Content of the last assistant message this turn produced, if any.
    pub fn free_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.text().is_empty())
            .map(Message::text)
    }
}

/// Errors that abort a turn.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        tools: Vec<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            tools,
            model: model.into(),
        }
    }

    pub fn from_config(config: &storyforge_core::config::AgentConfig, model: &str) -> Self {
        Self::new(
            config.name.clone(),
            config.instructions.clone(),
            config.tools.clone(),
            model,
        )
    }

    /// Run one turn: send the transcript (with this agent's instructions
    /// prepended unless the transcript already opens with a system message)
    /// and the schemas for this agent's tools, then fold the reply back into
    /// transcript messages.
    ///
    /// Tool calls execute in the order received. A handoff or consultation
    /// outcome short-circuits the remaining calls of this turn; results of
    /// already-executed calls are kept. Completion and tool errors abort the
    /// turn and propagate.
    pub async fn run_turn(
        &self,
        client: &Arc<dyn CompletionClient>,
        registry: &ToolRegistry,
        transcript: &[Message],
    ) -> Result<TurnResult, TurnError> {
        let mut chat: Vec<ChatMessage> = Vec::with_capacity(transcript.len() + 1);
        if transcript.first().map(|m| m.role) != Some(Role::System) {
            chat.push(ChatMessage::new(
                Role::System.as_str(),
                self.instructions.clone(),
            ));
        }
        chat.extend(transcript.iter().filter_map(to_chat_message));

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: chat,
            tool_schemas: registry.schemas_for(&self.tools),
        };

        let response = client.complete(&request).await?;

        let mut messages = Vec::new();
        let mut tools_used = Vec::new();
        let mut signal = None;

        if let Some(content) = response.content.as_deref().filter(|c| !c.trim().is_empty()) {
            tracing::info!(agent = %self.name, "produced content");
            messages.push(Message::assistant(&self.name, content));
        }

        for call in &response.tool_calls {
            tracing::info!(agent = %self.name, tool = %call.name, "executing tool call");
            // Plain-text results may still carry signals in the legacy wire
            // forms (HANDOFF:<agent>, CONSULTATION:<agent>:<question>).
            let outcome = match registry.execute(&call.name, &call.arguments)? {
                ToolOutcome::Text(text) => ToolOutcome::from_text(&text),
                other => other,
            };
            tools_used.push(call.name.clone());
            match outcome {
                ToolOutcome::Text(text) => {
                    messages.push(Message::tool(&call.name, text));
                }
                ToolOutcome::Handoff(target) => {
                    messages.push(Message::tool(
                        &call.name,
                        format!("Transferred to {target}. Adopt persona immediately."),
                    ));
                    signal = Some(ControlSignal::Handoff(target));
                    break;
                }
                ToolOutcome::Consultation { agent, question } => {
                    messages.push(Message::tool(
                        &call.name,
                        format!("Consulting {agent}: {question}"),
                    ));
                    signal = Some(ControlSignal::Consultation { agent, question });
                    break;
                }
            }
        }

        let decision = describe_turn(&messages, &tools_used, signal.as_ref());
        for message in &mut messages {
            if message.decision.is_none() {
                message.decision = Some(decision.clone());
            }
            if message.role == Role::Tool && message.agent_name.is_none() {
                message.agent_name = Some(self.name.clone());
            }
        }

        Ok(TurnResult {
            agent_name: self.name.clone(),
            messages,
            decision,
            signal,
        })
    }
}

fn to_chat_message(message: &Message) -> Option<ChatMessage> {
    let content = message.content.as_deref()?;
    Some(ChatMessage::new(message.role.as_str(), content))
}

fn describe_turn(
    messages: &[Message],
    tools_used: &[String],
    signal: Option<&ControlSignal>,
) -> String {
    match signal {
        Some(ControlSignal::Handoff(target)) => format!("requested handoff to {target}"),
        Some(ControlSignal::Consultation { agent, .. }) => format!("requested consultation with {agent}"),
        None if !tools_used.is_empty() => format!("used tools: {}", tools_used.join(", ")),
        None if messages.iter().any(|m| m.role == Role::Assistant) => {
            "replied with analysis".to_string()
        }
        None => "produced no output".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CompletionResponse;
    use crate::testing::StubCompletionClient;
    use crate::tools::builtin_registry;
    use serde_json::json;
    use storyforge_core::config::default_roster;

    fn tech_agent() -> Agent {
        let roster = default_roster();
        let config = roster
            .iter()
            .find(|a| a.name == "Technical Requirements Agent")
            .unwrap();
        Agent::from_config(config, "stub-model")
    }

    fn client_with(script: Vec<CompletionResponse>) -> Arc<dyn CompletionClient> {
        Arc::new(StubCompletionClient::with_script(script))
    }

    #[tokio::test]
    async fn turn_prepends_instructions_when_transcript_lacks_system_message() {
        let stub = StubCompletionClient::with_script(vec![CompletionResponse::text("Analysis.")]);
        let requests = stub.requests();
        let client: Arc<dyn CompletionClient> = Arc::new(stub);
        let registry = builtin_registry(&default_roster());
        let agent = tech_agent();

        let transcript = vec![Message::user("As a user, I want to log in.")];
        agent.run_turn(&client, &registry, &transcript).await.unwrap();

        let seen = requests.lock().unwrap();
        let first = &seen[0].messages[0];
        assert_eq!(first.role, "system");
        assert!(first.content.contains("Technical Analyst"));
        assert_eq!(seen[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn turn_does_not_duplicate_leading_system_message() {
        let stub = StubCompletionClient::with_script(vec![CompletionResponse::text("Analysis.")]);
        let requests = stub.requests();
        let client: Arc<dyn CompletionClient> = Arc::new(stub);
        let registry = builtin_registry(&default_roster());
        let agent = tech_agent();

        let transcript = vec![
            Message::system("You are already instructed."),
            Message::user("Story."),
        ];
        agent.run_turn(&client, &registry, &transcript).await.unwrap();

        let seen = requests.lock().unwrap();
        assert_eq!(seen[0].messages.len(), 2);
        assert_eq!(seen[0].messages[0].content, "You are already instructed.");
    }

    #[tokio::test]
    async fn turn_sends_only_the_agents_tool_schemas() {
        let stub = StubCompletionClient::with_script(vec![CompletionResponse::text("Ok.")]);
        let requests = stub.requests();
        let client: Arc<dyn CompletionClient> = Arc::new(stub);
        let registry = builtin_registry(&default_roster());
        let agent = tech_agent();

        agent
            .run_turn(&client, &registry, &[Message::user("Story.")])
            .await
            .unwrap();

        let seen = requests.lock().unwrap();
        let names: Vec<&str> = seen[0]
            .tool_schemas
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), agent.tools.len());
        assert!(names.contains(&"look_up_item"));
        // This agent cannot transfer to itself.
        assert!(!names.contains(&"transfer_to_technical_requirements"));
    }

    #[tokio::test]
    async fn free_text_becomes_tagged_assistant_message() {
        let client = client_with(vec![CompletionResponse::text("The story needs an API contract.")]);
        let registry = builtin_registry(&default_roster());
        let agent = tech_agent();

        let result = agent
            .run_turn(&client, &registry, &[Message::user("Story.")])
            .await
            .unwrap();

        assert_eq!(result.messages.len(), 1);
        let msg = &result.messages[0];
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.agent_name.as_deref(), Some("Technical Requirements Agent"));
        assert_eq!(result.free_text(), Some("The story needs an API contract."));
        assert!(result.signal.is_none());
    }

    #[tokio::test]
    async fn handoff_short_circuits_remaining_tool_calls() {
        let response = CompletionResponse {
            content: None,
            tool_calls: vec![
                crate::client::ToolInvocation {
                    name: "look_up_item".to_string(),
                    arguments: json!({ "item_id": "7" }),
                },
                crate::client::ToolInvocation {
                    name: "transfer_to_master".to_string(),
                    arguments: json!({}),
                },
                crate::client::ToolInvocation {
                    name: "look_up_item".to_string(),
                    arguments: json!({ "item_id": "8" }),
                },
            ],
        };
        let client = client_with(vec![response]);
        let registry = builtin_registry(&default_roster());
        let agent = tech_agent();

        let result = agent
            .run_turn(&client, &registry, &[Message::user("Story.")])
            .await
            .unwrap();

        // First lookup ran, handoff recorded, third call never executed.
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[0].tools_used, vec!["look_up_item".to_string()]);
        assert_eq!(
            result.signal,
            Some(ControlSignal::Handoff("Master Agent".to_string()))
        );
        assert!(result.decision.contains("handoff to Master Agent"));
    }

    #[tokio::test]
    async fn consultation_signal_is_extracted() {
        let client = client_with(vec![CompletionResponse::tool_call(
            "consult_agent",
            json!({ "agent_name": "Quality Assurance Agent", "question": "Testable?" }),
        )]);
        let registry = builtin_registry(&default_roster());
        let agent = tech_agent();

        let result = agent
            .run_turn(&client, &registry, &[Message::user("Story.")])
            .await
            .unwrap();

        assert_eq!(
            result.signal,
            Some(ControlSignal::Consultation {
                agent: "Quality Assurance Agent".to_string(),
                question: "Testable?".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn plain_text_tool_result_can_carry_wire_form_signal() {
        let mut registry = builtin_registry(&default_roster());
        registry.register(
            crate::tools::ToolDescriptor::new(
                "route_story",
                "Route the story to the right specialist.",
            ),
            |_| {
                Ok(crate::tools::ToolOutcome::Text(
                    "HANDOFF:Master Agent".to_string(),
                ))
            },
        );
        let mut agent = tech_agent();
        agent.tools.push("route_story".to_string());

        let client = client_with(vec![CompletionResponse::tool_call("route_story", json!({}))]);
        let result = agent
            .run_turn(&client, &registry, &[Message::user("Story.")])
            .await
            .unwrap();

        assert_eq!(
            result.signal,
            Some(ControlSignal::Handoff("Master Agent".to_string()))
        );
    }

    #[tokio::test]
    async fn unknown_tool_aborts_the_turn() {
        let client = client_with(vec![CompletionResponse::tool_call(
            "nonexistent_tool",
            json!({}),
        )]);
        let registry = builtin_registry(&default_roster());
        let agent = tech_agent();

        let err = agent
            .run_turn(&client, &registry, &[Message::user("Story.")])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TurnError::Tool(ToolError::NotFound(name)) if name == "nonexistent_tool"
        ));
    }
}
