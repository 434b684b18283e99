// ABOUTME: Declarative tool descriptors, the registry that executes them, and ToolOutcome.
// ABOUTME: Handoff and consultation are closed enum variants, not string prefixes.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};

use storyforge_core::config::AgentConfig;

/// Parameter types a tool can declare. Each maps to one JSON Schema type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Text,
    Integer,
    Real,
    Boolean,
    Sequence,
    Mapping,
    Null,
}

impl ParamKind {
    /// JSON Schema type name for this kind.
    pub fn json_type(&self) -> &'static str {
        match self {
            ParamKind::Text => "string",
            ParamKind::Integer => "integer",
            ParamKind::Real => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Sequence => "array",
            ParamKind::Mapping => "object",
            ParamKind::Null => "null",
        }
    }
}

/// One declared tool parameter.
#[derive(Debug, Clone)]
pub struct ToolParam {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
}

/// Declarative description of a callable tool, populated at registration
/// time. Replaces per-call reflection over the callable.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Add a required parameter.
    pub fn param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ToolParam {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// Add an optional parameter.
    pub fn optional_param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ToolParam {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    /// Render the invocation schema sent to the completion service.
    pub fn schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            properties.insert(
                param.name.clone(),
                json!({ "type": param.kind.json_type() }),
            );
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        })
    }
}

/// Result of executing a tool. Handoff and consultation are first-class
/// variants so the orchestrator switches on a closed type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Opaque result text, surfaced into the transcript.
    Text(String),
    /// Transfer primary control to the named agent.
    Handoff(String),
    /// Ask the named agent a side question without transferring control.
    Consultation { agent: String, question: String },
}

impl ToolOutcome {
    /// Interpret the legacy wire forms `HANDOFF:<agent>` and
    /// `CONSULTATION:<agent>:<question>`; anything else is opaque text.
    pub fn from_text(text: &str) -> ToolOutcome {
        if let Some(agent) = text.strip_prefix("HANDOFF:") {
            return ToolOutcome::Handoff(agent.trim().to_string());
        }
        if let Some(rest) = text.strip_prefix("CONSULTATION:") {
            if let Some((agent, question)) = rest.split_once(':') {
                return ToolOutcome::Consultation {
                    agent: agent.trim().to_string(),
                    question: question.trim().to_string(),
                };
            }
        }
        ToolOutcome::Text(text.to_string())
    }
}

/// Errors from tool execution. An unregistered name is fatal to the turn.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool '{0}' is not registered")]
    NotFound(String),

    #[error("invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },
}

type ToolHandler = Arc<dyn Fn(&Value) -> Result<ToolOutcome, ToolError> + Send + Sync>;

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: ToolHandler,
}

/// Maps tool names to descriptors and handlers, preserving registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A re-registered name replaces the previous entry but
    /// keeps its original position.
    pub fn register<F>(&mut self, descriptor: ToolDescriptor, handler: F)
    where
        F: Fn(&Value) -> Result<ToolOutcome, ToolError> + Send + Sync + 'static,
    {
        let name = descriptor.name.clone();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(
            name,
            RegisteredTool {
                descriptor,
                handler: Arc::new(handler),
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Execute the named tool. Unknown names fail loudly.
    pub fn execute(&self, name: &str, arguments: &Value) -> Result<ToolOutcome, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        (tool.handler)(arguments)
    }

    /// Schemas for exactly the named subset, in the given order. Names not
    /// present in the registry are skipped with a warning.
    pub fn schemas_for(&self, names: &[String]) -> Vec<Value> {
        names
            .iter()
            .filter_map(|name| match self.tools.get(name) {
                Some(tool) => Some(tool.descriptor.schema()),
                None => {
                    tracing::warn!(tool = %name, "agent references unregistered tool, skipping");
                    None
                }
            })
            .collect()
    }
}

fn required_text_arg(arguments: &Value, tool: &str, name: &str) -> Result<String, ToolError> {
    arguments
        .get(name)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("missing required string argument '{name}'"),
        })
}

/// Registry-name slug for a roster member: the name minus any trailing
/// " Agent", lowercased, spaces replaced with underscores.
pub fn transfer_tool_name(agent_name: &str) -> String {
    let base = agent_name.strip_suffix(" Agent").unwrap_or(agent_name);
    let slug: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("transfer_to_{slug}")
}

/// Build the standard registry for a roster: one transfer tool per member,
/// the domain lookup, and the peer consultation tool.
pub fn builtin_registry(roster: &[AgentConfig]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolDescriptor::new(
            "look_up_item",
            "Look up a domain item by its identifier and return its details.",
        )
        .param("item_id", ParamKind::Text),
        |arguments| {
            let item_id = required_text_arg(arguments, "look_up_item", "item_id")?;
            Ok(ToolOutcome::Text(format!("Item {item_id} details: ...")))
        },
    );

    for agent in roster {
        let target = agent.name.clone();
        let tool_name = transfer_tool_name(&target);
        registry.register(
            ToolDescriptor::new(
                tool_name,
                format!("Transfer the conversation to the {target}."),
            ),
            move |_arguments| Ok(ToolOutcome::Handoff(target.clone())),
        );
    }

    registry.register(
        ToolDescriptor::new(
            "consult_agent",
            "Ask another specialist a question without transferring the conversation.",
        )
        .param("agent_name", ParamKind::Text)
        .param("question", ParamKind::Text),
        |arguments| {
            let agent = required_text_arg(arguments, "consult_agent", "agent_name")?;
            let question = required_text_arg(arguments, "consult_agent", "question")?;
            Ok(ToolOutcome::Consultation { agent, question })
        },
    );

    registry
}
