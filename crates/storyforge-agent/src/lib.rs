// ABOUTME: Orchestration engine for storyforge: completion client, tool registry,
// ABOUTME: agent turn execution, and the Swarm refinement loop.

pub mod agent;
pub mod client;
pub mod swarm;
pub mod testing;
pub mod tools;

pub use agent::{Agent, ControlSignal, TurnError, TurnResult};
pub use client::{
    CompletionClient, CompletionError, CompletionRequest, CompletionResponse, OpenAiClient,
    ToolInvocation, create_completion_client,
};
pub use swarm::{CancelFlag, Swarm, SwarmError, SwarmResponse};
pub use tools::{ParamKind, ToolDescriptor, ToolError, ToolOutcome, ToolParam, ToolRegistry};
