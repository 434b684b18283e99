// ABOUTME: Core library for storyforge, containing the shared transcript data model,
// ABOUTME: run configuration, output validation, scoring strategies, and the fallback synthesizer.

pub mod config;
pub mod fallback;
pub mod message;
pub mod scoring;
pub mod validate;

pub use config::{AgentConfig, RunConfig, MASTER_AGENT};
pub use message::{Message, PerformanceMetrics, Role};
