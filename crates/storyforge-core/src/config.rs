// ABOUTME: Per-run configuration and the default specialist agent roster.
// ABOUTME: RunConfig is passed by value; adaptive tuning is an explicit output, never shared mutation.

use serde::{Deserialize, Serialize};

use crate::message::PerformanceMetrics;

/// Name of the agent that coordinates every run. Exactly one roster entry
/// must carry this name.
pub const MASTER_AGENT: &str = "Master Agent";

/// Upper bound `tuned` will suggest for clarification rounds.
const MAX_TUNED_ROUNDS: u32 = 6;

/// Declarative definition of one roster member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub instructions: String,
    /// Names of registry tools this agent may invoke, in priority order.
    pub tools: Vec<String>,
}

impl AgentConfig {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        tools: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            tools,
        }
    }
}

/// Knobs for a single orchestration run. Owned by the caller and passed by
/// value; concurrent runs never observe another run's adjustments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum clarification rounds the refinement loop may take.
    pub max_clarification_rounds: u32,
    /// Minimum quality score at which the loop stops refining, in [0, 1].
    pub quality_threshold: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_clarification_rounds: 3,
            quality_threshold: 0.8,
        }
    }
}

impl RunConfig {
    /// Suggest knobs for the *next* run based on what the last run achieved.
    ///
    /// Returns a new config; the source config is untouched. Callers decide
    /// whether to apply the suggestion.
    pub fn tuned(&self, metrics: &PerformanceMetrics) -> RunConfig {
        let mut next = *self;
        if metrics.quality_score < self.quality_threshold {
            next.max_clarification_rounds =
                (self.max_clarification_rounds + 1).min(MAX_TUNED_ROUNDS);
        } else if metrics.iterations_used == 0 && self.max_clarification_rounds > 1 {
            next.max_clarification_rounds = self.max_clarification_rounds - 1;
        }
        next
    }
}

fn tools(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// The default five-agent roster: one Master coordinator plus four
/// specialists. Each specialist can hand off to the others and consult
/// peers; the technical agent additionally has the domain lookup tool.
pub fn default_roster() -> Vec<AgentConfig> {
    vec![
        AgentConfig::new(
            MASTER_AGENT,
            "You are a Lead Business Analyst. Your role is to oversee and guide the \
             improvement of user stories. Ensure that all user stories are clear, \
             comprehensive, and actionable, meeting a high standard for developer \
             usability. Provide a final, refined user story that incorporates the \
             feedback from the supporting specialists.",
            tools(&[
                "transfer_to_technical_requirements",
                "transfer_to_user_experience",
                "transfer_to_quality_assurance",
                "transfer_to_stakeholder_liaison",
            ]),
        ),
        AgentConfig::new(
            "Technical Requirements Agent",
            "You are a Technical Analyst. Focus on the technical feasibility and \
             requirements of the user story. Identify potential technical risks or \
             needs for technical clarity. Suggest specific technical refinements to \
             align the user story with development capabilities, and provide \
             concrete technical acceptance criteria.",
            tools(&[
                "look_up_item",
                "consult_agent",
                "transfer_to_user_experience",
                "transfer_to_quality_assurance",
                "transfer_to_stakeholder_liaison",
                "transfer_to_master",
            ]),
        ),
        AgentConfig::new(
            "User Experience Agent",
            "You are a UX Designer. Ensure the user story reflects end-user needs and \
             usability standards. Recommend specific adjustments for user-centered \
             design principles, highlight areas where user needs should be more \
             explicitly addressed, and suggest usability-focused acceptance criteria.",
            tools(&[
                "consult_agent",
                "transfer_to_technical_requirements",
                "transfer_to_quality_assurance",
                "transfer_to_stakeholder_liaison",
                "transfer_to_master",
            ]),
        ),
        AgentConfig::new(
            "Quality Assurance Agent",
            "You are a QA Specialist. Focus on making the user story testable and \
             ensuring clarity for QA. Suggest specific revisions for clear, \
             measurable acceptance criteria, identify areas where the story lacks \
             testable components, and propose edge cases that should be considered.",
            tools(&[
                "consult_agent",
                "transfer_to_technical_requirements",
                "transfer_to_user_experience",
                "transfer_to_stakeholder_liaison",
                "transfer_to_master",
            ]),
        ),
        AgentConfig::new(
            "Stakeholder Liaison Agent",
            "You are a Stakeholder Representative. Ensure alignment with business \
             priorities and stakeholder needs. Provide feedback on business \
             objectives and strategic considerations, suggest refinements that \
             enhance the story's value proposition, and propose business-oriented \
             acceptance criteria.",
            tools(&[
                "consult_agent",
                "transfer_to_technical_requirements",
                "transfer_to_user_experience",
                "transfer_to_quality_assurance",
                "transfer_to_master",
            ]),
        ),
    ]
}
