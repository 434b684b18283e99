// ABOUTME: The Swarm orchestrator: context analysis, triage, sequential collaboration with
// ABOUTME: confidence-gated consultation and handoffs, then a quality-gated refinement loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;

use storyforge_core::config::{MASTER_AGENT, RunConfig};
use storyforge_core::fallback::synthesize_fallback;
use storyforge_core::message::{Message, PerformanceMetrics};
use storyforge_core::scoring::{
    CONFIDENCE_THRESHOLD, ConfidenceScorer, HeuristicConfidence, HeuristicQuality, QualityScorer,
};
use storyforge_core::validate::validate_story;

use crate::agent::{Agent, ControlSignal, TurnError};
use crate::client::{ChatMessage, CompletionClient, CompletionError, CompletionRequest};
use crate::tools::ToolRegistry;

/// Structural-validation retry budget for the final summary.
const SUMMARY_ATTEMPTS: usize = 5;

/// Maximum consecutive handoffs followed before the chain is cut.
const MAX_HANDOFF_HOPS: usize = 3;

/// Cooperative cancellation flag shared between a run and its caller.
/// Checked between agent turns and refinement rounds; an in-flight
/// completion call is never aborted.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear the flag so the handle can gate a fresh run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Errors that end a run without a result.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("agent roster is missing the master agent")]
    MissingMaster,

    #[error("duplicate agent name in roster: {0}")]
    DuplicateAgent(String),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("run cancelled")]
    Cancelled,
}

/// The completed result of one run: final story, full transcript, the
/// specialist interaction log, and metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SwarmResponse {
    pub agent_name: String,
    pub messages: Vec<Message>,
    pub optimized: String,
    pub agent_interactions: Vec<Message>,
    pub performance_metrics: PerformanceMetrics,
}

/// Owns the agent roster and drives a full optimization run. Shared
/// immutably across concurrent runs; per-run knobs arrive by value.
pub struct Swarm {
    agents: HashMap<String, Agent>,
    /// Roster order, used for consultation fan-out and triage display.
    order: Vec<String>,
    registry: ToolRegistry,
    client: Arc<dyn CompletionClient>,
    quality: Box<dyn QualityScorer>,
    confidence: Box<dyn ConfidenceScorer>,
}

impl std::fmt::Debug for Swarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swarm")
            .field("agents", &self.agents.keys().collect::<Vec<_>>())
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl Swarm {
    /// Build a swarm from a roster. Fails if the roster has no master agent
    /// or contains duplicate names.
    pub fn new(
        agents: Vec<Agent>,
        registry: ToolRegistry,
        client: Arc<dyn CompletionClient>,
    ) -> Result<Self, SwarmError> {
        let mut map = HashMap::new();
        let mut order = Vec::new();
        for agent in agents {
            if map.contains_key(&agent.name) {
                return Err(SwarmError::DuplicateAgent(agent.name));
            }
            order.push(agent.name.clone());
            map.insert(agent.name.clone(), agent);
        }
        if !map.contains_key(MASTER_AGENT) {
            return Err(SwarmError::MissingMaster);
        }
        Ok(Self {
            agents: map,
            order,
            registry,
            client,
            quality: Box::new(HeuristicQuality),
            confidence: Box::new(HeuristicConfidence),
        })
    }

    /// Replace the quality scoring strategy.
    pub fn with_quality_scorer(mut self, scorer: Box<dyn QualityScorer>) -> Self {
        self.quality = scorer;
        self
    }

    /// Replace the confidence scoring strategy.
    pub fn with_confidence_scorer(mut self, scorer: Box<dyn ConfidenceScorer>) -> Self {
        self.confidence = scorer;
        self
    }

    fn master(&self) -> &Agent {
        // Presence is guaranteed by the constructor.
        &self.agents[MASTER_AGENT]
    }

    /// One master call summarizing the story's intent. The prompt forbids
    /// introducing requirements absent from the input; that is a guardrail
    /// on the model, not a constraint this code can enforce on the output.
    pub async fn analyze_context(
        &self,
        story: &str,
        epic_context: Option<&str>,
        story_context: Option<&str>,
    ) -> Result<String, SwarmError> {
        let prompt = format!(
            "Analyze the following user story and provide a brief summary of its main \
             intent, focusing on the specific task or goal the user wants to achieve. \
             Consider the epic and story context if provided. Do not introduce \
             additional processes or requirements not explicitly mentioned.\n\n\
             User Story: {story}\n\n\
             Epic Context: {}\n\n\
             Story Context: {}",
            epic_context.unwrap_or("Not provided"),
            story_context.unwrap_or("Not provided"),
        );
        self.agent_reply(self.master(), prompt).await
    }

    /// One master call selecting the relevant specialists. The reply is
    /// filtered to names actually present in the roster; hallucinated or
    /// malformed names are dropped, and the master never triages itself.
    pub async fn triage(
        &self,
        story: &str,
        context_summary: &str,
    ) -> Result<Vec<String>, SwarmError> {
        let specialists: Vec<&str> = self
            .order
            .iter()
            .filter(|n| n.as_str() != MASTER_AGENT)
            .map(String::as_str)
            .collect();
        let prompt = format!(
            "Name only the specialist agents relevant to improving this user story. \
             Available specialists: {}. Reply with a comma-separated list of agent \
             names and nothing else.\n\n\
             User Story: {story}\n\n\
             Context: {context_summary}",
            specialists.join(", "),
        );
        let reply = self.agent_reply(self.master(), prompt).await?;
        Ok(self.filter_roster_names(&reply))
    }

    fn filter_roster_names(&self, reply: &str) -> Vec<String> {
        let mut selected: Vec<String> = Vec::new();
        for part in reply.split(',') {
            let name = part.trim().trim_start_matches('-').trim();
            if name.is_empty() || name == MASTER_AGENT {
                continue;
            }
            if !self.agents.contains_key(name) {
                tracing::warn!(agent = %name, "triage named an unknown agent, dropping");
                continue;
            }
            if !selected.iter().any(|s| s == name) {
                selected.push(name.to_string());
            }
        }
        selected
    }

    /// Run the full pipeline for one story and return the validated result.
    pub async fn optimize(
        &self,
        story: &str,
        epic_context: Option<&str>,
        story_context: Option<&str>,
        config: RunConfig,
        cancel: &CancelFlag,
    ) -> Result<SwarmResponse, SwarmError> {
        let started = Instant::now();

        let context = self.analyze_context(story, epic_context, story_context).await?;
        tracing::info!(context = %truncate(&context, 100), "context analysis complete");

        let triaged = self.triage(story, &context).await?;
        tracing::info!(agents = ?triaged, "triage selected specialists");

        let mut transcript = vec![
            Message::system(&self.master().instructions),
            Message::user(story),
            Message::system(format!("Context Analysis: {context}")),
        ];
        let mut interactions: Vec<Message> = Vec::new();
        let mut current_agent = MASTER_AGENT.to_string();

        for name in &triaged {
            if cancel.is_cancelled() {
                return Err(SwarmError::Cancelled);
            }
            let Some(agent) = self.agents.get(name) else {
                continue;
            };

            transcript.push(Message::user(format!(
                "As {name}, optimize this user story, focusing only on: {context}"
            )));

            let turn = match agent.run_turn(&self.client, &self.registry, &transcript).await {
                Ok(turn) => turn,
                Err(TurnError::Tool(e)) => {
                    tracing::error!(agent = %name, error = %e, "turn aborted by tool failure");
                    continue;
                }
                Err(TurnError::Completion(e)) => return Err(e.into()),
            };
            transcript.extend(turn.messages.iter().cloned());
            interactions.extend(turn.messages.iter().cloned());
            current_agent = turn.agent_name.clone();

            if let Some(text) = turn.free_text() {
                let confidence = self.confidence.confidence(text);
                if confidence < CONFIDENCE_THRESHOLD {
                    tracing::info!(
                        agent = %name,
                        confidence,
                        "low-confidence output, fanning out consultation"
                    );
                    self.consultation_round(name, text, &mut transcript, &mut interactions)
                        .await?;
                }
            }

            if let Some(signal) = turn.signal.clone() {
                current_agent = self
                    .resolve_signal(name, signal, &mut transcript, &mut interactions)
                    .await?;
            }
        }

        let mut rounds_used = 0u32;
        let (optimized, score) = loop {
            if cancel.is_cancelled() {
                return Err(SwarmError::Cancelled);
            }

            let candidate = self
                .generate_final_summary(story, &context, &transcript)
                .await?;
            let score = self.quality.score(&candidate);
            tracing::info!(score, rounds_used, "scored candidate story");

            if score >= config.quality_threshold || rounds_used >= config.max_clarification_rounds
            {
                break (candidate, score);
            }
            if !self.needs_clarification(&candidate, score).await? {
                break (candidate, score);
            }

            rounds_used += 1;
            for name in &triaged {
                let Some(agent) = self.agents.get(name) else {
                    continue;
                };
                let reply = self
                    .agent_reply(
                        agent,
                        format!(
                            "In two or three sentences, clarify the most important point \
                             from your specialty that the optimized story still misses.\n\n\
                             Current story:\n{candidate}"
                        ),
                    )
                    .await?;
                if reply.trim().is_empty() {
                    continue;
                }
                let msg = Message::assistant(name, reply).with_decision("clarification");
                transcript.push(msg.clone());
                interactions.push(msg);
            }
        };

        let performance_metrics = PerformanceMetrics {
            execution_time: started.elapsed().as_secs_f64(),
            iterations_used: rounds_used,
            quality_score: score,
        };

        Ok(SwarmResponse {
            agent_name: current_agent,
            messages: transcript,
            optimized,
            agent_interactions: interactions,
            performance_metrics,
        })
    }

    /// Ask every other non-master agent, in roster order, to critique a
    /// low-confidence output. Control returns to the main sequence after.
    async fn consultation_round(
        &self,
        low_agent: &str,
        output: &str,
        transcript: &mut Vec<Message>,
        interactions: &mut Vec<Message>,
    ) -> Result<(), SwarmError> {
        for name in &self.order {
            if name == MASTER_AGENT || name == low_agent {
                continue;
            }
            let Some(agent) = self.agents.get(name) else {
                continue;
            };
            let critique = self
                .agent_reply(
                    agent,
                    format!(
                        "{low_agent} produced the following output with low confidence:\n\n\
                         {output}\n\n\
                         From your own specialty, critique this output in a few sentences: \
                         point out anything missing, wrong, or underspecified."
                    ),
                )
                .await?;
            if critique.trim().is_empty() {
                continue;
            }
            let msg = Message::assistant(name, critique)
                .with_decision(format!("consultation critique of {low_agent}"));
            transcript.push(msg.clone());
            interactions.push(msg);
        }
        Ok(())
    }

    /// Resolve a handoff or consultation signal. Returns the name of the
    /// agent holding control afterwards.
    async fn resolve_signal(
        &self,
        origin: &str,
        signal: ControlSignal,
        transcript: &mut Vec<Message>,
        interactions: &mut Vec<Message>,
    ) -> Result<String, SwarmError> {
        match signal {
            ControlSignal::Consultation { agent, question } => {
                self.consult(origin, &agent, &question, transcript, interactions)
                    .await?;
                Ok(origin.to_string())
            }
            ControlSignal::Handoff(first_target) => {
                let mut target = first_target;
                let mut hops = 0;
                let mut last_acted = origin.to_string();

                loop {
                    if hops >= MAX_HANDOFF_HOPS {
                        tracing::warn!(target = %target, hops, "handoff chain too deep, cutting");
                        break;
                    }
                    let Some(agent) = self.agents.get(&target) else {
                        tracing::warn!(target = %target, "handoff to unknown agent, skipping");
                        break;
                    };
                    hops += 1;

                    let turn = match agent
                        .run_turn(&self.client, &self.registry, transcript)
                        .await
                    {
                        Ok(turn) => turn,
                        Err(TurnError::Tool(e)) => {
                            tracing::error!(
                                agent = %target,
                                error = %e,
                                "handoff turn aborted by tool failure"
                            );
                            break;
                        }
                        Err(TurnError::Completion(e)) => return Err(e.into()),
                    };
                    transcript.extend(turn.messages.iter().cloned());
                    interactions.extend(turn.messages.iter().cloned());
                    last_acted = target.clone();

                    match turn.signal {
                        Some(ControlSignal::Handoff(next)) => {
                            target = next;
                        }
                        Some(ControlSignal::Consultation { agent, question }) => {
                            self.consult(&last_acted, &agent, &question, transcript, interactions)
                                .await?;
                            break;
                        }
                        None => break,
                    }
                }

                // One review pass by the originating agent, unless the chain
                // ended back at the master or never left the origin.
                if last_acted != origin && last_acted != MASTER_AGENT {
                    if let Some(origin_agent) = self.agents.get(origin) {
                        transcript.push(Message::user(format!(
                            "As {origin}, review the contribution from {last_acted} above: \
                             confirm it or amend it from your specialty."
                        )));
                        match origin_agent
                            .run_turn(&self.client, &self.registry, transcript)
                            .await
                        {
                            Ok(review) => {
                                if review.signal.is_some() {
                                    tracing::debug!(
                                        agent = %origin,
                                        "ignoring control signal raised during review pass"
                                    );
                                }
                                transcript.extend(review.messages.iter().cloned());
                                interactions.extend(review.messages.iter().cloned());
                            }
                            Err(TurnError::Tool(e)) => {
                                tracing::error!(
                                    agent = %origin,
                                    error = %e,
                                    "review turn aborted by tool failure"
                                );
                            }
                            Err(TurnError::Completion(e)) => return Err(e.into()),
                        }
                    }
                }

                Ok(last_acted)
            }
        }
    }

    /// Side-channel question to a named agent; the answer joins the
    /// transcript but control never transfers.
    async fn consult(
        &self,
        origin: &str,
        target: &str,
        question: &str,
        transcript: &mut Vec<Message>,
        interactions: &mut Vec<Message>,
    ) -> Result<(), SwarmError> {
        let Some(agent) = self.agents.get(target) else {
            tracing::warn!(target = %target, "consultation with unknown agent, skipping");
            return Ok(());
        };
        let answer = self
            .agent_reply(
                agent,
                format!("{origin} asks: {question}\n\nAnswer briefly from your specialty."),
            )
            .await?;
        if answer.trim().is_empty() {
            return Ok(());
        }
        let msg = Message::assistant(target, answer)
            .with_decision(format!("consultation answer for {origin}"));
        transcript.push(msg.clone());
        interactions.push(msg);
        Ok(())
    }

    /// Master synthesis under the strict template, retried with escalating
    /// corrective instructions; falls back to the deterministic synthesizer
    /// when every attempt fails validation. Never returns non-conformant
    /// text.
    async fn generate_final_summary(
        &self,
        story: &str,
        context: &str,
        transcript: &[Message],
    ) -> Result<String, SwarmError> {
        let master = self.master();
        let base_prompt = format!(
            "Based on the context analysis '{context}' and the full discussion, create a \
             comprehensive, optimized user story. Follow these guidelines:\n\
             1. Start with 'As a user, I want ... so that ...' on a single opening line \
             reflecting the main intent of the original story.\n\
             2. Weigh the insights from every specialist before deciding what to include.\n\
             3. After a blank line, add the header 'Acceptance Criteria:' exactly once.\n\
             4. List 3 to 5 acceptance criteria, numbered '1. ', '2. ', and so on, each \
             specific, measurable, and relevant to the story.\n\
             5. Do not repeat the user story inside the acceptance criteria.\n\
             6. Do not introduce processes or requirements that were never discussed.\n\n\
             Original user story: {story}"
        );

        let mut corrective = String::new();
        for attempt in 1..=SUMMARY_ATTEMPTS {
            let mut chat = vec![ChatMessage::new("system", master.instructions.clone())];
            chat.extend(flatten(transcript));
            chat.push(ChatMessage::new(
                "user",
                format!("{base_prompt}{corrective}"),
            ));

            let request = CompletionRequest {
                model: master.model.clone(),
                messages: chat,
                tool_schemas: Vec::new(),
            };
            let candidate = self
                .client
                .complete(&request)
                .await?
                .content
                .unwrap_or_default();

            if validate_story(&candidate) {
                tracing::info!(attempt, "final summary passed structural validation");
                return Ok(candidate);
            }
            tracing::warn!(attempt, "final summary failed structural validation");
            corrective.push_str(&corrective_instruction(attempt));
        }

        tracing::error!("all summary attempts failed validation, using fallback synthesizer");
        Ok(synthesize_fallback(story))
    }

    /// Ask the master whether a clarification round would help. Anything
    /// other than a reply containing "yes" ends the loop early.
    async fn needs_clarification(
        &self,
        candidate: &str,
        score: f64,
    ) -> Result<bool, SwarmError> {
        let prompt = format!(
            "The current optimized story scored {score:.2} against the structural \
             quality bar.\n\n{candidate}\n\nWould a short round of clarification from \
             the specialists materially improve it? Answer 'yes' or 'no'."
        );
        let reply = self.agent_reply(self.master(), prompt).await?;
        Ok(reply.to_lowercase().contains("yes"))
    }

    /// One tool-free completion as the given agent: its instructions plus a
    /// single user prompt.
    async fn agent_reply(&self, agent: &Agent, prompt: String) -> Result<String, SwarmError> {
        let request = CompletionRequest {
            model: agent.model.clone(),
            messages: vec![
                ChatMessage::new("system", agent.instructions.clone()),
                ChatMessage::new("user", prompt),
            ],
            tool_schemas: Vec::new(),
        };
        let response = self.client.complete(&request).await?;
        Ok(response.content.unwrap_or_default())
    }
}

fn flatten(transcript: &[Message]) -> Vec<ChatMessage> {
    transcript
        .iter()
        .filter_map(|m| {
            m.content
                .as_deref()
                .map(|c| ChatMessage::new(m.role.as_str(), c))
        })
        .collect()
}

fn corrective_instruction(attempt: usize) -> String {
    match attempt {
        1 => "\n\nThe previous attempt did not match the required format. Begin with the \
              exact words 'As a user, I want' and keep 'so that' on the same line."
            .to_string(),
        2 => "\n\nReminder: include the header 'Acceptance Criteria:' exactly once, \
              followed by 3 to 5 numbered criteria ('1. ', '2. ', ...)."
            .to_string(),
        _ => format!(
            "\n\nAttempt {attempt} was still malformed. Respond with ONLY the story in \
             the exact template, with no commentary before or after."
        ),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
