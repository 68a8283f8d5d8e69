//! The reasoning orchestrator

use super::prompts::{
    decision_prompt, documents_message, observations_message, CRITIQUE_PROMPT, SYNTHESIS_INSTRUCTION,
    UNAVAILABLE_MESSAGE,
};
use super::{explicit_search_query, parse_decision, ChatOutcome, Decision, Phase, ReasoningMode, ReasoningStep};
use crate::config::ReasoningConfig;
use crate::errors::Result;
use crate::llm::{ChatMessage, CompletionRequest, LlmGateway, LlmReply, SYSTEM_PROMPT};
use crate::metrics::{record_reasoning, record_self_correction};
use crate::models::{Chunk, Message, Session};
use crate::store::SessionStore;
use crate::tools::{format_passages, relevant_chunks, ToolContext, ToolInvocation, ToolKind, ToolRegistry};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Coordinates the LLM gateway, tools and session store for chat messages
#[derive(Clone)]
pub struct Orchestrator {
    gateway: LlmGateway,
    tools: ToolRegistry,
    store: Arc<dyn SessionStore>,
    config: ReasoningConfig,
    mode: ReasoningMode,
    document_top_k: usize,
}

/// Everything one cycle produced, before it is written to the session
struct CycleResult {
    content: String,
    payload: Option<serde_json::Value>,
    steps: Vec<ReasoningStep>,
    notes: Vec<String>,
    self_corrected: bool,
}

impl Orchestrator {
    pub fn new(
        gateway: LlmGateway,
        tools: ToolRegistry,
        store: Arc<dyn SessionStore>,
        config: ReasoningConfig,
        document_top_k: usize,
    ) -> Result<Self> {
        let mode = config.mode.parse()?;
        Ok(Self {
            gateway,
            tools,
            store,
            config,
            mode,
            document_top_k,
        })
    }

    pub fn mode(&self) -> ReasoningMode {
        self.mode
    }

    pub fn gateway(&self) -> &LlmGateway {
        &self.gateway
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Answer one user message.
    ///
    /// Appends exactly one user and one assistant message to the session. Tool and
    /// backend failures are absorbed into the answer; only store errors and an
    /// unknown explicit context id are returned as errors.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn handle_message(
        &self,
        session_id: &str,
        context_id: Option<&str>,
        text: &str,
        use_reasoning: Option<bool>,
    ) -> Result<ChatOutcome> {
        let mut session = self.store.get_or_create(session_id).await?;
        let context_id = session.active_context_id(context_id)?;

        let use_reasoning = use_reasoning.unwrap_or(self.config.default_use_reasoning);
        let mode = if use_reasoning { self.mode } else { ReasoningMode::Direct };

        let context = session.context(&context_id)?;
        let chunks = context.chunks.clone();
        let topic = context.topic.clone();
        let history: Vec<ChatMessage> = session.messages_in(&context_id).map(ChatMessage::from).collect();

        let cycle = match mode {
            ReasoningMode::Direct => self.direct(text, &history, &chunks).await,
            ReasoningMode::ChainOfThought | ReasoningMode::React => {
                self.reason(mode, text, &history, &chunks, &topic).await
            }
        };

        let assistant = Message::assistant(cycle.content, Some(context_id.clone())).with_payload(cycle.payload);

        let user = Message::user(text, Some(context_id.clone()));
        let reply = assistant.clone();
        let notes = cycle.notes;
        let target = context_id.clone();
        self.store
            .update(
                session_id,
                Box::new(move |session: &mut Session| {
                    // the default context may only exist in our earlier copy
                    if session.context(&target).is_err() {
                        session.active_context_id(None)?;
                    }
                    session.push_message(user);
                    session.push_message(reply);
                    if let Ok(context) = session.context_mut(&target) {
                        context.notes.extend(notes);
                        context.touch();
                    }
                    Ok(())
                }),
            )
            .await?;

        info!(
            mode = mode.as_str(),
            steps = cycle.steps.len(),
            self_corrected = cycle.self_corrected,
            "Message handled"
        );

        Ok(ChatOutcome {
            message: assistant,
            steps: cycle.steps,
            used_reasoning: mode != ReasoningMode::Direct,
            mode,
            self_corrected: cycle.self_corrected,
            context_id,
        })
    }

    /// Conversation prefix shared by direct answers and synthesis
    fn base_messages(&self, text: &str, history: &[ChatMessage], chunks: &[Chunk]) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];

        let passages = relevant_chunks(text, chunks, self.document_top_k);
        if !passages.is_empty() {
            messages.push(ChatMessage::system(documents_message(&format_passages(&passages))));
        }

        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(text));
        messages
    }

    async fn direct(&self, text: &str, history: &[ChatMessage], chunks: &[Chunk]) -> CycleResult {
        let messages = self.base_messages(text, history, chunks);

        let (content, description) = match self.gateway.complete_text(messages).await {
            Ok(reply) => (reply, "Answered directly".to_string()),
            Err(e) => {
                warn!(error = %e, "Direct answer failed");
                (UNAVAILABLE_MESSAGE.to_string(), format!("LLM unavailable: {}", e))
            }
        };

        record_reasoning(0, ReasoningMode::Direct.as_str());
        CycleResult {
            content,
            payload: None,
            steps: vec![ReasoningStep::new(Phase::Synthesizing, description)],
            notes: Vec::new(),
            self_corrected: false,
        }
    }

    async fn reason(
        &self,
        mode: ReasoningMode,
        text: &str,
        history: &[ChatMessage],
        chunks: &[Chunk],
        topic: &str,
    ) -> CycleResult {
        let cap = mode.round_cap(self.config.max_iterations);
        let tool_ctx = ToolContext { chunks, topic };

        let mut steps = Vec::new();
        let mut observations: Vec<String> = Vec::new();
        let mut notes = Vec::new();
        let mut payload = None;
        let mut rounds = 0;

        while rounds < cap {
            let decision = match (rounds, explicit_search_query(text)) {
                (0, Some(query)) => {
                    steps.push(ReasoningStep::new(Phase::Deciding, "Explicit search request"));
                    Decision::Tool {
                        name: ToolKind::WebSearch.name().to_string(),
                        input: query,
                    }
                }
                _ => match self.decide(text, history, &observations).await {
                    Ok(decision) => decision,
                    Err(e) => {
                        warn!(error = %e, round = rounds, "Tool decision failed");
                        steps.push(ReasoningStep::new(Phase::Deciding, format!("Decision unavailable: {}", e)));
                        break;
                    }
                },
            };

            let Decision::Tool { name, input } = decision else {
                steps.push(ReasoningStep::new(Phase::Deciding, "Enough information to answer"));
                break;
            };

            rounds += 1;
            let input = if input.trim().is_empty() { text.to_string() } else { input };
            debug!(tool = %name, round = rounds, "Invoking tool");

            let mut step = ReasoningStep::new(Phase::InvokingTool, format!("Round {}: {}", rounds, name));
            match self.tools.dispatch(&name, &input, tool_ctx).await {
                Ok(output) => {
                    observations.push(format!("[{}] {}", output.kind, output.text));
                    if let Some(note) = output.note.clone() {
                        notes.push(note);
                    }
                    if output.kind == ToolKind::Visualizer {
                        payload = output.payload.clone();
                    }
                    step.invocation = Some(ToolInvocation {
                        tool: output.kind.name().to_string(),
                        input,
                        output: output.text,
                        success: true,
                    });
                }
                Err(e) => {
                    observations.push(format!("[{} error] {}", name, e));
                    step.invocation = Some(ToolInvocation {
                        tool: name,
                        input,
                        output: e.to_string(),
                        success: false,
                    });
                }
            }
            steps.push(step);
        }

        if rounds == cap && cap > 0 {
            debug!(cap, "Iteration cap reached");
        }
        record_reasoning(rounds, mode.as_str());

        let mut messages = self.base_messages(text, history, chunks);
        if !observations.is_empty() {
            messages.push(ChatMessage::system(observations_message(&observations)));
        }
        messages.push(ChatMessage::system(SYNTHESIS_INSTRUCTION));

        let answer = match self.gateway.complete_text(messages.clone()).await {
            Ok(answer) => {
                steps.push(ReasoningStep::new(Phase::Synthesizing, "Synthesized final answer"));
                answer
            }
            Err(e) => {
                warn!(error = %e, "Synthesis failed");
                steps.push(ReasoningStep::new(Phase::Synthesizing, format!("LLM unavailable: {}", e)));
                return CycleResult {
                    content: UNAVAILABLE_MESSAGE.to_string(),
                    payload,
                    steps,
                    notes,
                    self_corrected: false,
                };
            }
        };

        let (content, self_corrected) = self.self_correct(messages, answer, &mut steps).await;

        CycleResult {
            content,
            payload,
            steps,
            notes,
            self_corrected,
        }
    }

    async fn decide(&self, text: &str, history: &[ChatMessage], observations: &[String]) -> Result<Decision> {
        let mut messages = vec![ChatMessage::system(decision_prompt(&self.tools.descriptors()))];
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(text));
        if !observations.is_empty() {
            messages.push(ChatMessage::system(observations_message(observations)));
        }

        let request = CompletionRequest::new(messages).with_tools(self.tools.descriptors());
        Ok(match self.gateway.complete(request).await? {
            LlmReply::ToolCall { name, input } => Decision::Tool { name, input },
            LlmReply::Text(reply) => parse_decision(&reply),
        })
    }

    /// Ask the model to review a long answer. The original is kept unless the
    /// review returns non-empty text.
    async fn self_correct(
        &self,
        mut messages: Vec<ChatMessage>,
        answer: String,
        steps: &mut Vec<ReasoningStep>,
    ) -> (String, bool) {
        if !self.config.self_correction_enabled || answer.chars().count() <= self.config.self_correction_threshold {
            return (answer, false);
        }

        messages.push(ChatMessage::assistant(answer.clone()));
        messages.push(ChatMessage::user(CRITIQUE_PROMPT));

        match self.gateway.complete_text(messages).await {
            Ok(revised) if !revised.trim().is_empty() => {
                record_self_correction(true);
                steps.push(ReasoningStep::new(Phase::SelfCorrecting, "Answer revised after self-review"));
                (revised.trim().to_string(), true)
            }
            Ok(_) => {
                record_self_correction(false);
                steps.push(ReasoningStep::new(Phase::SelfCorrecting, "Empty review, original kept"));
                (answer, false)
            }
            Err(e) => {
                record_self_correction(false);
                warn!(error = %e, "Self-correction failed, keeping original answer");
                steps.push(ReasoningStep::new(Phase::SelfCorrecting, "Review failed, original kept"));
                (answer, false)
            }
        }
    }
}
