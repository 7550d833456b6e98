use std::sync::Arc;
use std::time::{Duration, Instant};

use filings_models::{
    Answer, Attribution, Capability, Message, OrchestratorConfig, ParamMap, Signal,
    StopReason, ToolCallSignal, ToolResult,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::enhance::{classify, expand_query, subject_hint, QueryProfile};
use crate::error::AgentError;
use crate::model::LanguageModel;
use crate::parser::parse_signal;
use crate::prompts::system_prompt;
use crate::registry::{ToolRegistry, RAG_QUERY, SEARCH_PLC};

/// A failed model call is retried once before the query is abandoned.
const MODEL_ATTEMPTS: u32 = 2;

/// Drives one user query through model turns and tool calls to an [`Answer`].
pub struct Orchestrator {
    model: Arc<dyn LanguageModel>,
    registry: Arc<ToolRegistry>,
    config: OrchestratorConfig,
    model_timeout: Duration,
}

/// Conversation state for a single query. Dropped when the query ends.
struct Session {
    id: Uuid,
    user_query: String,
    profile: QueryProfile,
    messages: Vec<Message>,
    turn: u32,
    max_turns: u32,
    attributions: Vec<Attribution>,
    tool_calls: u32,
    retrieval_attempted: bool,
    fallback_used: bool,
    last_assistant: String,
}

impl Session {
    fn fold(&mut self, result: &ToolResult) {
        self.messages.push(Message::tool(result.render_message()));
        merge_attributions(&mut self.attributions, &result.attributions);
        self.tool_calls += 1;
    }

    fn answer(&self, answer_text: String, stop_reason: StopReason) -> Answer {
        Answer {
            session_id: self.id,
            answer_text,
            attributions: self.attributions.clone(),
            incomplete: stop_reason == StopReason::TurnLimitExceeded,
            stop_reason,
            turns: self.turn,
            tool_calls: self.tool_calls,
        }
    }
}

/// Append `incoming` so that it remains an in-order subsequence of
/// `collected`. A repeat is merged into an earlier entry only when that entry
/// lies after the previous match; otherwise it is appended again.
fn merge_attributions(collected: &mut Vec<Attribution>, incoming: &[Attribution]) {
    let mut cursor = 0;
    for attribution in incoming {
        match collected[cursor..].iter().position(|a| a == attribution) {
            Some(offset) => cursor += offset + 1,
            None => {
                collected.push(attribution.clone());
                cursor = collected.len();
            }
        }
    }
}

enum State {
    AwaitingModel,
    Interpreting(String),
    Finished(Answer),
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: Arc<ToolRegistry>,
        config: OrchestratorConfig,
        model_timeout: Duration,
    ) -> Self {
        Self {
            model,
            registry,
            config,
            model_timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub async fn answer(&self, user_query: &str) -> Result<Answer, AgentError> {
        self.answer_with_cancel(user_query, &CancellationToken::new())
            .await
    }

    /// Answer `user_query`, giving up with [`AgentError::Cancelled`] as soon
    /// as `cancel` fires.
    pub async fn answer_with_cancel(
        &self,
        user_query: &str,
        cancel: &CancellationToken,
    ) -> Result<Answer, AgentError> {
        let start = Instant::now();
        let mut session = Session {
            id: Uuid::new_v4(),
            user_query: user_query.trim().to_string(),
            profile: classify(user_query),
            messages: vec![
                Message::system(system_prompt(&self.registry)),
                Message::user(user_query.trim()),
            ],
            turn: 0,
            max_turns: self.config.effective_max_turns(),
            attributions: Vec::new(),
            tool_calls: 0,
            retrieval_attempted: false,
            fallback_used: false,
            last_assistant: String::new(),
        };
        info!(
            session = %session.id,
            model = self.model.name(),
            figure = session.profile.figure,
            report_grounded = session.profile.report_grounded,
            "Starting query"
        );

        let mut state = State::AwaitingModel;
        let answer = loop {
            state = match state {
                State::AwaitingModel => {
                    if session.turn >= session.max_turns {
                        warn!(session = %session.id, turns = session.turn, "Turn limit reached");
                        let text = session.last_assistant.clone();
                        State::Finished(session.answer(text, StopReason::TurnLimitExceeded))
                    } else {
                        let reply = self.call_model(&session.messages, cancel).await?;
                        session.turn += 1;
                        debug!(session = %session.id, turn = session.turn, chars = reply.len(), "Model replied");
                        session.messages.push(Message::assistant(reply.clone()));
                        session.last_assistant = reply.clone();
                        State::Interpreting(reply)
                    }
                }
                State::Interpreting(reply) => match parse_signal(&reply) {
                    Signal::FinalAnswer(text) => {
                        State::Finished(session.answer(text, StopReason::FinalAnswer))
                    }
                    Signal::Unparseable { reason } => {
                        warn!(session = %session.id, reason = %reason, "Unreadable tool call, treating reply as the answer");
                        State::Finished(
                            session.answer(reply.trim().to_string(), StopReason::FinalAnswer),
                        )
                    }
                    Signal::ToolCall(call) => {
                        self.dispatch(&mut session, call, cancel).await?;
                        State::AwaitingModel
                    }
                },
                State::Finished(answer) => break answer,
            };
        };

        info!(
            session = %answer.session_id,
            turns = answer.turns,
            tool_calls = answer.tool_calls,
            attributions = answer.attributions.len(),
            incomplete = answer.incomplete,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query complete"
        );
        Ok(answer)
    }

    /// One model call with a single immediate retry.
    async fn call_model(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let mut detail = String::new();
        for attempt in 1..=MODEL_ATTEMPTS {
            let call = tokio::time::timeout(self.model_timeout, self.model.complete(messages));
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                outcome = call => outcome,
            };
            match outcome {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(AgentError::Cancelled)) => return Err(AgentError::Cancelled),
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "Model call failed");
                    detail = e.to_string();
                }
                Err(_) => {
                    let e = AgentError::Timeout(self.model_timeout.as_secs());
                    warn!(attempt, error = %e, "Model call timed out");
                    detail = e.to_string();
                }
            }
        }
        Err(AgentError::ModelUnavailable {
            attempts: MODEL_ATTEMPTS,
            detail,
        })
    }

    async fn dispatch(
        &self,
        session: &mut Session,
        call: ToolCallSignal,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let capability = self.registry.capability_of(&call.tool_name);

        // Filed reports come before market data for report questions.
        if capability.is_some_and(|c| c.is_market())
            && session.profile.report_grounded
            && !session.retrieval_attempted
        {
            info!(session = %session.id, requested = %call.tool_name, "Searching reports before market data");
            // The requested market call takes the place of the fallback search.
            session.fallback_used = true;
            let mut params = ParamMap::new();
            params.insert("query".to_string(), expand_query(&session.user_query));
            if let Some(result) = self.invoke(session, RAG_QUERY, &params, cancel).await? {
                self.after_retrieval(session, &result, cancel).await?;
            }
        }

        let mut params = call.parameters;
        if capability == Some(Capability::Retrieval) {
            for (key, value) in params.iter_mut() {
                if key.trim().eq_ignore_ascii_case("query") {
                    *value = expand_query(value);
                }
            }
        }

        if let Some(result) = self.invoke(session, &call.tool_name, &params, cancel).await? {
            if result.capability == Capability::Retrieval {
                self.after_retrieval(session, &result, cancel).await?;
            }
        }
        Ok(())
    }

    /// Invoke a tool and fold its outcome into the session. Request errors
    /// become a corrective tool message and yield `None`.
    async fn invoke(
        &self,
        session: &mut Session,
        tool_name: &str,
        params: &ParamMap,
        cancel: &CancellationToken,
    ) -> Result<Option<ToolResult>, AgentError> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            outcome = self.registry.invoke(tool_name, params) => outcome,
        };

        match outcome {
            Ok(result) => {
                info!(
                    session = %session.id,
                    tool = %result.tool_name,
                    success = result.success,
                    "Tool result folded"
                );
                session.fold(&result);
                Ok(Some(result))
            }
            Err(e) => {
                warn!(session = %session.id, error = %e, "Rejected tool call");
                session.messages.push(Message::tool(format!(
                    "{e}\nCorrect the tool call, or answer with the evidence you already have."
                )));
                Ok(None)
            }
        }
    }

    /// Record a retrieval and, for figure questions it could not support,
    /// run the one market-data search allowed per session.
    async fn after_retrieval(
        &self,
        session: &mut Session,
        result: &ToolResult,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        session.retrieval_attempted = true;
        if !result.attributions.is_empty()
            || !session.profile.figure
            || !self.config.market_fallback
            || session.fallback_used
        {
            return Ok(());
        }

        session.fallback_used = true;
        let company = subject_hint(&session.user_query);
        info!(session = %session.id, company = %company, "No report passages, falling back to market search");
        let mut params = ParamMap::new();
        params.insert("company_name".to_string(), company);
        self.invoke(session, SEARCH_PLC, &params, cancel).await?;
        Ok(())
    }
}
