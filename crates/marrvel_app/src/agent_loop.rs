use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use derive_setters::Setters;
use marrvel_config::RetryConfig;
use marrvel_domain::{
    ChatModel, ChatRequest, ChatResponse, Context, ContextMessage, TokenBudget,
    TokenLimitExceeded, Tokenizer, ToolCallFull, ToolCallRecord, TranscriptEntry, Usage,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::retry::retry_with_config;
use crate::{Error, ToolRegistry};

/// How the loop ended when no fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model answered without requesting tools
    Completed,
    /// The iteration budget ran out while the model was still calling tools
    MaxIterations,
    /// A tool result was larger than the token budget
    TokenLimitExceeded(TokenLimitExceeded),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopResult {
    pub outcome: LoopOutcome,
    pub answer: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub transcript: Vec<TranscriptEntry>,
    pub usage: Usage,
    pub iterations: usize,
}

enum LoopState {
    AwaitingModel,
    ExecutingTools(ContextMessage),
    Done(LoopOutcome),
}

/// Drives a model through rounds of tool calls until it gives a final answer.
#[derive(Setters)]
#[setters(into)]
pub struct AgentLoop {
    #[setters(skip)]
    model: Arc<dyn ChatModel>,
    #[setters(skip)]
    tools: Arc<ToolRegistry>,
    #[setters(skip)]
    tokenizer: Arc<dyn Tokenizer>,
    max_iterations: usize,
    budget: TokenBudget,
    retry: RetryConfig,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            model,
            tools,
            tokenizer,
            max_iterations: 10,
            budget: TokenBudget::new(100_000),
            retry: RetryConfig::default(),
        }
    }

    /// Runs the loop from a fresh system + user conversation.
    ///
    /// # Errors
    /// Model calls that fail for good (not throttling, or out of retries).
    pub async fn run(&self, system: &str, question: &str) -> anyhow::Result<LoopResult> {
        let mut context = Context::new(system, question);
        let mut tool_calls = Vec::new();
        let mut usage = Usage::default();
        let mut seen_ids = HashSet::new();
        let mut iterations = 0;
        let mut state = LoopState::AwaitingModel;

        let outcome = loop {
            state = match state {
                LoopState::AwaitingModel if iterations >= self.max_iterations => {
                    warn!(
                        model = %self.model.model_id(),
                        iterations,
                        "Iteration limit reached"
                    );
                    LoopState::Done(LoopOutcome::MaxIterations)
                }
                LoopState::AwaitingModel => {
                    iterations += 1;
                    let request =
                        ChatRequest::new(context.clone()).tools(self.tools.definitions());
                    let response = chat(self.model.as_ref(), &self.retry, &request).await?;
                    usage += account_usage(self.tokenizer.as_ref(), &context, &response);

                    let calls: Vec<ToolCallFull> = response
                        .tool_calls
                        .into_iter()
                        .map(|call| call.normalize(&mut seen_ids))
                        .collect();
                    debug!(
                        model = %self.model.model_id(),
                        iteration = iterations,
                        tool_calls = calls.len(),
                        "Model responded"
                    );
                    let message = ContextMessage::assistant(response.content, calls);
                    if message.tool_calls.is_empty() {
                        context.add_message(message);
                        LoopState::Done(LoopOutcome::Completed)
                    } else {
                        LoopState::ExecutingTools(message)
                    }
                }
                LoopState::ExecutingTools(assistant) => {
                    tool_calls.extend(assistant.tool_calls.iter().map(ToolCallRecord::from));
                    match self.execute_tools(&assistant.tool_calls).await {
                        Ok(results) => {
                            context.append_tool_round(assistant, results)?;
                            LoopState::AwaitingModel
                        }
                        Err(exceeded) => {
                            warn!(
                                model = %self.model.model_id(),
                                count = exceeded.count,
                                limit = exceeded.limit,
                                "Tool result exceeds token limit"
                            );
                            context.add_message(assistant);
                            LoopState::Done(LoopOutcome::TokenLimitExceeded(exceeded))
                        }
                    }
                }
                LoopState::Done(outcome) => break outcome,
            };
        };

        info!(
            model = %self.model.model_id(),
            iterations,
            tool_calls = tool_calls.len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            outcome = ?outcome,
            "Agentic loop finished"
        );

        Ok(LoopResult {
            outcome,
            answer: context.last_content().to_string(),
            tool_calls,
            transcript: context.transcript(),
            usage,
            iterations,
        })
    }

    /// Executes calls in order. A failing tool yields an `{"error": ..}`
    /// payload; an oversized payload aborts the round.
    async fn execute_tools(
        &self,
        calls: &[ToolCallFull],
    ) -> Result<Vec<ContextMessage>, TokenLimitExceeded> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let payload = match self.tools.call(call).await {
                Ok(output) => output.into_payload(),
                Err(error) => {
                    warn!(tool = %call.name, error = %error, "Tool call failed");
                    json!({"error": error.to_string()}).to_string()
                }
            };
            self.budget.check(self.tokenizer.as_ref(), &payload)?;

            let Some(call_id) = call.call_id.clone() else {
                continue;
            };
            results.push(ContextMessage::tool(call_id, payload));
        }
        Ok(results)
    }
}

/// One model call through the retry wrapper. Failures are wrapped in
/// [`Error::ModelCall`] so the runner can tell them from other errors.
pub(crate) async fn chat(
    model: &dyn ChatModel,
    retry: &RetryConfig,
    request: &ChatRequest,
) -> anyhow::Result<ChatResponse> {
    let config = retry
        .clone()
        .initial_jitter(retry.initial_jitter || model.is_high_latency());
    retry_with_config(&config, || model.chat(request), None::<fn(&anyhow::Error, Duration)>)
        .await
        .map_err(|error| Error::ModelCall { model: model.model_id().clone(), error }.into())
}

/// Usage of one model call: as reported, or estimated from the visible
/// conversation and the response when the backend reports nothing.
pub(crate) fn account_usage(
    tokenizer: &dyn Tokenizer,
    context: &Context,
    response: &ChatResponse,
) -> Usage {
    if let Some(usage) = response.reported_usage() {
        return usage;
    }

    let mut output = response.content.clone();
    for call in &response.tool_calls {
        output.push_str(call.name.as_str());
        output.push_str(&call.arguments.to_string());
    }
    Usage::new(
        tokenizer.count_tokens(&context.visible_text()),
        tokenizer.count_tokens(&output),
    )
}
