use std::sync::Arc;
use std::time::Instant;

use derive_setters::Setters;
use marrvel_config::{LimitsConfig, RetryConfig};
use marrvel_domain::{
    CacheKey, ChatModel, ChatRequest, Classification, Context, ContextMessage, Mode, ResultCache,
    RunId, Status, TestCase, TestResult, TokenBudget, TokenLimitExceeded, Tokenizer, Verdict,
};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::agent_loop::{account_usage, chat};
use crate::retry::is_throttling;
use crate::{AgentLoop, Error, Grader, LoopOutcome, ToolRegistry};

/// Longest error text kept in a result.
const MAX_ERROR_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = "You are an expert in clinical genetics. Use the MARRVEL tools to \
look up genes, variants and phenotypes before answering. Answer the question concisely and \
state the key facts explicitly.";

const DIRECT_SYSTEM_PROMPT: &str = "You are an expert in clinical genetics. Answer the question \
concisely and state the key facts explicitly.";

/// Everything a test needs, built once per batch.
pub struct EvalContext {
    pub tools: Arc<ToolRegistry>,
    pub cache: Arc<dyn ResultCache>,
    pub evaluator: Arc<dyn ChatModel>,
    pub tokenizer: Arc<dyn Tokenizer>,
    pub limits: LimitsConfig,
    pub retry: RetryConfig,
    pub semaphore: Arc<Semaphore>,
}

impl EvalContext {
    pub fn new(
        tools: Arc<ToolRegistry>,
        cache: Arc<dyn ResultCache>,
        evaluator: Arc<dyn ChatModel>,
        tokenizer: Arc<dyn Tokenizer>,
        limits: LimitsConfig,
        retry: RetryConfig,
        concurrency: usize,
    ) -> Self {
        Self {
            tools,
            cache,
            evaluator,
            tokenizer,
            limits,
            retry,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    fn budget(&self) -> TokenBudget {
        TokenBudget::new(self.limits.token_limit)
    }
}

/// Per-batch options of a test run.
#[derive(Debug, Clone, Setters)]
#[setters(into)]
pub struct RunOptions {
    pub run_id: RunId,
    pub mode: Mode,
    /// Re-run tests whose cached verdict is `no`
    pub retry_failed: bool,
    /// Re-run tests whose cached result is an error
    pub retry_errors: bool,
}

impl RunOptions {
    pub fn new(run_id: RunId, mode: Mode) -> Self {
        Self { run_id, mode, retry_failed: false, retry_errors: false }
    }

    /// Whether a cached result can stand in for a fresh run.
    pub fn reuses(&self, cached: &TestResult) -> bool {
        match cached.verdict() {
            Verdict::Yes => true,
            Verdict::No => !self.retry_failed,
            Verdict::Error => !self.retry_errors,
        }
    }
}

/// Runs one test case against one model.
pub struct TestRunner {
    context: Arc<EvalContext>,
}

impl TestRunner {
    pub fn new(context: Arc<EvalContext>) -> Self {
        Self { context }
    }

    /// Never fails: every outcome, including errors, is a [`TestResult`].
    pub async fn run(
        &self,
        index: usize,
        test_case: &TestCase,
        model: Arc<dyn ChatModel>,
        options: &RunOptions,
    ) -> TestResult {
        let blank = TestResult::new(
            test_case.uuid,
            index,
            options.mode,
            Some(model.model_id().clone()),
            test_case.question.clone(),
            test_case.expected.clone(),
        );

        let _permit = match self.context.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return error_result(blank, &Error::SemaphoreClosed.into()),
        };

        let key = CacheKey::new(
            options.run_id.clone(),
            test_case.uuid,
            options.mode,
            Some(model.model_id().clone()),
        );
        match self.context.cache.get(&key).await {
            Ok(Some(mut cached)) if options.reuses(&cached) => {
                debug!(test = %test_case.uuid, model = %model.model_id(), "Cache hit");
                cached.index = index;
                cached.cached = true;
                return cached;
            }
            Ok(_) => {}
            Err(error) => {
                warn!(test = %test_case.uuid, error = %error, "Cache read failed, running test")
            }
        }

        let started = Instant::now();
        let timeout = self.context.limits.timeout();
        let evaluated =
            tokio::time::timeout(timeout, self.evaluate(blank.clone(), test_case, &model, options))
                .await;

        let (mut result, persist) = match evaluated {
            Ok(Ok(result)) => (result, true),
            Ok(Err(error)) => self.classify_failure(blank, model.as_ref(), error),
            Err(_) => {
                warn!(
                    test = %test_case.uuid,
                    model = %model.model_id(),
                    timeout_secs = timeout.as_secs(),
                    "Test timed out"
                );
                (blank.classified(Status::Timeout, Classification::timeout()), false)
            }
        };
        result.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            test = %test_case.uuid,
            index,
            model = %model.model_id(),
            mode = %options.mode,
            status = %result.status,
            classification = %result.classification,
            duration_ms = result.duration_ms,
            "Test finished"
        );

        if persist {
            match self.context.cache.put(&key, &result).await {
                Ok(stored) => debug!(test = %test_case.uuid, stored, "Cache write"),
                Err(error) => warn!(test = %test_case.uuid, error = %error, "Cache write failed"),
            }
        }
        result
    }

    async fn evaluate(
        &self,
        result: TestResult,
        test_case: &TestCase,
        model: &Arc<dyn ChatModel>,
        options: &RunOptions,
    ) -> anyhow::Result<TestResult> {
        let result = match options.mode {
            Mode::Tool => {
                let agent = AgentLoop::new(
                    model.clone(),
                    self.context.tools.clone(),
                    self.context.tokenizer.clone(),
                )
                .max_iterations(self.context.limits.max_iterations)
                .budget(self.context.budget())
                .retry(self.context.retry.clone());
                let outcome = agent.run(SYSTEM_PROMPT, &test_case.question).await?;

                let mut result = result.usage(outcome.usage);
                result.response = outcome.answer;
                result.tool_calls = outcome.tool_calls;
                result.conversation = outcome.transcript;
                result.iterations = outcome.iterations;

                match outcome.outcome {
                    LoopOutcome::TokenLimitExceeded(exceeded) => {
                        return Ok(token_limit_result(result, exceeded));
                    }
                    LoopOutcome::Completed => {
                        result.classified(Status::Completed, Classification::no(""))
                    }
                    LoopOutcome::MaxIterations => {
                        result.classified(Status::MaxIterations, Classification::no(""))
                    }
                }
            }
            Mode::Vanilla | Mode::Web => {
                let context = Context::new(DIRECT_SYSTEM_PROMPT, test_case.question.clone());
                let request =
                    ChatRequest::new(context.clone()).web_search(options.mode == Mode::Web);
                let response = chat(model.as_ref(), &self.context.retry, &request).await?;
                let usage = account_usage(self.context.tokenizer.as_ref(), &context, &response);

                let mut transcript = context;
                transcript.add_message(ContextMessage::assistant(response.content.clone(), vec![]));

                let mut result = result.usage(usage);
                result.response = response.content;
                result.conversation = transcript.transcript();
                result.iterations = 1;
                result.classified(Status::Completed, Classification::no(""))
            }
        };

        let grader = Grader::new(
            self.context.evaluator.clone(),
            self.context.tokenizer.clone(),
            self.context.budget(),
            self.context.retry.clone(),
        );
        match grader
            .grade(&test_case.question, &test_case.expected, &result.response)
            .await
        {
            Ok(grade) => {
                debug!(evaluator_tokens = grade.usage.total(), "Grading usage");
                let status = result.status;
                Ok(result.classified(status, grade.classification))
            }
            Err(error) => match error.downcast::<TokenLimitExceeded>() {
                Ok(exceeded) => Ok(token_limit_result(result, exceeded)),
                Err(error) => Err(error),
            },
        }
    }

    /// Decides how a failed test is recorded and whether it may be cached.
    /// Only a model call that failed for good, and would fail again, is
    /// terminal and cached. Throttling, transport and server errors are not.
    fn classify_failure(
        &self,
        blank: TestResult,
        model: &dyn ChatModel,
        error: anyhow::Error,
    ) -> (TestResult, bool) {
        let terminal = match error.downcast_ref::<Error>() {
            Some(Error::ModelCall { model: failed, error }) => {
                let backend = if failed == self.context.evaluator.model_id() {
                    self.context.evaluator.as_ref()
                } else {
                    model
                };
                !is_throttling(error) && backend.is_permanent(error)
            }
            _ => false,
        };
        warn!(test = %blank.test_uuid, terminal, error = %format!("{error:#}"), "Test failed");
        (error_result(blank, &error), terminal)
    }
}

fn token_limit_result(result: TestResult, exceeded: TokenLimitExceeded) -> TestResult {
    result.classified(
        Status::TokenLimitExceeded,
        Classification::token_limit(exceeded.count, exceeded.limit),
    )
}

fn error_result(blank: TestResult, error: &anyhow::Error) -> TestResult {
    let text: String = format!("{error:#}").chars().take(MAX_ERROR_CHARS).collect();
    let mut result = blank.classified(Status::Error, Classification::error(text.clone()));
    result.response = text;
    result
}
