use std::collections::HashMap;
use std::sync::Arc;

use marrvel_domain::{
    ChatModel, Classification, Mode, RunId, RunStats, Status, TestCase, TestResult,
};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::{RunOptions, TestRunner};

/// Outcome of one batch: every (test, model) result in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: RunId,
    pub mode: Mode,
    pub stats: RunStats,
    pub results: Vec<TestResult>,
}

/// Fans a set of test cases out over several models, bounded by the
/// runner's semaphore.
pub struct BatchRunner {
    runner: Arc<TestRunner>,
}

impl BatchRunner {
    pub fn new(runner: Arc<TestRunner>) -> Self {
        Self { runner }
    }

    /// Runs every (test, model) pair. `cases` carries each test's index in
    /// the source file. A panicking task is recorded as an error result.
    pub async fn run(
        &self,
        cases: Vec<(usize, TestCase)>,
        models: Vec<Arc<dyn ChatModel>>,
        options: RunOptions,
    ) -> BatchReport {
        let cases = Arc::new(cases);
        let options = Arc::new(options);
        let total = cases.len() * models.len();
        info!(
            run_id = %options.run_id,
            mode = %options.mode,
            tests = cases.len(),
            models = models.len(),
            "Starting batch"
        );

        let mut tasks = JoinSet::new();
        let mut slots = HashMap::new();
        for case_slot in 0..cases.len() {
            for (model_slot, model) in models.iter().enumerate() {
                let runner = self.runner.clone();
                let cases = cases.clone();
                let options = options.clone();
                let model = model.clone();
                let handle = tasks.spawn(async move {
                    let (index, test_case) = &cases[case_slot];
                    runner.run(*index, test_case, model, &options).await
                });
                slots.insert(handle.id(), (case_slot, model_slot));
            }
        }

        let mut stats = RunStats::default();
        let mut results = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next_with_id().await {
            let id = match &joined {
                Ok((id, _)) => *id,
                Err(join_error) => join_error.id(),
            };
            let Some(&slot) = slots.get(&id) else {
                continue;
            };
            let result = match joined {
                Ok((_, result)) => result,
                Err(join_error) => {
                    let (index, test_case) = &cases[slot.0];
                    error!(test = %test_case.uuid, error = %join_error, "Test task panicked");
                    TestResult::new(
                        test_case.uuid,
                        *index,
                        options.mode,
                        Some(models[slot.1].model_id().clone()),
                        test_case.question.clone(),
                        test_case.expected.clone(),
                    )
                    .classified(
                        Status::Error,
                        Classification::error(format!("task failed: {join_error}")),
                    )
                }
            };

            stats.record(&result);
            results.push((slot, result));
            info!(
                done = results.len(),
                total,
                yes = stats.yes,
                no = stats.no,
                failed = stats.failed,
                "Progress"
            );
        }

        results.sort_by_key(|(slot, _)| *slot);
        info!(
            run_id = %options.run_id,
            yes = stats.yes,
            no = stats.no,
            failed = stats.failed,
            "Batch finished"
        );

        BatchReport {
            run_id: options.run_id.clone(),
            mode: options.mode,
            stats,
            results: results.into_iter().map(|(_, result)| result).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use marrvel_config::{LimitsConfig, RetryConfig};
    use marrvel_domain::{ChatRequest, ChatResponse, ModelId, Verdict};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_utils::{CountingTokenizer, MockChatModel, MockResultCache};
    use crate::{EvalContext, ToolRegistry};

    /// Answers instantly with its own name after a per-model delay.
    struct EchoModel {
        id: ModelId,
        delay: Duration,
    }

    #[async_trait]
    impl ChatModel for EchoModel {
        fn model_id(&self) -> &ModelId {
            &self.id
        }

        async fn chat(&self, _: &ChatRequest) -> anyhow::Result<ChatResponse> {
            tokio::time::sleep(self.delay).await;
            Ok(ChatResponse::text(format!("answer from {}", self.id)))
        }
    }

    struct PanickingModel(ModelId);

    #[async_trait]
    impl ChatModel for PanickingModel {
        fn model_id(&self) -> &ModelId {
            &self.0
        }

        async fn chat(&self, _: &ChatRequest) -> anyhow::Result<ChatResponse> {
            panic!("backend exploded")
        }
    }

    fn fixture(evaluator: MockChatModel) -> BatchRunner {
        let context = EvalContext::new(
            Arc::new(ToolRegistry::new()),
            Arc::new(MockResultCache::default()),
            Arc::new(evaluator),
            Arc::new(CountingTokenizer::default()),
            LimitsConfig::default(),
            RetryConfig::default(),
            2,
        );
        BatchRunner::new(Arc::new(TestRunner::new(Arc::new(context))))
    }

    fn cases() -> Vec<(usize, TestCase)> {
        vec![
            (0, TestCase::new("Which gene causes Li-Fraumeni syndrome?", "TP53")),
            (4, TestCase::new("Which chromosome is BRCA1 on?", "17")),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_are_returned_in_input_order() {
        let evaluator = (0..4).fold(MockChatModel::new("judge"), |model, _| {
            model.respond(ChatResponse::text("yes - ok"))
        });
        let models: Vec<Arc<dyn ChatModel>> = vec![
            Arc::new(EchoModel { id: ModelId::new("slow"), delay: Duration::from_secs(5) }),
            Arc::new(EchoModel { id: ModelId::new("fast"), delay: Duration::from_millis(1) }),
        ];
        let options = RunOptions::new(RunId::new("batch").unwrap(), Mode::Vanilla);

        let actual = fixture(evaluator).run(cases(), models, options).await;

        let order: Vec<(usize, String)> = actual
            .results
            .iter()
            .map(|result| (result.index, result.model.as_ref().unwrap().to_string()))
            .collect();
        let expected = vec![
            (0, "slow".to_string()),
            (0, "fast".to_string()),
            (4, "slow".to_string()),
            (4, "fast".to_string()),
        ];
        assert_eq!(order, expected);
        assert_eq!(actual.stats, RunStats { yes: 4, no: 0, failed: 0 });
    }

    #[tokio::test]
    async fn test_panicking_task_becomes_error_result() {
        let evaluator = (0..2).fold(MockChatModel::new("judge"), |model, _| {
            model.respond(ChatResponse::text("no - wrong"))
        });
        let models: Vec<Arc<dyn ChatModel>> = vec![
            Arc::new(PanickingModel(ModelId::new("broken"))),
            Arc::new(EchoModel { id: ModelId::new("ok"), delay: Duration::ZERO }),
        ];
        let options = RunOptions::new(RunId::new("batch").unwrap(), Mode::Vanilla);

        let actual = fixture(evaluator).run(cases(), models, options).await;

        let verdicts: Vec<Verdict> = actual.results.iter().map(TestResult::verdict).collect();
        let expected = vec![Verdict::Error, Verdict::No, Verdict::Error, Verdict::No];
        assert_eq!(verdicts, expected);
        assert_eq!(actual.stats, RunStats { yes: 0, no: 2, failed: 2 });
    }
}
