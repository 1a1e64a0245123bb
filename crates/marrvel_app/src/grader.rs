use std::sync::Arc;

use marrvel_config::RetryConfig;
use marrvel_domain::{
    ChatModel, ChatRequest, Classification, Context, TokenBudget, Tokenizer, Usage,
};
use tracing::debug;

use crate::agent_loop::{account_usage, chat};

const RUBRIC: &str = "You grade answers to genetics questions against an expected answer.
Accept the answer if it contains the key facts of the expected answer, even when it adds \
further detail or phrases them differently.
Reject the answer only if it contradicts the expected answer or is missing its key facts.
Reply with a single line: 'yes' or 'no', followed by a short reason.";

/// Grades answers with a dedicated evaluator model.
pub struct Grader {
    evaluator: Arc<dyn ChatModel>,
    tokenizer: Arc<dyn Tokenizer>,
    budget: TokenBudget,
    retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub classification: Classification,
    pub usage: Usage,
}

impl Grader {
    pub fn new(
        evaluator: Arc<dyn ChatModel>,
        tokenizer: Arc<dyn Tokenizer>,
        budget: TokenBudget,
        retry: RetryConfig,
    ) -> Self {
        Self { evaluator, tokenizer, budget, retry }
    }

    /// # Errors
    /// [`marrvel_domain::TokenLimitExceeded`] when the grading prompt is over
    /// budget, otherwise the evaluator's failure.
    pub async fn grade(
        &self,
        question: &str,
        expected: &str,
        answer: &str,
    ) -> anyhow::Result<Grade> {
        let prompt = format!(
            "Question: {question}\n\nExpected answer: {expected}\n\nAnswer to grade: {answer}"
        );
        self.budget
            .check(self.tokenizer.as_ref(), &format!("{RUBRIC}\n{prompt}"))?;

        let context = Context::new(RUBRIC, prompt);
        let request = ChatRequest::new(context.clone());
        let response = chat(self.evaluator.as_ref(), &self.retry, &request).await?;
        let usage = account_usage(self.tokenizer.as_ref(), &context, &response);

        let classification = parse_verdict(&response.content);
        debug!(
            evaluator = %self.evaluator.model_id(),
            classification = %classification,
            "Answer graded"
        );
        Ok(Grade { classification, usage })
    }
}

fn is_markup(c: char) -> bool {
    c.is_whitespace() || matches!(c, '*' | '_' | '#' | '`' | '>' | '"' | '\'')
}

/// Reads `yes`/`no` from the start of the evaluator's reply, past any
/// markdown emphasis; the rest of the reply is the reason. Anything else
/// counts as a rejection.
pub fn parse_verdict(reply: &str) -> Classification {
    let reply = reply.trim();
    let body = reply.trim_start_matches(is_markup);
    let split = body
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(body.len());
    let (word, rest) = body.split_at(split);
    let reason = rest
        .trim_start_matches(|c: char| is_markup(c) || matches!(c, '-' | ':' | ',' | '.'))
        .trim()
        .to_string();

    match word.to_ascii_lowercase().as_str() {
        "yes" => Classification::yes(reason),
        "no" => Classification::no(reason),
        _ => Classification::no(format!("unrecognized evaluator reply: {reply}")),
    }
}
