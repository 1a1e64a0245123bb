use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};
use uuid::Uuid;

use crate::{ModelId, ToolCallRecord, TranscriptEntry, Usage};

/// How a model is asked to answer.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Mode {
    /// Agentic loop over the MCP tools
    Tool,
    /// Single direct call, no tools
    Vanilla,
    /// Single direct call with provider-side web search
    Web,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Verdict {
    Yes,
    No,
    Error,
}

/// Graded outcome of one test, rendered as `<verdict> - <reason>`. Reports
/// and the cache store the rendered form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Classification {
    pub verdict: Verdict,
    pub reason: String,
}

impl Classification {
    pub fn new(verdict: Verdict, reason: impl Into<String>) -> Self {
        Self { verdict, reason: reason.into() }
    }

    pub fn yes(reason: impl Into<String>) -> Self {
        Self::new(Verdict::Yes, reason)
    }

    pub fn no(reason: impl Into<String>) -> Self {
        Self::new(Verdict::No, reason)
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(Verdict::Error, reason)
    }

    pub fn timeout() -> Self {
        Self::no("timeout")
    }

    pub fn token_limit(count: usize, limit: usize) -> Self {
        Self::no(format!("token count exceeded: {count} > {limit}"))
    }
}

impl Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.verdict)
        } else {
            write!(f, "{} - {}", self.verdict, self.reason)
        }
    }
}

impl FromStr for Classification {
    type Err = crate::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (verdict, reason) = value.split_once(" - ").unwrap_or((value, ""));
        let verdict = Verdict::from_str(verdict.trim())
            .map_err(|_| crate::Error::InvalidClassification(value.to_string()))?;
        Ok(Self::new(verdict, reason))
    }
}

impl TryFrom<String> for Classification {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Classification> for String {
    fn from(value: Classification) -> Self {
        value.to_string()
    }
}

/// How a test ended. Decides whether its result may be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StrumDisplay)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Status {
    Completed,
    MaxIterations,
    Timeout,
    TokenLimitExceeded,
    Error,
}

impl Status {
    /// Timeouts and token-limit aborts depend on the environment of one
    /// run and are never persisted.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Status::Completed | Status::MaxIterations | Status::Error)
    }
}

/// Full record of one (test, mode, model) evaluation. This is also the value
/// stored in the result cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_uuid: Uuid,
    pub index: usize,
    pub model: Option<ModelId>,
    pub mode: Mode,
    pub question: String,
    pub expected: String,
    pub response: String,
    pub classification: Classification,
    pub status: Status,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default)]
    pub conversation: Vec<TranscriptEntry>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub tokens_used: usize,
    pub iterations: usize,
    #[serde(default)]
    pub cached: bool,
    pub duration_ms: u64,
}

impl TestResult {
    /// An empty record for the given test, to be filled in by the runner.
    pub fn new(
        test_uuid: Uuid,
        index: usize,
        mode: Mode,
        model: Option<ModelId>,
        question: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self {
            test_uuid,
            index,
            model,
            mode,
            question: question.into(),
            expected: expected.into(),
            response: String::new(),
            classification: Classification::error("not run"),
            status: Status::Error,
            tool_calls: Vec::new(),
            conversation: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            tokens_used: 0,
            iterations: 0,
            cached: false,
            duration_ms: 0,
        }
    }

    pub fn usage(mut self, usage: Usage) -> Self {
        self.input_tokens = usage.input_tokens;
        self.output_tokens = usage.output_tokens;
        self.tokens_used = usage.total();
        self
    }

    pub fn classified(mut self, status: Status, classification: Classification) -> Self {
        self.status = status;
        self.classification = classification;
        self
    }

    pub fn verdict(&self) -> Verdict {
        self.classification.verdict
    }
}

/// Tally of verdicts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub yes: usize,
    pub no: usize,
    pub failed: usize,
}

impl RunStats {
    pub fn record(&mut self, result: &TestResult) {
        match result.verdict() {
            Verdict::Yes => self.yes += 1,
            Verdict::No => self.no += 1,
            Verdict::Error => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.yes + self.no + self.failed
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_classification_display() {
        assert_eq!(Classification::yes("matches").to_string(), "yes - matches");
        assert_eq!(Classification::timeout().to_string(), "no - timeout");
        assert_eq!(
            Classification::token_limit(120_000, 100_000).to_string(),
            "no - token count exceeded: 120000 > 100000"
        );
        assert_eq!(Classification::error("").to_string(), "error");
    }

    #[test]
    fn test_classification_serializes_rendered() {
        let fixture = TestResult::new(Uuid::nil(), 0, Mode::Tool, None, "q", "Paris")
            .classified(Status::Completed, Classification::yes("matches"));

        let actual = serde_json::to_value(&fixture).unwrap();

        assert_eq!(actual["classification"], json!("yes - matches"));
        let reloaded: TestResult = serde_json::from_value(actual).unwrap();
        assert_eq!(reloaded, fixture);
    }

    #[test]
    fn test_classification_from_str() {
        assert_eq!(
            Classification::from_str("no - token count exceeded: 5 > 3 - twice").unwrap(),
            Classification::no("token count exceeded: 5 > 3 - twice")
        );
        assert_eq!(Classification::from_str("error").unwrap(), Classification::error(""));
        assert!(Classification::from_str("maybe - unsure").is_err());
    }

    #[test]
    fn test_mode_round_trips_through_strings() {
        assert_eq!(Mode::from_str("vanilla").unwrap(), Mode::Vanilla);
        assert_eq!(Mode::Web.to_string(), "web");
        assert_eq!(serde_json::to_value(Mode::Tool).unwrap(), "tool");
    }

    #[test]
    fn test_only_final_statuses_are_cacheable() {
        assert!(Status::Completed.is_cacheable());
        assert!(Status::MaxIterations.is_cacheable());
        assert!(Status::Error.is_cacheable());
        assert!(!Status::Timeout.is_cacheable());
        assert!(!Status::TokenLimitExceeded.is_cacheable());
    }

    #[test]
    fn test_run_stats_record() {
        let fixture = TestResult::new(Uuid::nil(), 0, Mode::Tool, None, "q", "a");
        let mut actual = RunStats::default();

        actual.record(&fixture.clone().classified(Status::Completed, Classification::yes("ok")));
        actual.record(&fixture.clone().classified(Status::Timeout, Classification::timeout()));
        actual.record(&fixture.classified(Status::Error, Classification::error("boom")));

        let expected = RunStats { yes: 1, no: 1, failed: 1 };
        assert_eq!(actual, expected);
        assert_eq!(actual.total(), 3);
    }

    #[test]
    fn test_usage_fills_token_fields() {
        let actual = TestResult::new(Uuid::nil(), 0, Mode::Tool, None, "q", "a")
            .usage(Usage::new(600, 130));

        assert_eq!(actual.input_tokens, 600);
        assert_eq!(actual.output_tokens, 130);
        assert_eq!(actual.tokens_used, 730);
    }
}
