use std::sync::Arc;

use tiktoken_rs::CoreBPE;

/// Counts tokens in arbitrary text.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// BPE tokenizer (`o200k_base`). An approximation for models with other
/// vocabularies, which is all the budget checks need.
pub struct TokenCounter {
    bpe: CoreBPE,
}

impl TokenCounter {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self { bpe: tiktoken_rs::o200k_base()? })
    }

    /// The BPE tokenizer, or the character heuristic when its vocabulary cannot
    /// be loaded.
    pub fn shared() -> Arc<dyn Tokenizer> {
        match Self::new() {
            Ok(counter) => Arc::new(counter),
            Err(error) => {
                tracing::warn!(error = %error, "Falling back to character based token estimates");
                Arc::new(CharRatioTokenizer)
            }
        }
    }
}

impl Tokenizer for TokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Roughly 4 characters (bytes) per token.
pub struct CharRatioTokenizer;

impl CharRatioTokenizer {
    pub const TOKEN_TO_CHAR_RATIO: usize = 4;
}

impl Tokenizer for CharRatioTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.len().div_ceil(Self::TOKEN_TO_CHAR_RATIO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("token count exceeded: {count} > {limit}")]
pub struct TokenLimitExceeded {
    pub count: usize,
    pub limit: usize,
}

/// Hard cap on the size of a single piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    limit: usize,
}

impl TokenBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Returns the token count of `text`, or the overflow when it is above the
    /// limit.
    pub fn check(
        &self,
        tokenizer: &dyn Tokenizer,
        text: &str,
    ) -> Result<usize, TokenLimitExceeded> {
        let count = tokenizer.count_tokens(text);
        if count > self.limit {
            Err(TokenLimitExceeded { count, limit: self.limit })
        } else {
            Ok(count)
        }
    }
}
