use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Token usage of one model call, or the running total over a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Usage {
    pub fn new(input_tokens: usize, output_tokens: usize) -> Self {
        Self { input_tokens, output_tokens }
    }

    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Self) -> Self::Output {
        Usage::new(
            self.input_tokens + rhs.input_tokens,
            self.output_tokens + rhs.output_tokens,
        )
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_usage_accumulates() {
        let mut actual = Usage::default();
        actual += Usage::new(100, 30);
        actual += Usage::new(200, 40);

        let expected = Usage::new(300, 70);

        assert_eq!(actual, expected);
        assert_eq!(actual.total(), 370);
    }
}
