//! Canonical token/cost usage record.

use serde::{Deserialize, Serialize};

/// Usage normalised across providers.
///
/// `input_tokens` never includes cache reads; providers that fold cached
/// input into their input count are normalised by their parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_creation_input_tokens: u64,
    /// Zero for providers with token-only accounting.
    pub total_cost_usd: f64,
    pub context_window: u64,
    #[serde(default)]
    pub reasoning_tokens: u64,
}

impl UsageStats {
    /// Sum token and cost counters. The context window is not additive; the
    /// larger of the two is kept.
    pub fn accumulate(&mut self, other: &UsageStats) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_read_input_tokens = self.cache_read_input_tokens.saturating_add(other.cache_read_input_tokens);
        self.cache_creation_input_tokens = self
            .cache_creation_input_tokens
            .saturating_add(other.cache_creation_input_tokens);
        self.reasoning_tokens = self.reasoning_tokens.saturating_add(other.reasoning_tokens);
        self.total_cost_usd += other.total_cost_usd;
        self.context_window = self.context_window.max(other.context_window);
    }

    /// Tokens occupying the context window on the last request.
    pub fn context_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.cache_read_input_tokens)
            .saturating_add(self.cache_creation_input_tokens)
    }

    /// Context fill as a percentage, clamped to 100. Zero when the window is unknown.
    pub fn context_percent(&self) -> u8 {
        if self.context_window == 0 {
            return 0;
        }
        let pct = self.context_tokens().saturating_mul(100) / self.context_window;
        pct.min(100) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_keeps_largest_window() {
        let mut total = UsageStats {
            input_tokens: 10,
            output_tokens: 5,
            total_cost_usd: 0.01,
            context_window: 200_000,
            ..Default::default()
        };
        total.accumulate(&UsageStats {
            input_tokens: 1,
            output_tokens: 2,
            cache_read_input_tokens: 3,
            total_cost_usd: 0.02,
            context_window: 100_000,
            ..Default::default()
        });
        assert_eq!(total.input_tokens, 11);
        assert_eq!(total.output_tokens, 7);
        assert_eq!(total.cache_read_input_tokens, 3);
        assert!((total.total_cost_usd - 0.03).abs() < 1e-9);
        assert_eq!(total.context_window, 200_000);
    }

    #[test]
    fn test_context_percent() {
        let usage = UsageStats {
            input_tokens: 50_000,
            cache_read_input_tokens: 50_000,
            context_window: 200_000,
            ..Default::default()
        };
        assert_eq!(usage.context_percent(), 50);
        assert_eq!(UsageStats::default().context_percent(), 0);
    }

    #[test]
    fn test_huge_counts_saturate() {
        let mut total = UsageStats {
            input_tokens: u64::MAX - 1,
            cache_read_input_tokens: u64::MAX,
            context_window: 1_000,
            ..Default::default()
        };
        total.accumulate(&UsageStats {
            input_tokens: 10,
            output_tokens: 3,
            cache_creation_input_tokens: u64::MAX,
            ..Default::default()
        });
        assert_eq!(total.input_tokens, u64::MAX);
        assert_eq!(total.output_tokens, 3);
        assert_eq!(total.context_tokens(), u64::MAX);
        assert_eq!(total.context_percent(), 100);
    }
}
