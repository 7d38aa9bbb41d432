//! Usage normalisation and aggregation across providers.

use agentwire_types::{ClaudeUsage, CodexUsage, ModelUsage, OpenCodeStepFinishPart, UsageStats};
use std::collections::HashMap;

/// Fold one provider usage report into a session's running totals.
///
/// Cumulative providers report running totals, which replace `totals`;
/// incremental providers report deltas, which are added. A report without a
/// context window inherits `context_window`.
pub fn aggregate_usage(
    totals: &mut UsageStats,
    report: &UsageStats,
    cumulative: bool,
    context_window: u64,
) -> UsageStats {
    if cumulative {
        *totals = *report;
    } else {
        totals.accumulate(report);
    }
    if report.context_window > 0 {
        totals.context_window = report.context_window;
    } else if totals.context_window == 0 {
        totals.context_window = context_window;
    }
    *totals
}

/// Claude `result` usage. The per-model breakdown, when present, is
/// authoritative: it is summed across models and the largest context window
/// is kept. Otherwise the top-level `usage` is used.
pub fn normalize_claude_usage(
    usage: Option<&ClaudeUsage>,
    model_usage: &HashMap<String, ModelUsage>,
    total_cost_usd: f64,
) -> Option<UsageStats> {
    if !model_usage.is_empty() {
        let mut stats = model_usage.values().fold(UsageStats::default(), |mut acc, m| {
            acc.accumulate(&UsageStats {
                input_tokens: m.input_tokens,
                output_tokens: m.output_tokens,
                cache_read_input_tokens: m.cache_read_input_tokens,
                cache_creation_input_tokens: m.cache_creation_input_tokens,
                total_cost_usd: m.cost_usd,
                context_window: m.context_window,
                reasoning_tokens: 0,
            });
            acc
        });
        if total_cost_usd > 0.0 {
            stats.total_cost_usd = total_cost_usd;
        }
        return Some(stats);
    }

    usage.map(|u| UsageStats {
        input_tokens: u.input_tokens,
        output_tokens: u.output_tokens,
        cache_read_input_tokens: u.cache_read_input_tokens,
        cache_creation_input_tokens: u.cache_creation_input_tokens,
        total_cost_usd,
        context_window: 0,
        reasoning_tokens: 0,
    })
}

/// Codex folds cached input into `input_tokens`; split it out. Codex has no
/// cost accounting.
pub fn normalize_codex_usage(usage: &CodexUsage) -> UsageStats {
    UsageStats {
        input_tokens: usage.input_tokens.saturating_sub(usage.cached_input_tokens),
        output_tokens: usage.output_tokens,
        cache_read_input_tokens: usage.cached_input_tokens,
        cache_creation_input_tokens: 0,
        total_cost_usd: 0.0,
        context_window: 0,
        reasoning_tokens: usage.reasoning_output_tokens,
    }
}

pub fn normalize_opencode_usage(part: &OpenCodeStepFinishPart) -> UsageStats {
    UsageStats {
        input_tokens: part.tokens.input,
        output_tokens: part.tokens.output,
        cache_read_input_tokens: part.tokens.cache.read,
        cache_creation_input_tokens: part.tokens.cache.write,
        total_cost_usd: part.cost,
        context_window: 0,
        reasoning_tokens: part.tokens.reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(input: u64, output: u64, cost: f64) -> UsageStats {
        UsageStats {
            input_tokens: input,
            output_tokens: output,
            total_cost_usd: cost,
            ..Default::default()
        }
    }

    #[test]
    fn test_incremental_reports_add() {
        let mut totals = UsageStats::default();
        aggregate_usage(&mut totals, &report(100, 10, 0.01), false, 128_000);
        let result = aggregate_usage(&mut totals, &report(50, 5, 0.02), false, 128_000);
        assert_eq!(result.input_tokens, 150);
        assert_eq!(result.output_tokens, 15);
        assert!((result.total_cost_usd - 0.03).abs() < 1e-9);
        assert_eq!(result.context_window, 128_000);
    }

    #[test]
    fn test_cumulative_reports_replace() {
        let mut totals = UsageStats::default();
        aggregate_usage(&mut totals, &report(100, 10, 0.0), true, 400_000);
        let result = aggregate_usage(&mut totals, &report(180, 25, 0.0), true, 400_000);
        assert_eq!(result.input_tokens, 180);
        assert_eq!(result.output_tokens, 25);
        assert_eq!(result.total_cost_usd, 0.0);
        assert_eq!(result.context_window, 400_000);
        assert_eq!(totals, result);
    }

    #[test]
    fn test_reported_window_wins() {
        let mut totals = UsageStats::default();
        let mut r = report(1, 1, 0.0);
        r.context_window = 1_000_000;
        let result = aggregate_usage(&mut totals, &r, false, 200_000);
        assert_eq!(result.context_window, 1_000_000);
    }

    #[test]
    fn test_claude_model_usage_summed() {
        let mut models = HashMap::new();
        models.insert(
            "claude-sonnet-4-5".to_string(),
            ModelUsage {
                input_tokens: 10,
                output_tokens: 200,
                cache_read_input_tokens: 3000,
                cache_creation_input_tokens: 400,
                cost_usd: 0.05,
                context_window: 200_000,
            },
        );
        models.insert(
            "claude-haiku-4-5".to_string(),
            ModelUsage {
                input_tokens: 5,
                output_tokens: 20,
                cost_usd: 0.001,
                context_window: 200_000,
                ..Default::default()
            },
        );
        let stats = normalize_claude_usage(None, &models, 0.051).unwrap();
        assert_eq!(stats.input_tokens, 15);
        assert_eq!(stats.output_tokens, 220);
        assert_eq!(stats.cache_read_input_tokens, 3000);
        assert_eq!(stats.context_window, 200_000);
        assert!((stats.total_cost_usd - 0.051).abs() < 1e-9);
    }

    #[test]
    fn test_claude_plain_usage() {
        let usage = ClaudeUsage {
            input_tokens: 7,
            output_tokens: 8,
            ..Default::default()
        };
        let stats = normalize_claude_usage(Some(&usage), &HashMap::new(), 0.25).unwrap();
        assert_eq!(stats.input_tokens, 7);
        assert_eq!(stats.total_cost_usd, 0.25);
        assert!(normalize_claude_usage(None, &HashMap::new(), 0.0).is_none());
    }

    #[test]
    fn test_codex_cached_split() {
        let stats = normalize_codex_usage(&CodexUsage {
            input_tokens: 24_763,
            cached_input_tokens: 24_448,
            output_tokens: 122,
            reasoning_output_tokens: 64,
        });
        assert_eq!(stats.input_tokens, 315);
        assert_eq!(stats.cache_read_input_tokens, 24_448);
        assert_eq!(stats.reasoning_tokens, 64);
        assert_eq!(stats.total_cost_usd, 0.0);
    }
}
