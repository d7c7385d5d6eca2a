//! Pricing
//!
//! Converts stage usage into ledger amounts. All arithmetic is integer
//! micro-dollars, rounded half up once per entry.

use std::time::Duration;

use tracing::warn;

use crate::stages::TokenUsage;

/// Model priced when the generator reports an unknown one
pub const FALLBACK_MODEL: &str = "gpt-4o";

/// Micro-dollars per 1K (prompt, completion) tokens
fn model_rates(model: &str) -> Option<(i64, i64)> {
    match model {
        "gpt-4o" => Some((2_500, 10_000)),
        "gpt-4o-mini" => Some((150, 600)),
        "gpt-4-turbo" => Some((10_000, 30_000)),
        "gpt-3.5-turbo" => Some((500, 1_500)),
        _ => None,
    }
}

/// Shared-cpu-1x CPU time, pico-dollars per second
const CPU_PICOS_PER_SEC: i64 = 2_200_000;
/// Memory, pico-dollars per GB-second
const MEMORY_PICOS_PER_GB_SEC: i64 = 1_260_000;
/// Memory of the test machine, in MB
const MEMORY_MB: i64 = 512;

/// Cost of a chat completion
///
/// Dated model names such as `gpt-4o-mini-2024-07-18` are priced as their
/// base model.
pub fn token_cost_micros(model: &str, usage: TokenUsage) -> i64 {
    let (prompt_rate, completion_rate) = resolve_model(model)
        .and_then(model_rates)
        .unwrap_or_else(|| {
            warn!("Unknown model {}, using {} pricing", model, FALLBACK_MODEL);
            model_rates(FALLBACK_MODEL).unwrap_or((0, 0))
        });

    let scaled = i64::from(usage.prompt_tokens) * prompt_rate
        + i64::from(usage.completion_tokens) * completion_rate;
    div_round(scaled, 1_000)
}

/// Cost of test compute time
pub fn compute_cost_micros(duration: Duration) -> i64 {
    let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX / 4_000_000);
    let picos_per_sec = CPU_PICOS_PER_SEC + MEMORY_PICOS_PER_GB_SEC * MEMORY_MB / 1_000;
    // ms * pico/s = femto-dollars; 1e9 femto per micro
    div_round(millis.saturating_mul(picos_per_sec), 1_000_000_000)
}

fn resolve_model(model: &str) -> Option<&str> {
    // Longest known name first so `gpt-4o-mini-*` does not resolve to `gpt-4o`
    ["gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo", "gpt-4o"]
        .into_iter()
        .find(|known| model == *known || model.starts_with(&format!("{}-", known)))
}

fn div_round(value: i64, divisor: i64) -> i64 {
    (value + divisor / 2) / divisor
}
