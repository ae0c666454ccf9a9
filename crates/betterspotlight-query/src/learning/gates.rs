//! Promotion gates: a list of named predicates, each returning pass/fail
//! with its reason. A candidate is promoted only when every predicate
//! passes; the cycle records the first failing predicate's reason.

use betterspotlight_domain::constants::learning as consts;

use super::engine::LearningSettings;
use super::ranker::TrainingMetrics;

/// Everything a gate may look at.
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    pub settings: &'a LearningSettings,
    /// Positive examples in the training batch.
    pub batch_positives: usize,
    /// Behavior coverage counters: total events, attributed positives,
    /// events carrying a context digest.
    pub events: i64,
    pub attributed: i64,
    pub with_context: i64,
    pub metrics: &'a TrainingMetrics,
    /// Scoring latency of the previously promoted model, if any.
    pub baseline_latency_us: Option<f64>,
}

/// Outcome of one predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOutcome {
    pub passed: bool,
    pub reason: &'static str,
}

impl GateOutcome {
    fn pass(reason: &'static str) -> Self {
        Self {
            passed: true,
            reason,
        }
    }

    fn fail(reason: &'static str) -> Self {
        Self {
            passed: false,
            reason,
        }
    }
}

/// One named promotion predicate.
pub type PromotionGate = fn(&GateInput<'_>) -> GateOutcome;

/// The gates, evaluated in order.
pub const PROMOTION_GATES: &[(&str, PromotionGate)] = &[
    ("attribution", attribution_gate),
    ("runtime", runtime_gate),
    ("latency", latency_gate),
    ("prediction_failure", prediction_failure_gate),
    ("saturation", saturation_gate),
];

/// Reason of the first failing gate, or `None` when every gate passes.
#[must_use]
pub fn first_failing(input: &GateInput<'_>) -> Option<&'static str> {
    for (_, gate) in PROMOTION_GATES {
        let outcome = gate(input);
        if !outcome.passed {
            return Some(outcome.reason);
        }
    }
    None
}

/// Minimum positive count, minimum attributed rate, minimum
/// context-digest rate.
fn attribution_gate(input: &GateInput<'_>) -> GateOutcome {
    const REASON: &str = "promotion_attribution_gate";
    let min_positives = input.settings.min_examples.max(1);
    if (input.batch_positives as i64) < min_positives {
        return GateOutcome::fail(REASON);
    }
    if input.events == 0 {
        return GateOutcome::fail(REASON);
    }
    let attributed_rate = input.attributed as f64 / input.events as f64;
    let context_rate = input.with_context as f64 / input.events as f64;
    if attributed_rate < consts::PROMOTION_MIN_ATTRIBUTED_RATE
        || context_rate < consts::PROMOTION_MIN_CONTEXT_DIGEST_RATE
    {
        return GateOutcome::fail(REASON);
    }
    GateOutcome::pass(REASON)
}

/// Finite loss and finite evaluation metrics across the sample.
fn runtime_gate(input: &GateInput<'_>) -> GateOutcome {
    let m = input.metrics;
    if !m.train_loss.is_finite() || !m.eval_loss.is_finite() || !m.eval_accuracy.is_finite() {
        return GateOutcome::fail(consts::CYCLE_REASON_INVALID_EVAL);
    }
    GateOutcome::pass(consts::CYCLE_REASON_INVALID_EVAL)
}

/// Scoring latency must stay within the regression bound over the
/// promoted baseline. The bound has a floor so micro-benchmark jitter on
/// near-zero baselines cannot reject an otherwise healthy candidate.
fn latency_gate(input: &GateInput<'_>) -> GateOutcome {
    const REASON: &str = "promotion_latency_gate";
    let Some(baseline) = input.baseline_latency_us else {
        return GateOutcome::pass(REASON);
    };
    let bound = baseline * (1.0 + input.settings.latency_regression_pct_max / 100.0);
    if input.metrics.scoring_latency_us > bound.max(100.0) {
        return GateOutcome::fail(REASON);
    }
    GateOutcome::pass(REASON)
}

/// Bounded share of feature rows the scorer could not evaluate.
fn prediction_failure_gate(input: &GateInput<'_>) -> GateOutcome {
    const REASON: &str = "promotion_prediction_failure_gate";
    let m = input.metrics;
    let rate = if m.predictions == 0 {
        0.0
    } else {
        m.prediction_failures as f64 / m.predictions as f64
    };
    if rate > input.settings.prediction_failure_rate_max {
        return GateOutcome::fail(REASON);
    }
    GateOutcome::pass(REASON)
}

/// Bounded share of near-0/near-1 outputs on the held-out split.
fn saturation_gate(input: &GateInput<'_>) -> GateOutcome {
    const REASON: &str = "promotion_saturation_gate";
    if input.metrics.saturation_rate > input.settings.saturation_rate_max {
        return GateOutcome::fail(REASON);
    }
    GateOutcome::pass(REASON)
}
