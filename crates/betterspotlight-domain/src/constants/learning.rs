//! Learning-layer defaults: attribution, cycle cadence and promotion gates.

/// Minimum attribution confidence for a positive training example.
pub const ATTRIBUTION_CONFIDENCE_MIN: f64 = 0.5;

/// Minimum pending examples before an idle cycle may trigger.
pub const MIN_TRAINING_EXAMPLES_DEFAULT: i64 = 25;

/// Cooldown between training cycles, in seconds.
pub const CYCLE_COOLDOWN_SECS: i64 = 300;

/// Largest training batch composed for one cycle.
pub const MAX_TRAINING_BATCH_SIZE: usize = 512;

/// Negatives sampled per positive.
pub const NEGATIVE_SAMPLE_RATIO_DEFAULT: f64 = 1.0;

/// SGD defaults.
pub const EPOCHS_DEFAULT: u32 = 3;
pub const LEARNING_RATE_DEFAULT: f64 = 0.05;
pub const BLEND_ALPHA_DEFAULT: f64 = 0.25;

/// Promotion gate thresholds.
pub const PROMOTION_MIN_POSITIVES: i64 = 10;
pub const PROMOTION_MIN_ATTRIBUTED_RATE: f64 = 0.6;
pub const PROMOTION_MIN_CONTEXT_DIGEST_RATE: f64 = 0.5;
pub const PROMOTION_LATENCY_REGRESSION_PCT_MAX: f64 = 25.0;
pub const PROMOTION_PREDICTION_FAILURE_RATE_MAX: f64 = 0.02;
pub const PROMOTION_SATURATION_RATE_MAX: f64 = 0.35;

/// Ring buffer of recent cycle records kept in memory.
pub const RECENT_LEARNING_CYCLES_LIMIT: usize = 32;

/// Behavior event raw retention, in days.
pub const BEHAVIOR_RAW_RETENTION_DAYS_DEFAULT: i64 = 30;

/// Replay reservoir capacity for negative sampling.
pub const REPLAY_RESERVOIR_CAPACITY: usize = 2048;

/// Test hook: scheduler tick interval override (milliseconds).
pub const ENV_SCHEDULER_INTERVAL_MS: &str = "BS_TEST_LEARNING_SCHEDULER_INTERVAL_MS";

/// Default scheduler tick interval (milliseconds).
pub const SCHEDULER_INTERVAL_MS_DEFAULT: u64 = 60_000;

/// Name of the online ranker model in the learning state relation.
pub const ONLINE_RANKER_MODEL_NAME: &str = "online_ranker";

/// Idle-cycle / scheduler decision reasons, in ladder order.
pub const REASON_ROLLOUT_BLOCKS: &str = "rollout_mode_blocks_training";
pub const REASON_USER_ACTIVE: &str = "user_recently_active";
pub const REASON_COOLDOWN: &str = "cooldown_active";
pub const REASON_NOT_ENOUGH_EXAMPLES: &str = "not_enough_training_examples";
pub const REASON_LEARNING_DISABLED: &str = "learning_disabled";
pub const REASON_TRIGGERED: &str = "triggered";

/// Cycle outcome reasons.
pub const CYCLE_REASON_PROMOTED: &str = "promoted";
pub const CYCLE_REASON_INVALID_EVAL: &str = "candidate_stability_invalid_eval";
