//! Per-role supervisor actor: consecutive-failure tracking, restart
//! backoff and the giving-up budget.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::Rng;
use serde_json::{json, Value};

/// Consecutive failures before a restart is requested.
pub const RESTART_THRESHOLD: u32 = 3;

/// Restart attempts before the role gives up.
pub const RESTART_BUDGET: u32 = 4;

/// Backoff cap in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// What the caller should do after a recorded failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryDecision {
    pub restart_requested: bool,
    pub giving_up: bool,
    pub consecutive_failures: u32,
    pub restart_attempts: u32,
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct RoleState {
    consecutive_failures: u32,
    restart_attempts: u32,
    backoff_ms: u64,
    giving_up: bool,
    available: bool,
}

/// Tracks failure/restart state per role.
#[derive(Default)]
pub struct InferenceSupervisorActor {
    roles: Mutex<HashMap<String, RoleState>>,
}

impl InferenceSupervisorActor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `role` and decide on recovery.
    pub fn record_failure(&self, role: &str) -> RecoveryDecision {
        let Ok(mut roles) = self.roles.lock() else {
            return RecoveryDecision::default();
        };
        let state = roles.entry(role.to_owned()).or_default();
        state.consecutive_failures += 1;
        state.available = false;

        let mut decision = RecoveryDecision {
            consecutive_failures: state.consecutive_failures,
            restart_attempts: state.restart_attempts,
            backoff_ms: state.backoff_ms,
            ..Default::default()
        };

        if state.consecutive_failures < RESTART_THRESHOLD {
            return decision;
        }
        if state.restart_attempts >= RESTART_BUDGET {
            state.giving_up = true;
            decision.giving_up = true;
            return decision;
        }

        state.restart_attempts += 1;
        state.backoff_ms = jitter_ms(compute_backoff_ms(state.restart_attempts));
        decision.restart_requested = true;
        decision.restart_attempts = state.restart_attempts;
        decision.backoff_ms = state.backoff_ms;
        decision
    }

    /// A success resets both counters and clears the giving-up state.
    pub fn record_success(&self, role: &str) {
        if let Ok(mut roles) = self.roles.lock() {
            let state = roles.entry(role.to_owned()).or_default();
            state.consecutive_failures = 0;
            state.restart_attempts = 0;
            state.giving_up = false;
            state.available = true;
        }
    }

    /// A timeout does not count toward failures; availability is restored.
    pub fn record_timeout(&self, role: &str) {
        if let Ok(mut roles) = self.roles.lock() {
            let state = roles.entry(role.to_owned()).or_default();
            state.consecutive_failures = 0;
            state.available = true;
        }
    }

    /// Mark a role degraded without counting a failure.
    pub fn mark_role_unavailable(&self, role: &str) {
        if let Ok(mut roles) = self.roles.lock() {
            roles.entry(role.to_owned()).or_default().available = false;
        }
    }

    /// Reset a role completely (model re-initialized).
    pub fn reset_role(&self, role: &str) {
        if let Ok(mut roles) = self.roles.lock() {
            let state = roles.entry(role.to_owned()).or_default();
            state.consecutive_failures = 0;
            state.backoff_ms = 0;
            state.giving_up = false;
            state.available = true;
        }
    }

    /// `{role: ready|degraded|giving_up}` for health.
    #[must_use]
    pub fn state_by_role(&self) -> Value {
        let Ok(roles) = self.roles.lock() else {
            return json!({});
        };
        let mut out = serde_json::Map::new();
        for (role, state) in roles.iter() {
            let status = if state.giving_up {
                "giving_up"
            } else if state.available {
                "ready"
            } else {
                "degraded"
            };
            out.insert(role.clone(), Value::from(status));
        }
        Value::Object(out)
    }

    /// Restart attempts per role.
    #[must_use]
    pub fn restart_count_by_role(&self) -> Value {
        self.map_roles(|state| Value::from(state.restart_attempts))
    }

    /// Whether the restart budget is exhausted, per role.
    #[must_use]
    pub fn budget_exhausted_by_role(&self) -> Value {
        self.map_roles(|state| Value::from(state.giving_up))
    }

    fn map_roles(&self, f: impl Fn(&RoleState) -> Value) -> Value {
        let Ok(roles) = self.roles.lock() else {
            return json!({});
        };
        let mut out = serde_json::Map::new();
        for (role, state) in roles.iter() {
            out.insert(role.clone(), f(state));
        }
        Value::Object(out)
    }
}

/// `min(30_000, 250 * 2^(attempts-1))`.
#[must_use]
pub fn compute_backoff_ms(restart_attempts: u32) -> u64 {
    let exponent = restart_attempts.saturating_sub(1).min(16);
    (250u64 << exponent).min(MAX_BACKOFF_MS)
}

fn jitter_ms(base_ms: u64) -> u64 {
    let cap = (base_ms / 5).max(1);
    base_ms + rand::rng().random_range(0..=cap)
}
