//! Online personalization ranker: a small logistic model trained by SGD
//! over interaction-derived features, persisted as JSON weights.

use std::path::Path;
use std::time::Instant;

use betterspotlight_domain::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Feature vector layout, by JSON key. Order is the weight order.
pub const FEATURE_KEYS: [&str; 6] = [
    "lexical",
    "semantic",
    "positionDecay",
    "attributionConfidence",
    "hasContext",
    "queryLenNorm",
];

/// Metrics from one training run, fed into the promotion gates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrainingMetrics {
    pub train_loss: f64,
    pub eval_loss: f64,
    pub eval_accuracy: f64,
    pub scoring_latency_us: f64,
    pub prediction_failures: u64,
    pub predictions: u64,
    pub saturation_rate: f64,
}

/// The model: one weight per feature plus a bias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineRanker {
    pub version: i64,
    pub weights: Vec<f64>,
    pub bias: f64,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Pull the fixed feature vector out of a features JSON object. Missing
/// keys default to zero; non-numeric values count as prediction failures.
#[must_use]
pub fn feature_vector(features: &Value) -> ([f64; 6], bool) {
    let mut out = [0f64; 6];
    let mut ok = true;
    for (i, key) in FEATURE_KEYS.iter().enumerate() {
        match features.get(key) {
            None => {}
            Some(v) => match v.as_f64() {
                Some(x) if x.is_finite() => out[i] = x,
                _ => ok = false,
            },
        }
    }
    (out, ok)
}

impl OnlineRanker {
    /// Fresh zero model at `version`.
    #[must_use]
    pub fn new(version: i64) -> Self {
        Self {
            version,
            weights: vec![0.0; FEATURE_KEYS.len()],
            bias: 0.0,
        }
    }

    /// Score a feature vector into (0, 1).
    #[must_use]
    pub fn score(&self, features: &[f64; 6]) -> f64 {
        let z: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        sigmoid(z)
    }

    /// Train with plain SGD over `(features, label, weight)` rows, holding
    /// out the last fifth for evaluation.
    pub fn train(
        &mut self,
        examples: &[(Value, i32, f64)],
        epochs: u32,
        learning_rate: f64,
    ) -> TrainingMetrics {
        let mut metrics = TrainingMetrics::default();
        if examples.is_empty() {
            metrics.train_loss = f64::NAN;
            metrics.eval_loss = f64::NAN;
            return metrics;
        }

        let rows: Vec<([f64; 6], f64, f64)> = examples
            .iter()
            .map(|(features, label, weight)| {
                let (vector, ok) = feature_vector(features);
                if !ok {
                    metrics.prediction_failures += 1;
                }
                (vector, f64::from(*label), *weight)
            })
            .collect();
        let holdout = (rows.len() / 5).max(1).min(rows.len());
        let split = rows.len() - holdout;
        let (train_rows, eval_rows) = rows.split_at(split.max(1).min(rows.len()));
        let eval_rows = if eval_rows.is_empty() { train_rows } else { eval_rows };

        for _ in 0..epochs.max(1) {
            let mut loss = 0.0;
            for (x, y, w) in train_rows {
                let p = self.score(x);
                let gradient = (p - y) * w;
                for (weight, feature) in self.weights.iter_mut().zip(x) {
                    *weight -= learning_rate * gradient * feature;
                }
                self.bias -= learning_rate * gradient;
                loss += log_loss(p, *y) * w;
            }
            metrics.train_loss = loss / train_rows.len().max(1) as f64;
        }

        // Held-out evaluation, plus saturation and latency probes.
        let started = Instant::now();
        let mut eval_loss = 0.0;
        let mut correct = 0usize;
        let mut saturated = 0usize;
        for (x, y, _) in eval_rows {
            let p = self.score(x);
            metrics.predictions += 1;
            eval_loss += log_loss(p, *y);
            if (p >= 0.5) == (*y >= 0.5) {
                correct += 1;
            }
            if !(0.01..=0.99).contains(&p) {
                saturated += 1;
            }
        }
        metrics.eval_loss = eval_loss / eval_rows.len().max(1) as f64;
        metrics.eval_accuracy = correct as f64 / eval_rows.len().max(1) as f64;
        metrics.saturation_rate = saturated as f64 / eval_rows.len().max(1) as f64;
        metrics.scoring_latency_us =
            started.elapsed().as_micros() as f64 / eval_rows.len().max(1) as f64;
        metrics
    }

    /// Persist the weights as JSON.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io("failed to create model directory", e))?;
        }
        let body = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, body)
            .map_err(|e| Error::io(format!("failed to write model {}", path.display()), e))
    }

    /// Load persisted weights.
    ///
    /// # Errors
    ///
    /// Returns an I/O or JSON error when the file is missing or invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let body = std::fs::read(path)
            .map_err(|e| Error::io(format!("failed to read model {}", path.display()), e))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn log_loss(p: f64, y: f64) -> f64 {
    let p = p.clamp(1e-9, 1.0 - 1e-9);
    -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
}
