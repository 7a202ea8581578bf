use crate::entities::feature_vector::SIGNAL_COUNT;
use crate::errors::TrainingRejected;
use crate::services::control::TrainingControl;
use serde::{Deserialize, Serialize};

pub type Row = [f64; SIGNAL_COUNT];

#[derive(Debug, Clone, Copy)]
pub struct FitParams {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
}

/// Per-feature z-scoring with training-set statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl Standardizer {
    pub fn fit(rows: &[&Row]) -> Self {
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; SIGNAL_COUNT];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row.iter()) {
                *m += v / n;
            }
        }
        let mut stds = vec![0.0; SIGNAL_COUNT];
        for row in rows {
            for ((s, v), m) in stds.iter_mut().zip(row.iter()).zip(&means) {
                *s += (v - m).powi(2) / n;
            }
        }
        for s in &mut stds {
            *s = s.sqrt();
            if !s.is_finite() || *s < 1e-9 {
                *s = 1.0;
            }
        }
        Self { means, stds }
    }

    pub fn transform(&self, row: &Row) -> Row {
        let mut z = [0.0; SIGNAL_COUNT];
        for (i, slot) in z.iter_mut().enumerate() {
            *slot = (row[i] - self.means[i]) / self.stds[i];
        }
        z
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub standardizer: Standardizer,
    pub weights: Vec<f64>,
    pub bias: f64,
}

pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

impl LogisticModel {
    pub fn logit_z(&self, z: &Row) -> f64 {
        self.bias + self.weights.iter().zip(z.iter()).map(|(w, x)| w * x).sum::<f64>()
    }

    pub fn predict_proba(&self, row: &Row) -> f64 {
        sigmoid(self.logit_z(&self.standardizer.transform(row)))
    }

    /// Full-batch gradient descent with L2 on the weights. Polls `control`
    /// once per epoch.
    pub fn fit(
        rows: &[&Row],
        labels: &[bool],
        params: FitParams,
        control: &dyn TrainingControl,
    ) -> Result<Self, TrainingRejected> {
        let standardizer = Standardizer::fit(rows);
        let zs: Vec<Row> = rows.iter().map(|row| standardizer.transform(row)).collect();
        let n = zs.len().max(1) as f64;
        let mut weights = vec![0.0; SIGNAL_COUNT];
        let mut bias = 0.0;

        for _ in 0..params.epochs {
            if control.should_cancel() {
                return Err(TrainingRejected::Cancelled);
            }
            let mut grad_w = vec![0.0; SIGNAL_COUNT];
            let mut grad_b = 0.0;
            for (z, label) in zs.iter().zip(labels) {
                let logit = bias + weights.iter().zip(z.iter()).map(|(w, x)| w * x).sum::<f64>();
                let err = sigmoid(logit) - if *label { 1.0 } else { 0.0 };
                for (g, x) in grad_w.iter_mut().zip(z.iter()) {
                    *g += err * x / n;
                }
                grad_b += err / n;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= params.learning_rate * (g + params.l2 * *w);
            }
            bias -= params.learning_rate * grad_b;
        }

        Ok(Self {
            standardizer,
            weights,
            bias,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.weights.len() != SIGNAL_COUNT
            || self.standardizer.means.len() != SIGNAL_COUNT
            || self.standardizer.stds.len() != SIGNAL_COUNT
        {
            return Err(format!(
                "expected {SIGNAL_COUNT} weights/means/stds, got {}/{}/{}",
                self.weights.len(),
                self.standardizer.means.len(),
                self.standardizer.stds.len()
            ));
        }
        let all_finite = self
            .weights
            .iter()
            .chain(&self.standardizer.means)
            .chain(std::iter::once(&self.bias))
            .all(|v| v.is_finite());
        if !all_finite {
            return Err("non-finite classifier parameter".to_string());
        }
        if self.standardizer.stds.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err("standardizer stds must be > 0".to_string());
        }
        Ok(())
    }
}
