//! Gem classifier: standardized L2 logistic regression over the signal
//! vector, trained offline on rule-labeled history.

use crate::entities::availability::{Availability, DegradedReason};
use crate::entities::feature_vector::{FeatureVector, Signal, SIGNAL_COUNT};
use crate::entities::gem_score::{GemScore, SignalContribution};
use crate::errors::TrainingRejected;
use crate::services::control::TrainingControl;
use crate::value_objects::trade_outcome::max_drawdown_percent;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

mod evaluation;
mod logistic;

pub use evaluation::{accuracy, mean_std, roc_auc};
use logistic::{FitParams, LogisticModel, Row};

/// A record is a gem when the forward return over `horizon_days` beats
/// `min_return_pct` without the path ever drawing down more than
/// `max_drawdown_pct`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabelRule {
    pub horizon_days: usize,
    pub min_return_pct: f64,
    pub max_drawdown_pct: f64,
}

impl Default for LabelRule {
    fn default() -> Self {
        Self {
            horizon_days: 30,
            min_return_pct: 20.0,
            max_drawdown_pct: 25.0,
        }
    }
}

impl LabelRule {
    pub fn label(&self, entry_price: f64, forward_prices: &[f64]) -> Option<bool> {
        let horizon = self.horizon_days.max(1);
        if !(entry_price.is_finite() && entry_price > 0.0) || forward_prices.len() < horizon {
            return None;
        }
        let window = &forward_prices[..horizon];
        let exit = *window.last()?;
        let forward_return = (exit / entry_price - 1.0) * 100.0;
        let drawdown = max_drawdown_percent(entry_price, window);
        Some(forward_return > self.min_return_pct && drawdown <= self.max_drawdown_pct)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.horizon_days == 0 {
            return Err("label.horizon_days must be > 0".to_string());
        }
        if !self.min_return_pct.is_finite() {
            return Err("label.min_return_pct must be finite".to_string());
        }
        if !(self.max_drawdown_pct.is_finite() && self.max_drawdown_pct >= 0.0) {
            return Err("label.max_drawdown_pct must be >= 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierConfig {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
    pub test_fraction: f64,
    pub cv_folds: usize,
    pub min_examples: usize,
    pub seed: u64,
    pub gem_threshold: f64,
    pub top_signals: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            epochs: 300,
            l2: 0.001,
            test_fraction: 0.2,
            cv_folds: 5,
            min_examples: 20,
            seed: 42,
            gem_threshold: 0.6,
            top_signals: 5,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err("classifier.learning_rate must be > 0".to_string());
        }
        if self.epochs == 0 {
            return Err("classifier.epochs must be > 0".to_string());
        }
        if !(self.l2.is_finite() && self.l2 >= 0.0) {
            return Err("classifier.l2 must be >= 0".to_string());
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err("classifier.test_fraction must be within (0, 1)".to_string());
        }
        if self.cv_folds < 2 {
            return Err("classifier.cv_folds must be >= 2".to_string());
        }
        if !(0.0..=1.0).contains(&self.gem_threshold) {
            return Err("classifier.gem_threshold must be within [0, 1]".to_string());
        }
        Ok(())
    }

    fn fit_params(&self) -> FitParams {
        FitParams {
            learning_rate: self.learning_rate,
            epochs: self.epochs,
            l2: self.l2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledExample {
    pub features: FeatureVector,
    pub is_gem: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub signal: Signal,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierMetrics {
    pub accuracy: f64,
    pub auc: f64,
    pub cross_val_mean: f64,
    pub cross_val_std: f64,
    /// Sorted by importance, descending.
    pub feature_importances: Vec<FeatureImportance>,
    pub train_size: usize,
    pub test_size: usize,
    pub positives: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GemClassifier {
    model: Option<LogisticModel>,
    gem_threshold: f64,
    top_signals: usize,
}

impl GemClassifier {
    pub fn untrained(config: &ClassifierConfig) -> Self {
        Self {
            model: None,
            gem_threshold: config.gem_threshold,
            top_signals: config.top_signals,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn gem_threshold(&self) -> f64 {
        self.gem_threshold
    }

    /// Never fails: an untrained classifier answers a coin flip flagged
    /// `model_untrained`.
    pub fn predict(&self, features: &FeatureVector) -> Availability<GemScore> {
        let Some(model) = &self.model else {
            return Availability::Degraded(
                GemScore::new(0.5, self.gem_threshold, Vec::new(), 0.0),
                DegradedReason::ModelUntrained,
            );
        };

        let z = model.standardizer.transform(features.values());
        let probability = logistic::sigmoid(model.logit_z(&z));

        let mut contributions: Vec<SignalContribution> = Signal::ALL
            .into_iter()
            .map(|signal| SignalContribution {
                signal,
                value: features.get(signal),
                contribution: model.weights[signal.index()] * z[signal.index()],
            })
            .collect();
        contributions.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));
        contributions.truncate(self.top_signals);

        let rms = (z.iter().map(|v| v * v).sum::<f64>() / SIGNAL_COUNT as f64).sqrt();
        let novelty = (rms / 3.0).min(1.0);

        Availability::Ready(GemScore::new(
            probability,
            self.gem_threshold,
            contributions,
            novelty,
        ))
    }

    pub fn feature_importances(&self) -> Vec<FeatureImportance> {
        let Some(model) = &self.model else {
            return Vec::new();
        };
        importances(&model.weights)
    }

    /// Checks parameters restored from storage.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.gem_threshold) {
            return Err("gem_threshold out of range".to_string());
        }
        match &self.model {
            Some(model) => model.validate(),
            None => Ok(()),
        }
    }

    /// Trains on a stratified hold-out split and reports hold-out metrics plus
    /// k-fold cross-validation accuracy on the training part.
    pub fn train(
        examples: &[LabeledExample],
        config: &ClassifierConfig,
        control: &dyn TrainingControl,
    ) -> Result<(Self, ClassifierMetrics), TrainingRejected> {
        let positives = examples.iter().filter(|e| e.is_gem).count();
        let negatives = examples.len() - positives;
        if examples.len() < config.min_examples.max(4) {
            return Err(TrainingRejected::InsufficientData(format!(
                "{} labeled examples, need at least {}",
                examples.len(),
                config.min_examples.max(4)
            )));
        }
        if positives < 2 || negatives < 2 {
            return Err(TrainingRejected::InsufficientData(format!(
                "need at least 2 examples per class, got {positives} positive / {negatives} negative"
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let (train_idx, test_idx) = stratified_split(examples, config.test_fraction, &mut rng);

        let train_rows = rows_of(examples, &train_idx);
        let train_labels = labels_of(examples, &train_idx);
        let model = LogisticModel::fit(&train_rows, &train_labels, config.fit_params(), control)?;

        let test_labels = labels_of(examples, &test_idx);
        let test_scores: Vec<f64> = rows_of(examples, &test_idx)
            .into_iter()
            .map(|row| model.predict_proba(row))
            .collect();

        let folds = config.cv_folds.min(train_idx.len()).max(2);
        let mut fold_scores = Vec::with_capacity(folds);
        for fold in 0..folds {
            let mut held = Vec::new();
            let mut kept = Vec::new();
            for (pos, idx) in train_idx.iter().copied().enumerate() {
                if pos % folds == fold {
                    held.push(idx);
                } else {
                    kept.push(idx);
                }
            }
            if held.is_empty() || kept.is_empty() {
                continue;
            }
            let fold_model = LogisticModel::fit(
                &rows_of(examples, &kept),
                &labels_of(examples, &kept),
                config.fit_params(),
                control,
            )?;
            let scores: Vec<f64> = rows_of(examples, &held)
                .into_iter()
                .map(|row| fold_model.predict_proba(row))
                .collect();
            fold_scores.push(accuracy(&scores, &labels_of(examples, &held), 0.5));
        }
        let (cross_val_mean, cross_val_std) = mean_std(&fold_scores);

        let metrics = ClassifierMetrics {
            accuracy: accuracy(&test_scores, &test_labels, 0.5),
            auc: roc_auc(&test_scores, &test_labels),
            cross_val_mean,
            cross_val_std,
            feature_importances: importances(&model.weights),
            train_size: train_idx.len(),
            test_size: test_idx.len(),
            positives,
        };
        let classifier = Self {
            model: Some(model),
            gem_threshold: config.gem_threshold,
            top_signals: config.top_signals,
        };
        Ok((classifier, metrics))
    }
}

fn importances(weights: &[f64]) -> Vec<FeatureImportance> {
    let total: f64 = weights.iter().map(|w| w.abs()).sum();
    let mut out: Vec<FeatureImportance> = Signal::ALL
        .into_iter()
        .map(|signal| FeatureImportance {
            signal,
            importance: if total > 0.0 {
                weights[signal.index()].abs() / total
            } else {
                0.0
            },
        })
        .collect();
    out.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    out
}

/// Shuffles each class separately and holds out `test_fraction` of each, at
/// least one example per class.
fn stratified_split(
    examples: &[LabeledExample],
    test_fraction: f64,
    rng: &mut StdRng,
) -> (Vec<usize>, Vec<usize>) {
    let mut train = Vec::new();
    let mut test = Vec::new();
    for class in [true, false] {
        let mut idx: Vec<usize> = (0..examples.len())
            .filter(|i| examples[*i].is_gem == class)
            .collect();
        idx.shuffle(rng);
        let held = ((idx.len() as f64 * test_fraction).round() as usize).clamp(1, idx.len() - 1);
        test.extend_from_slice(&idx[..held]);
        train.extend_from_slice(&idx[held..]);
    }
    train.shuffle(rng);
    (train, test)
}

fn rows_of<'a>(examples: &'a [LabeledExample], idx: &[usize]) -> Vec<&'a Row> {
    idx.iter().map(|i| examples[*i].features.values()).collect()
}

fn labels_of(examples: &[LabeledExample], idx: &[usize]) -> Vec<bool> {
    idx.iter().map(|i| examples[*i].is_gem).collect()
}

#[cfg(test)]
mod tests {
    use super::{ClassifierConfig, GemClassifier, LabelRule, LabeledExample};
    use crate::entities::availability::{Availability, DegradedReason};
    use crate::entities::feature_vector::{FeatureVector, Signal};
    use crate::errors::TrainingRejected;
    use crate::services::control::{CancellationToken, NoopControl};

    fn example(i: usize, is_gem: bool) -> LabeledExample {
        let jitter = (i % 7) as f64 * 0.02;
        let mut features = FeatureVector::neutral();
        if is_gem {
            features.set(Signal::FearOpportunity, 0.7 + jitter);
            features.set(Signal::VolumeSurge, 0.8 + jitter);
        } else {
            features.set(Signal::FearOpportunity, 0.05 + jitter);
            features.set(Signal::VolumeSurge, 0.2 + jitter);
        }
        features.set(Signal::Momentum, ((i % 5) as f64 - 2.0) * 0.1);
        LabeledExample { features, is_gem }
    }

    fn dataset(n: usize) -> Vec<LabeledExample> {
        (0..n).map(|i| example(i, i % 3 == 0)).collect()
    }

    #[test]
    fn untrained_classifier_returns_coin_flip() {
        let classifier = GemClassifier::untrained(&ClassifierConfig::default());
        let result = classifier.predict(&FeatureVector::neutral());
        let Availability::Degraded(score, reason) = result else {
            panic!("expected degraded result");
        };
        assert_eq!(reason, DegradedReason::ModelUntrained);
        assert_eq!(score.gem_probability, 0.5);
        assert_eq!(score.gem_score, 50);
        assert!(score.contributing_signals.is_empty());
    }

    #[test]
    fn label_rule_requires_return_without_deep_drawdown() {
        let rule = LabelRule {
            horizon_days: 3,
            min_return_pct: 20.0,
            max_drawdown_pct: 25.0,
        };
        assert_eq!(rule.label(1.0, &[1.1, 1.2, 1.3]), Some(true));
        assert_eq!(rule.label(1.0, &[0.7, 1.0, 1.3]), Some(false));
        assert_eq!(rule.label(1.0, &[1.0, 1.05, 1.1]), Some(false));
        assert_eq!(rule.label(1.0, &[1.5, 1.6]), None);
        assert_eq!(rule.label(1.0, &[1.1, 1.2, 1.3, 0.1]), Some(true));
    }

    #[test]
    fn training_rejects_small_or_single_class_sets() {
        let config = ClassifierConfig::default();
        let err = GemClassifier::train(&dataset(5), &config, &NoopControl).expect_err("too small");
        assert_eq!(err.code(), "insufficient_data");

        let one_class: Vec<LabeledExample> = (0..30).map(|i| example(i, false)).collect();
        let err = GemClassifier::train(&one_class, &config, &NoopControl).expect_err("one class");
        assert_eq!(err.code(), "insufficient_data");
    }

    #[test]
    fn learns_fear_and_surge_pattern() {
        let config = ClassifierConfig::default();
        let (classifier, metrics) =
            GemClassifier::train(&dataset(90), &config, &NoopControl).expect("train");
        assert!(classifier.is_trained());
        assert!(metrics.auc > 0.95, "auc {}", metrics.auc);
        assert!(metrics.accuracy > 0.9);
        assert!(metrics.cross_val_mean > 0.9);
        assert_eq!(metrics.train_size + metrics.test_size, 90);
        let total: f64 = metrics.feature_importances.iter().map(|f| f.importance).sum();
        assert!((total - 1.0).abs() < 1e-9);

        let Availability::Ready(score) = classifier.predict(&example(1, true).features) else {
            panic!("trained classifier should be ready");
        };
        assert!(score.gem_probability > 0.7);
        assert!(score.is_gem);
        let top: Vec<Signal> = score.contributing_signals.iter().map(|c| c.signal).collect();
        assert!(top.contains(&Signal::FearOpportunity) || top.contains(&Signal::VolumeSurge));
        assert!(score.contributing_signals.len() <= config.top_signals);
    }

    #[test]
    fn training_is_deterministic_for_a_seed() {
        let config = ClassifierConfig::default();
        let data = dataset(60);
        let (a, ma) = GemClassifier::train(&data, &config, &NoopControl).expect("train a");
        let (b, mb) = GemClassifier::train(&data, &config, &NoopControl).expect("train b");
        assert_eq!(a, b);
        assert_eq!(ma, mb);
    }

    #[test]
    fn far_from_training_data_raises_novelty() {
        let (classifier, _) =
            GemClassifier::train(&dataset(60), &ClassifierConfig::default(), &NoopControl)
                .expect("train");
        let familiar = classifier.predict(&example(2, false).features);
        let mut odd = FeatureVector::neutral();
        for signal in Signal::ALL {
            let (_, hi) = signal.range();
            odd.set(signal, hi);
        }
        let strange = classifier.predict(&odd);
        let familiar = familiar.value().expect("value").novelty;
        let strange = strange.value().expect("value").novelty;
        assert!(strange > familiar);
    }

    #[test]
    fn cancelled_training_is_rejected() {
        let token = CancellationToken::new();
        token.cancel();
        let err = GemClassifier::train(&dataset(60), &ClassifierConfig::default(), &token)
            .expect_err("cancelled");
        assert_eq!(err, TrainingRejected::Cancelled);
    }
}
