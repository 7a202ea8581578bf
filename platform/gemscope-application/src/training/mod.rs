//! Batch training from historical records.
//!
//! Produces a fresh classifier and agent plus a report. Nothing here touches
//! the active models or the store; promotion belongs to the live service.

use crate::config::Config;
use gemscope_domain::entities::feature_vector::FeatureVector;
use gemscope_domain::errors::TrainingRejected;
use gemscope_domain::services::classifier::{
    ClassifierMetrics, FeatureImportance, GemClassifier, LabeledExample,
};
use gemscope_domain::services::control::TrainingControl;
use gemscope_domain::services::features::stats::{mean, sample_std};
use gemscope_domain::services::features::AlphaFeatureExtractor;
use gemscope_domain::services::rl::{
    Experience, ReplayScenario, RewardModel, RlAgent, RlState, RlTrainingMetrics,
};
use gemscope_domain::value_objects::action::ActionKind;
use gemscope_domain::value_objects::coin_snapshot::CoinSnapshot;
use gemscope_domain::value_objects::historical_record::HistoricalRecord;
use gemscope_domain::value_objects::market_context::MarketContext;
use gemscope_domain::value_objects::trade_outcome::TradeOutcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const SECONDS_PER_DAY: i64 = 86_400;
const TOP_FEATURES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub classifier_metrics: ClassifierMetrics,
    pub rl_metrics: RlTrainingMetrics,
    /// Share of greedy BUY decisions over the training scenarios that gained.
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    pub top_features: Vec<FeatureImportance>,
    pub valid_records: usize,
    pub skipped_records: usize,
    pub skip_reasons: BTreeMap<String, usize>,
    pub model_version: u64,
}

#[derive(Debug, Clone)]
pub struct TrainingOutput {
    pub classifier: GemClassifier,
    /// Replay memory already stripped.
    pub agent: RlAgent,
    pub report: TrainingReport,
}

struct Prepared<'a> {
    record: &'a HistoricalRecord,
    context: MarketContext,
    features: FeatureVector,
}

pub struct TrainingOrchestrator {
    config: Config,
    extractor: AlphaFeatureExtractor,
    reward_model: RewardModel,
}

impl TrainingOrchestrator {
    pub fn new(config: Config) -> Self {
        let extractor = AlphaFeatureExtractor::new(config.features.clone());
        let reward_model = RewardModel::new(config.reward.clone());
        Self {
            config,
            extractor,
            reward_model,
        }
    }

    /// Trains a new generation.
    ///
    /// `base_agent` is the active agent; the new one continues from its
    /// parameters after absorbing `live_experiences`.
    pub fn run(
        &self,
        records: &[HistoricalRecord],
        base_agent: &RlAgent,
        live_experiences: Vec<Experience>,
        model_version: u64,
        control: &dyn TrainingControl,
    ) -> Result<TrainingOutput, TrainingRejected> {
        if records.is_empty() {
            return Err(TrainingRejected::InsufficientData(
                "no historical records supplied".to_string(),
            ));
        }
        let horizon = self.config.label.horizon_days.max(1);

        let mut skip_reasons: BTreeMap<String, usize> = BTreeMap::new();
        let mut valid: Vec<&HistoricalRecord> = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            match record.validate(horizon) {
                Ok(()) => valid.push(record),
                Err(issue) => {
                    tracing::debug!(index = idx, reason = issue.as_str(), "skipping record");
                    *skip_reasons.entry(issue.as_str().to_string()).or_default() += 1;
                }
            }
        }
        let max_records = self.config.training.max_records.max(1);
        if valid.len() > max_records {
            valid.sort_by_key(|record| record.snapshot.timestamp);
            let dropped = valid.len() - max_records;
            valid = valid.split_off(dropped);
            *skip_reasons
                .entry("exceeds_max_records".to_string())
                .or_default() += dropped;
        }
        let skipped_records: usize = skip_reasons.values().sum();
        metrics::counter!("gemscope.training.records_total", "result" => "valid")
            .increment(valid.len() as u64);
        metrics::counter!("gemscope.training.records_total", "result" => "skipped")
            .increment(skipped_records as u64);

        if valid.is_empty() {
            return Err(TrainingRejected::InsufficientData(format!(
                "no valid records ({skipped_records} skipped)"
            )));
        }

        let prepared: Vec<Prepared<'_>> = valid
            .iter()
            .map(|&record| {
                let context = record.context_or_neutral();
                let features = self.extractor.extract_with_context(
                    &record.snapshot,
                    &record.history,
                    &context,
                );
                Prepared {
                    record,
                    context,
                    features,
                }
            })
            .collect();

        let examples: Vec<LabeledExample> = prepared
            .iter()
            .filter_map(|p| {
                let entry = p.record.snapshot.usable_price()?;
                let is_gem = self.config.label.label(entry, &p.record.forward_prices)?;
                Some(LabeledExample {
                    features: p.features.clone(),
                    is_gem,
                })
            })
            .collect();

        let (classifier, classifier_metrics) =
            GemClassifier::train(&examples, &self.config.classifier, control)?;
        tracing::info!(
            accuracy = classifier_metrics.accuracy,
            auc = classifier_metrics.auc,
            cv_mean = classifier_metrics.cross_val_mean,
            "classifier trained"
        );
        if control.should_cancel() {
            return Err(TrainingRejected::Cancelled);
        }

        let scenarios: Vec<ReplayScenario> = prepared
            .iter()
            .filter_map(|p| self.scenario(p, &classifier, horizon))
            .collect();

        let mut agent = base_agent.clone();
        agent.reconfigure(self.config.rl.clone());
        agent.absorb(live_experiences);
        let rl_metrics = agent.train(&scenarios, &self.reward_model, control)?;
        tracing::info!(
            updates = rl_metrics.updates,
            mean_abs_td_error = rl_metrics.mean_abs_td_error,
            "agent trained"
        );

        let (win_rate, sharpe_ratio) = evaluate_greedy(&agent, &scenarios);
        let top_features = classifier_metrics
            .feature_importances
            .iter()
            .take(TOP_FEATURES)
            .copied()
            .collect();

        let report = TrainingReport {
            classifier_metrics,
            rl_metrics,
            win_rate,
            sharpe_ratio,
            top_features,
            valid_records: prepared.len(),
            skipped_records,
            skip_reasons,
            model_version,
        };
        Ok(TrainingOutput {
            classifier,
            agent: agent.without_experiences(),
            report,
        })
    }

    fn scenario(
        &self,
        prepared: &Prepared<'_>,
        classifier: &GemClassifier,
        horizon: usize,
    ) -> Option<ReplayScenario> {
        let snapshot = &prepared.record.snapshot;
        let entry_price = snapshot.usable_price()?;
        let path = prepared.record.forward_prices.get(..horizon)?;
        let outcome = TradeOutcome::from_price_path(
            &snapshot.symbol,
            snapshot.timestamp,
            entry_price,
            path,
        )?;
        let regime = prepared.context.market_regime().unwrap_or(0.0);
        let state = RlState::new(
            &prepared.features,
            gem_probability(classifier, &prepared.features),
            regime,
        );

        let (exit, history) = horizon_view(prepared.record, path);
        let next_features =
            self.extractor
                .extract_with_context(&exit, &history, &prepared.context);
        let next_state = RlState::new(
            &next_features,
            gem_probability(classifier, &next_features),
            regime,
        );

        Some(ReplayScenario {
            state,
            outcome,
            next_state: Some(next_state),
        })
    }
}

fn gem_probability(classifier: &GemClassifier, features: &FeatureVector) -> f64 {
    classifier
        .predict(features)
        .value()
        .map(|score| score.gem_probability)
        .unwrap_or(0.5)
}

/// The market as it would look at the end of the holding period: the forward
/// path becomes daily history and its last price the new snapshot. Volume is
/// carried forward from the entry snapshot.
fn horizon_view(record: &HistoricalRecord, path: &[f64]) -> (CoinSnapshot, Vec<CoinSnapshot>) {
    let entry = &record.snapshot;
    let mut history = record.history.clone();
    history.push(entry.clone());

    let mut previous = entry.price;
    for (day, price) in path.iter().copied().enumerate() {
        let timestamp = entry.timestamp + (day as i64 + 1) * SECONDS_PER_DAY;
        let point = CoinSnapshot {
            price,
            market_cap: entry.market_cap * price / entry.price,
            price_change_24h: (price / previous - 1.0) * 100.0,
            timestamp,
            ..entry.clone()
        };
        previous = price;
        history.push(point);
    }
    let exit = history.pop().unwrap_or_else(|| entry.clone());
    (exit, history)
}

/// Win rate and Sharpe ratio of the greedy policy's BUY decisions.
fn evaluate_greedy(agent: &RlAgent, scenarios: &[ReplayScenario]) -> (f64, f64) {
    let returns: Vec<f64> = scenarios
        .iter()
        .filter(|scenario| {
            agent
                .predict(&scenario.state)
                .value()
                .is_some_and(|action| action.kind == ActionKind::Buy)
        })
        .map(|scenario| scenario.outcome.profit_loss_percent)
        .collect();
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let wins = returns.iter().filter(|r| **r > 0.0).count();
    let win_rate = wins as f64 / returns.len() as f64;
    let sharpe = match (mean(&returns), sample_std(&returns)) {
        (Some(m), Some(s)) if s > 1e-12 => m / s,
        _ => 0.0,
    };
    (win_rate, sharpe)
}

#[cfg(test)]
mod tests {
    use super::{evaluate_greedy, horizon_view, TrainingOrchestrator};
    use crate::benchmarking::synthetic_records;
    use crate::config::Config;
    use gemscope_domain::services::control::{CancellationToken, NoopControl};
    use gemscope_domain::services::rl::RlAgent;
    use gemscope_domain::value_objects::coin_snapshot::CoinSnapshot;
    use gemscope_domain::value_objects::historical_record::HistoricalRecord;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.classifier.epochs = 80;
        config.rl.epochs = 10;
        config
    }

    #[test]
    fn empty_input_is_insufficient_data() {
        let orchestrator = TrainingOrchestrator::new(Config::default());
        let err = orchestrator
            .run(&[], &RlAgent::new(Default::default()), Vec::new(), 1, &NoopControl)
            .expect_err("empty");
        assert_eq!(err.code(), "insufficient_data");
    }

    #[test]
    fn invalid_records_are_skipped_and_counted() {
        let config = fast_config();
        let mut records = synthetic_records(160, config.label.horizon_days, 11);
        records[0].snapshot.symbol = " ".to_string();
        records[1].snapshot.price = f64::NAN;
        records[2].forward_prices.truncate(3);
        records[3].forward_prices[0] = -1.0;

        let orchestrator = TrainingOrchestrator::new(config.clone());
        let output = orchestrator
            .run(&records, &RlAgent::new(config.rl.clone()), Vec::new(), 4, &NoopControl)
            .expect("train");
        let report = &output.report;
        assert_eq!(report.valid_records, 156);
        assert_eq!(report.skipped_records, 4);
        assert_eq!(report.skip_reasons.get("missing_symbol"), Some(&1));
        assert_eq!(report.skip_reasons.get("invalid_price"), Some(&1));
        assert_eq!(report.skip_reasons.get("forward_path_too_short"), Some(&1));
        assert_eq!(report.skip_reasons.get("invalid_forward_price"), Some(&1));
        assert_eq!(report.model_version, 4);
        assert!(output.classifier.is_trained());
        assert!(output.agent.is_ready());
        assert!(output.agent.experiences().is_empty());
        assert!((0.0..=1.0).contains(&report.win_rate));
        assert!(report.top_features.len() <= 5);
    }

    #[test]
    fn max_records_keeps_the_most_recent() {
        let mut config = fast_config();
        config.training.max_records = 120;
        let records = synthetic_records(150, config.label.horizon_days, 5);
        let orchestrator = TrainingOrchestrator::new(config.clone());
        let output = orchestrator
            .run(&records, &RlAgent::new(config.rl.clone()), Vec::new(), 1, &NoopControl)
            .expect("train");
        assert_eq!(output.report.valid_records, 120);
        assert_eq!(output.report.skip_reasons.get("exceeds_max_records"), Some(&30));
    }

    #[test]
    fn cancelled_pass_is_rejected() {
        let config = fast_config();
        let records = synthetic_records(80, config.label.horizon_days, 3);
        let token = CancellationToken::new();
        token.cancel();
        let err = TrainingOrchestrator::new(config.clone())
            .run(&records, &RlAgent::new(config.rl.clone()), Vec::new(), 1, &token)
            .expect_err("cancelled");
        assert_eq!(err.code(), "cancelled");
    }

    #[test]
    fn horizon_view_rolls_forward_path_into_history() {
        let snapshot = CoinSnapshot {
            symbol: "ABC".to_string(),
            price: 10.0,
            volume_24h: 1_000.0,
            market_cap: 1_000_000.0,
            market_cap_rank: Some(400),
            price_change_24h: 0.0,
            timestamp: 1_000,
        };
        let record = HistoricalRecord {
            snapshot,
            history: Vec::new(),
            forward_prices: vec![11.0, 12.0, 15.0],
            context: None,
        };
        let (exit, history) = horizon_view(&record, &record.forward_prices);
        assert_eq!(exit.price, 15.0);
        assert_eq!(exit.timestamp, 1_000 + 3 * 86_400);
        assert!((exit.price_change_24h - 25.0).abs() < 1e-9);
        assert!((exit.market_cap - 1_500_000.0).abs() < 1e-6);
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn untrained_agent_makes_no_trades() {
        let agent = RlAgent::new(Default::default());
        assert_eq!(evaluate_greedy(&agent, &[]), (0.0, 0.0));
    }
}
