//! Live recommendation service: the single entry point for inference,
//! outcome feedback, retraining and status.
//!
//! Inference reads an immutable [`ModelSnapshot`] through [`ModelHandle`];
//! training runs exclusively and promotes a new snapshot only after its blobs
//! and the `active` manifest are written.

mod guard;
mod recommendation;

pub use guard::GuardOutcome;
pub use recommendation::{
    assess_risk, entry_timing, position_size, Recommendation, RiskAssessment, RiskLevel,
    RlRecommendation, StatusFlag,
};

use crate::config::Config;
use crate::models::{load_active, persist_snapshot, ModelHandle, ModelSnapshot};
use crate::training::{TrainingOrchestrator, TrainingReport};
use chrono::{DateTime, Utc};
use gemscope_domain::entities::availability::{Availability, DegradedReason};
use gemscope_domain::entities::gem_score::GemScore;
use gemscope_domain::errors::{InputDataError, TrainingRejected};
use gemscope_domain::repositories::model_store::ModelStore;
use gemscope_domain::services::control::{CancellationToken, NoopControl, TrainingControl};
use gemscope_domain::services::features::AlphaFeatureExtractor;
use gemscope_domain::services::rl::{Experience, ExperienceStore, RewardModel, RlState};
use gemscope_domain::value_objects::action::{ActionKind, RlAction};
use gemscope_domain::value_objects::coin_snapshot::CoinSnapshot;
use gemscope_domain::value_objects::historical_record::HistoricalRecord;
use gemscope_domain::value_objects::market_context::MarketContext;
use gemscope_domain::value_objects::trade_outcome::TradeOutcome;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeAck {
    pub symbol: String,
    pub reward: f64,
    /// Whether the experience was paired with a state cached by `analyze`.
    pub matched_entry_state: bool,
    pub experience_buffer_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub classifier_trained: bool,
    pub rl_ready: bool,
    pub last_training_time: Option<DateTime<Utc>>,
    pub experience_buffer_size: usize,
    /// Over the most recent `live_window` outcomes; 0 when none.
    pub live_win_rate: f64,
    pub live_average_return: f64,
    /// Outcomes recorded since start-up.
    pub live_outcomes: u64,
    pub model_version: u64,
    pub training_in_progress: bool,
}

/// Latest entry state per symbol, bounded with FIFO eviction.
#[derive(Debug)]
struct EntryCache {
    states: HashMap<String, RlState>,
    order: VecDeque<String>,
    capacity: usize,
}

impl EntryCache {
    fn new(capacity: usize) -> Self {
        Self {
            states: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn insert(&mut self, key: String, state: RlState) {
        if self.states.insert(key.clone(), state).is_none() {
            self.order.push_back(key);
            while self.order.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.states.remove(&oldest);
                }
            }
        }
    }

    fn get(&self, key: &str) -> Option<RlState> {
        self.states.get(key).copied()
    }
}

/// Holds the training flag for the lifetime of one pass, together with the
/// pass's cancellation token.
struct TrainingGuard<'a> {
    flag: &'a AtomicBool,
    token: CancellationToken,
}

impl<'a> TrainingGuard<'a> {
    /// The flag flips and the fresh token lands in `slot` under one lock, so
    /// a canceller that sees the flag set always reaches this pass's token.
    fn acquire(
        flag: &'a AtomicBool,
        slot: &Mutex<CancellationToken>,
    ) -> Result<Self, TrainingRejected> {
        let mut current = slot.lock();
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TrainingRejected::AlreadyTraining)?;
        let token = CancellationToken::new();
        *current = token.clone();
        Ok(Self { flag, token })
    }
}

impl Drop for TrainingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Cancels when either the caller's control or `cancel_training` says so.
struct CombinedControl<'a> {
    token: &'a CancellationToken,
    caller: &'a dyn TrainingControl,
}

impl TrainingControl for CombinedControl<'_> {
    fn should_cancel(&self) -> bool {
        self.token.is_cancelled() || self.caller.should_cancel()
    }
}

pub struct LiveRecommendationService {
    config: Config,
    store: Arc<dyn ModelStore>,
    extractor: AlphaFeatureExtractor,
    reward_model: RewardModel,
    models: ModelHandle,
    live_experiences: Mutex<ExperienceStore>,
    live_returns: Mutex<VecDeque<f64>>,
    live_outcomes: AtomicU64,
    entry_states: Mutex<EntryCache>,
    training: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl LiveRecommendationService {
    /// Starts untrained without reading the store.
    pub fn new(config: Config, store: Arc<dyn ModelStore>) -> Self {
        let snapshot = ModelSnapshot::untrained(&config.classifier, &config.rl);
        Self::from_snapshot(config, store, snapshot)
    }

    /// Starts from whatever generation the store marks active. A missing
    /// manifest means untrained; a corrupt one is logged and also means
    /// untrained.
    pub fn load(config: Config, store: Arc<dyn ModelStore>) -> Self {
        let span = tracing::info_span!("load_models");
        let _enter = span.enter();

        let snapshot = match load_active(store.as_ref()) {
            Ok(Some(snapshot)) => {
                tracing::info!(version = snapshot.version, "loaded active models");
                metrics::counter!("gemscope.models.load_total", "result" => "ok").increment(1);
                snapshot
            }
            Ok(None) => {
                tracing::info!("no active models; starting untrained");
                metrics::counter!("gemscope.models.load_total", "result" => "missing")
                    .increment(1);
                ModelSnapshot::untrained(&config.classifier, &config.rl)
            }
            Err(err) => {
                tracing::warn!(blob = %err.name, error = %err, "model corruption; starting untrained");
                metrics::counter!("gemscope.models.load_total", "result" => "corrupt")
                    .increment(1);
                ModelSnapshot::untrained(&config.classifier, &config.rl)
            }
        };
        Self::from_snapshot(config, store, snapshot)
    }

    pub fn from_snapshot(
        config: Config,
        store: Arc<dyn ModelStore>,
        snapshot: ModelSnapshot,
    ) -> Self {
        let extractor = AlphaFeatureExtractor::new(config.features.clone());
        let reward_model = RewardModel::new(config.reward.clone());
        let live_experiences = ExperienceStore::new(config.rl.buffer_capacity);
        let entry_states = EntryCache::new(config.service.entry_cache_capacity);
        Self {
            store,
            extractor,
            reward_model,
            models: ModelHandle::new(snapshot),
            live_experiences: Mutex::new(live_experiences),
            live_returns: Mutex::new(VecDeque::new()),
            live_outcomes: AtomicU64::new(0),
            entry_states: Mutex::new(entry_states),
            training: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn active_snapshot(&self) -> Arc<ModelSnapshot> {
        self.models.current()
    }

    pub fn analyze(
        &self,
        snapshot: &CoinSnapshot,
        history: &[CoinSnapshot],
    ) -> Availability<Recommendation> {
        self.analyze_with_context(snapshot, history, &MarketContext::neutral())
    }

    pub fn analyze_with_context(
        &self,
        snapshot: &CoinSnapshot,
        history: &[CoinSnapshot],
        context: &MarketContext,
    ) -> Availability<Recommendation> {
        let start = Instant::now();
        let result = self.analyze_inner(snapshot, history, context);
        metrics::counter!("gemscope.analyze.calls_total", "status" => result.status_label())
            .increment(1);
        metrics::histogram!("gemscope.analyze.duration_us", "status" => result.status_label())
            .record(start.elapsed().as_micros() as f64);
        result
    }

    fn analyze_inner(
        &self,
        snapshot: &CoinSnapshot,
        history: &[CoinSnapshot],
        context: &MarketContext,
    ) -> Availability<Recommendation> {
        if !snapshot.has_symbol() && snapshot.usable_price().is_none() {
            tracing::debug!("rejecting snapshot without symbol or price");
            return Availability::Unavailable(DegradedReason::InvalidInput);
        }
        let models = self.models.current();
        let features = self
            .extractor
            .extract_with_context(snapshot, history, context);

        let gem = models.classifier.predict(&features);
        let classifier_ready = gem.is_ready();
        let gem_status = gem
            .reason()
            .map_or("ready", DegradedReason::as_str)
            .to_string();
        let gem_score = gem.into_value().unwrap_or_else(|| {
            GemScore::new(0.5, models.classifier.gem_threshold(), Vec::new(), 0.0)
        });

        let state = RlState::new(
            &features,
            gem_score.gem_probability,
            context.market_regime().unwrap_or(0.0),
        );
        let rl = models.agent.predict(&state);
        let rl_ready = rl.is_ready();
        let rl_action = rl.into_value().unwrap_or_else(RlAction::hold);

        if let Some(mut cache) = self.entry_states.try_lock() {
            cache.insert(snapshot.symbol_key(), state);
        }

        let mut flags = Vec::new();
        if !classifier_ready {
            flags.push(StatusFlag::ModelUntrained);
        }
        if !rl_ready {
            flags.push(StatusFlag::NotTrained);
        }
        if features.low_confidence() {
            flags.push(StatusFlag::LowConfidence);
        }

        let classifier_confidence = gem_score.confidence();
        let combined = if rl_ready {
            let service = &self.config.service;
            let total = service.classifier_weight + service.rl_weight;
            (service.classifier_weight * classifier_confidence
                + service.rl_weight * rl_action.confidence)
                / total
        } else {
            classifier_confidence
        };

        let mut risk = assess_risk(snapshot, &gem_score, rl_action.confidence);
        let timing_signals = entry_timing(snapshot, self.extractor.config(), context);
        let position = position_size(
            &rl_action,
            gem_score.gem_probability,
            risk.risk_score,
            self.config.service.min_position_percent,
            self.config.service.max_position_percent,
        );

        let guarded = guard::apply(
            &self.config.guard,
            rl_action.kind,
            combined,
            position,
            gem_score.novelty,
            &features,
        );
        flags.extend(guarded.flags.iter().copied());
        risk.risk_factors.extend(guarded.risk_factors);

        let action = RlAction::new(rl_action.kind, guarded.position_percent, rl_action.confidence);
        let reasoning = recommendation::reasoning(&action, &gem_score, &features, rl_ready);

        let recommendation = Recommendation {
            symbol: snapshot.symbol.trim().to_string(),
            model_version: models.version,
            gem_score,
            gem_status,
            rl_recommendation: RlRecommendation {
                action,
                flag: (!rl_ready).then_some(StatusFlag::NotTrained),
                reasoning,
            },
            combined_confidence: guarded.confidence.clamp(0.0, 1.0),
            risk_assessment: risk,
            timing_signals,
            features,
            flags,
        };

        if !rl_ready {
            Availability::Degraded(recommendation, DegradedReason::NotTrained)
        } else if !classifier_ready {
            Availability::Degraded(recommendation, DegradedReason::ModelUntrained)
        } else {
            Availability::Ready(recommendation)
        }
    }

    /// Turns a closed trade into a BUY experience paired with the entry state
    /// cached by the latest `analyze` of that symbol. Never retrains.
    pub fn record_outcome(&self, outcome: &TradeOutcome) -> Result<OutcomeAck, InputDataError> {
        let result = self.record_outcome_inner(outcome);
        let label = if result.is_ok() { "ok" } else { "err" };
        metrics::counter!("gemscope.outcomes.recorded_total", "result" => label).increment(1);
        result
    }

    fn record_outcome_inner(&self, outcome: &TradeOutcome) -> Result<OutcomeAck, InputDataError> {
        outcome.validate()?;
        let reward = self.reward_model.reward(outcome);
        let key = outcome.symbol.trim().to_ascii_uppercase();
        let cached = self.entry_states.lock().get(&key);
        let matched_entry_state = cached.is_some();
        let experience = Experience {
            state: cached.unwrap_or_else(RlState::neutral),
            action: ActionKind::Buy,
            reward,
            next_state: None,
        };

        let experience_buffer_size = {
            let mut store = self.live_experiences.lock();
            store.push(experience);
            store.len()
        };
        {
            let mut returns = self.live_returns.lock();
            returns.push_back(outcome.profit_loss_percent);
            while returns.len() > self.config.service.live_window {
                returns.pop_front();
            }
        }
        self.live_outcomes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(symbol = %key, reward, matched_entry_state, "recorded trade outcome");

        Ok(OutcomeAck {
            symbol: key,
            reward,
            matched_entry_state,
            experience_buffer_size,
        })
    }

    pub fn train_from_history(
        &self,
        records: &[HistoricalRecord],
    ) -> Result<TrainingReport, TrainingRejected> {
        self.train_from_history_with_control(records, &NoopControl)
    }

    /// Trains a new generation and promotes it.
    ///
    /// Exclusive: a concurrent call is rejected with `already_training`.
    /// Promotion writes both blobs, then the `active` manifest, then swaps the
    /// in-memory snapshot; any failure leaves the previous generation active.
    pub fn train_from_history_with_control(
        &self,
        records: &[HistoricalRecord],
        control: &dyn TrainingControl,
    ) -> Result<TrainingReport, TrainingRejected> {
        let start = Instant::now();
        let result = self.train_inner(records, control);
        let label = match &result {
            Ok(_) => "ok",
            Err(err) => err.code(),
        };
        metrics::counter!("gemscope.training.runs_total", "result" => label).increment(1);
        metrics::histogram!("gemscope.training.duration_ms", "result" => label)
            .record(start.elapsed().as_millis() as f64);
        result
    }

    fn train_inner(
        &self,
        records: &[HistoricalRecord],
        control: &dyn TrainingControl,
    ) -> Result<TrainingReport, TrainingRejected> {
        let guard = TrainingGuard::acquire(&self.training, &self.cancel)?;
        let span = tracing::info_span!("train_from_history", records = records.len());
        let _enter = span.enter();

        let control = CombinedControl {
            token: &guard.token,
            caller: control,
        };

        let active = self.models.current();
        let live = self.live_experiences.lock().to_vec();
        let version = active.version + 1;

        let output = TrainingOrchestrator::new(self.config.clone()).run(
            records,
            &active.agent,
            live,
            version,
            &control,
        )?;
        if control.should_cancel() {
            return Err(TrainingRejected::Cancelled);
        }

        let snapshot = ModelSnapshot {
            version,
            trained_at: Some(Utc::now()),
            classifier: output.classifier,
            agent: output.agent,
        };
        persist_snapshot(self.store.as_ref(), &snapshot).map_err(|err| {
            tracing::warn!(error = %err, version, "failed to persist models; keeping previous generation");
            TrainingRejected::Persistence(err)
        })?;
        self.models.swap(Arc::new(snapshot));
        tracing::info!(
            version,
            win_rate = output.report.win_rate,
            sharpe = output.report.sharpe_ratio,
            "promoted new model generation"
        );
        Ok(output.report)
    }

    /// Requests cooperative cancellation of the running pass, if any.
    pub fn cancel_training(&self) {
        self.cancel.lock().cancel();
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::Acquire)
    }

    pub fn get_status(&self) -> ServiceStatus {
        let models = self.models.current();
        let (live_win_rate, live_average_return) = {
            let returns = self.live_returns.lock();
            if returns.is_empty() {
                (0.0, 0.0)
            } else {
                let n = returns.len() as f64;
                let wins = returns.iter().filter(|r| **r > 0.0).count() as f64;
                (wins / n, returns.iter().sum::<f64>() / n)
            }
        };
        ServiceStatus {
            classifier_trained: models.classifier.is_trained(),
            rl_ready: models.agent.is_ready(),
            last_training_time: models.trained_at,
            experience_buffer_size: self.live_experiences.lock().len(),
            live_win_rate,
            live_average_return,
            live_outcomes: self.live_outcomes.load(Ordering::Relaxed),
            model_version: models.version,
            training_in_progress: self.is_training(),
        }
    }
}
