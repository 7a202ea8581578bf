use gemscope_application::benchmarking::synthetic_records;
use gemscope_application::config::Config;
use gemscope_application::live::{LiveRecommendationService, Recommendation, StatusFlag};
use gemscope_application::models::ModelSnapshot;
use gemscope_domain::entities::availability::{Availability, DegradedReason};
use gemscope_domain::entities::feature_vector::Signal;
use gemscope_domain::errors::TrainingRejected;
use gemscope_domain::repositories::model_store::ModelStore;
use gemscope_domain::services::control::TrainingControl;
use gemscope_domain::services::features::FeatureConfig;
use gemscope_domain::services::rl::RlAgent;
use gemscope_domain::value_objects::action::ActionKind;
use gemscope_domain::value_objects::coin_snapshot::CoinSnapshot;
use gemscope_domain::value_objects::historical_record::HistoricalRecord;
use gemscope_domain::value_objects::market_context::MarketContext;
use gemscope_domain::value_objects::trade_outcome::TradeOutcome;
use gemscope_infrastructure::model_store::InMemoryModelStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const VOLUME_SIGNALS: [Signal; 3] = [
    Signal::VolumeSurge,
    Signal::QuietAccumulation,
    Signal::VolumeToMarketCap,
];
const CONTRARIAN_SIGNALS: [Signal; 5] = [
    Signal::FearOpportunity,
    Signal::NeglectOpportunity,
    Signal::AntiHerdMomentum,
    Signal::RetailExhaustion,
    Signal::DivergenceScore,
];

fn fast_config() -> Config {
    let mut config = Config::default();
    config.classifier.epochs = 120;
    config.rl.epochs = 12;
    config
}

fn training_records() -> Vec<HistoricalRecord> {
    synthetic_records(200, fast_config().label.horizon_days, 11)
}

fn fearful_surge() -> (CoinSnapshot, Vec<CoinSnapshot>) {
    let expected = FeatureConfig::default().expected_volume(300);
    let coin = |price: f64, volume: f64, change: f64, day: i64| CoinSnapshot {
        symbol: "GEMX".to_string(),
        price,
        volume_24h: volume,
        market_cap: 80_000_000.0,
        market_cap_rank: Some(300),
        price_change_24h: change,
        timestamp: 1_767_225_600 + day * 86_400,
    };
    let history = (0..20)
        .map(|day| coin(1.0 - day as f64 * 0.005, 0.8 * expected, -0.5, day))
        .collect();
    (coin(0.74, 3.0 * expected, -18.0, 20), history)
}

fn outcome(symbol: &str, pnl: f64) -> TradeOutcome {
    TradeOutcome {
        symbol: symbol.to_string(),
        entry_price: 1.0,
        exit_price: 1.0 + pnl / 100.0,
        entry_timestamp: 0,
        exit_timestamp: 86_400 * 7,
        days_held: 7,
        profit_loss_percent: pnl,
        max_drawdown_percent: 3.0,
    }
}

struct FailingStore;

impl ModelStore for FailingStore {
    fn load(&self, _name: &str) -> Result<Option<Vec<u8>>, String> {
        Ok(None)
    }

    fn save(&self, name: &str, _blob: &[u8]) -> Result<(), String> {
        Err(format!("failed to write {name}: disk full"))
    }
}

/// Parks the training thread at its first cancellation check until released.
#[derive(Default)]
struct Gate {
    started: AtomicBool,
    released: AtomicBool,
}

impl Gate {
    fn wait_started(&self) {
        while !self.started.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
    }
}

impl TrainingControl for Gate {
    fn should_cancel(&self) -> bool {
        self.started.store(true, Ordering::Release);
        while !self.released.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }
}

fn assert_well_formed(rec: &Recommendation, symbol: &str) {
    assert_eq!(rec.symbol, symbol);
    assert!(rec.gem_score.gem_score <= 100);
    assert!((0.0..=1.0).contains(&rec.gem_score.gem_probability));
    assert!((0.0..=1.0).contains(&rec.combined_confidence));
    assert!((0.0..=1.0).contains(&rec.risk_assessment.risk_score));
    assert!((0.0..=1.0).contains(&rec.timing_signals.timing_score));
    assert!(rec.rl_recommendation.action.position_size_percent.is_finite());
    assert!(!rec.rl_recommendation.reasoning.is_empty());
}

fn positive_contribution_from(rec: &Recommendation, family: &[Signal]) -> bool {
    rec.gem_score
        .contributing_signals
        .iter()
        .any(|c| family.contains(&c.signal) && c.contribution > 0.0)
}

fn trained_service(store: Arc<InMemoryModelStore>) -> LiveRecommendationService {
    let service = LiveRecommendationService::new(fast_config(), store);
    service
        .train_from_history(&training_records())
        .expect("training succeeds");
    service
}

#[test]
fn trained_classifier_with_untrained_agent_holds() {
    let store = Arc::new(InMemoryModelStore::new());
    let trained = trained_service(store.clone());
    let mut snapshot = (*trained.active_snapshot()).clone();
    snapshot.agent = RlAgent::new(fast_config().rl);

    let service = LiveRecommendationService::from_snapshot(fast_config(), store, snapshot);
    let (coin, history) = fearful_surge();
    let result = service.analyze(&coin, &history);

    assert_eq!(result.reason(), Some(DegradedReason::NotTrained));
    let rec = result.value().expect("degraded carries a value");
    assert_eq!(rec.rl_recommendation.action.kind, ActionKind::Hold);
    assert_eq!(rec.rl_recommendation.action.position_size_percent, 0.0);
    assert_eq!(rec.rl_recommendation.flag, Some(StatusFlag::NotTrained));
    assert!(rec.has_flag(StatusFlag::NotTrained));
    assert!(!rec.has_flag(StatusFlag::ModelUntrained));
    assert_eq!(rec.gem_status, "ready");
    assert!(rec.features.get(Signal::FearOpportunity) > 0.6);
    assert!(rec.features.get(Signal::VolumeSurge) > 0.6);
    assert!((0.0..=1.0).contains(&rec.combined_confidence));

    assert!(rec.gem_score.gem_score > 60, "gem score {}", rec.gem_score.gem_score);
    assert!(positive_contribution_from(rec, &VOLUME_SIGNALS));
    assert!(positive_contribution_from(rec, &CONTRARIAN_SIGNALS));

    let without_history = service.analyze(&coin, &[]);
    let rec = without_history.value().expect("degraded carries a value");
    assert!(rec.gem_score.gem_score > 60, "gem score {}", rec.gem_score.gem_score);
    assert_eq!(rec.rl_recommendation.action.kind, ActionKind::Hold);
}

#[test]
fn sharp_drop_on_surge_tier_volume_waits_for_the_dip() {
    let service =
        LiveRecommendationService::new(fast_config(), Arc::new(InMemoryModelStore::new()));
    let (coin, history) = fearful_surge();
    let rec = service.analyze(&coin, &history);
    let timing = rec.value().expect("value").timing_signals;
    assert!(timing.wait_for_dip);
    assert!(!timing.immediate_entry, "exactly 3x expected volume is not a surge");
    assert!(!timing.strong_momentum);
    assert!((timing.timing_score - 0.6).abs() < 1e-12);

    let mut surging = coin.clone();
    surging.volume_24h *= 2.0;
    let rec = service.analyze_with_context(
        &surging,
        &history,
        &MarketContext {
            sentiment: Some(-0.8),
            ..MarketContext::default()
        },
    );
    let timing = rec.value().expect("value").timing_signals;
    assert!(timing.immediate_entry && timing.strong_momentum && timing.wait_for_dip);
    assert!((timing.timing_score - 0.7).abs() < 1e-12);
}

#[test]
fn fully_untrained_service_answers_a_flagged_coin_flip() {
    let service =
        LiveRecommendationService::new(fast_config(), Arc::new(InMemoryModelStore::new()));
    let (coin, history) = fearful_surge();
    let result = service.analyze(&coin, &history);

    let rec = result.value().expect("value");
    assert_eq!(rec.gem_score.gem_probability, 0.5);
    assert_eq!(rec.gem_score.gem_score, 50);
    assert_eq!(rec.gem_status, "model_untrained");
    assert!(rec.has_flag(StatusFlag::ModelUntrained));
    assert!(rec.has_flag(StatusFlag::NotTrained));
    assert_eq!(rec.rl_recommendation.action.kind, ActionKind::Hold);
    assert_eq!(rec.model_version, 0);
}

#[test]
fn snapshot_without_symbol_or_price_is_unavailable() {
    let service =
        LiveRecommendationService::new(fast_config(), Arc::new(InMemoryModelStore::new()));
    let (mut coin, _) = fearful_surge();
    coin.symbol = "  ".to_string();
    coin.price = f64::NAN;
    assert_eq!(
        service.analyze(&coin, &[]),
        Availability::Unavailable(DegradedReason::InvalidInput)
    );
}

#[test]
fn analyze_is_idempotent() {
    let service = trained_service(Arc::new(InMemoryModelStore::new()));
    let (coin, history) = fearful_surge();
    let first = service.analyze(&coin, &history);
    let second = service.analyze(&coin, &history);
    assert_eq!(first, second);
}

#[test]
fn empty_training_is_rejected_and_changes_nothing() {
    let service =
        LiveRecommendationService::new(fast_config(), Arc::new(InMemoryModelStore::new()));
    let err = service.train_from_history(&[]).expect_err("empty input");
    assert_eq!(err.code(), "insufficient_data");

    let status = service.get_status();
    assert_eq!(status.last_training_time, None);
    assert_eq!(status.model_version, 0);
    assert!(!status.classifier_trained);
    assert!(!status.training_in_progress);
}

#[test]
fn training_promotes_and_persists_a_new_generation() {
    let store = Arc::new(InMemoryModelStore::new());
    let service = LiveRecommendationService::new(fast_config(), store.clone());
    let report = service
        .train_from_history(&training_records())
        .expect("training succeeds");

    assert_eq!(report.model_version, 1);
    assert_eq!(report.valid_records, 200);
    assert!((0.0..=1.0).contains(&report.win_rate));
    assert!(report.sharpe_ratio.is_finite());
    assert!(report.classifier_metrics.accuracy > 0.7);

    let status = service.get_status();
    assert!(status.classifier_trained);
    assert!(status.rl_ready);
    assert_eq!(status.model_version, 1);
    assert!(status.last_training_time.is_some());

    assert_eq!(
        store.names(),
        vec![
            "active".to_string(),
            "models/v1/gem_classifier".to_string(),
            "models/v1/rl_agent".to_string(),
        ]
    );

    let reloaded = LiveRecommendationService::load(fast_config(), store);
    let status = reloaded.get_status();
    assert_eq!(status.model_version, 1);
    assert!(status.classifier_trained);
    assert!(status.rl_ready);
    assert_eq!(status.last_training_time, service.get_status().last_training_time);

    let (coin, history) = fearful_surge();
    let rec = reloaded.analyze(&coin, &history);
    assert_eq!(rec.value().map(|r| r.model_version), Some(1));
}

#[test]
fn record_outcome_feeds_the_buffer_without_retraining() {
    let service = trained_service(Arc::new(InMemoryModelStore::new()));
    let before = service.active_snapshot();

    let (coin, history) = fearful_surge();
    let entry = service.analyze(&coin, &history);
    assert!(entry.is_ready());
    assert_eq!(entry.value().map(|r| r.model_version), Some(1));
    let ack = service.record_outcome(&outcome("gemx", 25.0)).expect("ack");
    assert!(ack.matched_entry_state);
    assert_eq!(ack.symbol, "GEMX");
    assert!(ack.reward > 0.0);

    let ack = service.record_outcome(&outcome("OTHER", -10.0)).expect("ack");
    assert!(!ack.matched_entry_state);
    assert_eq!(ack.experience_buffer_size, 2);

    let (mut other, _) = fearful_surge();
    other.symbol = "ZZZ".to_string();
    let rec = service.analyze(&other, &[]);
    assert_well_formed(rec.value().expect("value"), "ZZZ");
    assert!(Arc::ptr_eq(&before, &service.active_snapshot()));

    let status = service.get_status();
    assert_eq!(status.live_outcomes, 2);
    assert_eq!(status.live_win_rate, 0.5);
    assert!((status.live_average_return - 7.5).abs() < 1e-12);
    assert_eq!(status.experience_buffer_size, 2);
}

#[test]
fn record_outcome_rejects_non_finite_values() {
    let service =
        LiveRecommendationService::new(fast_config(), Arc::new(InMemoryModelStore::new()));
    let mut bad = outcome("ABC", 5.0);
    bad.profit_loss_percent = f64::NAN;
    assert!(service.record_outcome(&bad).is_err());
    assert_eq!(service.get_status().experience_buffer_size, 0);
    assert_eq!(service.get_status().live_outcomes, 0);
}

#[test]
fn concurrent_training_is_rejected() {
    let service = Arc::new(LiveRecommendationService::new(
        fast_config(),
        Arc::new(InMemoryModelStore::new()),
    ));
    let gate = Arc::new(Gate::default());
    let records = training_records();

    let worker = {
        let service = service.clone();
        let gate = gate.clone();
        let records = records.clone();
        std::thread::spawn(move || service.train_from_history_with_control(&records, gate.as_ref()))
    };
    gate.wait_started();
    assert!(service.is_training());
    assert!(service.get_status().training_in_progress);
    assert_eq!(
        service.train_from_history(&records).err(),
        Some(TrainingRejected::AlreadyTraining)
    );
    gate.release();

    let report = worker.join().expect("join").expect("first training succeeds");
    assert_eq!(report.model_version, 1);
    assert!(!service.is_training());
}

#[test]
fn analyze_and_record_outcome_stay_live_during_training() {
    let service = Arc::new(trained_service(Arc::new(InMemoryModelStore::new())));
    let gate = Arc::new(Gate::default());
    let (coin, history) = fearful_surge();

    let worker = {
        let service = service.clone();
        let gate = gate.clone();
        std::thread::spawn(move || {
            service.train_from_history_with_control(&training_records(), gate.as_ref())
        })
    };
    gate.wait_started();
    assert!(service.is_training());

    let started = Instant::now();
    let side = {
        let service = service.clone();
        let (coin, history) = (coin.clone(), history.clone());
        std::thread::spawn(move || {
            let rec = service.analyze(&coin, &history);
            let ack = service.record_outcome(&outcome("GEMX", 20.0));
            (rec, ack)
        })
    };
    let (rec, ack) = side.join().expect("join");
    assert!(started.elapsed() < Duration::from_secs(2));
    let rec = rec.value().expect("value");
    assert_well_formed(rec, "GEMX");
    assert_eq!(rec.model_version, 1);
    let ack = ack.expect("ack");
    assert!(ack.matched_entry_state);
    assert_eq!(ack.experience_buffer_size, 1);

    let callers = 8;
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..callers)
            .map(|i| {
                let service = service.as_ref();
                let (mut coin, history) = (coin.clone(), history.clone());
                coin.symbol = format!("GEM{i}");
                scope.spawn(move || (coin.symbol.clone(), service.analyze(&coin, &history)))
            })
            .collect();
        for handle in handles {
            let (symbol, result) = handle.join().expect("join");
            assert!(result.is_ready());
            let rec = result.value().expect("value");
            assert_well_formed(rec, &symbol);
            assert_eq!(rec.model_version, 1);
        }
    });
    assert!(service.is_training());

    gate.release();
    let report = worker.join().expect("join").expect("second training succeeds");
    assert_eq!(report.model_version, 2);

    let status = service.get_status();
    assert_eq!(status.model_version, 2);
    assert_eq!(status.experience_buffer_size, 1);
    assert_eq!(status.live_outcomes, 1);
    assert!(!status.training_in_progress);
    let rec = service.analyze(&coin, &history);
    assert_eq!(rec.value().map(|r| r.model_version), Some(2));
}

#[test]
fn cancel_seen_as_soon_as_training_is_flagged() {
    let service = Arc::new(LiveRecommendationService::new(
        fast_config(),
        Arc::new(InMemoryModelStore::new()),
    ));
    let gate = Arc::new(Gate::default());

    let worker = {
        let service = service.clone();
        let gate = gate.clone();
        std::thread::spawn(move || {
            service.train_from_history_with_control(&training_records(), gate.as_ref())
        })
    };
    while !service.is_training() {
        std::thread::yield_now();
    }
    service.cancel_training();
    gate.release();

    assert_eq!(
        worker.join().expect("join").err(),
        Some(TrainingRejected::Cancelled)
    );
    assert_eq!(service.get_status().model_version, 0);
}

#[test]
fn cancel_training_keeps_the_previous_generation() {
    let service = Arc::new(LiveRecommendationService::new(
        fast_config(),
        Arc::new(InMemoryModelStore::new()),
    ));
    let gate = Arc::new(Gate::default());

    let worker = {
        let service = service.clone();
        let gate = gate.clone();
        std::thread::spawn(move || {
            service.train_from_history_with_control(&training_records(), gate.as_ref())
        })
    };
    gate.wait_started();
    service.cancel_training();
    gate.release();

    assert_eq!(
        worker.join().expect("join").err(),
        Some(TrainingRejected::Cancelled)
    );
    let status = service.get_status();
    assert_eq!(status.model_version, 0);
    assert!(!status.classifier_trained);
    assert!(!status.training_in_progress);
}

#[test]
fn corrupt_manifest_starts_untrained() {
    let store = Arc::new(InMemoryModelStore::new());
    store.insert("active", b"not json".to_vec());
    let service = LiveRecommendationService::load(fast_config(), store);
    let status = service.get_status();
    assert_eq!(status.model_version, 0);
    assert!(!status.classifier_trained);
    assert!(!status.rl_ready);
}

#[test]
fn corrupt_blob_starts_untrained() {
    let store = Arc::new(InMemoryModelStore::new());
    let trained = trained_service(store.clone());
    assert_eq!(trained.get_status().model_version, 1);
    let mut blob = store.get("models/v1/rl_agent").expect("agent blob");
    blob.truncate(blob.len() / 2);
    store.insert("models/v1/rl_agent", blob);

    let service = LiveRecommendationService::load(fast_config(), store);
    let status = service.get_status();
    assert_eq!(status.model_version, 0);
    assert!(!status.rl_ready);
}

#[test]
fn persistence_failure_keeps_the_previous_generation() {
    let service = LiveRecommendationService::new(fast_config(), Arc::new(FailingStore));
    let err = service
        .train_from_history(&training_records())
        .expect_err("store refuses writes");
    assert!(matches!(err, TrainingRejected::Persistence(_)));
    assert_eq!(err.code(), "persistence");

    let status = service.get_status();
    assert_eq!(status.model_version, 0);
    assert!(!status.classifier_trained);
    assert_eq!(status.last_training_time, None);
}

#[test]
fn untrained_snapshot_matches_a_fresh_service() {
    let config = fast_config();
    let service = LiveRecommendationService::new(config.clone(), Arc::new(FailingStore));
    assert_eq!(
        *service.active_snapshot(),
        ModelSnapshot::untrained(&config.classifier, &config.rl)
    );
}
