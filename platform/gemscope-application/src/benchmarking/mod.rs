//! Synthetic market generator and benchmark use case.

use crate::config::Config;
use crate::live::LiveRecommendationService;
use crate::training::TrainingReport;
use gemscope_domain::repositories::model_store::ModelStore;
use gemscope_domain::services::features::FeatureConfig;
use gemscope_domain::value_objects::coin_snapshot::CoinSnapshot;
use gemscope_domain::value_objects::historical_record::HistoricalRecord;
use gemscope_domain::value_objects::market_context::MarketContext;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Instant;

const BASE_TIMESTAMP: i64 = 1_700_000_000;
const SECONDS_PER_DAY: i64 = 86_400;
const HISTORY_DAYS: usize = 20;
const EXTRA_FORWARD_DAYS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchMode {
    /// Training pass only.
    Train,
    /// Training pass, then concurrent `analyze` throughput.
    Analyze,
}

impl BenchMode {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_lowercase().as_str() {
            "train" => Ok(BenchMode::Train),
            "analyze" => Ok(BenchMode::Analyze),
            other => Err(format!(
                "unsupported bench mode: {other} (expected train|analyze)"
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BenchMode::Train => "train",
            BenchMode::Analyze => "analyze",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BenchOptions {
    pub records: usize,
    pub analyze_calls: usize,
    pub threads: usize,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct BenchResult {
    pub mode: BenchMode,
    pub records: usize,
    pub train_ms: u128,
    pub analyze_calls: usize,
    pub analyze_ms: u128,
    pub analyze_per_sec: f64,
    pub report: TrainingReport,
}

/// Deterministic records mixing two regimes: capitulation with a volume
/// surge followed by a steady recovery, and directionless drift. Roughly
/// 45% follow the first pattern, which the default label rule marks as gems.
pub fn synthetic_records(count: usize, horizon_days: usize, seed: u64) -> Vec<HistoricalRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let tiers = FeatureConfig::default();
    let forward_days = horizon_days.max(1) + EXTRA_FORWARD_DAYS;

    (0..count)
        .map(|idx| {
            let gem_pattern = rng.gen_bool(0.45);
            let symbol = format!("SYN{:03}", idx % 97);
            let timestamp = BASE_TIMESTAMP + idx as i64 * SECONDS_PER_DAY;
            let rank: u32 = if gem_pattern {
                rng.gen_range(150..480)
            } else {
                rng.gen_range(20..1_500)
            };
            let expected_volume = tiers.expected_volume(rank);

            let start_price: f64 = rng.gen_range(0.2..20.0);
            let daily_drift = if gem_pattern {
                -rng.gen_range(0.005..0.02)
            } else {
                rng.gen_range(-0.005..0.005)
            };
            let mut price = start_price;
            let mut history = Vec::with_capacity(HISTORY_DAYS);
            for day in 0..HISTORY_DAYS {
                price *= 1.0 + daily_drift + rng.gen_range(-0.01..0.01);
                history.push(CoinSnapshot {
                    symbol: symbol.clone(),
                    price,
                    volume_24h: expected_volume * rng.gen_range(0.5..1.0),
                    market_cap: 0.0,
                    market_cap_rank: Some(rank),
                    price_change_24h: 0.0,
                    timestamp: timestamp - (HISTORY_DAYS - day) as i64 * SECONDS_PER_DAY,
                });
            }

            let change_24h = if gem_pattern {
                -rng.gen_range(16.0..30.0)
            } else {
                rng.gen_range(-6.0..6.0)
            };
            let entry_price = price * (1.0 + change_24h / 100.0);
            let volume_multiple = if gem_pattern {
                rng.gen_range(2.5..4.0)
            } else {
                rng.gen_range(0.4..1.3)
            };
            let market_cap = if gem_pattern {
                rng.gen_range(20_000_000.0..400_000_000.0)
            } else {
                rng.gen_range(5_000_000.0..5_000_000_000.0)
            };
            for point in history.iter_mut() {
                point.market_cap = market_cap * point.price / entry_price;
            }

            let total_return = if gem_pattern {
                rng.gen_range(0.3..0.7)
            } else {
                rng.gen_range(-0.3..0.1)
            };
            let noise = if gem_pattern { 0.01 } else { 0.03 };
            let growth = (1.0f64 + total_return).powf(1.0 / horizon_days.max(1) as f64);
            let forward_prices = (1..=forward_days)
                .map(|day| {
                    entry_price * growth.powi(day as i32) * (1.0 + rng.gen_range(-noise..noise))
                })
                .collect();

            let context = rng.gen_bool(0.5).then(|| MarketContext {
                market_regime: Some(rng.gen_range(-0.3..0.3)),
                macro_headwind: Some(rng.gen_range(0.0..0.5)),
                ..MarketContext::neutral()
            });

            HistoricalRecord {
                snapshot: CoinSnapshot {
                    symbol,
                    price: entry_price,
                    volume_24h: expected_volume * volume_multiple,
                    market_cap,
                    market_cap_rank: Some(rank),
                    price_change_24h: change_24h,
                    timestamp,
                },
                history,
                forward_prices,
                context,
            }
        })
        .collect()
}

pub fn run_bench(
    mode: BenchMode,
    config: Config,
    store: Arc<dyn ModelStore>,
    options: &BenchOptions,
) -> Result<BenchResult, String> {
    let records = synthetic_records(options.records, config.label.horizon_days, options.seed);
    let service = LiveRecommendationService::new(config, store);

    let start = Instant::now();
    let report = service
        .train_from_history(&records)
        .map_err(|err| format!("training failed: {err}"))?;
    let train_ms = start.elapsed().as_millis();
    tracing::info!(records = records.len(), train_ms, "bench training finished");

    if mode == BenchMode::Train || options.analyze_calls == 0 {
        return Ok(BenchResult {
            mode,
            records: records.len(),
            train_ms,
            analyze_calls: 0,
            analyze_ms: 0,
            analyze_per_sec: 0.0,
            report,
        });
    }

    let threads = options.threads.max(1);
    let per_thread = options.analyze_calls.div_ceil(threads);
    let start = Instant::now();
    let completed: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|worker| {
                let service = &service;
                let records = &records;
                scope.spawn(move || {
                    let mut done = 0usize;
                    for call in 0..per_thread {
                        let record = &records[(worker * per_thread + call) % records.len().max(1)];
                        let _ = service.analyze(&record.snapshot, &record.history);
                        done += 1;
                    }
                    done
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(0))
            .sum()
    });
    let analyze_ms = start.elapsed().as_millis();
    let secs = (analyze_ms as f64 / 1_000.0).max(1e-9);

    Ok(BenchResult {
        mode,
        records: records.len(),
        train_ms,
        analyze_calls: completed,
        analyze_ms,
        analyze_per_sec: completed as f64 / secs,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::{synthetic_records, BenchMode};
    use gemscope_domain::services::classifier::LabelRule;

    #[test]
    fn generator_is_deterministic_and_valid() {
        let a = synthetic_records(40, 30, 9);
        let b = synthetic_records(40, 30, 9);
        assert_eq!(a, b);
        assert!(a.iter().all(|r| r.validate(30).is_ok()));
        assert!(a.windows(2).all(|w| w[0].snapshot.timestamp < w[1].snapshot.timestamp));
        assert!(a
            .iter()
            .all(|r| r.history.iter().all(|h| h.timestamp < r.snapshot.timestamp)));
    }

    #[test]
    fn generator_produces_both_labels() {
        let rule = LabelRule::default();
        let labels: Vec<bool> = synthetic_records(200, rule.horizon_days, 1)
            .iter()
            .filter_map(|r| rule.label(r.snapshot.price, &r.forward_prices))
            .collect();
        assert_eq!(labels.len(), 200);
        let gems = labels.iter().filter(|g| **g).count();
        assert!(gems > 40 && gems < 160, "gems = {gems}");
    }

    #[test]
    fn bench_mode_parsing() {
        assert_eq!(BenchMode::parse(" Analyze ").expect("mode"), BenchMode::Analyze);
        assert!(BenchMode::parse("engine").is_err());
    }
}
