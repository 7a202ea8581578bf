use clap::Parser;
use gemscope_application::benchmarking::{run_bench, BenchMode, BenchOptions};
use gemscope_application::config::{load_config, Config};
use gemscope_application::live::LiveRecommendationService;
use gemscope_domain::repositories::market_data::MarketDataSource;
use gemscope_domain::repositories::model_store::ModelStore;
use gemscope_infrastructure::market_data::CsvMarketDataSource;
use gemscope_infrastructure::model_store::{FilesystemModelStore, InMemoryModelStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "gemscope-bench")]
#[command(about = "Synthetic training and inference benchmark for GemScope (dev)")]
struct Args {
    /// Benchmark mode: train (training pass only) or analyze (training, then concurrent analyze).
    #[arg(long, default_value = "analyze")]
    mode: String,

    /// Number of synthetic historical records to train on.
    #[arg(long, default_value_t = 2_000)]
    records: usize,

    #[arg(long, default_value_t = 20_000)]
    analyze_calls: usize,

    #[arg(long, default_value_t = 4)]
    threads: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// TOML config; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Persist models under this directory instead of in memory.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Directory of `<SYMBOL>.csv` market files; with `--symbol`, analyze that
    /// asset against the freshly trained models.
    #[arg(long)]
    market_dir: Option<PathBuf>,

    #[arg(long)]
    symbol: Option<String>,

    /// Print a single JSON line instead of human output.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Prometheus metrics listen addr (e.g. 127.0.0.1:9898). Optional.
    #[arg(long)]
    metrics_addr: Option<String>,
}

fn main() {
    let args = Args::parse();

    if let Err(err) = init_tracing() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    if let Err(err) = init_metrics(args.metrics_addr.as_deref()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }

    if let Err(err) = run(args) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() -> Result<(), String> {
    let filter = std::env::var("GEMSCOPE_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|err| format!("invalid log filter: {err}"))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}

#[cfg(feature = "prometheus")]
fn init_metrics(metrics_addr: Option<&str>) -> Result<Option<SocketAddr>, String> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let Some(raw) = metrics_addr else {
        return Ok(None);
    };
    let addr: SocketAddr = raw
        .parse()
        .map_err(|err| format!("invalid --metrics-addr (expected host:port): {err}"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|err| format!("failed to install prometheus exporter: {err}"))?;

    tracing::info!(metrics_addr = %addr, "prometheus metrics exporter enabled");
    Ok(Some(addr))
}

#[cfg(not(feature = "prometheus"))]
fn init_metrics(metrics_addr: Option<&str>) -> Result<Option<SocketAddr>, String> {
    if metrics_addr.is_some() {
        return Err("metrics exporter requires gemscope-bench feature `prometheus`".to_string());
    }
    Ok(None)
}

fn run(args: Args) -> Result<(), String> {
    let mode = BenchMode::parse(&args.mode)?;
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let store: Arc<dyn ModelStore> = match &args.model_dir {
        Some(dir) => Arc::new(FilesystemModelStore::new(dir)),
        None => Arc::new(InMemoryModelStore::new()),
    };
    let options = BenchOptions {
        records: args.records,
        analyze_calls: args.analyze_calls,
        threads: args.threads,
        seed: args.seed,
    };

    let bench = run_bench(mode, config.clone(), store.clone(), &options)?;
    let mode_label = bench.mode.as_str();

    metrics::histogram!("gemscope.bench.train_ms", "mode" => mode_label)
        .record(bench.train_ms as f64);
    metrics::histogram!("gemscope.bench.analyze_ms", "mode" => mode_label)
        .record(bench.analyze_ms as f64);
    metrics::gauge!("gemscope.bench.analyze_per_sec", "mode" => mode_label)
        .set(bench.analyze_per_sec);
    metrics::gauge!("gemscope.bench.records", "mode" => mode_label).set(bench.records as f64);

    let analysis = match (&args.market_dir, &args.symbol) {
        (Some(dir), Some(symbol)) => {
            let market = CsvMarketDataSource::new(dir)
                .with_max_history(config.features.max_history)
                .get(symbol)?;
            let service = LiveRecommendationService::load(config, store);
            let result = service.analyze(&market.snapshot, &market.history);
            Some(
                serde_json::to_value(&result)
                    .map_err(|err| format!("failed to serialize recommendation: {err}"))?,
            )
        }
        (None, None) => None,
        _ => return Err("--market-dir and --symbol must be given together".to_string()),
    };

    let report = &bench.report;
    if args.json {
        let line = serde_json::json!({
            "mode": mode_label,
            "records": bench.records,
            "valid_records": report.valid_records,
            "skipped_records": report.skipped_records,
            "train_ms": bench.train_ms,
            "analyze_calls": bench.analyze_calls,
            "analyze_ms": bench.analyze_ms,
            "analyze_per_sec": bench.analyze_per_sec,
            "accuracy": report.classifier_metrics.accuracy,
            "auc": report.classifier_metrics.auc,
            "win_rate": report.win_rate,
            "sharpe_ratio": report.sharpe_ratio,
            "model_version": report.model_version,
            "analysis": analysis,
        });
        println!("{}", line);
    } else {
        println!(
            "bench: mode={} records={} train_ms={} analyze_calls={} analyze_ms={} analyze_per_sec={:.2}",
            mode_label,
            bench.records,
            bench.train_ms,
            bench.analyze_calls,
            bench.analyze_ms,
            bench.analyze_per_sec
        );
        println!(
            "bench: accuracy={:.4} auc={:.4} win_rate={:.4} sharpe={:.4} version={}",
            report.classifier_metrics.accuracy,
            report.classifier_metrics.auc,
            report.win_rate,
            report.sharpe_ratio,
            report.model_version
        );
        let top: Vec<String> = report
            .top_features
            .iter()
            .map(|f| format!("{}={:.3}", f.signal.name(), f.importance))
            .collect();
        println!("bench: top_features {}", top.join(" "));
        if let Some(analysis) = analysis {
            println!("analysis: {}", analysis);
        }
    }

    Ok(())
}
