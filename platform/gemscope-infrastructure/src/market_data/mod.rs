use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use gemscope_domain::repositories::market_data::{MarketData, MarketDataSource};
use gemscope_domain::value_objects::coin_snapshot::CoinSnapshot;
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const DEFAULT_MAX_HISTORY: usize = 30;

#[derive(Debug, Deserialize)]
pub struct SnapshotRecord {
    pub timestamp_utc: String,
    pub price: f64,
    pub volume_24h: f64,
    pub market_cap: f64,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    pub price_change_24h: f64,
}

/// Reads one CSV file per asset, `<dir>/<SYMBOL>.csv`. The newest row is the
/// snapshot; up to `max_history` rows before it become the history.
#[derive(Debug, Clone)]
pub struct CsvMarketDataSource {
    dir: PathBuf,
    max_history: usize,
}

impl CsvMarketDataSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    fn path_for(&self, symbol: &str) -> Result<PathBuf, String> {
        let symbol = symbol.trim();
        if symbol.is_empty()
            || !symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        {
            return Err(format!("invalid symbol `{symbol}`"));
        }
        Ok(self.dir.join(format!("{}.csv", symbol.to_ascii_uppercase())))
    }

    fn load(&self, symbol: &str) -> Result<MarketData, String> {
        let path = self.path_for(symbol)?;
        let rows = load_snapshots(&path, symbol)?;
        into_market_data(rows, self.max_history)
            .ok_or_else(|| format!("no rows for {symbol} in {}", path.display()))
    }
}

impl MarketDataSource for CsvMarketDataSource {
    fn get(&self, symbol: &str) -> Result<MarketData, String> {
        let start = Instant::now();
        let result = self.load(symbol);
        let result_label = if result.is_ok() { "ok" } else { "err" };
        metrics::counter!(
            "gemscope.infra.market_data.calls_total",
            "source" => "csv",
            "result" => result_label
        )
        .increment(1);
        metrics::histogram!(
            "gemscope.infra.market_data.duration_ms",
            "source" => "csv",
            "result" => result_label
        )
        .record(start.elapsed().as_millis() as f64);
        if let Err(err) = &result {
            tracing::debug!(symbol, error = %err, "market data lookup failed");
        }
        result
    }
}

pub fn load_snapshots(path: &Path, symbol: &str) -> Result<Vec<CoinSnapshot>, String> {
    let file = std::fs::File::open(path)
        .map_err(|err| format!("failed to open market CSV {}: {}", path.display(), err))?;
    read_snapshots(file, symbol)
}

/// Parses rows and returns them sorted by timestamp. A repeated timestamp
/// keeps the row that appears last in the file.
pub fn read_snapshots<R: Read>(reader: R, symbol: &str) -> Result<Vec<CoinSnapshot>, String> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut rows: Vec<CoinSnapshot> = Vec::new();
    for result in reader.deserialize::<SnapshotRecord>() {
        let record = result.map_err(|err| format!("failed to parse CSV row: {}", err))?;
        rows.push(CoinSnapshot {
            symbol: symbol.trim().to_ascii_uppercase(),
            price: record.price,
            volume_24h: record.volume_24h,
            market_cap: record.market_cap,
            market_cap_rank: record.market_cap_rank,
            price_change_24h: record.price_change_24h,
            timestamp: parse_timestamp(&record.timestamp_utc)?,
        });
    }

    // Stable sort, so the later duplicate stays last and wins the dedup below.
    rows.sort_by_key(|row| row.timestamp);
    let mut deduped: Vec<CoinSnapshot> = Vec::with_capacity(rows.len());
    for row in rows {
        match deduped.last_mut() {
            Some(last) if last.timestamp == row.timestamp => *last = row,
            _ => deduped.push(row),
        }
    }
    Ok(deduped)
}

fn into_market_data(mut rows: Vec<CoinSnapshot>, max_history: usize) -> Option<MarketData> {
    let snapshot = rows.pop()?;
    let skip = rows.len().saturating_sub(max_history);
    let history = rows.split_off(skip);
    Some(MarketData { snapshot, history })
}

fn parse_timestamp(value: &str) -> Result<i64, String> {
    let value = value.trim();
    if let Ok(epoch) = value.parse::<i64>() {
        return Ok(epoch);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        let dt: DateTime<Utc> = Utc.from_utc_datetime(&naive);
        return Ok(dt.timestamp());
    }
    Err(format!("unsupported timestamp format: {}", value))
}
