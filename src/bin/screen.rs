//! Screener driver binary: wires `Config` → `BarStore` → `DataHandler` →
//! [`Screener`] (C10) down to a single persisted diagnostic result, the
//! same wiring as `backtest` minus the orchestrator's day-by-day loop —
//! the screener short-circuits after the Rebalancer (§4.10).

use anyhow::Context;
use clap::Parser;
use quantrade::application::data_handler::DataHandler;
use quantrade::application::screener::Screener;
use quantrade::config::Config;
use quantrade::domain::market::{BarSeries, Market};
use quantrade::domain::regime::rebalancer::WeightMethod;
use quantrade::infrastructure::bar_source::BarSource;
use quantrade::infrastructure::bar_store::BarStore;
use quantrade::infrastructure::concurrency::{CancellationToken, DEFAULT_FETCH_WORKERS, run_bounded};
use quantrade::infrastructure::kiwoom::KiwoomBarSource;
use std::collections::HashMap;
use std::sync::Arc;

const SAMPLE_DOMESTIC_SYMBOLS: &[&str] = &["005930", "000660", "035420", "035720", "051910"];
const DOMESTIC_BENCHMARK_SYMBOL: &str = "069500";

#[derive(Parser)]
#[command(author, version, about = "Run the point-in-time screener", long_about = None)]
struct Cli {
    /// Comma-separated domestic symbol universe override.
    #[arg(long)]
    symbols: Option<String>,

    /// Use the deterministic in-memory fixture source instead of live
    /// adapters (useful when no brokerage credentials are configured).
    #[arg(long)]
    fixture: bool,
}

fn init_tracing() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

async fn fetch_all(store: Arc<BarStore>, source: Arc<dyn BarSource>, symbols: Vec<String>, from: chrono::NaiveDate, to: chrono::NaiveDate) -> HashMap<String, BarSeries> {
    let cancel = CancellationToken::new();
    let results = run_bounded(symbols, cancel, DEFAULT_FETCH_WORKERS, move |symbol: String| {
        let store = store.clone();
        let source = source.clone();
        async move {
            let series = match store.ensure_range(&symbol, source.as_ref(), from, to).await {
                Ok(series) => Some(series),
                Err(err) => {
                    tracing::warn!(symbol = %symbol, error = %err, "skipping symbol after fetch failure");
                    None
                }
            };
            (symbol, series)
        }
    })
    .await;

    results.into_iter().flatten().filter_map(|(symbol, series)| series.map(|s| (symbol, s))).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;
    let run_span = tracing::info_span!("screener_run", run_id = %uuid::Uuid::new_v4());
    let _guard = run_span.enter();

    let store = Arc::new(BarStore::new(&config.cache_root));

    let domestic_source: Arc<dyn BarSource> = if cli.fixture {
        Arc::new(quantrade::infrastructure::bar_source::FixtureBarSource::new("fixture"))
    } else {
        Arc::new(KiwoomBarSource::new(config.kiwoom.domain.clone(), config.kiwoom.access_token.clone()))
    };

    let symbols: Vec<String> = cli
        .symbols
        .map(|s| s.split(',').map(|t| t.trim().to_string()).collect())
        .unwrap_or_else(|| SAMPLE_DOMESTIC_SYMBOLS.iter().map(|s| s.to_string()).collect());

    let mut all_symbols = symbols.clone();
    all_symbols.push(DOMESTIC_BENCHMARK_SYMBOL.to_string());

    let fetched = fetch_all(store, domestic_source, all_symbols, config.start_date, config.end_date).await;

    let mut series_by_symbol: HashMap<String, (BarSeries, Market)> = HashMap::new();
    for symbol in &symbols {
        if let Some(series) = fetched.get(symbol) {
            series_by_symbol.insert(symbol.clone(), (series.clone(), Market::infer_from_symbol(symbol)));
        }
    }
    if let Some(bench) = fetched.get(DOMESTIC_BENCHMARK_SYMBOL) {
        series_by_symbol.insert(DOMESTIC_BENCHMARK_SYMBOL.to_string(), (bench.clone(), Market::Benchmark));
    }

    let data = DataHandler::rebuild(&series_by_symbol, DOMESTIC_BENCHMARK_SYMBOL).context("rebuilding panel")?;

    let weight_method: WeightMethod = config.strategy.weight_method;
    let result = Screener::run_and_persist(&data, config.strategy.top_n, weight_method, config.risk_free_rate, &config.cache_root, "momentum")
        .await
        .context("running screener")?;

    tracing::info!(
        reference_day = %result.reference_day,
        selected = result.selected.len(),
        regime = %result.regime,
        "screener complete"
    );
    Ok(())
}
