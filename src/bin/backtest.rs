//! Backtest driver binary: wires `Config` → `BarStore` → `DataHandler` →
//! `BacktestOrchestrator` → `PerformanceAnalyzer` → a persisted run
//! artefact, via a `clap`-derived CLI over `Config::from_env()`.

use anyhow::Context;
use clap::Parser;
use quantrade::application::data_handler::DataHandler;
use quantrade::application::orchestrator::{BacktestConfig, BacktestOrchestrator, RebalanceStrategy};
use quantrade::application::pullback_orchestrator::{PullbackConfig, PullbackOrchestrator};
use quantrade::application::swing_orchestrator::{SwingConfig, SwingOrchestrator};
use quantrade::config::{Config, StrategyKind};
use quantrade::domain::market::{BarSeries, Market};
use quantrade::infrastructure::bar_source::BarSource;
use quantrade::infrastructure::bar_store::BarStore;
use quantrade::infrastructure::concurrency::{CancellationToken, DEFAULT_FETCH_WORKERS, run_bounded};
use quantrade::infrastructure::daishin_bridge::DaishinBridgeBarSource;
use quantrade::infrastructure::kiwoom::KiwoomBarSource;
use quantrade::infrastructure::persistence::{GlobalAllocationEntry, RunArtefactBuilder, momentum_result_path, save_artefact};
use quantrade::infrastructure::yahoo_global::{DEFAULT_TICKERS, YahooGlobalBarSource};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// The domestic instrument universe this demo run screens over. A real
/// deployment resolves this from a listed-instrument report; here it is a
/// small, fixed sample of liquid KOSPI names plus the KODEX 200 ETF used as
/// the domestic benchmark proxy.
const SAMPLE_DOMESTIC_SYMBOLS: &[&str] = &["005930", "000660", "035420", "035720", "051910"];
const DOMESTIC_BENCHMARK_SYMBOL: &str = "069500";

#[derive(Parser)]
#[command(author, version, about = "Run a historical backtest", long_about = None)]
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

/// Fetches every symbol's `BarSeries` through a bounded worker pool (§5),
/// sharing one `BarStore` (and its in-memory cache) across all workers.
/// A symbol whose fetch fails outright is dropped with a warning rather
/// than failing the whole run.
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
    let run_span = tracing::info_span!("backtest_run", run_id = %uuid::Uuid::new_v4());
    let _guard = run_span.enter();

    let store = Arc::new(BarStore::new(&config.cache_root));

    let domestic_source: Arc<dyn BarSource> = if cli.fixture {
        Arc::new(quantrade::infrastructure::bar_source::FixtureBarSource::new("fixture"))
    } else {
        Arc::new(KiwoomBarSource::new(config.kiwoom.domain.clone(), config.kiwoom.access_token.clone()))
    };
    // The Daishin bridge is wired up the same way when a deployment prefers
    // it over the Kiwoom REST adapter; not exercised by this sample run.
    let _daishin_source = DaishinBridgeBarSource::new(config.daishin_bridge.base_url.clone());

    let symbols: Vec<String> = cli
        .symbols
        .map(|s| s.split(',').map(|t| t.trim().to_string()).collect())
        .unwrap_or_else(|| SAMPLE_DOMESTIC_SYMBOLS.iter().map(|s| s.to_string()).collect());

    let mut domestic_symbols = symbols.clone();
    domestic_symbols.push(DOMESTIC_BENCHMARK_SYMBOL.to_string());

    let start = Instant::now();
    let fetched = fetch_all(store.clone(), domestic_source, domestic_symbols, config.start_date, config.end_date).await;

    let mut series_by_symbol: HashMap<String, (BarSeries, Market)> = HashMap::new();
    for symbol in &symbols {
        if let Some(series) = fetched.get(symbol) {
            series_by_symbol.insert(symbol.clone(), (series.clone(), Market::infer_from_symbol(symbol)));
        }
    }
    if let Some(bench) = fetched.get(DOMESTIC_BENCHMARK_SYMBOL) {
        series_by_symbol.insert(DOMESTIC_BENCHMARK_SYMBOL.to_string(), (bench.clone(), Market::Benchmark));
    }

    if matches!(config.strategy.kind, StrategyKind::Pullback | StrategyKind::Swing) {
        return run_daily_loop_strategy(config, series_by_symbol, start).await;
    }

    let (strategy, benchmark_weights, benchmark_symbol) = match config.strategy.kind {
        StrategyKind::DomesticMomentum => {
            let mut weights = HashMap::new();
            weights.insert(DOMESTIC_BENCHMARK_SYMBOL.to_string(), rust_decimal::Decimal::ONE);
            (
                RebalanceStrategy::DomesticMomentum {
                    top_n: config.strategy.top_n,
                    weight_method: config.strategy.weight_method,
                },
                weights,
                DOMESTIC_BENCHMARK_SYMBOL.to_string(),
            )
        }
        StrategyKind::GlobalPreset => {
            // Global mode scores the fixed ETF universe (§4.4) plus the
            // 60/40 SPY/AGG benchmark pair, all fetched through Yahoo.
            let global_source: Arc<dyn BarSource> = if cli.fixture {
                Arc::new(quantrade::infrastructure::bar_source::FixtureBarSource::new("fixture_global"))
            } else {
                Arc::new(YahooGlobalBarSource::new())
            };
            let mut global_symbols: Vec<String> = DEFAULT_TICKERS.iter().map(|s| s.to_string()).collect();
            global_symbols.push("SPY".to_string());
            global_symbols.sort();
            global_symbols.dedup();

            let global_fetched = fetch_all(store, global_source, global_symbols, config.start_date, config.end_date).await;
            for (symbol, series) in &global_fetched {
                series_by_symbol.insert(symbol.clone(), (series.clone(), Market::GlobalEtf));
            }
            // SPY doubles as the benchmark row; the global ETF panel has no
            // single-index benchmark series, so reuse it as `benchmark_symbol`.
            if let Some((series, _)) = series_by_symbol.get("SPY").cloned() {
                series_by_symbol.insert("SPY".to_string(), (series, Market::Benchmark));
            }

            // Global-mode benchmark: a 60/40 SPY/AGG blend (§4.8), rebalanced
            // on the same month-end cadence as the strategy itself.
            let mut weights = HashMap::new();
            weights.insert("SPY".to_string(), dec!(0.6));
            weights.insert("AGG".to_string(), dec!(0.4));
            (
                RebalanceStrategy::GlobalPreset {
                    preset: config.strategy.preset,
                    kr_top_n: config.strategy.top_n,
                },
                weights,
                "SPY".to_string(),
            )
        }
        StrategyKind::Pullback | StrategyKind::Swing => unreachable!("handled by run_daily_loop_strategy above"),
    };

    let data = DataHandler::rebuild(&series_by_symbol, &benchmark_symbol).context("rebuilding panel")?;

    let backtest_config = BacktestConfig {
        initial_capital: config.initial_capital,
        benchmark_weights,
        risk_free_rate: config.risk_free_rate,
        usdkrw: config.usdkrw,
        warmup_days: config.warmup_days,
        strategy,
    };

    let run_result = BacktestOrchestrator::run(&data, &backtest_config).context("running backtest")?;
    let elapsed_sec = start.elapsed().as_secs_f64();

    // Global-mode-only artefact fields (§6): the last rebalance's resolved
    // per-ticker weights and a per-asset-category regime breakdown.
    let is_global = matches!(config.strategy.kind, StrategyKind::GlobalPreset);
    let (global_allocation, regime_by_class) = if is_global {
        (
            run_result.rebalance_events.last().map(|event| {
                event
                    .target_weights
                    .iter()
                    .map(|(symbol, &weight)| GlobalAllocationEntry { symbol: symbol.clone(), weight })
                    .collect()
            }),
            run_result.rebalance_events.last().and_then(|event| event.per_ticker_regime.as_ref()).map(global_regime_by_class),
        )
    } else {
        (None, None)
    };

    let artefact = RunArtefactBuilder {
        timestamp: chrono::Utc::now().to_rfc3339(),
        config: serde_json::json!({
            "top_n": config.strategy.top_n,
            "weight_method": format!("{:?}", config.strategy.weight_method),
            "min_trading_value": config.strategy.min_trading_value,
        }),
        equity_curve: run_result.portfolio.equity_curve().to_vec(),
        trades: run_result.portfolio.trades().to_vec(),
        regimes: run_result.regimes_observed.clone(),
        risk_free_rate: config.risk_free_rate,
        elapsed_sec,
        benchmark_equity: Some(run_result.benchmark.equity_curve().to_vec()),
        global_allocation,
        regime_by_class,
    }
    .build();

    let out_path = momentum_result_path(&config.cache_root);
    save_artefact(&out_path, &artefact).await.context("persisting run artefact")?;

    tracing::info!(path = %out_path.display(), rebalances = run_result.rebalance_events.len(), "backtest complete");
    Ok(())
}

/// Runs the Pullback or Swing daily loop (§4.7/§4.8) directly over
/// `series_by_symbol`, bypassing the month-end-rebalance `DataHandler` /
/// `BacktestOrchestrator` path entirely — both strategies decide day by day
/// off raw OHLC rather than off a monthly panel view.
async fn run_daily_loop_strategy(config: Config, series_by_symbol: HashMap<String, (BarSeries, Market)>, start: Instant) -> anyhow::Result<()> {
    let (equity_curve, trades, regimes) = match config.strategy.kind {
        StrategyKind::Pullback => {
            let pullback_config = PullbackConfig {
                initial_capital: config.initial_capital,
                max_open_positions: config.strategy.top_n,
                warmup_days: config.warmup_days,
                benchmark_symbol: DOMESTIC_BENCHMARK_SYMBOL.to_string(),
            };
            let result = PullbackOrchestrator::run(&series_by_symbol, &pullback_config);
            (result.equity_curve, result.trades, result.regimes_observed)
        }
        StrategyKind::Swing => {
            let swing_config = SwingConfig {
                initial_capital: config.initial_capital,
                warmup_days: config.warmup_days,
            };
            let result = SwingOrchestrator::run(&series_by_symbol, &swing_config);
            (result.equity_curve, result.trades, Vec::new())
        }
        StrategyKind::DomesticMomentum | StrategyKind::GlobalPreset => unreachable!("caller only dispatches Pullback/Swing here"),
    };
    let elapsed_sec = start.elapsed().as_secs_f64();

    let artefact = RunArtefactBuilder {
        timestamp: chrono::Utc::now().to_rfc3339(),
        config: serde_json::json!({ "strategy": format!("{:?}", config.strategy.kind) }),
        equity_curve,
        trades,
        regimes,
        risk_free_rate: config.risk_free_rate,
        elapsed_sec,
        benchmark_equity: None,
        global_allocation: None,
        regime_by_class: None,
    }
    .build();

    let out_path = momentum_result_path(&config.cache_root);
    save_artefact(&out_path, &artefact).await.context("persisting run artefact")?;

    tracing::info!(path = %out_path.display(), trades = artefact.trade_summary.values().sum::<usize>(), "backtest complete");
    Ok(())
}

/// Groups a global rebalance's per-ticker regime classification by asset
/// category (§4.4's category tables), for the `regime_by_class` artefact
/// field. The domestic-equity proxy and cash-equivalent ticker never appear
/// in `per_ticker_regime` (they are synthetic, not individually classified).
fn global_regime_by_class(
    per_ticker_regime: &HashMap<String, quantrade::domain::regime::Regime>,
) -> HashMap<String, Vec<quantrade::domain::regime::Regime>> {
    use quantrade::domain::scoring::global::{category_tickers, AssetCategory};
    let categories = [
        ("global_equity", AssetCategory::GlobalEquity),
        ("bonds", AssetCategory::Bonds),
        ("commodities", AssetCategory::Commodities),
    ];
    let mut out = HashMap::new();
    for (label, category) in categories {
        let regimes: Vec<_> = category_tickers(category)
            .iter()
            .filter_map(|ticker| per_ticker_regime.get(*ticker).copied())
            .collect();
        if !regimes.is_empty() {
            out.insert(label.to_string(), regimes);
        }
    }
    out
}
