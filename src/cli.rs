//! CLI definition and dispatch.

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::{CsvAdapter, read_quote_file};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{
    BacktestConfig, BacktestRequest, BacktestResult, BacktestYears, DataSource, resolve_series,
    run_crossover,
};
use crate::domain::config_validation::validate_config;
use crate::domain::error::TradeDeskError;
use crate::domain::synthetic;
use crate::ports::config_port::ConfigPort;
use crate::ports::quote_port::QuotePort;

#[derive(Parser, Debug)]
#[command(name = "tradedesk", about = "Paper-trading ledger and strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the portfolio API server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run the moving-average crossover backtest for one symbol
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        years: i64,
        /// Seed for the synthetic fallback series
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Load daily quotes for a symbol from a CSV file
    ImportQuotes {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(short, long)]
        file: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Serve { config } => run_serve(&config),
        Command::Backtest {
            config,
            symbol,
            years,
            seed,
        } => run_backtest(&config, &symbol, years, seed),
        Command::ImportQuotes {
            config,
            symbol,
            file,
        } => run_import_quotes(&config, &symbol, &file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Loads and validates the INI config, then starts logging with its
/// `[log] filter` unless `RUST_LOG` is set.
pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TradeDeskError> {
    eprintln!("Loading config from {}", path.display());
    let config = FileConfigAdapter::from_file(path)?;
    validate_config(&config)?;
    init_tracing(&config);
    Ok(config)
}

fn init_tracing(config: &dyn ConfigPort) {
    let directives = config
        .get_string("log", "filter")
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    // A second call in the same process keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_backtest(
    config_path: &Path,
    symbol: &str,
    years: i64,
    seed: Option<u64>,
) -> Result<(), TradeDeskError> {
    let config = load_config(config_path)?;
    let bt_config = BacktestConfig::from_config(&config);

    let request = BacktestRequest {
        symbol: Some(symbol.to_string()),
        years: Some(years),
        seed,
    };
    let (symbol, years) = request.validate()?;
    let seed = seed.unwrap_or_else(synthetic::random_seed);

    let quotes = open_quote_source(&config)?;
    eprintln!(
        "Running {}-year MA30/MA90 backtest for {}",
        years.get(),
        symbol
    );

    let result = run_backtest_with(quotes.as_ref(), &symbol, years, seed, &bt_config)?;
    print_summary(&result);
    Ok(())
}

/// Fetches quotes, falls back to synthetic prices when they are unusable,
/// and runs the crossover simulation.
pub fn run_backtest_with(
    quotes: &dyn QuotePort,
    symbol: &str,
    years: BacktestYears,
    seed: u64,
    bt_config: &BacktestConfig,
) -> Result<BacktestResult, TradeDeskError> {
    let outcome = quotes.fetch_daily(symbol, years.outputsize());
    let series = resolve_series(symbol, years, outcome, seed, Utc::now().date_naive());
    run_crossover(&series, years, bt_config.initial_capital)
}

/// CSV directory when `[backtest] quotes_dir` is set, the configured store
/// otherwise.
fn open_quote_source(
    config: &dyn ConfigPort,
) -> Result<Arc<dyn QuotePort + Send + Sync>, TradeDeskError> {
    if let Some(dir) = config.get_string("backtest", "quotes_dir") {
        info!(dir = %dir, "reading quotes from CSV directory");
        return Ok(Arc::new(CsvAdapter::new(PathBuf::from(dir))));
    }

    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    {
        Ok(crate::adapters::store::Store::open(config)?.quotes())
    }

    #[cfg(not(any(feature = "sqlite", feature = "postgres")))]
    {
        Err(TradeDeskError::ConfigMissing {
            section: "backtest".into(),
            key: "quotes_dir".into(),
        })
    }
}

fn print_summary(result: &BacktestResult) {
    eprintln!("\n=== {} ({} years) ===", result.symbol, result.years);
    match result.data_source {
        DataSource::Quoted => eprintln!("Data:             quoted"),
        DataSource::Synthetic => eprintln!(
            "Data:             SYNTHETIC (seed {}): {}",
            result.synthetic_seed.unwrap_or_default(),
            result.fallback_reason.as_deref().unwrap_or("unknown")
        ),
    }
    eprintln!("Initial Capital:  ${:.2}", result.initial_capital);
    eprintln!("Final Value:      ${:.2}", result.final_value);
    eprintln!("Total Return:     {:.2}%", result.total_return);
    eprintln!("Annualized:       {:.2}%", result.annualized_return);
    eprintln!("Max Drawdown:     -{:.1}%", result.max_drawdown);
    eprintln!("Total Trades:     {}", result.total_trades);
    eprintln!(
        "Buy & Hold:       ${:.2} ({:.2}%)",
        result.buy_hold_comparison.final_value, result.buy_hold_comparison.return_pct
    );

    if !result.trades.is_empty() {
        eprintln!("\n=== Trades ===");
        for t in &result.trades {
            eprintln!(
                "  {}  {:<12} {:>6} @ ${:.2} = ${:.2}",
                t.date,
                t.action.as_str(),
                t.shares,
                t.price,
                t.value
            );
        }
    }
}

fn run_import_quotes(config_path: &Path, symbol: &str, file: &Path) -> Result<(), TradeDeskError> {
    let config = load_config(config_path)?;
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(TradeDeskError::validation("Symbol is required"));
    }

    let bars = read_quote_file(file, &symbol)?;

    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    {
        let store = crate::adapters::store::Store::open(&config)?;
        let written = store.insert_quotes(&bars)?;
        info!(symbol = %symbol, bars = written, store = store.name(), "quotes imported");
        eprintln!("Imported {} bars for {} into {}", written, symbol, store.name());
        Ok(())
    }

    #[cfg(not(any(feature = "sqlite", feature = "postgres")))]
    {
        let _ = (config, bars);
        Err(TradeDeskError::ConfigMissing {
            section: "sqlite".into(),
            key: "path".into(),
        })
    }
}

fn run_serve(config_path: &Path) -> Result<(), TradeDeskError> {
    #[cfg(any(feature = "web-sqlite", feature = "web-postgres"))]
    {
        use crate::adapters::store::Store;
        use crate::adapters::web::{AppState, build_router};
        use crate::domain::config_validation::DEFAULT_LISTEN;
        use crate::domain::settlement::LedgerSettings;
        use std::net::SocketAddr;

        let config = load_config(config_path)?;
        let store = Store::open(&config)?;

        // Already checked by validate_config.
        let addr: SocketAddr = config
            .get_string("web", "listen")
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string())
            .trim()
            .parse()
            .map_err(|_| TradeDeskError::ConfigInvalid {
                section: "web".into(),
                key: "listen".into(),
                reason: "listen must be host:port".into(),
            })?;

        let state = AppState {
            ledger: store.ledger(),
            quotes: store.quotes(),
            ledger_settings: LedgerSettings::from_config(&config),
            backtest: BacktestConfig::from_config(&config),
        };
        let router = build_router(state);

        eprintln!("Starting web server on {}", addr);
        info!(%addr, store = store.name(), "portfolio API listening");

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await
        })?;
        Ok(())
    }

    #[cfg(not(any(feature = "web-sqlite", feature = "web-postgres")))]
    {
        let _ = config_path;
        Err(TradeDeskError::validation(
            "web feature is required for serve",
        ))
    }
}
