use clap::Parser;
use haulpool::application::Marketplace;
use haulpool::domain::ports::MarketStore;
use haulpool::infrastructure::in_memory::InMemoryStore;
use haulpool::interfaces::csv::account_writer::AccountWriter;
use haulpool::interfaces::csv::command_reader::CommandReader;
use haulpool::interfaces::replay::Replayer;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command log CSV (`command,actor,role,tenant,target,amount,detail`)
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    ///
    /// Row labels only live for one run; a later run refers to earlier orders
    /// by order number and to earlier withdrawals by id (both are logged when
    /// bound).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Configuration entry applied before replay, e.g. `--set commission_rate=0.12`
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_entry)]
    entries: Vec<(String, String)>,
}

fn parse_entry(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn setup_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.db_path.clone() {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => {
            let store = haulpool::infrastructure::rocksdb::RocksDBStore::open(&db_path).into_diagnostic()?;
            info!(path = %db_path.display(), "Using RocksDB store");
            run(Arc::new(store), cli).await
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(db_path) => {
            warn!(
                path = %db_path.display(),
                "Built without `storage-rocksdb`, falling back to the in-memory store"
            );
            run(Arc::new(InMemoryStore::new()), cli).await
        }
        None => run(Arc::new(InMemoryStore::new()), cli).await,
    }
}

async fn run<S: MarketStore + 'static>(store: Arc<S>, cli: Cli) -> Result<()> {
    for (key, value) in &cli.entries {
        store.set_config(key, value).await.into_diagnostic()?;
    }
    // Reject a broken configuration before touching any data.
    let market = Marketplace::new(store);
    market
        .commissions
        .current_config()
        .await
        .into_diagnostic()?;

    let file = File::open(&cli.input).into_diagnostic()?;
    let mut replayer = Replayer::new(market);
    let (mut applied, mut failed) = (0usize, 0usize);
    for (index, record) in CommandReader::new(file).commands().enumerate() {
        let row = index + 2;
        let outcome = match record {
            Ok(record) => replayer.apply(record).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => applied += 1,
            Err(e) => {
                failed += 1;
                warn!(row, error = %e, retryable = e.is_retryable(), "Command skipped");
            }
        }
    }
    info!(applied, failed, "Replay finished");

    let accounts = replayer.accounts().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(accounts).into_diagnostic()?;

    Ok(())
}
