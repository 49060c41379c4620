use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tally::{
    LedgerConfig, LedgerHttpState, LedgerStateFile, MemoryBalanceStore, MemoryHistoryStore,
    PointLedger,
};

#[derive(Debug, Parser)]
#[command(name = "tally-server", about = "Per-user point ledger over HTTP")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// TOML config file; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON state file with accounts to seed at boot; admin edits are
    /// written back to it.
    #[arg(long)]
    state: Option<PathBuf>,

    /// Enable the /admin routes, guarded by this token.
    #[arg(long)]
    admin_token: Option<String>,

    /// Emit logs as JSON records.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = match args.config.as_ref() {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };

    let ledger = PointLedger::new(
        config,
        Arc::new(MemoryBalanceStore::new()),
        Arc::new(MemoryHistoryStore::new()),
    );

    if let Some(path) = args.state.as_ref() {
        if path.exists() {
            let seeds = LedgerStateFile::load(path)?;
            for account in &seeds.accounts {
                ledger.seed_account(account.id, account.amount).await?;
            }
            tracing::info!(accounts = seeds.accounts.len(), "seeded accounts from state file");
        }
    }

    let mut state = LedgerHttpState::new(ledger);
    if let Some(token) = args.admin_token {
        state = state.with_admin_token(token);
    }
    if let Some(path) = args.state {
        state = state.with_state_file(path);
    }

    let app = tally::ledger::http::router(state);
    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    tracing::info!(listen = %args.listen, "tally server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(json_logs: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);
    if json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}
