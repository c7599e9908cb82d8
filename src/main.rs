// Ledger indexer service
// Chain event indexer + operational HTTP endpoints

use anyhow::{anyhow, Context, Result};
use ledger_indexer::adapters::build_adapters;
use ledger_indexer::api::{self, AppState};
use ledger_indexer::chain::{ChainProvider, JsonRpcProvider};
use ledger_indexer::config::{IndexerConfig, DEFAULT_CONFIG_PATH};
use ledger_indexer::database::{Database, PgLedger};
use ledger_indexer::domains::DomainRegistry;
use ledger_indexer::orchestrator::Orchestrator;
use ledger_indexer::reconcile::Reconciler;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging() -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new("ledger_indexer=info,sqlx=warn,tower_http=info")?,
    };

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_target(false)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .with_env_filter(filter)
            .init();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_logging()?;
    info!("Starting ledger indexer");

    // Load configuration
    let config_path =
        std::env::var("INDEXER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = IndexerConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path))?;
    let database_url = config
        .database_url
        .clone()
        .ok_or_else(|| anyhow!("DATABASE_URL must be set in the environment or config"))?;
    let server_port = std::env::var("PORT")
        .unwrap_or_else(|_| "4000".to_string())
        .parse::<u16>()?;

    info!("Configuration:");
    info!("  Config file: {}", config_path);
    info!("  Chains: {}", config.chains.len());
    info!("  Batch size: {} blocks", config.batch_size);
    info!("  Poll interval: {:?}", config.poll_interval());
    info!("  Cold-start lookback: {} days", config.sync_days);
    info!("  Server Port: {}", server_port);

    // Initialize database
    let db = Database::init(&database_url).await?;
    let ledger = Arc::new(PgLedger::new(db.clone()));

    let mut providers: HashMap<String, Arc<dyn ChainProvider>> = HashMap::new();
    for chain in &config.chains {
        let provider = JsonRpcProvider::new(chain.rpc_url.clone())
            .with_context(|| format!("building RPC client for {}", chain.name))?;
        providers.insert(chain.name.clone(), Arc::new(provider));
        info!("  {} sources: {:?}", chain.name, chain.sources());
    }

    let adapters = build_adapters(&config, &providers);
    let reconciler = Arc::new(Reconciler::new(
        ledger.clone(),
        DomainRegistry::from_config(&config),
    ));
    let orchestrator = Orchestrator::new(&config, adapters, ledger, reconciler);

    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState {
        db,
        status: orchestrator.status(),
        shutdown: shutdown.clone(),
    });

    // Start the indexer loop in background
    let indexer_cancel = shutdown.clone();
    let indexer = tokio::spawn(async move {
        orchestrator.run(indexer_cancel).await;
    });

    let signal_cancel = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested, finishing the current sweep");
        signal_cancel.cancel();
    });

    // Start server
    let app = api::router(state);
    let addr = format!("0.0.0.0:{}", server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Ledger indexer listening on {}", listener.local_addr()?);

    let server_cancel = shutdown.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await
        .map_err(|e| anyhow!("Server error: {}", e))?;

    if let Err(e) = indexer.await {
        error!("Indexer task failed: {}", e);
    }
    info!("Ledger indexer stopped");
    Ok(())
}
