//! Tasq HTTP server binary.
//!
//! Serves the task API, runs the outbox reconciler in the background and
//! shuts both down on Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tasq_api::config::ApiConfig;
use tasq_core::auth::accounts::{AccountStore, MemoryAccountStore, PgAccountStore};
use tasq_core::index::SearchIndex;
use tasq_core::index::memory::MemorySearchIndex;
use tasq_core::index::postgres::PgSearchIndex;
use tasq_core::ledger::LedgerStore;
use tasq_core::ledger::memory::MemoryLedgerStore;
use tasq_core::ledger::postgres::PgLedgerStore;
use tasq_core::sync::reconcile::Reconciler;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Where accounts, the ledger and the search index live.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Storage {
    /// PostgreSQL for everything; the index may use its own database.
    Postgres,
    /// Process memory only. Data is lost on exit.
    Memory,
}

/// CLI arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "tasq_server", about = "Tasq HTTP server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3100")]
    bind_addr: String,

    /// Storage backend for accounts and the ledger.
    #[arg(long, value_enum, default_value_t = Storage::Postgres)]
    storage: Storage,

    /// Storage backend for the search index. Memory storage forces a memory index.
    #[arg(long, value_enum, default_value_t = Storage::Postgres)]
    index: Storage,

    /// PostgreSQL connection URL for accounts and the ledger.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/tasq"
    )]
    database_url: String,

    /// PostgreSQL connection URL for the search index. Defaults to `--database-url`.
    #[arg(long, env = "INDEX_DATABASE_URL")]
    index_database_url: Option<String>,

    /// Maximum number of database connections per pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Skip the background reconciler.
    #[arg(long, default_value_t = false)]
    no_reconciler: bool,
}

struct Stores {
    accounts: Arc<dyn AccountStore>,
    ledger: Arc<dyn LedgerStore>,
    index: Arc<dyn SearchIndex>,
    /// An index with no durable state must be refilled from the ledger.
    index_needs_rebuild: bool,
}

async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(url)
        .await
}

async fn open_stores(args: &Args) -> Result<Stores, Box<dyn std::error::Error>> {
    if args.storage == Storage::Memory {
        warn!("memory storage selected; nothing survives a restart");
        return Ok(Stores {
            accounts: Arc::new(MemoryAccountStore::new()),
            ledger: Arc::new(MemoryLedgerStore::new()),
            index: Arc::new(MemorySearchIndex::new()),
            index_needs_rebuild: false,
        });
    }

    info!(max_connections = args.max_connections, "configuring connection pool");
    let pool = connect(&args.database_url, args.max_connections).await?;

    info!("running database migrations");
    tasq_api::migrate(&pool).await?;

    let (index, index_needs_rebuild): (Arc<dyn SearchIndex>, bool) = match args.index {
        Storage::Memory => {
            info!("search index held in memory; rebuilding from the ledger at startup");
            let index: Arc<dyn SearchIndex> = Arc::new(MemorySearchIndex::new());
            (index, true)
        }
        Storage::Postgres => {
            let index_pool = match &args.index_database_url {
                Some(url) if url != &args.database_url => {
                    info!("search index uses a separate database");
                    let index_pool = connect(url, args.max_connections).await?;
                    tasq_api::migrate(&index_pool).await?;
                    index_pool
                }
                _ => pool.clone(),
            };
            let index: Arc<dyn SearchIndex> = Arc::new(PgSearchIndex::new(index_pool));
            (index, false)
        }
    };

    Ok(Stores {
        accounts: Arc::new(PgAccountStore::new(pool.clone())),
        ledger: Arc::new(PgLedgerStore::new(pool)),
        index,
        index_needs_rebuild,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,tasq_api=debug,tasq_core=debug")
            }),
        )
        .init();

    let args = Args::parse();
    info!(
        bind_addr = %args.bind_addr,
        storage = ?args.storage,
        index = ?args.index,
        "starting tasq_server"
    );

    let stores = open_stores(&args).await?;

    let mut config = ApiConfig::from_env();
    config.bind_addr = args.bind_addr.clone();
    config.database_url = args.database_url.clone();
    config.index_database_url = args.index_database_url.clone();

    let state = tasq_api::AppState::new(
        config.clone(),
        stores.accounts,
        stores.ledger,
        stores.index,
    );

    let shutdown = CancellationToken::new();
    let reconciler = Arc::new(Reconciler::new(&state.tasks, &config.sync));
    if stores.index_needs_rebuild {
        let written = reconciler.rebuild().await?;
        info!(records = written, "search index ready");
    }
    let reconciler_handle = if args.no_reconciler {
        None
    } else {
        info!(interval = ?config.sync.reconcile_interval, "starting reconciler");
        Some(Arc::clone(&reconciler).spawn(shutdown.clone()))
    };

    let app = tasq_api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for shutdown signal: {e}");
            return;
        }
        info!("shutdown requested");
        signal.cancel();
    });

    let serve_shutdown = shutdown.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
        .await;

    shutdown.cancel();
    if let Some(handle) = reconciler_handle {
        let _ = handle.await;
    }

    result?;
    Ok(())
}
