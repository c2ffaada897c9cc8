// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use clap::Parser;
use cli::{Cli, Commands};
use sqlx::postgres::PgPoolOptions;
use tasq_core::auth::jwt::{issue_token, resolve_jwt_secret, verify_token};
use tasq_core::config::SyncConfig;
use tasq_core::index::postgres::PgSearchIndex;
use tasq_core::ledger::TaskLedger;
use tasq_core::ledger::postgres::PgLedgerStore;
use tasq_core::sync::SyncOrchestrator;
use tasq_core::sync::reconcile::Reconciler;

mod cli;
mod logging;

fn main() -> Result<()> {
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<()> {
    logging::init()?;

    let args = Cli::parse();

    match args.command {
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
        Commands::Token { subject, secret } => {
            if subject.trim().is_empty() {
                return Err(Error::Custom("subject must not be empty".into()));
            }
            let secret = secret.unwrap_or_else(resolve_jwt_secret);
            println!("{}", issue_token(&subject, secret.as_bytes())?);
        }
        Commands::VerifyToken { token, secret } => {
            let secret = secret.unwrap_or_else(resolve_jwt_secret);
            let claims = verify_token(&token, secret.as_bytes(), Utc::now())?;
            let expires = Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            println!(
                "{}",
                serde_json::json!({"sub": claims.sub, "iat": claims.iat, "exp": claims.exp, "expires": expires})
            );
        }
        Commands::Reconcile {
            database_url,
            index_database_url,
            rebuild,
        } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(reconcile(&database_url, index_database_url.as_deref(), rebuild))?;
        }
    }

    Ok(())
}

async fn reconcile(database_url: &str, index_database_url: Option<&str>, rebuild: bool) -> Result<()> {
    let config = SyncConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await?;
    tasq_core::migrate::migrate(&pool).await?;
    let index_pool = match index_database_url {
        Some(url) if url != database_url => {
            let index_pool = PgPoolOptions::new().max_connections(2).connect(url).await?;
            tasq_core::migrate::migrate(&index_pool).await?;
            index_pool
        }
        _ => pool.clone(),
    };

    let ledger = TaskLedger::new(Arc::new(PgLedgerStore::new(pool)), config.store_timeout);
    let sync = SyncOrchestrator::new(ledger, Arc::new(PgSearchIndex::new(index_pool)), &config);
    let reconciler = Reconciler::new(&sync, &config);

    if rebuild {
        let written = reconciler.rebuild().await?;
        log::info!("rebuilt search index: {written} records");
        println!("{}", serde_json::json!({"rebuilt": written}));
        return Ok(());
    }

    let report = reconciler.run_once().await?;
    log::info!(
        "reconcile pass: examined={} converged={} skipped={} failed={}",
        report.examined,
        report.converged,
        report.skipped,
        report.failed
    );
    println!(
        "{}",
        serde_json::json!({
            "examined": report.examined,
            "converged": report.converged,
            "skipped": report.skipped,
            "failed": report.failed,
        })
    );
    if report.failed > 0 {
        return Err(Error::Custom(format!(
            "{} outbox entries could not be reconciled",
            report.failed
        )));
    }
    Ok(())
}
