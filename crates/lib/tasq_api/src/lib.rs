//! # tasq_api
//!
//! HTTP API library for Tasq.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post, put};
use sqlx::PgPool;
use tasq_core::auth::accounts::AccountStore;
use tasq_core::auth::gate::TokenGate;
use tasq_core::auth::principal::PrincipalResolver;
use tasq_core::index::{SearchIndex, TaskSearch};
use tasq_core::ledger::{LedgerStore, TaskLedger};
use tasq_core::sync::SyncOrchestrator;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{auth, health, tasks};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub gate: Arc<TokenGate>,
    pub principals: Arc<PrincipalResolver>,
    /// Written by registration, read by login and principal resolution.
    pub accounts: Arc<dyn AccountStore>,
    /// Write path and ledger reads.
    pub tasks: SyncOrchestrator,
    /// Index reads.
    pub search: TaskSearch,
}

impl AppState {
    /// Wire the core services over the given stores.
    pub fn new(
        config: ApiConfig,
        accounts: Arc<dyn AccountStore>,
        ledger: Arc<dyn LedgerStore>,
        index: Arc<dyn SearchIndex>,
    ) -> Self {
        let timeout = config.sync.store_timeout;
        let gate = TokenGate::new(config.jwt_secret.as_bytes());
        let principals = PrincipalResolver::new(Arc::clone(&accounts), timeout)
            .with_cache_ttl(config.principal_cache_ttl);
        let tasks = SyncOrchestrator::new(
            TaskLedger::new(ledger, timeout),
            Arc::clone(&index),
            &config.sync,
        );
        let search = TaskSearch::new(index, timeout);
        Self {
            config,
            gate: Arc::new(gate),
            principals: Arc::new(principals),
            accounts,
            tasks,
            search,
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `tasq_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tasq_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
///
/// Every request passes the token gate; the gate's own allow-list decides
/// which paths may be reached anonymously.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/health", get(health::health_handler))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler));

    let todo = Router::new()
        .route("/todo", get(tasks::list_handler))
        .route("/todo/add", post(tasks::create_handler))
        .route("/todo/add/bulk", post(tasks::create_bulk_handler))
        .route("/todo/search", get(tasks::search_handler))
        .route("/todo/completed", get(tasks::completed_handler))
        .route("/todo/pending", get(tasks::pending_handler))
        .route("/todo/{id}", get(tasks::get_handler))
        .route("/todo/{id}/complete", patch(tasks::complete_handler))
        .route("/todo/edit/{id}", put(tasks::update_handler))
        .route("/todo/delete/{id}", delete(tasks::delete_handler));

    Router::new()
        .merge(public)
        .merge(todo)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
