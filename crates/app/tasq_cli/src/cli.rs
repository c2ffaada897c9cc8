use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tasq", version, about = "Tasq operator CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the CLI version.
    Version,

    /// Issue a bearer token for an account id.
    Token {
        /// Account id to name in the token.
        #[arg(long)]
        subject: String,

        /// Signing secret. Falls back to the server's secret resolution.
        #[arg(long, env = "TASQ_JWT_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },

    /// Verify a bearer token and print its claims.
    VerifyToken {
        token: String,

        #[arg(long, env = "TASQ_JWT_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },

    /// Drain the index outbox once, or rebuild the search index from the ledger.
    Reconcile {
        /// PostgreSQL connection URL for the ledger.
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,

        /// PostgreSQL connection URL for the search index. Defaults to `--database-url`.
        #[arg(long, env = "INDEX_DATABASE_URL")]
        index_database_url: Option<String>,

        /// Upsert every ledger record instead of draining the outbox.
        #[arg(long, default_value_t = false)]
        rebuild: bool,
    },
}
