//! Schema migration runner
//!
//! Run with: cargo run --bin migration -- up
//!
//! The connection string comes from `--database-url`, then `DATABASE_URL`,
//! then `APP__DATABASE_URL`.

use clap::{Parser, Subcommand};
use migrations::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DbErr};
use std::time::Duration;
use tracing::{error, info};

const DEFAULT_DATABASE_URL: &str = "sqlite://sales_orders.db?mode=rwc";

#[derive(Parser)]
#[command(name = "migration", about = "Apply or roll back the sales order schema")]
struct Cli {
    /// Database connection string
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply all pending migrations
    Up,
    /// Roll back the most recent migrations
    Down {
        #[arg(short, long, default_value_t = 1)]
        steps: u32,
    },
    /// Print applied and pending migrations
    Status,
    /// Drop every table and re-apply all migrations
    Fresh,
}

#[tokio::main]
async fn main() -> Result<(), DbErr> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    let database_url = cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .or_else(|| std::env::var("APP__DATABASE_URL").ok())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

    info!("Connecting to database: {}", database_url);

    let mut options = ConnectOptions::new(database_url);
    options
        .max_connections(5)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;

    let result = match cli.command {
        Command::Up => Migrator::up(&db, None).await,
        Command::Down { steps } => Migrator::down(&db, Some(steps)).await,
        Command::Status => Migrator::status(&db).await,
        Command::Fresh => Migrator::fresh(&db).await,
    };

    match result {
        Ok(()) => {
            info!("Migration command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration command failed: {}", e);
            Err(e)
        }
    }
}
