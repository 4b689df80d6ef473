//! Bazaar CLI - Database migrations and store administration.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! bazaar migrate
//!
//! # Load categories, users and products from a YAML file
//! bazaar seed data/seed.yaml
//!
//! # Check out a user's cart
//! bazaar checkout --user alice
//!
//! # List, cancel or update orders as a given user
//! bazaar orders list --as admin
//! bazaar orders cancel 42 --as alice
//! bazaar orders set-status 42 shipped --as admin
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Seed the catalog from a YAML file
//! - `checkout` - Turn a user's cart into an order
//! - `orders` - Inspect and manage orders

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

use bazaar_core::{OrderId, OrderStatus};
use bazaar_storefront::config::{StorefrontConfig, TelemetryConfig};
use bazaar_storefront::db::{self, PgStore};
use bazaar_storefront::state::AppState;
use bazaar_storefront::telemetry;

mod commands;

#[derive(Parser)]
#[command(name = "bazaar")]
#[command(author, version, about = "Bazaar store administration tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed categories, users and products from a YAML file
    Seed {
        /// Path to the seed file
        file: String,
    },
    /// Check out a user's cart
    Checkout {
        /// Username whose cart is checked out
        #[arg(short, long)]
        user: String,
    },
    /// Inspect and manage orders
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List the orders visible to a user
    List {
        /// Act as this user
        #[arg(long = "as")]
        as_user: String,
    },
    /// Cancel a pending order
    Cancel {
        /// Order ID
        id: i64,

        /// Act as this user
        #[arg(long = "as")]
        as_user: String,
    },
    /// Set an order's status
    SetStatus {
        /// Order ID
        id: i64,

        /// New status (`pending`, `paid`, `shipped`, `delivered`, `cancelled`)
        #[arg(value_parser = parse_status)]
        status: OrderStatus,

        /// Act as this user
        #[arg(long = "as")]
        as_user: String,
    },
}

fn parse_status(raw: &str) -> Result<OrderStatus, String> {
    raw.parse()
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            let _telemetry = telemetry::init(&TelemetryConfig::default());
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };
    let _telemetry = telemetry::init(&config.telemetry);

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, &config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &StorefrontConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pool = db::create_pool(&config.database_url).await?;

    if matches!(cli.command, Commands::Migrate) {
        commands::migrate::run(&pool).await?;
        return Ok(());
    }

    let (state, worker) = AppState::from_config(config, PgStore::new(pool))?;

    let result = match cli.command {
        Commands::Migrate => Ok(()),
        Commands::Seed { file } => commands::seed::from_file(state.store(), &file).await,
        Commands::Checkout { user } => commands::checkout::run(&state, &user).await,
        Commands::Orders { action } => match action {
            OrdersAction::List { as_user } => commands::orders::list(&state, &as_user).await,
            OrdersAction::Cancel { id, as_user } => {
                commands::orders::cancel(&state, &as_user, OrderId::new(id)).await
            }
            OrdersAction::SetStatus {
                id,
                status,
                as_user,
            } => commands::orders::set_status(&state, &as_user, OrderId::new(id), status).await,
        },
    };

    // Queued emails go out before the process exits.
    drop(state);
    worker.finish().await;

    result
}
