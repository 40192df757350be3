//! Foilcraft CLI - Database migrations and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! fc-cli migrate
//!
//! # Load products and thermofoil from a YAML file
//! fc-cli seed catalog.yaml
//!
//! # Grant admin access
//! fc-cli users set-role -e owner@example.com -r admin
//!
//! # Re-check pending orders with Stripe
//! fc-cli orders sync
//!
//! # Retry cart clearing for paid orders
//! fc-cli orders sweep-carts
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Insert catalog entries that do not exist yet
//! - `users set-role` - Change a user's role
//! - `orders sync` / `orders sweep-carts` - Checkout maintenance

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "fc-cli")]
#[command(author, version, about = "Foilcraft CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Seed the catalog from a YAML file
    Seed {
        /// Path to the catalog file
        file: String,
    },
    /// Manage storefront users
    Users {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Checkout maintenance
    Orders {
        #[command(subcommand)]
        action: OrderAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Set a user's role
    SetRole {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Role (`USER` or `ADMIN`)
        #[arg(short, long, default_value = "ADMIN")]
        role: String,
    },
    /// List all users
    List,
}

#[derive(Subcommand)]
enum OrderAction {
    /// Re-check pending orders against Stripe and settle the ones it resolved
    Sync {
        /// Maximum orders to check
        #[arg(short, long, default_value_t = 100)]
        limit: u32,
    },
    /// Clear carts for paid orders whose clear never completed
    SweepCarts {
        /// Maximum orders to process
        #[arg(short, long, default_value_t = 100)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Seed { file } => commands::seed::catalog(&file).await?,
        Commands::Users { action } => match action {
            UserAction::SetRole { email, role } => {
                commands::users::set_role(&email, &role).await?;
            }
            UserAction::List => commands::users::list().await?,
        },
        Commands::Orders { action } => match action {
            OrderAction::Sync { limit } => commands::orders::sync(limit).await?,
            OrderAction::SweepCarts { limit } => commands::orders::sweep_carts(limit).await?,
        },
    }
    Ok(())
}
