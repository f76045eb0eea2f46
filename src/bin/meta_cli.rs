use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use meta_commerce_bridge::{
    config::{self, AppConfig},
    db::{self, DbPool},
    events::{self, EventSender},
    handlers::AppServices,
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::SyncShipping { store_id } => {
            let result = context
                .services
                .shipping
                .sync_shipping_profiles(store_id)
                .await
                .context("shipping profile sync failed")?;
            if cli.json {
                print_json(&result)?;
            } else {
                println!(
                    "Uploaded {} shipping profile(s) for store {} from {}",
                    result.profiles, result.store_id, result.file_path
                );
            }
        }
        Commands::GenerateCoupon {
            business_id,
            store_id,
            rule_id,
        } => {
            let discounts = &context.services.discounts;
            let code = match business_id {
                Some(business_id) => discounts.generate_coupon_code(&business_id, rule_id).await,
                None => discounts.generate_for_store(store_id, rule_id).await,
            }
            .context("failed to generate coupon")?;
            if cli.json {
                print_json(&json!({ "coupon_code": code }))?;
            } else {
                println!("{}", code);
            }
        }
        Commands::RotateApiKey => {
            let key = context
                .services
                .connection
                .rotate_api_key()
                .await
                .context("failed to rotate API key")?;
            if cli.json {
                print_json(&json!({ "api_key": key }))?;
            } else {
                println!("New API key: {}", key);
            }
        }
        Commands::Config(command) => handle_config_command(&context, command, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "meta-cli", about = "Operate the Meta commerce bridge from the shell", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export and upload shipping profiles to Meta
    SyncShipping {
        #[arg(long, default_value_t = 0)]
        store_id: i32,
    },
    /// Issue a single coupon for a sales rule
    GenerateCoupon {
        /// External business id; resolves the store it is connected to
        #[arg(long, conflicts_with = "store_id")]
        business_id: Option<String>,
        #[arg(long, default_value_t = 0)]
        store_id: i32,
        #[arg(long)]
        rule_id: i32,
    },
    /// Replace the API key Meta uses to call the bridge
    RotateApiKey,
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Read a value, falling back to the default scope
    Get {
        #[arg(long)]
        path: String,
        #[arg(long, default_value_t = 0)]
        store_id: i32,
    },
    /// Write a value at exactly the given scope
    Set {
        #[arg(long)]
        path: String,
        value: String,
        #[arg(long, default_value_t = 0)]
        store_id: i32,
    },
    /// Remove a value from the given scope
    Unset {
        #[arg(long)]
        path: String,
        #[arg(long, default_value_t = 0)]
        store_id: i32,
    },
    /// List every value stored at a scope
    List {
        #[arg(long, default_value_t = 0)]
        store_id: i32,
    },
}

async fn handle_config_command(
    context: &CliContext,
    command: ConfigCommands,
    json: bool,
) -> Result<()> {
    let system_config = &context.services.system_config;
    match command {
        ConfigCommands::Get { path, store_id } => {
            let value = system_config.get(store_id, &path).await?;
            if json {
                print_json(&json!({ "store_id": store_id, "path": path, "value": value }))?;
            } else {
                println!("{}", value.unwrap_or_default());
            }
        }
        ConfigCommands::Set {
            path,
            value,
            store_id,
        } => {
            let saved = system_config.set(store_id, &path, Some(&value)).await?;
            if json {
                print_json(&saved)?;
            } else {
                println!("Saved {} for store {}", saved.path, saved.store_id);
            }
        }
        ConfigCommands::Unset { path, store_id } => {
            let removed = system_config.delete(store_id, &path).await?;
            if json {
                print_json(&json!({ "removed": removed }))?;
            } else if removed {
                println!("Removed {} from store {}", path, store_id);
            } else {
                println!("{} was not set for store {}", path, store_id);
            }
        }
        ConfigCommands::List { store_id } => {
            let rows = system_config.list_scope(store_id).await?;
            if json {
                print_json(&rows)?;
            } else {
                for row in rows {
                    println!("{} = {}", row.path, row.value.unwrap_or_default());
                }
            }
        }
    }
    Ok(())
}

struct CliContext {
    services: AppServices,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config: AppConfig = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool: DbPool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        if config.auto_migrate {
            db::run_migrations(&db_pool)
                .await
                .context("failed to run migrations")?;
        }

        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        tokio::spawn(events::process_events(event_rx));
        debug!("CLI context initialized");

        Ok(Self {
            services: AppServices::new(
                Arc::new(db_pool),
                Arc::new(EventSender::new(event_tx)),
                Arc::new(config),
            ),
        })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
