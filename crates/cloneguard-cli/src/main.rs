//! Cloneguard CLI
//!
//! Operator surface for the clone-resolution workflow: register installs,
//! run the automatic pass, inspect clone state, and apply manual
//! resolutions against a configured database and install registry.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use cloneguard_core::config::{self, load_config};
use cloneguard_core::tracing_init::init_tracing;
use cloneguard_engine::api::RegistryClient;
use cloneguard_engine::resolver::{ManualAction, ManualOutcome, PassOutcome, Resolver};
use cloneguard_engine::storage::{Database, InstallParams};

#[derive(Parser, Debug)]
#[command(name = "cloneguard")]
#[command(version, about = "Cloneguard - site-clone identification and resolution")]
struct Args {
    /// Database file path
    #[arg(long, env = "CLONEGUARD_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Install-registry base URL
    #[arg(long, env = "CLONEGUARD_API_URL")]
    api_url: Option<String>,

    /// Install-registry bearer token
    #[arg(long, env = "CLONEGUARD_API_TOKEN")]
    api_token: Option<String>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "CLONEGUARD_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "CLONEGUARD_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register (or replace) the install of a product on this site.
    Register {
        #[arg(long)]
        product_id: i64,
        #[arg(long)]
        install_id: i64,
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        url: String,
        #[arg(long)]
        license_id: Option<i64>,
        #[arg(long)]
        plan_id: Option<i64>,
        /// Activation quota of the license; omit for unlimited.
        #[arg(long, requires = "license_id")]
        license_quota: Option<i64>,
        /// License expiration as a unix timestamp.
        #[arg(long, requires = "license_id")]
        license_expiration: Option<i64>,
    },

    /// Run one automatic-resolution pass against the live URL.
    Run {
        #[arg(long)]
        product_id: i64,
        /// The site's current URL.
        #[arg(long)]
        url: String,
    },

    /// Show the clone state of a product.
    Status {
        #[arg(long)]
        product_id: i64,
        #[arg(long)]
        url: String,
    },

    /// Apply a manual resolution action.
    Resolve {
        #[arg(long)]
        product_id: i64,
        #[arg(long)]
        url: String,
        #[arg(value_parser = ["new-home", "temporary-duplicate", "long-term-duplicate"])]
        action: String,
    },

    /// Suppress the manual-resolution notice for a product.
    HideNotice {
        #[arg(long)]
        product_id: i64,
    },
}

#[tokio::main]
#[allow(clippy::print_stdout)]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(&format!("cloneguard={}", args.log_level), args.log_json);

    let cwd = std::env::current_dir().ok();
    let mut cfg = load_config(cwd.as_deref())?;
    if let Some(api_url) = args.api_url {
        cfg.api.base_url = api_url;
    }
    if let Some(api_token) = args.api_token {
        cfg.api.token = api_token;
    }

    let db_path = args
        .db_path
        .or_else(|| cfg.database_path.clone())
        .or_else(config::database_path)
        .context("Could not determine a database path")?;
    let db = Database::open(&db_path).await?;

    let registry = RegistryClient::new(&cfg.api)
        .context("Registry client configuration is incomplete")?;
    let resolver = Resolver::new(db.clone(), registry, cfg.resolution);

    match args.command {
        Command::Register {
            product_id,
            install_id,
            user_id,
            url,
            license_id,
            plan_id,
            license_quota,
            license_expiration,
        } => {
            if let Some(license_id) = license_id {
                db.upsert_license(license_id, license_quota, 1, 0, license_expiration, false)
                    .await?;
            }
            let install = db
                .upsert_install(
                    product_id,
                    &InstallParams {
                        install_id,
                        user_id,
                        url,
                        license_id,
                        plan_id,
                    },
                )
                .await?;
            info!(product_id, install_id = install.install_id, "Install registered");
            println!("Registered install {} at {}", install.install_id, install.url);
        }

        Command::Run { product_id, url } => {
            let outcome = resolver.run_automatic_pass(product_id, &url).await?;
            match outcome {
                PassOutcome::NotClone => println!("Not a clone; nothing to resolve"),
                PassOutcome::Skipped => println!("Another pass holds the lock; skipped"),
                PassOutcome::Resolved => println!("Clone resolved automatically"),
                PassOutcome::Failed => println!("Attempt failed; will retry on a later pass"),
                PassOutcome::ManualRequired => {
                    println!("Manual resolution required (new-home / temporary-duplicate / long-term-duplicate)");
                }
            }
        }

        Command::Status { product_id, url } => {
            let status = resolver.status(product_id, &url).await?;
            println!("clone:            {}", status.is_clone);
            if let Some(host_kind) = status.host_kind {
                println!("live host:        {host_kind:?}");
            }
            if let Some(identified_at) = status.identified_at {
                println!("identified at:    {identified_at}");
            }
            println!("attempts:         {}", status.attempts);
            println!("manual required:  {}", status.manual_required);
            println!("notice hidden:    {}", status.manual_hidden);
            if let Some(expires_at) = status.temporary_duplicate_expires_at {
                println!("temporary until:  {expires_at}");
            }
        }

        Command::Resolve {
            product_id,
            url,
            action,
        } => {
            let action: ManualAction = action.parse().map_err(anyhow::Error::msg)?;
            let outcome = resolver.resolve_manually(product_id, &url, action).await?;
            match outcome {
                ManualOutcome::Applied => println!("Resolution applied"),
                ManualOutcome::AlreadyConsistent => {
                    println!("Install already consistent; nothing to do");
                }
            }
        }

        Command::HideNotice { product_id } => {
            resolver.hide_manual_resolution(product_id).await?;
            println!("Manual-resolution notice hidden");
        }
    }

    Ok(())
}
