//! Operator CLI: organization and tenant-database administration against the
//! same data directory the server uses.

use anyhow::Context;
use clap::{Parser, Subcommand};

use tasktrack_api::{config::AppConfig, AppState};

#[derive(Parser)]
#[command(name = "tasktrack-admin", about = "TaskTrack administration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Organization management (shared database)
    #[command(subcommand)]
    Org(OrgCommand),
    /// Tenant database management
    #[command(subcommand)]
    Tenant(TenantCommand),
}

#[derive(Subcommand)]
enum OrgCommand {
    /// List all organizations and their tenant keys
    List,
    /// Create an organization and provision its tenant database
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        subdomain: String,
    },
}

#[derive(Subcommand)]
enum TenantCommand {
    /// Provision (or re-check) the tenant database for a key
    Provision { subdomain: String },
    /// Close the cached pool for a tenant key
    Evict { subdomain: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let state = AppState::new(AppConfig::from_env());
    state.init().await.context("shared database migration")?;

    match cli.command {
        Command::Org(OrgCommand::List) => {
            for org in state.organizations.list().await? {
                let provisioned = if state.db.is_provisioned(&org.subdomain) {
                    "provisioned"
                } else {
                    "MISSING DATABASE"
                };
                println!("{:>4}  {:<24} {:<16} {}", org.id, org.name, org.subdomain, provisioned);
            }
        }
        Command::Org(OrgCommand::Create { name, subdomain }) => {
            let org = state
                .organizations
                .create(&name, &subdomain)
                .await
                .context("organization signup")?;
            println!("created organization {} ({})", org.id, org.subdomain);
        }
        Command::Tenant(TenantCommand::Provision { subdomain }) => {
            state
                .router
                .provision(&subdomain)
                .await
                .context("tenant provisioning")?;
            println!("tenant database ready for '{}'", subdomain);
        }
        Command::Tenant(TenantCommand::Evict { subdomain }) => {
            state.db.evict_tenant(&subdomain).await?;
            println!("evicted pool for '{}'", subdomain);
        }
    }

    state.db.close_all().await;
    Ok(())
}
