//! HBP CLI
//!
//! Command-line browser for the HBP collaboratory services.
//!
//! # Commands
//!
//! - `children` - List the children of a project or folder, page by page
//! - `entity` - Show an entity and its path
//! - `collabs` - List collabs
//! - `members` - List the members of a group

mod commands;
mod http;

use clap::{Parser, Subcommand};
use commands::{Format, Services};
use hbp_client::{ClientConfig, ConfigError};
use tracing_subscriber::EnvFilter;

/// HBP collaboratory command-line client.
#[derive(Debug, Parser)]
#[command(name = "hbp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Document service base URL
    #[arg(global = true, long)]
    document_url: Option<String>,

    /// Collab service base URL
    #[arg(global = true, long)]
    collab_url: Option<String>,

    /// Identity service base URL
    #[arg(global = true, long)]
    identity_url: Option<String>,

    /// OAuth bearer token
    #[arg(global = true, long)]
    token: Option<String>,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value = "text")]
    format: Format,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the children of a container entity
    Children {
        /// Parent entity type (project, folder...)
        entity_type: String,

        /// Parent entity id
        uuid: String,

        /// Number of pages to load
        #[arg(short, long, default_value = "1")]
        pages: usize,

        /// Only list children of this type (repeatable)
        #[arg(short, long)]
        accept: Vec<String>,

        /// Sort attribute
        #[arg(short, long)]
        sort: Option<String>,
    },

    /// Show an entity and its path
    Entity {
        /// Entity id
        id: String,
    },

    /// List collabs
    Collabs {
        /// Only the collabs of the current user
        #[arg(short, long)]
        mine: bool,

        /// Full text search
        #[arg(short, long)]
        search: Option<String>,

        /// Number of pages to load
        #[arg(short, long, default_value = "1")]
        pages: usize,
    },

    /// List the members of a group
    Members {
        /// Group id or name
        group: String,

        /// Number of pages to load
        #[arg(short, long, default_value = "1")]
        pages: usize,
    },
}

impl Cli {
    fn config(&self) -> Result<ClientConfig, ConfigError> {
        let mut config = ClientConfig::new();
        if let Some(url) = &self.document_url {
            config = config.with_document_url(url.as_str());
        }
        if let Some(url) = &self.collab_url {
            config = config.with_collab_url(url.as_str());
        }
        if let Some(url) = &self.identity_url {
            config = config.with_identity_url(url.as_str());
        }
        if let Some(token) = &self.token {
            config = config.with_token(token.as_str());
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.config()?;
    let services = Services::new(&config)?;
    let format = cli.format;

    match cli.command {
        Commands::Children {
            entity_type,
            uuid,
            pages,
            accept,
            sort,
        } => {
            commands::children::run(&services, &entity_type, &uuid, pages, accept, sort, format)
                .await?;
        }
        Commands::Entity { id } => {
            commands::entity::run(&services, &id, format).await?;
        }
        Commands::Collabs {
            mine,
            search,
            pages,
        } => {
            commands::collabs::run(&services, mine, search, pages, format).await?;
        }
        Commands::Members { group, pages } => {
            commands::members::run(&services, &group, pages, format).await?;
        }
    }

    Ok(())
}
