//! CLI command implementations.

pub mod children;
pub mod collabs;
pub mod entity;
pub mod members;

use crate::http::ReqwestClient;
use clap::ValueEnum;
use hbp_client::{ClientConfig, CollabStore, EntityStore, IdentityStore};
use hbp_paging::{HbpResult, HttpClient, ResultSet};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One tab separated line per record.
    Text,
    /// Pretty printed JSON.
    Json,
}

/// The stores the commands work with, sharing one HTTP client.
pub struct Services {
    /// Document service.
    pub entities: Arc<EntityStore<ReqwestClient>>,
    /// Identity service.
    pub identity: Arc<IdentityStore<ReqwestClient>>,
    /// Collab service.
    pub collabs: CollabStore<ReqwestClient>,
}

impl Services {
    /// Connects the stores to the configured services.
    pub fn new(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let client = Arc::new(ReqwestClient::new(config)?);
        let identity = Arc::new(IdentityStore::new(Arc::clone(&client), config));
        let entities = Arc::new(
            EntityStore::new(Arc::clone(&client), config).with_identity(Arc::clone(&identity)),
        );
        Ok(Self {
            entities,
            identity,
            collabs: CollabStore::new(client, config),
        })
    }
}

/// Loads pages until `pages` are in or the listing ends.
pub async fn load_pages<C, T>(set: &ResultSet<C, T>, pages: usize) -> HbpResult<()>
where
    C: HttpClient,
    T: DeserializeOwned + Send + Sync,
{
    for _ in 1..pages {
        if !set.has_next() {
            break;
        }
        set.next().await?;
    }
    debug!(items = set.len(), count = set.count(), "listing loaded");
    Ok(())
}
