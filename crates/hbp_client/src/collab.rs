//! Collab service store.

use crate::config::ClientConfig;
use crate::dedup::InFlight;
use crate::model::Collab;
use hbp_paging::{
    fetch_json, HbpError, HbpResult, HttpClient, HttpRequest, ResultSet, ResultSetOptions,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Filters of a collab listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollabQuery {
    /// Full text search.
    pub search: Option<String>,
    /// Only these collab ids.
    pub ids: Vec<String>,
    /// Items per page, server default when unset.
    pub page_size: Option<u32>,
    /// Page to load.
    pub page: Option<u32>,
}

impl CollabQuery {
    /// Creates an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the search string.
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Restricts the listing to these ids.
    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Sets the page.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    fn apply(&self, request: HttpRequest) -> HttpRequest {
        let ids = (!self.ids.is_empty()).then(|| self.ids.join(","));
        request
            .with_param("search", self.search.clone())
            .with_param("id", ids)
            .with_param("page_size", self.page_size.map(|s| s.to_string()))
            .with_param("page", self.page.map(|p| p.to_string()))
    }
}

/// Collabs of the collab service.
///
/// Fetched collabs are cached by id and label.
#[derive(Debug)]
pub struct CollabStore<C> {
    client: Arc<C>,
    base_url: String,
    cache: RwLock<HashMap<String, Collab>>,
    in_flight: InFlight<Collab>,
}

impl<C: HttpClient> CollabStore<C> {
    /// Creates a store.
    pub fn new(client: Arc<C>, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.collab_url.clone(),
            cache: RwLock::new(HashMap::new()),
            in_flight: InFlight::new(),
        }
    }

    /// Returns a collab by id.
    pub async fn get(&self, id: &str) -> HbpResult<Collab> {
        self.fetch_cached(format!("{}/collab/", self.base_url), id)
            .await
    }

    /// Returns a collab by label.
    pub async fn get_by_label(&self, label: &str) -> HbpResult<Collab> {
        self.fetch_cached(format!("{}/r/", self.base_url), label)
            .await
    }

    async fn fetch_cached(&self, prefix: String, key: &str) -> HbpResult<Collab> {
        if key.is_empty() {
            return Err(HbpError::missing_parameter("id"));
        }
        if let Some(collab) = self.cache.read().get(key).cloned() {
            return Ok(collab);
        }

        let request = HttpRequest::get(format!("{prefix}{key}/"));
        let signature = request.signature();
        let collab = self
            .in_flight
            .run(&signature, || fetch_json(self.client.as_ref(), request))
            .await?;

        let mut cache = self.cache.write();
        if let Some(id) = collab.id {
            cache.insert(id.to_string(), collab.clone());
        }
        cache.insert(key.to_string(), collab.clone());
        Ok(collab)
    }

    /// Lists collabs.
    pub async fn list(&self, query: &CollabQuery) -> HbpResult<ResultSet<C, Collab>> {
        let request = query.apply(HttpRequest::get(format!("{}/collab/", self.base_url)));
        ResultSet::paginated(Arc::clone(&self.client), request, ResultSetOptions::default()).await
    }

    /// Lists the collabs of the current user.
    pub async fn mine(&self, search: Option<&str>) -> HbpResult<ResultSet<C, Collab>> {
        let request = HttpRequest::get(format!("{}/mycollabs/", self.base_url))
            .with_param("search", search);
        ResultSet::paginated(Arc::clone(&self.client), request, ResultSetOptions::default()).await
    }

    /// Creates a collab and returns it with its id.
    pub async fn create(&self, collab: &Collab) -> HbpResult<Collab> {
        let request = HttpRequest::post(format!("{}/collab/", self.base_url), collab.payload());
        let reply: Value = fetch_json(self.client.as_ref(), request).await?;
        Ok(self.remember(collab, &reply))
    }

    /// Saves a collab.
    pub async fn save(&self, collab: &Collab) -> HbpResult<Collab> {
        let id = collab.id.ok_or_else(|| HbpError::missing_parameter("id"))?;
        let request = HttpRequest::put(format!("{}/collab/{id}/", self.base_url), collab.payload());
        let reply: Value = fetch_json(self.client.as_ref(), request).await?;
        Ok(self.remember(collab, &reply))
    }

    /// Deletes a collab.
    pub async fn delete(&self, collab: &Collab) -> HbpResult<()> {
        let id = collab.id.ok_or_else(|| HbpError::missing_parameter("id"))?;
        let request = HttpRequest::delete(format!("{}/collab/{id}/", self.base_url));
        let _: Value = fetch_json(self.client.as_ref(), request).await?;

        // Drop every cache key, labels included, pointing at this collab.
        self.cache.write().retain(|_, cached| cached.id != Some(id));
        debug!(id, "collab deleted");
        Ok(())
    }

    fn remember(&self, collab: &Collab, reply: &Value) -> Collab {
        let mut updated = collab.clone();
        updated.update_from(reply);
        if let Some(id) = updated.id {
            self.cache.write().insert(id.to_string(), updated.clone());
        }
        updated
    }
}
