//! Document service store: entities, their children and metadata.

use crate::config::ClientConfig;
use crate::dedup::InFlight;
use crate::identity::IdentityStore;
use crate::model::{Entity, UserAccess};
use hbp_paging::{
    fetch_json, ChildrenLoader, ChildrenPage, ChildrenQuery, ChildrenSource, ErrorKind, HbpError,
    HbpResult, HttpClient, HttpRequest,
};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Kind of the error returned when an ancestor cannot be fetched.
pub const ANCESTOR_RETRIEVAL_ERROR: &str = "EntityAncestorRetrievalError";
/// Kind of the error returned when a created entity name is taken.
pub const FILE_ALREADY_EXISTS_ERROR: &str = "FileAlreadyExistError";
/// Kind of the error returned when an entity cannot be created.
pub const ENTITY_CREATION_ERROR: &str = "EntityCreationError";

/// Entities of the document service.
#[derive(Debug)]
pub struct EntityStore<C> {
    client: Arc<C>,
    base_url: String,
    identity: Option<Arc<IdentityStore<C>>>,
    in_flight: InFlight<Entity>,
}

impl<C: HttpClient> EntityStore<C> {
    /// Creates a store.
    pub fn new(client: Arc<C>, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.document_url.clone(),
            identity: None,
            in_flight: InFlight::new(),
        }
    }

    /// Uses `identity` for creator names and access rights.
    pub fn with_identity(mut self, identity: Arc<IdentityStore<C>>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Returns an entity. Concurrent calls for the same id share one request.
    pub async fn get(&self, id: &str) -> HbpResult<Entity> {
        let request = HttpRequest::get(format!("{}/entity/{id}", self.base_url));
        let key = request.signature();
        self.in_flight
            .run(&key, || fetch_json(self.client.as_ref(), request))
            .await
    }

    /// Queries entities by attributes or metadata.
    pub async fn query(&self, params: &[(&str, &str)]) -> HbpResult<Value> {
        let request = params.iter().fold(
            HttpRequest::get(format!("{}/entity/", self.base_url)),
            |request, (key, value)| request.with_query(*key, *value),
        );
        fetch_json(self.client.as_ref(), request).await
    }

    /// Returns the ancestors of `entity`, outermost first, excluding `entity`
    /// and `root`.
    pub async fn ancestors(&self, entity: &Entity, root: Option<&Entity>) -> HbpResult<Vec<Entity>> {
        let mut ancestors = Vec::new();
        let mut visited = HashSet::from([entity.uuid.clone()]);
        let mut parent = entity.parent.clone();

        while let Some(id) = parent {
            if root.is_some_and(|root| root.uuid == id) {
                break;
            }
            if !visited.insert(id.clone()) {
                return Err(HbpError::unexpected_result(format!(
                    "entity {} is its own ancestor",
                    id
                )));
            }
            let next = self
                .get(&id)
                .await
                .map_err(|cause| ancestor_error(entity, root, &cause))?;
            parent = next.parent.clone();
            ancestors.push(next);
        }

        ancestors.reverse();
        Ok(ancestors)
    }

    /// Returns the absolute path of `entity`, e.g. `/project/folder/file`.
    pub async fn path(&self, entity: &Entity) -> HbpResult<String> {
        let ancestors = self.ancestors(entity, None).await?;
        let mut path = String::new();
        for name in ancestors.iter().map(|a| a.name.as_str()).chain([entity.name.as_str()]) {
            path.push('/');
            path.push_str(name);
        }
        Ok(path)
    }

    /// Fetches one page of children.
    pub async fn children(&self, parent: &Entity, query: &ChildrenQuery) -> HbpResult<ChildrenPage<Entity>> {
        let request = HttpRequest::get(format!(
            "{}/{}/{}/children",
            self.base_url, parent.entity_type, parent.uuid
        ))
        .with_param("filter", query.entity_type_filter())
        .with_query("sort", query.sort_key())
        .with_param("from", query.from.clone())
        .with_param("until", query.until.clone());

        let mut page: ChildrenPage<Entity> = fetch_json(self.client.as_ref(), request).await?;
        debug!(parent = %parent.uuid, count = page.result.len(), has_more = page.has_more, "children page");
        if query.resolve_user_id {
            self.resolve_creators(&mut page.result).await;
        }
        Ok(page)
    }

    /// Creates a loader over the children of `parent`.
    pub fn loader(self: &Arc<Self>, parent: Entity, query: ChildrenQuery) -> ChildrenLoader<Self> {
        ChildrenLoader::new(Arc::clone(self), parent, query)
    }

    /// Fills `created_by_name`, falling back to the creator id.
    async fn resolve_creators(&self, entities: &mut [Entity]) {
        let ids: Vec<String> = entities.iter().filter_map(|e| e.created_by.clone()).collect();
        let users = match &self.identity {
            Some(identity) if !ids.is_empty() => match identity.users_by_id(&ids).await {
                Ok(users) => users,
                Err(error) => {
                    warn!(%error, "cannot resolve creator names");
                    HashMap::new()
                }
            },
            _ => HashMap::new(),
        };
        for entity in entities {
            if let Some(id) = &entity.created_by {
                let name = users
                    .get(id)
                    .map(|user| user.label().to_string())
                    .unwrap_or_else(|| id.clone());
                entity.created_by_name = Some(name);
            }
        }
    }

    /// Creates an entity of `entity_type` named `name` under `parent`.
    ///
    /// `extra` attributes are sent along. Failures are reported as
    /// `Aborted` when the service is unreachable, `FileAlreadyExistError`
    /// when the name is taken, and `EntityCreationError` otherwise.
    pub async fn create(
        &self,
        entity_type: &str,
        parent: Option<&str>,
        name: &str,
        extra: Map<String, Value>,
    ) -> HbpResult<Entity> {
        let kind = entity_type.split(':').next().unwrap_or(entity_type);
        let mut body = Map::new();
        body.insert("_name".into(), Value::String(name.to_string()));
        body.insert(
            "_parent".into(),
            parent.map_or(Value::Null, |p| Value::String(p.to_string())),
        );
        body.extend(extra);

        let request = HttpRequest::post(format!("{}/{kind}", self.base_url), Value::Object(body));
        fetch_json(self.client.as_ref(), request)
            .await
            .map_err(creation_error)
    }

    /// Adds metadata to `entity` and returns all its new metadata.
    pub async fn add_metadata(&self, entity: &Entity, metadata: Value) -> HbpResult<Value> {
        let request = HttpRequest::post(self.metadata_url(entity), metadata);
        fetch_json(self.client.as_ref(), request).await
    }

    /// Deletes metadata keys from `entity` and returns the remaining metadata.
    pub async fn delete_metadata(&self, entity: &Entity, keys: &[String]) -> HbpResult<Value> {
        let request = HttpRequest::delete(self.metadata_url(entity)).with_body(json!({ "keys": keys }));
        fetch_json(self.client.as_ref(), request).await
    }

    /// Returns the access rights of the current user on `entity`.
    pub async fn user_access(&self, entity: &Entity) -> HbpResult<UserAccess> {
        let identity = self
            .identity
            .as_ref()
            .ok_or_else(|| HbpError::missing_parameter("identity store"))?;
        let acl_request = HttpRequest::get(format!(
            "{}/{}/{}/acl",
            self.base_url, entity.entity_type, entity.uuid
        ));
        let (acl, user) = tokio::try_join!(
            fetch_json::<C, HashMap<String, String>>(self.client.as_ref(), acl_request),
            identity.current_user(),
        )?;

        let mut access = UserAccess::default();
        for (principal, level) in &acl {
            if user.is_principal(principal) {
                access.grant(level);
            }
        }
        Ok(access)
    }

    fn metadata_url(&self, entity: &Entity) -> String {
        format!(
            "{}/{}/{}/metadata",
            self.base_url, entity.entity_type, entity.uuid
        )
    }
}

impl<C: HttpClient> ChildrenSource for EntityStore<C> {
    type Parent = Entity;
    type Item = Entity;

    async fn children(&self, parent: &Entity, query: &ChildrenQuery) -> HbpResult<ChildrenPage<Entity>> {
        EntityStore::children(self, parent, query).await
    }
}

fn ancestor_error(entity: &Entity, root: Option<&Entity>, cause: &HbpError) -> HbpError {
    HbpError::new(
        ErrorKind::Remote(ANCESTOR_RETRIEVAL_ERROR.into()),
        format!("Cannot retrieve some ancestors from entity {}", entity.name),
    )
    .with_data(json!({
        "entity": entity.uuid,
        "root": root.map(|r| r.uuid.clone()),
        "cause": cause.to_string(),
    }))
    .with_code(cause.code)
}

fn creation_error(error: HbpError) -> HbpError {
    if error.code == 0 {
        return HbpError::new(ErrorKind::Aborted, "Network unreachable").with_code(0);
    }
    let kind = if error.message.contains("already exists") {
        FILE_ALREADY_EXISTS_ERROR
    } else {
        ENTITY_CREATION_ERROR
    };
    HbpError {
        kind: ErrorKind::Remote(kind.into()),
        ..error
    }
}
