//! Children loader keyed by sibling ids.
//!
//! The document service pages the children of a folder with sibling anchors
//! instead of URLs: `from=<id>` returns the page starting at `id` (inclusive)
//! and `until=<id>` the page ending at `id` (inclusive). Each page therefore
//! repeats one element already loaded, which the loader removes.

use crate::config::ErrorHook;
use crate::error::{HbpError, HbpResult};
use crate::queue::OpQueue;
use crate::state::{Direction, LoadState, LoadingGuard};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Items identified by a sibling id.
pub trait Keyed {
    /// Returns the id of this item, if it has one.
    fn key(&self) -> Option<&str>;
}

impl Keyed for Value {
    fn key(&self) -> Option<&str> {
        self.get("_uuid").and_then(Value::as_str)
    }
}

/// Which linked entity types are accepted next to `accept`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AcceptLink {
    /// No links.
    #[default]
    None,
    /// Links to any of the accepted types.
    SameAsAccept,
    /// Links to these types.
    Types(Vec<String>),
}

/// Options of a children request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildrenQuery {
    /// Accepted `_entityType` values. Empty accepts everything.
    pub accept: Vec<String>,
    /// Accepted link types.
    pub accept_link: AcceptLink,
    /// Sort property, `_name` when unset.
    pub sort: Option<String>,
    /// Fill `_createdByName` from the identity service.
    pub resolve_user_id: bool,
    /// Start the page at this sibling id.
    pub from: Option<String>,
    /// End the page at this sibling id.
    pub until: Option<String>,
}

impl ChildrenQuery {
    /// Creates a query accepting every child.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the accepted entity types.
    pub fn with_accept<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accept = types.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the accepted link types.
    pub fn with_accept_link(mut self, accept_link: AcceptLink) -> Self {
        self.accept_link = accept_link;
        self
    }

    /// Sets the sort property.
    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Enables creator name resolution.
    pub fn with_resolve_user_id(mut self, resolve: bool) -> Self {
        self.resolve_user_id = resolve;
        self
    }

    /// Sets the `from` anchor.
    pub fn with_from(mut self, id: impl Into<String>) -> Self {
        self.from = Some(id.into());
        self
    }

    /// Sets the `until` anchor.
    pub fn with_until(mut self, id: impl Into<String>) -> Self {
        self.until = Some(id.into());
        self
    }

    /// Returns a copy without `from` and `until`.
    pub fn without_anchors(&self) -> Self {
        Self {
            from: None,
            until: None,
            ..self.clone()
        }
    }

    /// Sort property sent to the service.
    pub fn sort_key(&self) -> &str {
        self.sort.as_deref().unwrap_or("_name")
    }

    /// Builds the `filter` parameter: `_entityType=a+b+link:a`.
    pub fn entity_type_filter(&self) -> Option<String> {
        let links: &[String] = match &self.accept_link {
            AcceptLink::None => &[],
            AcceptLink::SameAsAccept => &self.accept,
            AcceptLink::Types(types) => types,
        };
        let types: Vec<String> = self
            .accept
            .iter()
            .cloned()
            .chain(links.iter().map(|t| format!("link:{t}")))
            .collect();
        (!types.is_empty()).then(|| format!("_entityType={}", types.join("+")))
    }
}

/// One page of children as returned by the document service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChildrenPage<T> {
    /// Page items.
    #[serde(default = "Vec::new")]
    pub result: Vec<T>,
    /// More children after this page.
    #[serde(default, rename = "hasMore")]
    pub has_more: bool,
    /// More children before this page.
    #[serde(default, rename = "hasPrevious")]
    pub has_previous: bool,
}

impl<T> ChildrenPage<T> {
    /// Creates a page.
    pub fn new(result: Vec<T>, has_more: bool, has_previous: bool) -> Self {
        Self {
            result,
            has_more,
            has_previous,
        }
    }
}

/// Source of children pages.
pub trait ChildrenSource: Send + Sync {
    /// Parent handle.
    type Parent: Send + Sync;
    /// Child item.
    type Item: Keyed + Send + Sync;

    /// Fetches one page of the children of `parent`.
    fn children(
        &self,
        parent: &Self::Parent,
        query: &ChildrenQuery,
    ) -> impl Future<Output = HbpResult<ChildrenPage<Self::Item>>> + Send;
}

struct LoaderState<T> {
    entities: Vec<T>,
    loaded: bool,
    has_next: bool,
    has_previous: bool,
    error: Option<HbpError>,
    state: LoadState,
}

impl<T> LoaderState<T> {
    fn state_mut(&mut self) -> &mut LoadState {
        &mut self.state
    }
}

/// Incremental loader over the children of one parent.
///
/// The first page is requested with the query as given; `next` and
/// `previous` reuse it without its anchors.
pub struct ChildrenLoader<S: ChildrenSource> {
    source: Arc<S>,
    parent: S::Parent,
    initial: ChildrenQuery,
    filter: ChildrenQuery,
    page: RwLock<LoaderState<S::Item>>,
    queue: OpQueue,
    error_hook: Option<ErrorHook>,
}

impl<S: ChildrenSource> ChildrenLoader<S> {
    /// Creates a loader. The first page is fetched by the first operation.
    pub fn new(source: Arc<S>, parent: S::Parent, query: ChildrenQuery) -> Self {
        Self {
            source,
            parent,
            filter: query.without_anchors(),
            initial: query,
            page: RwLock::new(LoaderState {
                entities: Vec::new(),
                loaded: false,
                has_next: false,
                has_previous: false,
                error: None,
                state: LoadState::Loading,
            }),
            queue: OpQueue::new(),
            error_hook: None,
        }
    }

    /// Calls `hook` with every error recorded on this loader.
    pub fn with_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HbpError) + Send + Sync + 'static,
    {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    /// Creates a loader and waits for its first page.
    pub async fn load(source: Arc<S>, parent: S::Parent, query: ChildrenQuery) -> HbpResult<Self> {
        let loader = Self::new(source, parent, query);
        loader.ready().await?;
        Ok(loader)
    }

    /// Parent whose children are loaded.
    pub fn parent(&self) -> &S::Parent {
        &self.parent
    }

    /// Query used for `next` and `previous`.
    pub fn query(&self) -> &ChildrenQuery {
        &self.filter
    }

    /// Number of loaded children.
    pub fn len(&self) -> usize {
        self.page.read().entities.len()
    }

    /// Returns true if no child was loaded.
    pub fn is_empty(&self) -> bool {
        self.page.read().entities.is_empty()
    }

    /// Returns true if more children follow.
    pub fn has_next(&self) -> bool {
        self.page.read().has_next
    }

    /// Returns true if more children precede.
    pub fn has_previous(&self) -> bool {
        self.page.read().has_previous
    }

    /// Error of the last failed operation.
    pub fn error(&self) -> Option<HbpError> {
        self.page.read().error.clone()
    }

    /// Current load state.
    pub fn state(&self) -> LoadState {
        self.page.read().state
    }

    /// Returns true once the first page was loaded.
    pub fn is_loaded(&self) -> bool {
        self.page.read().loaded
    }

    /// Runs `f` over the loaded children.
    pub fn with_entities<R>(&self, f: impl FnOnce(&[S::Item]) -> R) -> R {
        f(&self.page.read().entities)
    }

    /// Returns a copy of the loaded children.
    pub fn entities(&self) -> Vec<S::Item>
    where
        S::Item: Clone,
    {
        self.page.read().entities.clone()
    }

    /// Returns the ids of the loaded children.
    pub fn keys(&self) -> Vec<String> {
        self.page
            .read()
            .entities
            .iter()
            .filter_map(|e| e.key().map(str::to_owned))
            .collect()
    }

    /// Resolves once the first page is loaded.
    pub fn ready(&self) -> impl Future<Output = HbpResult<&Self>> + Send + '_ {
        let slot = self.queue.enqueue();
        async move {
            slot.acquired().await;
            self.ensure_loaded().await.map(|()| self)
        }
    }

    /// Loads the children following the last loaded one.
    ///
    /// Fails with `EndOfList`, without any request, when no child follows;
    /// that condition is neither recorded nor passed to the error hook.
    pub fn next(&self) -> impl Future<Output = HbpResult<&Self>> + Send + '_ {
        let slot = self.queue.enqueue();
        async move {
            slot.acquired().await;
            self.step(Direction::Next).await.map(|()| self)
        }
    }

    /// Loads the children preceding the first loaded one.
    pub fn previous(&self) -> impl Future<Output = HbpResult<&Self>> + Send + '_ {
        let slot = self.queue.enqueue();
        async move {
            slot.acquired().await;
            self.step(Direction::Previous).await.map(|()| self)
        }
    }

    async fn ensure_loaded(&self) -> HbpResult<()> {
        if self.page.read().loaded {
            return Ok(());
        }
        let loading = LoadingGuard::enter(&self.page, LoaderState::state_mut);
        debug!(query = ?self.initial, "loading children");

        let fetched = self.source.children(&self.parent, &self.initial).await;
        loading.settled();
        match fetched {
            Ok(page) => {
                let mut state = self.page.write();
                state.entities = page.result;
                state.has_next = page.has_more;
                state.has_previous = page.has_previous;
                state.loaded = true;
                state.state = LoadState::Ready;
                state.error = None;
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    async fn step(&self, direction: Direction) -> HbpResult<()> {
        self.ensure_loaded().await?;

        let anchor = {
            let page = self.page.read();
            let (available, edge) = match direction {
                Direction::Next => (page.has_next, page.entities.last()),
                Direction::Previous => (page.has_previous, page.entities.first()),
            };
            if !available {
                return Err(HbpError::end_of_list());
            }
            edge.and_then(Keyed::key).map(str::to_owned)
        };
        let Some(anchor) = anchor else {
            return Err(self.fail(HbpError::invalid_envelope(
                "no loaded child carries an id to page from",
            )));
        };

        let query = match direction {
            Direction::Next => self.filter.clone().with_from(anchor.as_str()),
            Direction::Previous => self.filter.clone().with_until(anchor.as_str()),
        };
        let loading = LoadingGuard::enter(&self.page, LoaderState::state_mut);
        debug!(?direction, %anchor, "loading children page");

        let fetched = self.source.children(&self.parent, &query).await;
        loading.settled();
        let outcome = match fetched {
            Ok(page) => self.merge(direction, &anchor, page),
            Err(error) => Err(error),
        };
        outcome.map_err(|error| self.fail(error))
    }

    /// Drops the boundary element shared with the loaded edge, then merges.
    fn merge(
        &self,
        direction: Direction,
        anchor: &str,
        page: ChildrenPage<S::Item>,
    ) -> HbpResult<()> {
        let mut items = page.result;
        let boundary = match direction {
            Direction::Next => items.first(),
            Direction::Previous => items.last(),
        };
        if boundary.and_then(Keyed::key) != Some(anchor) {
            return Err(HbpError::invalid_envelope(format!(
                "children page does not start or end at `{anchor}`"
            ))
            .with_data(Value::String(anchor.to_owned())));
        }

        let mut state = self.page.write();
        match direction {
            Direction::Next => {
                items.remove(0);
                state.entities.extend(items);
                state.has_next = page.has_more;
            }
            Direction::Previous => {
                items.pop();
                let tail = std::mem::replace(&mut state.entities, items);
                state.entities.extend(tail);
                state.has_previous = page.has_previous;
            }
        }
        state.state = LoadState::Ready;
        state.error = None;
        Ok(())
    }

    fn fail(&self, error: HbpError) -> HbpError {
        {
            let mut state = self.page.write();
            state.state = LoadState::Error;
            state.error = Some(error.clone());
        }
        warn!(kind = %error.kind, code = error.code, "children request failed: {}", error.message);
        if let Some(hook) = &self.error_hook {
            hook(&error);
        }
        error
    }
}

impl<S: ChildrenSource> fmt::Debug for ChildrenLoader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let page = self.page.read();
        f.debug_struct("ChildrenLoader")
            .field("query", &self.filter)
            .field("len", &page.entities.len())
            .field("has_next", &page.has_next)
            .field("has_previous", &page.has_previous)
            .field("state", &page.state)
            .finish()
    }
}
