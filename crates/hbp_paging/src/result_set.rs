//! Paginated cursor over a server-side collection.
//!
//! A [`ResultSet`] accumulates the pages of a REST collection whose envelopes
//! look like `{results: [...], next: "url", previous: "url", count: n}`.
//! Pages are fetched on demand with [`ResultSet::next`] and
//! [`ResultSet::previous`]; operations on one cursor run strictly in call
//! order, one request at a time.

use crate::config::{ResultSetOptions, COUNT_KEY};
use crate::error::{HbpError, HbpResult};
use crate::queue::OpQueue;
use crate::state::{Direction, LoadState, LoadingGuard};
use crate::transport::{fetch_json, HttpClient, HttpRequest, HttpResponse};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a fetched page is combined with the accumulated items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    Replace,
    Append,
    Prepend,
}

struct PageState<T> {
    results: Vec<T>,
    /// Request for the first page, kept until it succeeds.
    initial: Option<HttpRequest>,
    loaded: bool,
    next_url: Option<String>,
    previous_url: Option<String>,
    has_next: Option<bool>,
    has_previous: Option<bool>,
    count: i64,
    error: Option<HbpError>,
    state: LoadState,
}

impl<T> PageState<T> {
    fn new(initial: Option<HttpRequest>) -> Self {
        Self {
            results: Vec::new(),
            initial,
            loaded: false,
            next_url: None,
            previous_url: None,
            has_next: None,
            has_previous: None,
            count: -1,
            error: None,
            state: LoadState::Loading,
        }
    }

    fn state_mut(&mut self) -> &mut LoadState {
        &mut self.state
    }

    fn bind_next(&mut self, body: &Value, key: &str) {
        self.next_url = locator(body, key);
        self.has_next = Some(self.next_url.is_some());
    }

    fn bind_previous(&mut self, body: &Value, key: &str) {
        self.previous_url = locator(body, key);
        self.has_previous = Some(self.previous_url.is_some());
    }

    fn bind_count(&mut self, body: &Value) {
        if let Some(count) = body.get(COUNT_KEY).and_then(Value::as_i64) {
            self.count = count;
        }
    }
}

fn locator(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_owned)
}

/// A growable view over a server-paginated collection.
///
/// The first page is requested by the first queued operation
/// ([`ready`](Self::ready), [`next`](Self::next) or
/// [`previous`](Self::previous)). Until it succeeds, every operation first
/// retries it.
pub struct ResultSet<C, T = Value> {
    client: Arc<C>,
    options: ResultSetOptions,
    page: RwLock<PageState<T>>,
    queue: OpQueue,
}

impl<C, T> ResultSet<C, T> {
    /// Returns the options.
    pub fn options(&self) -> &ResultSetOptions {
        &self.options
    }

    /// Number of accumulated items.
    pub fn len(&self) -> usize {
        self.page.read().results.len()
    }

    /// Returns true if no item was accumulated.
    pub fn is_empty(&self) -> bool {
        self.page.read().results.is_empty()
    }

    /// Returns true if a next page is available.
    pub fn has_next(&self) -> bool {
        self.page.read().has_next.unwrap_or(false)
    }

    /// Returns true if a previous page is available.
    pub fn has_previous(&self) -> bool {
        self.page.read().has_previous.unwrap_or(false)
    }

    /// Returns true once the first page was loaded.
    pub fn is_loaded(&self) -> bool {
        self.page.read().loaded
    }

    /// Last total reported by the server, or -1 if it never reported one.
    pub fn count(&self) -> i64 {
        self.page.read().count
    }

    /// Error of the last failed operation, cleared by the next success.
    pub fn error(&self) -> Option<HbpError> {
        self.page.read().error.clone()
    }

    /// Current load state.
    pub fn state(&self) -> LoadState {
        self.page.read().state
    }

    /// URL of the next page.
    pub fn next_url(&self) -> Option<String> {
        self.page.read().next_url.clone()
    }

    /// URL of the previous page.
    pub fn previous_url(&self) -> Option<String> {
        self.page.read().previous_url.clone()
    }

    /// Number of operations waiting for or running on this cursor.
    pub fn pending_operations(&self) -> u64 {
        self.queue.pending()
    }

    /// Runs `f` over the accumulated items without cloning them.
    pub fn with_results<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.page.read().results)
    }

    /// Returns a copy of the accumulated items.
    pub fn results(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.page.read().results.clone()
    }

    /// Consumes the cursor and returns the accumulated items.
    pub fn into_results(self) -> Vec<T> {
        self.page.into_inner().results
    }
}

impl<C, T> ResultSet<C, T>
where
    C: HttpClient,
    T: DeserializeOwned + Send + Sync,
{
    /// Creates a cursor whose first page is fetched with `request`.
    pub fn new(client: Arc<C>, request: HttpRequest, options: ResultSetOptions) -> Self {
        Self::with_page(client, options, PageState::new(Some(request)))
    }

    /// Creates a cursor from an already received first page.
    ///
    /// A failed response yields a cursor in the [`LoadState::Error`] state
    /// carrying the normalized error.
    pub fn from_response(
        client: Arc<C>,
        response: &HttpResponse,
        options: ResultSetOptions,
    ) -> Self {
        let set = Self::with_page(client, options, PageState::new(None));
        let outcome = if response.is_success() {
            response
                .json_body::<Value>()
                .and_then(|body| set.merge(Merge::Replace, &body))
        } else {
            Err(HbpError::from_response(response))
        };
        match outcome {
            Ok(()) => set.settle(),
            Err(error) => {
                set.fail(error);
            }
        }
        set
    }

    /// Creates a cursor and waits for its first page.
    pub async fn paginated(
        client: Arc<C>,
        request: HttpRequest,
        options: ResultSetOptions,
    ) -> HbpResult<Self> {
        let set = Self::new(client, request, options);
        set.ready().await?;
        Ok(set)
    }

    fn with_page(client: Arc<C>, options: ResultSetOptions, page: PageState<T>) -> Self {
        Self {
            client,
            options,
            page: RwLock::new(page),
            queue: OpQueue::new(),
        }
    }

    /// Resolves once the first page is loaded.
    pub fn ready(&self) -> impl Future<Output = HbpResult<&Self>> + Send + '_ {
        let slot = self.queue.enqueue();
        async move {
            slot.acquired().await;
            self.ensure_loaded().await.map(|()| self)
        }
    }

    /// Fetches the next page and appends its items.
    ///
    /// Fails with `EndOfList`, without any request, when there is no next
    /// page. That condition is not recorded in [`error`](Self::error) and
    /// does not reach the error hook. Resolves to the cursor itself so calls
    /// can be chained.
    pub fn next(&self) -> impl Future<Output = HbpResult<&Self>> + Send + '_ {
        self.enqueue_step(Direction::Next)
    }

    /// Fetches the previous page and prepends its items.
    ///
    /// Fails with `EndOfList` like [`next`](Self::next) at the start of the
    /// collection.
    pub fn previous(&self) -> impl Future<Output = HbpResult<&Self>> + Send + '_ {
        self.enqueue_step(Direction::Previous)
    }

    fn enqueue_step(
        &self,
        direction: Direction,
    ) -> impl Future<Output = HbpResult<&Self>> + Send + '_ {
        // The slot is taken now so operations keep their call order.
        let slot = self.queue.enqueue();
        async move {
            slot.acquired().await;
            self.step(direction).await.map(|()| self)
        }
    }

    async fn ensure_loaded(&self) -> HbpResult<()> {
        let request = {
            let page = self.page.read();
            if page.loaded {
                return Ok(());
            }
            match &page.initial {
                Some(request) => request.clone(),
                None => {
                    return Err(page.error.clone().unwrap_or_else(|| {
                        HbpError::invalid_envelope("no first page available")
                    }))
                }
            }
        };
        self.load(request, Merge::Replace).await
    }

    async fn step(&self, direction: Direction) -> HbpResult<()> {
        self.ensure_loaded().await?;

        let url = {
            let page = self.page.read();
            let (available, url) = match direction {
                Direction::Next => (page.has_next, &page.next_url),
                Direction::Previous => (page.has_previous, &page.previous_url),
            };
            match url {
                Some(url) if available == Some(true) => url.clone(),
                _ => return Err(HbpError::end_of_list()),
            }
        };

        let merge = match direction {
            Direction::Next => Merge::Append,
            Direction::Previous => Merge::Prepend,
        };
        self.load(HttpRequest::get(url), merge).await
    }

    async fn load(&self, request: HttpRequest, merge: Merge) -> HbpResult<()> {
        let loading = LoadingGuard::enter(&self.page, PageState::state_mut);
        debug!(url = %request.url, ?merge, "fetching page");

        let fetched = fetch_json::<C, Value>(self.client.as_ref(), request).await;
        loading.settled();
        let outcome = match fetched {
            Ok(body) => self.merge(merge, &body),
            Err(error) => Err(error),
        };
        match outcome {
            Ok(()) => {
                self.settle();
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Decodes the page items first so a bad page leaves the cursor untouched.
    fn merge(&self, merge: Merge, body: &Value) -> HbpResult<()> {
        let items = self.decode_items(body)?;
        let mut page = self.page.write();
        match merge {
            Merge::Replace => {
                page.results = items;
                page.bind_next(body, &self.options.next_key);
                page.bind_previous(body, &self.options.previous_key);
                page.initial = None;
                page.loaded = true;
            }
            Merge::Append => {
                page.results.extend(items);
                page.bind_next(body, &self.options.next_key);
            }
            Merge::Prepend => {
                let tail = std::mem::replace(&mut page.results, items);
                page.results.extend(tail);
                page.bind_previous(body, &self.options.previous_key);
            }
        }
        page.bind_count(body);
        Ok(())
    }

    fn decode_items(&self, body: &Value) -> HbpResult<Vec<T>> {
        let key = &self.options.result_key;
        let Some(envelope) = body.as_object() else {
            return Err(HbpError::invalid_envelope(
                "page envelope is not a JSON object",
            ));
        };
        match envelope.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(items @ Value::Array(_)) => serde_json::from_value(items.clone()).map_err(|e| {
                HbpError::invalid_envelope(format!("cannot decode `{key}` items: {e}"))
            }),
            Some(_) => Err(HbpError::invalid_envelope(format!(
                "envelope field `{key}` is not an array"
            ))),
        }
    }

    fn settle(&self) {
        let mut page = self.page.write();
        page.state = LoadState::Ready;
        page.error = None;
    }

    fn fail(&self, error: HbpError) -> HbpError {
        {
            let mut page = self.page.write();
            page.state = LoadState::Error;
            page.error = Some(error.clone());
        }
        warn!(kind = %error.kind, code = error.code, "result set request failed: {}", error.message);
        if let Some(hook) = &self.options.error_hook {
            hook(&error);
        }
        error
    }
}

impl<C, T> fmt::Debug for ResultSet<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let page = self.page.read();
        f.debug_struct("ResultSet")
            .field("len", &page.results.len())
            .field("has_next", &page.has_next)
            .field("has_previous", &page.has_previous)
            .field("count", &page.count)
            .field("state", &page.state)
            .field("error", &page.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transport::MockHttpClient;
    use serde::Deserialize;
    use serde_json::json;

    fn from_body(body: Value) -> ResultSet<MockHttpClient> {
        ResultSet::from_response(
            Arc::new(MockHttpClient::new()),
            &HttpResponse::json(200, &body),
            ResultSetOptions::default(),
        )
    }

    #[test]
    fn first_page_from_response() {
        let set = from_body(json!({"results": [1, 2], "next": "u2", "previous": null, "count": 5}));
        assert!(set.is_loaded());
        assert!(set.has_next());
        assert!(!set.has_previous());
        assert_eq!(set.count(), 5);
        assert_eq!(set.results(), vec![json!(1), json!(2)]);
        assert_eq!(set.state(), LoadState::Ready);
        assert_eq!(set.next_url().as_deref(), Some("u2"));
    }

    #[test]
    fn missing_count_is_unknown() {
        let set = from_body(json!({"results": []}));
        assert_eq!(set.count(), -1);
        assert!(set.is_empty());
        assert!(!set.has_next());
    }

    #[test]
    fn empty_locator_means_no_page() {
        let set = from_body(json!({"results": [1], "next": "", "previous": "p"}));
        assert!(!set.has_next());
        assert!(set.has_previous());
    }

    #[test]
    fn non_array_results_are_rejected() {
        let set = from_body(json!({"results": {"a": 1}}));
        assert!(!set.is_loaded());
        assert_eq!(set.state(), LoadState::Error);
        assert_eq!(set.error().unwrap().kind, ErrorKind::InvalidEnvelope);
    }

    #[test]
    fn failed_response_yields_error_state() {
        let set: ResultSet<MockHttpClient> = ResultSet::from_response(
            Arc::new(MockHttpClient::new()),
            &HttpResponse::json(500, &json!({"message": "db down"})),
            ResultSetOptions::default(),
        );
        let error = set.error().unwrap();
        assert_eq!(error.code, 500);
        assert_eq!(error.message, "db down");
        assert!(set.is_empty());
    }

    #[test]
    fn typed_items() {
        #[derive(Debug, Clone, Deserialize, PartialEq)]
        struct Member {
            id: String,
        }

        let set: ResultSet<MockHttpClient, Member> = ResultSet::from_response(
            Arc::new(MockHttpClient::new()),
            &HttpResponse::json(200, &json!({"result": [{"id": "a"}, {"id": "b"}]})),
            ResultSetOptions::new().with_result_key("result"),
        );
        let ids: Vec<String> = set.with_results(|members| members.iter().map(|m| m.id.clone()).collect());
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn items_that_do_not_decode_are_rejected() {
        let set: ResultSet<MockHttpClient, u32> = ResultSet::from_response(
            Arc::new(MockHttpClient::new()),
            &HttpResponse::json(200, &json!({"results": ["x"]})),
            ResultSetOptions::default(),
        );
        assert_eq!(set.error().unwrap().kind, ErrorKind::InvalidEnvelope);
    }

    #[tokio::test]
    async fn ready_after_failed_response_reports_the_error() {
        let set: ResultSet<MockHttpClient> = ResultSet::from_response(
            Arc::new(MockHttpClient::new()),
            &HttpResponse::new(404, Vec::new()),
            ResultSetOptions::default(),
        );
        let error = set.ready().await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::NotFound);
    }
}
