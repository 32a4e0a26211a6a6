//! HTTP collaborator abstraction.
//!
//! Cursors, loaders and stores never talk to the network directly. They go
//! through [`HttpClient`], which lets the CLI plug in `reqwest` and tests plug
//! in [`MockHttpClient`].

use crate::error::{HbpError, HbpResult};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::future::Future;
use thiserror::Error;
use tracing::trace;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL, without the query string built from `query`.
    pub url: String,
    /// Query parameters, in order.
    pub query: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Creates a request.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Creates a POST request with a JSON body.
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, url).with_body(body)
    }

    /// Creates a PUT request with a JSON body.
    pub fn put(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, url).with_body(body)
    }

    /// Creates a DELETE request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    /// Sets the JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Appends a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends a query parameter when a value is present.
    pub fn with_param<V: Into<String>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with_query(key, value),
            None => self,
        }
    }

    /// Returns a signature identifying identical requests: `"GET url?k=v"`.
    pub fn signature(&self) -> String {
        let mut signature = format!("{} {}", self.method.as_str(), self.url);
        for (i, (key, value)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            let _ = write!(signature, "{sep}{key}={value}");
        }
        signature
    }
}

/// A response received from the server, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status.
    pub status: u16,
    /// `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response with a raw body.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: None,
            body,
        }
    }

    /// Creates a JSON response.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            content_type: Some("application/json".into()),
            body: body.to_string().into_bytes(),
        }
    }

    /// Sets the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true if the body is HTML.
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("text/html"))
    }

    /// Decodes the body as JSON. An empty body decodes as `null`.
    pub fn json_body<T: DeserializeOwned>(&self) -> HbpResult<T> {
        if self.body.is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// A request that never produced a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transport error: {message}")]
pub struct TransportError {
    /// Error message.
    pub message: String,
}

impl TransportError {
    /// Creates a transport error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// HTTP client abstraction.
///
/// Implementations only move bytes: any response, including 4xx/5xx, is
/// returned as `Ok`. Status interpretation happens in [`HbpError::from_response`].
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// Sends `request` and decodes a successful JSON response.
///
/// Transport failures and non-2xx statuses are normalized into [`HbpError`].
pub async fn fetch_json<C, T>(client: &C, request: HttpRequest) -> HbpResult<T>
where
    C: HttpClient,
    T: DeserializeOwned,
{
    let response = client
        .send(request)
        .await
        .map_err(|e| HbpError::from_transport(&e))?;
    if !response.is_success() {
        return Err(HbpError::from_response(&response));
    }
    response.json_body()
}

#[derive(Debug, Clone)]
enum MockReply {
    Response(HttpResponse),
    Failure(TransportError),
}

/// A scripted HTTP client for tests.
///
/// Replies are registered per request signature (see
/// [`HttpRequest::signature`]). Queued replies are consumed in order and the
/// last one keeps being served. Unknown signatures get a 404.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    routes: Mutex<HashMap<String, VecDeque<MockReply>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    /// Creates a new mock client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for `signature`.
    pub fn respond(&self, signature: impl Into<String>, response: HttpResponse) {
        self.push(signature.into(), MockReply::Response(response));
    }

    /// Queues a 200 JSON response for `signature`.
    pub fn respond_json(&self, signature: impl Into<String>, body: Value) {
        self.respond(signature, HttpResponse::json(200, &body));
    }

    /// Queues a transport failure for `signature`.
    pub fn fail(&self, signature: impl Into<String>, message: impl Into<String>) {
        self.push(
            signature.into(),
            MockReply::Failure(TransportError::new(message)),
        );
    }

    /// Returns every request sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Returns the signatures of every request sent so far.
    pub fn signatures(&self) -> Vec<String> {
        self.requests.lock().iter().map(HttpRequest::signature).collect()
    }

    /// Returns the number of requests sent so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn push(&self, signature: String, reply: MockReply) {
        self.routes
            .lock()
            .entry(signature)
            .or_default()
            .push_back(reply);
    }

    fn reply_for(&self, signature: &str) -> Option<MockReply> {
        let mut routes = self.routes.lock();
        let queue = routes.get_mut(signature)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl HttpClient for MockHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let signature = request.signature();
        trace!(%signature, "mock request");
        self.requests.lock().push(request);

        // Give other tasks a chance to run, like a real network round trip would.
        tokio::task::yield_now().await;

        match self.reply_for(&signature) {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::Failure(error)) => Err(error),
            None => Ok(HttpResponse::new(404, Vec::new())),
        }
    }
}
