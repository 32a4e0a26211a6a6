//! `reqwest` transport.

use hbp_client::ClientConfig;
use hbp_paging::{HttpClient, HttpRequest, HttpResponse, Method, TransportError};
use reqwest::header::CONTENT_TYPE;
use tracing::trace;

/// [`HttpClient`] backed by an async `reqwest` client.
///
/// Every request carries the configured bearer token, if any.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    token: Option<String>,
}

impl ReqwestClient {
    /// Builds a client with the timeout, user agent and token of `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            token: config.token.clone(),
        })
    }
}

impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        trace!(signature = %request.signature(), "sending request");
        let mut builder = self
            .client
            .request(method(request.method), &request.url)
            .query(&request.query);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::new(format!("cannot read body: {e}")))?;

        let reply = HttpResponse::new(status, body.to_vec());
        Ok(match content_type {
            Some(content_type) => reply.with_content_type(content_type),
            None => reply,
        })
    }
}

fn method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}
