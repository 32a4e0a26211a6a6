//! # HBP Paging
//!
//! Paginated cursors over the HBP collaboratory REST services.
//!
//! This crate provides:
//! - `ResultSet`, a cursor over `{results, next, previous, count}` envelopes
//! - `ChildrenLoader`, a loader over sibling-id paged children
//! - A FIFO operation queue serializing the requests of one cursor
//! - HTTP failure normalization into `HbpError`
//! - The `HttpClient` abstraction and a scripted mock
//!
//! ## Key Invariants
//!
//! - Items are kept in page order, each page merged exactly once
//! - At most one request in flight per cursor, operations run in call order
//! - A failed operation leaves the accumulated items untouched
//! - `EndOfList` never issues a request

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod children;
mod config;
mod error;
mod queue;
mod result_set;
mod state;
mod transport;

pub use children::{AcceptLink, ChildrenLoader, ChildrenPage, ChildrenQuery, ChildrenSource, Keyed};
pub use config::{
    ErrorHook, ResultSetOptions, COUNT_KEY, DEFAULT_NEXT_KEY, DEFAULT_PREVIOUS_KEY,
    DEFAULT_RESULT_KEY,
};
pub use error::{ErrorKind, HbpError, HbpResult};
pub use queue::{OpQueue, Slot};
pub use result_set::ResultSet;
pub use state::{Direction, LoadState};
pub use transport::{
    fetch_json, HttpClient, HttpRequest, HttpResponse, Method, MockHttpClient, TransportError,
};
