//! Configuration for result-set cursors.

use crate::error::HbpError;
use std::fmt;
use std::sync::Arc;

/// Callback invoked with every error recorded on a cursor.
pub type ErrorHook = Arc<dyn Fn(&HbpError) + Send + Sync>;

/// Default name of the envelope field holding the page items.
pub const DEFAULT_RESULT_KEY: &str = "results";
/// Default name of the envelope field holding the next page URL.
pub const DEFAULT_NEXT_KEY: &str = "next";
/// Default name of the envelope field holding the previous page URL.
pub const DEFAULT_PREVIOUS_KEY: &str = "previous";
/// Name of the envelope field holding the collection total.
pub const COUNT_KEY: &str = "count";

/// Configuration of a [`ResultSet`](crate::ResultSet).
#[derive(Clone)]
pub struct ResultSetOptions {
    /// Envelope field holding the page items.
    pub result_key: String,
    /// Envelope field holding the next page URL.
    pub next_key: String,
    /// Envelope field holding the previous page URL.
    pub previous_key: String,
    /// Invoked whenever an operation fails.
    pub error_hook: Option<ErrorHook>,
}

impl ResultSetOptions {
    /// Creates options with the default field names.
    pub fn new() -> Self {
        Self {
            result_key: DEFAULT_RESULT_KEY.into(),
            next_key: DEFAULT_NEXT_KEY.into(),
            previous_key: DEFAULT_PREVIOUS_KEY.into(),
            error_hook: None,
        }
    }

    /// Sets the field holding the page items.
    pub fn with_result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = key.into();
        self
    }

    /// Sets the field holding the next page URL.
    pub fn with_next_key(mut self, key: impl Into<String>) -> Self {
        self.next_key = key.into();
        self
    }

    /// Sets the field holding the previous page URL.
    pub fn with_previous_key(mut self, key: impl Into<String>) -> Self {
        self.previous_key = key.into();
        self
    }

    /// Sets the error hook.
    pub fn with_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HbpError) + Send + Sync + 'static,
    {
        self.error_hook = Some(Arc::new(hook));
        self
    }
}

impl Default for ResultSetOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResultSetOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSetOptions")
            .field("result_key", &self.result_key)
            .field("next_key", &self.next_key)
            .field("previous_key", &self.previous_key)
            .field("error_hook", &self.error_hook.is_some())
            .finish()
    }
}
