//! In-flight request deduplication.
//!
//! While a request for a key is running, later calls with the same key wait
//! for its outcome instead of sending their own. The entry is removed as soon
//! as the request completes, or when its future is dropped; waiters of an
//! abandoned request fail with `Aborted`.

use hbp_paging::{ErrorKind, HbpError, HbpResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::watch;
use tracing::trace;

type Outcome<V> = Option<HbpResult<V>>;

/// Map of running requests keyed by request signature.
#[derive(Debug)]
pub struct InFlight<V> {
    pending: Mutex<HashMap<String, watch::Receiver<Outcome<V>>>>,
}

enum Role<V> {
    Leader(watch::Sender<Outcome<V>>),
    Follower(watch::Receiver<Outcome<V>>),
}

/// Removes the entry of a leader, whatever happens to its future.
struct Entry<'a, V> {
    map: &'a InFlight<V>,
    key: &'a str,
}

impl<V> Drop for Entry<'_, V> {
    fn drop(&mut self) {
        self.map.pending.lock().remove(self.key);
    }
}

impl<V> InFlight<V>
where
    V: Clone + Send + Sync,
{
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Number of running requests.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns true if no request is running.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Runs `fetch` unless a request for `key` is already running, in which
    /// case its outcome is shared.
    pub async fn run<F, Fut>(&self, key: &str, fetch: F) -> HbpResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HbpResult<V>>,
    {
        let role = {
            let mut pending = self.pending.lock();
            match pending.get(key) {
                Some(receiver) => Role::Follower(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    pending.insert(key.to_owned(), receiver);
                    Role::Leader(sender)
                }
            }
        };

        match role {
            Role::Leader(sender) => {
                let entry = Entry { map: self, key };
                let outcome = fetch().await;
                drop(entry);
                // Nobody waiting is fine.
                let _ = sender.send(Some(outcome.clone()));
                outcome
            }
            Role::Follower(mut receiver) => {
                trace!(%key, "joining in-flight request");
                match receiver.wait_for(Option::is_some).await {
                    Ok(outcome) => outcome.clone().unwrap_or_else(|| Err(abandoned(key))),
                    Err(_) => Err(abandoned(key)),
                }
            }
        }
    }
}

impl<V> Default for InFlight<V>
where
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

fn abandoned(key: &str) -> HbpError {
    HbpError::new(ErrorKind::Aborted, format!("request abandoned: {key}")).with_code(0)
}
