//! Load state shared by cursors and loaders.

use parking_lot::RwLock;

/// The state of a cursor or loader.
///
/// `Loading → Ready` on success, `Loading → Error` on failure, and back to
/// `Loading` on each new page request. `Error` is not terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// A page request is in flight, or the first page was not loaded yet.
    #[default]
    Loading,
    /// The last operation succeeded.
    Ready,
    /// The last operation failed.
    Error,
}

impl LoadState {
    /// Returns true if no request is in flight.
    pub fn is_settled(&self) -> bool {
        matches!(self, LoadState::Ready | LoadState::Error)
    }

    /// Returns the lowercase name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Loading => "loading",
            LoadState::Ready => "ready",
            LoadState::Error => "error",
        }
    }
}

/// Paging direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards the end of the collection.
    Next,
    /// Towards the start of the collection.
    Previous,
}

/// Marks a cursor `Loading` for the duration of one fetch.
///
/// Dropped before [`settled`](Self::settled) is called, i.e. when the
/// operation's future is abandoned mid-fetch, the guard puts back the state
/// the cursor had before.
pub(crate) struct LoadingGuard<'a, S> {
    lock: &'a RwLock<S>,
    field: fn(&mut S) -> &mut LoadState,
    previous: Option<LoadState>,
}

impl<'a, S> LoadingGuard<'a, S> {
    pub(crate) fn enter(lock: &'a RwLock<S>, field: fn(&mut S) -> &mut LoadState) -> Self {
        let mut inner = lock.write();
        let previous = std::mem::replace(field(&mut inner), LoadState::Loading);
        drop(inner);
        Self {
            lock,
            field,
            previous: Some(previous),
        }
    }

    /// The fetch completed; the caller records the outcome.
    pub(crate) fn settled(mut self) {
        self.previous = None;
    }
}

impl<S> Drop for LoadingGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *(self.field)(&mut self.lock.write()) = previous;
        }
    }
}
