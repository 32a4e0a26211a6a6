//! Fake children sources shared by the integration tests.

#![allow(dead_code)]

use hbp_paging::{ChildrenPage, ChildrenQuery, ChildrenSource, ErrorKind, HbpError, HbpResult};
use parking_lot::Mutex;
use serde_json::{json, Value};

pub fn entity(id: &str) -> Value {
    json!({"_uuid": id, "_name": id, "_entityType": "file"})
}

pub fn child_ids(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("c{i:03}")).collect()
}

/// Serves a fixed list of children the way the document service pages them.
pub struct SiblingSource {
    pub children: Vec<String>,
    pub page_size: usize,
    pub queries: Mutex<Vec<ChildrenQuery>>,
}

impl SiblingSource {
    pub fn new(count: usize, page_size: usize) -> Self {
        Self {
            children: child_ids(count),
            page_size,
            queries: Mutex::new(Vec::new()),
        }
    }

    fn position(&self, id: &str) -> HbpResult<usize> {
        self.children
            .iter()
            .position(|c| c == id)
            .ok_or_else(|| HbpError::new(ErrorKind::NotFound, format!("{id} not found")))
    }

    fn page(&self, start: usize, end: usize) -> ChildrenPage<Value> {
        ChildrenPage::new(
            self.children[start..end].iter().map(|c| entity(c)).collect(),
            end < self.children.len(),
            start > 0,
        )
    }
}

impl ChildrenSource for SiblingSource {
    type Parent = String;
    type Item = Value;

    async fn children(&self, _parent: &String, query: &ChildrenQuery) -> HbpResult<ChildrenPage<Value>> {
        self.queries.lock().push(query.clone());
        tokio::task::yield_now().await;

        let len = self.children.len();
        if let Some(from) = &query.from {
            let start = self.position(from)?;
            Ok(self.page(start, (start + self.page_size).min(len)))
        } else if let Some(until) = &query.until {
            let end = self.position(until)? + 1;
            Ok(self.page(end.saturating_sub(self.page_size), end))
        } else {
            Ok(self.page(0, self.page_size.min(len)))
        }
    }
}
