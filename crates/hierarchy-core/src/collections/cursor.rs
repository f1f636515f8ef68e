//! Newest-first paging over a status collection.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::domain::{Jid, Result};
use crate::ports::KeyValueStore;

/// Lazy newest-first iteration over one status collection.
///
/// Pages of `page_size` entries are fetched on demand, using the last seen
/// score as an exclusive upper bound for the next page. Iteration stops at
/// the first empty page.
///
/// Not exactly-once under concurrent writes: a member re-added during
/// iteration may be seen twice or not at all, and members sharing the
/// boundary score of a page are skipped.
pub struct CollectionCursor {
    store: Arc<dyn KeyValueStore>,
    key: String,
    page_size: usize,
    below: Option<f64>,
    buffer: VecDeque<(Jid, f64)>,
    exhausted: bool,
}

impl CollectionCursor {
    pub(crate) fn new(store: Arc<dyn KeyValueStore>, key: String, page_size: usize) -> Self {
        Self {
            store,
            key,
            page_size,
            below: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Fetch the next page; `None` once the collection is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<(Jid, f64)>>> {
        if !self.buffer.is_empty() {
            return Ok(Some(self.buffer.drain(..).collect()));
        }
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .store
            .zrevrange_by_score(&self.key, self.below, self.page_size)
            .await?;
        let Some((_, last_score)) = page.last() else {
            self.exhausted = true;
            return Ok(None);
        };
        self.below = Some(*last_score);
        Ok(Some(
            page.into_iter()
                .map(|(member, score)| (Jid::new(member), score))
                .collect(),
        ))
    }

    /// Next workflow jid, newest first.
    pub async fn next(&mut self) -> Result<Option<Jid>> {
        if self.buffer.is_empty() {
            match self.next_page().await? {
                Some(page) => self.buffer.extend(page),
                None => return Ok(None),
            }
        }
        Ok(self.buffer.pop_front().map(|(jid, _)| jid))
    }

    pub async fn collect_all(mut self) -> Result<Vec<Jid>> {
        let mut all = Vec::new();
        while let Some(jid) = self.next().await? {
            all.push(jid);
        }
        Ok(all)
    }
}
