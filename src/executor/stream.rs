//! Paged search draining.

use crate::directory::{DirectoryEntry, DirectoryError, DirectorySession, SearchRequest};
use log::trace;
use std::collections::VecDeque;

enum PageState {
    First,
    Next(Vec<u8>),
    Done,
}

/// Pull-based stream over the entries of a paged search.
///
/// Entries are yielded in delivery order; pages are fetched lazily as the
/// buffer runs dry. After the last entry, [`next`](SearchStream::next) returns
/// `Ok(None)` and keeps returning it.
pub struct SearchStream<'a, S: DirectorySession> {
    session: &'a mut S,
    request: &'a SearchRequest,
    page_size: u32,
    buffer: VecDeque<DirectoryEntry>,
    state: PageState,
    pages: usize,
}

impl<'a, S: DirectorySession> SearchStream<'a, S> {
    pub fn new(session: &'a mut S, request: &'a SearchRequest, page_size: u32) -> Self {
        Self {
            session,
            request,
            page_size,
            buffer: VecDeque::new(),
            state: PageState::First,
            pages: 0,
        }
    }

    /// Next entry, fetching another page when needed.
    pub async fn next(&mut self) -> Result<Option<DirectoryEntry>, DirectoryError> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Ok(Some(entry));
            }

            let cookie = match std::mem::replace(&mut self.state, PageState::Done) {
                PageState::Done => return Ok(None),
                PageState::First => None,
                PageState::Next(cookie) => Some(cookie),
            };

            let page = self
                .session
                .search_page(self.request, self.page_size, cookie)
                .await?;
            self.pages += 1;
            trace!(
                "search base={} page={} entries={}",
                self.request.base,
                self.pages,
                page.entries.len()
            );

            self.buffer.extend(page.entries);
            if let Some(cookie) = page.cookie.filter(|c| !c.is_empty()) {
                self.state = PageState::Next(cookie);
            }
        }
    }

    /// Number of pages fetched so far.
    pub fn pages(&self) -> usize {
        self.pages
    }
}
