//! Streaming list pager
//!
//! Each pull fetches exactly one backend page and yields it as one chunk.
//! The pager is single-use: once iteration starts it cannot be rewound, and
//! a fresh pager must be built to list again.

use crate::backend::{BackendAdapter, ListRequest};
use crate::error::StoreResult;
use crate::types::ObjectMeta;
use futures::stream::{self, Stream};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
enum PagerState {
    /// No page fetched yet
    Fresh,

    /// More pages behind this token
    Continue(String),

    /// Backend signalled the end, or a fetch failed
    Exhausted,
}

/// Lazy, chunked listing of the objects under a prefix
pub struct ListPager {
    adapter: Arc<dyn BackendAdapter>,
    prefix: Option<String>,
    offset: Option<String>,
    chunk_size: usize,
    state: PagerState,
    pages_fetched: usize,
}

impl ListPager {
    /// Create a pager; nothing is fetched until the first pull
    pub fn new(
        adapter: Arc<dyn BackendAdapter>,
        prefix: Option<String>,
        offset: Option<String>,
        chunk_size: usize,
    ) -> Self {
        Self {
            adapter,
            prefix,
            offset,
            chunk_size: chunk_size.max(1),
            state: PagerState::Fresh,
            pages_fetched: 0,
        }
    }

    /// Requested entries per chunk
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// True once the first page has been requested
    pub fn has_started(&self) -> bool {
        self.state != PagerState::Fresh
    }

    /// True when no further chunks will be produced
    pub fn is_exhausted(&self) -> bool {
        self.state == PagerState::Exhausted
    }

    /// Fetch the next chunk, or `None` at the end of the listing
    ///
    /// Empty intermediate pages are skipped. After an error the pager is
    /// exhausted.
    pub async fn next_chunk(&mut self) -> StoreResult<Option<Vec<ObjectMeta>>> {
        loop {
            let token = match &self.state {
                PagerState::Exhausted => return Ok(None),
                PagerState::Fresh => None,
                PagerState::Continue(token) => Some(token.clone()),
            };

            let request = ListRequest {
                prefix: self.prefix.clone(),
                offset: self.offset.clone(),
                token,
                max_results: self.chunk_size,
            };

            let page = match self.adapter.list_page(request).await {
                Ok(page) => page,
                Err(e) => {
                    self.state = PagerState::Exhausted;
                    return Err(e);
                }
            };
            self.pages_fetched += 1;

            self.state = match page.next_token {
                Some(next) => PagerState::Continue(next),
                None => PagerState::Exhausted,
            };
            trace!(
                page = self.pages_fetched,
                entries = page.objects.len(),
                more = !self.is_exhausted(),
                "fetched listing page"
            );

            if !page.objects.is_empty() {
                return Ok(Some(page.objects));
            }
            if self.is_exhausted() {
                return Ok(None);
            }
        }
    }

    /// Drain the remaining listing into one vector, ignoring chunk boundaries
    pub async fn collect(mut self) -> StoreResult<Vec<ObjectMeta>> {
        let mut all = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            all.extend(chunk);
        }
        debug!(
            prefix = ?self.prefix,
            entries = all.len(),
            pages = self.pages_fetched,
            "listing collected"
        );
        Ok(all)
    }

    /// Turn the pager into a stream of chunks
    pub fn into_stream(self) -> impl Stream<Item = StoreResult<Vec<ObjectMeta>>> + Send {
        stream::try_unfold(self, |mut pager| async move {
            Ok(pager.next_chunk().await?.map(|chunk| (chunk, pager)))
        })
    }
}

impl fmt::Debug for ListPager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListPager")
            .field("backend", &self.adapter.name())
            .field("prefix", &self.prefix)
            .field("offset", &self.offset)
            .field("chunk_size", &self.chunk_size)
            .field("state", &self.state)
            .finish()
    }
}
