// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Serves a virtualized grid's block requests from a cursor-paginated source.
//!
//! A block request is split into [`IncrementalFetchAdapter::begin`], which
//! resolves the continuation token and reserves the page, and
//! [`IncrementalFetchAdapter::complete`], which records the next token and
//! shapes the reply. Hosts that fetch off-thread drive the two halves
//! themselves; [`IncrementalFetchAdapter::get_rows`] does both in one call.

use anyhow::Result;
use std::collections::BTreeSet;
use std::fmt;

use crate::{PageContext, PageCursorCache};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub context: PageContext,
    pub page: usize,
    pub continuation_token: Option<String>,
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub continuation_token: Option<String>,
    pub has_more: bool,
}

/// Rows for one block. `last_row_index` is only set once the source is
/// exhausted; the grid stops asking for blocks past it.
#[derive(Debug, Clone, PartialEq)]
pub struct Block<T> {
    pub start_index: usize,
    pub rows: Vec<T>,
    pub last_row_index: Option<usize>,
}

impl<T> Block<T> {
    pub fn is_last(&self) -> bool {
        self.last_row_index.is_some()
    }
}

pub trait PageSource<T> {
    fn fetch_page(&mut self, request: &PageRequest) -> Result<Page<T>>;
}

impl<T, F> PageSource<T> for F
where
    F: FnMut(&PageRequest) -> Result<Page<T>>,
{
    fn fetch_page(&mut self, request: &PageRequest) -> Result<Page<T>> {
        self(request)
    }
}

#[derive(Debug)]
pub enum FetchError {
    InvalidWindow { block_size: usize },
    /// No token is known for the page; paging must restart from page 0.
    MissingCursor { page: usize },
    PageInFlight { page: usize },
    /// The context changed while the page was in flight.
    Superseded { page: usize },
    Transport(anyhow::Error),
}

impl FetchError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWindow { block_size } => {
                write!(f, "invalid block size {block_size}; blocks must hold at least one row")
            }
            Self::MissingCursor { page } => write!(
                f,
                "no continuation token for page {page}; reload from the first page"
            ),
            Self::PageInFlight { page } => write!(f, "page {page} is already being fetched"),
            Self::Superseded { page } => {
                write!(f, "page {page} belongs to a selection that is no longer active")
            }
            Self::Transport(error) => write!(f, "fetch failed: {error:#}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}

/// A reserved page fetch. Hand it back to [`IncrementalFetchAdapter::complete`]
/// with the transport's outcome.
#[derive(Debug)]
#[must_use = "an unfinished PendingBlock keeps its page reserved"]
pub struct PendingBlock {
    generation: u64,
    start_index: usize,
    request: PageRequest,
}

impl PendingBlock {
    pub fn request(&self) -> &PageRequest {
        &self.request
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn page(&self) -> usize {
        self.request.page
    }
}

#[derive(Debug, Default)]
pub struct IncrementalFetchAdapter {
    cache: PageCursorCache,
    in_flight: BTreeSet<usize>,
    generation: u64,
}

impl IncrementalFetchAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &PageCursorCache {
        &self.cache
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Drops every token and orphans in-flight pages, as a full resync does.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.in_flight.clear();
        self.generation += 1;
    }

    pub fn begin(
        &mut self,
        start_index: usize,
        block_size: usize,
        context: &PageContext,
    ) -> Result<PendingBlock, FetchError> {
        if block_size == 0 {
            return Err(FetchError::InvalidWindow { block_size });
        }
        if self.cache.enter(context, block_size) {
            self.in_flight.clear();
            self.generation += 1;
        }

        let page = start_index / block_size;
        if self.in_flight.contains(&page) {
            return Err(FetchError::PageInFlight { page });
        }
        let continuation_token = if page == 0 {
            None
        } else {
            let token = self
                .cache
                .get(context, page)
                .ok_or(FetchError::MissingCursor { page })?;
            Some(token.to_owned())
        };

        self.in_flight.insert(page);
        Ok(PendingBlock {
            generation: self.generation,
            start_index,
            request: PageRequest {
                context: context.clone(),
                page,
                continuation_token,
                page_size: block_size,
            },
        })
    }

    pub fn complete<T>(
        &mut self,
        pending: PendingBlock,
        outcome: Result<Page<T>>,
    ) -> Result<Block<T>, FetchError> {
        let PendingBlock {
            generation,
            start_index,
            request,
        } = pending;
        let page = request.page;
        if generation != self.generation {
            log::debug!("dropping {} page {page}: context changed", request.context);
            return Err(FetchError::Superseded { page });
        }
        self.in_flight.remove(&page);

        let fetched = outcome.map_err(FetchError::Transport)?;
        if let Some(token) = &fetched.continuation_token {
            self.cache.record(&request.context, page + 1, token);
        }

        let exhausted = if !fetched.has_more {
            true
        } else if fetched.continuation_token.is_none() {
            log::warn!(
                "{} page {page} reports more rows but no continuation token; ending the grid here",
                request.context
            );
            true
        } else {
            false
        };

        let last_row_index = exhausted.then(|| start_index + fetched.items.len());
        Ok(Block {
            start_index,
            rows: fetched.items,
            last_row_index,
        })
    }

    pub fn get_rows<T, S>(
        &mut self,
        source: &mut S,
        start_index: usize,
        block_size: usize,
        context: &PageContext,
    ) -> Result<Block<T>, FetchError>
    where
        S: PageSource<T> + ?Sized,
    {
        let pending = self.begin(start_index, block_size, context)?;
        let outcome = source.fetch_page(pending.request());
        self.complete(pending, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::{FetchError, IncrementalFetchAdapter, Page, PageRequest};
    use crate::PageContext;
    use anyhow::{Result, anyhow};
    use syncdash_app::ProjectId;

    fn two_page_source(request: &PageRequest) -> Result<Page<char>> {
        match request.continuation_token.as_deref() {
            None => Ok(Page {
                items: vec!['a', 'b'],
                continuation_token: Some("tok1".to_owned()),
                has_more: true,
            }),
            Some("tok1") => Ok(Page {
                items: vec!['c'],
                continuation_token: None,
                has_more: false,
            }),
            Some(other) => Err(anyhow!("unknown token {other}")),
        }
    }

    #[test]
    fn second_page_requires_the_first() {
        let mut adapter = IncrementalFetchAdapter::new();
        let context = PageContext::projects();

        let early = adapter
            .get_rows(&mut two_page_source, 2, 2, &context)
            .expect_err("page 1 before page 0 must fail");
        assert!(matches!(early, FetchError::MissingCursor { page: 1 }));

        let first = adapter
            .get_rows(&mut two_page_source, 0, 2, &context)
            .expect("page 0 should load");
        assert_eq!(first.rows, vec!['a', 'b']);
        assert_eq!(first.last_row_index, None);
        assert_eq!(adapter.cache().get(&context, 1), Some("tok1"));

        let second = adapter
            .get_rows(&mut two_page_source, 2, 2, &context)
            .expect("page 1 should load with the recorded token");
        assert_eq!(second.rows, vec!['c']);
        assert_eq!(second.last_row_index, Some(3));
        assert!(second.is_last());
    }

    #[test]
    fn same_page_cannot_be_fetched_twice_at_once() {
        let mut adapter = IncrementalFetchAdapter::new();
        let context = PageContext::projects();

        let pending = adapter.begin(0, 2, &context).expect("first begin");
        let duplicate = adapter.begin(0, 2, &context).expect_err("duplicate begin");
        assert!(matches!(duplicate, FetchError::PageInFlight { page: 0 }));

        let outcome = two_page_source(pending.request());
        adapter.complete(pending, outcome).expect("completion");
        assert_eq!(adapter.in_flight(), 0);
        adapter.begin(0, 2, &context).expect("page is free again");
    }

    #[test]
    fn transport_failure_leaves_cache_untouched_and_retry_works() {
        let mut adapter = IncrementalFetchAdapter::new();
        let context = PageContext::projects();
        adapter
            .get_rows(&mut two_page_source, 0, 2, &context)
            .expect("page 0");

        let mut failing = |_: &PageRequest| -> Result<Page<char>> { Err(anyhow!("502 bad gateway")) };
        let error = adapter
            .get_rows(&mut failing, 2, 2, &context)
            .expect_err("transport failure");
        assert!(error.is_transport());
        assert!(error.to_string().contains("502 bad gateway"));
        assert_eq!(adapter.cache().len(), 1);
        assert_eq!(adapter.cache().get(&context, 2), None);
        assert_eq!(adapter.in_flight(), 0);

        let retry = adapter
            .get_rows(&mut two_page_source, 2, 2, &context)
            .expect("retry");
        assert_eq!(retry.last_row_index, Some(3));
    }

    #[test]
    fn context_change_supersedes_in_flight_pages() {
        let mut adapter = IncrementalFetchAdapter::new();
        let first = PageContext::tables(ProjectId::from("app1"));
        let second = PageContext::tables(ProjectId::from("app2"));

        let stale = adapter.begin(0, 2, &first).expect("begin first");
        let fresh = adapter.begin(0, 2, &second).expect("begin second");

        let outcome = two_page_source(stale.request());
        let error = adapter.complete(stale, outcome).expect_err("stale");
        assert!(matches!(error, FetchError::Superseded { page: 0 }));
        assert!(adapter.cache().is_empty());

        let outcome = two_page_source(fresh.request());
        adapter.complete(fresh, outcome).expect("fresh");
        assert_eq!(adapter.cache().get(&second, 1), Some("tok1"));
        assert_eq!(adapter.cache().get(&first, 1), None);
    }

    #[test]
    fn block_size_change_restarts_paging() {
        let mut adapter = IncrementalFetchAdapter::new();
        let context = PageContext::projects();
        adapter
            .get_rows(&mut two_page_source, 0, 2, &context)
            .expect("page 0");
        let error = adapter
            .get_rows(&mut two_page_source, 4, 4, &context)
            .expect_err("tokens are tied to the old block size");
        assert!(matches!(error, FetchError::MissingCursor { page: 1 }));
    }

    #[test]
    fn more_rows_without_token_ends_the_grid() {
        let mut adapter = IncrementalFetchAdapter::new();
        let mut source = |_: &PageRequest| -> Result<Page<u8>> {
            Ok(Page {
                items: vec![1, 2, 3],
                continuation_token: None,
                has_more: true,
            })
        };
        let block = adapter
            .get_rows(&mut source, 0, 5, &PageContext::users())
            .expect("block");
        assert_eq!(block.last_row_index, Some(3));
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let mut adapter = IncrementalFetchAdapter::new();
        let error = adapter
            .get_rows(&mut two_page_source, 0, 0, &PageContext::projects())
            .expect_err("zero block");
        assert!(matches!(error, FetchError::InvalidWindow { block_size: 0 }));
    }

    #[test]
    fn reset_orphans_pending_pages() {
        let mut adapter = IncrementalFetchAdapter::new();
        let context = PageContext::projects();
        adapter
            .get_rows(&mut two_page_source, 0, 2, &context)
            .expect("page 0");
        let pending = adapter.begin(2, 2, &context).expect("page 1");
        adapter.reset();

        let outcome = two_page_source(pending.request());
        assert!(matches!(
            adapter.complete(pending, outcome),
            Err(FetchError::Superseded { page: 1 })
        ));
        assert!(adapter.cache().is_empty());
    }
}
