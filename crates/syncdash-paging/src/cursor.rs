// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;
use std::fmt;
use syncdash_app::{CollectionKind, ProjectId, TableId};

/// The collection plus the parent selection and free-text filter a grid is
/// currently paging through. Tokens issued under one context are never
/// valid under another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageContext {
    pub kind: CollectionKind,
    pub project_id: Option<ProjectId>,
    pub table_id: Option<TableId>,
    pub filter: Option<String>,
}

impl PageContext {
    pub fn projects() -> Self {
        Self {
            kind: CollectionKind::Projects,
            project_id: None,
            table_id: None,
            filter: None,
        }
    }

    pub fn tables(project_id: ProjectId) -> Self {
        Self {
            kind: CollectionKind::Tables,
            project_id: Some(project_id),
            table_id: None,
            filter: None,
        }
    }

    pub fn tickets(project_id: ProjectId, table_id: TableId) -> Self {
        Self {
            kind: CollectionKind::Tickets,
            project_id: Some(project_id),
            table_id: Some(table_id),
            filter: None,
        }
    }

    pub fn users() -> Self {
        Self {
            kind: CollectionKind::Users,
            project_id: None,
            table_id: None,
            filter: None,
        }
    }

    /// Blank filters are treated as no filter.
    pub fn with_filter(mut self, filter: &str) -> Self {
        let trimmed = filter.trim();
        self.filter = (!trimmed.is_empty()).then(|| trimmed.to_owned());
        self
    }
}

impl fmt::Display for PageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_str())?;
        if let Some(project_id) = &self.project_id {
            write!(f, "/{project_id}")?;
        }
        if let Some(table_id) = &self.table_id {
            write!(f, "/{table_id}")?;
        }
        if let Some(filter) = &self.filter {
            write!(f, "?filter={filter:?}")?;
        }
        Ok(())
    }
}

/// Maps a zero-based page index to the continuation token that fetches it.
///
/// Page 0 never needs a token. The token for page `n` is only accepted once
/// page `n - 1` is itself reachable, so the cache never holds a token whose
/// predecessor failed.
#[derive(Debug, Clone, Default)]
pub struct PageCursorCache {
    context: Option<PageContext>,
    page_size: usize,
    tokens: BTreeMap<usize, String>,
}

impl PageCursorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self) -> Option<&PageContext> {
        self.context.as_ref()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Switches to `context` at `page_size`, discarding every token when
    /// either differs from the current scope. Returns true on a reset.
    pub fn enter(&mut self, context: &PageContext, page_size: usize) -> bool {
        if self.context.as_ref() == Some(context) && self.page_size == page_size {
            return false;
        }
        if let Some(previous) = &self.context {
            log::debug!(
                "cursor cache leaving {previous} ({} token(s)) for {context}",
                self.tokens.len()
            );
        }
        self.context = Some(context.clone());
        self.page_size = page_size;
        self.tokens.clear();
        true
    }

    pub fn get(&self, context: &PageContext, page: usize) -> Option<&str> {
        if self.context.as_ref() != Some(context) {
            return None;
        }
        self.tokens.get(&page).map(String::as_str)
    }

    pub fn can_request(&self, context: &PageContext, page: usize) -> bool {
        self.context.as_ref() == Some(context) && (page == 0 || self.tokens.contains_key(&page))
    }

    /// Records the token that fetches `page`. Rejected unless `page - 1` is
    /// reachable under the same context. A changed token for a known page
    /// invalidates every later page, since those descend from the old one.
    pub fn record(&mut self, context: &PageContext, page: usize, token: &str) -> bool {
        if page == 0 || !self.can_request(context, page - 1) {
            log::debug!("refusing cursor for {context} page {page}: predecessor unresolved");
            return false;
        }
        match self.tokens.get(&page) {
            Some(existing) if existing == token => return true,
            Some(_) => {
                self.tokens.split_off(&(page + 1));
            }
            None => {}
        }
        self.tokens.insert(page, token.to_owned());
        true
    }

    /// Forgets every token but keeps the scope, as a full resync does.
    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Highest page index that can currently be requested.
    pub fn furthest_page(&self) -> Option<usize> {
        self.context.as_ref()?;
        Some(self.tokens.keys().next_back().copied().unwrap_or(0))
    }
}
