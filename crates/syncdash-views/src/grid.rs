// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Virtualized-grid bindings for the paginated collections.
//!
//! A binding owns the fetch adapter for its grid and a selection
//! generation. Every response is checked against the generation it was
//! requested under before it may touch the store.

use anyhow::{Result, anyhow, bail};
use std::fmt;
use std::marker::PhantomData;
use syncdash_app::{
    ApplicationState, CollectionKind, CollectionUpdate, Project, ProjectId, Store, Table, TableId,
    Ticket,
};
use syncdash_paging::{
    FetchError, IncrementalFetchAdapter, Page, PageContext, PageRequest, PendingBlock,
};

use crate::{LoadOutcome, Slice, SliceWatch, SyncRuntime};

/// Ticket columns that are always shown, in this order.
pub const TICKET_BASE_COLUMNS: [&str; 4] = ["Title", "Status", "Severity", "Description"];
const COLUMN_SAMPLE: usize = 5;

/// A record type a grid can page through.
pub trait GridRows: Clone + Sized + 'static {
    const KIND: CollectionKind;

    /// What the store currently holds for `context`.
    fn cached(state: &ApplicationState, context: &PageContext) -> Vec<Self>;
    fn replace(context: &PageContext, rows: Vec<Self>) -> Result<CollectionUpdate>;
    fn fetch_page<R: SyncRuntime + ?Sized>(
        runtime: &mut R,
        request: &PageRequest,
    ) -> Result<Page<Self>>;
    fn load_all<R: SyncRuntime + ?Sized>(runtime: &mut R, context: &PageContext)
    -> Result<Vec<Self>>;
    /// Case-insensitive match against an already lowercased needle.
    fn matches(&self, needle: &str) -> bool;
}

fn parent_project(context: &PageContext) -> Result<&ProjectId> {
    context
        .project_id
        .as_ref()
        .ok_or_else(|| anyhow!("{context} has no project selected"))
}

fn parent_table(context: &PageContext) -> Result<&TableId> {
    context
        .table_id
        .as_ref()
        .ok_or_else(|| anyhow!("{context} has no table selected"))
}

impl GridRows for Project {
    const KIND: CollectionKind = CollectionKind::Projects;

    fn cached(state: &ApplicationState, _context: &PageContext) -> Vec<Self> {
        state.projects.to_vec()
    }

    fn replace(_context: &PageContext, rows: Vec<Self>) -> Result<CollectionUpdate> {
        Ok(CollectionUpdate::Projects(rows))
    }

    fn fetch_page<R: SyncRuntime + ?Sized>(
        runtime: &mut R,
        request: &PageRequest,
    ) -> Result<Page<Self>> {
        runtime.fetch_projects_page(request)
    }

    fn load_all<R: SyncRuntime + ?Sized>(
        runtime: &mut R,
        _context: &PageContext,
    ) -> Result<Vec<Self>> {
        runtime.load_projects()
    }

    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle) || self.id.as_str().contains(needle)
    }
}

impl GridRows for Table {
    const KIND: CollectionKind = CollectionKind::Tables;

    fn cached(state: &ApplicationState, context: &PageContext) -> Vec<Self> {
        context
            .project_id
            .as_ref()
            .map(|project_id| state.tables(project_id).to_vec())
            .unwrap_or_default()
    }

    fn replace(context: &PageContext, rows: Vec<Self>) -> Result<CollectionUpdate> {
        Ok(CollectionUpdate::Tables {
            project_id: parent_project(context)?.clone(),
            tables: rows,
        })
    }

    fn fetch_page<R: SyncRuntime + ?Sized>(
        runtime: &mut R,
        request: &PageRequest,
    ) -> Result<Page<Self>> {
        runtime.fetch_tables_page(request)
    }

    fn load_all<R: SyncRuntime + ?Sized>(
        runtime: &mut R,
        context: &PageContext,
    ) -> Result<Vec<Self>> {
        runtime.load_tables(parent_project(context)?)
    }

    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self
                .description
                .as_deref()
                .is_some_and(|description| description.to_lowercase().contains(needle))
    }
}

impl GridRows for Ticket {
    const KIND: CollectionKind = CollectionKind::Tickets;

    fn cached(state: &ApplicationState, context: &PageContext) -> Vec<Self> {
        context
            .table_id
            .as_ref()
            .map(|table_id| state.tickets(table_id).to_vec())
            .unwrap_or_default()
    }

    fn replace(context: &PageContext, rows: Vec<Self>) -> Result<CollectionUpdate> {
        Ok(CollectionUpdate::Tickets {
            table_id: parent_table(context)?.clone(),
            tickets: rows,
        })
    }

    fn fetch_page<R: SyncRuntime + ?Sized>(
        runtime: &mut R,
        request: &PageRequest,
    ) -> Result<Page<Self>> {
        runtime.fetch_tickets_page(request)
    }

    fn load_all<R: SyncRuntime + ?Sized>(
        runtime: &mut R,
        context: &PageContext,
    ) -> Result<Vec<Self>> {
        runtime.load_tickets(parent_table(context)?)
    }

    fn matches(&self, needle: &str) -> bool {
        self.fields.keys().any(|key| {
            self.field_text(key)
                .is_some_and(|text| text.to_lowercase().contains(needle))
        })
    }
}

/// A block fetch reserved under one selection generation.
#[derive(Debug)]
#[must_use = "a BlockTicket must be applied to release its page"]
pub struct BlockTicket {
    generation: u64,
    block: PendingBlock,
}

impl BlockTicket {
    pub fn request(&self) -> &PageRequest {
        self.block.request()
    }
}

#[derive(Debug)]
#[must_use = "a FullLoadTicket must be applied to clear the loading flag"]
pub struct FullLoadTicket {
    generation: u64,
    context: PageContext,
}

impl FullLoadTicket {
    pub fn context(&self) -> &PageContext {
        &self.context
    }
}

pub struct GridBinding<T: GridRows> {
    store: Store,
    adapter: IncrementalFetchAdapter,
    context: Option<PageContext>,
    page_size: usize,
    generation: u64,
    pending: usize,
    loaded_rows: usize,
    last_row_index: Option<usize>,
    last_error: Option<String>,
    watch: SliceWatch,
    rows: PhantomData<fn() -> T>,
}

pub type ProjectsView = GridBinding<Project>;
pub type TablesView = GridBinding<Table>;
pub type TicketsView = GridBinding<Ticket>;

impl<T: GridRows> fmt::Debug for GridBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridBinding")
            .field("kind", &T::KIND)
            .field("context", &self.context)
            .field("page_size", &self.page_size)
            .field("generation", &self.generation)
            .field("loaded_rows", &self.loaded_rows)
            .field("last_row_index", &self.last_row_index)
            .finish()
    }
}

impl<T: GridRows> GridBinding<T> {
    pub fn new(store: Store, page_size: usize) -> Self {
        let watch = SliceWatch::new(&store, Slice::Collection(T::KIND));
        Self {
            store,
            adapter: IncrementalFetchAdapter::new(),
            context: None,
            page_size,
            generation: 0,
            pending: 0,
            loaded_rows: 0,
            last_row_index: None,
            last_error: None,
            watch,
            rows: PhantomData,
        }
    }

    pub fn context(&self) -> Option<&PageContext> {
        self.context.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Switches the grid to `context`. Returns false if it was already
    /// showing it. Responses still in flight for the old selection will be
    /// ignored.
    pub fn select(&mut self, context: PageContext) -> bool {
        if self.context.as_ref() == Some(&context) {
            return false;
        }
        log::debug!("{} grid now showing {context}", T::KIND.as_str());
        self.context = Some(context);
        self.restart();
        true
    }

    pub fn filter(&self) -> Option<&str> {
        self.context.as_ref()?.filter.as_deref()
    }

    /// A new filter is a new context: tokens are dropped and paging
    /// restarts.
    pub fn set_filter(&mut self, filter: &str) -> bool {
        match self.context.clone() {
            Some(context) => self.select(context.with_filter(filter)),
            None => false,
        }
    }

    fn restart(&mut self) {
        self.generation += 1;
        self.loaded_rows = 0;
        self.last_row_index = None;
        self.last_error = None;
    }

    /// Drops every continuation token and starts paging again from the
    /// first block. Blocks still in flight are ignored when they land.
    ///
    /// Runs on its own before the next request once a full sync has been
    /// recorded in the store.
    pub fn resync(&mut self) -> bool {
        self.watch.take_synced();
        if self.context.is_none() {
            return false;
        }
        log::debug!("{} grid resyncing from the first block", T::KIND.as_str());
        self.adapter.reset();
        self.restart();
        true
    }

    fn catch_up(&mut self) {
        if self.watch.sync_pending() {
            self.resync();
        }
    }

    /// Cached rows for the current selection, narrowed by the filter.
    pub fn rows(&self) -> Vec<T> {
        let Some(context) = &self.context else {
            return Vec::new();
        };
        let rows = T::cached(&self.store.current_snapshot(), context);
        match &context.filter {
            Some(filter) => {
                let needle = filter.to_lowercase();
                rows.into_iter().filter(|row| row.matches(&needle)).collect()
            }
            None => rows,
        }
    }

    pub fn loaded_rows(&self) -> usize {
        self.loaded_rows
    }

    /// Set once the source reported its last block.
    pub fn last_row_index(&self) -> Option<usize> {
        self.last_row_index
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.pending > 0
    }

    /// Where the next block starts, or `None` once the grid is complete or
    /// stalled on an error. After a full sync this is always the first
    /// block.
    pub fn next_start(&self) -> Option<usize> {
        self.context.as_ref()?;
        if self.watch.sync_pending() {
            return Some(0);
        }
        if self.last_row_index.is_some() || self.last_error.is_some() {
            return None;
        }
        Some(self.loaded_rows)
    }

    /// True if the store slice changed since the last call, including
    /// changes from another tab.
    pub fn take_changed(&mut self) -> bool {
        self.watch.take_changed()
    }

    pub fn request_block(&mut self, start_index: usize) -> Result<BlockTicket> {
        self.catch_up();
        let Some(context) = &self.context else {
            bail!("no {} selection to page through", T::KIND.as_str());
        };
        let block = self.adapter.begin(start_index, self.page_size, context)?;
        self.pending += 1;
        self.store.begin_load(T::KIND);
        Ok(BlockTicket {
            generation: self.generation,
            block,
        })
    }

    pub fn apply_block(&mut self, ticket: BlockTicket, outcome: Result<Page<T>>) -> LoadOutcome {
        self.catch_up();
        self.pending = self.pending.saturating_sub(1);
        let BlockTicket { generation, block } = ticket;
        let start_index = block.start_index();
        let result = self.adapter.complete(block, outcome);

        let outcome = match result {
            Err(FetchError::Superseded { page }) => {
                log::debug!("{} page {page} superseded", T::KIND.as_str());
                LoadOutcome::Ignored
            }
            _ if generation != self.generation => {
                log::debug!(
                    "ignoring {} block at {start_index}: selection changed",
                    T::KIND.as_str()
                );
                LoadOutcome::Ignored
            }
            Ok(fetched) => {
                let received = fetched.rows.len();
                match self.write_block(start_index, fetched.rows) {
                    Ok(()) => {
                        self.loaded_rows = start_index + received;
                        self.last_row_index = fetched.last_row_index;
                        self.last_error = None;
                        LoadOutcome::Applied(received)
                    }
                    Err(error) => self.fail(error),
                }
            }
            Err(error) => self.fail(error.into()),
        };
        self.store.finish_load(T::KIND);
        outcome
    }

    fn write_block(&self, start_index: usize, fetched: Vec<T>) -> Result<()> {
        let Some(context) = &self.context else {
            bail!("selection cleared");
        };
        let mut rows = T::cached(&self.store.current_snapshot(), context);
        if rows.len() < start_index {
            log::warn!(
                "{} block at {start_index} lands past {} cached rows",
                T::KIND.as_str(),
                rows.len()
            );
        }
        rows.truncate(start_index);
        rows.extend(fetched);
        self.store.set_collection(T::replace(context, rows)?);
        Ok(())
    }

    fn fail(&mut self, error: anyhow::Error) -> LoadOutcome {
        log::warn!("{} load failed: {error:#}", T::KIND.as_str());
        let outcome = LoadOutcome::failed(&error);
        self.last_error = outcome.failure().map(str::to_owned);
        outcome
    }

    /// Fetches the block at `start_index` through `runtime`. Refused
    /// requests surface as failures without touching the store.
    pub fn load_block<R: SyncRuntime + ?Sized>(
        &mut self,
        runtime: &mut R,
        start_index: usize,
    ) -> LoadOutcome {
        let ticket = match self.request_block(start_index) {
            Ok(ticket) => ticket,
            Err(error) => return LoadOutcome::failed(&error),
        };
        let outcome = T::fetch_page(runtime, ticket.request());
        self.apply_block(ticket, outcome)
    }

    pub fn load_next<R: SyncRuntime + ?Sized>(&mut self, runtime: &mut R) -> Option<LoadOutcome> {
        let start = self.next_start()?;
        Some(self.load_block(runtime, start))
    }

    pub fn request_full(&mut self) -> Result<FullLoadTicket> {
        self.catch_up();
        let Some(context) = &self.context else {
            bail!("no {} selection to load", T::KIND.as_str());
        };
        self.pending += 1;
        self.store.begin_load(T::KIND);
        Ok(FullLoadTicket {
            generation: self.generation,
            context: context.clone(),
        })
    }

    /// Replaces the whole slice. A failure leaves the previous slice in
    /// place.
    pub fn apply_full(&mut self, ticket: FullLoadTicket, outcome: Result<Vec<T>>) -> LoadOutcome {
        self.catch_up();
        self.pending = self.pending.saturating_sub(1);
        let outcome = if ticket.generation != self.generation {
            log::debug!("ignoring {} load for {}", T::KIND.as_str(), ticket.context);
            LoadOutcome::Ignored
        } else {
            match outcome.and_then(|rows| {
                let received = rows.len();
                self.store
                    .set_collection(T::replace(&ticket.context, rows)?);
                Ok(received)
            }) {
                Ok(received) => {
                    self.loaded_rows = received;
                    self.last_row_index = Some(received);
                    self.last_error = None;
                    LoadOutcome::Applied(received)
                }
                Err(error) => self.fail(error),
            }
        };
        self.store.finish_load(T::KIND);
        outcome
    }

    pub fn load_full<R: SyncRuntime + ?Sized>(&mut self, runtime: &mut R) -> LoadOutcome {
        let ticket = match self.request_full() {
            Ok(ticket) => ticket,
            Err(error) => return LoadOutcome::failed(&error),
        };
        let outcome = T::load_all(runtime, ticket.context());
        self.apply_full(ticket, outcome)
    }
}

impl GridBinding<Project> {
    pub fn open(&mut self) -> bool {
        let filter = self.filter().unwrap_or_default().to_owned();
        self.select(PageContext::projects().with_filter(&filter))
    }
}

impl GridBinding<Table> {
    pub fn select_project(&mut self, project_id: ProjectId) -> bool {
        self.select(PageContext::tables(project_id))
    }
}

impl GridBinding<Ticket> {
    pub fn select_table(&mut self, project_id: ProjectId, table_id: TableId) -> bool {
        self.select(PageContext::tickets(project_id, table_id))
    }

    pub fn columns(&self) -> Vec<String> {
        ticket_columns(&self.rows())
    }
}

/// The fixed ticket columns followed by any other field names found in
/// the first few tickets, in first-seen order.
pub fn ticket_columns(tickets: &[Ticket]) -> Vec<String> {
    let mut columns: Vec<String> = TICKET_BASE_COLUMNS.iter().map(|c| (*c).to_owned()).collect();
    for ticket in tickets.iter().take(COLUMN_SAMPLE) {
        for key in ticket.fields.keys() {
            if !columns.iter().any(|column| column == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::ticket_columns;
    use serde_json::json;
    use syncdash_app::{Ticket, TicketId};

    fn ticket(fields: serde_json::Value) -> Ticket {
        Ticket {
            id: TicketId::from("rec"),
            fields: fields.as_object().cloned().unwrap_or_default(),
            created_time: None,
            row_id: None,
        }
    }

    #[test]
    fn columns_extend_the_base_set_from_the_first_five_tickets() {
        let mut tickets: Vec<Ticket> = (0..5)
            .map(|_| ticket(json!({"Title": "x", "Status": "Todo", "Area": "api"})))
            .collect();
        tickets.push(ticket(json!({"Late": 1})));

        assert_eq!(
            ticket_columns(&tickets),
            vec!["Title", "Status", "Severity", "Description", "Area"]
        );
        assert_eq!(ticket_columns(&[]).len(), 4);
    }
}
