// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use syncdash_app::{ProjectId, RevisionColumn, RevisionEntry, TableId};

use crate::{LoadOutcome, SyncRuntime};

#[derive(Debug)]
#[must_use = "a RevisionTicket must be applied"]
pub struct RevisionTicket {
    generation: u64,
    project_id: Option<ProjectId>,
    table_id: Option<TableId>,
}

impl RevisionTicket {
    pub fn project_id(&self) -> Option<&ProjectId> {
        self.project_id.as_ref()
    }

    pub fn table_id(&self) -> Option<&TableId> {
        self.table_id.as_ref()
    }
}

/// Status and assignee changes, optionally narrowed to one project or
/// table. Entries live in the view, not the store.
#[derive(Debug, Default)]
pub struct RevisionHistoryView {
    project_id: Option<ProjectId>,
    table_id: Option<TableId>,
    generation: u64,
    entries: Vec<RevisionEntry>,
    last_error: Option<String>,
}

impl RevisionHistoryView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the filter is unchanged. A new filter drops the
    /// entries loaded for the old one.
    pub fn select(&mut self, project_id: Option<ProjectId>, table_id: Option<TableId>) -> bool {
        if self.project_id == project_id && self.table_id == table_id {
            return false;
        }
        self.project_id = project_id;
        self.table_id = table_id;
        self.generation += 1;
        self.entries.clear();
        self.last_error = None;
        true
    }

    pub fn entries(&self) -> &[RevisionEntry] {
        &self.entries
    }

    pub fn by_column(&self, column: RevisionColumn) -> impl Iterator<Item = &RevisionEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.column_type == column)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn request(&self) -> RevisionTicket {
        RevisionTicket {
            generation: self.generation,
            project_id: self.project_id.clone(),
            table_id: self.table_id.clone(),
        }
    }

    pub fn apply(
        &mut self,
        ticket: RevisionTicket,
        outcome: Result<Vec<RevisionEntry>>,
    ) -> LoadOutcome {
        if ticket.generation != self.generation {
            log::debug!("ignoring revisions for a previous filter");
            return LoadOutcome::Ignored;
        }
        match outcome {
            Ok(mut entries) => {
                entries.sort_by(|left, right| right.created_date.cmp(&left.created_date));
                let received = entries.len();
                self.entries = entries;
                self.last_error = None;
                LoadOutcome::Applied(received)
            }
            Err(error) => {
                log::warn!("revision history load failed: {error:#}");
                let outcome = LoadOutcome::failed(&error);
                self.last_error = outcome.failure().map(str::to_owned);
                outcome
            }
        }
    }

    pub fn load<R: SyncRuntime + ?Sized>(&mut self, runtime: &mut R) -> LoadOutcome {
        let ticket = self.request();
        let outcome = runtime.load_revisions(ticket.project_id(), ticket.table_id());
        self.apply(ticket, outcome)
    }
}
