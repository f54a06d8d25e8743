// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;
use std::rc::Rc;
use time::OffsetDateTime;

use crate::{Project, ProjectId, Table, TableId, Ticket, WorkspaceUser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CollectionKind {
    Projects,
    Tables,
    Tickets,
    Users,
}

impl CollectionKind {
    pub const ALL: [Self; 4] = [Self::Projects, Self::Tables, Self::Tickets, Self::Users];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Tables => "tables",
            Self::Tickets => "tickets",
            Self::Users => "users",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "projects" => Some(Self::Projects),
            "tables" => Some(Self::Tables),
            "tickets" => Some(Self::Tickets),
            "users" => Some(Self::Users),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub projects: usize,
    pub tables: usize,
    pub tickets: usize,
    pub users: usize,
    pub revisions: usize,
}

impl Stats {
    pub fn get(&self, kind: CollectionKind) -> usize {
        match kind {
            CollectionKind::Projects => self.projects,
            CollectionKind::Tables => self.tables,
            CollectionKind::Tickets => self.tickets,
            CollectionKind::Users => self.users,
        }
    }

    fn set(&mut self, kind: CollectionKind, count: usize) {
        match kind {
            CollectionKind::Projects => self.projects = count,
            CollectionKind::Tables => self.tables = count,
            CollectionKind::Tickets => self.tickets = count,
            CollectionKind::Users => self.users = count,
        }
    }

    pub fn merge(&mut self, patch: StatsPatch) {
        if let Some(projects) = patch.projects {
            self.projects = projects;
        }
        if let Some(tables) = patch.tables {
            self.tables = tables;
        }
        if let Some(tickets) = patch.tickets {
            self.tickets = tickets;
        }
        if let Some(users) = patch.users {
            self.users = users;
        }
        if let Some(revisions) = patch.revisions {
            self.revisions = revisions;
        }
    }
}

/// Server-reported counts merged over [`Stats`] ahead of a collection refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsPatch {
    pub projects: Option<usize>,
    pub tables: Option<usize>,
    pub tickets: Option<usize>,
    pub users: Option<usize>,
    pub revisions: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingFlags {
    pub projects: bool,
    pub tables: bool,
    pub tickets: bool,
    pub users: bool,
}

impl LoadingFlags {
    pub fn get(&self, kind: CollectionKind) -> bool {
        match kind {
            CollectionKind::Projects => self.projects,
            CollectionKind::Tables => self.tables,
            CollectionKind::Tickets => self.tickets,
            CollectionKind::Users => self.users,
        }
    }

    pub fn set(&mut self, kind: CollectionKind, loading: bool) {
        match kind {
            CollectionKind::Projects => self.projects = loading,
            CollectionKind::Tables => self.tables = loading,
            CollectionKind::Tickets => self.tickets = loading,
            CollectionKind::Users => self.users = loading,
        }
    }

    pub fn any(&self) -> bool {
        CollectionKind::ALL.iter().any(|kind| self.get(*kind))
    }
}

/// A whole-collection replacement, or the replacement of one keyed slice.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionUpdate {
    Projects(Vec<Project>),
    Tables {
        project_id: ProjectId,
        tables: Vec<Table>,
    },
    Tickets {
        table_id: TableId,
        tickets: Vec<Ticket>,
    },
    Users(Vec<WorkspaceUser>),
}

impl CollectionUpdate {
    pub const fn kind(&self) -> CollectionKind {
        match self {
            Self::Projects(_) => CollectionKind::Projects,
            Self::Tables { .. } => CollectionKind::Tables,
            Self::Tickets { .. } => CollectionKind::Tickets,
            Self::Users(_) => CollectionKind::Users,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Projects(items) => items.len(),
            Self::Tables { tables, .. } => tables.len(),
            Self::Tickets { tickets, .. } => tickets.len(),
            Self::Users(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collections sit behind `Rc` so cloning the state for a write shares
/// every slice the write leaves alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationState {
    pub projects: Rc<Vec<Project>>,
    pub tables_by_project: BTreeMap<ProjectId, Rc<Vec<Table>>>,
    pub tickets_by_table: BTreeMap<TableId, Rc<Vec<Ticket>>>,
    pub users: Rc<Vec<WorkspaceUser>>,
    pub stats: Stats,
    pub loading: LoadingFlags,
    pub last_sync_time: Option<OffsetDateTime>,
}

impl ApplicationState {
    pub fn tables(&self, project_id: &ProjectId) -> &[Table] {
        self.tables_by_project
            .get(project_id)
            .map(|tables| tables.as_slice())
            .unwrap_or_default()
    }

    pub fn tickets(&self, table_id: &TableId) -> &[Ticket] {
        self.tickets_by_table
            .get(table_id)
            .map(|tickets| tickets.as_slice())
            .unwrap_or_default()
    }

    pub fn has_projects(&self) -> bool {
        !self.projects.is_empty()
    }

    pub fn has_tables(&self, project_id: &ProjectId) -> bool {
        !self.tables(project_id).is_empty()
    }

    pub fn has_tickets(&self, table_id: &TableId) -> bool {
        !self.tickets(table_id).is_empty()
    }

    /// Item count of a collection across every key it is stored under.
    pub fn count(&self, kind: CollectionKind) -> usize {
        match kind {
            CollectionKind::Projects => self.projects.len(),
            CollectionKind::Tables => self.tables_by_project.values().map(|t| t.len()).sum(),
            CollectionKind::Tickets => self.tickets_by_table.values().map(|t| t.len()).sum(),
            CollectionKind::Users => self.users.len(),
        }
    }

    /// Stats as the local collections imply them. `revisions` has no local
    /// collection and is carried over unchanged.
    pub fn derived_stats(&self) -> Stats {
        Stats {
            projects: self.count(CollectionKind::Projects),
            tables: self.count(CollectionKind::Tables),
            tickets: self.count(CollectionKind::Tickets),
            users: self.count(CollectionKind::Users),
            revisions: self.stats.revisions,
        }
    }

    /// False while a server-reported override disagrees with the cache.
    pub fn stats_are_derived(&self) -> bool {
        self.stats == self.derived_stats()
    }

    pub fn apply_collection(&mut self, update: CollectionUpdate) {
        let kind = update.kind();
        match update {
            CollectionUpdate::Projects(projects) => {
                self.projects = Rc::new(unique_by(projects, |project| project.id.clone()));
            }
            CollectionUpdate::Tables { project_id, tables } => {
                self.tables_by_project.insert(project_id, Rc::new(tables));
            }
            CollectionUpdate::Tickets { table_id, tickets } => {
                self.tickets_by_table.insert(table_id, Rc::new(tickets));
            }
            CollectionUpdate::Users(users) => {
                self.users = Rc::new(unique_by(users, |user| user.id.clone()));
            }
        }
        self.stats.set(kind, self.count(kind));
    }
}

fn unique_by<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::with_capacity(items.len());
    let before = items.len();
    let unique: Vec<T> = items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect();
    if unique.len() != before {
        log::debug!("dropped {} duplicate record(s)", before - unique.len());
    }
    unique
}
