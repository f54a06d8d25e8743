// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;
use syncdash_app::{
    ApplicationState, LoadingFlags, Project, ProjectId, Stats, Table, TableId, Ticket,
    WorkspaceUser,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// The JSON shape of [`ApplicationState`] in storage. Versionless: missing
/// fields take defaults and unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub projects: Vec<Project>,
    pub tables_by_project: BTreeMap<ProjectId, Vec<Table>>,
    pub tickets_by_table: BTreeMap<TableId, Vec<Ticket>>,
    pub users: Vec<WorkspaceUser>,
    pub stats: Option<Stats>,
    pub loading: LoadingFlags,
    pub last_sync_time: Option<String>,
}

impl PersistedSnapshot {
    pub fn from_state(state: &ApplicationState) -> Self {
        let last_sync_time = state.last_sync_time.and_then(|time| {
            time.format(&Rfc3339)
                .map_err(|err| log::warn!("cannot format last sync time {time}: {err}"))
                .ok()
        });
        Self {
            projects: state.projects.to_vec(),
            tables_by_project: state
                .tables_by_project
                .iter()
                .map(|(project_id, tables)| (project_id.clone(), tables.to_vec()))
                .collect(),
            tickets_by_table: state
                .tickets_by_table
                .iter()
                .map(|(table_id, tickets)| (table_id.clone(), tickets.to_vec()))
                .collect(),
            users: state.users.to_vec(),
            stats: Some(state.stats),
            loading: LoadingFlags::default(),
            last_sync_time,
        }
    }

    pub fn into_state(self) -> ApplicationState {
        let last_sync_time = self.last_sync_time.as_deref().and_then(|raw| {
            OffsetDateTime::parse(raw, &Rfc3339)
                .map_err(|err| log::warn!("ignoring persisted last sync time {raw:?}: {err}"))
                .ok()
        });
        let mut state = ApplicationState {
            projects: Rc::new(self.projects),
            tables_by_project: self
                .tables_by_project
                .into_iter()
                .map(|(project_id, tables)| (project_id, Rc::new(tables)))
                .collect(),
            tickets_by_table: self
                .tickets_by_table
                .into_iter()
                .map(|(table_id, tickets)| (table_id, Rc::new(tickets)))
                .collect(),
            users: Rc::new(self.users),
            stats: Stats::default(),
            loading: LoadingFlags::default(),
            last_sync_time,
        };
        state.stats = match self.stats {
            Some(stats) => stats,
            None => state.derived_stats(),
        };
        state
    }
}

pub fn encode_state(state: &ApplicationState) -> Result<String> {
    serde_json::to_string(&PersistedSnapshot::from_state(state)).context("serialize app state")
}

pub fn decode_state(raw: &str) -> Result<ApplicationState> {
    let snapshot: PersistedSnapshot =
        serde_json::from_str(raw).context("parse persisted app state")?;
    Ok(snapshot.into_state())
}
