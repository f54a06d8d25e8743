// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use syncdash_app::{
    Project, ProjectId, RevisionEntry, StatsPatch, SyncReport, Table, TableId, Ticket,
    WorkspaceUser,
};
use syncdash_paging::{Page, PageRequest};

/// Everything the views need from the outside world. The host provides the
/// transport; views only decide what to ask for and where results go.
pub trait SyncRuntime {
    fn fetch_projects_page(&mut self, request: &PageRequest) -> Result<Page<Project>>;
    fn fetch_tables_page(&mut self, request: &PageRequest) -> Result<Page<Table>>;
    fn fetch_tickets_page(&mut self, request: &PageRequest) -> Result<Page<Ticket>>;
    fn load_projects(&mut self) -> Result<Vec<Project>>;
    fn load_tables(&mut self, project_id: &ProjectId) -> Result<Vec<Table>>;
    fn load_tickets(&mut self, table_id: &TableId) -> Result<Vec<Ticket>>;
    fn load_users(&mut self) -> Result<Vec<WorkspaceUser>>;
    fn load_stats(&mut self) -> Result<StatsPatch>;
    fn sync_all(&mut self) -> Result<SyncReport>;
    fn load_revisions(
        &mut self,
        project_id: Option<&ProjectId>,
        table_id: Option<&TableId>,
    ) -> Result<Vec<RevisionEntry>>;
}

/// Counts from a full sync, as a stats override.
pub fn report_stats(report: &SyncReport) -> StatsPatch {
    StatsPatch {
        projects: Some(report.bases),
        tables: Some(report.tables),
        tickets: Some(report.tickets),
        users: Some(report.users),
        revisions: None,
    }
}
