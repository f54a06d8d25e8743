// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use syncdash_api::{Client, RevisionQuery};
use syncdash_app::{
    Project, ProjectId, RevisionEntry, StatsPatch, SyncReport, Table, TableId, Ticket,
    WorkspaceUser,
};
use syncdash_paging::{Page, PageRequest};
use syncdash_views::SyncRuntime;

pub struct HttpRuntime {
    client: Client,
}

impl HttpRuntime {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl SyncRuntime for HttpRuntime {
    fn fetch_projects_page(&mut self, request: &PageRequest) -> Result<Page<Project>> {
        self.client.fetch_projects_page(request)
    }

    fn fetch_tables_page(&mut self, request: &PageRequest) -> Result<Page<Table>> {
        self.client.fetch_tables_page(request)
    }

    fn fetch_tickets_page(&mut self, request: &PageRequest) -> Result<Page<Ticket>> {
        self.client.fetch_tickets_page(request)
    }

    fn load_projects(&mut self) -> Result<Vec<Project>> {
        self.client.projects()
    }

    fn load_tables(&mut self, project_id: &ProjectId) -> Result<Vec<Table>> {
        self.client.tables(project_id)
    }

    fn load_tickets(&mut self, table_id: &TableId) -> Result<Vec<Ticket>> {
        self.client.tickets(table_id)
    }

    fn load_users(&mut self) -> Result<Vec<WorkspaceUser>> {
        self.client.users()
    }

    fn load_stats(&mut self) -> Result<StatsPatch> {
        self.client.stats()
    }

    fn sync_all(&mut self) -> Result<SyncReport> {
        self.client.sync_fresh()
    }

    fn load_revisions(
        &mut self,
        project_id: Option<&ProjectId>,
        table_id: Option<&TableId>,
    ) -> Result<Vec<RevisionEntry>> {
        let query = RevisionQuery {
            project_id: project_id.cloned(),
            table_id: table_id.cloned(),
            ..RevisionQuery::default()
        };
        let history = self.client.revisions(&query)?;
        log::debug!(
            "loaded {} of {} revisions",
            history.revisions.len(),
            history.total_revisions
        );
        Ok(history.revisions)
    }
}

#[cfg(test)]
mod tests {
    use super::HttpRuntime;
    use anyhow::{Result, anyhow};
    use serde_json::json;
    use std::thread;
    use std::time::Duration;
    use syncdash_api::Client;
    use syncdash_app::{ProjectId, Store};
    use syncdash_views::{DashboardView, RevisionHistoryView, SyncRuntime};
    use tiny_http::{Header, Response, Server};

    /// Serves each scripted body in turn and returns the request URLs.
    fn serve(bodies: Vec<serde_json::Value>) -> Result<(String, thread::JoinHandle<Vec<String>>)> {
        let server =
            Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
        let addr = format!("http://{}/api", server.server_addr());
        let handle = thread::spawn(move || {
            let mut urls = Vec::new();
            for body in bodies {
                let request = server.recv().expect("request expected");
                urls.push(request.url().to_owned());
                let response = Response::from_string(body.to_string()).with_header(
                    Header::from_bytes("Content-Type", "application/json")
                        .expect("valid content type header"),
                );
                request.respond(response).expect("response should succeed");
            }
            urls
        });
        Ok((addr, handle))
    }

    fn runtime(addr: &str) -> Result<HttpRuntime> {
        Ok(HttpRuntime::new(Client::new(
            addr,
            "usr1",
            Duration::from_secs(2),
        )?))
    }

    #[test]
    fn revisions_are_narrowed_to_the_selected_project() -> Result<()> {
        let (addr, handle) = serve(vec![json!({
            "success": true,
            "data": {
                "revisions": [{
                    "uuid": "rev1",
                    "issueId": "rec1",
                    "columnType": "Status",
                    "oldValue": "Todo",
                    "newValue": "Done",
                    "createdDate": "2026-02-19T12:34:56Z",
                    "authoredBy": "usr1"
                }],
                "totalRevisions": 1
            }
        })])?;

        let mut runtime = runtime(&addr)?;
        let mut view = RevisionHistoryView::new();
        view.select(Some(ProjectId::from("app1")), None);
        assert!(view.load(&mut runtime).is_applied());
        assert_eq!(view.entries().len(), 1);

        let urls = handle.join().map_err(|_| anyhow!("mock server panicked"))?;
        assert_eq!(
            urls,
            vec!["/api/revision-history/filter?baseId=app1&userId=usr1&limit=1000"]
        );
        Ok(())
    }

    #[test]
    fn sync_records_report_and_reloads_projects() -> Result<()> {
        let (addr, handle) = serve(vec![
            json!({"success": true, "data": {"synced": {"bases": 2, "tables": 7, "tickets": 40, "users": 3}}}),
            json!({"success": true, "data": {"bases": [
                {"id": "app1", "name": "Platform", "permissionLevel": "create"},
                {"id": "app2", "name": "Mobile", "permissionLevel": "read"}
            ]}}),
        ])?;

        let store = Store::new();
        let mut runtime = runtime(&addr)?;
        let mut dashboard = DashboardView::new(store.clone());
        let now = time::macros::datetime!(2026-02-19 12:00 UTC);
        assert!(dashboard.sync(&mut runtime, now).is_applied());

        let summary = dashboard.summary();
        assert_eq!(summary.stats.projects, 2);
        assert_eq!(summary.stats.tickets, 40);
        assert_eq!(summary.last_sync_time, Some(now));

        let urls = handle.join().map_err(|_| anyhow!("mock server panicked"))?;
        assert_eq!(
            urls,
            vec![
                "/api/data/sync-fresh?userId=usr1",
                "/api/data/projects?userId=usr1"
            ]
        );
        Ok(())
    }

    #[test]
    fn unreachable_server_surfaces_as_error() -> Result<()> {
        let mut runtime = runtime("http://127.0.0.1:9/api")?;
        let error = runtime.load_stats().expect_err("nothing listens on port 9");
        assert!(error.to_string().contains("127.0.0.1:9"), "{error:#}");
        Ok(())
    }
}
