// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use syncdash_app::{
    Project, ProjectId, RevisionEntry, StatsPatch, SyncReport, Table, TableId, Ticket, UserId,
    WorkspaceUser,
};
use syncdash_paging::{Page, PageRequest};
use url::Url;

pub const DEFAULT_REVISION_LIMIT: usize = 1000;

/// Which revision-history entries to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionQuery {
    pub project_id: Option<ProjectId>,
    pub table_id: Option<TableId>,
    pub limit: usize,
}

impl Default for RevisionQuery {
    fn default() -> Self {
        Self {
            project_id: None,
            table_id: None,
            limit: DEFAULT_REVISION_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RevisionHistory {
    pub revisions: Vec<RevisionEntry>,
    pub total_revisions: usize,
}

#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    user_id: UserId,
    access_token: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, user_id: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            bail!("api.base_url must not be empty");
        }
        if user_id.trim().is_empty() {
            bail!("api.user_id must not be empty -- set it in the config file or run `syncdash login <userId>`");
        }
        let base_url = Url::parse(trimmed)
            .with_context(|| format!("api.base_url {trimmed:?} is not a valid URL"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!(
                "api.base_url {trimmed:?} must use http or https, not {}",
                base_url.scheme()
            );
        }
        if base_url.query().is_some() || base_url.cannot_be_a_base() {
            bail!("api.base_url {trimmed:?} must be a plain URL without query parameters");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            user_id: UserId::new(user_id.trim()),
            access_token: None,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sent in the body of the `data/*` requests when set.
    pub fn set_access_token(&mut self, token: Option<String>) {
        self.access_token = token.filter(|token| !token.is_empty());
    }

    pub fn fetch_projects_page(&self, request: &PageRequest) -> Result<Page<Project>> {
        let body = PageBody::new(&self.user_id, request);
        self.paginated(&["pagination", "bases"], "bases", &body)
    }

    pub fn fetch_tables_page(&self, request: &PageRequest) -> Result<Page<Table>> {
        let project_id = request
            .context
            .project_id
            .as_ref()
            .ok_or_else(|| anyhow!("table paging needs a selected project"))?;
        let body = PageBody {
            base_id: Some(project_id.as_str()),
            ..PageBody::new(&self.user_id, request)
        };
        self.paginated(&["pagination", "tables"], "tables", &body)
    }

    pub fn fetch_tickets_page(&self, request: &PageRequest) -> Result<Page<Ticket>> {
        let context = &request.context;
        let (Some(project_id), Some(table_id)) = (&context.project_id, &context.table_id) else {
            bail!("ticket paging needs a selected project and table");
        };
        let body = PageBody {
            base_id: Some(project_id.as_str()),
            table_id: Some(table_id.as_str()),
            ..PageBody::new(&self.user_id, request)
        };
        self.paginated(&["pagination", "records"], "records", &body)
    }

    pub fn users(&self) -> Result<Vec<WorkspaceUser>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct UsersData {
            #[serde(default)]
            workspace_users: Vec<WorkspaceUser>,
        }

        let url = self.endpoint(&["users"], &[])?;
        let body = serde_json::json!({ "userId": self.user_id });
        let data: UsersData = self.send(self.http.post(url).json(&body), "workspace users")?;
        Ok(data.workspace_users)
    }

    pub fn stats(&self) -> Result<StatsPatch> {
        #[derive(Deserialize)]
        struct StatsData {
            #[serde(default)]
            stats: StatsPatch,
        }

        let data: StatsData = self.post_data(&["data", "stats"], "stats")?;
        Ok(data.stats)
    }

    pub fn projects(&self) -> Result<Vec<Project>> {
        #[derive(Deserialize)]
        struct ProjectsData {
            #[serde(default)]
            bases: Vec<Project>,
        }

        let data: ProjectsData = self.post_data(&["data", "projects"], "projects")?;
        Ok(data.bases)
    }

    pub fn tables(&self, project_id: &ProjectId) -> Result<Vec<Table>> {
        #[derive(Deserialize)]
        struct TablesData {
            #[serde(default)]
            tables: Vec<Table>,
        }

        let data: TablesData =
            self.post_data(&["data", "tables", project_id.as_str()], "tables")?;
        Ok(data.tables)
    }

    pub fn tickets(&self, table_id: &TableId) -> Result<Vec<Ticket>> {
        #[derive(Deserialize)]
        struct TicketsData {
            #[serde(default)]
            records: Vec<Ticket>,
        }

        let data: TicketsData =
            self.post_data(&["data", "tickets", table_id.as_str()], "tickets")?;
        Ok(data.records)
    }

    /// Asks the server to pull everything fresh from upstream.
    pub fn sync_fresh(&self) -> Result<SyncReport> {
        #[derive(Deserialize)]
        struct SyncData {
            #[serde(default)]
            synced: SyncReport,
        }

        let data: SyncData = self.post_data(&["data", "sync-fresh"], "sync")?;
        Ok(data.synced)
    }

    pub fn revisions(&self, query: &RevisionQuery) -> Result<RevisionHistory> {
        let limit = query.limit.to_string();
        let url = if query.project_id.is_some() || query.table_id.is_some() {
            let mut params = Vec::new();
            if let Some(project_id) = &query.project_id {
                params.push(("baseId", project_id.as_str()));
            }
            if let Some(table_id) = &query.table_id {
                params.push(("tableId", table_id.as_str()));
            }
            params.push(("userId", self.user_id.as_str()));
            params.push(("limit", limit.as_str()));
            self.endpoint(&["revision-history", "filter"], &params)?
        } else {
            self.endpoint(
                &["revision-history", "all", self.user_id.as_str()],
                &[("limit", limit.as_str())],
            )?
        };
        self.send(self.http.get(url), "revision history")
    }

    fn post_data<T: DeserializeOwned>(&self, segments: &[&str], what: &str) -> Result<T> {
        let url = self.endpoint(segments, &[("userId", self.user_id.as_str())])?;
        let body = TokenBody {
            access_token: self.access_token.as_deref(),
        };
        self.send(self.http.post(url).json(&body), what)
    }

    fn paginated<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        items_key: &str,
        body: &PageBody<'_>,
    ) -> Result<Page<T>> {
        let url = self.endpoint(segments, &[])?;
        let what = format!("{items_key} page");
        let mut data: PageData = self.send(self.http.post(url).json(body), &what)?;
        let items = data
            .rest
            .remove(items_key)
            .map(serde_json::from_value)
            .transpose()
            .with_context(|| format!("decode {items_key} in {what}"))?
            .unwrap_or_default();
        log::debug!(
            "{what}: has_more={} token={}",
            data.has_more,
            data.offset.is_some()
        );
        Ok(Page {
            items,
            continuation_token: data.offset.filter(|token| !token.is_empty()),
            has_more: data.has_more,
        })
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("api.base_url {} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .send()
            .map_err(|error| connection_error(self.base_url.as_str(), error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }

        let envelope: Envelope = response
            .json()
            .with_context(|| format!("decode {what} response"))?;
        if !envelope.success {
            bail!("{what} failed: {}", envelope.failure_reason());
        }
        let data = envelope
            .data
            .ok_or_else(|| anyhow!("{what} response carried no data"))?;
        serde_json::from_value(data).with_context(|| format!("decode {what} data"))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PageBody<'a> {
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    base_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    table_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<&'a str>,
    page_size: usize,
}

impl<'a> PageBody<'a> {
    fn new(user_id: &'a UserId, request: &'a PageRequest) -> Self {
        Self {
            user_id: user_id.as_str(),
            base_id: None,
            table_id: None,
            offset: request.continuation_token.as_deref(),
            page_size: request.page_size,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageData {
    #[serde(default)]
    offset: Option<String>,
    #[serde(default)]
    has_more: bool,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Envelope {
    success: bool,
    data: Option<Value>,
    message: Option<String>,
    error: Option<String>,
}

impl Envelope {
    fn failure_reason(&self) -> &str {
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .filter(|reason| !reason.is_empty())
            .unwrap_or("server reported failure")
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "cannot reach {} -- check api.base_url and that the server is running ({})",
        base_url,
        error
    )
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<Envelope>(body) {
        let reason = parsed.failure_reason();
        if reason != "server reported failure" {
            return anyhow!("server error ({}): {}", status.as_u16(), reason);
        }
    }

    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return anyhow!("server error ({}): {}", status.as_u16(), body.trim());
    }

    anyhow!("server returned {}", status.as_u16())
}

#[cfg(test)]
mod tests {
    use super::{Client, clean_error_response};
    use reqwest::StatusCode;
    use std::time::Duration;

    #[test]
    fn new_validates_inputs() {
        let timeout = Duration::from_secs(1);
        assert!(Client::new("", "usr1", timeout).is_err());
        assert!(Client::new("http://localhost:3000/api", " ", timeout).is_err());
        assert!(Client::new("not a url", "usr1", timeout).is_err());
        assert!(Client::new("ftp://example.com/api", "usr1", timeout).is_err());
        assert!(Client::new("http://example.com/api?x=1", "usr1", timeout).is_err());

        let client = Client::new("http://localhost:3000/api/", "usr1", timeout)
            .expect("valid client");
        assert_eq!(client.base_url(), "http://localhost:3000/api");
        assert_eq!(client.user_id().as_str(), "usr1");
    }

    #[test]
    fn endpoints_escape_ids_and_keep_the_base_path() {
        let client = Client::new("http://localhost:3000/api", "usr 1", Duration::from_secs(1))
            .expect("valid client");
        let url = client
            .endpoint(&["data", "tables", "app/1"], &[("userId", "usr 1")])
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/data/tables/app%2F1?userId=usr+1"
        );
    }

    #[test]
    fn error_bodies_are_summarized() {
        let from_envelope = clean_error_response(
            StatusCode::UNAUTHORIZED,
            r#"{"success":false,"error":"token expired"}"#,
        );
        assert_eq!(from_envelope.to_string(), "server error (401): token expired");

        let plain = clean_error_response(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(plain.to_string(), "server error (502): upstream down");

        let opaque = clean_error_response(StatusCode::INTERNAL_SERVER_ERROR, "{\"stack\":1}");
        assert_eq!(opaque.to_string(), "server returned 500");
    }
}
