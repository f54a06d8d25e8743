// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod fixtures;

use anyhow::{Result, anyhow, bail};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use syncdash_app::{
    CollectionUpdate, ProjectId, TableId, Ticket, TicketId, UserId, WorkspaceUser,
};
use syncdash_paging::{Page, PageRequest, PageSource};
use time::{Duration, OffsetDateTime};

const TICKET_SUBJECTS: [&str; 12] = [
    "Login page",
    "Export button",
    "Sync worker",
    "Billing webhook",
    "Search index",
    "Avatar upload",
    "Email digest",
    "Audit log",
    "Settings form",
    "Mobile layout",
    "Rate limiter",
    "Session cookie",
];
const TICKET_PROBLEMS: [&str; 10] = [
    "times out",
    "returns stale rows",
    "drops the last page",
    "renders twice",
    "ignores the filter",
    "crashes on empty input",
    "loses focus",
    "double-charges",
    "misses updates",
    "shows wrong totals",
];
const STATUSES: [&str; 5] = ["Todo", "In progress", "In review", "Blocked", "Done"];
const SEVERITIES: [&str; 4] = ["Critical", "High", "Medium", "Low"];
const PRIORITIES: [&str; 3] = ["P1", "P2", "P3"];

const FIRST_NAMES: [&str; 12] = [
    "Avery", "Jordan", "Taylor", "Riley", "Morgan", "Casey", "Alex", "Quinn", "Parker", "Drew",
    "Kai", "Rowan",
];
const LAST_NAMES: [&str; 12] = [
    "Walker", "Martin", "Hill", "Evans", "Lopez", "Gray", "Ward", "Young", "Diaz", "Reed",
    "Turner", "Brooks",
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded generator of plausible tickets and workspace members.
#[derive(Debug, Clone)]
pub struct DashboardFaker {
    rng: DeterministicRng,
}

impl DashboardFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
        }
    }

    pub fn ticket(&mut self, id: &str) -> Ticket {
        let title = format!(
            "{} {}",
            self.pick(&TICKET_SUBJECTS),
            self.pick(&TICKET_PROBLEMS)
        );
        let mut fields = Map::new();
        fields.insert("Title".to_owned(), Value::String(title));
        fields.insert("Status".to_owned(), json!(self.pick(&STATUSES)));
        fields.insert("Severity".to_owned(), json!(self.pick(&SEVERITIES)));
        fields.insert("Priority".to_owned(), json!(self.pick(&PRIORITIES)));
        let first = self.pick(&FIRST_NAMES);
        let last = self.pick(&LAST_NAMES);
        fields.insert(
            "Assignee".to_owned(),
            json!({"name": format!("{first} {last}"), "email": email(first, last)}),
        );
        let offset_minutes = self.rng.int_n(60 * 24 * 90) as i64;
        Ticket {
            id: TicketId::from(id),
            fields,
            created_time: Some(reference_time() - Duration::minutes(offset_minutes)),
            row_id: None,
        }
    }

    pub fn user(&mut self, id: &str) -> WorkspaceUser {
        let first = self.pick(&FIRST_NAMES);
        let last = self.pick(&LAST_NAMES);
        WorkspaceUser {
            id: UserId::from(id),
            email: email(first, last),
            name: Some(format!("{first} {last}")),
            state: Some("active".to_owned()),
            created_time: Some(fixture_datetime().to_owned()),
            last_activity_time: None,
            invited_to_airtable_by_user_id: None,
            workspace_id: Some("wsp1".to_owned()),
            workspace_name: Some("Engineering".to_owned()),
            permission_level: Some("edit".to_owned()),
        }
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    /// Replaces one randomly chosen slice with up to five records. Ids come
    /// from a small pool, so keys repeat across calls and duplicate ids
    /// show up within a single update.
    pub fn collection_update(&mut self) -> CollectionUpdate {
        let count = self.rng.int_n(6);
        match self.rng.int_n(4) {
            0 => CollectionUpdate::Projects(
                (0..count)
                    .map(|_| {
                        let index = self.rng.int_n(4) + 1;
                        fixtures::project(&format!("app{index}"), "Project")
                    })
                    .collect(),
            ),
            1 => {
                let project_id = ProjectId::from(format!("app{}", self.rng.int_n(3) + 1));
                let tables = fixtures::tables(&project_id, count);
                CollectionUpdate::Tables { project_id, tables }
            }
            2 => CollectionUpdate::Tickets {
                table_id: TableId::from(format!("tbl{}", self.rng.int_n(3) + 1)),
                tickets: (1..=count)
                    .map(|index| self.ticket(&format!("rec{index}")))
                    .collect(),
            },
            _ => CollectionUpdate::Users(
                (0..count)
                    .map(|_| {
                        let index = self.rng.int_n(4) + 1;
                        self.user(&format!("usr{index}"))
                    })
                    .collect(),
            ),
        }
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

fn email(first: &str, last: &str) -> String {
    format!(
        "{}.{}@example.com",
        first.to_ascii_lowercase(),
        last.to_ascii_lowercase()
    )
}

/// A page source that replays fixed pages. Page `n` is fetched with the
/// token [`ScriptedPages::token_for`]`(n)`; tokens it never issued are
/// rejected like a server would.
#[derive(Debug, Clone)]
pub struct ScriptedPages<T> {
    pages: Vec<Vec<T>>,
    failing: BTreeSet<usize>,
    requests: Vec<PageRequest>,
}

impl<T: Clone> ScriptedPages<T> {
    pub fn new(pages: Vec<Vec<T>>) -> Self {
        Self {
            pages,
            failing: BTreeSet::new(),
            requests: Vec::new(),
        }
    }

    pub fn chunked(items: Vec<T>, page_size: usize) -> Self {
        let pages = items
            .chunks(page_size.max(1))
            .map(<[T]>::to_vec)
            .collect();
        Self::new(pages)
    }

    /// The next fetch of `page` fails with a transport error.
    pub fn fail_once(mut self, page: usize) -> Self {
        self.failing.insert(page);
        self
    }

    pub fn token_for(page: usize) -> String {
        format!("cursor-{page}")
    }

    pub fn requests(&self) -> &[PageRequest] {
        &self.requests
    }

    fn page_for(token: Option<&str>) -> Result<usize> {
        let Some(token) = token else {
            return Ok(0);
        };
        token
            .strip_prefix("cursor-")
            .and_then(|page| page.parse::<usize>().ok())
            .ok_or_else(|| anyhow!("unknown continuation token {token:?}"))
    }
}

impl<T: Clone> PageSource<T> for ScriptedPages<T> {
    fn fetch_page(&mut self, request: &PageRequest) -> Result<Page<T>> {
        self.requests.push(request.clone());
        let index = Self::page_for(request.continuation_token.as_deref())?;
        if self.failing.remove(&index) {
            bail!("connection reset while fetching page {index}");
        }
        let items = match self.pages.get(index) {
            Some(items) => items.clone(),
            None if index == 0 => Vec::new(),
            None => bail!("page {index} does not exist"),
        };
        let has_more = index + 1 < self.pages.len();
        Ok(Page {
            items,
            continuation_token: has_more.then(|| Self::token_for(index + 1)),
            has_more,
        })
    }
}

pub fn fixture_datetime() -> &'static str {
    "2026-02-19T12:34:56Z"
}

pub fn reference_time() -> OffsetDateTime {
    time::macros::datetime!(2026-02-19 12:34:56 UTC)
}
