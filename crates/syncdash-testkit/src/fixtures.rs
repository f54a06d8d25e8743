// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Small, predictable records. Ids are 1-based: `app1`, `tbl_app1_1`,
//! `rec1`, `usr1`.

use syncdash_app::{
    Field, FieldId, Project, ProjectId, RevisionColumn, RevisionEntry, RevisionId, Table, TableId,
    Ticket, TicketId, WorkspaceUser,
};
use time::Duration;

use crate::{DashboardFaker, reference_time};

const PROJECT_NAMES: [&str; 6] = [
    "Platform",
    "Mobile",
    "Billing",
    "Growth",
    "Infrastructure",
    "Support",
];

pub fn project(id: &str, name: &str) -> Project {
    Project {
        id: ProjectId::from(id),
        name: name.to_owned(),
        permission_level: "create".to_owned(),
    }
}

pub fn projects(count: usize) -> Vec<Project> {
    (1..=count)
        .map(|index| {
            let name = PROJECT_NAMES[(index - 1) % PROJECT_NAMES.len()];
            project(&format!("app{index}"), &format!("{name} {index}"))
        })
        .collect()
}

pub fn table(project_id: &ProjectId, index: usize) -> Table {
    let field = |name: &str, field_type: &str| Field {
        id: FieldId::new(format!("fld{}", name.to_ascii_lowercase())),
        name: name.to_owned(),
        field_type: field_type.to_owned(),
    };
    Table {
        id: TableId::new(format!("tbl_{project_id}_{index}")),
        name: format!("Tickets {index}"),
        description: Some(format!("Issue tracker {index} for {project_id}")),
        fields: vec![
            field("Title", "singleLineText"),
            field("Status", "singleSelect"),
            field("Severity", "singleSelect"),
            field("Assignee", "singleCollaborator"),
        ],
    }
}

pub fn tables(project_id: &ProjectId, count: usize) -> Vec<Table> {
    (1..=count).map(|index| table(project_id, index)).collect()
}

pub fn tickets(count: usize) -> Vec<Ticket> {
    let mut faker = DashboardFaker::new(count as u64);
    (1..=count)
        .map(|index| faker.ticket(&format!("rec{index}")))
        .collect()
}

pub fn users(count: usize) -> Vec<WorkspaceUser> {
    let mut faker = DashboardFaker::new(count as u64 + 100);
    (1..=count)
        .map(|index| faker.user(&format!("usr{index}")))
        .collect()
}

/// Alternating status and assignee changes, newest first.
pub fn revisions(ticket_id: &TicketId, count: usize) -> Vec<RevisionEntry> {
    (1..=count)
        .map(|index| {
            let (column_type, old_value, new_value) = if index % 2 == 1 {
                (RevisionColumn::Status, "Todo", "In progress")
            } else {
                (RevisionColumn::Assignee, "Avery Walker", "Jordan Martin")
            };
            RevisionEntry {
                id: RevisionId::new(format!("rev{index}")),
                issue_id: ticket_id.clone(),
                column_type,
                old_value: old_value.to_owned(),
                new_value: new_value.to_owned(),
                created_date: reference_time() - Duration::hours(index as i64),
                authored_by: "usr1".to_owned(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{projects, revisions, tables, tickets, users};
    use syncdash_app::{ProjectId, TicketId};

    #[test]
    fn ids_follow_the_documented_scheme() {
        assert_eq!(projects(2)[1].id.as_str(), "app2");
        assert_eq!(
            tables(&ProjectId::from("app1"), 1)[0].id.as_str(),
            "tbl_app1_1"
        );
        assert_eq!(tickets(3)[2].id.as_str(), "rec3");
        assert_eq!(users(1)[0].id.as_str(), "usr1");
        assert_eq!(revisions(&TicketId::from("rec1"), 2).len(), 2);
    }

    #[test]
    fn generated_ids_are_unique() {
        let users = users(12);
        let mut ids: Vec<_> = users.iter().map(|user| user.id.clone()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 12);
    }
}
