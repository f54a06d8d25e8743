// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::ids::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub permission_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: TableId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Table {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_time: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<String>,
}

impl Ticket {
    /// Renders a field the way the tickets grid shows it. Collaborator
    /// objects resolve to their name (or email), lists join with ", ".
    pub fn field_text(&self, name: &str) -> Option<String> {
        self.fields.get(name).and_then(value_text)
    }

    pub fn title(&self) -> Option<String> {
        self.field_text("Title")
    }

    pub fn status(&self) -> Option<String> {
        self.field_text("Status")
    }

    pub fn assignee(&self) -> Option<String> {
        self.field_text("Assignee")
    }

    pub fn severity(&self) -> Option<String> {
        self.field_text("Severity")
    }

    pub fn priority(&self) -> Option<String> {
        self.field_text("Priority")
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        Value::Object(object) => object
            .get("name")
            .or_else(|| object.get("email"))
            .and_then(value_text),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceUser {
    pub id: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited_to_airtable_by_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_level: Option<String>,
}

impl WorkspaceUser {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevisionColumn {
    Status,
    Assignee,
}

impl RevisionColumn {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "Status",
            Self::Assignee => "Assignee",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Status" => Some(Self::Status),
            "Assignee" => Some(Self::Assignee),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionEntry {
    #[serde(rename = "uuid")]
    pub id: RevisionId,
    pub issue_id: TicketId,
    pub column_type: RevisionColumn,
    #[serde(default)]
    pub old_value: String,
    #[serde(default)]
    pub new_value: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
    #[serde(default)]
    pub authored_by: String,
}

/// Counts reported by a full server-side sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    #[serde(default)]
    pub bases: usize,
    #[serde(default)]
    pub tables: usize,
    #[serde(default)]
    pub tickets: usize,
    #[serde(default)]
    pub users: usize,
}

#[cfg(test)]
mod tests {
    use super::{RevisionColumn, RevisionEntry, Table, Ticket, WorkspaceUser};
    use serde_json::json;

    #[test]
    fn ticket_field_text_flattens_collaborators_and_lists() {
        let ticket: Ticket = serde_json::from_value(json!({
            "id": "rec1",
            "fields": {
                "Title": "Printer on fire",
                "Status": "Open",
                "Assignee": {"id": "usr1", "email": "a@example.com", "name": "Avery"},
                "Labels": ["hw", "urgent"],
                "Points": 3,
                "Empty": null
            },
            "createdTime": "2025-03-01T10:00:00.000Z"
        }))
        .expect("ticket should decode");

        assert_eq!(ticket.title().as_deref(), Some("Printer on fire"));
        assert_eq!(ticket.status().as_deref(), Some("Open"));
        assert_eq!(ticket.assignee().as_deref(), Some("Avery"));
        assert_eq!(ticket.field_text("Labels").as_deref(), Some("hw, urgent"));
        assert_eq!(ticket.field_text("Points").as_deref(), Some("3"));
        assert_eq!(ticket.field_text("Empty"), None);
        assert_eq!(ticket.priority(), None);
        assert!(ticket.created_time.is_some());
    }

    #[test]
    fn table_tolerates_missing_optional_fields() {
        let table: Table = serde_json::from_value(json!({
            "id": "tbl1",
            "name": "Bugs",
            "baseId": "app1"
        }))
        .expect("table should decode");
        assert!(table.fields.is_empty());
        assert!(table.description.is_none());
        assert!(table.field("Status").is_none());
    }

    #[test]
    fn user_display_name_falls_back_to_email() {
        let user: WorkspaceUser =
            serde_json::from_value(json!({"id": "usr1", "email": "k@example.com", "name": " "}))
                .expect("user should decode");
        assert_eq!(user.display_name(), "k@example.com");
    }

    #[test]
    fn revision_entry_decodes_wire_shape() {
        let entry: RevisionEntry = serde_json::from_value(json!({
            "_id": "mongo-id",
            "uuid": "rev-1",
            "issueId": "rec9",
            "columnType": "Assignee",
            "oldValue": "Avery",
            "newValue": "Jordan",
            "createdDate": "2025-02-11T08:30:00Z",
            "authoredBy": "usr4"
        }))
        .expect("revision should decode");
        assert_eq!(entry.id.as_str(), "rev-1");
        assert_eq!(entry.column_type, RevisionColumn::Assignee);
        assert_eq!(RevisionColumn::parse("Status"), Some(RevisionColumn::Status));
        assert_eq!(RevisionColumn::parse("status"), None);
    }
}
