use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Document, StoreError};

/// Category with fast-track handling: priority 0 and a tighter SLA window.
pub const PROJECTS_CATEGORY: &str = "Projects";

/// Collection holding all ticket documents.
pub const TICKETS_COLLECTION: &str = "tickets";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Done,
}

impl TicketStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In progress",
            Self::Done => "Done",
        }
    }

    /// Forgiving parse: accepts wire form, label form and mixed case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn wire(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Store document id, the true primary key. Not part of the payload.
    #[serde(skip_serializing, default)]
    pub id: String,
    /// Sequential display number ("CHM-0001"). Unique enough for display,
    /// never used as a key: a degraded allocation may fall back to a
    /// timestamp-derived number.
    pub number: Option<String>,
    pub category: String,
    pub area: String,
    /// Sub-area within the production flow.
    pub gate: Option<String>,
    /// Fixed at creation: "Projects" tickets get 0, others the requested
    /// value (default 1). Never recomputed.
    pub priority: i32,
    pub status: TicketStatus,
    pub owner_id: Option<String>,
    pub owner_name: Option<String>,
    pub assignment_reason: Option<String>,
    pub requester_id: String,
    pub reference_code: Option<String>,
    pub description: String,
    pub opened_at: DateTime<Utc>,
    /// Set exactly when `status == Done`, cleared on reopen.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn derived_priority(category: &str, requested: Option<i32>) -> i32 {
        if category == PROJECTS_CATEGORY {
            0
        } else {
            requested.unwrap_or(1)
        }
    }

    pub fn new(
        category: impl Into<String>,
        area: impl Into<String>,
        description: impl Into<String>,
        requester_id: impl Into<String>,
        requested_priority: Option<i32>,
    ) -> Self {
        let category = category.into();
        let priority = Self::derived_priority(&category, requested_priority);
        Self {
            id: String::new(),
            number: None,
            category,
            area: area.into(),
            gate: None,
            priority,
            status: TicketStatus::Open,
            owner_id: None,
            owner_name: None,
            assignment_reason: None,
            requester_id: requester_id.into(),
            reference_code: None,
            description: description.into(),
            opened_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status != TicketStatus::Done
    }

    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let mut ticket: Ticket = serde_json::from_value(doc.data.clone())?;
        ticket.id = doc.id.clone();
        Ok(ticket)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, StoreError> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorRole {
    Supervisor,
    Admin,
}

/// Lookup target for the assignment engine; owned by user management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supervisor {
    pub id: String,
    pub name: String,
    pub email: String,
    pub areas: Vec<String>,
    pub role: SupervisorRole,
}

impl Supervisor {
    pub fn covers_area(&self, area: &str) -> bool {
        self.areas.iter().any(|a| a == area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projects_category_forces_priority_zero() {
        assert_eq!(Ticket::derived_priority(PROJECTS_CATEGORY, Some(3)), 0);
        assert_eq!(Ticket::derived_priority("Maintenance", Some(3)), 3);
        assert_eq!(Ticket::derived_priority("Maintenance", None), 1);
    }

    #[test]
    fn status_parse_is_forgiving() {
        assert_eq!(TicketStatus::parse("open"), Some(TicketStatus::Open));
        assert_eq!(TicketStatus::parse("Open"), Some(TicketStatus::Open));
        assert_eq!(
            TicketStatus::parse("In Progress"),
            Some(TicketStatus::InProgress)
        );
        assert_eq!(TicketStatus::parse("nope"), None);
    }

    #[test]
    fn document_roundtrip_carries_id_outside_payload() {
        let mut ticket = Ticket::new("Maintenance", "Engineering", "pump failure", "user-1", None);
        ticket.number = Some("CHM-0001".into());

        let value = ticket.to_value().unwrap();
        assert!(value.get("id").is_none());

        let doc = Document::new("abc123", value);
        let restored = Ticket::from_document(&doc).unwrap();
        assert_eq!(restored.id, "abc123");
        assert_eq!(restored.number.as_deref(), Some("CHM-0001"));
        assert_eq!(restored.status, TicketStatus::Open);
    }

    #[test]
    fn missing_optional_fields_deserialize() {
        let doc = Document::new(
            "t1",
            json!({
                "number": null,
                "category": "Maintenance",
                "area": "Engineering",
                "gate": null,
                "priority": 1,
                "status": "open",
                "owner_id": null,
                "owner_name": null,
                "assignment_reason": null,
                "requester_id": "u1",
                "reference_code": null,
                "description": "x",
                "opened_at": "2026-08-01T00:00:00Z",
                "completed_at": null
            }),
        );
        let ticket = Ticket::from_document(&doc).unwrap();
        assert!(ticket.is_open());
        assert!(ticket.completed_at.is_none());
    }
}
