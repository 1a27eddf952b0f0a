//! Status transitions
//!
//! Single write path for ticket status changes. Moving into Done stamps
//! `completed_at`; moving back out clears it, so SLA classification and
//! resolution metrics always see a timestamp consistent with the status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;
use serde_json::{json, Value};

use crate::shared::models::{Ticket, TicketStatus, TICKETS_COLLECTION};
use crate::store::{with_retry, DocumentStore, RetryPolicy, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("ticket {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub ticket_id: String,
    pub previous: TicketStatus,
    pub new: TicketStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Moves a ticket to `new_status`, keeping `completed_at` in sync.
pub async fn update_status(
    store: &Arc<dyn DocumentStore>,
    ticket_id: &str,
    new_status: TicketStatus,
) -> Result<StatusChange, StatusError> {
    let doc = store
        .get(TICKETS_COLLECTION, ticket_id)
        .await?
        .ok_or_else(|| StatusError::NotFound(ticket_id.to_string()))?;
    let ticket = Ticket::from_document(&doc)?;
    let previous = ticket.status;

    let completed_at = match new_status {
        TicketStatus::Done => Some(Utc::now()),
        _ => None,
    };
    let fields = json!({
        "status": new_status.wire(),
        "completed_at": completed_at.map(|t| json!(t)).unwrap_or(Value::Null),
    });

    with_retry(RetryPolicy::default(), "update_ticket_status", || {
        store.update(TICKETS_COLLECTION, ticket_id, fields.clone())
    })
    .await?;

    info!(
        "Ticket {ticket_id} moved from {} to {}",
        previous.label(),
        new_status.label()
    );
    Ok(StatusChange {
        ticket_id: ticket_id.to_string(),
        previous,
        new: new_status,
        completed_at,
    })
}
