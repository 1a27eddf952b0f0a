//! End-to-end scenarios across the engine bundle: a ticket is numbered,
//! assigned, persisted, listed, completed and classified, all through the
//! public `CoreState` surface against the in-memory store.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use ticket_core::assignment::{AssignmentError, AUTO_ASSIGN_MARKER};
use ticket_core::shared::models::TICKETS_COLLECTION;
use ticket_core::sla::{sla_status_at, SlaLabel};
use ticket_core::{
    update_status, AssignmentOutcome, CoreConfig, CoreState, DocumentStore, FilterRequest,
    MemoryStore, Supervisor, SupervisorDirectory, SupervisorRole, Ticket, TicketStatus,
};

struct FixedDirectory {
    supervisors: Vec<Supervisor>,
}

#[async_trait]
impl SupervisorDirectory for FixedDirectory {
    async fn eligible_supervisors(&self, area: &str) -> Result<Vec<Supervisor>, AssignmentError> {
        Ok(self
            .supervisors
            .iter()
            .filter(|s| s.covers_area(area))
            .cloned()
            .collect())
    }
}

fn supervisor(id: &str, name: &str, area: &str) -> Supervisor {
    Supervisor {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{id}@example.com"),
        areas: vec![area.to_string()],
        role: SupervisorRole::Supervisor,
    }
}

fn core_with(supervisors: Vec<Supervisor>) -> Arc<CoreState> {
    let _ = env_logger::builder().is_test(true).try_init();
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    Arc::new(CoreState::new(
        CoreConfig::default(),
        store,
        Arc::new(FixedDirectory { supervisors }),
    ))
}

/// Full intake path: allocate a number, pick an owner, persist the ticket.
async fn create_ticket(core: &CoreState, id: &str, category: &str, area: &str) -> Ticket {
    let mut ticket = Ticket::new(category, area, "scenario ticket", "requester-1", None);
    ticket.number = Some(core.sequence.next_ticket_number_or_fallback().await);

    match core
        .assignment
        .assign(area, category, ticket.priority)
        .await
        .unwrap()
    {
        AssignmentOutcome::Assigned {
            supervisor, reason, ..
        } => {
            ticket.owner_id = Some(supervisor.id);
            ticket.owner_name = Some(supervisor.name);
            ticket.assignment_reason = Some(reason);
        }
        AssignmentOutcome::ManualRouting { reason } => {
            ticket.owner_id = Some(ticket.requester_id.clone());
            ticket.assignment_reason = Some(reason);
        }
    }

    core.store
        .set(TICKETS_COLLECTION, id, ticket.to_value().unwrap())
        .await
        .unwrap();
    ticket.id = id.to_string();
    ticket
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn fifty_concurrent_intakes_get_fifty_distinct_numbers() {
    let core = core_with(vec![supervisor("sup-a", "Alice", "Engineering")]);

    let mut handles = Vec::new();
    for i in 0..50 {
        let core = Arc::clone(&core);
        handles.push(tokio::spawn(async move {
            create_ticket(&core, &format!("t{i:02}"), "Maintenance", "Engineering").await
        }));
    }

    let mut numbers = BTreeSet::new();
    for handle in handles {
        let ticket = handle.await.unwrap();
        numbers.insert(ticket.number.unwrap());
    }

    let expected: BTreeSet<String> = (1..=50).map(|n| format!("CHM-{n:04}")).collect();
    assert_eq!(numbers, expected);
}

#[tokio::test]
async fn intake_assigns_least_loaded_supervisor() {
    let core = core_with(vec![
        supervisor("sup-a", "Alice", "Engineering"),
        supervisor("sup-b", "Bruna", "Engineering"),
    ]);

    // Give Alice existing load so Bruna wins the next assignment.
    for i in 0..3 {
        let mut t = Ticket::new("Maintenance", "Engineering", "d", "req-1", None);
        t.owner_id = Some("sup-a".into());
        core.store
            .set(TICKETS_COLLECTION, &format!("pre{i}"), t.to_value().unwrap())
            .await
            .unwrap();
    }

    let ticket = create_ticket(&core, "t-new", "Maintenance", "Engineering").await;
    assert_eq!(ticket.owner_id.as_deref(), Some("sup-b"));
    assert!(ticket
        .assignment_reason
        .unwrap()
        .starts_with(AUTO_ASSIGN_MARKER));
}

#[tokio::test]
async fn intake_without_supervisors_falls_back_to_requester() {
    let core = core_with(vec![]);
    let ticket = create_ticket(&core, "t1", "Maintenance", "Engineering").await;

    assert_eq!(ticket.owner_id.as_deref(), Some("requester-1"));
    let reason = ticket.assignment_reason.unwrap();
    assert!(reason.contains("Engineering"));
    assert!(!reason.starts_with(AUTO_ASSIGN_MARKER));
}

#[tokio::test]
async fn listing_promotes_projects_alongside_requested_category() {
    let core = core_with(vec![supervisor("sup-a", "Alice", "Engineering")]);
    create_ticket(&core, "t1", "Manutenção", "Engineering").await;
    create_ticket(&core, "t2", "Projects", "Engineering").await;
    create_ticket(&core, "t3", "Manutenção", "Engineering").await;

    let page = core
        .filters
        .page(&FilterRequest {
            category: Some("Manutenção".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    let ids: Vec<&str> = page.items.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "t3", "t2"]);
    // Projects intake got priority 0 without anyone requesting it.
    assert_eq!(page.items[2].priority, 0);
}

#[tokio::test]
async fn completing_a_ticket_flows_into_sla_and_analytics() {
    let core = core_with(vec![supervisor("sup-a", "Alice", "Engineering")]);
    create_ticket(&core, "t1", "Maintenance", "Engineering").await;

    let change = update_status(&core.store, "t1", TicketStatus::Done)
        .await
        .unwrap();
    assert_eq!(change.previous, TicketStatus::Open);
    assert!(change.completed_at.is_some());

    let doc = core.store.get(TICKETS_COLLECTION, "t1").await.unwrap().unwrap();
    let ticket = Ticket::from_document(&doc).unwrap();
    let status = sla_status_at(&ticket, Utc::now());
    assert_eq!(status.label, SlaLabel::OnTime);
    assert_eq!(status.within_deadline, Some(true));

    let report = core.analytics.full_report_uncached().await.unwrap();
    assert_eq!(report.metrics.total, 1);
    assert_eq!(report.metrics.done, 1);
    assert_eq!(report.metrics.sla_compliance_pct, 100.0);
    assert_eq!(report.supervisors[0].supervisor_id, "sup-a");
}

#[tokio::test]
async fn projects_sla_boundary_at_risk_then_late() {
    let core = core_with(vec![supervisor("sup-a", "Alice", "Engineering")]);
    let ticket = create_ticket(&core, "t1", "Projects", "Engineering").await;
    let opened = ticket.opened_at;

    assert_eq!(
        sla_status_at(&ticket, opened + Duration::hours(47)).label,
        SlaLabel::AtRisk
    );
    assert_eq!(
        sla_status_at(&ticket, opened + Duration::hours(49)).label,
        SlaLabel::Late
    );
}

#[tokio::test]
async fn paginated_listing_covers_the_whole_intake() {
    let core = core_with(vec![supervisor("sup-a", "Alice", "Engineering")]);
    for i in 0..12 {
        create_ticket(&core, &format!("t{i:02}"), "Maintenance", "Engineering").await;
    }

    let mut collected = Vec::new();
    let mut cursor = None;
    loop {
        let page = core
            .filters
            .page(&FilterRequest {
                owner: Some("sup-a".into()),
                cursor,
                limit: Some(5),
                ..Default::default()
            })
            .await
            .unwrap();
        collected.extend(page.items.iter().map(|t| t.id.clone()));
        if !page.has_more {
            break;
        }
        cursor = page.next_cursor;
    }

    let expected: Vec<String> = (0..12).map(|i| format!("t{i:02}")).collect();
    assert_eq!(collected, expected);
}
