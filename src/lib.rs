//! Helpdesk ticketing core.
//!
//! Engines for the backend of a ticketing service, built on a pluggable
//! document store:
//!
//! - `sequence`: atomic allocation of sequential display numbers
//! - `assignment`: supervisor auto-assignment by load or rotation
//! - `filters`: two-stage filtering with cursor pagination
//! - `sla`: per-ticket SLA classification and cached fleet analytics
//! - `status`: status transitions that keep completion timestamps consistent
//!
//! `shared::CoreState` wires everything together from one [`config::CoreConfig`]
//! and one store handle.

pub mod assignment;
pub mod config;
pub mod filters;
pub mod sequence;
pub mod shared;
pub mod sla;
pub mod status;
pub mod store;

pub use assignment::{AssignmentEngine, AssignmentOutcome, AssignmentStrategy, SupervisorDirectory};
pub use config::CoreConfig;
pub use filters::{FilterEngine, FilterRequest, TicketPage};
pub use sequence::SequenceGenerator;
pub use shared::{CoreState, Supervisor, SupervisorRole, Ticket, TicketStatus};
pub use sla::{sla_status, sla_status_at, AnalyticsEngine, SlaLabel, SlaStatus};
pub use status::{update_status, StatusChange};
pub use store::{DocumentStore, MemoryStore, StoreError};
