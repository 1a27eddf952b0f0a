pub mod models;
pub mod state;

pub use models::{Supervisor, SupervisorRole, Ticket, TicketStatus, PROJECTS_CATEGORY};
pub use state::CoreState;
