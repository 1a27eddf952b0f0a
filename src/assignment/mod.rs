//! Assignment Engine
//!
//! Picks an owner for a new ticket among the supervisors eligible for its
//! area. Two strategies:
//!
//! - **Least loaded** (default): supervisor with the fewest open tickets,
//!   ties broken deterministically by ascending supervisor id
//! - **Round robin**: per-area rotation over the eligible set; the counter is
//!   process-local, so under multiple instances the rotation is only
//!   approximately round-robin per instance and resets on restart
//!
//! The engine is read-only against the store; persisting the chosen owner is
//! the caller's job. Absence of eligible supervisors is a normal outcome
//! ([`AssignmentOutcome::ManualRouting`]), not an error: the ticket is still
//! created, owned by the requester and flagged for manual routing.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::shared::models::{Supervisor, TicketStatus, TICKETS_COLLECTION};
use crate::store::{DocumentStore, FilterOp, Query};

/// Marker carried in `assignment_reason`; analytics distinguishes automatic
/// from manual routing by it.
pub const AUTO_ASSIGN_MARKER: &str = "Assigned automatically";

/// Store failures never surface here: open-ticket counts degrade to 0, so
/// assignment only fails when the supervisor lookup itself does.
#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("Supervisor directory error: {0}")]
    Directory(String),
}

/// Supervisor lookup collaborator, owned by the user-management subsystem.
/// Expected to return supervisors whose area set contains `area`, plus
/// admins scoped to it as a fallback pool.
#[async_trait]
pub trait SupervisorDirectory: Send + Sync {
    async fn eligible_supervisors(&self, area: &str) -> Result<Vec<Supervisor>, AssignmentError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    LeastLoaded,
    RoundRobin,
}

impl AssignmentStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::LeastLoaded => "least_loaded",
            Self::RoundRobin => "round_robin",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown assignment strategy: {0:?}")]
pub struct UnknownStrategy(String);

impl FromStr for AssignmentStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "least_loaded" => Ok(Self::LeastLoaded),
            "round_robin" => Ok(Self::RoundRobin),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum AssignmentOutcome {
    Assigned {
        supervisor: Supervisor,
        open_count: usize,
        reason: String,
    },
    /// No eligible supervisor; the ticket stays with the requester until a
    /// human routes it.
    ManualRouting { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SupervisorLoad {
    pub id: String,
    pub name: String,
    pub email: String,
    pub open_count: usize,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AreaAvailability {
    pub area: String,
    pub total_supervisors: usize,
    pub supervisors: Vec<SupervisorLoad>,
    pub total_load: usize,
    pub mean_load: f64,
}

/// Load threshold above which a supervisor stops counting as available.
const AVAILABILITY_THRESHOLD: usize = 10;

pub struct AssignmentEngine {
    store: Arc<dyn DocumentStore>,
    directory: Arc<dyn SupervisorDirectory>,
    strategy: AssignmentStrategy,
    round_robin: Mutex<HashMap<String, usize>>,
}

impl AssignmentEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        directory: Arc<dyn SupervisorDirectory>,
        strategy: AssignmentStrategy,
    ) -> Self {
        Self {
            store,
            directory,
            strategy,
            round_robin: Mutex::new(HashMap::new()),
        }
    }

    /// Selects a supervisor for a ticket targeting `area`.
    ///
    /// `category` and `priority` are recorded for future priority-aware
    /// strategies; neither influences the current ones.
    pub async fn assign(
        &self,
        area: &str,
        category: &str,
        priority: i32,
    ) -> Result<AssignmentOutcome, AssignmentError> {
        debug!("Assigning ticket: area={area}, category={category}, priority={priority}");

        let candidates = self.directory.eligible_supervisors(area).await?;
        if candidates.is_empty() {
            warn!("No supervisor found for area {area:?}");
            return Ok(AssignmentOutcome::ManualRouting {
                reason: format!("No supervisor available for area \"{area}\""),
            });
        }

        let loads = self.count_open_tickets(&candidates).await;
        let selected = match self.strategy {
            AssignmentStrategy::LeastLoaded => select_least_loaded(&loads),
            AssignmentStrategy::RoundRobin => self.select_round_robin(area, &loads),
        };
        let Some((supervisor, open_count)) = selected else {
            return Ok(AssignmentOutcome::ManualRouting {
                reason: "Unable to select a supervisor".to_string(),
            });
        };

        info!(
            "Ticket assigned to {} ({}) - {} open tickets",
            supervisor.name, supervisor.email, open_count
        );
        Ok(AssignmentOutcome::Assigned {
            reason: format!(
                "{AUTO_ASSIGN_MARKER} (strategy: {}, {open_count} open tickets)",
                self.strategy.label()
            ),
            supervisor: supervisor.clone(),
            open_count,
        })
    }

    /// Per-candidate load report for an area, for dashboards.
    pub async fn availability(&self, area: &str) -> Result<AreaAvailability, AssignmentError> {
        let candidates = self.directory.eligible_supervisors(area).await?;
        let loads = self.count_open_tickets(&candidates).await;

        let supervisors: Vec<SupervisorLoad> = loads
            .iter()
            .map(|(s, count)| SupervisorLoad {
                id: s.id.clone(),
                name: s.name.clone(),
                email: s.email.clone(),
                open_count: *count,
                available: *count < AVAILABILITY_THRESHOLD,
            })
            .collect();
        let total_load: usize = supervisors.iter().map(|s| s.open_count).sum();
        let mean_load = if supervisors.is_empty() {
            0.0
        } else {
            total_load as f64 / supervisors.len() as f64
        };

        Ok(AreaAvailability {
            area: area.to_string(),
            total_supervisors: supervisors.len(),
            supervisors,
            total_load,
            mean_load,
        })
    }

    /// One aggregate count per candidate, fanned out concurrently: the reads
    /// are independent and read-only. A failed count degrades to 0 so one
    /// flaky read does not fail the whole assignment.
    async fn count_open_tickets<'a>(
        &self,
        candidates: &'a [Supervisor],
    ) -> Vec<(&'a Supervisor, usize)> {
        let counts = join_all(candidates.iter().map(|s| self.open_count(s))).await;
        candidates.iter().zip(counts).collect()
    }

    async fn open_count(&self, supervisor: &Supervisor) -> usize {
        let query = Query::new(TICKETS_COLLECTION)
            .filter("owner_id", FilterOp::Eq, json!(supervisor.id))
            .filter("status", FilterOp::Neq, json!(TicketStatus::Done.wire()));
        match self.store.count(query).await {
            Ok(count) => {
                debug!("Supervisor {}: {count} open tickets", supervisor.name);
                count
            }
            Err(e) => {
                warn!(
                    "Failed to count open tickets for {}: {e}. Treating as 0",
                    supervisor.name
                );
                0
            }
        }
    }

    fn select_round_robin<'a>(
        &self,
        area: &str,
        loads: &[(&'a Supervisor, usize)],
    ) -> Option<(&'a Supervisor, usize)> {
        if loads.is_empty() {
            return None;
        }
        let mut counters = self.round_robin.lock().unwrap_or_else(|e| e.into_inner());
        let counter = counters.entry(area.to_string()).or_insert(0);
        let idx = *counter % loads.len();
        *counter = (idx + 1) % loads.len();
        debug!("Round-robin picked index {idx} for area {area}");
        Some(loads[idx])
    }
}

/// Minimum open count, ties broken by ascending supervisor id so the choice
/// is deterministic regardless of directory ordering.
fn select_least_loaded<'a>(loads: &[(&'a Supervisor, usize)]) -> Option<(&'a Supervisor, usize)> {
    loads
        .iter()
        .min_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| a.id.cmp(&b.id)))
        .copied()
}
