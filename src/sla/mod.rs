//! SLA & Analytics Engine
//!
//! Per-ticket deadline classification plus fleet-wide aggregates. SLA windows
//! depend on category: "Projects" tickets get 2 days, everything else 3.
//! All comparisons happen on UTC instants; the store boundary already
//! normalized every timestamp.
//!
//! Aggregates are computed in a single pass over one bounded time window and
//! cached in-process for a few minutes, since recomputation scans the whole
//! period. Insights derive purely from already-computed aggregates and never
//! touch the store again.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use serde_json::json;

use crate::config::CoreConfig;
use crate::shared::models::{Ticket, TicketStatus, PROJECTS_CATEGORY, TICKETS_COLLECTION};
use crate::store::{DocumentStore, FilterOp, Query, StoreError};

/// Window within which an open ticket counts as at risk.
const AT_RISK_WINDOW_HOURS: i64 = 24;

/// Open load above which a supervisor is reported as overloaded.
const OVERLOAD_THRESHOLD: usize = 10;

/// Resolution rate below which an area is flagged.
const LOW_AREA_RESOLUTION_PCT: f64 = 40.0;

pub fn sla_window_days(category: &str) -> i64 {
    if category == PROJECTS_CATEGORY {
        2
    } else {
        3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaLabel {
    OnTime,
    AtRisk,
    Late,
}

impl SlaLabel {
    pub fn label(&self) -> &'static str {
        match self {
            Self::OnTime => "On time",
            Self::AtRisk => "At risk",
            Self::Late => "Late",
        }
    }
}

impl std::fmt::Display for SlaLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlaStatus {
    pub label: SlaLabel,
    pub deadline: DateTime<Utc>,
    /// `Some` only for completed tickets: did completion beat the deadline.
    pub within_deadline: Option<bool>,
    pub at_risk: bool,
}

/// Pure deadline classification against an explicit `now`, so boundary
/// behavior is testable without a clock.
pub fn sla_status_at(ticket: &Ticket, now: DateTime<Utc>) -> SlaStatus {
    let deadline = ticket.opened_at + chrono::Duration::days(sla_window_days(&ticket.category));

    if ticket.status == TicketStatus::Done {
        // Completed without a completion timestamp would break the model
        // invariant; classify it as within deadline rather than guessing.
        let on_time = ticket
            .completed_at
            .map(|done| done <= deadline)
            .unwrap_or(true);
        return SlaStatus {
            label: if on_time { SlaLabel::OnTime } else { SlaLabel::Late },
            deadline,
            within_deadline: Some(on_time),
            at_risk: false,
        };
    }

    if now > deadline {
        SlaStatus {
            label: SlaLabel::Late,
            deadline,
            within_deadline: None,
            at_risk: false,
        }
    } else if deadline - now <= chrono::Duration::hours(AT_RISK_WINDOW_HOURS) {
        SlaStatus {
            label: SlaLabel::AtRisk,
            deadline,
            within_deadline: None,
            at_risk: true,
        }
    } else {
        SlaStatus {
            label: SlaLabel::OnTime,
            deadline,
            within_deadline: None,
            at_risk: false,
        }
    }
}

pub fn sla_status(ticket: &Ticket) -> SlaStatus {
    sla_status_at(ticket, Utc::now())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Metrics {
    pub period_days: i64,
    pub total: usize,
    pub open: usize,
    pub in_progress: usize,
    pub done: usize,
    pub resolution_rate_pct: f64,
    pub mean_resolution_hours: f64,
    pub sla_compliance_pct: f64,
    pub by_priority: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupervisorMetrics {
    pub supervisor_id: String,
    pub supervisor_name: String,
    pub total: usize,
    pub open: usize,
    pub in_progress: usize,
    pub done: usize,
    /// Open plus in-progress tickets.
    pub current_load: usize,
    pub resolution_rate_pct: f64,
    pub mean_resolution_hours: f64,
    pub by_category: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AreaMetrics {
    pub area: String,
    pub total: usize,
    pub open: usize,
    pub done: usize,
    pub resolution_rate_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Warning,
    Success,
    Info,
}

#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub metrics: Metrics,
    pub supervisors: Vec<SupervisorMetrics>,
    pub areas: Vec<AreaMetrics>,
    pub insights: Vec<Insight>,
}

struct CachedReport {
    at: Instant,
    report: Report,
}

pub struct AnalyticsEngine {
    store: Arc<dyn DocumentStore>,
    period_days: i64,
    cache_ttl: Duration,
    cache: Mutex<Option<CachedReport>>,
}

impl AnalyticsEngine {
    pub fn new(store: Arc<dyn DocumentStore>, config: &CoreConfig) -> Self {
        Self {
            store,
            period_days: config.analytics_period_days,
            cache_ttl: Duration::from_secs(config.analytics_cache_ttl_secs),
            cache: Mutex::new(None),
        }
    }

    async fn tickets_in_period(&self, period_days: i64) -> Result<Vec<Ticket>, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(period_days);
        let docs = self
            .store
            .query(Query::new(TICKETS_COLLECTION).filter(
                "opened_at",
                FilterOp::Gte,
                json!(cutoff),
            ))
            .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match Ticket::from_document(doc) {
                Ok(ticket) => Some(ticket),
                Err(e) => {
                    warn!("Skipping undecodable ticket document {}: {e}", doc.id);
                    None
                }
            })
            .collect())
    }

    /// Fleet-wide metrics over the last `period_days`, one query, one pass.
    pub async fn aggregate_metrics(&self, period_days: i64) -> Result<Metrics, StoreError> {
        let tickets = self.tickets_in_period(period_days).await?;

        let mut metrics = Metrics {
            period_days,
            ..Default::default()
        };
        let mut resolution_hours = Vec::new();
        let mut done_within_sla = 0usize;

        for ticket in &tickets {
            metrics.total += 1;
            match ticket.status {
                TicketStatus::Open => metrics.open += 1,
                TicketStatus::InProgress => metrics.in_progress += 1,
                TicketStatus::Done => metrics.done += 1,
            }
            *metrics
                .by_priority
                .entry(ticket.priority.to_string())
                .or_insert(0) += 1;
            *metrics
                .by_category
                .entry(ticket.category.clone())
                .or_insert(0) += 1;

            if ticket.status == TicketStatus::Done {
                if let Some(hours) = resolution_time_hours(ticket) {
                    resolution_hours.push(hours);
                }
                if sla_status(ticket).within_deadline == Some(true) {
                    done_within_sla += 1;
                }
            }
        }

        metrics.resolution_rate_pct = percentage(metrics.done, metrics.total);
        metrics.mean_resolution_hours = mean(&resolution_hours);
        metrics.sla_compliance_pct = percentage(done_within_sla, metrics.done);
        Ok(metrics)
    }

    /// Per-supervisor breakdown, accumulated in the same single pass over the
    /// period's tickets. No per-candidate re-queries.
    pub async fn supervisor_metrics(&self) -> Result<Vec<SupervisorMetrics>, StoreError> {
        let tickets = self.tickets_in_period(self.period_days).await?;

        let mut by_owner: BTreeMap<String, (String, Vec<&Ticket>)> = BTreeMap::new();
        for ticket in &tickets {
            if let Some(owner_id) = &ticket.owner_id {
                let entry = by_owner
                    .entry(owner_id.clone())
                    .or_insert_with(|| (String::new(), Vec::new()));
                if let Some(name) = &ticket.owner_name {
                    entry.0 = name.clone();
                }
                entry.1.push(ticket);
            }
        }

        let mut results: Vec<SupervisorMetrics> = by_owner
            .into_iter()
            .map(|(id, (name, tickets))| accumulate_supervisor(id, name, &tickets))
            .collect();
        results.sort_by(|a, b| b.current_load.cmp(&a.current_load));
        Ok(results)
    }

    /// Per-area breakdown from the same single-pass pattern.
    pub async fn area_metrics(&self) -> Result<Vec<AreaMetrics>, StoreError> {
        let tickets = self.tickets_in_period(self.period_days).await?;

        let mut by_area: BTreeMap<String, AreaMetrics> = BTreeMap::new();
        for ticket in &tickets {
            let entry = by_area
                .entry(ticket.area.clone())
                .or_insert_with(|| AreaMetrics {
                    area: ticket.area.clone(),
                    total: 0,
                    open: 0,
                    done: 0,
                    resolution_rate_pct: 0.0,
                });
            entry.total += 1;
            match ticket.status {
                TicketStatus::Done => entry.done += 1,
                _ => entry.open += 1,
            }
        }

        Ok(by_area
            .into_values()
            .map(|mut m| {
                m.resolution_rate_pct = percentage(m.done, m.total);
                m
            })
            .collect())
    }

    /// Recommendations derived purely from already-computed aggregates.
    pub fn insights(
        &self,
        metrics: &Metrics,
        supervisors: &[SupervisorMetrics],
        areas: &[AreaMetrics],
    ) -> Vec<Insight> {
        let mut insights = Vec::new();

        if let Some(busiest) = supervisors.iter().max_by_key(|s| s.current_load) {
            if busiest.current_load > OVERLOAD_THRESHOLD {
                insights.push(Insight {
                    kind: InsightKind::Warning,
                    title: "Overloaded supervisor".to_string(),
                    message: format!(
                        "{} has {} open tickets. Consider redistributing.",
                        busiest.supervisor_name, busiest.current_load
                    ),
                });
            }
        }

        if let Some(best) = supervisors
            .iter()
            .max_by(|a, b| a.resolution_rate_pct.total_cmp(&b.resolution_rate_pct))
        {
            insights.push(Insight {
                kind: InsightKind::Success,
                title: "Best performance".to_string(),
                message: format!(
                    "{} has the best resolution rate ({:.1}%)",
                    best.supervisor_name, best.resolution_rate_pct
                ),
            });
        }

        if let Some(worst) = areas
            .iter()
            .min_by(|a, b| a.resolution_rate_pct.total_cmp(&b.resolution_rate_pct))
        {
            if worst.resolution_rate_pct < LOW_AREA_RESOLUTION_PCT {
                insights.push(Insight {
                    kind: InsightKind::Warning,
                    title: "Low-performing area".to_string(),
                    message: format!(
                        "Area {} resolves only {:.1}% of its tickets. Investigation recommended.",
                        worst.area, worst.resolution_rate_pct
                    ),
                });
            }
        }

        let (kind, band) = if metrics.sla_compliance_pct >= 90.0 {
            (InsightKind::Success, "healthy")
        } else if metrics.sla_compliance_pct >= 70.0 {
            (InsightKind::Info, "acceptable")
        } else {
            (InsightKind::Warning, "critical")
        };
        insights.push(Insight {
            kind,
            title: "SLA compliance".to_string(),
            message: format!(
                "SLA compliance is {} at {:.1}%",
                band, metrics.sla_compliance_pct
            ),
        });

        insights
    }

    /// Full consolidated report, served from a short-TTL cache since it costs
    /// a full scan of the period's tickets.
    pub async fn full_report(&self) -> Result<Report, StoreError> {
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = cache.as_ref() {
                if cached.at.elapsed() < self.cache_ttl {
                    debug!("Analytics report served from cache");
                    return Ok(cached.report.clone());
                }
            }
        }

        let report = self.full_report_uncached().await?;
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache = Some(CachedReport {
            at: Instant::now(),
            report: report.clone(),
        });
        Ok(report)
    }

    pub async fn full_report_uncached(&self) -> Result<Report, StoreError> {
        let metrics = self.aggregate_metrics(self.period_days).await?;
        let supervisors = self.supervisor_metrics().await?;
        let areas = self.area_metrics().await?;
        let insights = self.insights(&metrics, &supervisors, &areas);
        Ok(Report {
            generated_at: Utc::now(),
            metrics,
            supervisors,
            areas,
            insights,
        })
    }
}

fn resolution_time_hours(ticket: &Ticket) -> Option<f64> {
    let completed = ticket.completed_at?;
    let elapsed = completed.signed_duration_since(ticket.opened_at);
    if elapsed < chrono::Duration::zero() {
        return None;
    }
    Some(elapsed.num_seconds() as f64 / 3600.0)
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn accumulate_supervisor(id: String, name: String, tickets: &[&Ticket]) -> SupervisorMetrics {
    let mut m = SupervisorMetrics {
        supervisor_id: id,
        supervisor_name: name,
        total: 0,
        open: 0,
        in_progress: 0,
        done: 0,
        current_load: 0,
        resolution_rate_pct: 0.0,
        mean_resolution_hours: 0.0,
        by_category: BTreeMap::new(),
    };
    let mut resolution_hours = Vec::new();

    for ticket in tickets {
        m.total += 1;
        match ticket.status {
            TicketStatus::Open => m.open += 1,
            TicketStatus::InProgress => m.in_progress += 1,
            TicketStatus::Done => {
                m.done += 1;
                if let Some(hours) = resolution_time_hours(ticket) {
                    resolution_hours.push(hours);
                }
            }
        }
        *m.by_category.entry(ticket.category.clone()).or_insert(0) += 1;
    }

    m.current_load = m.open + m.in_progress;
    m.resolution_rate_pct = percentage(m.done, m.total);
    m.mean_resolution_hours = mean(&resolution_hours);
    m
}
