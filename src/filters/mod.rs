//! Filter/Pagination Engine
//!
//! The backing store can only evaluate equality filters on indexed fields
//! (status, gate, owner) and paginate forward by resuming after a document.
//! Category selection and free-text search cannot be pushed down. The engine
//! therefore plans every request in two stages:
//!
//! 1. **Pushdown**: indexed predicates become store-side equality filters
//! 2. **Residual**: the rest is applied in memory to the retrieved batch
//!
//! Because residual filtering happens after the store-side limit, a page may
//! return fewer than `limit` items even when more matches exist further in
//! the stream. That is a deliberate cost bound, not a bug: an exhaustive
//! scan per page is exactly what this engine avoids.
//!
//! Cursors are opaque document ids. An unresolvable cursor restarts from the
//! beginning instead of failing; page loads degrade, they do not error out.

use std::sync::Arc;

use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;

use crate::config::CoreConfig;
use crate::shared::models::{Ticket, TICKETS_COLLECTION, PROJECTS_CATEGORY};
use crate::store::{DocumentStore, FieldFilter, FilterOp, Query, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum FilterQueryError {
    #[error("Store error while loading page: {0}")]
    Store(#[from] StoreError),
}

/// Wildcard filter values that disable a filter entirely. `Todos`/`Todas`
/// are accepted for compatibility with clients of the previous system.
fn is_wildcard(value: &str) -> bool {
    value.is_empty()
        || value.eq_ignore_ascii_case("all")
        || value == "Todos"
        || value == "Todas"
}

/// One requested filter criterion, split by where it can be evaluated.
/// Keeping this split explicit is what makes result-completeness reasoning
/// possible: everything pushable goes to the store, the rest runs post-fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Status(String),
    Gate(String),
    Owner(String),
    Category(String),
    Search(String),
}

impl Predicate {
    /// Store-side equality filter, when the field is indexed.
    pub fn pushdown(&self) -> Option<FieldFilter> {
        match self {
            Self::Status(v) => Some(FieldFilter::new("status", FilterOp::Eq, json!(v))),
            Self::Gate(v) => Some(FieldFilter::new("gate", FilterOp::Eq, json!(v))),
            Self::Owner(v) => Some(FieldFilter::new("owner_id", FilterOp::Eq, json!(v))),
            Self::Category(_) | Self::Search(_) => None,
        }
    }

    pub fn is_residual(&self) -> bool {
        self.pushdown().is_none()
    }

    /// In-memory evaluation for residual predicates. Pushable predicates
    /// match trivially here since the store already enforced them.
    pub fn matches(&self, ticket: &Ticket) -> bool {
        match self {
            Self::Status(_) | Self::Gate(_) | Self::Owner(_) => true,
            Self::Category(category) => &ticket.category == category,
            Self::Search(term) => {
                let term = term.to_lowercase();
                let hit = |field: &str| field.to_lowercase().contains(&term);
                hit(&ticket.description)
                    || ticket.reference_code.as_deref().is_some_and(&hit)
                    || ticket.owner_name.as_deref().is_some_and(&hit)
                    || ticket.number.as_deref().is_some_and(&hit)
                    || hit(&ticket.id)
            }
        }
    }
}

/// Recognized filter keys plus pagination controls, as received from the
/// request layer. Lifecycle is per-request; never persisted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterRequest {
    pub status: Option<String>,
    /// Clients of the previous system send this key as `subarea`.
    #[serde(alias = "subarea")]
    pub gate: Option<String>,
    pub owner: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

impl FilterRequest {
    /// Compiles the recognized keys into predicates, dropping wildcards.
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        let mut push = |value: &Option<String>, build: fn(String) -> Predicate| {
            if let Some(v) = value.as_deref() {
                let v = v.trim();
                if !is_wildcard(v) {
                    predicates.push(build(v.to_string()));
                }
            }
        };
        push(&self.status, Predicate::Status);
        push(&self.gate, Predicate::Gate);
        push(&self.owner, Predicate::Owner);
        push(&self.category, Predicate::Category);
        push(&self.search, Predicate::Search);
        predicates
    }
}

#[derive(Debug, Clone)]
pub struct TicketPage {
    pub items: Vec<Ticket>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

pub struct FilterEngine {
    store: Arc<dyn DocumentStore>,
    collection: String,
    default_limit: usize,
    max_limit: usize,
}

impl FilterEngine {
    pub fn new(store: Arc<dyn DocumentStore>, config: &CoreConfig) -> Self {
        Self {
            store,
            collection: TICKETS_COLLECTION.to_string(),
            default_limit: config.page_size_default,
            max_limit: config.page_size_max,
        }
    }

    /// Loads one page of tickets for the requested filters.
    pub async fn page(&self, request: &FilterRequest) -> Result<TicketPage, FilterQueryError> {
        let limit = request
            .limit
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit);
        let predicates = request.predicates();

        let mut query = Query::new(&self.collection).limit(limit + 1);
        for filter in predicates.iter().filter_map(Predicate::pushdown) {
            query.filters.push(filter);
        }
        if let Some(cursor) = self.resolve_cursor(request.cursor.as_deref()).await {
            query = query.start_after(cursor);
        }

        // limit + 1 raw documents: the extra one answers "is there a next
        // page" without a separate count query.
        let mut raw = self.store.query(query).await?;
        let has_more_raw = raw.len() > limit;
        raw.truncate(limit);

        let tickets: Vec<Ticket> = raw
            .iter()
            .filter_map(|doc| match Ticket::from_document(doc) {
                Ok(ticket) => Some(ticket),
                Err(e) => {
                    warn!("Skipping undecodable ticket document {}: {e}", doc.id);
                    None
                }
            })
            .collect();

        let items = apply_residual(tickets, &predicates);

        let next_cursor = items.last().map(|t| t.id.clone());
        // Only honor has_more when residual filtering left a full page;
        // otherwise the client could be stranded on a dead cursor.
        let has_more = has_more_raw && items.len() == limit;

        Ok(TicketPage {
            items,
            next_cursor,
            has_more,
        })
    }

    /// An unknown or unreadable cursor means "start from the beginning",
    /// never an error.
    async fn resolve_cursor(&self, cursor: Option<&str>) -> Option<String> {
        let cursor = cursor?.trim();
        if cursor.is_empty() {
            return None;
        }
        match self.store.get(&self.collection, cursor).await {
            Ok(Some(_)) => Some(cursor.to_string()),
            Ok(None) => {
                debug!("Cursor {cursor:?} no longer resolves; restarting from beginning");
                None
            }
            Err(e) => {
                warn!("Cursor {cursor:?} lookup failed ({e}); restarting from beginning");
                None
            }
        }
    }
}

/// Applies residual predicates to a retrieved batch.
///
/// A category filter does not exclude "Projects" tickets: they are promoted
/// work and stay visible, appended after the matching group. Relative order
/// within each group is preserved.
fn apply_residual(tickets: Vec<Ticket>, predicates: &[Predicate]) -> Vec<Ticket> {
    let residual: Vec<&Predicate> = predicates.iter().filter(|p| p.is_residual()).collect();
    if residual.is_empty() {
        return tickets;
    }

    let promoted_category = residual.iter().find_map(|p| match p {
        Predicate::Category(c) if c != PROJECTS_CATEGORY => Some(c.as_str()),
        _ => None,
    });

    let mut matched = Vec::new();
    let mut promoted = Vec::new();
    for ticket in tickets {
        let non_category_ok = residual
            .iter()
            .filter(|p| !matches!(p, Predicate::Category(_)))
            .all(|p| p.matches(&ticket));
        if !non_category_ok {
            continue;
        }
        match promoted_category {
            Some(category) => {
                if ticket.category == category {
                    matched.push(ticket);
                } else if ticket.category == PROJECTS_CATEGORY {
                    promoted.push(ticket);
                }
            }
            None => {
                if residual.iter().all(|p| p.matches(&ticket)) {
                    matched.push(ticket);
                }
            }
        }
    }
    matched.extend(promoted);
    matched
}
