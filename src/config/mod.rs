use std::env;
use std::str::FromStr;

use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;

use crate::assignment::AssignmentStrategy;

/// Environment-backed configuration for the ticketing core.
///
/// Every knob has a default, so `CoreConfig::default()` is a fully working
/// configuration for tests and local development.
#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    /// Display-number prefix ("CHM" produces "CHM-0001").
    pub number_prefix: String,
    /// Zero-padding width of the display number.
    pub number_width: usize,
    /// Counter transaction attempts before degrading to a fallback number.
    pub sequence_max_attempts: u32,
    pub page_size_default: usize,
    /// Server-side clamp; clients may never request more per page.
    pub page_size_max: usize,
    pub assignment_strategy: AssignmentStrategy,
    pub analytics_period_days: i64,
    pub analytics_cache_ttl_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            number_prefix: "CHM".to_string(),
            number_width: 4,
            sequence_max_attempts: 3,
            page_size_default: 50,
            page_size_max: 100,
            assignment_strategy: AssignmentStrategy::LeastLoaded,
            analytics_period_days: 30,
            analytics_cache_ttl_secs: 300,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl CoreConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            number_prefix: env_or("TICKET_NUMBER_PREFIX", defaults.number_prefix)?,
            number_width: env_or("TICKET_NUMBER_WIDTH", defaults.number_width)?,
            sequence_max_attempts: env_or("SEQUENCE_MAX_ATTEMPTS", defaults.sequence_max_attempts)?,
            page_size_default: env_or("PAGE_SIZE_DEFAULT", defaults.page_size_default)?,
            page_size_max: env_or("PAGE_SIZE_MAX", defaults.page_size_max)?,
            assignment_strategy: env_or("ASSIGNMENT_STRATEGY", defaults.assignment_strategy)?,
            analytics_period_days: env_or("ANALYTICS_PERIOD_DAYS", defaults.analytics_period_days)?,
            analytics_cache_ttl_secs: env_or(
                "ANALYTICS_CACHE_TTL_SECS",
                defaults.analytics_cache_ttl_secs,
            )?,
        })
    }
}
