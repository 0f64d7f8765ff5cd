use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rusoto_core::Region;

use crate::report::ReportLimits;
use crate::retry::RetryPolicy;

/// Settings read once at cold start.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: String,
    pub region: Region,
    pub retry: RetryPolicy,
    pub report_limits: ReportLimits,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let region = match lookup("AWS_REGION") {
            Some(name) if !name.trim().is_empty() => Region::from_str(name.trim())
                .with_context(|| format!("AWS_REGION is not a known region: {}", name))?,
            _ => Region::default(),
        };

        let retry_defaults = RetryPolicy::default();
        let max_attempts = parse_or(&lookup, "RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts)?;
        if max_attempts == 0 {
            bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        let retry = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "RETRY_BASE_DELAY_MS",
                retry_defaults.base_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse_or(
                &lookup,
                "RETRY_MAX_DELAY_MS",
                retry_defaults.max_delay.as_millis() as u64,
            )?),
        };

        let limit_defaults = ReportLimits::default();
        let report_limits = ReportLimits {
            max_buckets: parse_or(&lookup, "REPORT_MAX_BUCKETS", limit_defaults.max_buckets)?,
            max_tables: parse_or(&lookup, "REPORT_MAX_TABLES", limit_defaults.max_tables)?,
            max_functions: parse_or(&lookup, "REPORT_MAX_FUNCTIONS", limit_defaults.max_functions)?,
        };

        Ok(Config {
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            region,
            retry,
            report_limits,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|error| anyhow::anyhow!("{} has invalid value {:?}: {}", name, raw, error)),
        None => Ok(default),
    }
}
