//! Cross-service health report.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::{error, info};

use crate::rules;
use crate::service::{HealthStatus, ServiceKind};
use crate::summary::{MetricQuery, ServiceSummary, Summarizers};
use crate::time_range::{iso_timestamp, TimeRange};

/// How many resources per service get their metrics fetched in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLimits {
    pub max_buckets: usize,
    pub max_tables: usize,
    pub max_functions: usize,
}

impl Default for ReportLimits {
    fn default() -> Self {
        ReportLimits {
            max_buckets: 10,
            max_tables: 20,
            max_functions: 30,
        }
    }
}

impl ReportLimits {
    pub fn limit_for(&self, kind: ServiceKind) -> usize {
        match kind {
            ServiceKind::S3 => self.max_buckets,
            ServiceKind::DynamoDb => self.max_tables,
            ServiceKind::Lambda => self.max_functions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServiceReport {
    Summary(ServiceSummary),
    Failed { status: HealthStatus, error: String },
}

impl ServiceReport {
    pub fn status(&self) -> HealthStatus {
        match self {
            ServiceReport::Summary(summary) => summary.status,
            ServiceReport::Failed { status, .. } => *status,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ServiceReport::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    #[serde(serialize_with = "serialize_generated_at")]
    pub report_generated_at: DateTime<Utc>,
    pub time_range: TimeRange,
    pub services: BTreeMap<ServiceKind, ServiceReport>,
    pub overall_status: HealthStatus,
    pub recommendations: Vec<String>,
}

impl Report {
    /// True when services were requested and none produced a summary.
    pub fn all_failed(&self) -> bool {
        !self.services.is_empty() && self.services.values().all(ServiceReport::is_failed)
    }
}

fn serialize_generated_at<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&iso_timestamp(at))
}

/// Summarizes each requested service in turn. A failing service is recorded
/// in its own slot and never stops the others.
pub async fn generate(
    summarizers: &Summarizers,
    time_range: TimeRange,
    services: &BTreeSet<ServiceKind>,
    limits: &ReportLimits,
) -> Report {
    let mut summaries = Vec::new();
    let mut failures = BTreeMap::new();
    for &kind in services {
        info!(service = kind.as_str(), "getting summary for report");
        let query = MetricQuery::summary(kind, time_range);
        match summarizers
            .get(kind)
            .summarize_all(&query, Some(limits.limit_for(kind)))
            .await
        {
            Ok(summary) => summaries.push(summary),
            Err(err) => {
                error!(service = kind.as_str(), error = %err, "service summary failed");
                failures.insert(
                    kind,
                    ServiceReport::Failed {
                        status: HealthStatus::Error,
                        error: err.to_string(),
                    },
                );
            }
        }
    }

    let recommendations = rules::recommendations(&summaries);
    let mut reports = failures;
    for summary in summaries {
        reports.insert(summary.service, ServiceReport::Summary(summary.without_resources()));
    }
    let overall_status = reports
        .values()
        .map(ServiceReport::status)
        .max()
        .unwrap_or_default();

    Report {
        report_generated_at: Utc::now(),
        time_range,
        services: reports,
        overall_status,
        recommendations,
    }
}
