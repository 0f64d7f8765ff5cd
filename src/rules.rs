//! Threshold rules deciding a service's health and the report's
//! recommendations. Rules are evaluated in table order.

use tracing::debug;

use crate::service::{HealthStatus, ServiceKind};
use crate::summary::{AggregatedTotals, DynamoDbTotals, LambdaTotals, S3Totals, ServiceSummary};

pub const ALL_CLEAR: &str = "All services are operating within normal parameters.";

pub struct Rule {
    pub name: &'static str,
    pub service: ServiceKind,
    /// Status the service takes while the rule fires.
    pub status: HealthStatus,
    pub breached: fn(&ServiceSummary) -> bool,
    pub recommendation: Option<fn(&ServiceSummary) -> String>,
}

pub const RULES: &[Rule] = &[
    Rule {
        name: "s3_large_storage",
        service: ServiceKind::S3,
        status: HealthStatus::Healthy,
        breached: s3_large_storage,
        recommendation: Some(s3_lifecycle_advice),
    },
    Rule {
        name: "dynamodb_throttling",
        service: ServiceKind::DynamoDb,
        status: HealthStatus::Warning,
        breached: dynamodb_throttled,
        recommendation: Some(dynamodb_capacity_advice),
    },
    Rule {
        name: "lambda_error_rate_critical",
        service: ServiceKind::Lambda,
        status: HealthStatus::Critical,
        breached: lambda_error_rate_critical,
        recommendation: None,
    },
    Rule {
        name: "lambda_error_rate_elevated",
        service: ServiceKind::Lambda,
        status: HealthStatus::Warning,
        breached: lambda_error_rate_elevated,
        recommendation: Some(lambda_error_advice),
    },
    Rule {
        name: "lambda_throttling",
        service: ServiceKind::Lambda,
        status: HealthStatus::Warning,
        breached: lambda_throttled,
        recommendation: Some(lambda_concurrency_advice),
    },
    Rule {
        name: "lambda_slow_duration",
        service: ServiceKind::Lambda,
        status: HealthStatus::Healthy,
        breached: lambda_slow,
        recommendation: Some(lambda_duration_advice),
    },
];

const LARGE_STORAGE_GB: f64 = 100.0;
const CRITICAL_ERROR_RATE: f64 = 5.0;
const WARNING_ERROR_RATE: f64 = 1.0;
const SLOW_DURATION_MS: f64 = 10000.0;

fn s3(summary: &ServiceSummary) -> Option<&S3Totals> {
    match &summary.aggregated {
        AggregatedTotals::S3(totals) => Some(totals),
        _ => None,
    }
}

fn dynamodb(summary: &ServiceSummary) -> Option<&DynamoDbTotals> {
    match &summary.aggregated {
        AggregatedTotals::DynamoDb(totals) => Some(totals),
        _ => None,
    }
}

fn lambda(summary: &ServiceSummary) -> Option<&LambdaTotals> {
    match &summary.aggregated {
        AggregatedTotals::Lambda(totals) => Some(totals),
        _ => None,
    }
}

fn s3_large_storage(summary: &ServiceSummary) -> bool {
    s3(summary).map_or(false, |totals| totals.total_size_gb > LARGE_STORAGE_GB)
}

fn s3_lifecycle_advice(_: &ServiceSummary) -> String {
    "Consider implementing S3 Lifecycle policies to manage storage costs for large buckets."
        .to_string()
}

fn dynamodb_throttled(summary: &ServiceSummary) -> bool {
    dynamodb(summary).map_or(false, |totals| totals.total_throttle_events > 0)
}

fn dynamodb_capacity_advice(summary: &ServiceSummary) -> String {
    let events = dynamodb(summary).map_or(0, |totals| totals.total_throttle_events);
    let tables: Vec<&str> = summary
        .resources
        .iter()
        .filter(|resource| resource.metric("throttle_events") > 0.0)
        .map(|resource| resource.name.as_str())
        .collect();
    let detail = if tables.is_empty() {
        format!("{} events", events)
    } else {
        format!("{} events on {}", events, tables.join(", "))
    };
    format!(
        "DynamoDB throttling detected ({}). Consider increasing provisioned capacity or switching to on-demand mode.",
        detail
    )
}

fn lambda_error_rate_critical(summary: &ServiceSummary) -> bool {
    lambda(summary).map_or(false, |totals| totals.error_rate_percent > CRITICAL_ERROR_RATE)
}

fn lambda_error_rate_elevated(summary: &ServiceSummary) -> bool {
    lambda(summary).map_or(false, |totals| totals.error_rate_percent > WARNING_ERROR_RATE)
}

fn lambda_error_advice(summary: &ServiceSummary) -> String {
    let rate = lambda(summary).map_or(0.0, |totals| totals.error_rate_percent);
    format!(
        "Lambda error rate is {}%. Review CloudWatch logs to identify and fix recurring errors.",
        rate
    )
}

fn lambda_throttled(summary: &ServiceSummary) -> bool {
    lambda(summary).map_or(false, |totals| totals.total_throttles > 0)
}

fn lambda_concurrency_advice(summary: &ServiceSummary) -> String {
    let throttles = lambda(summary).map_or(0, |totals| totals.total_throttles);
    format!(
        "Lambda throttling detected ({} events). Consider requesting a concurrency limit increase.",
        throttles
    )
}

fn lambda_slow(summary: &ServiceSummary) -> bool {
    lambda(summary).map_or(false, |totals| totals.avg_duration_ms > SLOW_DURATION_MS)
}

fn lambda_duration_advice(summary: &ServiceSummary) -> String {
    let duration = lambda(summary).map_or(0.0, |totals| totals.avg_duration_ms);
    format!(
        "Average Lambda duration is high ({}ms). Consider optimizing function code or increasing memory allocation.",
        duration
    )
}

fn fired<'a>(summary: &'a ServiceSummary) -> impl Iterator<Item = &'static Rule> + 'a {
    RULES
        .iter()
        .filter(move |rule| rule.service == summary.service && (rule.breached)(summary))
}

/// Worst status among the rules firing for this summary.
pub fn status_for(summary: &ServiceSummary) -> HealthStatus {
    fired(summary)
        .map(|rule| {
            debug!(service = summary.service.as_str(), rule = rule.name, "rule fired");
            rule.status
        })
        .max()
        .unwrap_or_default()
}

/// Recommendations in rule order; never empty.
pub fn recommendations<'a, I>(summaries: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a ServiceSummary>,
{
    let summaries: Vec<&ServiceSummary> = summaries.into_iter().collect();
    let mut recommendations = Vec::new();
    for rule in RULES {
        let advice = match rule.recommendation {
            Some(advice) => advice,
            None => continue,
        };
        for summary in summaries.iter().filter(|summary| summary.service == rule.service) {
            if (rule.breached)(summary) {
                recommendations.push(advice(summary));
            }
        }
    }
    if recommendations.is_empty() {
        recommendations.push(ALL_CLEAR.to_string());
    }
    recommendations
}
