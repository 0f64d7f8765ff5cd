use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::cloud_watch_metrics_client::FetchMetrics;
use crate::error::MetricsApiError;
use crate::lambda_function_client::{LambdaFunction, ListFunctions};
use crate::metric::{round2, Dimension, MetricRequest, MetricSeries, Statistic};
use crate::rules;
use crate::service::{HealthStatus, ServiceKind};
use crate::summary::{
    sampled, AggregatedTotals, DetailCollector, FailureTally, MetricQuery, ResourceDetail,
    ResourceSummary, SeriesMap, ServiceSummary, Summarize,
};
use crate::time_range::TimeRange;

const FUNCTION_METRICS: [&str; 10] = [
    "Invocations",
    "Errors",
    "Throttles",
    "Duration",
    "ConcurrentExecutions",
    "IteratorAge",
    "DeadLetterErrors",
    "DestinationDeliveryFailures",
    "ProvisionedConcurrencyInvocations",
    "ProvisionedConcurrencySpilloverInvocations",
];

fn statistics_for(metric_name: &str) -> &'static [Statistic] {
    match metric_name {
        "Duration" => &[
            Statistic::Average,
            Statistic::Maximum,
            Statistic::Minimum,
            Statistic::SampleCount,
        ],
        "ConcurrentExecutions" => &[Statistic::Maximum, Statistic::Average],
        _ => &[Statistic::Sum, Statistic::Average, Statistic::Maximum],
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LambdaTotals {
    pub total_invocations: u64,
    pub total_errors: u64,
    pub total_throttles: u64,
    pub total_code_size_bytes: i64,
    pub error_rate_percent: f64,
    /// Mean of per-function error rates, over functions that were invoked.
    pub avg_error_rate: f64,
    pub avg_duration_ms: f64,
}

/// Figures derived from a single function's series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDerived {
    pub total_invocations: f64,
    pub total_errors: f64,
    pub error_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<f64>,
}

#[derive(Debug, Default)]
struct FunctionUsage {
    invocations: f64,
    errors: f64,
    throttles: f64,
    duration_total: f64,
    duration_points: usize,
}

pub fn error_rate(errors: f64, invocations: f64) -> f64 {
    if invocations > 0.0 {
        errors / invocations * 100.0
    } else {
        0.0
    }
}

pub struct LambdaSummarizer {
    functions: Arc<dyn ListFunctions>,
    metrics: Arc<dyn FetchMetrics>,
}

impl LambdaSummarizer {
    pub fn new(functions: Arc<dyn ListFunctions>, metrics: Arc<dyn FetchMetrics>) -> Self {
        LambdaSummarizer { functions, metrics }
    }

    fn function_request(
        function: &str,
        metric_name: &str,
        statistics: &[Statistic],
        time_range: TimeRange,
    ) -> MetricRequest {
        MetricRequest::new(
            ServiceKind::Lambda.namespace(),
            metric_name,
            vec![Dimension::new(ServiceKind::Lambda.dimension_name(), function)],
            statistics,
            time_range,
        )
    }

    async fn series(
        &self,
        function: &str,
        metric_name: &str,
        statistic: Statistic,
        time_range: TimeRange,
    ) -> Result<MetricSeries, MetricsApiError> {
        let request = Self::function_request(function, metric_name, &[statistic], time_range);
        self.metrics.fetch(&request).await
    }

    async fn function_usage(
        &self,
        function: &str,
        time_range: TimeRange,
    ) -> Result<FunctionUsage, MetricsApiError> {
        let invocations = self.series(function, "Invocations", Statistic::Sum, time_range).await?;
        let errors = self.series(function, "Errors", Statistic::Sum, time_range).await?;
        let throttles = self.series(function, "Throttles", Statistic::Sum, time_range).await?;
        let duration = self.series(function, "Duration", Statistic::Average, time_range).await?;
        Ok(FunctionUsage {
            invocations: invocations.sum(Statistic::Sum)?,
            errors: errors.sum(Statistic::Sum)?,
            throttles: throttles.sum(Statistic::Sum)?,
            duration_total: duration.sum(Statistic::Average)?,
            duration_points: duration
                .datapoints
                .iter()
                .filter(|point| point.average.is_some())
                .count(),
        })
    }

    fn resource_for(function: &LambdaFunction) -> ResourceSummary {
        let mut resource = ResourceSummary::named(&function.name);
        resource.metadata.insert("runtime", json!(function.runtime));
        resource.metadata.insert("memory_size", json!(function.memory_size));
        resource.metadata.insert("timeout", json!(function.timeout));
        resource.metadata.insert("code_size", json!(function.code_size));
        resource.metadata.insert("last_modified", json!(function.last_modified));
        if !function.description.is_empty() {
            resource.metadata.insert("description", json!(function.description));
        }
        resource
    }

    fn derive(name: &str, metrics: &SeriesMap) -> Result<Option<FunctionDerived>, MetricsApiError> {
        let (invocations, errors) = match (metrics.get("Invocations"), metrics.get("Errors")) {
            (Some(invocations), Some(errors)) => (invocations, errors),
            _ => return Ok(None),
        };
        let total_invocations = invocations.sum(Statistic::Sum)?;
        let total_errors = errors.sum(Statistic::Sum)?;
        let mut derived = FunctionDerived {
            total_invocations,
            total_errors,
            error_rate: round2(error_rate(total_errors, total_invocations)),
            avg_duration_ms: None,
            max_duration_ms: None,
        };
        if let Some(duration) = metrics.get("Duration") {
            match duration.aggregate() {
                Ok(aggregated) => {
                    derived.avg_duration_ms = Some(round2(aggregated.average));
                    derived.max_duration_ms = Some(aggregated.maximum);
                }
                Err(error) => warn!(function = name, %error, "incomplete duration datapoints"),
            }
        }
        Ok(Some(derived))
    }
}

#[async_trait]
impl Summarize for LambdaSummarizer {
    fn service(&self) -> ServiceKind {
        ServiceKind::Lambda
    }

    async fn list_resources(&self) -> Result<Vec<String>, MetricsApiError> {
        let functions = self.functions.list_functions().await?;
        Ok(functions.into_iter().map(|function| function.name).collect())
    }

    async fn summarize_one(
        &self,
        name: &str,
        query: &MetricQuery,
    ) -> Result<ResourceDetail, MetricsApiError> {
        self.ensure_listed(name).await?;
        info!(function = name, "getting metrics for function");

        let time_range = query.time_range;
        let mut collector = DetailCollector::new(self.metrics.as_ref(), name);
        let mut metrics = BTreeMap::new();
        for metric_name in FUNCTION_METRICS.iter() {
            let request =
                Self::function_request(name, metric_name, statistics_for(metric_name), time_range);
            collector.collect(metric_name.to_string(), request, &mut metrics).await;
        }
        let metric_errors = collector.finish()?;
        let summary = Self::derive(name, &metrics)?;

        Ok(ResourceDetail {
            service: ServiceKind::Lambda,
            name: name.to_string(),
            metrics,
            request_metrics: None,
            operations: None,
            summary,
            metric_errors,
            time_range,
        })
    }

    async fn summarize_all(
        &self,
        query: &MetricQuery,
        limit: Option<usize>,
    ) -> Result<ServiceSummary, MetricsApiError> {
        let functions = self.functions.list_functions().await?;
        let (fetch_count, sampled_resources) = sampled(functions.len(), limit);

        let mut tally = FailureTally::default();
        let mut resources = Vec::with_capacity(fetch_count);
        let mut totals = FunctionUsage::default();
        let total_code_size_bytes = functions.iter().map(|function| function.code_size).sum();
        let mut error_rates = Vec::new();
        for function in functions.iter().take(fetch_count) {
            let mut resource = Self::resource_for(function);
            let usage = self.function_usage(&function.name, query.time_range).await;
            if let Some(usage) = tally.record(ServiceKind::Lambda, &mut resource, usage) {
                let rate = error_rate(usage.errors, usage.invocations);
                if usage.invocations > 0.0 {
                    error_rates.push(rate);
                }
                let avg_duration = if usage.duration_points > 0 {
                    usage.duration_total / usage.duration_points as f64
                } else {
                    0.0
                };
                resource.metrics.insert("invocations", usage.invocations);
                resource.metrics.insert("errors", usage.errors);
                resource.metrics.insert("throttles", usage.throttles);
                resource.metrics.insert("avg_duration_ms", round2(avg_duration));
                resource.metrics.insert("error_rate", round2(rate));

                totals.invocations += usage.invocations;
                totals.errors += usage.errors;
                totals.throttles += usage.throttles;
                totals.duration_total += usage.duration_total;
                totals.duration_points += usage.duration_points;
            }
            resources.push(resource);
        }
        tally.finish()?;

        resources.sort_by(|a, b| {
            b.metric("invocations")
                .partial_cmp(&a.metric("invocations"))
                .unwrap_or(Ordering::Equal)
        });

        let avg_error_rate = if error_rates.is_empty() {
            0.0
        } else {
            error_rates.iter().sum::<f64>() / error_rates.len() as f64
        };
        let avg_duration_ms = if totals.duration_points > 0 {
            totals.duration_total / totals.duration_points as f64
        } else {
            0.0
        };

        let mut summary = ServiceSummary {
            service: ServiceKind::Lambda,
            resource_count: functions.len(),
            sampled_resources,
            aggregated: AggregatedTotals::Lambda(LambdaTotals {
                total_invocations: totals.invocations.round() as u64,
                total_errors: totals.errors.round() as u64,
                total_throttles: totals.throttles.round() as u64,
                total_code_size_bytes,
                error_rate_percent: round2(error_rate(totals.errors, totals.invocations)),
                avg_error_rate: round2(avg_error_rate),
                avg_duration_ms: round2(avg_duration_ms),
            }),
            status: HealthStatus::Healthy,
            resources,
            time_range: query.time_range,
        };
        summary.status = rules::status_for(&summary);
        Ok(summary)
    }
}
