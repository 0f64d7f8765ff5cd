//! Per-service summarizers.
//!
//! Each service lists its resources through an injected listing client and
//! pulls datapoints through an injected [`FetchMetrics`]. Detail mode reports
//! full series for one resource; summary mode reduces every listed resource
//! to a handful of numbers and folds them into service totals.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

use crate::cloud_watch_metrics_client::FetchMetrics;
use crate::error::MetricsApiError;
use crate::metric::{MetricRequest, MetricSeries};
use crate::service::{HealthStatus, ServiceKind};
use crate::time_range::TimeRange;

pub mod dynamodb;
pub mod lambda;
pub mod s3;

pub use dynamodb::{DynamoDbSummarizer, DynamoDbTotals};
pub use lambda::{FunctionDerived, LambdaSummarizer, LambdaTotals};
pub use s3::{S3Summarizer, S3Totals};

#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub service: ServiceKind,
    /// `None` selects summary mode over every resource of the service.
    pub resource_id: Option<String>,
    pub time_range: TimeRange,
    pub include_request_metrics: bool,
    pub include_operations: bool,
}

impl MetricQuery {
    pub fn summary(service: ServiceKind, time_range: TimeRange) -> Self {
        MetricQuery {
            service,
            resource_id: None,
            time_range,
            include_request_metrics: false,
            include_operations: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSummary {
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<&'static str, Value>,
    pub metrics: BTreeMap<&'static str, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_error: Option<String>,
}

impl ResourceSummary {
    pub fn named(name: &str) -> Self {
        ResourceSummary {
            name: name.to_string(),
            metadata: BTreeMap::new(),
            metrics: BTreeMap::new(),
            metrics_error: None,
        }
    }

    pub fn metric(&self, name: &str) -> f64 {
        self.metrics.get(name).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregatedTotals {
    S3(S3Totals),
    DynamoDb(DynamoDbTotals),
    Lambda(LambdaTotals),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSummary {
    pub service: ServiceKind,
    pub resource_count: usize,
    /// Number of resources whose metrics were fetched, when capped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampled_resources: Option<usize>,
    pub aggregated: AggregatedTotals,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceSummary>,
    pub time_range: TimeRange,
}

impl ServiceSummary {
    pub fn without_resources(mut self) -> Self {
        self.resources.clear();
        self
    }
}

pub type SeriesMap = BTreeMap<String, MetricSeries>;

/// Full metric series for a single resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDetail {
    pub service: ServiceKind,
    pub name: String,
    pub metrics: SeriesMap,
    pub request_metrics: Option<SeriesMap>,
    pub operations: Option<SeriesMap>,
    pub summary: Option<FunctionDerived>,
    pub metric_errors: BTreeMap<String, String>,
    pub time_range: TimeRange,
}

impl Serialize for ResourceDetail {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        let name_key = match self.service {
            ServiceKind::S3 => "bucket_name",
            ServiceKind::DynamoDb => "table_name",
            ServiceKind::Lambda => "function_name",
        };
        map.serialize_entry(name_key, &self.name)?;
        map.serialize_entry("metrics", &self.metrics)?;
        if let Some(request_metrics) = &self.request_metrics {
            map.serialize_entry("request_metrics", request_metrics)?;
        }
        if let Some(operations) = &self.operations {
            map.serialize_entry("operations", operations)?;
        }
        if let Some(summary) = &self.summary {
            map.serialize_entry("summary", summary)?;
        }
        if !self.metric_errors.is_empty() {
            map.serialize_entry("metric_errors", &self.metric_errors)?;
        }
        map.serialize_entry("time_range", &self.time_range)?;
        map.end()
    }
}

#[async_trait]
pub trait Summarize: Send + Sync {
    fn service(&self) -> ServiceKind;

    /// Resource identifiers in listing order.
    async fn list_resources(&self) -> Result<Vec<String>, MetricsApiError>;

    async fn summarize_one(
        &self,
        name: &str,
        query: &MetricQuery,
    ) -> Result<ResourceDetail, MetricsApiError>;

    /// Summary over every listed resource, fetching metrics for at most
    /// `limit` of them.
    async fn summarize_all(
        &self,
        query: &MetricQuery,
        limit: Option<usize>,
    ) -> Result<ServiceSummary, MetricsApiError>;

    async fn ensure_listed(&self, name: &str) -> Result<(), MetricsApiError> {
        let resources = self.list_resources().await?;
        if resources.iter().any(|resource| resource == name) {
            Ok(())
        } else {
            Err(MetricsApiError::not_found(self.service().resource_label(), name))
        }
    }
}

/// Dispatch table from service kind to its summarizer.
#[derive(Clone)]
pub struct Summarizers {
    s3: Arc<dyn Summarize>,
    dynamodb: Arc<dyn Summarize>,
    lambda: Arc<dyn Summarize>,
}

impl Summarizers {
    pub fn new(
        s3: Arc<dyn Summarize>,
        dynamodb: Arc<dyn Summarize>,
        lambda: Arc<dyn Summarize>,
    ) -> Self {
        Summarizers {
            s3,
            dynamodb,
            lambda,
        }
    }

    pub fn get(&self, kind: ServiceKind) -> &dyn Summarize {
        match kind {
            ServiceKind::S3 => self.s3.as_ref(),
            ServiceKind::DynamoDb => self.dynamodb.as_ref(),
            ServiceKind::Lambda => self.lambda.as_ref(),
        }
    }
}

/// Collects detail-mode series, keeping per-metric failures instead of
/// aborting the whole resource.
pub(crate) struct DetailCollector<'a> {
    fetcher: &'a dyn FetchMetrics,
    resource: &'a str,
    attempted: usize,
    failed: usize,
    first_error: Option<MetricsApiError>,
    pub errors: BTreeMap<String, String>,
}

impl<'a> DetailCollector<'a> {
    pub fn new(fetcher: &'a dyn FetchMetrics, resource: &'a str) -> Self {
        DetailCollector {
            fetcher,
            resource,
            attempted: 0,
            failed: 0,
            first_error: None,
            errors: BTreeMap::new(),
        }
    }

    /// Fetches `request` into `into` under `key` when it returned data.
    pub async fn collect(&mut self, key: String, request: MetricRequest, into: &mut SeriesMap) {
        self.attempted += 1;
        match self.fetcher.fetch(&request).await {
            Ok(series) if series.is_empty() => {}
            Ok(series) => {
                into.insert(key, series);
            }
            Err(error) => {
                warn!(resource = self.resource, metric = %key, %error, "could not get metric");
                self.failed += 1;
                self.errors.insert(key, error.to_string());
                if self.first_error.is_none() {
                    self.first_error = Some(error);
                }
            }
        }
    }

    /// Fails only when every attempted fetch failed.
    pub fn finish(self) -> Result<BTreeMap<String, String>, MetricsApiError> {
        match self.first_error {
            Some(error) if self.failed == self.attempted => Err(error),
            _ => Ok(self.errors),
        }
    }
}

/// Tracks per-resource failures in summary mode.
#[derive(Default)]
pub(crate) struct FailureTally {
    attempted: usize,
    failed: usize,
    first_error: Option<MetricsApiError>,
}

impl FailureTally {
    pub fn record<T>(
        &mut self,
        service: ServiceKind,
        resource: &mut ResourceSummary,
        result: Result<T, MetricsApiError>,
    ) -> Option<T> {
        self.attempted += 1;
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(
                    service = service.as_str(),
                    resource = %resource.name,
                    %error,
                    "could not get metrics for resource"
                );
                resource.metrics_error = Some(error.to_string());
                self.failed += 1;
                if self.first_error.is_none() {
                    self.first_error = Some(error);
                }
                None
            }
        }
    }

    pub fn finish(self) -> Result<(), MetricsApiError> {
        match self.first_error {
            Some(error) if self.failed == self.attempted => Err(error),
            _ => Ok(()),
        }
    }
}

pub(crate) fn sampled(resource_count: usize, limit: Option<usize>) -> (usize, Option<usize>) {
    match limit {
        Some(limit) if limit < resource_count => (limit, Some(limit)),
        _ => (resource_count, None),
    }
}
