//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::cloud_watch_metrics_client::FetchMetrics;
use crate::dynamodb_table_client::{ListTables, Table};
use crate::error::MetricsApiError;
use crate::lambda_function_client::{LambdaFunction, ListFunctions};
use crate::metric::{Datapoint, MetricRequest, MetricSeries, Statistic};
use crate::s3_bucket_client::{Bucket, ListBuckets};
use crate::time_range::{Hours, TimeRange};

fn series_key(metric_name: &str, dimension_values: &[&str]) -> String {
    format!("{}:{}", metric_name, dimension_values.join("/"))
}

/// Canned datapoints keyed by metric name and dimension values. Unknown
/// metrics come back as empty series.
#[derive(Clone, Default)]
pub struct FakeMetrics {
    series: HashMap<String, Vec<Datapoint>>,
    failing: HashSet<String>,
    unavailable: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeMetrics {
    pub fn with(mut self, metric_name: &str, dimension_values: &[&str], points: Vec<Datapoint>) -> Self {
        self.series
            .insert(series_key(metric_name, dimension_values), points);
        self
    }

    /// Every request whose first dimension is `resource` fails.
    pub fn failing_for(mut self, resource: &str) -> Self {
        self.failing.insert(resource.to_string());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchMetrics for FakeMetrics {
    async fn fetch(&self, request: &MetricRequest) -> Result<MetricSeries, MetricsApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let values: Vec<&str> = request
            .dimensions
            .iter()
            .map(|dimension| dimension.value.as_str())
            .collect();
        let failing = values
            .first()
            .map_or(false, |resource| self.failing.contains(*resource));
        if self.unavailable || failing {
            return Err(MetricsApiError::BackendUnavailable {
                operation: "GetMetricStatistics",
                message: "service unavailable".to_string(),
                transient: false,
            });
        }
        let points = self
            .series
            .get(&series_key(&request.metric_name, &values))
            .cloned()
            .unwrap_or_default();
        Ok(MetricSeries::from_request(request, points))
    }
}

/// A fixed resource listing.
pub struct FakeInventory<T> {
    items: Vec<T>,
    failing: bool,
    calls: Arc<AtomicUsize>,
}

impl<T: Clone> FakeInventory<T> {
    pub fn of(items: Vec<T>) -> Self {
        FakeInventory {
            items,
            failing: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        FakeInventory {
            items: vec![],
            failing: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter, readable after the inventory moved into a summarizer.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    fn list(&self, operation: &'static str) -> Result<Vec<T>, MetricsApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(MetricsApiError::BackendUnavailable {
                operation,
                message: "access denied".to_string(),
                transient: false,
            });
        }
        Ok(self.items.clone())
    }
}

#[async_trait]
impl ListBuckets for FakeInventory<Bucket> {
    async fn list_buckets(&self) -> Result<Vec<Bucket>, MetricsApiError> {
        self.list("ListBuckets")
    }
}

#[async_trait]
impl ListTables for FakeInventory<Table> {
    async fn list_tables(&self) -> Result<Vec<Table>, MetricsApiError> {
        self.list("ListTables")
    }
}

#[async_trait]
impl ListFunctions for FakeInventory<LambdaFunction> {
    async fn list_functions(&self) -> Result<Vec<LambdaFunction>, MetricsApiError> {
        self.list("ListFunctions")
    }
}

pub fn buckets(names: &[&str]) -> Vec<Bucket> {
    names.iter().map(|name| Bucket::named(name)).collect()
}

pub fn tables(names: &[&str]) -> Vec<Table> {
    names.iter().map(|name| Table::named(name)).collect()
}

pub fn functions(names: &[&str]) -> Vec<LambdaFunction> {
    names.iter().map(|name| LambdaFunction::named(name)).collect()
}

fn base_time() -> DateTime<Utc> {
    Utc.ymd(2021, 1, 10).and_hms(0, 0, 0)
}

fn hourly_points(statistic: Statistic, values: &[f64]) -> Vec<Datapoint> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            Datapoint::at(base_time() + Duration::hours(index as i64)).with(statistic, *value)
        })
        .collect()
}

/// Hourly Sum datapoints, oldest first.
pub fn sum_points(values: &[f64]) -> Vec<Datapoint> {
    hourly_points(Statistic::Sum, values)
}

/// Hourly Average datapoints; the last value is the latest.
pub fn average_points(values: &[f64]) -> Vec<Datapoint> {
    hourly_points(Statistic::Average, values)
}

pub fn time_range(hours: i64) -> TimeRange {
    let hours = Hours::try_from(hours).expect("hours in range");
    TimeRange::ending_at(base_time() + Duration::days(1), hours)
}
