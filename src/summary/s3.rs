use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::cloud_watch_metrics_client::FetchMetrics;
use crate::error::MetricsApiError;
use crate::metric::{round2, Dimension, MetricRequest, Statistic};
use crate::rules;
use crate::s3_bucket_client::ListBuckets;
use crate::service::{HealthStatus, ServiceKind};
use crate::summary::{
    sampled, AggregatedTotals, DetailCollector, FailureTally, MetricQuery, ResourceDetail,
    ResourceSummary, ServiceSummary, Summarize,
};
use crate::time_range::TimeRange;

/// S3 publishes storage metrics once a day.
const STORAGE_PERIOD: i64 = 86400;
const STORAGE_TYPES: [&str; 3] = ["StandardStorage", "StandardIAStorage", "GlacierStorage"];
const STORAGE_STATISTICS: [Statistic; 2] = [Statistic::Average, Statistic::Maximum];

const REQUEST_METRICS: [&str; 8] = [
    "AllRequests",
    "GetRequests",
    "PutRequests",
    "DeleteRequests",
    "4xxErrors",
    "5xxErrors",
    "FirstByteLatency",
    "TotalRequestLatency",
];
const REQUEST_STATISTICS: [Statistic; 3] = [Statistic::Sum, Statistic::Average, Statistic::Maximum];

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct S3Totals {
    pub total_size_bytes: f64,
    pub total_size_gb: f64,
    pub total_objects: u64,
}

pub struct S3Summarizer {
    buckets: Arc<dyn ListBuckets>,
    metrics: Arc<dyn FetchMetrics>,
}

impl S3Summarizer {
    pub fn new(buckets: Arc<dyn ListBuckets>, metrics: Arc<dyn FetchMetrics>) -> Self {
        S3Summarizer { buckets, metrics }
    }

    fn storage_request(
        bucket: &str,
        metric_name: &str,
        storage_type: &str,
        time_range: TimeRange,
    ) -> MetricRequest {
        MetricRequest::new(
            ServiceKind::S3.namespace(),
            metric_name,
            vec![
                Dimension::new(ServiceKind::S3.dimension_name(), bucket),
                Dimension::new("StorageType", storage_type),
            ],
            &STORAGE_STATISTICS,
            time_range,
        )
        .with_period(STORAGE_PERIOD)
    }

    /// Latest stored bytes across storage classes and the latest object count.
    async fn bucket_storage(
        &self,
        bucket: &str,
        time_range: TimeRange,
    ) -> Result<(f64, f64), MetricsApiError> {
        let mut size_bytes = 0.0;
        for storage_type in STORAGE_TYPES.iter() {
            let request = Self::storage_request(bucket, "BucketSizeBytes", storage_type, time_range);
            let series = self.metrics.fetch(&request).await?;
            size_bytes += series.latest(Statistic::Average).unwrap_or(0.0);
        }
        let request =
            Self::storage_request(bucket, "NumberOfObjects", "AllStorageTypes", time_range);
        let objects = self
            .metrics
            .fetch(&request)
            .await?
            .latest(Statistic::Average)
            .unwrap_or(0.0);
        Ok((size_bytes, objects))
    }
}

#[async_trait]
impl Summarize for S3Summarizer {
    fn service(&self) -> ServiceKind {
        ServiceKind::S3
    }

    async fn list_resources(&self) -> Result<Vec<String>, MetricsApiError> {
        let buckets = self.buckets.list_buckets().await?;
        Ok(buckets.into_iter().map(|bucket| bucket.name).collect())
    }

    async fn summarize_one(
        &self,
        name: &str,
        query: &MetricQuery,
    ) -> Result<ResourceDetail, MetricsApiError> {
        self.ensure_listed(name).await?;
        info!(bucket = name, "getting metrics for bucket");

        let time_range = query.time_range;
        let mut collector = DetailCollector::new(self.metrics.as_ref(), name);
        let mut metrics = BTreeMap::new();
        for storage_type in STORAGE_TYPES.iter() {
            let request = Self::storage_request(name, "BucketSizeBytes", storage_type, time_range);
            collector
                .collect(format!("BucketSizeBytes_{}", storage_type), request, &mut metrics)
                .await;
        }
        let request = Self::storage_request(name, "NumberOfObjects", "AllStorageTypes", time_range);
        collector
            .collect("NumberOfObjects_AllStorageTypes".to_string(), request, &mut metrics)
            .await;

        let request_metrics = if query.include_request_metrics {
            let mut request_metrics = BTreeMap::new();
            for metric_name in REQUEST_METRICS.iter() {
                let request = MetricRequest::new(
                    ServiceKind::S3.namespace(),
                    metric_name,
                    vec![
                        Dimension::new(ServiceKind::S3.dimension_name(), name),
                        Dimension::new("FilterId", "EntireBucket"),
                    ],
                    &REQUEST_STATISTICS,
                    time_range,
                );
                collector
                    .collect(metric_name.to_string(), request, &mut request_metrics)
                    .await;
            }
            Some(request_metrics)
        } else {
            None
        };

        Ok(ResourceDetail {
            service: ServiceKind::S3,
            name: name.to_string(),
            metrics,
            request_metrics,
            operations: None,
            summary: None,
            metric_errors: collector.finish()?,
            time_range,
        })
    }

    async fn summarize_all(
        &self,
        query: &MetricQuery,
        limit: Option<usize>,
    ) -> Result<ServiceSummary, MetricsApiError> {
        let buckets = self.buckets.list_buckets().await?;
        let (fetch_count, sampled_resources) = sampled(buckets.len(), limit);

        let mut tally = FailureTally::default();
        let mut resources = Vec::with_capacity(fetch_count);
        let mut total_size_bytes = 0.0;
        let mut total_objects = 0.0;
        for bucket in buckets.iter().take(fetch_count) {
            let mut resource = ResourceSummary::named(&bucket.name);
            if let Some(created) = &bucket.creation_date {
                resource.metadata.insert("creation_date", json!(created));
            }
            let storage = self.bucket_storage(&bucket.name, query.time_range).await;
            if let Some((size_bytes, objects)) = tally.record(ServiceKind::S3, &mut resource, storage) {
                resource.metrics.insert("size_bytes", size_bytes);
                resource.metrics.insert("number_of_objects", objects);
                total_size_bytes += size_bytes;
                total_objects += objects;
            }
            resources.push(resource);
        }
        tally.finish()?;

        let mut summary = ServiceSummary {
            service: ServiceKind::S3,
            resource_count: buckets.len(),
            sampled_resources,
            aggregated: AggregatedTotals::S3(S3Totals {
                total_size_bytes,
                total_size_gb: round2(total_size_bytes / BYTES_PER_GB),
                total_objects: total_objects.round() as u64,
            }),
            status: HealthStatus::Healthy,
            resources,
            time_range: query.time_range,
        };
        summary.status = rules::status_for(&summary);
        Ok(summary)
    }
}
