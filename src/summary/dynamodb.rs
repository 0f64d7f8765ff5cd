use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::cloud_watch_metrics_client::FetchMetrics;
use crate::dynamodb_table_client::{ListTables, Table};
use crate::error::MetricsApiError;
use crate::metric::{round2, Dimension, MetricRequest, Statistic};
use crate::rules;
use crate::service::{HealthStatus, ServiceKind};
use crate::summary::{
    sampled, AggregatedTotals, DetailCollector, FailureTally, MetricQuery, ResourceDetail,
    ResourceSummary, ServiceSummary, Summarize,
};
use crate::time_range::TimeRange;

const TABLE_METRICS: [&str; 13] = [
    "ConsumedReadCapacityUnits",
    "ConsumedWriteCapacityUnits",
    "ProvisionedReadCapacityUnits",
    "ProvisionedWriteCapacityUnits",
    "ReadThrottleEvents",
    "WriteThrottleEvents",
    "ThrottledRequests",
    "ConditionalCheckFailedRequests",
    "SuccessfulRequestLatency",
    "SystemErrors",
    "UserErrors",
    "ReturnedItemCount",
    "ReturnedBytes",
];
const TABLE_STATISTICS: [Statistic; 4] = [
    Statistic::Sum,
    Statistic::Average,
    Statistic::Maximum,
    Statistic::Minimum,
];

const OPERATIONS: [&str; 6] = ["GetItem", "PutItem", "Query", "Scan", "DeleteItem", "UpdateItem"];
const OPERATION_STATISTICS: [Statistic; 4] = [
    Statistic::Average,
    Statistic::Maximum,
    Statistic::Minimum,
    Statistic::SampleCount,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamoDbTotals {
    pub total_read_capacity_consumed: f64,
    pub total_write_capacity_consumed: f64,
    pub total_throttle_events: u64,
    pub total_size_bytes: i64,
    pub total_items: i64,
}

#[derive(Debug, Default)]
struct TableUsage {
    read_capacity_consumed: f64,
    write_capacity_consumed: f64,
    throttle_events: f64,
}

pub struct DynamoDbSummarizer {
    tables: Arc<dyn ListTables>,
    metrics: Arc<dyn FetchMetrics>,
}

impl DynamoDbSummarizer {
    pub fn new(tables: Arc<dyn ListTables>, metrics: Arc<dyn FetchMetrics>) -> Self {
        DynamoDbSummarizer { tables, metrics }
    }

    fn table_request(
        table: &str,
        metric_name: &str,
        statistics: &[Statistic],
        time_range: TimeRange,
    ) -> MetricRequest {
        MetricRequest::new(
            ServiceKind::DynamoDb.namespace(),
            metric_name,
            vec![Dimension::new(ServiceKind::DynamoDb.dimension_name(), table)],
            statistics,
            time_range,
        )
    }

    async fn summed(
        &self,
        table: &str,
        metric_name: &str,
        time_range: TimeRange,
    ) -> Result<f64, MetricsApiError> {
        let request = Self::table_request(table, metric_name, &[Statistic::Sum], time_range);
        self.metrics.fetch(&request).await?.sum(Statistic::Sum)
    }

    async fn table_usage(
        &self,
        table: &str,
        time_range: TimeRange,
    ) -> Result<TableUsage, MetricsApiError> {
        let read_throttles = self.summed(table, "ReadThrottleEvents", time_range).await?;
        let write_throttles = self.summed(table, "WriteThrottleEvents", time_range).await?;
        Ok(TableUsage {
            read_capacity_consumed: self
                .summed(table, "ConsumedReadCapacityUnits", time_range)
                .await?,
            write_capacity_consumed: self
                .summed(table, "ConsumedWriteCapacityUnits", time_range)
                .await?,
            throttle_events: read_throttles + write_throttles,
        })
    }

    fn resource_for(table: &Table) -> ResourceSummary {
        let mut resource = ResourceSummary::named(&table.name);
        resource.metadata.insert("status", json!(table.status));
        resource.metadata.insert("billing_mode", json!(table.billing_mode));
        resource.metadata.insert("item_count", json!(table.item_count));
        resource.metadata.insert("size_bytes", json!(table.size_bytes));
        if let Some(error) = &table.describe_error {
            resource.metadata.insert("error", json!(error));
        }
        resource
    }
}

#[async_trait]
impl Summarize for DynamoDbSummarizer {
    fn service(&self) -> ServiceKind {
        ServiceKind::DynamoDb
    }

    async fn list_resources(&self) -> Result<Vec<String>, MetricsApiError> {
        let tables = self.tables.list_tables().await?;
        Ok(tables.into_iter().map(|table| table.name).collect())
    }

    async fn summarize_one(
        &self,
        name: &str,
        query: &MetricQuery,
    ) -> Result<ResourceDetail, MetricsApiError> {
        self.ensure_listed(name).await?;
        info!(table = name, "getting metrics for table");

        let time_range = query.time_range;
        let mut collector = DetailCollector::new(self.metrics.as_ref(), name);
        let mut metrics = BTreeMap::new();
        for metric_name in TABLE_METRICS.iter() {
            let request = Self::table_request(name, metric_name, &TABLE_STATISTICS, time_range);
            collector.collect(metric_name.to_string(), request, &mut metrics).await;
        }

        let operations = if query.include_operations {
            let mut operations = BTreeMap::new();
            for operation in OPERATIONS.iter() {
                let request = MetricRequest::new(
                    ServiceKind::DynamoDb.namespace(),
                    "SuccessfulRequestLatency",
                    vec![
                        Dimension::new(ServiceKind::DynamoDb.dimension_name(), name),
                        Dimension::new("Operation", operation),
                    ],
                    &OPERATION_STATISTICS,
                    time_range,
                );
                collector.collect(operation.to_string(), request, &mut operations).await;
            }
            Some(operations)
        } else {
            None
        };

        Ok(ResourceDetail {
            service: ServiceKind::DynamoDb,
            name: name.to_string(),
            metrics,
            request_metrics: None,
            operations,
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
        let tables = self.tables.list_tables().await?;
        let (fetch_count, sampled_resources) = sampled(tables.len(), limit);

        let mut tally = FailureTally::default();
        let mut resources = Vec::with_capacity(fetch_count);
        let mut totals = DynamoDbTotals {
            total_read_capacity_consumed: 0.0,
            total_write_capacity_consumed: 0.0,
            total_throttle_events: 0,
            total_size_bytes: tables.iter().map(|table| table.size_bytes).sum(),
            total_items: tables.iter().map(|table| table.item_count).sum(),
        };
        let mut throttle_events = 0.0;
        for table in tables.iter().take(fetch_count) {
            let mut resource = Self::resource_for(table);
            let usage = self.table_usage(&table.name, query.time_range).await;
            if let Some(usage) = tally.record(ServiceKind::DynamoDb, &mut resource, usage) {
                resource.metrics.insert("read_capacity_consumed", usage.read_capacity_consumed);
                resource.metrics.insert("write_capacity_consumed", usage.write_capacity_consumed);
                resource.metrics.insert("throttle_events", usage.throttle_events);
                totals.total_read_capacity_consumed += usage.read_capacity_consumed;
                totals.total_write_capacity_consumed += usage.write_capacity_consumed;
                throttle_events += usage.throttle_events;
            }
            resources.push(resource);
        }
        tally.finish()?;

        totals.total_read_capacity_consumed = round2(totals.total_read_capacity_consumed);
        totals.total_write_capacity_consumed = round2(totals.total_write_capacity_consumed);
        totals.total_throttle_events = throttle_events.round() as u64;

        let mut summary = ServiceSummary {
            service: ServiceKind::DynamoDb,
            resource_count: tables.len(),
            sampled_resources,
            aggregated: AggregatedTotals::DynamoDb(totals),
            status: HealthStatus::Healthy,
            resources,
            time_range: query.time_range,
        };
        summary.status = rules::status_for(&summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use crate::dynamodb_table_client::Table;
    use crate::error::MetricsApiError;
    use crate::service::{HealthStatus, ServiceKind};
    use crate::summary::{AggregatedTotals, DynamoDbSummarizer, DynamoDbTotals, MetricQuery, Summarize};
    use crate::testing::{sum_points, tables, time_range, FakeInventory, FakeMetrics};
    use serde_json::json;
    use std::sync::Arc;

    fn summarizer(inventory: FakeInventory<Table>, metrics: FakeMetrics) -> DynamoDbSummarizer {
        DynamoDbSummarizer::new(Arc::new(inventory), Arc::new(metrics))
    }

    #[tokio::test]
    async fn test_summarize_all_with_throttling() {
        let mut listed = tables(&["orders", "sessions"]);
        listed[0].item_count = 40;
        listed[0].size_bytes = 4000;
        listed[1].item_count = 2;
        listed[1].size_bytes = 200;
        let metrics = FakeMetrics::default()
            .with("ConsumedReadCapacityUnits", &["orders"], sum_points(&[10.5, 20.0]))
            .with("ConsumedWriteCapacityUnits", &["orders"], sum_points(&[3.0]))
            .with("ReadThrottleEvents", &["sessions"], sum_points(&[2.0, 1.0]))
            .with("WriteThrottleEvents", &["sessions"], sum_points(&[4.0]));
        let dynamodb = summarizer(FakeInventory::of(listed), metrics);

        let summary = dynamodb
            .summarize_all(&MetricQuery::summary(ServiceKind::DynamoDb, time_range(24)), None)
            .await
            .unwrap();

        assert_eq!(
            summary.aggregated,
            AggregatedTotals::DynamoDb(DynamoDbTotals {
                total_read_capacity_consumed: 30.5,
                total_write_capacity_consumed: 3.0,
                total_throttle_events: 7,
                total_size_bytes: 4200,
                total_items: 42,
            })
        );
        assert_eq!(summary.status, HealthStatus::Warning);
        assert_eq!(summary.resources[1].metric("throttle_events"), 7.0);
    }

    #[tokio::test]
    async fn test_summarize_all_keeps_undescribed_table() {
        let mut listed = tables(&["orders", "legacy"]);
        listed[1].describe_error = Some("AccessDenied".to_string());
        let metrics = FakeMetrics::default()
            .with("ConsumedReadCapacityUnits", &["legacy"], sum_points(&[8.0]));
        let dynamodb = summarizer(FakeInventory::of(listed), metrics);

        let summary = dynamodb
            .summarize_all(&MetricQuery::summary(ServiceKind::DynamoDb, time_range(24)), None)
            .await
            .unwrap();
        assert_eq!(summary.resource_count, 2);
        assert_eq!(summary.status, HealthStatus::Healthy);
        assert_eq!(summary.resources[1].metadata["error"], json!("AccessDenied"));
        assert_eq!(summary.resources[1].metrics_error, None);
        assert_eq!(summary.resources[1].metric("read_capacity_consumed"), 8.0);
    }

    #[tokio::test]
    async fn test_summarize_all_when_no_table_can_be_described() {
        let mut listed = tables(&["orders"]);
        listed[0].describe_error = Some("AccessDenied on DescribeTable".to_string());
        let dynamodb = summarizer(FakeInventory::of(listed), FakeMetrics::default());

        let summary = dynamodb
            .summarize_all(&MetricQuery::summary(ServiceKind::DynamoDb, time_range(24)), None)
            .await
            .unwrap();
        assert_eq!(summary.resource_count, 1);
        assert_eq!(
            summary.resources[0].metadata["error"],
            json!("AccessDenied on DescribeTable")
        );
        assert_eq!(summary.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_listing_failure_propagates() {
        let dynamodb = summarizer(FakeInventory::failing(), FakeMetrics::default());
        let result = dynamodb
            .summarize_all(&MetricQuery::summary(ServiceKind::DynamoDb, time_range(24)), None)
            .await;
        assert!(matches!(result, Err(MetricsApiError::BackendUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_summarize_one_with_operations() {
        let metrics = FakeMetrics::default()
            .with("ReadThrottleEvents", &["orders"], sum_points(&[1.0]))
            .with("SuccessfulRequestLatency", &["orders", "Query"], sum_points(&[5.0]));
        let dynamodb = summarizer(FakeInventory::of(tables(&["orders"])), metrics.clone());
        let mut query = MetricQuery::summary(ServiceKind::DynamoDb, time_range(6));
        query.include_operations = true;

        let detail = dynamodb.summarize_one("orders", &query).await.unwrap();
        assert_eq!(detail.metrics.keys().collect::<Vec<_>>(), vec!["ReadThrottleEvents"]);
        assert_eq!(
            detail.operations.as_ref().unwrap().keys().collect::<Vec<_>>(),
            vec!["Query"]
        );
        assert_eq!(metrics.calls(), 13 + 6);

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["table_name"], "orders");
        assert_eq!(json["time_range"]["hours"], 6);
    }

    #[tokio::test]
    async fn test_summarize_one_omits_operations_without_flag() {
        let dynamodb = summarizer(FakeInventory::of(tables(&["orders"])), FakeMetrics::default());
        let query = MetricQuery::summary(ServiceKind::DynamoDb, time_range(24));
        let detail = dynamodb.summarize_one("orders", &query).await.unwrap();
        assert!(detail.operations.is_none());
        assert!(serde_json::to_value(&detail).unwrap().get("operations").is_none());
    }

    #[tokio::test]
    async fn test_summarize_one_backend_down() {
        let dynamodb = summarizer(
            FakeInventory::of(tables(&["orders"])),
            FakeMetrics::default().unavailable(),
        );
        let query = MetricQuery::summary(ServiceKind::DynamoDb, time_range(24));
        let error = dynamodb.summarize_one("orders", &query).await.unwrap_err();
        assert_eq!(error.status_code(), 503);
    }
}
