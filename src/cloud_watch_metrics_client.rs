use crate::error::MetricsApiError;
use async_trait::async_trait;

use rusoto_cloudwatch::{CloudWatch, CloudWatchClient, GetMetricStatisticsInput};

use crate::metric::{Datapoint, MetricRequest, MetricSeries};
use crate::retry::{with_backoff, RetryPolicy};
use std::convert::TryFrom;
use tracing::debug;

pub struct CloudWatchMetricsClient {
    client: CloudWatchClient,
    retry: RetryPolicy,
}

/// Source of metric datapoints. A resource with no data yields an empty
/// series, not an error.
#[async_trait]
pub trait FetchMetrics: Send + Sync {
    async fn fetch(&self, request: &MetricRequest) -> Result<MetricSeries, MetricsApiError>;
}

#[async_trait]
impl FetchMetrics for CloudWatchMetricsClient {
    async fn fetch(&self, request: &MetricRequest) -> Result<MetricSeries, MetricsApiError> {
        request.validate()?;
        let input = GetMetricStatisticsInput {
            start_time: request.time_range.start_param(),
            end_time: request.time_range.end_param(),
            metric_name: request.metric_name.clone(),
            namespace: request.namespace.to_string(),
            period: request.period,
            dimensions: Some(
                request
                    .dimensions
                    .iter()
                    .map(|dimension| rusoto_cloudwatch::Dimension {
                        name: dimension.name.clone(),
                        value: dimension.value.clone(),
                    })
                    .collect(),
            ),
            statistics: Some(
                request
                    .statistics
                    .iter()
                    .map(|statistic| statistic.to_string())
                    .collect(),
            ),
            ..Default::default()
        };
        let client = &self.client;
        let input = &input;
        let output = with_backoff(&self.retry, "GetMetricStatistics", || async move {
            client
                .get_metric_statistics(input.clone())
                .await
                .map_err(|error| MetricsApiError::backend("GetMetricStatistics", error))
        })
        .await?;

        let datapoints = output
            .datapoints
            .unwrap_or_default()
            .into_iter()
            .map(Datapoint::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            metric = %request.metric_name,
            namespace = request.namespace,
            datapoints = datapoints.len(),
            "fetched metric statistics"
        );
        Ok(MetricSeries::from_request(request, datapoints))
    }
}

impl CloudWatchMetricsClient {
    pub fn new_with_client(client: CloudWatchClient, retry: RetryPolicy) -> Self {
        CloudWatchMetricsClient { client, retry }
    }
}
