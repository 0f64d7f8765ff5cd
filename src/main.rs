mod cloud_watch_metrics_client;
mod config;
mod dynamodb_table_client;
mod envelope;
mod error;
mod gateway;
mod handler;
mod lambda_function_client;
mod metric;
mod report;
mod retry;
mod rules;
mod s3_bucket_client;
mod service;
mod summary;
#[cfg(test)]
mod testing;
mod time_range;

use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use lambda_runtime::{handler_fn, Context, Error};
use rusoto_cloudwatch::CloudWatchClient;
use rusoto_dynamodb::DynamoDbClient;
use rusoto_lambda::LambdaClient;
use rusoto_s3::S3Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cloud_watch_metrics_client::CloudWatchMetricsClient;
use crate::config::Config;
use crate::dynamodb_table_client::DynamoDbTableClient;
use crate::gateway::ApiGatewayRequest;
use crate::handler::MetricsApi;
use crate::lambda_function_client::LambdaFunctionClient;
use crate::s3_bucket_client::S3BucketClient;
use crate::summary::{DynamoDbSummarizer, LambdaSummarizer, S3Summarizer, Summarizers};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::from_env()?;
    init_tracing(&config.log_level)?;
    info!(region = config.region.name(), "starting metrics api");

    let api = build_api(&config);
    lambda_runtime::run(handler_fn(move |event: ApiGatewayRequest, _: Context| {
        let api = api.clone();
        async move { Ok::<_, Error>(api.handle(event).await) }
    }))
    .await?;
    Ok(())
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(level)
        .with_context(|| format!("LOG_LEVEL is not a valid filter: {}", level))?;
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        // CloudWatch Logs records the ingestion time.
        .without_time()
        .with_target(false)
        .try_init()
        .map_err(|error| anyhow!(error))
}

fn build_api(config: &Config) -> MetricsApi {
    let metrics = Arc::new(CloudWatchMetricsClient::new_with_client(
        CloudWatchClient::new(config.region.clone()),
        config.retry,
    ));
    let buckets = Arc::new(S3BucketClient::new_with_client(
        S3Client::new(config.region.clone()),
        config.retry,
    ));
    let tables = Arc::new(DynamoDbTableClient::new_with_client(
        DynamoDbClient::new(config.region.clone()),
        config.retry,
    ));
    let functions = Arc::new(LambdaFunctionClient::new_with_client(
        LambdaClient::new(config.region.clone()),
        config.retry,
    ));

    let summarizers = Summarizers::new(
        Arc::new(S3Summarizer::new(buckets, metrics.clone())),
        Arc::new(DynamoDbSummarizer::new(tables, metrics.clone())),
        Arc::new(LambdaSummarizer::new(functions, metrics)),
    );
    MetricsApi::new(summarizers, config.report_limits)
}
