use async_trait::async_trait;
use rusoto_s3::{S3Client, S3};

use crate::error::MetricsApiError;
use crate::retry::{with_backoff, RetryPolicy};

pub struct S3BucketClient {
    client: S3Client,
    retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub name: String,
    pub creation_date: Option<String>,
}

impl Bucket {
    #[cfg(test)]
    pub fn named(name: &str) -> Self {
        Bucket {
            name: name.to_string(),
            creation_date: None,
        }
    }
}

#[async_trait]
pub trait ListBuckets: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<Bucket>, MetricsApiError>;
}

#[async_trait]
impl ListBuckets for S3BucketClient {
    async fn list_buckets(&self) -> Result<Vec<Bucket>, MetricsApiError> {
        let client = &self.client;
        let result = with_backoff(&self.retry, "ListBuckets", || async move {
            client
                .list_buckets()
                .await
                .map_err(|error| MetricsApiError::backend("ListBuckets", error))
        })
        .await?;

        let mut buckets = Vec::<Bucket>::new();
        for bucket in result.buckets.unwrap_or_default() {
            buckets.push(Bucket {
                name: bucket.name.ok_or(MetricsApiError::NoneValue)?,
                creation_date: bucket.creation_date,
            })
        }
        Ok(buckets)
    }
}

impl S3BucketClient {
    pub fn new_with_client(client: S3Client, retry: RetryPolicy) -> Self {
        S3BucketClient { client, retry }
    }
}
