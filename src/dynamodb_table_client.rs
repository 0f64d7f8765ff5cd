use async_trait::async_trait;
use rusoto_dynamodb::{DescribeTableInput, DynamoDb, DynamoDbClient, ListTablesInput};
use tracing::warn;

use crate::error::MetricsApiError;
use crate::retry::{with_backoff, RetryPolicy};

pub struct DynamoDbTableClient {
    client: DynamoDbClient,
    retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub status: Option<String>,
    pub item_count: i64,
    pub size_bytes: i64,
    pub billing_mode: String,
    /// Set when the table was listed but could not be described.
    pub describe_error: Option<String>,
}

impl Table {
    pub fn named(name: &str) -> Self {
        Table {
            name: name.to_string(),
            status: Some("ACTIVE".to_string()),
            item_count: 0,
            size_bytes: 0,
            billing_mode: "PROVISIONED".to_string(),
            describe_error: None,
        }
    }
}

#[async_trait]
pub trait ListTables: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<Table>, MetricsApiError>;
}

#[async_trait]
impl ListTables for DynamoDbTableClient {
    async fn list_tables(&self) -> Result<Vec<Table>, MetricsApiError> {
        let mut names = Vec::<String>::new();
        let mut exclusive_start_table_name: Option<String> = None;
        loop {
            let client = &self.client;
            let input = ListTablesInput {
                exclusive_start_table_name: exclusive_start_table_name.take(),
                ..ListTablesInput::default()
            };
            let input = &input;
            let page = with_backoff(&self.retry, "ListTables", || async move {
                client
                    .list_tables(input.clone())
                    .await
                    .map_err(|error| MetricsApiError::backend("ListTables", error))
            })
            .await?;

            names.extend(page.table_names.unwrap_or_default());
            match page.last_evaluated_table_name {
                Some(last) => exclusive_start_table_name = Some(last),
                None => break,
            }
        }

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            tables.push(self.describe(name).await);
        }
        Ok(tables)
    }
}

impl DynamoDbTableClient {
    pub fn new_with_client(client: DynamoDbClient, retry: RetryPolicy) -> Self {
        DynamoDbTableClient { client, retry }
    }

    async fn describe(&self, name: String) -> Table {
        let client = &self.client;
        let input = DescribeTableInput {
            table_name: name.clone(),
        };
        let input = &input;
        let described = with_backoff(&self.retry, "DescribeTable", || async move {
            client
                .describe_table(input.clone())
                .await
                .map_err(|error| MetricsApiError::backend("DescribeTable", error))
        })
        .await;

        match described.map(|output| output.table) {
            Ok(Some(table)) => Table {
                name,
                status: table.table_status,
                item_count: table.item_count.unwrap_or(0),
                size_bytes: table.table_size_bytes.unwrap_or(0),
                billing_mode: table
                    .billing_mode_summary
                    .and_then(|summary| summary.billing_mode)
                    .unwrap_or_else(|| "PROVISIONED".to_string()),
                describe_error: None,
            },
            Ok(None) => Table {
                describe_error: Some(MetricsApiError::NoneValue.to_string()),
                ..Table::named(&name)
            },
            Err(error) => {
                warn!(table = %name, %error, "could not describe table");
                Table {
                    status: None,
                    describe_error: Some(error.to_string()),
                    ..Table::named(&name)
                }
            }
        }
    }
}
