use async_trait::async_trait;
use rusoto_lambda::{Lambda, LambdaClient, ListFunctionsRequest};

use crate::error::MetricsApiError;
use crate::retry::{with_backoff, RetryPolicy};

pub struct LambdaFunctionClient {
    client: LambdaClient,
    retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambdaFunction {
    pub name: String,
    pub runtime: String,
    pub memory_size: i64,
    pub timeout: i64,
    pub code_size: i64,
    pub last_modified: String,
    pub description: String,
}

impl LambdaFunction {
    #[cfg(test)]
    pub fn named(name: &str) -> Self {
        LambdaFunction {
            name: name.to_string(),
            runtime: "N/A".to_string(),
            memory_size: 0,
            timeout: 0,
            code_size: 0,
            last_modified: String::new(),
            description: String::new(),
        }
    }
}

#[async_trait]
pub trait ListFunctions: Send + Sync {
    async fn list_functions(&self) -> Result<Vec<LambdaFunction>, MetricsApiError>;
}

#[async_trait]
impl ListFunctions for LambdaFunctionClient {
    async fn list_functions(&self) -> Result<Vec<LambdaFunction>, MetricsApiError> {
        let mut functions = Vec::<LambdaFunction>::new();
        let mut marker: Option<String> = None;
        loop {
            let client = &self.client;
            let request = ListFunctionsRequest {
                marker: marker.take(),
                ..ListFunctionsRequest::default()
            };
            let request = &request;
            let page = with_backoff(&self.retry, "ListFunctions", || async move {
                client
                    .list_functions(request.clone())
                    .await
                    .map_err(|error| MetricsApiError::backend("ListFunctions", error))
            })
            .await?;

            for function in page.functions.unwrap_or_default() {
                functions.push(LambdaFunction {
                    name: function.function_name.ok_or(MetricsApiError::NoneValue)?,
                    runtime: function.runtime.unwrap_or_else(|| "N/A".to_string()),
                    memory_size: function.memory_size.unwrap_or(0),
                    timeout: function.timeout.unwrap_or(0),
                    code_size: function.code_size.unwrap_or(0),
                    last_modified: function.last_modified.unwrap_or_default(),
                    description: function.description.unwrap_or_default(),
                })
            }
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(functions)
    }
}

impl LambdaFunctionClient {
    pub fn new_with_client(client: LambdaClient, retry: RetryPolicy) -> Self {
        LambdaFunctionClient { client, retry }
    }
}
