use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::envelope::ResponseEnvelope;
use crate::error::MetricsApiError;
use crate::gateway::{ApiGatewayRequest, ApiGatewayResponse, ReportParams, Route, ServiceParams};
use crate::report::{self, ReportLimits};
use crate::service::ServiceKind;
use crate::summary::{MetricQuery, Summarizers};
use crate::time_range::TimeRange;

const REPORT_MESSAGE: &str = "Resource metrics report generated successfully";

/// Routes API Gateway events to the summarizers and wraps every outcome in
/// an envelope.
#[derive(Clone)]
pub struct MetricsApi {
    summarizers: Summarizers,
    report_limits: ReportLimits,
}

impl MetricsApi {
    pub fn new(summarizers: Summarizers, report_limits: ReportLimits) -> Self {
        MetricsApi {
            summarizers,
            report_limits,
        }
    }

    pub async fn handle(&self, request: ApiGatewayRequest) -> ApiGatewayResponse {
        info!(method = request.method(), path = request.path(), "received request");
        match Route::resolve(&request) {
            Some(Route::Service { kind, resource_id }) => {
                self.service_metrics(kind, resource_id, &request).await
            }
            Some(Route::Report) => self.report(&request).await,
            None => {
                warn!(path = request.path(), "no route");
                let error = MetricsApiError::not_found("Route", request.path());
                failure(error.to_string(), &error)
            }
        }
    }

    async fn service_metrics(
        &self,
        kind: ServiceKind,
        resource_id: Option<String>,
        request: &ApiGatewayRequest,
    ) -> ApiGatewayResponse {
        let result = match ServiceParams::from_request(request) {
            Ok(params) => self.query_service(kind, resource_id, params).await,
            Err(error) => Err(error),
        };
        match result {
            Ok((message, data)) => success(message, data),
            Err(error) => {
                let message = match &error {
                    MetricsApiError::Validation(_)
                    | MetricsApiError::InvalidJson(_)
                    | MetricsApiError::ResourceNotFound { .. } => error.to_string(),
                    _ => format!("Error retrieving {} metrics: {}", kind.display_name(), error),
                };
                failure(message, &error)
            }
        }
    }

    async fn query_service(
        &self,
        kind: ServiceKind,
        resource_id: Option<String>,
        params: ServiceParams,
    ) -> Result<(String, Value), MetricsApiError> {
        let summarizer = self.summarizers.get(kind);
        let query = MetricQuery {
            service: kind,
            resource_id,
            time_range: TimeRange::ending_now(params.hours),
            include_request_metrics: params.include_request_metrics,
            include_operations: params.include_operations,
        };
        match &query.resource_id {
            Some(name) => {
                let detail = summarizer.summarize_one(name, &query).await?;
                let message = format!(
                    "{} metrics for {} '{}'",
                    kind.display_name(),
                    kind.resource_label().to_lowercase(),
                    name
                );
                Ok((message, encode(&detail)?))
            }
            None => {
                info!(service = kind.as_str(), "getting metrics summary for all resources");
                let summary = summarizer.summarize_all(&query, None).await?;
                let message = format!(
                    "{} metrics summary for all {}",
                    kind.display_name(),
                    kind.resource_plural()
                );
                Ok((message, encode(&summary)?))
            }
        }
    }

    async fn report(&self, request: &ApiGatewayRequest) -> ApiGatewayResponse {
        let params = match ReportParams::from_request(request) {
            Ok(params) => params,
            Err(error) => return failure(error.to_string(), &error),
        };
        info!(hours = params.hours.get(), services = ?params.services, "generating report");

        let report = report::generate(
            &self.summarizers,
            TimeRange::ending_now(params.hours),
            &params.services,
            &self.report_limits,
        )
        .await;
        let data = match encode(&report) {
            Ok(data) => data,
            Err(error) => {
                return failure(format!("Error generating metrics report: {}", error), &error)
            }
        };

        if report.all_failed() {
            let error = MetricsApiError::BackendUnavailable {
                operation: "GenerateReport",
                message: "every requested service failed".to_string(),
                transient: false,
            };
            error!(%error, "report failed");
            let envelope = ResponseEnvelope::wrap_error(
                format!("Error generating metrics report: {}", error),
                &error,
                data,
            );
            return ApiGatewayResponse::json(error.status_code(), &envelope);
        }
        success(REPORT_MESSAGE.to_string(), data)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, MetricsApiError> {
    serde_json::to_value(value).map_err(|error| MetricsApiError::Encode(error.to_string()))
}

fn success(message: String, data: Value) -> ApiGatewayResponse {
    ApiGatewayResponse::json(200, &ResponseEnvelope::success(message, data))
}

fn failure(message: String, error: &MetricsApiError) -> ApiGatewayResponse {
    if error.status_code() >= 500 {
        error!(%error, "request failed");
    } else {
        info!(%error, "request rejected");
    }
    let envelope = ResponseEnvelope::wrap_error(message, error, Value::Null);
    ApiGatewayResponse::json(error.status_code(), &envelope)
}

#[cfg(test)]
mod tests {
    use crate::dynamodb_table_client::Table;
    use crate::gateway::{ApiGatewayRequest, ApiGatewayResponse};
    use crate::handler::MetricsApi;
    use crate::lambda_function_client::LambdaFunction;
    use crate::report::ReportLimits;
    use crate::s3_bucket_client::Bucket;
    use crate::summary::{DynamoDbSummarizer, LambdaSummarizer, S3Summarizer, Summarizers};
    use crate::testing::{
        buckets, functions, sum_points, tables, FakeInventory, FakeMetrics,
    };
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Harness {
        api: MetricsApi,
        metrics: FakeMetrics,
        listings: Vec<Arc<AtomicUsize>>,
    }

    impl Harness {
        fn new(
            s3: FakeInventory<Bucket>,
            dynamodb: FakeInventory<Table>,
            lambda: FakeInventory<LambdaFunction>,
            metrics: FakeMetrics,
        ) -> Self {
            let listings = vec![s3.counter(), dynamodb.counter(), lambda.counter()];
            let shared = Arc::new(metrics.clone());
            let summarizers = Summarizers::new(
                Arc::new(S3Summarizer::new(Arc::new(s3), shared.clone())),
                Arc::new(DynamoDbSummarizer::new(Arc::new(dynamodb), shared.clone())),
                Arc::new(LambdaSummarizer::new(Arc::new(lambda), shared)),
            );
            Harness {
                api: MetricsApi::new(summarizers, ReportLimits::default()),
                metrics,
                listings,
            }
        }

        fn standard(metrics: FakeMetrics) -> Self {
            Self::new(
                FakeInventory::of(buckets(&["logs", "quiet"])),
                FakeInventory::of(tables(&["orders"])),
                FakeInventory::of(functions(&["api"])),
                metrics,
            )
        }

        fn backend_calls(&self) -> usize {
            self.metrics.calls()
                + self
                    .listings
                    .iter()
                    .map(|counter| counter.load(Ordering::SeqCst))
                    .sum::<usize>()
        }

        async fn call(&self, event: Value) -> (ApiGatewayResponse, Value) {
            let request: ApiGatewayRequest = serde_json::from_value(event).unwrap();
            let response = self.api.handle(request).await;
            let body = serde_json::from_str(&response.body).unwrap();
            (response, body)
        }
    }

    #[tokio::test]
    async fn test_invalid_hours_makes_no_backend_calls() {
        let harness = Harness::standard(FakeMetrics::default());
        for path in &["/metrics/s3", "/metrics/dynamodb/orders", "/metrics/lambda", "/metrics/report"] {
            for hours in &["0", "721"] {
                let (response, body) = harness
                    .call(json!({
                        "httpMethod": "GET",
                        "path": path,
                        "queryStringParameters": {"hours": hours}
                    }))
                    .await;
                assert_eq!(response.status_code, 400);
                assert_eq!(body["status"], "error");
                assert_eq!(body["error_code"], "VALIDATION_ERROR");
                assert_eq!(body["message"], "Hours parameter must be between 1 and 720");
            }
        }
        assert_eq!(harness.backend_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_bucket_is_not_found() {
        let harness = Harness::standard(FakeMetrics::default());
        let (response, body) = harness
            .call(json!({
                "path": "/metrics/s3/does-not-exist",
                "pathParameters": {"bucket_name": "does-not-exist"}
            }))
            .await;
        assert_eq!(response.status_code, 404);
        assert_eq!(body["error_code"], "NOT_FOUND");
        assert_eq!(body["message"], "Bucket 'does-not-exist' not found");
        assert_eq!(body["data"], Value::Null);
    }

    #[tokio::test]
    async fn test_bucket_without_data_is_empty_success() {
        let harness = Harness::standard(FakeMetrics::default());
        let (response, body) = harness.call(json!({"path": "/metrics/s3/quiet"})).await;
        assert_eq!(response.status_code, 200);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "S3 metrics for bucket 'quiet'");
        assert_eq!(body["data"]["bucket_name"], "quiet");
        assert_eq!(body["data"]["metrics"], json!({}));
        assert_eq!(body["data"]["time_range"]["hours"], 24);
    }

    #[tokio::test]
    async fn test_service_summary() {
        let metrics = FakeMetrics::default()
            .with("Invocations", &["api"], sum_points(&[40.0]))
            .with("Errors", &["api"], sum_points(&[1.0]));
        let harness = Harness::standard(metrics);
        let (response, body) = harness
            .call(json!({"path": "/metrics/lambda", "queryStringParameters": {"hours": "6"}}))
            .await;
        assert_eq!(response.status_code, 200);
        assert_eq!(body["message"], "Lambda metrics summary for all functions");
        assert_eq!(body["data"]["resource_count"], 1);
        assert_eq!(body["data"]["aggregated"]["total_invocations"], 40);
        assert_eq!(body["data"]["status"], "warning");
        assert_eq!(body["data"]["time_range"]["hours"], 6);
    }

    #[tokio::test]
    async fn test_backend_failure_is_503() {
        let harness = Harness::standard(FakeMetrics::default().unavailable());
        let (response, body) = harness.call(json!({"path": "/metrics/dynamodb"})).await;
        assert_eq!(response.status_code, 503);
        assert_eq!(body["error_code"], "BACKEND_UNAVAILABLE");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Error retrieving DynamoDB metrics: "));
    }

    #[tokio::test]
    async fn test_report_with_one_failing_service() {
        let harness = Harness::new(
            FakeInventory::of(buckets(&["logs"])),
            FakeInventory::failing(),
            FakeInventory::of(functions(&["api"])),
            FakeMetrics::default(),
        );
        let (response, body) = harness
            .call(json!({"httpMethod": "GET", "path": "/metrics/report"}))
            .await;
        assert_eq!(response.status_code, 200);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Resource metrics report generated successfully");
        assert_eq!(body["data"]["services"]["dynamodb"]["status"], "error");
        assert_eq!(body["data"]["services"]["s3"]["status"], "healthy");
        assert_eq!(body["data"]["services"]["lambda"]["status"], "healthy");
        assert_eq!(body["data"]["overall_status"], "error");
        assert!(!body["data"]["recommendations"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_with_every_service_failing() {
        let harness = Harness::new(
            FakeInventory::failing(),
            FakeInventory::failing(),
            FakeInventory::failing(),
            FakeMetrics::default(),
        );
        let (response, body) = harness
            .call(json!({
                "httpMethod": "POST",
                "path": "/metrics/report",
                "body": "{\"services\": [\"s3\", \"lambda\"], \"hours\": 48}"
            }))
            .await;
        assert_eq!(response.status_code, 503);
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_code"], "BACKEND_UNAVAILABLE");
        assert_eq!(body["data"]["time_range"]["hours"], 48);
        assert!(body["data"]["services"].get("dynamodb").is_none());
    }

    #[tokio::test]
    async fn test_report_rejects_bad_input() {
        let harness = Harness::standard(FakeMetrics::default());
        let (response, body) = harness
            .call(json!({"httpMethod": "POST", "path": "/metrics/report", "body": "{oops"}))
            .await;
        assert_eq!(response.status_code, 400);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid JSON in request body: "));

        let (response, body) = harness
            .call(json!({
                "path": "/metrics/report",
                "queryStringParameters": {"services": "s3,ec2"}
            }))
            .await;
        assert_eq!(response.status_code, 400);
        assert_eq!(
            body["message"],
            "Invalid services: ec2. Valid options: s3, dynamodb, lambda"
        );
        assert_eq!(harness.backend_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let harness = Harness::standard(FakeMetrics::default());
        let (response, body) = harness.call(json!({"path": "/metrics/ec2"})).await;
        assert_eq!(response.status_code, 404);
        assert_eq!(body["error_code"], "NOT_FOUND");
        assert_eq!(response.headers["Access-Control-Allow-Origin"], "*");
    }
}
