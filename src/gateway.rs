//! API Gateway proxy events, responses and request parsing.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::convert::TryFrom;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::envelope::ResponseEnvelope;
use crate::error::MetricsApiError;
use crate::service::ServiceKind;
use crate::time_range::Hours;

static CORS_HEADERS: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut headers = BTreeMap::new();
    headers.insert("Content-Type", "application/json");
    headers.insert("Access-Control-Allow-Origin", "*");
    headers.insert(
        "Access-Control-Allow-Headers",
        "Content-Type,X-Amz-Date,Authorization,X-Api-Key",
    );
    headers.insert("Access-Control-Allow-Methods", "GET,POST,OPTIONS");
    headers
});

const FALLBACK_BODY: &str =
    r#"{"status":"error","message":"Failed to encode response","data":null,"error_code":"INTERNAL_ERROR"}"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayRequest {
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub path_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
}

impl ApiGatewayRequest {
    pub fn method(&self) -> &str {
        self.http_method.as_deref().unwrap_or("GET")
    }

    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }

    pub fn path_parameter(&self, name: &str) -> Option<&str> {
        self.path_parameters
            .as_ref()
            .and_then(|parameters| parameters.get(name))
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_string_parameters
            .as_ref()
            .and_then(|parameters| parameters.get(name))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayResponse {
    pub status_code: u16,
    pub headers: BTreeMap<&'static str, &'static str>,
    pub body: String,
}

impl ApiGatewayResponse {
    pub fn json(status_code: u16, envelope: &ResponseEnvelope) -> Self {
        let body = serde_json::to_string(envelope).unwrap_or_else(|_| FALLBACK_BODY.to_string());
        ApiGatewayResponse {
            status_code,
            headers: CORS_HEADERS.clone(),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Service {
        kind: ServiceKind,
        resource_id: Option<String>,
    },
    Report,
}

impl Route {
    /// Matches `/metrics/{service}[/{resource}]` and `/metrics/report`,
    /// tolerating a stage prefix in front of `metrics`.
    pub fn resolve(request: &ApiGatewayRequest) -> Option<Route> {
        let segments: Vec<&str> = request
            .path()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        let start = segments.iter().position(|segment| *segment == "metrics")?;
        match &segments[start + 1..] {
            ["report"] => Some(Route::Report),
            [service] => {
                let kind = service.parse::<ServiceKind>().ok()?;
                Some(Route::Service {
                    kind,
                    resource_id: request
                        .path_parameter(kind.path_parameter())
                        .map(str::to_string),
                })
            }
            [service, resource] => {
                let kind = service.parse::<ServiceKind>().ok()?;
                let resource_id = request
                    .path_parameter(kind.path_parameter())
                    .unwrap_or(*resource)
                    .to_string();
                Some(Route::Service {
                    kind,
                    resource_id: Some(resource_id),
                })
            }
            _ => None,
        }
    }
}

fn parse_hours(raw: Option<&str>) -> Result<Hours, MetricsApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Hours::default()),
        Some(raw) => {
            let hours = raw
                .parse::<i64>()
                .map_err(|_| MetricsApiError::validation("Hours parameter must be an integer"))?;
            Hours::try_from(hours)
        }
    }
}

fn parse_flag(raw: Option<&str>) -> bool {
    raw.map_or(false, |value| value.eq_ignore_ascii_case("true"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceParams {
    pub hours: Hours,
    pub include_request_metrics: bool,
    pub include_operations: bool,
}

impl ServiceParams {
    pub fn from_request(request: &ApiGatewayRequest) -> Result<Self, MetricsApiError> {
        Ok(ServiceParams {
            hours: parse_hours(request.query("hours"))?,
            include_request_metrics: parse_flag(request.query("include_request_metrics")),
            include_operations: parse_flag(request.query("include_operations")),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct ReportBody {
    hours: Option<i64>,
    services: Option<Vec<String>>,
}

/// Malformed JSON stays `InvalidJson`; well-formed JSON with the wrong
/// field types is a validation failure.
fn parse_body(raw: &str) -> Result<ReportBody, MetricsApiError> {
    serde_json::from_str(raw).map_err(|error| {
        if error.is_data() {
            MetricsApiError::validation(format!("Invalid request body field type: {}", error))
        } else {
            MetricsApiError::InvalidJson(error)
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportParams {
    pub hours: Hours,
    pub services: BTreeSet<ServiceKind>,
}

impl ReportParams {
    /// POST reads a JSON body, anything else the query string.
    pub fn from_request(request: &ApiGatewayRequest) -> Result<Self, MetricsApiError> {
        if request.method().eq_ignore_ascii_case("POST") {
            let body: ReportBody = match request.body.as_deref().map(str::trim) {
                None | Some("") => ReportBody::default(),
                Some(raw) => parse_body(raw)?,
            };
            let hours = match body.hours {
                Some(hours) => Hours::try_from(hours)?,
                None => Hours::default(),
            };
            let services = body.services.unwrap_or_default();
            Ok(ReportParams {
                hours,
                services: ServiceKind::parse_list(services.iter().map(String::as_str))?,
            })
        } else {
            let hours = parse_hours(request.query("hours"))?;
            let services = request.query("services").unwrap_or("");
            Ok(ReportParams {
                hours,
                services: ServiceKind::parse_list(services.split(','))?,
            })
        }
    }
}
