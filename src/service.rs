use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::MetricsApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    S3,
    DynamoDb,
    Lambda,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 3] = [ServiceKind::S3, ServiceKind::DynamoDb, ServiceKind::Lambda];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKind::S3 => "s3",
            ServiceKind::DynamoDb => "dynamodb",
            ServiceKind::Lambda => "lambda",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ServiceKind::S3 => "S3",
            ServiceKind::DynamoDb => "DynamoDB",
            ServiceKind::Lambda => "Lambda",
        }
    }

    /// Singular resource noun used in messages ("Bucket 'x' not found").
    pub fn resource_label(self) -> &'static str {
        match self {
            ServiceKind::S3 => "Bucket",
            ServiceKind::DynamoDb => "Table",
            ServiceKind::Lambda => "Function",
        }
    }

    pub fn resource_plural(self) -> &'static str {
        match self {
            ServiceKind::S3 => "buckets",
            ServiceKind::DynamoDb => "tables",
            ServiceKind::Lambda => "functions",
        }
    }

    /// Path parameter API Gateway uses for the resource id.
    pub fn path_parameter(self) -> &'static str {
        match self {
            ServiceKind::S3 => "bucket_name",
            ServiceKind::DynamoDb => "table_name",
            ServiceKind::Lambda => "function_name",
        }
    }

    pub fn namespace(self) -> &'static str {
        match self {
            ServiceKind::S3 => "AWS/S3",
            ServiceKind::DynamoDb => "AWS/DynamoDB",
            ServiceKind::Lambda => "AWS/Lambda",
        }
    }

    pub fn dimension_name(self) -> &'static str {
        match self {
            ServiceKind::S3 => "BucketName",
            ServiceKind::DynamoDb => "TableName",
            ServiceKind::Lambda => "FunctionName",
        }
    }

    /// Parses a comma separated list; empty input means every service.
    pub fn parse_list<'a, I>(names: I) -> Result<BTreeSet<ServiceKind>, MetricsApiError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut services = BTreeSet::new();
        let mut invalid = BTreeSet::new();
        for name in names.into_iter().map(str::trim).filter(|name| !name.is_empty()) {
            match name.parse() {
                Ok(kind) => {
                    services.insert(kind);
                }
                Err(_) => {
                    invalid.insert(name.to_string());
                }
            }
        }
        if !invalid.is_empty() {
            return Err(MetricsApiError::validation(format!(
                "Invalid services: {}. Valid options: s3, dynamodb, lambda",
                invalid.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }
        if services.is_empty() {
            services.extend(ServiceKind::ALL.iter().copied());
        }
        Ok(services)
    }
}

impl FromStr for ServiceKind {
    type Err = MetricsApiError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "s3" => Ok(ServiceKind::S3),
            "dynamodb" => Ok(ServiceKind::DynamoDb),
            "lambda" => Ok(ServiceKind::Lambda),
            other => Err(MetricsApiError::validation(format!(
                "Unknown service: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered so the worst status is the maximum: a fetch failure outranks
/// any threshold breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Error,
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus::Healthy
    }
}
