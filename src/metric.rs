use std::convert::TryFrom;
use std::fmt;
use std::ops::{Add, Div};

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::MetricsApiError;
use crate::time_range::{iso_timestamp, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Statistic {
    Sum,
    Average,
    Maximum,
    Minimum,
    SampleCount,
}

impl Statistic {
    pub fn as_str(self) -> &'static str {
        match self {
            Statistic::Sum => "Sum",
            Statistic::Average => "Average",
            Statistic::Maximum => "Maximum",
            Statistic::Minimum => "Minimum",
            Statistic::SampleCount => "SampleCount",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Datapoint {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Datapoint {
    #[cfg(test)]
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Datapoint {
            timestamp,
            sum: None,
            average: None,
            maximum: None,
            minimum: None,
            sample_count: None,
            unit: None,
        }
    }

    #[cfg(test)]
    pub fn with(mut self, statistic: Statistic, value: f64) -> Self {
        match statistic {
            Statistic::Sum => self.sum = Some(value),
            Statistic::Average => self.average = Some(value),
            Statistic::Maximum => self.maximum = Some(value),
            Statistic::Minimum => self.minimum = Some(value),
            Statistic::SampleCount => self.sample_count = Some(value),
        }
        self
    }

    pub fn value(&self, statistic: Statistic) -> Option<f64> {
        match statistic {
            Statistic::Sum => self.sum,
            Statistic::Average => self.average,
            Statistic::Maximum => self.maximum,
            Statistic::Minimum => self.minimum,
            Statistic::SampleCount => self.sample_count,
        }
    }
}

impl TryFrom<rusoto_cloudwatch::Datapoint> for Datapoint {
    type Error = MetricsApiError;

    fn try_from(point: rusoto_cloudwatch::Datapoint) -> Result<Self, Self::Error> {
        let timestamp = point
            .timestamp
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .ok_or(MetricsApiError::NoneValue)?
            .with_timezone(&Utc);
        Ok(Datapoint {
            timestamp,
            sum: point.sum,
            average: point.average,
            maximum: point.maximum,
            minimum: point.minimum,
            sample_count: point.sample_count,
            unit: point.unit,
        })
    }
}

fn serialize_timestamp<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&iso_timestamp(at))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: &str, value: &str) -> Self {
        Dimension {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// One GetMetricStatistics call: a metric, its dimensions and the statistics wanted.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRequest {
    pub namespace: &'static str,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    pub statistics: Vec<Statistic>,
    pub period: i64,
    pub time_range: TimeRange,
}

impl MetricRequest {
    pub fn new(
        namespace: &'static str,
        metric_name: &str,
        dimensions: Vec<Dimension>,
        statistics: &[Statistic],
        time_range: TimeRange,
    ) -> Self {
        MetricRequest {
            namespace,
            metric_name: metric_name.to_string(),
            dimensions,
            statistics: statistics.to_vec(),
            period: time_range.period_seconds(),
            time_range,
        }
    }

    pub fn with_period(mut self, period: i64) -> Self {
        self.period = period;
        self
    }

    pub fn validate(&self) -> Result<(), MetricsApiError> {
        if let Some(dimension) = self.dimensions.iter().find(|d| d.value.trim().is_empty()) {
            return Err(MetricsApiError::validation(format!(
                "Dimension {} must not be empty",
                dimension.name
            )));
        }
        if self.statistics.is_empty() {
            return Err(MetricsApiError::validation(format!(
                "No statistics requested for {}",
                self.metric_name
            )));
        }
        if self.time_range.start >= self.time_range.end {
            return Err(MetricsApiError::validation(
                "Time range start must be before its end",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
pub struct AggregatedMetrics {
    pub average: f64,
    pub maximum: f64,
    pub minimum: f64,
}

impl Default for AggregatedMetrics {
    fn default() -> Self {
        Self {
            average: 0.0,
            maximum: 0.0,
            minimum: 0.0,
        }
    }
}

/// Datapoints returned for one request, ascending by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub metric_name: String,
    pub namespace: &'static str,
    pub dimensions: Vec<Dimension>,
    pub datapoints: Vec<Datapoint>,
    pub period: i64,
    #[serde(serialize_with = "serialize_timestamp")]
    pub start_time: DateTime<Utc>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub end_time: DateTime<Utc>,
}

impl MetricSeries {
    pub fn from_request(request: &MetricRequest, mut datapoints: Vec<Datapoint>) -> Self {
        datapoints.sort_by_key(|point| point.timestamp);
        MetricSeries {
            metric_name: request.metric_name.clone(),
            namespace: request.namespace,
            dimensions: request.dimensions.clone(),
            datapoints,
            period: request.period,
            start_time: request.time_range.start,
            end_time: request.time_range.end,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.datapoints.is_empty()
    }

    /// Sum of one statistic across every datapoint; missing values count as zero.
    pub fn sum(&self, statistic: Statistic) -> Result<f64, MetricsApiError> {
        let total = self
            .datapoints
            .iter()
            .filter_map(|point| point.value(statistic))
            .map(to_decimal)
            .fold(BigDecimal::from(0), |total, value| total.add(value));
        total.to_f64().ok_or(MetricsApiError::ToPrimitive)
    }

    pub fn latest(&self, statistic: Statistic) -> Option<f64> {
        self.datapoints
            .iter()
            .rev()
            .find_map(|point| point.value(statistic))
    }

    /// Mean of averages with the overall extremes; every datapoint must
    /// carry Average, Minimum and Maximum.
    pub fn aggregate(&self) -> Result<AggregatedMetrics, MetricsApiError> {
        if self.datapoints.is_empty() {
            return Ok(AggregatedMetrics::default());
        }
        let mut total = BigDecimal::from(0);
        let mut minimum = f64::MAX;
        let mut maximum = f64::MIN;
        let count = BigDecimal::from(u32::try_from(self.datapoints.len())?);
        for data_point in &self.datapoints {
            let average = data_point
                .average
                .map(to_decimal)
                .ok_or(MetricsApiError::NoneValue)?;
            total = total.add(average);

            minimum = minimum.min(data_point.minimum.ok_or(MetricsApiError::NoneValue)?);
            maximum = maximum.max(data_point.maximum.ok_or(MetricsApiError::NoneValue)?);
        }

        let average = total
            .div(count)
            .to_f64()
            .ok_or(MetricsApiError::ToPrimitive)?;
        Ok(AggregatedMetrics {
            average,
            maximum,
            minimum,
        })
    }
}

fn to_decimal(value: f64) -> BigDecimal {
    BigDecimal::from_f64(value).map_or(BigDecimal::from(0), |value| value)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
