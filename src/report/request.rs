//! The JSON shape of an ad-hoc report request.

use serde::Deserialize;
use serde_json::{Map, Value};

/// A declarative description of an aggregation over transactions.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AggregationRequest {
    /// Conditions a transaction must meet to be included.
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    /// Field names, or `date:<part>` pseudo-keys, to group rows by.
    pub group_by: Vec<String>,
    /// The aggregates computed for each group.
    pub metrics: Vec<MetricSpec>,
    /// Output field to sort direction (`1` or `-1`), applied in the given order.
    #[serde(default)]
    pub sort_by: Option<Map<String, Value>>,
    /// The maximum number of rows to return.
    #[serde(default)]
    pub limit: Option<usize>,
    /// The number of rows to skip.
    #[serde(default)]
    pub offset: Option<usize>,
}

/// One filter condition, e.g. `{"field": "amount", "operator": "gte", "value": 10}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterSpec {
    /// The transaction field to test.
    pub field: String,
    /// One of `eq`, `ne`, `gt`, `gte`, `lt`, `lte`, `in` or `nin`.
    pub operator: String,
    /// The value to compare against.
    pub value: FilterValue,
}

/// A loosely typed filter value as sent by a client.
///
/// Which variants are acceptable depends on the field and operator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// A single string.
    String(String),
    /// A single number of any width or precision.
    Number(f64),
    /// A boolean.
    Bool(bool),
    /// A list of strings.
    StringList(Vec<String>),
    /// A list of numbers.
    NumberList(Vec<f64>),
    /// Any other JSON value. Always rejected during coercion.
    Unsupported(Value),
}

/// A named aggregate, e.g. `{"name": "total", "operation": "sum", "field": "amount"}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricSpec {
    /// The name of the output field.
    pub name: String,
    /// One of `sum`, `count` or `avg`.
    pub operation: String,
    /// The field to aggregate. Required except for `count`.
    #[serde(default)]
    pub field: Option<String>,
}
