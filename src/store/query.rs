//! The store-native query language: filters, operands and pipeline stages.

use std::fmt::{self, Display};

use time::OffsetDateTime;

use crate::{document_id::DocumentId, store::ID_FIELD};

/// The name of the field that holds the composite key of a grouped row.
pub const GROUP_KEY_FIELD: &str = "_id";

/// A comparison or membership operator understood by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    /// Equal to.
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// The value is one of the listed values.
    In,
    /// The value is none of the listed values.
    Nin,
}

impl ComparisonOperator {
    /// The store's native token for the operator, e.g. `$gte`.
    pub fn token(self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "$eq",
            ComparisonOperator::Ne => "$ne",
            ComparisonOperator::Gt => "$gt",
            ComparisonOperator::Gte => "$gte",
            ComparisonOperator::Lt => "$lt",
            ComparisonOperator::Lte => "$lte",
            ComparisonOperator::In => "$in",
            ComparisonOperator::Nin => "$nin",
        }
    }

    /// Whether the operator tests membership in a list of values.
    pub fn is_membership(self) -> bool {
        matches!(self, ComparisonOperator::In | ComparisonOperator::Nin)
    }
}

impl Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A strongly typed value to compare document fields against.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A single document ID.
    Id(DocumentId),
    /// A list of document IDs.
    Ids(Vec<DocumentId>),
    /// A point in time.
    DateTime(OffsetDateTime),
    /// A number.
    Number(f64),
    /// A list of numbers.
    Numbers(Vec<f64>),
    /// A string.
    String(String),
    /// A list of strings.
    Strings(Vec<String>),
    /// A boolean.
    Bool(bool),
}

/// One comparison applied to a field.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// How to compare.
    pub operator: ComparisonOperator,
    /// What to compare against.
    pub operand: Operand,
}

/// Every condition on one field. A document matches only if all of them hold.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConditions {
    /// The field path, possibly dotted.
    pub field: String,
    /// The conditions, all of which must hold.
    pub conditions: Vec<Condition>,
}

/// A conjunction of per-field conditions. The empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: Vec<FieldConditions>,
}

impl Filter {
    /// A filter that matches every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// A filter that matches the document with `id`.
    pub fn by_id(id: DocumentId) -> Self {
        Self::all().and(
            ID_FIELD,
            Condition {
                operator: ComparisonOperator::Eq,
                operand: Operand::Id(id),
            },
        )
    }

    /// Add `condition` on `field`, merging it with earlier conditions on the same field.
    pub fn push(&mut self, field: &str, condition: Condition) {
        match self.fields.iter_mut().find(|entry| entry.field == field) {
            Some(entry) => entry.conditions.push(condition),
            None => self.fields.push(FieldConditions {
                field: field.to_owned(),
                conditions: vec![condition],
            }),
        }
    }

    /// Builder form of [Filter::push].
    pub fn and(mut self, field: &str, condition: Condition) -> Self {
        self.push(field, condition);
        self
    }

    /// The conditions grouped by field, in order of first appearance.
    pub fn fields(&self) -> &[FieldConditions] {
        &self.fields
    }

    /// Whether the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A component that can be extracted from a date field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    /// The calendar year.
    Year,
    /// The month, 1-12.
    Month,
    /// The day of the month, 1-31.
    Day,
}

impl DatePart {
    /// The name of the group key that holds this part.
    pub fn key_name(self) -> &'static str {
        match self {
            DatePart::Year => "year",
            DatePart::Month => "month",
            DatePart::Day => "day",
        }
    }
}

/// Where the value of a group key comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// The value of a document field.
    Field(String),
    /// A part of the `date` field.
    DatePart(DatePart),
}

/// One named component of a composite group key.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupKey {
    /// The name of the key in the output.
    pub name: String,
    /// Where the key value is read from.
    pub source: KeySource,
}

/// How grouped rows are combined into one value.
#[derive(Debug, Clone, PartialEq)]
pub enum AccumulatorOp {
    /// Sum of a numeric field.
    Sum(String),
    /// Number of rows in the group.
    Count,
    /// Average of a numeric field.
    Avg(String),
}

/// A named aggregate computed for each group.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    /// The name of the output field.
    pub name: String,
    /// The aggregate operation.
    pub op: AccumulatorOp,
}

/// Copies the value at `source` into the top-level field `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// The output field name.
    pub name: String,
    /// The (possibly dotted) path of the value in the input row.
    pub source: String,
}

/// The order in which a sort field is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One step of an aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keep only documents that match the filter.
    Match(Filter),
    /// Group documents by a composite key and compute accumulators per group.
    ///
    /// Output rows hold the key under [GROUP_KEY_FIELD] and one field per accumulator.
    Group {
        /// The components of the group key.
        key: Vec<GroupKey>,
        /// The aggregates to compute.
        accumulators: Vec<Accumulator>,
    },
    /// Replace each row with only the projected fields.
    Project(Vec<Projection>),
    /// Stable sort by each field in turn.
    Sort(Vec<(String, SortDirection)>),
    /// Drop the first n rows.
    Skip(usize),
    /// Keep at most n rows.
    Limit(usize),
}
