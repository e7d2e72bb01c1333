//! Evaluates filters and aggregation pipelines over JSON documents.

use std::{cmp::Ordering, collections::HashMap};

use serde_json::{Map, Number, Value};

use crate::{
    date::parse_stored_timestamp,
    document_id::DocumentId,
    store::{
        Document,
        query::{
            Accumulator, AccumulatorOp, ComparisonOperator, Condition, DatePart, Filter,
            GROUP_KEY_FIELD, GroupKey, KeySource, Operand, Projection, SortDirection, Stage,
        },
    },
};

/// Look up a possibly dotted field path in a document.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }

    Some(current)
}

/// Whether `document` satisfies every condition in `filter`.
pub(crate) fn matches(document: &Document, filter: &Filter) -> bool {
    filter.fields().iter().all(|entry| {
        let value = lookup(document, &entry.field);
        entry
            .conditions
            .iter()
            .all(|condition| satisfies(value, condition))
    })
}

fn satisfies(value: Option<&Value>, condition: &Condition) -> bool {
    let operand = &condition.operand;

    match condition.operator {
        ComparisonOperator::Eq => value.is_some_and(|value| equals(value, operand)),
        ComparisonOperator::Ne => !value.is_some_and(|value| equals(value, operand)),
        ComparisonOperator::Gt => ordering(value, operand).is_some_and(Ordering::is_gt),
        ComparisonOperator::Gte => ordering(value, operand).is_some_and(Ordering::is_ge),
        ComparisonOperator::Lt => ordering(value, operand).is_some_and(Ordering::is_lt),
        ComparisonOperator::Lte => ordering(value, operand).is_some_and(Ordering::is_le),
        ComparisonOperator::In => value.is_some_and(|value| is_member(value, operand)),
        ComparisonOperator::Nin => !value.is_some_and(|value| is_member(value, operand)),
    }
}

fn ordering(value: Option<&Value>, operand: &Operand) -> Option<Ordering> {
    compare_scalar(value?, operand)
}

/// Compare a document value with a scalar operand. `None` when the types differ.
fn compare_scalar(value: &Value, operand: &Operand) -> Option<Ordering> {
    match operand {
        Operand::Id(id) => {
            let stored = DocumentId::parse(value.as_str()?).ok()?;
            Some(stored.cmp(id))
        }
        Operand::DateTime(timestamp) => {
            let stored = parse_stored_timestamp(value.as_str()?)?;
            Some(stored.cmp(timestamp))
        }
        Operand::Number(number) => value.as_f64()?.partial_cmp(number),
        Operand::String(string) => Some(value.as_str()?.cmp(string.as_str())),
        Operand::Bool(boolean) => Some(value.as_bool()?.cmp(boolean)),
        Operand::Ids(_) | Operand::Numbers(_) | Operand::Strings(_) => None,
    }
}

fn equals(value: &Value, operand: &Operand) -> bool {
    match operand {
        Operand::Ids(ids) => array_equals(value, ids, |id| Operand::Id(*id)),
        Operand::Numbers(numbers) => array_equals(value, numbers, |n| Operand::Number(*n)),
        Operand::Strings(strings) => array_equals(value, strings, |s| Operand::String(s.clone())),
        scalar => compare_scalar(value, scalar) == Some(Ordering::Equal),
    }
}

fn array_equals<T>(value: &Value, expected: &[T], to_operand: impl Fn(&T) -> Operand) -> bool {
    let Some(items) = value.as_array() else {
        return false;
    };

    items.len() == expected.len()
        && items
            .iter()
            .zip(expected)
            .all(|(item, want)| compare_scalar(item, &to_operand(want)) == Some(Ordering::Equal))
}

fn is_member(value: &Value, operand: &Operand) -> bool {
    match operand {
        Operand::Ids(ids) => ids.iter().any(|id| equals(value, &Operand::Id(*id))),
        Operand::Numbers(numbers) => numbers.iter().any(|n| equals(value, &Operand::Number(*n))),
        Operand::Strings(strings) => strings
            .iter()
            .any(|s| equals(value, &Operand::String(s.clone()))),
        scalar => equals(value, scalar),
    }
}

/// Run `pipeline` over `documents`, returning the output rows.
pub(crate) fn run_pipeline(mut documents: Vec<Document>, pipeline: &[Stage]) -> Vec<Document> {
    for stage in pipeline {
        documents = match stage {
            Stage::Match(filter) => documents
                .into_iter()
                .filter(|document| matches(document, filter))
                .collect(),
            Stage::Group { key, accumulators } => group(&documents, key, accumulators),
            Stage::Project(projections) => documents
                .iter()
                .map(|document| project(document, projections))
                .collect(),
            Stage::Sort(fields) => {
                documents.sort_by(|left, right| compare_rows(left, right, fields));
                documents
            }
            Stage::Skip(count) => documents.into_iter().skip(*count).collect(),
            Stage::Limit(count) => documents.into_iter().take(*count).collect(),
        };
    }

    documents
}

enum AccumulatorState {
    Sum(f64),
    Count(u64),
    Avg { total: f64, count: u64 },
}

impl AccumulatorState {
    fn new(op: &AccumulatorOp) -> Self {
        match op {
            AccumulatorOp::Sum(_) => AccumulatorState::Sum(0.0),
            AccumulatorOp::Count => AccumulatorState::Count(0),
            AccumulatorOp::Avg(_) => AccumulatorState::Avg {
                total: 0.0,
                count: 0,
            },
        }
    }

    /// Fold one document into the state. Non-numeric values are ignored by sum and avg.
    fn add(&mut self, op: &AccumulatorOp, document: &Document) {
        match (self, op) {
            (AccumulatorState::Sum(total), AccumulatorOp::Sum(field)) => {
                if let Some(number) = lookup(document, field).and_then(Value::as_f64) {
                    *total += number;
                }
            }
            (AccumulatorState::Count(count), AccumulatorOp::Count) => *count += 1,
            (AccumulatorState::Avg { total, count }, AccumulatorOp::Avg(field)) => {
                if let Some(number) = lookup(document, field).and_then(Value::as_f64) {
                    *total += number;
                    *count += 1;
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            AccumulatorState::Sum(total) => float_value(total),
            AccumulatorState::Count(count) => Value::from(count),
            AccumulatorState::Avg { count: 0, .. } => Value::Null,
            AccumulatorState::Avg { total, count } => float_value(total / count as f64),
        }
    }
}

fn float_value(number: f64) -> Value {
    Number::from_f64(number).map_or(Value::Null, Value::Number)
}

struct Bucket {
    key: Map<String, Value>,
    states: Vec<AccumulatorState>,
}

fn group(documents: &[Document], key: &[GroupKey], accumulators: &[Accumulator]) -> Vec<Document> {
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    for document in documents {
        let key_values: Map<String, Value> = key
            .iter()
            .map(|component| (component.name.clone(), key_value(document, &component.source)))
            .collect();
        let fingerprint = Value::Object(key_values.clone()).to_string();

        let index = *index_by_key.entry(fingerprint).or_insert_with(|| {
            buckets.push(Bucket {
                key: key_values,
                states: accumulators
                    .iter()
                    .map(|accumulator| AccumulatorState::new(&accumulator.op))
                    .collect(),
            });
            buckets.len() - 1
        });

        for (state, accumulator) in buckets[index].states.iter_mut().zip(accumulators) {
            state.add(&accumulator.op, document);
        }
    }

    buckets
        .into_iter()
        .map(|bucket| {
            let mut row = Map::new();
            row.insert(GROUP_KEY_FIELD.to_owned(), Value::Object(bucket.key));
            for (state, accumulator) in bucket.states.into_iter().zip(accumulators) {
                row.insert(accumulator.name.clone(), state.finish());
            }
            row
        })
        .collect()
}

fn key_value(document: &Document, source: &KeySource) -> Value {
    match source {
        KeySource::Field(field) => lookup(document, field).cloned().unwrap_or(Value::Null),
        KeySource::DatePart(part) => lookup(document, "date")
            .and_then(Value::as_str)
            .and_then(parse_stored_timestamp)
            .map(|timestamp| {
                let timestamp = timestamp.to_offset(time::UtcOffset::UTC);
                match part {
                    DatePart::Year => Value::from(timestamp.year()),
                    DatePart::Month => Value::from(u8::from(timestamp.month())),
                    DatePart::Day => Value::from(timestamp.day()),
                }
            })
            .unwrap_or(Value::Null),
    }
}

fn project(document: &Document, projections: &[Projection]) -> Document {
    projections
        .iter()
        .map(|projection| {
            let value = lookup(document, &projection.source)
                .cloned()
                .unwrap_or(Value::Null);
            (projection.name.clone(), value)
        })
        .collect()
}

fn compare_rows(left: &Document, right: &Document, fields: &[(String, SortDirection)]) -> Ordering {
    for (field, direction) in fields {
        let ordering = compare_values(lookup(left, field), lookup(right, field));
        let ordering = match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };

        if ordering.is_ne() {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Missing and null sort first, then numbers, strings, objects, arrays and booleans.
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(Value::Number(left)), Some(Value::Number(right))) => left
            .as_f64()
            .partial_cmp(&right.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(left)), Some(Value::String(right))) => left.cmp(right),
        (Some(Value::Bool(left)), Some(Value::Bool(right))) => left.cmp(right),
        (Some(left @ Value::Object(_)), Some(right @ Value::Object(_)))
        | (Some(left @ Value::Array(_)), Some(right @ Value::Array(_))) => {
            left.to_string().cmp(&right.to_string())
        }
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

#[cfg(test)]
mod match_tests {
    use serde_json::json;
    use time::macros::datetime;

    use crate::{
        document_id::DocumentId,
        store::{
            Document,
            execute::matches,
            query::{ComparisonOperator, Condition, Filter, Operand},
        },
    };

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().unwrap().clone()
    }

    fn condition(operator: ComparisonOperator, operand: Operand) -> Condition {
        Condition { operator, operand }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(&doc(json!({"amount": 1})), &Filter::all()));
    }

    #[test]
    fn range_on_same_field_applies_both_bounds() {
        let filter = Filter::all()
            .and(
                "date",
                condition(
                    ComparisonOperator::Gte,
                    Operand::DateTime(datetime!(2024-03-01 00:00:00 UTC)),
                ),
            )
            .and(
                "date",
                condition(
                    ComparisonOperator::Lte,
                    Operand::DateTime(datetime!(2024-03-31 23:59:59 UTC)),
                ),
            );

        assert_eq!(filter.fields().len(), 1);
        assert!(matches(&doc(json!({"date": "2024-03-15T12:00:00Z"})), &filter));
        assert!(!matches(&doc(json!({"date": "2024-02-28T12:00:00Z"})), &filter));
        assert!(!matches(&doc(json!({"date": "2024-04-01T00:00:00Z"})), &filter));
    }

    #[test]
    fn compares_ids_by_value() {
        let id = DocumentId::parse("65f1a2b3c4d5e6f708192a3b").unwrap();
        let filter = Filter::by_id(id);

        assert!(matches(&doc(json!({"_id": "65F1A2B3C4D5E6F708192A3B"})), &filter));
        assert!(!matches(&doc(json!({"_id": "000000000000000000000000"})), &filter));
    }

    #[test]
    fn membership_and_negated_membership() {
        let in_filter = Filter::all().and(
            "type",
            condition(
                ComparisonOperator::In,
                Operand::Strings(vec!["income".to_owned(), "transfer".to_owned()]),
            ),
        );
        let nin_filter = Filter::all().and(
            "type",
            condition(
                ComparisonOperator::Nin,
                Operand::Strings(vec!["income".to_owned()]),
            ),
        );
        let income = doc(json!({"type": "income"}));
        let expense = doc(json!({"type": "expense"}));

        assert!(matches(&income, &in_filter));
        assert!(!matches(&expense, &in_filter));
        assert!(!matches(&income, &nin_filter));
        assert!(matches(&expense, &nin_filter));
    }

    #[test]
    fn missing_field_fails_comparisons_but_passes_negations() {
        let document = doc(json!({"description": "coffee"}));
        let gt = Filter::all().and(
            "amount",
            condition(ComparisonOperator::Gt, Operand::Number(0.0)),
        );
        let ne = Filter::all().and(
            "amount",
            condition(ComparisonOperator::Ne, Operand::Number(0.0)),
        );

        assert!(!matches(&document, &gt));
        assert!(matches(&document, &ne));
    }

    #[test]
    fn type_mismatch_never_orders() {
        let filter = Filter::all().and(
            "amount",
            condition(ComparisonOperator::Lt, Operand::Number(100.0)),
        );

        assert!(!matches(&doc(json!({"amount": "50"})), &filter));
    }

    #[test]
    fn dotted_paths_reach_nested_fields() {
        let filter = Filter::all().and(
            "meta.source",
            condition(ComparisonOperator::Eq, Operand::String("csv".to_owned())),
        );

        assert!(matches(&doc(json!({"meta": {"source": "csv"}})), &filter));
    }
}
