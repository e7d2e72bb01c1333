//! Compiles a report request into an ordered list of store pipeline stages.

use serde_json::Value;

use crate::{
    Error,
    report::{
        coercion::{coerce_filter_value, map_operator},
        request::{AggregationRequest, MetricSpec},
    },
    store::query::{
        Accumulator, AccumulatorOp, Condition, DatePart, Filter, GROUP_KEY_FIELD, GroupKey,
        KeySource, Projection, SortDirection, Stage,
    },
};

const DATE_KEY_PREFIX: &str = "date:";

/// Build the pipeline for `request`.
///
/// The stages are, in order: match (only with filters), group, project,
/// sort (only with `sort_by`), skip (only with `offset`) and limit (only with
/// `limit`). Nothing is executed; every error is detected here, before the
/// store is touched.
///
/// # Errors
/// Returns the first problem found in the request, see [Error] for the variants.
pub fn build_pipeline(request: &AggregationRequest) -> Result<Vec<Stage>, Error> {
    if request.group_by.is_empty() {
        return Err(Error::InvalidReportRequest(
            "group_by must name at least one field".to_owned(),
        ));
    }
    if request.metrics.is_empty() {
        return Err(Error::InvalidReportRequest(
            "metrics must contain at least one metric".to_owned(),
        ));
    }

    let mut pipeline = Vec::new();

    if !request.filters.is_empty() {
        pipeline.push(Stage::Match(build_filter(request)?));
    }

    let key = build_group_key(&request.group_by)?;
    let accumulators = build_accumulators(&request.metrics, &key)?;
    let projections = build_projections(&key, &accumulators);

    let sort = match &request.sort_by {
        Some(sort_by) if !sort_by.is_empty() => Some(build_sort(sort_by, &projections)?),
        _ => None,
    };

    pipeline.push(Stage::Group { key, accumulators });
    pipeline.push(Stage::Project(projections));

    if let Some(sort) = sort {
        pipeline.push(Stage::Sort(sort));
    }
    if let Some(offset) = request.offset {
        pipeline.push(Stage::Skip(offset));
    }
    if let Some(limit) = request.limit {
        pipeline.push(Stage::Limit(limit));
    }

    Ok(pipeline)
}

fn build_filter(request: &AggregationRequest) -> Result<Filter, Error> {
    let mut filter = Filter::all();

    for spec in &request.filters {
        let operator = map_operator(&spec.operator)?;
        let operand = coerce_filter_value(&spec.field, &spec.value, operator)?;

        filter.push(&spec.field, Condition { operator, operand });
    }

    Ok(filter)
}

fn build_group_key(group_by: &[String]) -> Result<Vec<GroupKey>, Error> {
    let mut key: Vec<GroupKey> = Vec::with_capacity(group_by.len());

    for entry in group_by {
        let component = match entry.strip_prefix(DATE_KEY_PREFIX) {
            Some(part) => {
                let part = parse_date_part(part)?;
                GroupKey {
                    name: part.key_name().to_owned(),
                    source: KeySource::DatePart(part),
                }
            }
            None => GroupKey {
                name: entry.replace('.', "_"),
                source: KeySource::Field(entry.clone()),
            },
        };

        match key.iter().find(|existing| existing.name == component.name) {
            // A repeated key, e.g. `date:year` twice, adds nothing.
            Some(existing) if existing.source == component.source => {}
            Some(_) => return Err(Error::DuplicateOutputField(component.name)),
            None => key.push(component),
        }
    }

    Ok(key)
}

fn parse_date_part(part: &str) -> Result<DatePart, Error> {
    match part {
        "year" => Ok(DatePart::Year),
        "month" => Ok(DatePart::Month),
        "day" => Ok(DatePart::Day),
        other => Err(Error::UnsupportedDatePart(other.to_owned())),
    }
}

fn build_accumulators(metrics: &[MetricSpec], key: &[GroupKey]) -> Result<Vec<Accumulator>, Error> {
    let mut accumulators: Vec<Accumulator> = Vec::with_capacity(metrics.len());

    for metric in metrics {
        let name_taken = metric.name == GROUP_KEY_FIELD
            || key.iter().any(|component| component.name == metric.name)
            || accumulators
                .iter()
                .any(|accumulator| accumulator.name == metric.name);
        if name_taken {
            return Err(Error::DuplicateOutputField(metric.name.clone()));
        }

        let required_field = || {
            metric
                .field
                .clone()
                .filter(|field| !field.is_empty())
                .ok_or_else(|| Error::MissingMetricField {
                    metric: metric.name.clone(),
                    operation: metric.operation.clone(),
                })
        };

        let op = match metric.operation.as_str() {
            "sum" => AccumulatorOp::Sum(required_field()?),
            "count" => AccumulatorOp::Count,
            "avg" => AccumulatorOp::Avg(required_field()?),
            other => {
                return Err(Error::UnsupportedMetricOperation {
                    metric: metric.name.clone(),
                    operation: other.to_owned(),
                });
            }
        };

        accumulators.push(Accumulator {
            name: metric.name.clone(),
            op,
        });
    }

    Ok(accumulators)
}

/// Lift every key component out of the group wrapper and keep every accumulator.
fn build_projections(key: &[GroupKey], accumulators: &[Accumulator]) -> Vec<Projection> {
    let keys = key.iter().map(|component| Projection {
        name: component.name.clone(),
        source: format!("{GROUP_KEY_FIELD}.{}", component.name),
    });
    let metrics = accumulators.iter().map(|accumulator| Projection {
        name: accumulator.name.clone(),
        source: accumulator.name.clone(),
    });

    keys.chain(metrics).collect()
}

fn build_sort(
    sort_by: &serde_json::Map<String, Value>,
    projections: &[Projection],
) -> Result<Vec<(String, SortDirection)>, Error> {
    sort_by
        .iter()
        .map(|(field, direction)| {
            let direction = match direction.as_f64() {
                Some(1.0) => SortDirection::Ascending,
                Some(-1.0) => SortDirection::Descending,
                _ => {
                    return Err(Error::InvalidSortDirection {
                        field: field.clone(),
                        direction: direction.to_string(),
                    });
                }
            };

            if !projections.iter().any(|projection| &projection.name == field) {
                return Err(Error::UnresolvableSortField(field.clone()));
            }

            Ok((field.clone(), direction))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        Error,
        report::{pipeline::build_pipeline, request::AggregationRequest},
        store::query::{
            AccumulatorOp, ComparisonOperator, DatePart, KeySource, Operand, Projection,
            SortDirection, Stage,
        },
    };

    fn request(value: serde_json::Value) -> AggregationRequest {
        serde_json::from_value(value).expect("invalid test request")
    }

    fn count_by(group_by: serde_json::Value) -> AggregationRequest {
        request(json!({
            "group_by": group_by,
            "metrics": [{"name": "n", "operation": "count"}]
        }))
    }

    #[test]
    fn minimal_request_has_group_and_project() {
        let pipeline = build_pipeline(&count_by(json!(["type"]))).unwrap();

        assert_eq!(pipeline.len(), 2);
        assert!(matches!(pipeline[0], Stage::Group { .. }));
        assert_eq!(
            pipeline[1],
            Stage::Project(vec![
                Projection {
                    name: "type".to_owned(),
                    source: "_id.type".to_owned()
                },
                Projection {
                    name: "n".to_owned(),
                    source: "n".to_owned()
                },
            ])
        );
    }

    #[test]
    fn date_parts_and_fields_form_the_key() {
        let pipeline = build_pipeline(&count_by(json!([
            "date:year",
            "date:month",
            "account_id",
            "date:year"
        ])))
        .unwrap();

        let Stage::Group { key, .. } = &pipeline[0] else {
            panic!("expected a group stage first, got {:?}", pipeline[0]);
        };
        let names: Vec<_> = key.iter().map(|component| component.name.as_str()).collect();
        assert_eq!(names, vec!["year", "month", "account_id"]);
        assert_eq!(key[0].source, KeySource::DatePart(DatePart::Year));
        assert_eq!(key[1].source, KeySource::DatePart(DatePart::Month));
        assert_eq!(key[2].source, KeySource::Field("account_id".to_owned()));
    }

    #[test]
    fn dotted_fields_are_sanitized() {
        let pipeline = build_pipeline(&count_by(json!(["meta.source"]))).unwrap();

        let Stage::Group { key, .. } = &pipeline[0] else {
            panic!("expected a group stage first");
        };
        assert_eq!(key[0].name, "meta_source");
        assert_eq!(key[0].source, KeySource::Field("meta.source".to_owned()));
    }

    #[test]
    fn different_keys_with_the_same_name_are_an_error() {
        assert_eq!(
            build_pipeline(&count_by(json!(["year", "date:year"]))),
            Err(Error::DuplicateOutputField("year".to_owned()))
        );
        assert_eq!(
            build_pipeline(&count_by(json!(["a.b", "a_b"]))),
            Err(Error::DuplicateOutputField("a_b".to_owned()))
        );
    }

    #[test]
    fn repeated_plain_field_is_kept_once() {
        let pipeline = build_pipeline(&count_by(json!(["type", "type"]))).unwrap();

        let Stage::Group { key, .. } = &pipeline[0] else {
            panic!("expected a group stage first");
        };
        assert_eq!(key.len(), 1);
    }

    #[test]
    fn unknown_date_part_is_an_error() {
        assert_eq!(
            build_pipeline(&count_by(json!(["date:week"]))),
            Err(Error::UnsupportedDatePart("week".to_owned()))
        );
    }

    #[test]
    fn metrics_become_accumulators() {
        let pipeline = build_pipeline(&request(json!({
            "group_by": ["type"],
            "metrics": [
                {"name": "total", "operation": "sum", "field": "amount"},
                {"name": "n", "operation": "count", "field": "ignored"},
                {"name": "mean", "operation": "avg", "field": "amount"}
            ]
        })))
        .unwrap();

        let Stage::Group { accumulators, .. } = &pipeline[0] else {
            panic!("expected a group stage first");
        };
        let ops: Vec<_> = accumulators.iter().map(|a| a.op.clone()).collect();
        assert_eq!(
            ops,
            vec![
                AccumulatorOp::Sum("amount".to_owned()),
                AccumulatorOp::Count,
                AccumulatorOp::Avg("amount".to_owned()),
            ]
        );
    }

    #[test]
    fn sum_without_field_is_an_error() {
        let got = build_pipeline(&request(json!({
            "group_by": ["type"],
            "metrics": [{"name": "total", "operation": "sum"}]
        })));

        assert_eq!(
            got,
            Err(Error::MissingMetricField {
                metric: "total".to_owned(),
                operation: "sum".to_owned()
            })
        );
    }

    #[test]
    fn avg_without_field_is_an_error() {
        let got = build_pipeline(&request(json!({
            "group_by": ["type"],
            "metrics": [{"name": "mean", "operation": "avg", "field": ""}]
        })));

        assert!(matches!(got, Err(Error::MissingMetricField { .. })));
    }

    #[test]
    fn unknown_metric_operation_is_an_error() {
        let got = build_pipeline(&request(json!({
            "group_by": ["type"],
            "metrics": [{"name": "biggest", "operation": "max", "field": "amount"}]
        })));

        assert_eq!(
            got,
            Err(Error::UnsupportedMetricOperation {
                metric: "biggest".to_owned(),
                operation: "max".to_owned()
            })
        );
    }

    #[test]
    fn metric_name_clashing_with_key_is_an_error() {
        let got = build_pipeline(&request(json!({
            "group_by": ["type"],
            "metrics": [{"name": "type", "operation": "count"}]
        })));

        assert_eq!(got, Err(Error::DuplicateOutputField("type".to_owned())));
    }

    #[test]
    fn empty_group_by_or_metrics_is_an_error() {
        let no_groups = build_pipeline(&count_by(json!([])));
        let no_metrics = build_pipeline(&request(json!({"group_by": ["type"], "metrics": []})));

        assert!(matches!(no_groups, Err(Error::InvalidReportRequest(_))));
        assert!(matches!(no_metrics, Err(Error::InvalidReportRequest(_))));
    }

    #[test]
    fn filters_on_one_field_are_merged() {
        let pipeline = build_pipeline(&request(json!({
            "filters": [
                {"field": "date", "operator": "gte", "value": "2024-03-01"},
                {"field": "type", "operator": "eq", "value": "expense"},
                {"field": "date", "operator": "lte", "value": "2024-03-31"}
            ],
            "group_by": ["type"],
            "metrics": [{"name": "n", "operation": "count"}]
        })))
        .unwrap();

        let Stage::Match(filter) = &pipeline[0] else {
            panic!("expected a match stage first, got {:?}", pipeline[0]);
        };
        let fields = filter.fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].field, "date");
        assert_eq!(fields[0].conditions.len(), 2);
        assert_eq!(fields[0].conditions[0].operator, ComparisonOperator::Gte);
        assert_eq!(fields[0].conditions[1].operator, ComparisonOperator::Lte);
        assert_eq!(
            fields[1].conditions[0].operand,
            Operand::String("expense".to_owned())
        );
    }

    #[test]
    fn bad_filter_aborts_compile() {
        let bad_operator = build_pipeline(&request(json!({
            "filters": [{"field": "amount", "operator": "like", "value": 1}],
            "group_by": ["type"],
            "metrics": [{"name": "n", "operation": "count"}]
        })));
        let bad_value = build_pipeline(&request(json!({
            "filters": [{"field": "amount", "operator": "gt", "value": true}],
            "group_by": ["type"],
            "metrics": [{"name": "n", "operation": "count"}]
        })));

        assert_eq!(
            bad_operator,
            Err(Error::UnsupportedOperator("like".to_owned()))
        );
        assert!(matches!(bad_value, Err(Error::InvalidFilterValue { .. })));
    }

    #[test]
    fn sort_follows_request_order() {
        let pipeline = build_pipeline(&request(json!({
            "group_by": ["date:year", "type"],
            "metrics": [{"name": "n", "operation": "count"}],
            "sort_by": {"n": -1, "year": 1}
        })))
        .unwrap();

        assert_eq!(
            pipeline[2],
            Stage::Sort(vec![
                ("n".to_owned(), SortDirection::Descending),
                ("year".to_owned(), SortDirection::Ascending),
            ])
        );
    }

    #[test]
    fn sort_by_unknown_field_is_an_error() {
        let got = build_pipeline(&request(json!({
            "group_by": ["type"],
            "metrics": [{"name": "n", "operation": "count"}],
            "sort_by": {"amount": 1}
        })));

        assert_eq!(got, Err(Error::UnresolvableSortField("amount".to_owned())));
    }

    #[test]
    fn sort_direction_must_be_one_or_minus_one() {
        for direction in [json!(0), json!(2), json!("asc")] {
            let got = build_pipeline(&request(json!({
                "group_by": ["type"],
                "metrics": [{"name": "n", "operation": "count"}],
                "sort_by": {"type": direction}
            })));

            assert_eq!(
                got,
                Err(Error::InvalidSortDirection {
                    field: "type".to_owned(),
                    direction: direction.to_string()
                })
            );
        }
    }

    #[test]
    fn offset_and_limit_follow_sort() {
        let pipeline = build_pipeline(&request(json!({
            "group_by": ["type"],
            "metrics": [{"name": "n", "operation": "count"}],
            "sort_by": {"n": -1},
            "limit": 5,
            "offset": 10
        })))
        .unwrap();

        assert_eq!(pipeline.len(), 5);
        assert_eq!(pipeline[3], Stage::Skip(10));
        assert_eq!(pipeline[4], Stage::Limit(5));
    }
}
