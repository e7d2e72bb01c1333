//! Turns operator names and loosely typed filter values into typed store operands.
//!
//! Everything here is pure: no I/O and no store access.

use time::{Time, macros::time};

use crate::{
    Error,
    date::ClientDate,
    document_id::DocumentId,
    report::request::FilterValue,
    store::query::{ComparisonOperator, Operand},
};

/// Fields that hold document IDs.
const ID_FIELDS: [&str; 3] = ["category_id", "account_id", "_id"];

/// The last representable instant of a day.
const END_OF_DAY: Time = time!(23:59:59.999_999_999);

/// Map an operator name from a request to the store's operator.
///
/// # Errors
/// Returns [Error::UnsupportedOperator] for any name other than `eq`, `ne`,
/// `gt`, `gte`, `lt`, `lte`, `in` and `nin`.
pub fn map_operator(operator: &str) -> Result<ComparisonOperator, Error> {
    match operator {
        "eq" => Ok(ComparisonOperator::Eq),
        "ne" => Ok(ComparisonOperator::Ne),
        "gt" => Ok(ComparisonOperator::Gt),
        "gte" => Ok(ComparisonOperator::Gte),
        "lt" => Ok(ComparisonOperator::Lt),
        "lte" => Ok(ComparisonOperator::Lte),
        "in" => Ok(ComparisonOperator::In),
        "nin" => Ok(ComparisonOperator::Nin),
        other => Err(Error::UnsupportedOperator(other.to_owned())),
    }
}

/// Convert `value` into the operand type that `field` is stored as.
///
/// * ID fields (`category_id`, `account_id`, `_id`) need valid ID strings, a
///   list of them for membership operators.
/// * `date` takes an RFC 3339 timestamp or a plain `YYYY-MM-DD` date. Plain
///   dates cover the whole day: `gte` starts at 00:00:00 and `lte` ends at
///   23:59:59.999999999, UTC. Membership operators are rejected.
/// * `amount` takes numbers or numeric strings.
/// * Membership operators on any other field need a list of strings; other
///   operators pass the value through unchanged.
///
/// # Errors
/// Returns [Error::InvalidFilterValue] when the value has the wrong shape for the field.
pub fn coerce_filter_value(
    field: &str,
    value: &FilterValue,
    operator: ComparisonOperator,
) -> Result<Operand, Error> {
    let invalid = |reason: String| Error::InvalidFilterValue {
        field: field.to_owned(),
        operator: operator.token(),
        reason,
    };

    if ID_FIELDS.contains(&field) {
        return coerce_id(value, operator).map_err(invalid);
    }

    match field {
        "date" => coerce_date(value, operator).map_err(invalid),
        "amount" => coerce_amount(value, operator).map_err(invalid),
        _ => coerce_other(value, operator).map_err(invalid),
    }
}

fn coerce_id(value: &FilterValue, operator: ComparisonOperator) -> Result<Operand, String> {
    let parse = |hex: &str| {
        DocumentId::parse(hex).map_err(|_| format!("\"{hex}\" is not a valid document ID"))
    };

    if operator.is_membership() {
        let FilterValue::StringList(items) = value else {
            return Err(format!("expected a list of ID strings, got {value:?}"));
        };

        return items
            .iter()
            .map(|item| parse(item.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map(Operand::Ids);
    }

    match value {
        FilterValue::String(hex) => parse(hex.as_str()).map(Operand::Id),
        other => Err(format!("expected an ID string, got {other:?}")),
    }
}

fn coerce_date(value: &FilterValue, operator: ComparisonOperator) -> Result<Operand, String> {
    if operator.is_membership() {
        return Err(format!("{} is not supported on dates", operator.token()));
    }

    let FilterValue::String(text) = value else {
        return Err(format!(
            "expected an RFC 3339 timestamp or YYYY-MM-DD date string, got {value:?}"
        ));
    };

    let date = ClientDate::parse(text).map_err(|error| {
        format!("\"{text}\" is not an RFC 3339 timestamp or YYYY-MM-DD date: {error}")
    })?;

    let time_of_day = match operator {
        ComparisonOperator::Lte => END_OF_DAY,
        _ => Time::MIDNIGHT,
    };

    Ok(Operand::DateTime(date.at(time_of_day)))
}

fn coerce_amount(value: &FilterValue, operator: ComparisonOperator) -> Result<Operand, String> {
    let parse = |text: &str| {
        text.trim()
            .parse::<f64>()
            .map_err(|_| format!("\"{text}\" is not a number"))
    };

    if operator.is_membership() {
        return match value {
            FilterValue::NumberList(numbers) => Ok(Operand::Numbers(numbers.clone())),
            FilterValue::StringList(items) => items
                .iter()
                .map(|item| parse(item.as_str()))
                .collect::<Result<Vec<_>, _>>()
                .map(Operand::Numbers),
            other => Err(format!("expected a list of numbers, got {other:?}")),
        };
    }

    match value {
        FilterValue::Number(number) => Ok(Operand::Number(*number)),
        FilterValue::String(text) => parse(text.as_str()).map(Operand::Number),
        other => Err(format!("expected a number, got {other:?}")),
    }
}

fn coerce_other(value: &FilterValue, operator: ComparisonOperator) -> Result<Operand, String> {
    if operator.is_membership() {
        return match value {
            FilterValue::StringList(items) => Ok(Operand::Strings(items.clone())),
            other => Err(format!("expected a list of strings, got {other:?}")),
        };
    }

    match value {
        FilterValue::String(text) => Ok(Operand::String(text.clone())),
        FilterValue::Number(number) => Ok(Operand::Number(*number)),
        FilterValue::Bool(boolean) => Ok(Operand::Bool(*boolean)),
        FilterValue::StringList(items) => Ok(Operand::Strings(items.clone())),
        FilterValue::NumberList(numbers) => Ok(Operand::Numbers(numbers.clone())),
        FilterValue::Unsupported(raw) => Err(format!("unsupported value {raw}")),
    }
}
