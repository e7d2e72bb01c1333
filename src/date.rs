//! Parsing of the date formats accepted from clients and stored in documents.

use serde::{Deserialize, Deserializer};
use time::{
    Date, OffsetDateTime, Time, format_description::well_known::Rfc3339, macros::format_description,
};

/// A date or timestamp as written by a client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientDate {
    /// A full RFC 3339 timestamp, e.g. `2024-03-05T10:30:00Z`.
    Timestamp(OffsetDateTime),
    /// A plain calendar date, e.g. `2024-03-05`.
    Day(Date),
}

impl ClientDate {
    /// Parse an RFC 3339 timestamp, falling back to a plain `YYYY-MM-DD` date.
    pub fn parse(text: &str) -> Result<Self, time::error::Parse> {
        match OffsetDateTime::parse(text, &Rfc3339) {
            Ok(timestamp) => Ok(ClientDate::Timestamp(timestamp)),
            Err(_) => Date::parse(text, format_description!("[year]-[month]-[day]"))
                .map(ClientDate::Day),
        }
    }

    /// The timestamp, with plain dates placed at `time_of_day` UTC.
    pub fn at(self, time_of_day: Time) -> OffsetDateTime {
        match self {
            ClientDate::Timestamp(timestamp) => timestamp,
            ClientDate::Day(date) => date.with_time(time_of_day).assume_utc(),
        }
    }
}

/// Parse a timestamp stored in a document.
pub fn parse_stored_timestamp(text: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(text, &Rfc3339).ok()
}

/// Deserialize a client date, placing plain dates at midnight UTC.
pub fn deserialize_client_date<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;

    ClientDate::parse(&text)
        .map(|date| date.at(Time::MIDNIGHT))
        .map_err(serde::de::Error::custom)
}
