use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::models::timestamp;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    timestamp::parse(value).with_context(|| format!("failed to parse {field} '{value}'"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}
