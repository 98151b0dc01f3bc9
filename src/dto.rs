//! Request and response shapes for a routing layer.
//!
//! Timestamps cross the boundary as `YYYY-MM-DDTHH:MM:SS` strings; absent ends
//! are `null` alongside an explicit infinity flag.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::*;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AllocationRequest {
    pub from_infinity: bool,
    pub from_datetime: Option<String>,
    pub to_infinity: bool,
    pub to_datetime: Option<String>,
    pub allocation_type: Option<String>,
    pub description: Option<String>,
    pub dump: Payload,
}

impl AllocationRequest {
    pub fn into_new_allocation(self) -> Result<NewAllocation, EngineError> {
        let allocation_type = self
            .allocation_type
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| EngineError::Validation("allocation_type is required".into()))?;

        let from = parse_field("from_datetime", self.from_datetime.as_deref())?;
        let to = parse_field("to_datetime", self.to_datetime.as_deref())?;
        let interval = Interval::from_parts(self.from_infinity, from, self.to_infinity, to)?;

        let mut new = NewAllocation::new(interval, allocation_type).with_payload(self.dump);
        new.description = self.description;
        Ok(new)
    }
}

fn parse_field(field: &str, value: Option<&str>) -> Result<Option<Timestamp>, EngineError> {
    value
        .map(|s| {
            parse_timestamp(s).map_err(|e| {
                EngineError::Validation(format!(
                    "{field} `{s}` is not {TIMESTAMP_FORMAT}: {e}"
                ))
            })
        })
        .transpose()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourceRequest {
    pub name: Option<String>,
}

impl ResourceRequest {
    pub fn into_name(self) -> Result<String, EngineError> {
        self.name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| EngineError::Validation("name is required".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceView {
    pub id: Ulid,
    pub name: String,
    pub resource_type: String,
    pub created: String,
}

impl From<&Resource> for ResourceView {
    fn from(r: &Resource) -> Self {
        Self {
            id: r.id,
            name: r.name.clone(),
            resource_type: r.resource_type.clone(),
            created: format_timestamp(&r.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationView {
    pub id: Ulid,
    pub resource_type: String,
    pub resource_id: Ulid,
    pub from_infinity: bool,
    pub to_infinity: bool,
    pub from_datetime: Option<String>,
    pub to_datetime: Option<String>,
    pub allocation_type: String,
    pub description: Option<String>,
    pub dump: Payload,
}

impl From<&Allocation> for AllocationView {
    fn from(a: &Allocation) -> Self {
        Self {
            id: a.id,
            resource_type: a.resource_type.clone(),
            resource_id: a.resource_id,
            from_infinity: a.interval.from_infinite(),
            to_infinity: a.interval.to_infinite(),
            from_datetime: a.interval.start().as_ref().map(format_timestamp),
            to_datetime: a.interval.end().as_ref().map(format_timestamp),
            allocation_type: a.allocation_type.clone(),
            description: a.description.clone(),
            dump: a.payload.clone(),
        }
    }
}
