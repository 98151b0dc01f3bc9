use chrono::{NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Wall-clock instant, second precision, no zone.
pub type Timestamp = NaiveDateTime;

/// The only timestamp format accepted or produced at the boundary.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Opaque key-value blob attached to an allocation. Insertion order is kept.
pub type Payload = serde_json::Map<String, serde_json::Value>;

pub fn parse_timestamp(s: &str) -> Result<Timestamp, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
}

pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Current UTC time truncated to whole seconds, so it survives a format/parse cycle.
pub fn now() -> Timestamp {
    Utc::now().naive_utc().trunc_subsecs(0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    /// Start is neither infinite nor given.
    MissingStart,
    /// End is neither infinite nor given.
    MissingEnd,
    Reversed { from: Timestamp, to: Timestamp },
}

impl std::fmt::Display for IntervalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntervalError::MissingStart => {
                write!(f, "interval start must be a timestamp or marked infinite")
            }
            IntervalError::MissingEnd => {
                write!(f, "interval end must be a timestamp or marked infinite")
            }
            IntervalError::Reversed { from, to } => write!(
                f,
                "interval start {} is after its end {}",
                format_timestamp(from),
                format_timestamp(to)
            ),
        }
    }
}

impl std::error::Error for IntervalError {}

/// A reservation window. Each end is either a timestamp or unbounded.
///
/// Endpoints are exclusive for overlap purposes: `[10:00, 12:00]` and
/// `[12:00, 13:00]` only touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interval {
    Bounded { from: Timestamp, to: Timestamp },
    /// Open start, finite end.
    LeftInfinite { to: Timestamp },
    /// Finite start, open end.
    RightInfinite { from: Timestamp },
    Unbounded,
}

impl Interval {
    pub fn bounded(from: Timestamp, to: Timestamp) -> Result<Self, IntervalError> {
        Self::from_parts(false, Some(from), false, Some(to))
    }

    pub fn left_infinite(to: Timestamp) -> Self {
        Interval::LeftInfinite { to }
    }

    pub fn right_infinite(from: Timestamp) -> Self {
        Interval::RightInfinite { from }
    }

    /// Build an interval from the flag form. An infinite flag wins over any
    /// timestamp given for the same end.
    pub fn from_parts(
        from_infinite: bool,
        from: Option<Timestamp>,
        to_infinite: bool,
        to: Option<Timestamp>,
    ) -> Result<Self, IntervalError> {
        let from = if from_infinite {
            None
        } else {
            Some(from.ok_or(IntervalError::MissingStart)?)
        };
        let to = if to_infinite {
            None
        } else {
            Some(to.ok_or(IntervalError::MissingEnd)?)
        };
        match (from, to) {
            (Some(from), Some(to)) if from > to => Err(IntervalError::Reversed { from, to }),
            (Some(from), Some(to)) => Ok(Interval::Bounded { from, to }),
            (None, Some(to)) => Ok(Interval::LeftInfinite { to }),
            (Some(from), None) => Ok(Interval::RightInfinite { from }),
            (None, None) => Ok(Interval::Unbounded),
        }
    }

    pub fn from_infinite(&self) -> bool {
        matches!(self, Interval::LeftInfinite { .. } | Interval::Unbounded)
    }

    pub fn to_infinite(&self) -> bool {
        matches!(self, Interval::RightInfinite { .. } | Interval::Unbounded)
    }

    /// Finite start, if any.
    pub fn start(&self) -> Option<Timestamp> {
        match self {
            Interval::Bounded { from, .. } | Interval::RightInfinite { from } => Some(*from),
            _ => None,
        }
    }

    /// Finite end, if any.
    pub fn end(&self) -> Option<Timestamp> {
        match self {
            Interval::Bounded { to, .. } | Interval::LeftInfinite { to } => Some(*to),
            _ => None,
        }
    }

    /// Ordering key for existing allocations: the end, falling back to the start.
    /// `None` (doubly infinite) sorts first.
    pub fn sort_key(&self) -> Option<Timestamp> {
        self.end().or_else(|| self.start())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: Ulid,
    pub resource_type: String,
    pub name: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub resource_type: String,
    pub interval: Interval,
    pub allocation_type: String,
    pub description: Option<String>,
    pub payload: Payload,
    pub created_at: Timestamp,
}

/// Caller-supplied part of an allocation; the engine fills in ids and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAllocation {
    pub interval: Interval,
    pub allocation_type: String,
    pub description: Option<String>,
    pub payload: Payload,
}

impl NewAllocation {
    pub fn new(interval: Interval, allocation_type: impl Into<String>) -> Self {
        Self {
            interval,
            allocation_type: allocation_type.into(),
            description: None,
            payload: Payload::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub(crate) fn bind(self, resource: &Resource) -> Allocation {
        Allocation {
            id: Ulid::new(),
            resource_id: resource.id,
            resource_type: resource.resource_type.clone(),
            interval: self.interval,
            allocation_type: self.allocation_type,
            description: self.description,
            payload: self.payload,
            created_at: now(),
        }
    }
}

/// WAL record format. Flat, no nesting.
///
/// The payload travels as JSON text: bincode cannot decode self-describing values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated {
        id: Ulid,
        resource_type: String,
        name: String,
        created_at: Timestamp,
    },
    AllocationInserted {
        id: Ulid,
        resource_id: Ulid,
        resource_type: String,
        interval: Interval,
        allocation_type: String,
        description: Option<String>,
        payload: String,
        created_at: Timestamp,
    },
    AllocationDeleted {
        id: Ulid,
        resource_id: Ulid,
    },
}

impl Event {
    pub fn resource_created(resource: &Resource) -> Self {
        Event::ResourceCreated {
            id: resource.id,
            resource_type: resource.resource_type.clone(),
            name: resource.name.clone(),
            created_at: resource.created_at,
        }
    }

    pub fn allocation_inserted(allocation: &Allocation) -> serde_json::Result<Self> {
        Ok(Event::AllocationInserted {
            id: allocation.id,
            resource_id: allocation.resource_id,
            resource_type: allocation.resource_type.clone(),
            interval: allocation.interval,
            allocation_type: allocation.allocation_type.clone(),
            description: allocation.description.clone(),
            payload: serde_json::to_string(&allocation.payload)?,
            created_at: allocation.created_at,
        })
    }
}
