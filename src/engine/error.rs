use ulid::Ulid;

use crate::model::IntervalError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    Conflict(Ulid),
    NoResourceAvailable(String),
    Validation(String),
    LimitExceeded(&'static str),
    Store(StoreError),
    StoreTimeout(&'static str),
    LockTimeout(Ulid),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Conflict(id) => write!(f, "conflict with allocation: {id}"),
            EngineError::NoResourceAvailable(resource_type) => {
                write!(f, "no {resource_type} resource available for the requested interval")
            }
            EngineError::Validation(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Store(e) => write!(f, "store error: {e}"),
            EngineError::StoreTimeout(op) => write!(f, "store timed out during {op}"),
            EngineError::LockTimeout(id) => {
                write!(f, "timed out waiting for resource {id}")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::MissingResource(id) => EngineError::NotFound(id),
            StoreError::DuplicateName(name) => {
                EngineError::Validation(format!("resource name `{name}` already taken"))
            }
            StoreError::LimitExceeded(msg) => EngineError::LimitExceeded(msg),
            other => EngineError::Store(other),
        }
    }
}

impl From<IntervalError> for EngineError {
    fn from(e: IntervalError) -> Self {
        EngineError::Validation(e.to_string())
    }
}
