//! Resource-type registration.
//!
//! A routing layer exposes one family of operations per registered type under
//! its plural prefix (`Car` under `cars`). The engine itself treats the type as
//! a plain tag; the registry only decides which tags are served and how they
//! are addressed.

use crate::engine::EngineError;
use crate::limits::*;

/// Path segments that sit next to resource ids and would shadow a prefix.
const RESERVED_PREFIXES: &[&str] = &["any", "all"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKind {
    pub resource_type: String,
    pub prefix: String,
}

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    kinds: Vec<ResourceKind>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Car`, `Lorry` and `Truck`.
    pub fn with_defaults() -> Self {
        let kinds = [("Car", "cars"), ("Lorry", "lorries"), ("Truck", "trucks")]
            .into_iter()
            .map(|(resource_type, prefix)| ResourceKind {
                resource_type: resource_type.to_string(),
                prefix: prefix.to_string(),
            })
            .collect();
        Self { kinds }
    }

    /// Parse `Type:prefix,Type:prefix`. Blank entries are skipped.
    pub fn parse(list: &str) -> Result<Self, EngineError> {
        let mut registry = Self::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (resource_type, prefix) = entry.split_once(':').ok_or_else(|| {
                EngineError::Validation(format!("resource type entry `{entry}` is not Type:prefix"))
            })?;
            registry.register(resource_type.trim(), prefix.trim())?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, resource_type: &str, prefix: &str) -> Result<(), EngineError> {
        if resource_type.is_empty() {
            return Err(EngineError::Validation("resource type is required".into()));
        }
        if resource_type.len() > MAX_RESOURCE_TYPE_LEN {
            return Err(EngineError::LimitExceeded("resource type too long"));
        }
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN {
            return Err(EngineError::Validation(format!("bad prefix for {resource_type}")));
        }
        if !prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(EngineError::Validation(format!(
                "prefix `{prefix}` must be lowercase ascii, digits, `_` or `-`"
            )));
        }
        if RESERVED_PREFIXES.contains(&prefix) {
            return Err(EngineError::Validation(format!("prefix `{prefix}` is reserved")));
        }
        if self.resolve(prefix).is_some() {
            return Err(EngineError::Validation(format!("prefix `{prefix}` already registered")));
        }
        if self.prefix_of(resource_type).is_some() {
            return Err(EngineError::Validation(format!(
                "resource type `{resource_type}` already registered"
            )));
        }
        self.kinds.push(ResourceKind {
            resource_type: resource_type.to_string(),
            prefix: prefix.to_string(),
        });
        Ok(())
    }

    pub fn resolve(&self, prefix: &str) -> Option<&ResourceKind> {
        self.kinds.iter().find(|k| k.prefix == prefix)
    }

    pub fn prefix_of(&self, resource_type: &str) -> Option<&str> {
        self.kinds
            .iter()
            .find(|k| k.resource_type == resource_type)
            .map(|k| k.prefix.as_str())
    }

    pub fn contains_type(&self, resource_type: &str) -> bool {
        self.prefix_of(resource_type).is_some()
    }

    /// Registered kinds in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceKind> {
        self.kinds.iter()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
