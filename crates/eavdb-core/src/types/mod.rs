//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the engine:
//! - Identifiers (`EntityId`, `BlockId`)
//! - Fact components (`Value`, `Triple`)
//! - Error types (`EavError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` and `Hash` so they can key ordered and indexed maps
//! - Serialize to a stable, self-describing wire form

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of an entity (the first position of every triple).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a compiled rule Block.
///
/// Drawn from the same counter as entity ids, so re-building identical
/// source after a counter reset yields identical Block ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block#{}", self.0)
    }
}

// =============================================================================
// VALUE
// =============================================================================

/// A single key in the attribute or value position of a triple.
///
/// On the wire a value is a JSON number, a JSON string, or `{"id": n}`
/// for an entity reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "ValueRepr", into = "ValueRepr")]
pub enum Value {
    /// Reference to an entity.
    Id(EntityId),
    /// Text value.
    Text(String),
    /// Signed integer value.
    Number(i64),
}

impl Value {
    /// Create a text value.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// The entity this value refers to, if it is an entity reference.
    #[must_use]
    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Self::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this value may stand in the attribute position.
    #[must_use]
    pub fn is_attribute(&self) -> bool {
        !matches!(self, Self::Number(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Text(s) => write!(f, "{:?}", s),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(i64::from(n))
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ValueRepr {
    Number(i64),
    Text(String),
    Id { id: u64 },
}

impl From<ValueRepr> for Value {
    fn from(repr: ValueRepr) -> Self {
        match repr {
            ValueRepr::Number(n) => Self::Number(n),
            ValueRepr::Text(s) => Self::Text(s),
            ValueRepr::Id { id } => Self::Id(EntityId(id)),
        }
    }
}

impl From<Value> for ValueRepr {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) => Self::Number(n),
            Value::Text(s) => Self::Text(s),
            Value::Id(id) => Self::Id { id: id.0 },
        }
    }
}

// =============================================================================
// TRIPLE
// =============================================================================

/// A single `(entity, attribute, value)` fact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub entity: EntityId,
    pub attribute: Value,
    pub value: Value,
}

impl Triple {
    /// Create a new triple.
    #[must_use]
    pub fn new(entity: EntityId, attribute: impl Into<Value>, value: impl Into<Value>) -> Self {
        Self {
            entity,
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.entity, self.attribute, self.value)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the engine.
///
/// - Lookup misses are never errors; they return empty results
/// - Registry and lifecycle errors are always surfaced
/// - The engine never panics; all errors are recoverable
#[derive(Debug, Error)]
pub enum EavError {
    /// A database with this name is already registered.
    #[error("Database already registered: {0}")]
    DuplicateDatabase(String),

    /// No database with this name is registered.
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    /// The evaluation was closed; it accepts no further mutation.
    #[error("Evaluation is closed")]
    EvaluationClosed,

    /// The fixpoint loop hit its pass bound before converging.
    #[error("Fixpoint did not converge after {passes} passes")]
    NonConvergence { passes: usize },

    /// The operation is not allowed in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A triple has an invalid shape (e.g. a numeric attribute).
    #[error("Invalid triple: {0}")]
    InvalidTriple(String),

    /// An action could not be resolved into a concrete mutation.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_wire_forms() {
        let values: Vec<Value> =
            serde_json::from_str(r#"[7, "name", {"id": 3}]"#).expect("parse");
        assert_eq!(
            values,
            vec![Value::Number(7), Value::text("name"), Value::Id(EntityId(3))]
        );

        let back = serde_json::to_string(&values).expect("serialize");
        assert_eq!(back, r#"[7,"name",{"id":3}]"#);
    }

    #[test]
    fn numbers_are_not_attributes() {
        assert!(Value::text("x").is_attribute());
        assert!(Value::Id(EntityId(1)).is_attribute());
        assert!(!Value::Number(1).is_attribute());
    }

    #[test]
    fn triple_display() {
        let triple = Triple::new(EntityId(1), "x", 2);
        assert_eq!(triple.to_string(), "(#1, \"x\", 2)");
    }
}
