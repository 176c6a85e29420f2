//! # Actions
//!
//! An `Action` is a single mutation template. Each of its three positions is
//! a [`Term`]: a constant, or a variable filled from a row of bindings at
//! execution time. Staging an action adds one operation per target scope to
//! a [`Changes`] batch and leaves committing to the caller.
//!
//! Batches are executed by [`crate::Evaluation::execute_actions`]; malformed
//! actions are reported per item and the rest of the batch is still staged.

use crate::changes::{Change, Changes};
use crate::database::Registry;
use crate::primitives::{MAX_ATTRIBUTE_LENGTH, MAX_TEXT_LENGTH};
use crate::{EavError, EntityId, Triple, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of variable bindings. Ordered for deterministic iteration.
pub type Bindings = BTreeMap<String, Value>;

// =============================================================================
// TERM
// =============================================================================

/// A position in an action or watch pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Term {
    /// A fixed value.
    Const(Value),
    /// A named variable.
    Var(String),
    /// Matches anything and binds nothing. Only meaningful in patterns.
    Any,
}

impl Term {
    /// Create a variable term.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// Create a constant term.
    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Const(value.into())
    }

    /// Resolve against a row of bindings.
    pub fn resolve(&self, bindings: &Bindings) -> Result<Value, EavError> {
        match self {
            Self::Const(value) => Ok(value.clone()),
            Self::Var(name) => bindings
                .get(name)
                .cloned()
                .ok_or_else(|| EavError::InvalidAction(format!("unbound variable ?{}", name))),
            Self::Any => Err(EavError::InvalidAction(
                "wildcard cannot be written".to_string(),
            )),
        }
    }

    /// The value this term is fixed to under `bindings`, if any.
    #[must_use]
    pub fn bound_value(&self, bindings: &Bindings) -> Option<Value> {
        match self {
            Self::Const(value) => Some(value.clone()),
            Self::Var(name) => bindings.get(name).cloned(),
            Self::Any => None,
        }
    }
}

// =============================================================================
// ACTION
// =============================================================================

/// Whether an action adds or removes facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Insert,
    Remove,
}

/// A mutation template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub verb: Verb,
    pub entity: Term,
    pub attribute: Term,
    pub value: Term,
    /// Provenance recorded on every staged change.
    pub tag: String,
    /// Target databases.
    pub scopes: Vec<String>,
}

impl Action {
    /// Create an insert action.
    #[must_use]
    pub fn insert(entity: Term, attribute: Term, value: Term, tag: &str, scopes: &[&str]) -> Self {
        Self::new(Verb::Insert, entity, attribute, value, tag, scopes)
    }

    /// Create a remove action.
    #[must_use]
    pub fn remove(entity: Term, attribute: Term, value: Term, tag: &str, scopes: &[&str]) -> Self {
        Self::new(Verb::Remove, entity, attribute, value, tag, scopes)
    }

    fn new(
        verb: Verb,
        entity: Term,
        attribute: Term,
        value: Term,
        tag: &str,
        scopes: &[&str],
    ) -> Self {
        Self {
            verb,
            entity,
            attribute,
            value,
            tag: tag.to_string(),
            scopes: scopes.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Resolve the template to a concrete, validated triple.
    pub fn resolve(&self, bindings: &Bindings) -> Result<Triple, EavError> {
        if self.scopes.is_empty() {
            return Err(EavError::InvalidAction(format!(
                "action '{}' has no target scope",
                self.tag
            )));
        }
        let entity = match self.entity.resolve(bindings)? {
            Value::Id(id) => id,
            other => {
                return Err(EavError::InvalidAction(format!(
                    "entity position must be an id, got {}",
                    other
                )));
            }
        };
        let triple = Triple {
            entity,
            attribute: self.attribute.resolve(bindings)?,
            value: self.value.resolve(bindings)?,
        };
        validate(&triple)?;
        Ok(triple)
    }

    /// Stage this action's operations into `changes`, one per scope.
    ///
    /// Returns the number of operations staged.
    pub fn stage(&self, bindings: &Bindings, changes: &mut Changes) -> Result<usize, EavError> {
        let triple = self.resolve(bindings)?;
        for scope in &self.scopes {
            let change = match self.verb {
                Verb::Insert => Change::add(scope, triple.clone(), &self.tag, changes.round()),
                Verb::Remove => Change::remove(scope, triple.clone(), &self.tag, changes.round()),
            };
            changes.stage(change);
        }
        Ok(self.scopes.len())
    }
}

/// Check the shape of a triple before it is staged.
pub fn validate(triple: &Triple) -> Result<(), EavError> {
    match &triple.attribute {
        Value::Number(n) => {
            return Err(EavError::InvalidTriple(format!(
                "attribute must be text or an id, got {}",
                n
            )));
        }
        Value::Text(s) if s.is_empty() => {
            return Err(EavError::InvalidTriple("empty attribute".to_string()));
        }
        Value::Text(s) if s.len() > MAX_ATTRIBUTE_LENGTH => {
            return Err(EavError::InvalidTriple(format!(
                "attribute length {} exceeds maximum {}",
                s.len(),
                MAX_ATTRIBUTE_LENGTH
            )));
        }
        _ => {}
    }
    match &triple.value {
        Value::Text(s) if s.len() > MAX_TEXT_LENGTH => Err(EavError::InvalidTriple(format!(
            "value length {} exceeds maximum {}",
            s.len(),
            MAX_TEXT_LENGTH
        ))),
        _ => Ok(()),
    }
}

/// Fail with `DatabaseNotFound` for the first scope `registry` lacks.
pub(crate) fn check_scopes(action: &Action, registry: &Registry) -> Result<(), EavError> {
    match action.scopes.iter().find(|scope| !registry.contains(scope)) {
        Some(missing) => Err(EavError::DatabaseNotFound(missing.clone())),
        None => Ok(()),
    }
}

// =============================================================================
// BATCH EXECUTION
// =============================================================================

/// A rejected item of an action batch.
#[derive(Debug)]
pub struct ActionError {
    /// Position of the action in the batch.
    pub index: usize,
    pub error: EavError,
}

/// The outcome of executing a batch: staged changes plus rejected items.
#[derive(Debug, Default)]
pub struct Execution {
    pub changes: Changes,
    pub errors: Vec<ActionError>,
}

/// Shorthand for an insert of constants, as used for injected events.
#[must_use]
pub fn insert_fact(entity: EntityId, attribute: Value, value: Value, tag: &str, scopes: &[&str]) -> Action {
    Action::insert(
        Term::Const(Value::Id(entity)),
        Term::Const(attribute),
        Term::Const(value),
        tag,
        scopes,
    )
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeKind;

    fn row(pairs: &[(&str, Value)]) -> Bindings {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn resolve_fills_variables() {
        let action = Action::insert(
            Term::var("e"),
            Term::constant("derived"),
            Term::var("v"),
            "rule",
            &["b"],
        );
        let bindings = row(&[("e", Value::Id(EntityId(5))), ("v", Value::Number(10))]);

        let triple = action.resolve(&bindings).expect("resolve");
        assert_eq!(triple, Triple::new(EntityId(5), "derived", 10));
    }

    #[test]
    fn unbound_variable_is_rejected() {
        let action = Action::insert(
            Term::var("e"),
            Term::constant("a"),
            Term::constant(1),
            "rule",
            &["b"],
        );
        assert!(matches!(
            action.resolve(&Bindings::new()),
            Err(EavError::InvalidAction(_))
        ));
    }

    #[test]
    fn numeric_entity_is_rejected() {
        let action = Action::insert(
            Term::constant(5),
            Term::constant("a"),
            Term::constant(1),
            "rule",
            &["b"],
        );
        assert!(action.resolve(&Bindings::new()).is_err());
    }

    #[test]
    fn numeric_attribute_is_rejected() {
        let action = insert_fact(EntityId(1), Value::Number(3), Value::Number(1), "event", &["event"]);
        assert!(matches!(
            action.resolve(&Bindings::new()),
            Err(EavError::InvalidTriple(_))
        ));
    }

    #[test]
    fn one_change_per_scope() {
        let action = Action::remove(
            Term::constant(EntityId(1)),
            Term::constant("a"),
            Term::constant(1),
            "rule",
            &["a", "b"],
        );
        let mut changes = Changes::new(2);
        let staged = action.stage(&Bindings::new(), &mut changes).expect("stage");

        assert_eq!(staged, 2);
        let targets: Vec<&str> = changes.iter().map(|c| c.database.as_str()).collect();
        assert_eq!(targets, vec!["a", "b"]);
        assert!(changes.iter().all(|c| c.kind == ChangeKind::Remove && c.round == 2));
    }
}
