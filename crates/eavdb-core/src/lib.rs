//! # eavdb-core
//!
//! The incremental fact store and rule evaluator behind eavdb.
//!
//! Facts are `(entity, attribute, value)` triples held in named databases.
//! Rules arrive as compiled [`Block`]s; an [`Evaluation`] alternates
//! committing staged [`Changes`] and re-running the Blocks those changes
//! touched, until a pass changes nothing.
//!
//! ## Architectural Constraints
//!
//! The core:
//! - Is deterministic: every map is insertion-ordered, no floats, no randomness
//! - Is single-threaded: one fixpoint pass runs to completion before the next
//! - Is closed: rule source is compiled outside, behind [`BlockBuilder`]
//! - Has NO async, NO network dependencies (pure Rust)
//!
//! ## Example
//!
//! ```
//! use eavdb_core::{Database, EntityId, Evaluation, Value};
//!
//! let mut evaluation = Evaluation::new();
//! evaluation.register_database("d1", Database::default())?;
//!
//! let mut changes = evaluation.create_changes()?;
//! changes.add("d1", EntityId(1), "x", 2, "example");
//! evaluation.fixpoint(Some(changes))?;
//!
//! let db = evaluation.get_database("d1")?;
//! let values = db.lookup(Some(EntityId(1)), Some(&Value::text("x")), None);
//! assert_eq!(values.keys(), vec![Value::Number(2)]);
//! # Ok::<(), eavdb_core::EavError>(())
//! ```

// =============================================================================
// MODULES
// =============================================================================

pub mod action;
pub mod block;
pub mod builder;
pub mod changes;
pub mod database;
pub mod evaluation;
pub mod export;
pub mod ids;
pub mod index;
pub mod primitives;
pub mod session;
pub mod support;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{BlockId, EavError, EntityId, Triple, Value};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use action::{Action, ActionError, Bindings, Execution, Term, Verb, insert_fact};
pub use block::{BindContext, Block, BlockRun, Pattern};
pub use builder::{BlockBuilder, BuildOutput, CompileError, Span};
pub use changes::{Change, ChangeKind, Changes, Diff};
pub use database::{Database, Registry, Snapshot};
pub use evaluation::{Evaluation, EvaluationConfig, EvaluationState, FixpointReport, Rejection};
pub use ids::IdGenerator;
pub use index::{Index, Level};
pub use session::SessionReload;
pub use support::Fact;

// =============================================================================
// RE-EXPORTS: Canonical Export
// =============================================================================

pub use export::{CanonicalDatabase, CanonicalHeader, canonical_checksum, export_canonical, import_canonical};

#[cfg(feature = "crypto-hash")]
pub use export::canonical_crypto_hash;
