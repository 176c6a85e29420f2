//! # Evaluation
//!
//! The fixpoint coordinator. An `Evaluation` owns a registry of databases
//! and a handle to the id counter, and alternates two steps until nothing
//! changes:
//!
//! 1. run every eligible Block against the state as of the pass start,
//!    staging its effects into one `Changes` batch;
//! 2. commit the batch, then settle each Block's run.
//!
//! Bind facts are reference counted across Blocks in a support table: a
//! fact is added when its first supporter binds it and retracted when its
//! last supporter lets go. If a pass fails to commit, no Block is settled
//! and the support table is left as it was.
//!
//! Changes committed through [`Evaluation::commit`] are held as pending and
//! seed the first pass of the next fixpoint. Direct writes through
//! [`Evaluation::get_database_mut`] and registry changes carry no diff, so
//! the next first pass runs every Block that is not dormant.
//!
//! A pass whose commit changes nothing is a fixed point. A rule set that
//! keeps changing state past `max_passes` is reported as non-convergent;
//! the state of the last committed pass is kept and the evaluation stays
//! usable.
//!
//! ## States
//!
//! ```text
//! Idle ──register──▶ Ready ──fixpoint──▶ Running ──▶ Converged
//!                      ▲                    │            │
//!                      └── non-convergence ─┘◀── commit ─┘
//! any ──close──▶ Closed (terminal)
//! ```

use crate::action::{ActionError, Bindings, check_scopes};
use crate::block::BlockRun;
use crate::support::SupportTable;
use crate::changes::{Changes, Diff};
use crate::database::{Database, Registry, Snapshot};
use crate::ids::IdGenerator;
use crate::primitives::{DEFAULT_ID_SEED, DEFAULT_MAX_PASSES, MAX_BATCH_LENGTH};
use crate::{Action, BlockId, EavError};
use serde::{Deserialize, Serialize};

// =============================================================================
// CONFIGURATION & STATE
// =============================================================================

/// Tunables for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Pass bound before a fixpoint is declared non-convergent.
    pub max_passes: usize,
    /// Value the id counter is reset to at each build cycle. Generated
    /// entity and Block ids count up from here; ids below it are never
    /// handed out, so callers can use them for their own entities.
    pub id_seed: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
            id_seed: DEFAULT_ID_SEED,
        }
    }
}

/// Lifecycle state of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationState {
    /// No databases registered.
    Idle,
    /// Databases registered; state changed since the last fixed point.
    Ready,
    /// A fixpoint is executing.
    Running,
    /// The last fixpoint reached a fixed point and nothing changed since.
    Converged,
    /// Terminal; databases have been released.
    Closed,
}

// =============================================================================
// REPORT
// =============================================================================

/// An action a Block could not apply during a fixpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub block: BlockId,
    /// Position among the Block's bind actions, then commit actions.
    pub action: usize,
    pub reason: String,
}

/// Summary of one fixpoint call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixpointReport {
    /// Passes run, including the final empty one.
    pub passes: usize,
    /// Blocks run, in execution order across all passes.
    pub fired: Vec<BlockId>,
    pub added: usize,
    pub removed: usize,
    pub rejected: Vec<Rejection>,
    /// Every effective change, the initial batch included, in commit order.
    pub diff: Diff,
}

impl FixpointReport {
    fn record(&mut self, diff: &Diff) {
        self.added += diff.added();
        self.removed += diff.removed();
        self.diff.extend(diff.clone());
    }

    fn record_run(&mut self, block: BlockId, run: BlockRun) {
        self.fired.push(block);
        for ActionError { index, error } in run.errors {
            tracing::warn!(%block, action = index, %error, "block action rejected");
            self.rejected.push(Rejection {
                block,
                action: index,
                reason: error.to_string(),
            });
        }
    }
}

// =============================================================================
// EVALUATION
// =============================================================================

/// A Block run waiting for its pass to commit.
#[derive(Debug)]
struct ScheduledRun {
    /// Registry position of the Block's database.
    position: usize,
    /// Position in that database's Block list.
    index: usize,
    block: BlockId,
    run: BlockRun,
}

/// The coordinator owning a set of databases.
#[derive(Debug)]
pub struct Evaluation {
    registry: Registry,
    ids: IdGenerator,
    config: EvaluationConfig,
    state: EvaluationState,
    round: u64,
    support: SupportTable,
    /// Committed outside a fixpoint, not yet seen by any Block.
    pending: Diff,
    /// State changed without a diff; the next first pass runs every Block.
    rerun_all: bool,
}

impl Default for Evaluation {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluation {
    /// Create an idle evaluation with default configuration and its own
    /// id counter.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EvaluationConfig::default(), IdGenerator::default())
    }

    /// Create an idle evaluation sharing `ids` with the caller's builder.
    #[must_use]
    pub fn with_config(config: EvaluationConfig, ids: IdGenerator) -> Self {
        Self {
            registry: Registry::new(),
            ids,
            config,
            state: EvaluationState::Idle,
            round: 0,
            support: SupportTable::default(),
            pending: Diff::default(),
            rerun_all: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> EvaluationState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// The shared id counter.
    #[must_use]
    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    /// Rounds completed so far; every fixpoint pass is one round.
    #[must_use]
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Read access to every registered database.
    #[must_use]
    pub fn databases(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn ensure_open(&self) -> Result<(), EavError> {
        match self.state {
            EvaluationState::Closed => Err(EavError::EvaluationClosed),
            EvaluationState::Running => Err(EavError::InvalidState(
                "a fixpoint is already running".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub(crate) fn support_mut(&mut self) -> &mut SupportTable {
        &mut self.support
    }

    fn mark_changed(&mut self) {
        self.state = if self.registry.is_empty() {
            EvaluationState::Idle
        } else {
            EvaluationState::Ready
        };
    }

    // =========================================================================
    // REGISTRY
    // =========================================================================

    /// Register `db` under `name`.
    ///
    /// Fails with `DuplicateDatabase` if the name is taken; the registered
    /// database is left untouched. Replacing goes through
    /// [`Evaluation::unregister_database`] first.
    pub fn register_database(&mut self, name: &str, db: Database) -> Result<(), EavError> {
        self.ensure_open()?;
        self.registry.register(name, db)?;
        tracing::debug!(database = name, "registered database");
        self.rerun_all = true;
        self.mark_changed();
        Ok(())
    }

    /// Remove the database registered under `name` and hand it back.
    pub fn unregister_database(&mut self, name: &str) -> Result<Database, EavError> {
        self.ensure_open()?;
        let db = self.registry.unregister(name)?;
        tracing::debug!(database = name, "unregistered database");
        self.rerun_all = true;
        self.mark_changed();
        Ok(db)
    }

    /// Read access to a registered database.
    pub fn get_database(&self, name: &str) -> Result<&Database, EavError> {
        if self.state == EvaluationState::Closed {
            return Err(EavError::EvaluationClosed);
        }
        self.registry.get(name)
    }

    /// Write access to a registered database.
    ///
    /// Writes made through the returned reference produce no diff, so the
    /// next fixpoint re-runs every Block that is not dormant.
    pub fn get_database_mut(&mut self, name: &str) -> Result<&mut Database, EavError> {
        self.ensure_open()?;
        let db = self.registry.get_mut(name)?;
        self.rerun_all = true;
        self.state = EvaluationState::Ready;
        Ok(db)
    }

    // =========================================================================
    // CHANGES
    // =========================================================================

    /// A fresh, empty batch tagged with the current round.
    pub fn create_changes(&self) -> Result<Changes, EavError> {
        self.ensure_open()?;
        Ok(Changes::new(self.round))
    }

    /// Stage `actions` into a fresh batch without committing it.
    ///
    /// Each action is resolved on its own; malformed actions and actions
    /// naming unknown databases are reported in `Execution::errors` and the
    /// rest of the batch is still staged.
    pub fn execute_actions(&self, actions: &[Action]) -> Result<crate::Execution, EavError> {
        self.ensure_open()?;
        if actions.len() > MAX_BATCH_LENGTH {
            return Err(EavError::InvalidAction(format!(
                "batch of {} actions exceeds maximum {}",
                actions.len(),
                MAX_BATCH_LENGTH
            )));
        }
        let bindings = Bindings::new();
        let mut execution = crate::Execution {
            changes: Changes::new(self.round),
            errors: Vec::new(),
        };
        for (index, action) in actions.iter().enumerate() {
            let staged = check_scopes(action, &self.registry)
                .and_then(|()| action.stage(&bindings, &mut execution.changes));
            if let Err(error) = staged {
                tracing::warn!(action = index, %error, "action rejected");
                execution.errors.push(ActionError { index, error });
            }
        }
        Ok(execution)
    }

    /// Commit a batch outside of a fixpoint.
    ///
    /// The effective changes are kept as pending, so Blocks watching them
    /// run in the first pass of the next fixpoint.
    pub fn commit(&mut self, changes: &mut Changes) -> Result<Diff, EavError> {
        self.ensure_open()?;
        let diff = changes.commit(&mut self.registry)?;
        if !diff.is_empty() {
            self.pending.extend(diff.clone());
            self.mark_changed();
        }
        Ok(diff)
    }

    // =========================================================================
    // FIXPOINT
    // =========================================================================

    /// Commit `initial` (if any), then run passes until one commits nothing.
    pub fn fixpoint(&mut self, initial: Option<Changes>) -> Result<FixpointReport, EavError> {
        self.ensure_open()?;
        let _pass = self.ids.begin_pass();
        self.state = EvaluationState::Running;

        let result = self.run_passes(initial);
        self.state = match result {
            Ok(_) => EvaluationState::Converged,
            Err(_) => EvaluationState::Ready,
        };
        result
    }

    fn run_passes(&mut self, initial: Option<Changes>) -> Result<FixpointReport, EavError> {
        let mut report = FixpointReport::default();
        let initial = match initial {
            Some(mut changes) => changes.commit(&mut self.registry)?,
            None => Diff::default(),
        };
        report.record(&initial);
        let mut touched = std::mem::take(&mut self.pending);
        touched.extend(initial);

        loop {
            if report.passes >= self.config.max_passes {
                tracing::warn!(passes = report.passes, "fixpoint did not converge");
                self.pending = touched;
                return Err(EavError::NonConvergence {
                    passes: report.passes,
                });
            }

            self.round += 1;
            let mut changes = Changes::new(self.round);
            let runs = self.run_blocks(&touched, &mut changes);
            let update = self.support.plan(
                runs.iter().map(|scheduled| &scheduled.run),
                &self.registry,
                &mut changes,
            );
            let staged = changes.len();
            let diff = match changes.commit(&mut self.registry) {
                Ok(diff) => diff,
                Err(error) => {
                    tracing::warn!(round = self.round, %error, "fixpoint pass rejected");
                    self.pending = touched;
                    return Err(error);
                }
            };
            self.support.apply(update);
            self.rerun_all = false;
            for scheduled in runs {
                self.settle(scheduled, &mut report);
            }
            report.passes += 1;
            tracing::debug!(
                round = self.round,
                staged,
                effective = diff.len(),
                "fixpoint pass committed"
            );

            if diff.is_empty() {
                tracing::info!(
                    passes = report.passes,
                    added = report.added,
                    removed = report.removed,
                    "fixpoint converged"
                );
                return Ok(report);
            }
            report.record(&diff);
            touched = diff;
        }
    }

    /// Run every eligible Block: databases in registration order, Blocks in
    /// list order. Nothing is settled yet.
    fn run_blocks(&self, touched: &Diff, changes: &mut Changes) -> Vec<ScheduledRun> {
        let mut runs = Vec::new();
        for (position, db) in self.registry.iter().enumerate() {
            for (index, block) in db.blocks().iter().enumerate() {
                let eligible = if self.rerun_all {
                    !block.is_dormant()
                } else {
                    block.is_eligible(touched)
                };
                if eligible {
                    runs.push(ScheduledRun {
                        position,
                        index,
                        block: block.id(),
                        run: block.run(&self.registry, changes),
                    });
                }
            }
        }
        runs
    }

    fn settle(&mut self, scheduled: ScheduledRun, report: &mut FixpointReport) {
        let ScheduledRun {
            position,
            index,
            block,
            mut run,
        } = scheduled;
        if let Some(target) = self
            .registry
            .get_index_mut(position)
            .and_then(|db| db.blocks_mut().get_mut(index))
        {
            target.settle(&mut run);
        }
        report.record_run(block, run);
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Reset the shared id counter to `seed`.
    ///
    /// Rejected with `InvalidState` while a fixpoint is running.
    pub fn reset_ids(&self, seed: u64) -> Result<(), EavError> {
        if self.state == EvaluationState::Running {
            return Err(EavError::InvalidState(
                "cannot reset the id counter during a fixpoint".to_string(),
            ));
        }
        self.ids.reset(seed)
    }

    /// Close the evaluation and release every database as a read-only
    /// snapshot, in registration order.
    pub fn close(&mut self) -> Result<Vec<Snapshot>, EavError> {
        self.ensure_open()?;
        self.state = EvaluationState::Closed;
        self.support = SupportTable::default();
        self.pending = Diff::default();
        let snapshots: Vec<Snapshot> = self.registry.drain().into_iter().map(Snapshot::freeze).collect();
        tracing::info!(databases = snapshots.len(), "evaluation closed");
        Ok(snapshots)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Term, insert_fact};
    use crate::block::{Block, Pattern};
    use crate::{EntityId, Value};

    fn flip(id: u64, from: i64, to: i64) -> Block {
        Block::new(BlockId(id), format!("flip-{}", from))
            .with_watch(Pattern::new("a", Term::var("e"), Term::constant("state"), Term::constant(from)))
            .with_commit(Action::remove(
                Term::var("e"),
                Term::constant("state"),
                Term::constant(from),
                "flip",
                &["a"],
            ))
            .with_commit(Action::insert(
                Term::var("e"),
                Term::constant("state"),
                Term::constant(to),
                "flip",
                &["a"],
            ))
    }

    fn copy(id: u64, from: &str) -> Block {
        Block::new(BlockId(id), format!("copy-{}", from))
            .with_watch(Pattern::new("a", Term::var("e"), Term::constant(from), Term::var("v")))
            .with_bind(Action::insert(
                Term::var("e"),
                Term::constant("derived"),
                Term::var("v"),
                "copy",
                &["b"],
            ))
    }

    fn with_blocks(blocks: Vec<Block>, facts: &[(&str, i64)]) -> Evaluation {
        let mut evaluation = Evaluation::new();
        let mut a = Database::with_blocks("a", blocks);
        for (attribute, value) in facts {
            a.insert(EntityId(5), Value::text(*attribute), Value::Number(*value));
        }
        evaluation.register_database("a", a).expect("register a");
        evaluation
            .register_database("b", Database::default())
            .expect("register b");
        evaluation.fixpoint(None).expect("fixpoint");
        evaluation
    }

    fn derived(evaluation: &Evaluation, value: i64) -> bool {
        evaluation.get_database("b").expect("b").index().contains(
            EntityId(5),
            &Value::text("derived"),
            &Value::Number(value),
        )
    }

    #[test]
    fn new_evaluation_is_idle() {
        let evaluation = Evaluation::new();
        assert_eq!(evaluation.state(), EvaluationState::Idle);
    }

    #[test]
    fn register_moves_to_ready() {
        let mut evaluation = Evaluation::new();
        evaluation
            .register_database("d1", Database::default())
            .expect("register");
        assert_eq!(evaluation.state(), EvaluationState::Ready);

        evaluation.unregister_database("d1").expect("unregister");
        assert_eq!(evaluation.state(), EvaluationState::Idle);
    }

    #[test]
    fn empty_fixpoint_converges_in_one_pass() {
        let mut evaluation = Evaluation::new();
        evaluation
            .register_database("d1", Database::default())
            .expect("register");

        let report = evaluation.fixpoint(None).expect("fixpoint");
        assert_eq!(report.passes, 1);
        assert!(report.diff.is_empty());
        assert_eq!(evaluation.state(), EvaluationState::Converged);
    }

    #[test]
    fn execute_actions_does_not_commit() {
        let mut evaluation = Evaluation::new();
        evaluation
            .register_database("event", Database::default())
            .expect("register");

        let actions = vec![insert_fact(
            EntityId(1),
            Value::text("clicked"),
            Value::Number(1),
            "event",
            &["event"],
        )];
        let execution = evaluation.execute_actions(&actions).expect("execute");
        assert_eq!(execution.changes.len(), 1);
        assert!(evaluation.get_database("event").expect("get").is_empty());
    }

    #[test]
    fn unknown_scope_is_reported_per_action() {
        let mut evaluation = Evaluation::new();
        evaluation
            .register_database("event", Database::default())
            .expect("register");

        let actions = vec![
            insert_fact(EntityId(1), Value::text("a"), Value::Number(1), "event", &["ghost"]),
            insert_fact(EntityId(2), Value::text("b"), Value::Number(2), "event", &["event"]),
        ];
        let execution = evaluation.execute_actions(&actions).expect("execute");
        assert_eq!(execution.errors.len(), 1);
        assert_eq!(execution.errors[0].index, 0);
        assert_eq!(execution.changes.len(), 1);
    }

    #[test]
    fn bad_items_do_not_stop_the_batch() {
        let mut evaluation = Evaluation::new();
        evaluation
            .register_database("event", Database::default())
            .expect("register");

        let actions = vec![
            insert_fact(EntityId(1), Value::text("a"), Value::Number(1), "event", &["event"]),
            insert_fact(EntityId(2), Value::Number(9), Value::Number(1), "event", &["event"]),
            insert_fact(EntityId(3), Value::text("c"), Value::Number(1), "event", &["event"]),
        ];
        let execution = evaluation.execute_actions(&actions).expect("execute");
        assert_eq!(execution.changes.len(), 2);
        assert_eq!(execution.errors.len(), 1);
        assert_eq!(execution.errors[0].index, 1);
    }

    #[test]
    fn shared_bind_is_kept_until_the_last_supporter_lets_go() {
        let mut evaluation = with_blocks(vec![copy(1, "count"), copy(2, "total")], &[("count", 10), ("total", 10)]);
        assert!(derived(&evaluation, 10));

        let mut changes = evaluation.create_changes().expect("changes");
        changes.remove("a", EntityId(5), "count", 10, "test");
        evaluation.fixpoint(Some(changes)).expect("fixpoint");
        assert!(derived(&evaluation, 10));

        let mut changes = evaluation.create_changes().expect("changes");
        changes.remove("a", EntityId(5), "total", 10, "test");
        evaluation.fixpoint(Some(changes)).expect("fixpoint");
        assert!(!derived(&evaluation, 10));
    }

    #[test]
    fn facts_stored_before_binding_are_not_retracted() {
        let mut evaluation = with_blocks(vec![copy(1, "count")], &[]);
        let mut changes = evaluation.create_changes().expect("changes");
        changes.add("b", EntityId(5), "derived", 10, "external");
        changes.add("a", EntityId(5), "count", 10, "test");
        evaluation.fixpoint(Some(changes)).expect("fixpoint");

        let mut changes = evaluation.create_changes().expect("changes");
        changes.remove("a", EntityId(5), "count", 10, "test");
        evaluation.fixpoint(Some(changes)).expect("fixpoint");
        assert!(derived(&evaluation, 10));
    }

    #[test]
    fn committed_changes_seed_the_next_fixpoint() {
        let mut evaluation = with_blocks(vec![copy(1, "count")], &[]);

        let mut changes = evaluation.create_changes().expect("changes");
        changes.add("a", EntityId(5), "count", 10, "test");
        evaluation.commit(&mut changes).expect("commit");
        assert!(!derived(&evaluation, 10));
        assert_eq!(evaluation.state(), EvaluationState::Ready);

        let report = evaluation.fixpoint(None).expect("fixpoint");
        assert!(derived(&evaluation, 10));
        assert_eq!(report.fired, vec![BlockId(1)]);

        // Consumed: a second fixpoint has nothing to react to.
        let report = evaluation.fixpoint(None).expect("fixpoint");
        assert!(report.fired.is_empty());
    }

    #[test]
    fn direct_writes_rerun_every_block() {
        let mut evaluation = with_blocks(vec![copy(1, "count")], &[]);

        evaluation
            .get_database_mut("a")
            .expect("a")
            .insert(EntityId(5), Value::text("count"), Value::Number(10));
        assert_eq!(evaluation.state(), EvaluationState::Ready);
        evaluation.fixpoint(None).expect("fixpoint");

        assert!(derived(&evaluation, 10));
    }

    #[test]
    fn removed_bind_target_is_reported_and_the_pass_still_commits() {
        let log = Block::new(BlockId(2), "log")
            .with_watch(Pattern::new("a", Term::var("e"), Term::constant("count"), Term::var("v")))
            .with_commit(Action::insert(
                Term::var("e"),
                Term::constant("logged"),
                Term::var("v"),
                "log",
                &["a"],
            ));
        let mut evaluation = with_blocks(vec![copy(1, "count"), log], &[("count", 10)]);
        assert!(derived(&evaluation, 10));

        evaluation.unregister_database("b").expect("unregister");
        let mut changes = evaluation.create_changes().expect("changes");
        changes.add("a", EntityId(6), "count", 7, "test");
        let report = evaluation.fixpoint(Some(changes)).expect("fixpoint");

        assert!(!report.rejected.is_empty());
        assert!(report.rejected.iter().all(|r| r.block == BlockId(1)));
        let a = evaluation.get_database("a").expect("a");
        assert!(a.index().contains(EntityId(6), &Value::text("logged"), &Value::Number(7)));
        assert_eq!(a.blocks()[0].bound_facts().count(), 0);

        // Bringing the target back rebinds everything.
        evaluation
            .register_database("b", Database::default())
            .expect("register b");
        evaluation.fixpoint(None).expect("fixpoint");
        assert!(derived(&evaluation, 10));
        assert!(evaluation.get_database("b").expect("b").index().contains(
            EntityId(6),
            &Value::text("derived"),
            &Value::Number(7)
        ));
    }

    #[test]
    fn oscillating_rules_hit_the_pass_bound() {
        let config = EvaluationConfig {
            max_passes: 5,
            ..EvaluationConfig::default()
        };
        let mut evaluation = Evaluation::with_config(config, IdGenerator::default());
        let mut db = Database::with_blocks("a", vec![flip(1, 1, 2), flip(2, 2, 1)]);
        db.insert(EntityId(1), Value::text("state"), Value::Number(1));
        evaluation.register_database("a", db).expect("register");

        let result = evaluation.fixpoint(None);
        assert!(matches!(result, Err(EavError::NonConvergence { passes: 5 })));
        assert_eq!(evaluation.state(), EvaluationState::Ready);

        // The last committed pass stays visible.
        let db = evaluation.get_database("a").expect("get");
        assert_eq!(db.len(), 1);

        // Still usable afterwards.
        assert!(evaluation.create_changes().is_ok());
    }

    #[test]
    fn reset_is_rejected_mid_pass() {
        let evaluation = Evaluation::new();
        let _pass = evaluation.ids().begin_pass();
        assert!(matches!(evaluation.reset_ids(0), Err(EavError::InvalidState(_))));
    }

    #[test]
    fn closed_evaluation_rejects_mutation() {
        let mut evaluation = Evaluation::new();
        evaluation
            .register_database("d1", Database::default())
            .expect("register");

        let snapshots = evaluation.close().expect("close");
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].name(), "d1");

        assert!(matches!(
            evaluation.register_database("d2", Database::default()),
            Err(EavError::EvaluationClosed)
        ));
        assert!(matches!(evaluation.fixpoint(None), Err(EavError::EvaluationClosed)));
        assert!(matches!(evaluation.create_changes(), Err(EavError::EvaluationClosed)));
        assert!(matches!(evaluation.close(), Err(EavError::EvaluationClosed)));
    }

    #[test]
    fn reset_ids_between_passes() {
        let evaluation = Evaluation::new();
        evaluation.ids().next_id();
        evaluation.reset_ids(0).expect("reset");
        assert_eq!(evaluation.ids().peek(), 0);
    }
}
