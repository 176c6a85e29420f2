//! # Engine Primitives
//!
//! Hardcoded runtime constants for the engine.
//!
//! These values are compiled into the binary. The ones that govern
//! evaluation (`DEFAULT_MAX_PASSES`, `DEFAULT_ID_SEED`) are defaults only;
//! an `EvaluationConfig` may override them.

/// Maximum number of fixpoint passes before the round is aborted.
///
/// A rule set that keeps producing changes past this bound is reported as
/// non-convergent. The committed state of the last finished pass is kept.
pub const DEFAULT_MAX_PASSES: usize = 1000;

/// Value the ID counter is reset to at the start of every build cycle.
pub const DEFAULT_ID_SEED: u64 = 0;

/// Name of the database that carries the compiled Blocks.
pub const SESSION_DATABASE: &str = "session";

/// Name of the database externally injected events are written to.
pub const EVENT_DATABASE: &str = "event";

/// Tag attached to actions built from externally injected events.
pub const EVENT_TAG: &str = "event";

/// Magic bytes for the canonical export header.
pub const MAGIC_BYTES: &[u8; 4] = b"EAVX";

/// Current canonical export format version.
///
/// Increment this when making breaking changes to the export format.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for text attributes.
pub const MAX_ATTRIBUTE_LENGTH: usize = 256;

/// Maximum length for text values (64KB).
pub const MAX_TEXT_LENGTH: usize = 65536;

/// Maximum number of actions accepted in a single external batch.
pub const MAX_BATCH_LENGTH: usize = 10000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"EAVX");
    }

    #[test]
    fn pass_bound_is_positive() {
        assert!(DEFAULT_MAX_PASSES > 0);
    }
}
