//! Shared state model: copy-on-merge snapshots with declared per-field merge
//! policies.
//!
//! A run's state is an explicit struct, not a growing dictionary. Each field
//! declares how a node's patch combines with the prior value:
//! - *override*: the patch replaces the prior value ([`overwrite`] for
//!   required fields, [`Update`] for optional ones),
//! - *append*: the patch is concatenated after the prior sequence
//!   ([`append`]); used exactly for the progress-message log.
//!
//! State is logically replaced after each node executes, never mutated in
//! place, so a consistent snapshot is always available to observers even if a
//! later node fails.

/// State flowing through a graph run.
///
/// Implementations pair a state struct with a patch struct whose fields mirror
/// the state's, each applied under that field's declared merge policy.
pub trait GraphState: Clone + Send + Sync + 'static {
    /// The partial update a node handler returns.
    type Patch: Send + 'static;

    /// Apply `patch` to a copy of `self`, producing the next snapshot.
    fn merge(&self, patch: Self::Patch) -> Self;

    /// Append entries to the progress-message log (the one append-policy
    /// field; never cleared mid-run).
    fn push_messages(&mut self, messages: &[String]);

    /// The progress-message log, ordered by node execution order.
    fn messages(&self) -> &[String];
}

/// Patch value for an optional override-policy field.
///
/// `Keep` leaves the prior value untouched, so a patch can omit any field
/// without overriding it unintentionally. `Clear` models an explicit reset
/// (e.g. discarding stale review notes after a rewrite).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update<T> {
    Keep,
    Set(T),
    Clear,
}

// Hand-written so `Update<T>: Default` holds without `T: Default`.
impl<T> Default for Update<T> {
    fn default() -> Self {
        Update::Keep
    }
}

impl<T> Update<T> {
    pub fn apply(self, slot: &mut Option<T>) {
        match self {
            Update::Keep => {}
            Update::Set(value) => *slot = Some(value),
            Update::Clear => *slot = None,
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, Update::Keep)
    }
}

/// Override policy for a required field: `Some` replaces the prior value.
pub fn overwrite<T>(slot: &mut T, patch: Option<T>) {
    if let Some(value) = patch {
        *slot = value;
    }
}

/// Append policy: patch entries are concatenated after the prior sequence.
pub fn append<T>(log: &mut Vec<T>, mut patch: Vec<T>) {
    log.append(&mut patch);
}
