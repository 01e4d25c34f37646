//! Workflow phase graphs.

use serde::Serialize;

/// A closed set of workflow states with a fixed successor graph.
///
/// Every domain implements this for its phase enum. The restart transition
/// back to [`Phase::INITIAL`] is legal from any phase; everything else must
/// be listed in [`Phase::successors`].
pub trait Phase: Copy + Eq + std::fmt::Debug + Serialize + Send + Sync + 'static {
    /// The phase a fresh or reset session starts in.
    const INITIAL: Self;

    /// Phases reachable in one step from `self`.
    fn successors(self) -> &'static [Self];

    /// Whether reaching this phase completes the session's task.
    fn is_terminal(self) -> bool;

    /// Canonical snake_case label.
    fn as_str(self) -> &'static str;

    /// Whether `next` is a legal transition from `self`.
    fn can_advance_to(self, next: Self) -> bool {
        next == Self::INITIAL || self.successors().contains(&next)
    }
}
