//! Failures surfaced by the fallible entry points.

/// Errors from [`MulTable::try_insert`](crate::MulTable::try_insert) and
/// friends. A failed call leaves the table exactly as it was.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum TableError {
    /// The slot array for a grow or cleanup pass could not be allocated.
    #[error("cannot allocate a slot array of {slots} slots")]
    ResourceExhausted { slots: usize },

    /// The table is at its capacity ceiling and has no slot left for a new
    /// key.
    #[error("table is full: all {slots} slots are in use at the capacity ceiling")]
    Full { slots: usize },
}
