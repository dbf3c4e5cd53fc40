//! Errors that may escape the store
//!
//! Only misuse by the integrating application surfaces here. Network and
//! parse failures are absorbed by the fetcher and never reach this type.

/// Errors returned by [`Store`](crate::Store) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A cell name that was never registered with the store.
    #[error("unknown cell `{0}`")]
    UnknownCell(String),

    /// A notification chain revisited a cell already being updated.
    #[error("update cycle detected: {}", path.join(" -> "))]
    Cycle {
        /// Cells written during the aborted pass, ending with the revisited one.
        path: Vec<String>,
    },

    /// `create` received the same cell name twice.
    #[error("cell `{0}` is already registered")]
    DuplicateCell(String),

    /// A derivation read a cell outside its declared inputs.
    #[error("derivation for `{output}` read undeclared input `{input}`")]
    UndeclaredInput { output: String, input: String },

    /// The output cell already has a derivation writing it.
    #[error("cell `{0}` already has a derivation")]
    OutputTaken(String),

    /// `regenerate` called on a cell without a generator derivation.
    #[error("cell `{0}` is not driven by a generator")]
    NotAGenerator(String),
}

impl StoreError {
    /// Whether this error is a detected update cycle.
    pub fn is_cycle(&self) -> bool {
        matches!(self, StoreError::Cycle { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = StoreError::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "update cycle detected: a -> b -> a");
        assert!(err.is_cycle());
    }

    #[test]
    fn test_unknown_cell_message() {
        let err = StoreError::UnknownCell("amount".into());
        assert_eq!(err.to_string(), "unknown cell `amount`");
        assert!(!err.is_cycle());
    }
}
