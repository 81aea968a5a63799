//! Transfer Attempt State Definitions
//!
//! ```text
//! STARTED → LOCKING → VALIDATED → MUTATING → COMMITTED
//!    ↓         ↓          ↓           ↓
//!    └─────────┴──────────┴───────────┴────→ ABORTED (rolled back)
//! ```

use std::fmt;

/// Per-attempt states of a single transfer call
///
/// Nothing is persisted here: the state only lives for the duration of one
/// engine call. Terminal states: COMMITTED, ABORTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferState {
    /// Request validated, session open
    Started,

    /// Acquiring row locks in identity order
    Locking,

    /// Both rows locked, balance check passed
    Validated,

    /// Balance updates issued, not yet committed
    Mutating,

    /// Terminal: both balances durably updated
    Committed,

    /// Terminal: rolled back, no effect observable
    Aborted,
}

impl TransferState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Committed | TransferState::Aborted)
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: TransferState) -> bool {
        use TransferState::*;
        match (self, next) {
            (Started, Locking) | (Locking, Validated) | (Validated, Mutating) => true,
            (Mutating, Committed) => true,
            (from, Aborted) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Started => "STARTED",
            TransferState::Locking => "LOCKING",
            TransferState::Validated => "VALIDATED",
            TransferState::Mutating => "MUTATING",
            TransferState::Committed => "COMMITTED",
            TransferState::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
