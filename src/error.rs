//! Error types for mu-pager
//!
//! Analysis and pagination are total: they always return a best-effort
//! result. Only the controller surface can fail, and only for scheduling
//! reasons (a debounced request being replaced, or the controller going
//! away while a caller waits).

use core::fmt;

/// Top-level error type for controller operations
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PaginationError {
    /// A debounced request was replaced by a later one before it ran.
    ///
    /// The latest request's result lands in the cache as usual.
    Superseded {
        /// Ticket of the abandoned request.
        ticket: u64,
        /// Ticket of the request that replaced it.
        completed: u64,
    },
    /// The completion channel closed before a result was published
    CoalescerClosed,
}

impl fmt::Display for PaginationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaginationError::Superseded { ticket, completed } => write!(
                f,
                "Pagination request {} superseded by request {}",
                ticket, completed
            ),
            PaginationError::CoalescerClosed => {
                write!(f, "Pagination controller closed before completion")
            }
        }
    }
}

impl std::error::Error for PaginationError {}
