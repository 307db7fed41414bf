//! Session error types.

use thiserror::Error;

/// Session layer errors.
///
/// Transport failures (error or EOF) are deliberately absent: they are not
/// error conditions at this layer and are mapped to the closed notification
/// instead. Parser non-progress and trailing bytes after stream close are
/// control flow and diagnostics respectively, never errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    /// Operation on a session with no bound transport (an outbound session
    /// whose connect has not completed yet).
    #[error("no transport bound")]
    NotBound,
}
