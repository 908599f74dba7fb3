//! Result and error types for broken placement invariants.

/// The result type of every placement phase.
///
/// `Err` means a structural invariant of the placement database was violated
/// (a site bound twice, two spreading regions claiming one bin, a cell owned
/// by two placement units). Recoverable conditions such as slow convergence
/// or column overflow never produce `Err`; they are reported as warnings
/// through the diagnostic sink and the phase still returns `Ok`.
pub type PlaceResult<T> = Result<T, InternalError>;

/// A structural invariant violation inside the placer.
///
/// This indicates a logic defect, not a property of the input design, and the
/// run is aborted when one surfaces.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("internal placer error: {message}")]
pub struct InternalError {
    /// Description of the violated invariant.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for InternalError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
