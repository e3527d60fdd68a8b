//! Simulator error model.

use thiserror::Error;

use salesim_core::DomainError;
use salesim_infra::StoreError;

/// Error returned by simulator operations.
///
/// `Domain` errors are raised before or independently of storage (bad input,
/// missing reference data); `Store` errors abort the surrounding batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SimError {
    /// True for rejected input (nothing was attempted against storage).
    pub fn is_input_error(&self) -> bool {
        matches!(self, SimError::Domain(DomainError::Validation(_)))
    }
}
