//! Error types returned when creating indicators or talking to the terminal.

use thiserror::Error;

/// Errors produced by `slotbar`.
#[derive(Debug, Error)]
pub enum Error {
    /// The indicator settings are inconsistent or out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The requested screen slot already hosts a live indicator.
    #[error("slot {0} is already occupied by a live indicator")]
    SlotOccupied(usize),

    /// Writing to, or querying, the terminal failed.
    #[error("terminal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
