//! Error types for the uniqueid generator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UniqueIdError {
    /// Malformed or missing input.
    #[error("invalid data: {0}")]
    BadData(String),

    /// Both or neither of the state directory and state entry were supplied.
    #[error("exactly one of a state directory or a state entry must be configured")]
    ConfigurationConflict,

    /// The generator is not usable in its current state.
    #[error("system error: {0}")]
    SystemError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl UniqueIdError {
    pub fn bad_data(msg: impl Into<String>) -> Self {
        Self::BadData(msg.into())
    }

    pub fn system(msg: impl Into<String>) -> Self {
        Self::SystemError(msg.into())
    }

    /// Argument errors, including the location conflict.
    pub fn is_bad_data(&self) -> bool {
        matches!(self, Self::BadData(_) | Self::ConfigurationConflict)
    }

    /// Collapse any failure reported by the primitive into the system class.
    ///
    /// Storage failures already belong to that class and keep their source.
    pub fn into_system(self) -> Self {
        if self.is_system_error() {
            self
        } else {
            Self::SystemError(self.to_string())
        }
    }

    /// Runtime failures: unusable generator state, state storage I/O and
    /// clock state encoding.
    pub fn is_system_error(&self) -> bool {
        matches!(
            self,
            Self::SystemError(_) | Self::Io(_) | Self::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, UniqueIdError>;
