//! Error types for backend routing

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("no backend is mounted for {dn}")]
    NoSuchSuffix { dn: String },

    #[error("backend {backend} is offline")]
    BackendOffline { backend: String },

    #[error("unknown backend: {backend}")]
    UnknownBackend { backend: String },

    #[error("suffix already mounted: {suffix}")]
    DuplicateSuffix { suffix: String },

    #[error("backend name {backend} is already used by another backend")]
    BackendNameInUse { backend: String },
}

pub type Result<T> = std::result::Result<T, RouterError>;
