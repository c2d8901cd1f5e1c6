//! # Entity Error Types
//!
//! Only programming-contract violations surface as errors. Consistency
//! anomalies (unowned ids, changes to missing components, destroying dead
//! entities) are logged and degraded in place.

use thiserror::Error;

use crate::ecs::CacheId;

/// Errors that can occur in the entity runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    /// The 64-bit id counter would overflow.
    #[error("entity id space exhausted")]
    IdSpaceExhausted,

    /// A cache partition that this manager never created.
    #[error("unknown cache partition: {0:?}")]
    UnknownCache(CacheId),

    /// Invalid configuration text or file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for entity operations.
pub type EntityResult<T> = Result<T, EntityError>;
