//! Error taxonomy shared by the query, repository and serialisation layers

use std::time::Duration;
use thiserror::Error;

/// Result alias used across the core
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by the core engine.
///
/// `NotFound` and `Forbidden` are distinct on purpose: a by-id lookup that
/// misses inside the caller's tenant but hits globally reports `Forbidden`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("{entity} '{id}' belongs to another tenant")]
    Forbidden { entity: String, id: String },

    /// A dynamic relationship pointed at a type the registry does not know
    #[error("relationship '{relationship}' resolved to unregistered type '{discriminator}'")]
    Taxonomy {
        relationship: String,
        discriminator: String,
    },

    #[error("model registry conflict: {0}")]
    RegistryConflict(String),

    /// Read did not complete in time; retrying is safe
    #[error("graph read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// Write did not complete in time; commit status is unknown
    #[error("graph write timed out after {0:?}, commit status unknown")]
    AmbiguousWrite(Duration),

    #[error("record decoding failed: {0}")]
    Decode(String),

    #[error("invalid migration: {0}")]
    InvalidMigration(String),

    #[error("migration {version} failed")]
    Migration {
        version: String,
        #[source]
        source: Box<CoreError>,
    },

    #[error(transparent)]
    Graph(#[from] anyhow::Error),
}

impl CoreError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn forbidden(entity: &str, id: &str) -> Self {
        Self::Forbidden {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Whether the failed operation can be retried without side effects
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::ReadTimeout(_))
    }
}
