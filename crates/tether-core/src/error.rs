use crate::types::{EntityId, EntityKind};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TetherError>;

#[derive(Debug, Error)]
pub enum TetherError {
    #[error("Storage error: {0}")]
    Storage(#[from] redb::Error),

    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Storage operation error: {0}")]
    StorageOperation(#[from] redb::StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Invalid connection: {reason}")]
    InvalidConnection { reason: String },

    #[error("Unknown attribute '{attribute}' for {kind}")]
    UnknownAttribute { kind: EntityKind, attribute: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

impl TetherError {
    /// Whether this error means the backing store could not serve the call
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            TetherError::Storage(_)
                | TetherError::Database(_)
                | TetherError::Table(_)
                | TetherError::Transaction(_)
                | TetherError::Commit(_)
                | TetherError::StorageOperation(_)
                | TetherError::Serialization(_)
                | TetherError::StoreUnavailable(_)
        )
    }
}
