use thiserror::Error;

pub type InventoryResult<T> = Result<T, InventoryError>;

/// Errors produced by the inventory domain.
///
/// Rejected mutations (`EmptyInstanceId`, `EmptyTagKey`, `NegativeExpense`)
/// leave the entity untouched; the caller decides whether to skip the single
/// entity or abort.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("instance id must not be empty")]
    EmptyInstanceId,

    #[error("tag key must not be empty (instance {0})")]
    EmptyTagKey(String),

    #[error("negative expense amount {amount} for instance {instance_id}")]
    NegativeExpense { instance_id: String, amount: f64 },

    #[error("account '{0}' already present in inventory")]
    DuplicateAccount(String),

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("store error: {0}")]
    Store(String),
}
