//! # Engine Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Checkout     │  │    Commit       │  │    Configuration        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  StorageFailure │  │  InvalidConfig          │ │
//! │  │  ProductNotFound│  │  TxTimeout      │  │  ConfigLoadFailed       │ │
//! │  │  Insufficient.. │  │  (retryable)    │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │  Notification   │  │   Runtime       │                              │
//! │  │                 │  │                 │                              │
//! │  │  NotifierFailure│  │  ChannelError   │                              │
//! │  │  (logged only)  │  │                 │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Checkout errors are reported with nothing committed: validation and lookup
//! failures happen before any mutation, and commit failures are compensated
//! before they surface.

use thiserror::Error;
use till_core::{CoreError, ValidationError};
use till_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Store Errors
// =============================================================================

/// Failure reported by a store implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store could not serve the call (I/O, pool, lock, ...).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The write contradicts stored data (constraint violation).
    #[error("Store conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        StoreError::Unavailable(msg.into())
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => StoreError::NotFound { entity, id },
            e if e.is_constraint() => StoreError::Conflict(e.to_string()),
            e => StoreError::Unavailable(e.to_string()),
        }
    }
}

// =============================================================================
// Notifier Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

// =============================================================================
// Engine Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    // =========================================================================
    // Checkout Errors
    // =========================================================================
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Not enough stock for {product_name}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        product_name: String,
        available: i64,
        requested: i64,
    },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The commit did not finish within the checkout budget. Everything it
    /// applied was rolled back.
    #[error("Sale not committed within {timeout_ms} ms")]
    TransactionTimeout { timeout_ms: u64 },

    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StoreError),

    // =========================================================================
    // Notification Errors
    // =========================================================================
    #[error(transparent)]
    NotifierFailure(#[from] NotifyError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// A background task's channel is closed (task stopped).
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => EngineError::ProductNotFound(id),
            CoreError::InsufficientStock {
                product_id,
                product_name,
                available,
                requested,
            } => EngineError::InsufficientStock {
                product_id,
                product_name,
                available,
                requested,
            },
            CoreError::EmptySale => EngineError::Validation(ValidationError::Required {
                field: "items".to_string(),
            }),
            CoreError::Validation(e) => EngineError::Validation(e),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        EngineError::StorageFailure(err.into())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl EngineError {
    /// True when the caller may resubmit the same request.
    ///
    /// Only commit failures qualify; validation, lookup and stock errors
    /// would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StorageFailure(_) | EngineError::TransactionTimeout { .. }
        )
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_) | EngineError::ConfigLoadFailed(_)
        )
    }
}
