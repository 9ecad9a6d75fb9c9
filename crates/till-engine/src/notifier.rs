//! # Notifier
//!
//! Outbound channel for manager-facing notices (low stock, daily report).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  AlertJobs ──notify(subject, body)──► dyn Notifier                     │
//! │                                        ├── TracingNotifier (default)   │
//! │                                        ├── NoOpNotifier                │
//! │                                        └── RecordingNotifier (tests)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures are returned to the caller; the scheduler logs and drops them.

use async_trait::async_trait;
use tracing::info;

use crate::error::NotifyError;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Writes each notice to the log at `info` level under the
/// `till::notice` target.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        info!(target: "till::notice", subject = %subject, "{}", body);
        Ok(())
    }
}

/// Discards every notice.
#[derive(Debug, Clone, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn notify(&self, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}
