//! # till-engine: Checkout and Back-Office Services for Till POS
//!
//! Runs the stateful parts of the till on top of pluggable stores: the sale
//! commit, the low-stock scheduler and the read-only reporting services.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          till-engine                                    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────────┐  ┌─────────────────────┐   │
//! │  │ SaleProcessor  │  │ SchedulerRunner    │  │ ForecastService     │   │
//! │  │                │  │   └─ AlertJobs     │  │ InsightsService     │   │
//! │  │ locks, journal │  │      sweep, report │  │ (read-only)         │   │
//! │  │ deadline       │  │      ──► Notifier  │  │                     │   │
//! │  └───────┬────────┘  └─────────┬──────────┘  └──────────┬──────────┘   │
//! │          │                     │                        │              │
//! │          └─────────────────────┼────────────────────────┘              │
//! │                                ▼                                        │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Stores { InventoryStore, CustomerStore, SaleLog }  (dyn traits) │   │
//! │  │     ├── sqlite  (till-db repositories)                          │   │
//! │  │     └── memory  (tests, fault injection)                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`processor`] - `SaleProcessor`: atomic checkout and restock
//! - [`alerts`] - `AlertJobs`: low-stock sweep and daily report
//! - [`scheduler`] - `SchedulerRunner` / `SchedulerHandle` timer loop
//! - [`forecast`] - `ForecastService`
//! - [`insights`] - `InsightsService`
//! - [`store`] - Store traits and the `Stores` bundle
//! - [`sqlite`] - Store traits over `till-db`
//! - `memory` - In-memory stores and a recording notifier (`test-util` feature)
//! - [`locks`] - Keyed async locks
//! - [`notifier`] - Notification sink trait
//! - [`config`] - `EngineConfig` (TOML + env)
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use till_db::{Database, DbConfig};
//! use till_engine::{AlertJobs, EngineConfig, SaleProcessor, SchedulerRunner, SchedulerSettings, Stores, TracingNotifier};
//!
//! let config = EngineConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new(config.database.path.clone())).await?;
//! let stores = Stores::sqlite(&db);
//!
//! let processor = SaleProcessor::from_config(stores.clone(), &config);
//! let jobs = Arc::new(AlertJobs::new(&stores, Arc::new(TracingNotifier)));
//! let (runner, handle) = SchedulerRunner::new(jobs, SchedulerSettings::from_config(&config));
//! tokio::spawn(runner.run());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod alerts;
pub mod config;
pub mod error;
pub mod forecast;
pub mod insights;
pub mod locks;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod notifier;
pub mod processor;
pub mod scheduler;
pub mod sqlite;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use alerts::{AlertJobs, SweepOutcome};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, NotifyError, StoreError};
pub use forecast::{Forecast, ForecastService};
pub use insights::InsightsService;
pub use notifier::{NoOpNotifier, Notifier, TracingNotifier};
pub use processor::SaleProcessor;
pub use scheduler::{SchedulerHandle, SchedulerRunner, SchedulerSettings};
pub use store::{CustomerStore, InventoryStore, SaleLog, Stores};
