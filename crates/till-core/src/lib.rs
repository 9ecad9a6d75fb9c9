//! # till-core: Pure Business Logic for Till POS
//!
//! Everything here is deterministic and free of I/O. Storage, timers and
//! notification transports live in `till-db` and `till-engine`; this crate only
//! answers questions like "what does this sale cost", "how many points does it
//! earn" and "which products just crossed their alert threshold".
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Till POS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        till-engine (SaleProcessor, AlertJobs, Forecast)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ till-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌────────┐  │   │
//! │  │   │  types  │ │  money  │ │ loyalty │ │ forecast │ │ alert  │  │   │
//! │  │   │ Product │ │  Money  │ │  tiers  │ │   OLS    │ │ latch  │  │   │
//! │  │   │  Sale   │ │ (cents) │ │ accrual │ │  trend   │ │ report │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └──────────┘ └────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    till-db (Database Layer)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Product, Customer, Sale) and checkout requests
//! - [`money`] - Integer-cents money type
//! - [`error`] - Domain error types
//! - [`validation`] - Checkout request validation
//! - [`loyalty`] - Tiered point accrual
//! - [`forecast`] - Least-squares demand prediction
//! - [`alert`] - Low-stock latch evaluation and notice text
//! - [`report`] - Daily summary, sales overview and recommendation math
//!
//! ## Example Usage
//!
//! ```rust
//! use till_core::loyalty::LoyaltyPolicy;
//! use till_core::money::Money;
//!
//! let policy = LoyaltyPolicy::default();
//! let accrual = policy.accrue(600, Money::from_cents(10_000));
//!
//! // 100.00 earns 10 base points, 1.5x for a balance above 500
//! assert_eq!(accrual.awarded_points, 15);
//! assert_eq!(accrual.balance_after, 615);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod alert;
pub mod error;
pub mod forecast;
pub mod loyalty;
pub mod money;
pub mod report;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of lines accepted in one checkout request.
pub const MAX_SALE_LINES: usize = 100;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Catches keying slips (1000 instead of 10) before stock is touched.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Cashier recorded when the caller does not name one.
pub const DEFAULT_CASHIER_NAME: &str = "Unknown";

/// Prefix of the display name given to customers created at checkout.
pub const GUEST_NAME_PREFIX: &str = "Guest";
