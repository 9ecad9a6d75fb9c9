//! # Domain Types
//!
//! Records shared by every layer of Till POS, plus the checkout request shape.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    Customer     │   │      Sale       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  selling_price  │   │  phone (unique) │   │  cashier_name   │       │
//! │  │  buying_price   │   │  points         │   │  total_cents    │       │
//! │  │  stock          │   └─────────────────┘   │  items ──┐      │       │
//! │  │  min_stock      │                         └──────────┼──────┘       │
//! │  │  alert_sent     │◄──── weak ref ────┐                ▼              │
//! │  └─────────────────┘            ┌──────┴──────────────────────┐        │
//! │                                 │ SaleItem (snapshot fields)   │        │
//! │                                 │ product_name, unit_price     │        │
//! │                                 └──────────────────────────────┘        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! SaleItem copies the product name and the charged unit price at checkout.
//! Renaming or repricing a product later never rewrites sales history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::money::Money;
use crate::{DEFAULT_CASHIER_NAME, GUEST_NAME_PREFIX};

/// Generates a new entity id (UUID v4).
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Product
// =============================================================================

/// A product on the shelf.
///
/// `stock` changes only through checkout (decrement) and restock (increment).
/// The alert sweep owns `alert_sent` and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name, copied into sale items at checkout.
    pub name: String,

    pub category: Option<String>,

    /// Shelf price in minor units.
    pub selling_price_cents: i64,

    /// Cost basis in minor units (used for profit figures).
    pub buying_price_cents: i64,

    /// Units on hand. Never negative.
    pub stock: i64,

    /// Alert threshold: the product is low while `stock <= min_stock`.
    pub min_stock: i64,

    /// Latch: a low-stock notice went out for the current episode.
    pub alert_sent: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a product with a fresh id and a cleared alert latch.
    pub fn new(
        name: impl Into<String>,
        selling_price: Money,
        buying_price: Money,
        stock: i64,
        min_stock: i64,
    ) -> Self {
        let now = Utc::now();
        Product {
            id: new_id(),
            name: name.into(),
            category: None,
            selling_price_cents: selling_price.cents(),
            buying_price_cents: buying_price.cents(),
            stock,
            min_stock,
            alert_sent: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the category (builder style).
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[inline]
    pub fn selling_price(&self) -> Money {
        Money::from_cents(self.selling_price_cents)
    }

    #[inline]
    pub fn buying_price(&self) -> Money {
        Money::from_cents(self.buying_price_cents)
    }

    /// True while stock sits at or below the alert threshold.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }

    /// Checks whether `quantity` units can leave the shelf.
    #[inline]
    pub fn can_sell(&self, quantity: i64) -> bool {
        self.stock >= quantity
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A loyalty customer, looked up by phone number.
///
/// The phone is a lookup key, not a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub phone: String,
    pub name: String,
    /// Point balance. Only grows through checkout accrual.
    pub points: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Creates the placeholder record used the first time a phone shows up at
    /// the till: zero points and a `"Guest <phone>"` display name.
    pub fn guest(phone: impl Into<String>) -> Self {
        let phone = phone.into();
        let now = Utc::now();
        Customer {
            id: new_id(),
            name: format!("{} {}", GUEST_NAME_PREFIX, phone),
            phone,
            points: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Sale Status
// =============================================================================

/// Settlement status recorded on a sale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Settled at the till.
    #[default]
    Paid,
    /// Goods handed over, payment outstanding.
    Pending,
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaleStatus::Paid => write!(f, "paid"),
            SaleStatus::Pending => write!(f, "pending"),
        }
    }
}

impl FromStr for SaleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "paid" => Ok(SaleStatus::Paid),
            "pending" => Ok(SaleStatus::Pending),
            other => Err(format!("Unknown sale status: {}", other)),
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    /// Card on an external terminal.
    Card,
    /// Online transfer (UPI / QR).
    Upi,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::Upi => write!(f, "upi"),
        }
    }
}

/// Lenient parsing: front-office screens send labels like `"Online (UPI)"`.
impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_lowercase();
        match label.as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" | "credit" | "debit" | "credit card" | "debit card" => Ok(PaymentMethod::Card),
            "upi" | "online" => Ok(PaymentMethod::Upi),
            _ if label.contains("upi") => Ok(PaymentMethod::Upi),
            other => Err(format!("Unknown payment method: {}", other)),
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A committed sale. Immutable once persisted; owns its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub cashier_name: String,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    /// Customer credited with loyalty points, if a phone was given.
    pub customer_id: Option<String>,
    /// Always equals the sum of the item line totals.
    pub total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<SaleItem>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Sum of the item line totals.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(SaleItem::line_total).sum()
    }

    /// Total units across all lines.
    pub fn units(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

// =============================================================================
// Sale Item
// =============================================================================

/// A line of a sale, frozen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    /// Lookup only; the product may since have been renamed or removed.
    pub product_id: String,
    /// Product name at time of sale.
    pub product_name: String,
    /// Charged unit price at time of sale.
    pub unit_price_cents: i64,
    pub quantity: i64,
    /// `unit_price_cents × quantity`.
    pub line_total_cents: i64,
    /// Position within the sale, starting at 0.
    pub line_no: i64,
}

impl SaleItem {
    /// Freezes a request line against the product it resolved to.
    pub fn snapshot(sale_id: &str, line_no: usize, product: &Product, line: &SaleLineRequest) -> Self {
        let unit_price = line.unit_price();
        SaleItem {
            id: new_id(),
            sale_id: sale_id.to_string(),
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            unit_price_cents: unit_price.cents(),
            quantity: line.quantity,
            line_total_cents: unit_price.multiply_quantity(line.quantity).cents(),
            line_no: line_no as i64,
        }
    }

    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Checkout Request
// =============================================================================

/// One requested line: product, quantity and the price being charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLineRequest {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl SaleLineRequest {
    pub fn new(product_id: impl Into<String>, quantity: i64, unit_price: Money) -> Self {
        SaleLineRequest {
            product_id: product_id.into(),
            quantity,
            unit_price_cents: unit_price.cents(),
        }
    }

    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

/// A checkout as submitted by the till.
///
/// Omitted fields fall back to the defaults the front office has always used:
/// cashier `"Unknown"`, cash, paid.
///
/// ## Example
/// ```rust
/// use till_core::{Money, PaymentMethod, SaleRequest, SaleLineRequest};
///
/// let request = SaleRequest::new("Asha")
///     .payment_method(PaymentMethod::Upi)
///     .customer_phone("9876543210")
///     .line(SaleLineRequest::new("product-id", 2, Money::from_major(50)));
///
/// assert_eq!(request.phone(), Some("9876543210"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleRequest {
    pub cashier_name: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub status: Option<SaleStatus>,
    pub customer_phone: Option<String>,
    pub items: Vec<SaleLineRequest>,
}

impl SaleRequest {
    pub fn new(cashier_name: impl Into<String>) -> Self {
        SaleRequest {
            cashier_name: Some(cashier_name.into()),
            ..Default::default()
        }
    }

    pub fn payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    pub fn status(mut self, status: SaleStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn customer_phone(mut self, phone: impl Into<String>) -> Self {
        self.customer_phone = Some(phone.into());
        self
    }

    pub fn line(mut self, line: SaleLineRequest) -> Self {
        self.items.push(line);
        self
    }

    /// Cashier name, defaulting to `"Unknown"` when absent or blank.
    pub fn cashier(&self) -> &str {
        match self.cashier_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => DEFAULT_CASHIER_NAME,
        }
    }

    /// Trimmed phone, or `None` when absent or blank (no loyalty accrual).
    pub fn phone(&self) -> Option<&str> {
        self.customer_phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Quantity requested per product, summed across lines.
    pub fn demand_by_product(&self) -> std::collections::BTreeMap<&str, i64> {
        let mut demand = std::collections::BTreeMap::new();
        for line in &self.items {
            *demand.entry(line.product_id.as_str()).or_insert(0) += line.quantity;
        }
        demand
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
