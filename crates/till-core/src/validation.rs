//! # Validation Module
//!
//! Checks a checkout request before any store is read.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (pure, request shape)                            │
//! │  ├── lines present, quantities in range, prices non-negative           │
//! │  └── cashier name and phone format                                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: SaleProcessor (against stores)                               │
//! │  ├── ProductNotFound                                                   │
//! │  └── InsufficientStock                                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (stock >= 0)                                                │
//! │  └── UNIQUE (customers.phone)                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::SaleRequest;
use crate::{MAX_ITEM_QUANTITY, MAX_SALE_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_CASHIER_NAME_LEN: usize = 100;
const MAX_PHONE_LEN: usize = 20;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a line quantity (1..=999).
///
/// ## Example
/// ```rust
/// use till_core::validation::validate_quantity;
///
/// assert!(validate_quantity("quantity", 5).is_ok());
/// assert!(validate_quantity("quantity", 0).is_err());
/// assert!(validate_quantity("quantity", 1000).is_err());
/// ```
pub fn validate_quantity(field: &str, quantity: i64) -> ValidationResult<()> {
    if !(1..=MAX_ITEM_QUANTITY).contains(&quantity) {
        return Err(ValidationError::out_of_range(field, 1, MAX_ITEM_QUANTITY));
    }
    Ok(())
}

/// Validates a charged unit price. Zero is allowed (free items).
pub fn validate_unit_price(field: &str, price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a customer phone number (already trimmed).
///
/// ## Rules
/// - At most 20 characters
/// - Digits, spaces, `+` and `-` only
/// - At least one digit
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    if phone.len() > MAX_PHONE_LEN {
        return Err(ValidationError::TooLong {
            field: "customer_phone".to_string(),
            max: MAX_PHONE_LEN,
        });
    }

    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || c == ' ' || c == '+' || c == '-');
    if !allowed || !phone.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "customer_phone".to_string(),
            reason: "must contain only digits, spaces, '+' and '-'".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Request Validator
// =============================================================================

/// Validates the shape of a checkout request.
///
/// Returns the exact sale total on success so callers can reject requests
/// whose arithmetic would overflow before they touch stock.
///
/// ## Example
/// ```rust
/// use till_core::{Money, SaleLineRequest, SaleRequest};
/// use till_core::validation::validate_sale_request;
///
/// let request = SaleRequest::new("Asha")
///     .line(SaleLineRequest::new("a", 1, Money::from_major(50)))
///     .line(SaleLineRequest::new("b", 1, Money::from_major(50)));
///
/// assert_eq!(validate_sale_request(&request).unwrap(), Money::from_major(100));
/// ```
pub fn validate_sale_request(request: &SaleRequest) -> CoreResult<Money> {
    if request.items.is_empty() {
        return Err(CoreError::EmptySale);
    }

    if request.items.len() > MAX_SALE_LINES {
        return Err(ValidationError::out_of_range("items", 1, MAX_SALE_LINES as i64).into());
    }

    if let Some(name) = request.cashier_name.as_deref() {
        if name.trim().len() > MAX_CASHIER_NAME_LEN {
            return Err(ValidationError::TooLong {
                field: "cashier_name".to_string(),
                max: MAX_CASHIER_NAME_LEN,
            }
            .into());
        }
    }

    if let Some(phone) = request.phone() {
        validate_phone(phone)?;
    }

    let mut total = Money::zero();
    for (idx, line) in request.items.iter().enumerate() {
        if line.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: format!("items[{}].product_id", idx),
            }
            .into());
        }
        validate_quantity(&format!("items[{}].quantity", idx), line.quantity)?;
        validate_unit_price(&format!("items[{}].unit_price", idx), line.unit_price())?;

        total = line
            .unit_price()
            .checked_multiply_quantity(line.quantity)
            .and_then(|subtotal| total.checked_add(subtotal))
            .ok_or_else(|| ValidationError::out_of_range(
                format!("items[{}].unit_price", idx),
                0,
                i64::MAX / MAX_ITEM_QUANTITY,
            ))?;
    }

    Ok(total)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SaleLineRequest;

    fn line(qty: i64, cents: i64) -> SaleLineRequest {
        SaleLineRequest::new("p-1", qty, Money::from_cents(cents))
    }

    #[test]
    fn test_empty_sale_rejected() {
        let request = SaleRequest::new("Asha");
        assert_eq!(validate_sale_request(&request), Err(CoreError::EmptySale));
    }

    #[test]
    fn test_quantity_bounds_name_the_line() {
        let request = SaleRequest::new("Asha").line(line(1, 100)).line(line(0, 100));
        let err = validate_sale_request(&request).unwrap_err();
        assert_eq!(
            err,
            CoreError::Validation(ValidationError::out_of_range("items[1].quantity", 1, 999))
        );
    }

    #[test]
    fn test_negative_price_rejected() {
        let request = SaleRequest::new("Asha").line(line(1, -1));
        assert!(matches!(
            validate_sale_request(&request),
            Err(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));
    }

    #[test]
    fn test_free_item_allowed() {
        let request = SaleRequest::new("Asha").line(line(2, 0));
        assert_eq!(validate_sale_request(&request), Ok(Money::zero()));
    }

    #[test]
    fn test_overflowing_total_rejected() {
        let request = SaleRequest::new("Asha")
            .line(line(999, i64::MAX / 999))
            .line(line(999, i64::MAX / 999));
        assert!(validate_sale_request(&request).is_err());
    }

    #[test]
    fn test_phone_format() {
        assert!(validate_phone("999").is_ok());
        assert!(validate_phone("+91 98765-43210").is_ok());
        assert!(validate_phone("call me").is_err());
        assert!(validate_phone("+-").is_err());
        assert!(validate_phone(&"9".repeat(21)).is_err());
    }

    #[test]
    fn test_blank_phone_skips_phone_validation() {
        let request = SaleRequest::new("Asha").customer_phone("   ").line(line(1, 100));
        assert!(validate_sale_request(&request).is_ok());
    }
}
