//! # Forecast Module
//!
//! Next-day demand from a linear trend over daily unit totals.
//!
//! ## Method
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Ordinary least squares over the day index                             │
//! │                                                                         │
//! │  day:    2026-10-01  2026-10-02  2026-10-03        (sorted)            │
//! │  x:           0           1           2                                 │
//! │  y:          10          20          ??                                 │
//! │                                                                         │
//! │  m = (n·Σxy − Σx·Σy) / (n·Σx² − (Σx)²)       slope                     │
//! │  c = (Σy − m·Σx) / n                          intercept                 │
//! │  ŷ = m·n + c                                  prediction at x = n       │
//! │                                                                         │
//! │  Result: max(0, ceil(ŷ))                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Exact Arithmetic
//! With `M = n·Σxy − Σx·Σy` and `D = n·Σx² − (Σx)²` the prediction is the
//! rational number `(M·(n² − Σx) + Σy·D) / (n·D)`. Every term is an integer,
//! so the ceiling is computed exactly on `i128` with no float rounding.
//! `D > 0` whenever `n ≥ 2` because the x values are distinct.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::types::Sale;

/// Predicts units for the day after the last day in `history`.
///
/// Fewer than two days of history yields 0. The map's key order is the time
/// order; gaps between keys are ignored (indices are consecutive).
///
/// ## Example
/// ```rust
/// use std::collections::BTreeMap;
/// use till_core::forecast::predict_next;
///
/// let history = BTreeMap::from([(0, 10), (1, 20)]);
/// assert_eq!(predict_next(&history), 30);
///
/// let single = BTreeMap::from([(0, 42)]);
/// assert_eq!(predict_next(&single), 0);
/// ```
pub fn predict_next<K: Ord>(history: &BTreeMap<K, i64>) -> i64 {
    let n = history.len() as i128;
    if n < 2 {
        return 0;
    }

    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0i128, 0i128, 0i128, 0i128);
    for (x, &y) in history.values().enumerate() {
        let x = x as i128;
        let y = y as i128;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let slope_num = n * sum_xy - sum_x * sum_y;
    let denom = n * sum_xx - sum_x * sum_x;

    let numerator = slope_num * (n * n - sum_x) + sum_y * denom;
    let denominator = n * denom;

    if numerator <= 0 {
        return 0;
    }

    let ceil = (numerator + denominator - 1) / denominator;
    ceil.min(i64::MAX as i128) as i64
}

/// Aggregates sales into units sold per UTC calendar day.
///
/// With `product_id` set, only that product's lines count; otherwise every
/// line does. Days with no matching units are absent from the map.
pub fn daily_units(sales: &[Sale], product_id: Option<&str>) -> BTreeMap<NaiveDate, i64> {
    let mut days = BTreeMap::new();
    for sale in sales {
        let units: i64 = sale
            .items
            .iter()
            .filter(|item| product_id.map_or(true, |id| item.product_id == id))
            .map(|item| item.quantity)
            .sum();
        if units > 0 {
            *days.entry(sale.created_at.date_naive()).or_insert(0) += units;
        }
    }
    days
}

// =============================================================================
// Unit Tests
// =============================================================================
