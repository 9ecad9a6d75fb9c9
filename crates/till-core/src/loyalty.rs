//! # Loyalty Module
//!
//! Tiered point accrual.
//!
//! ## Accrual Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Balance BEFORE this sale         Tier        Multiplier               │
//! │  ───────────────────────────────  ──────────  ──────────               │
//! │  points > gold_threshold (1000)   Gold        2.0x  (20000 bps)        │
//! │  points > silver_threshold (500)  Silver      1.5x  (15000 bps)        │
//! │  otherwise                        Standard    1.0x  (10000 bps)        │
//! │                                                                         │
//! │  base    = floor(total / spend_per_point)     (1 point per 10.00)      │
//! │  awarded = floor(base × multiplier)                                    │
//! │  balance = balance + awarded                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The tier always comes from the balance as it stood before the sale, so a
//! large purchase cannot promote itself into a better multiplier.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

/// One multiplier unit in basis points (1.0x).
pub const MULTIPLIER_ONE_BPS: i64 = 10_000;

// =============================================================================
// Tier
// =============================================================================

/// Loyalty tier derived from a point balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyTier {
    Standard,
    Silver,
    Gold,
}

// =============================================================================
// Policy
// =============================================================================

/// Tier boundaries and accrual rate.
///
/// These are product decisions, so they are configuration rather than
/// constants. The defaults reproduce the rules the stores run today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoyaltyPolicy {
    /// Balances strictly above this earn the silver multiplier.
    pub silver_threshold: i64,
    /// Balances strictly above this earn the gold multiplier.
    pub gold_threshold: i64,
    pub silver_multiplier_bps: i64,
    pub gold_multiplier_bps: i64,
    /// Spend (minor units) that earns one base point.
    pub spend_per_point_cents: i64,
}

impl Default for LoyaltyPolicy {
    fn default() -> Self {
        LoyaltyPolicy {
            silver_threshold: 500,
            gold_threshold: 1000,
            silver_multiplier_bps: 15_000,
            gold_multiplier_bps: 20_000,
            spend_per_point_cents: 1_000,
        }
    }
}

/// Outcome of one accrual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Accrual {
    /// Tier of the pre-sale balance.
    pub tier: LoyaltyTier,
    pub base_points: i64,
    pub awarded_points: i64,
    pub balance_after: i64,
}

impl LoyaltyPolicy {
    /// Tier for a balance. Boundaries are exclusive: exactly 500 is standard.
    pub fn tier_for(&self, points: i64) -> LoyaltyTier {
        if points > self.gold_threshold {
            LoyaltyTier::Gold
        } else if points > self.silver_threshold {
            LoyaltyTier::Silver
        } else {
            LoyaltyTier::Standard
        }
    }

    /// Multiplier of a tier, in basis points.
    pub fn multiplier_bps(&self, tier: LoyaltyTier) -> i64 {
        match tier {
            LoyaltyTier::Standard => MULTIPLIER_ONE_BPS,
            LoyaltyTier::Silver => self.silver_multiplier_bps,
            LoyaltyTier::Gold => self.gold_multiplier_bps,
        }
    }

    /// Base points for a sale total, truncated toward zero.
    pub fn base_points(&self, total: Money) -> i64 {
        if total.cents() <= 0 {
            return 0;
        }
        total.cents() / self.spend_per_point_cents
    }

    /// Computes the accrual for a sale of `total` by a customer holding
    /// `points_before`.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::loyalty::{LoyaltyPolicy, LoyaltyTier};
    /// use till_core::money::Money;
    ///
    /// let policy = LoyaltyPolicy::default();
    ///
    /// let gold = policy.accrue(1001, Money::from_major(100));
    /// assert_eq!(gold.tier, LoyaltyTier::Gold);
    /// assert_eq!(gold.awarded_points, 20);
    ///
    /// let boundary = policy.accrue(500, Money::from_major(100));
    /// assert_eq!(boundary.tier, LoyaltyTier::Standard);
    /// assert_eq!(boundary.awarded_points, 10);
    /// ```
    pub fn accrue(&self, points_before: i64, total: Money) -> Accrual {
        let tier = self.tier_for(points_before);
        let base_points = self.base_points(total);
        let awarded =
            (base_points as i128 * self.multiplier_bps(tier) as i128) / MULTIPLIER_ONE_BPS as i128;
        let awarded_points = awarded.min(i64::MAX as i128) as i64;

        Accrual {
            tier,
            base_points,
            awarded_points,
            balance_after: points_before.saturating_add(awarded_points),
        }
    }

    /// Checks the policy is internally consistent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.silver_threshold < 0 {
            return Err(ValidationError::MustBePositive {
                field: "loyalty.silver_threshold".to_string(),
            });
        }
        if self.gold_threshold <= self.silver_threshold {
            return Err(ValidationError::out_of_range(
                "loyalty.gold_threshold",
                self.silver_threshold + 1,
                i64::MAX,
            ));
        }
        for (field, bps) in [
            ("loyalty.silver_multiplier_bps", self.silver_multiplier_bps),
            ("loyalty.gold_multiplier_bps", self.gold_multiplier_bps),
        ] {
            if bps < MULTIPLIER_ONE_BPS {
                return Err(ValidationError::out_of_range(field, MULTIPLIER_ONE_BPS, i64::MAX));
            }
        }
        if self.spend_per_point_cents <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "loyalty.spend_per_point_cents".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries_are_exclusive() {
        let policy = LoyaltyPolicy::default();
        assert_eq!(policy.tier_for(0), LoyaltyTier::Standard);
        assert_eq!(policy.tier_for(500), LoyaltyTier::Standard);
        assert_eq!(policy.tier_for(501), LoyaltyTier::Silver);
        assert_eq!(policy.tier_for(1000), LoyaltyTier::Silver);
        assert_eq!(policy.tier_for(1001), LoyaltyTier::Gold);
    }

    #[test]
    fn test_silver_accrual_scenario() {
        let accrual = LoyaltyPolicy::default().accrue(600, Money::from_major(100));
        assert_eq!(accrual.base_points, 10);
        assert_eq!(accrual.awarded_points, 15);
        assert_eq!(accrual.balance_after, 615);
    }

    #[test]
    fn test_base_points_truncate() {
        let policy = LoyaltyPolicy::default();
        assert_eq!(policy.base_points(Money::from_cents(999)), 0);
        assert_eq!(policy.base_points(Money::from_cents(1999)), 1);
        assert_eq!(policy.base_points(Money::zero()), 0);
    }

    #[test]
    fn test_final_points_floor_after_multiplier() {
        // 7 base points at 1.5x = 10.5 -> 10
        let accrual = LoyaltyPolicy::default().accrue(501, Money::from_major(75));
        assert_eq!(accrual.base_points, 7);
        assert_eq!(accrual.awarded_points, 10);
    }

    #[test]
    fn test_tier_uses_pre_sale_balance() {
        // 490 + 100 base points would cross 500, but the tier is still standard
        let accrual = LoyaltyPolicy::default().accrue(490, Money::from_major(1000));
        assert_eq!(accrual.tier, LoyaltyTier::Standard);
        assert_eq!(accrual.awarded_points, 100);
        assert_eq!(accrual.balance_after, 590);
    }

    #[test]
    fn test_custom_policy() {
        let policy = LoyaltyPolicy {
            silver_threshold: 100,
            gold_threshold: 200,
            silver_multiplier_bps: 12_500,
            gold_multiplier_bps: 30_000,
            spend_per_point_cents: 100,
        };
        assert!(policy.validate().is_ok());
        assert_eq!(policy.accrue(150, Money::from_major(8)).awarded_points, 10);
        assert_eq!(policy.accrue(201, Money::from_major(8)).awarded_points, 24);
    }

    #[test]
    fn test_policy_validation() {
        let mut policy = LoyaltyPolicy::default();
        assert!(policy.validate().is_ok());

        policy.gold_threshold = 500;
        assert!(policy.validate().is_err());

        policy = LoyaltyPolicy {
            silver_multiplier_bps: 9_000,
            ..LoyaltyPolicy::default()
        };
        assert!(policy.validate().is_err());

        policy = LoyaltyPolicy {
            spend_per_point_cents: 0,
            ..LoyaltyPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
