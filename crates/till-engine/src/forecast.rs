//! # Forecast Service
//!
//! Reads recent sales and predicts next-day demand with
//! [`till_core::forecast::predict_next`]. Read-only.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use till_core::forecast::{daily_units, predict_next};
use till_core::ValidationError;

use crate::config::{EngineConfig, MAX_LOOKBACK_DAYS};
use crate::error::EngineResult;
use crate::store::{SaleLog, Stores};

/// A demand prediction for the day after the history window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forecast {
    /// `None` for the whole store.
    pub product_id: Option<String>,
    /// Days with at least one unit sold.
    pub history_days: usize,
    pub predicted_units: i64,
}

pub struct ForecastService {
    sales: Arc<dyn SaleLog>,
    lookback_days: i64,
}

impl ForecastService {
    pub fn new(stores: &Stores, lookback_days: i64) -> Self {
        ForecastService {
            sales: stores.sales.clone(),
            lookback_days,
        }
    }

    pub fn from_config(stores: &Stores, config: &EngineConfig) -> Self {
        Self::new(stores, config.forecast.lookback_days)
    }

    pub fn lookback_days(&self) -> i64 {
        self.lookback_days
    }

    /// Forecast over the configured lookback window.
    pub async fn forecast(&self, product_id: Option<&str>, now: DateTime<Utc>) -> EngineResult<Forecast> {
        self.forecast_with_lookback(product_id, self.lookback_days, now).await
    }

    /// Forecast from sales strictly after `now - lookback_days`.
    ///
    /// ## Example
    /// ```rust,ignore
    /// // 10 units yesterday, 20 today
    /// let f = service.forecast_with_lookback(Some(&milk.id), 30, Utc::now()).await?;
    /// assert_eq!(f.predicted_units, 30);
    /// ```
    pub async fn forecast_with_lookback(
        &self,
        product_id: Option<&str>,
        lookback_days: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<Forecast> {
        if lookback_days < 1 {
            return Err(ValidationError::MustBePositive {
                field: "lookback_days".to_string(),
            }
            .into());
        }

        let since = Duration::try_days(lookback_days)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| ValidationError::out_of_range("lookback_days", 1, MAX_LOOKBACK_DAYS))?;
        let sales = self.sales.list_sales_after(since).await?;
        let history = daily_units(&sales, product_id);
        let predicted_units = predict_next(&history);

        debug!(
            product_id = product_id.unwrap_or("*"),
            sales = sales.len(),
            history_days = history.len(),
            predicted_units,
            "Forecast computed"
        );

        Ok(Forecast {
            product_id: product_id.map(str::to_string),
            history_days: history.len(),
            predicted_units,
        })
    }
}

impl std::fmt::Debug for ForecastService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastService")
            .field("lookback_days", &self.lookback_days)
            .finish_non_exhaustive()
    }
}
