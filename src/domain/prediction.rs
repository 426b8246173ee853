//! Prediction records and the inclusive date-range filter applied to them.

use crate::domain::errors::{ForecastError, ForecastResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Model output for a single date.
///
/// `actual_price` is `None` for dates past the end of the observed series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub date: NaiveDate,
    pub actual_price: Option<f64>,
    pub predicted_price: f64,
    pub predicted_price_low: f64,
    pub predicted_price_high: f64,
}

/// Optional inclusive start/end bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Parses `YYYY-MM-DD` bounds. A missing or empty bound means "no bound";
    /// anything else that fails to parse, whitespace included, is an
    /// [`ForecastError::InvalidDate`].
    pub fn parse(start: Option<&str>, end: Option<&str>) -> ForecastResult<Self> {
        Ok(Self {
            start: parse_bound(start)?,
            end: parse_bound(end)?,
        })
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }

    /// Keeps the records inside the range, preserving their order.
    pub fn apply(&self, records: &[PredictionRecord]) -> Vec<PredictionRecord> {
        if self.is_unbounded() {
            return records.to_vec();
        }
        records
            .iter()
            .filter(|r| self.contains(r.date))
            .cloned()
            .collect()
    }
}

fn parse_bound(bound: Option<&str>) -> ForecastResult<Option<NaiveDate>> {
    match bound {
        None | Some("") => Ok(None),
        Some(value) => NaiveDate::parse_from_str(value, DATE_FORMAT)
            .map(Some)
            .map_err(|_| ForecastError::InvalidDate {
                value: value.to_string(),
            }),
    }
}
