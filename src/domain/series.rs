use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading day of a price table after cleaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    /// `None` when the source volume was blank or unparseable. Never zero-filled.
    pub volume: Option<f64>,
    pub change_pct: f64,
}

/// Date-sorted price series with strictly increasing dates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanSeries {
    points: Vec<PricePoint>,
}

impl CleanSeries {
    /// Builds a series from rows in any order.
    ///
    /// Rows are stable-sorted by date; when a date repeats, the first row
    /// in source order is kept.
    pub fn from_points(mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<&PricePoint> {
        self.points.get(index)
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(date: &str, price: f64) -> PricePoint {
        PricePoint {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            price,
            open: price,
            high: price,
            low: price,
            volume: None,
            change_pct: 0.0,
        }
    }

    #[test]
    fn test_unsorted_rows_are_sorted() {
        let series = CleanSeries::from_points(vec![
            point("2023-01-03", 3.0),
            point("2023-01-01", 1.0),
            point("2023-01-02", 2.0),
        ]);
        assert_eq!(series.prices(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_duplicate_dates_keep_first_row() {
        let series = CleanSeries::from_points(vec![
            point("2023-01-02", 20.0),
            point("2023-01-01", 1.0),
            point("2023-01-02", 21.0),
        ]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.prices(), vec![1.0, 20.0]);
        let dates = series.dates();
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
    }
}
