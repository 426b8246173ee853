//! CSV price-table loader.
//!
//! Accepts the two layouts the price exports come in:
//! - `Date, Price, Open, High, Low, Vol., Change %` (dates as `MM/DD/YYYY`)
//! - `Date, Close/Last, Volume, Open, High, Low` (no change column; it is derived)
//!
//! Rows whose date or prices cannot be parsed are rejected. Volume that is
//! blank or unparseable is kept as unknown (`None`) rather than zero.

use crate::domain::errors::{ForecastError, ForecastResult};
use crate::domain::repositories::SeriesSource;
use crate::domain::series::{CleanSeries, PricePoint};
use chrono::NaiveDate;
use csv::StringRecord;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d"];

pub struct CsvSeriesLoader {
    path: PathBuf,
}

impl CsvSeriesLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses a price table from any reader. `source_id` is only used for
    /// logging and errors.
    pub fn parse_reader<R: Read>(reader: R, source_id: &str) -> ForecastResult<CleanSeries> {
        let load_error = |reason: String| ForecastError::DataLoad {
            source_id: source_id.to_string(),
            reason,
        };

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| load_error(format!("unreadable header: {}", e)))?
            .clone();
        let columns = ColumnMap::resolve(&headers).map_err(load_error)?;

        let mut points = Vec::new();
        let mut rejected = 0usize;

        for (line, result) in rdr.records().enumerate() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    debug!("Skipping malformed row {} in {}: {}", line + 2, source_id, e);
                    rejected += 1;
                    continue;
                }
            };
            match columns.parse_row(&record) {
                Some(point) => points.push(point),
                None => {
                    debug!("Rejected row {} in {}: {:?}", line + 2, source_id, record);
                    rejected += 1;
                }
            }
        }

        if points.is_empty() {
            return Err(load_error("no usable rows".to_string()));
        }
        if rejected > 0 {
            warn!("Rejected {} unparseable rows from {}", rejected, source_id);
        }

        let series = CleanSeries::from_points(points);
        info!(
            "Loaded {} rows from {} ({:?} to {:?})",
            series.len(),
            source_id,
            series.first_date(),
            series.last_date()
        );
        Ok(series)
    }
}

impl SeriesSource for CsvSeriesLoader {
    fn source_id(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> ForecastResult<CleanSeries> {
        let source_id = self.source_id();
        info!("Loading price data from {}", source_id);
        let file = File::open(&self.path).map_err(|e| ForecastError::DataLoad {
            source_id: source_id.clone(),
            reason: e.to_string(),
        })?;
        Self::parse_reader(file, &source_id)
    }
}

struct ColumnMap {
    date: usize,
    price: usize,
    open: usize,
    high: usize,
    low: usize,
    volume: Option<usize>,
    change: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &StringRecord) -> Result<Self, String> {
        let names: Vec<String> = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
            .collect();
        let find = |candidates: &[&str]| names.iter().position(|n| candidates.contains(&n.as_str()));
        let require = |candidates: &[&str]| {
            find(candidates).ok_or_else(|| format!("missing column '{}'", candidates[0]))
        };

        Ok(Self {
            date: require(&["date"])?,
            price: require(&["price", "close/last", "close"])?,
            open: require(&["open"])?,
            high: require(&["high"])?,
            low: require(&["low"])?,
            volume: find(&["vol.", "volume", "vol"]),
            change: find(&["change %", "change%", "change_pct"]),
        })
    }

    fn parse_row(&self, record: &StringRecord) -> Option<PricePoint> {
        let date = parse_date(record.get(self.date)?)?;
        let price = parse_number(record.get(self.price)?)?;
        let open = parse_number(record.get(self.open)?)?;
        let high = parse_number(record.get(self.high)?)?;
        let low = parse_number(record.get(self.low)?)?;

        let volume = self
            .volume
            .and_then(|i| record.get(i))
            .and_then(parse_volume);
        let change_pct = self
            .change
            .and_then(|i| record.get(i))
            .and_then(parse_change_pct)
            .unwrap_or_else(|| derive_change_pct(price, open));

        Some(PricePoint {
            date,
            price,
            open,
            high,
            low,
            volume,
            change_pct,
        })
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Parses a price field, stripping thousands separators.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a volume field such as `"1.2K"` or `"3.4M"`.
///
/// Blank or unparseable input yields `None`.
pub fn parse_volume(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }

    let (digits, multiplier) = match cleaned.chars().last() {
        Some('K') | Some('k') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('M') | Some('m') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };

    digits
        .trim()
        .parse::<f64>()
        .ok()
        .map(|v| v * multiplier)
        .filter(|v| v.is_finite())
}

pub fn parse_change_pct(raw: &str) -> Option<f64> {
    parse_number(raw.trim().trim_end_matches('%'))
}

/// `(price - open) / open * 100`, rounded to 2 decimals (half to even).
pub fn derive_change_pct(price: f64, open: f64) -> f64 {
    if open == 0.0 {
        return 0.0;
    }
    ((price - open) / open * 100.0 * 100.0).round_ties_even() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVESTING_CSV: &str = "\
Date,Price,Open,High,Low,Vol.,Change %
01/04/2022,\"1,814.60\",\"1,802.20\",\"1,817.00\",\"1,799.20\",1.2K,0.70%
01/03/2022,\"1,801.90\",\"1,829.20\",\"1,831.10\",\"1,798.00\",,-1.52%
13/45/2022,\"1,700.00\",\"1,700.00\",\"1,700.00\",\"1,700.00\",5K,0.00%
";

    const NASDAQ_CSV: &str = "\
Date,Close/Last,Volume,Open,High,Low
2022-01-05,1810.70,181234,1814.60,1830.50,1808.00
2022-01-04,1814.60,n/a,1800.00,1817.00,1799.20
";

    #[test]
    fn test_volume_suffix() {
        assert_eq!(parse_volume("1.2K"), Some(1200.0));
        assert_eq!(parse_volume("0.35M"), Some(350_000.0));
        assert_eq!(parse_volume("1,500"), Some(1500.0));
        assert_eq!(parse_volume(""), None);
        assert_eq!(parse_volume("   "), None);
        assert_eq!(parse_volume("-"), None);
    }

    #[test]
    fn test_number_strips_thousands_separator() {
        assert_eq!(parse_number("1,814.60"), Some(1814.6));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn test_change_pct() {
        assert_eq!(parse_change_pct("-1.52%"), Some(-1.52));
        assert_eq!(derive_change_pct(110.0, 100.0), 10.0);
        assert_eq!(derive_change_pct(1814.6, 1800.0), 0.81);
        assert_eq!(derive_change_pct(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_investing_layout() {
        let series = CsvSeriesLoader::parse_reader(INVESTING_CSV.as_bytes(), "gold.csv").unwrap();
        assert_eq!(series.len(), 2);

        let first = series.get(0).unwrap();
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2022, 1, 3).unwrap());
        assert_eq!(first.price, 1801.9);
        assert_eq!(first.volume, None);
        assert_eq!(first.change_pct, -1.52);

        let second = series.get(1).unwrap();
        assert_eq!(second.volume, Some(1200.0));
        assert_eq!(second.change_pct, 0.7);
    }

    #[test]
    fn test_nasdaq_layout_derives_change() {
        let series = CsvSeriesLoader::parse_reader(NASDAQ_CSV.as_bytes(), "gold.csv").unwrap();
        assert_eq!(series.len(), 2);
        let first = series.get(0).unwrap();
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2022, 1, 4).unwrap());
        assert_eq!(first.volume, None);
        assert_eq!(first.change_pct, 0.81);
        assert_eq!(series.get(1).unwrap().volume, Some(181234.0));
    }

    #[test]
    fn test_missing_column_is_load_error() {
        let csv = "Date,Open,High,Low\n01/01/2022,1,1,1\n";
        let err = CsvSeriesLoader::parse_reader(csv.as_bytes(), "broken.csv").unwrap_err();
        assert!(matches!(err, ForecastError::DataLoad { .. }));
    }

    #[test]
    fn test_no_usable_rows_is_load_error() {
        let csv = "Date,Price,Open,High,Low\nnot-a-date,1,1,1,1\n";
        let err = CsvSeriesLoader::parse_reader(csv.as_bytes(), "empty.csv").unwrap_err();
        assert!(err.to_string().contains("no usable rows"));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let loader = CsvSeriesLoader::new("/definitely/not/here.csv");
        assert!(matches!(loader.load(), Err(ForecastError::DataLoad { .. })));
    }
}
