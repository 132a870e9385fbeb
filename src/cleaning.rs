//! Row filters and the `last_review` normalization.
//!
//! A cell only passes a range check when it parses to a real number inside the
//! closed interval. Empty, non-numeric and NaN cells never pass.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::constants::{
    LAST_REVIEW_COLUMN, LATITUDE_COLUMN, LONGITUDE_COLUMN, MAX_LATITUDE, MAX_LONGITUDE,
    MIN_LATITUDE, MIN_LONGITUDE, PRICE_COLUMN, REVIEW_DATE_FORMAT,
};
use crate::dataset::Table;
use crate::error::Result;

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

// %B and %b both accept full and abbreviated month names when parsing
const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%Y%m%d",
    "%d %B %Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
];

/// Parses a numeric cell. `None` for anything that is not a number.
pub fn parse_numeric(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Closed-interval membership of a numeric cell.
pub fn within(cell: &str, min: f64, max: f64) -> bool {
    match parse_numeric(cell) {
        Some(v) => v >= min && v <= max,
        None => false,
    }
}

/// Keeps rows whose price lies in `[min_price, max_price]`. Returns rows dropped.
pub fn filter_price_range(table: &mut Table, min_price: f64, max_price: f64) -> Result<usize> {
    let price = table.require_column(PRICE_COLUMN)?;
    Ok(table.retain_rows(|row| within(&row[price], min_price, max_price)))
}

/// Keeps rows inside the fixed longitude/latitude bounding box. Returns rows dropped.
pub fn filter_bounding_box(table: &mut Table) -> Result<usize> {
    let lon = table.require_column(LONGITUDE_COLUMN)?;
    let lat = table.require_column(LATITUDE_COLUMN)?;
    Ok(table.retain_rows(|row| {
        within(&row[lon], MIN_LONGITUDE, MAX_LONGITUDE)
            && within(&row[lat], MIN_LATITUDE, MAX_LATITUDE)
    }))
}

/// Best-effort date parse. Timestamps keep their calendar date in the offset
/// they were written in.
pub fn parse_review_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok().map(|dt| dt.date()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        })
}

/// Rewrites `last_review` as `YYYY-MM-DD`, or an empty cell when the value
/// cannot be read as a date. Returns how many non-empty values were nulled.
pub fn normalize_review_dates(table: &mut Table) -> Result<usize> {
    let column = table.require_column(LAST_REVIEW_COLUMN)?;
    let mut nulled = 0;
    table.map_column(column, |cell| match parse_review_date(cell) {
        Some(date) => date.format(REVIEW_DATE_FORMAT).to_string(),
        None => {
            if !cell.trim().is_empty() {
                nulled += 1;
            }
            String::new()
        }
    });
    Ok(nulled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[[&str; 4]]) -> Table {
        Table::new(
            vec![
                "price".to_string(),
                "longitude".to_string(),
                "latitude".to_string(),
                "last_review".to_string(),
            ],
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn numeric_parsing_rejects_blanks_and_nan() {
        assert_eq!(parse_numeric(" 150 "), Some(150.0));
        assert_eq!(parse_numeric("1e3"), Some(1000.0));
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("NaN"), None);
        assert_eq!(parse_numeric("$150"), None);
    }

    #[test]
    fn price_bounds_are_inclusive() {
        let mut t = table(&[
            ["10", "-73.9", "40.7", ""],
            ["1000", "-73.9", "40.7", ""],
            ["9.99", "-73.9", "40.7", ""],
            ["1000.01", "-73.9", "40.7", ""],
            ["", "-73.9", "40.7", ""],
        ]);
        let dropped = filter_price_range(&mut t, 10.0, 1000.0).unwrap();
        assert_eq!(dropped, 3);
        let prices: Vec<&str> = t.rows().iter().map(|r| r[0].as_str()).collect();
        assert_eq!(prices, vec!["10", "1000"]);
    }

    #[test]
    fn inverted_price_range_keeps_nothing() {
        let mut t = table(&[["50", "-73.9", "40.7", ""]]);
        filter_price_range(&mut t, 100.0, 10.0).unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn bounding_box_edges_are_inclusive() {
        let mut t = table(&[
            ["1", "-74.25", "40.5", ""],
            ["1", "-73.50", "41.2", ""],
            ["1", "-74.26", "40.7", ""],
            ["1", "-73.9", "41.21", ""],
            ["1", "-73.9", "", ""],
        ]);
        let dropped = filter_bounding_box(&mut t).unwrap();
        assert_eq!(dropped, 3);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn parses_common_date_shapes() {
        let expected = NaiveDate::from_ymd_opt(2019, 5, 21).unwrap();
        for raw in [
            "2019-05-21",
            "2019/05/21",
            "05/21/2019",
            "2019-05-21 13:45:00",
            "2019-05-21T13:45:00",
            "2019-05-21T13:45:00+02:00",
            "21 May 2019",
            "2019-05-21 13:45",
            "2019-05-21T13:45",
            "20190521",
            "May 21 2019",
            "May 21, 2019",
        ] {
            assert_eq!(parse_review_date(raw), Some(expected), "{raw}");
        }
        let august = NaiveDate::from_ymd_opt(2019, 8, 3);
        assert_eq!(parse_review_date("Aug 3 2019"), august);
        assert_eq!(parse_review_date("August 3 2019"), august);
        assert_eq!(parse_review_date("20190803"), august);
        assert_eq!(parse_review_date("not-a-date"), None);
        assert_eq!(parse_review_date("2019-02-30"), None);
        assert_eq!(parse_review_date("  "), None);
    }

    #[test]
    fn normalization_nulls_bad_dates_without_failing() {
        let mut t = table(&[
            ["1", "-73.9", "40.7", "2019/01/01"],
            ["1", "-73.9", "40.7", "not-a-date"],
            ["1", "-73.9", "40.7", ""],
        ]);
        let nulled = normalize_review_dates(&mut t).unwrap();
        assert_eq!(nulled, 1);
        let dates: Vec<&str> = t.rows().iter().map(|r| r[3].as_str()).collect();
        assert_eq!(dates, vec!["2019-01-01", "", ""]);
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut t = table(&[["1", "-73.9", "40.7", "05/21/2019"]]);
        normalize_review_dates(&mut t).unwrap();
        let once = t.clone();
        normalize_review_dates(&mut t).unwrap();
        assert_eq!(t, once);
    }
}
