//! Column and region constants shared by the loader and the cleaning transforms.

// Columns the step reads; every input file must carry them
pub const PRICE_COLUMN: &str = "price";
pub const LONGITUDE_COLUMN: &str = "longitude";
pub const LATITUDE_COLUMN: &str = "latitude";
pub const LAST_REVIEW_COLUMN: &str = "last_review";

pub const REQUIRED_COLUMNS: [&str; 4] = [
    PRICE_COLUMN,
    LONGITUDE_COLUMN,
    LATITUDE_COLUMN,
    LAST_REVIEW_COLUMN,
];

// Bounding box for New York City listings (inclusive on every edge)
pub const MIN_LONGITUDE: f64 = -74.25;
pub const MAX_LONGITUDE: f64 = -73.50;
pub const MIN_LATITUDE: f64 = 40.5;
pub const MAX_LATITUDE: f64 = 41.2;

/// Canonical on-disk form of a normalized `last_review` value
pub const REVIEW_DATE_FORMAT: &str = "%Y-%m-%d";

// Run defaults
pub const DEFAULT_JOB_TYPE: &str = "basic_cleaning";
pub const DEFAULT_PROJECT: &str = "nyc_airbnb";
pub const DEFAULT_PREVIEW_ROWS: usize = 5;
pub const UPLOAD_JOB_TYPE: &str = "upload";

/// Alias that always follows the newest version of an artifact
pub const LATEST_ALIAS: &str = "latest";
