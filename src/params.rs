use clap::Parser;
use serde::{Deserialize, Serialize};

/// Parameters of one cleaning run.
///
/// Every flag is required; the record is recorded verbatim as the run config,
/// keyed by the flag names.
#[derive(Parser, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[command(name = "basic_cleaning")]
#[command(about = "This step cleans the data")]
#[command(version)]
pub struct Parameters {
    /// Name of the artifact to do preprocessing on
    #[arg(long = "input_artifact")]
    #[serde(rename = "input_artifact")]
    pub input_artifact_ref: String,

    /// Name of the clean artifact
    #[arg(long = "output_artifact")]
    #[serde(rename = "output_artifact")]
    pub output_artifact_name: String,

    /// Type of the clean artifact (e.g. clean_sample)
    #[arg(long = "output_type")]
    pub output_type: String,

    /// Description of the preprocessed data
    #[arg(long = "output_description")]
    pub output_description: String,

    /// Min price considered for the prediction column
    #[arg(long = "min_price", allow_negative_numbers = true)]
    pub min_price: f64,

    /// Max price considered for the prediction column
    #[arg(long = "max_price", allow_negative_numbers = true)]
    pub max_price: f64,
}

impl Parameters {
    /// False when no row can possibly pass the price filter.
    pub fn has_satisfiable_price_range(&self) -> bool {
        self.min_price <= self.max_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv() -> Vec<&'static str> {
        vec![
            "basic_cleaning",
            "--input_artifact",
            "sample.csv:latest",
            "--output_artifact",
            "clean_sample.csv",
            "--output_type",
            "clean_sample",
            "--output_description",
            "Data with outliers and null values removed",
            "--min_price",
            "10",
            "--max_price",
            "350",
        ]
    }

    #[test]
    fn parses_all_flags() {
        let params = Parameters::try_parse_from(argv()).unwrap();
        assert_eq!(params.input_artifact_ref, "sample.csv:latest");
        assert_eq!(params.output_artifact_name, "clean_sample.csv");
        assert_eq!(params.output_type, "clean_sample");
        assert_eq!(params.min_price, 10.0);
        assert_eq!(params.max_price, 350.0);
        assert!(params.has_satisfiable_price_range());
    }

    #[test]
    fn every_flag_is_required() {
        let mut args = argv();
        // drop --max_price and its value
        args.truncate(args.len() - 2);
        assert!(Parameters::try_parse_from(args).is_err());
    }

    #[test]
    fn rejects_non_numeric_price() {
        let mut args = argv();
        let last = args.len() - 1;
        args[last] = "lots";
        assert!(Parameters::try_parse_from(args).is_err());
    }

    #[test]
    fn serializes_with_flag_names() {
        let params = Parameters::try_parse_from(argv()).unwrap();
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["input_artifact"], "sample.csv:latest");
        assert_eq!(value["output_artifact"], "clean_sample.csv");
        assert_eq!(value["max_price"], 350.0);
    }
}
