//! Header validation: confirm the column schema before any row is read.

use std::collections::HashMap;

use crate::config::ImportOptions;
use crate::error::{ImportError, ImportResult, StructuralError};
use crate::parser::{normalize_header, open_csv, Source};

/// Columns every import file must carry, in reporting order.
pub const REQUIRED_HEADERS: [&str; 6] = [
    "name",
    "registration_number",
    "street",
    "city",
    "postal_code",
    "country",
];

/// Checks the header row of a source.
pub struct HeaderValidator<'a> {
    source: &'a Source,
    options: &'a ImportOptions,
}

impl<'a> HeaderValidator<'a> {
    pub fn new(source: &'a Source, options: &'a ImportOptions) -> Self {
        Self { source, options }
    }

    /// Read only the header row and fail if a required column is missing.
    pub fn validate(&self) -> ImportResult<()> {
        let mut reader = open_csv(self.source, self.options)?.into_csv_reader();
        let headers = reader.headers().map_err(ImportError::from_csv)?.clone();
        reader.get_ref().ensure_closed()?;

        ColumnIndex::from_headers(&headers)?;
        Ok(())
    }
}

/// Position of each required column in a header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnIndex {
    positions: HashMap<&'static str, usize>,
}

impl ColumnIndex {
    /// Map required columns to positions; the first occurrence of a repeated header wins.
    ///
    /// Missing columns are reported together, in [`REQUIRED_HEADERS`] order.
    pub fn from_headers(headers: &csv::StringRecord) -> Result<Self, StructuralError> {
        let normalized: Vec<String> = headers.iter().map(normalize_header).collect();
        let mut positions = HashMap::new();
        let mut missing = Vec::new();

        for required in REQUIRED_HEADERS {
            match normalized.iter().position(|h| h == required) {
                Some(idx) => {
                    positions.insert(required, idx);
                }
                None => missing.push(required.to_string()),
            }
        }

        if missing.is_empty() {
            Ok(Self { positions })
        } else {
            Err(StructuralError::MissingHeaders(missing))
        }
    }

    /// Cell for `column`, or `None` when the record is too short.
    pub fn get<'r>(&self, record: &'r csv::StringRecord, column: &str) -> Option<&'r str> {
        self.positions.get(column).and_then(|&idx| record.get(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(csv: &str) -> ImportResult<()> {
        let source = Source::bytes(csv);
        let options = ImportOptions::default();
        HeaderValidator::new(&source, &options).validate()
    }

    #[test]
    fn test_valid_headers() {
        assert!(validate("name,registration_number,street,city,postal_code,country\n").is_ok());
    }

    #[test]
    fn test_order_and_extra_columns_ignored() {
        let csv = "country,notes,city,street,Postal_Code,registration_number, Name \n";
        assert!(validate(csv).is_ok());
    }

    #[test]
    fn test_missing_headers_listed_together() {
        let err = validate("name,registration_number,street,postal_code\nA,1,S,0\n").unwrap_err();

        match err {
            ImportError::Structural(StructuralError::MissingHeaders(missing)) => {
                assert_eq!(missing, vec!["city", "country"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_file_misses_everything() {
        let err = validate("").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed CSV file: Missing required headers: name, registration_number, street, city, postal_code, country"
        );
    }

    #[test]
    fn test_absent_file_is_io_error() {
        let source = Source::path("/no/such/dir/companies.csv");
        let options = ImportOptions::default();
        let err = HeaderValidator::new(&source, &options).validate().unwrap_err();
        assert!(matches!(err, ImportError::Io(_)));
    }

    #[test]
    fn test_column_index_lookup() {
        let headers = csv::StringRecord::from(vec![
            "city", "name", "registration_number", "street", "postal_code", "country",
        ]);
        let index = ColumnIndex::from_headers(&headers).unwrap();
        let record = csv::StringRecord::from(vec!["Gotham", "Bolt", "222"]);

        assert_eq!(index.get(&record, "city"), Some("Gotham"));
        assert_eq!(index.get(&record, "name"), Some("Bolt"));
        assert_eq!(index.get(&record, "country"), None);
    }

    #[test]
    fn test_unclosed_quote_in_header_is_malformed() {
        let err = validate("name,\"registration_number,street\nAcme,111,1 Rd\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed CSV file: Unclosed quoted field in line 1"
        );
    }
}
