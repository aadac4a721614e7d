//! Collector: reads every row, validates it and builds the deduplicated batch.
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────────────────┐
//! │ Header check │───▶│ Row validate │───▶│ organizations (1st wins) │
//! └──────────────┘    │  (per line)  │    │ addresses (all rows)     │
//!                     └──────────────┘    │ errors (file order)      │
//!                                         └──────────────────────────┘
//! ```
//!
//! The reader never touches storage, so it can be run as often as needed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

use super::headers::{ColumnIndex, HeaderValidator};
use super::row::{RowOutcome, RowValidator};
use crate::api::logs::{log_info, log_info_indent, log_line_error, log_success, log_warning};
use crate::config::ImportOptions;
use crate::error::{ImportError, ImportResult};
use crate::models::{ImportRow, NewAddress, NewOrganization, RowError};
use crate::parser::{open_csv, prepare_source, Source};

/// Maximum number of per-line errors echoed to the log.
const LOGGED_ERROR_LIMIT: usize = 5;

/// Everything collected from one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadOutput {
    /// One per distinct registration number, in first-seen order.
    pub organizations: Vec<NewOrganization>,
    /// One per valid row, in file order.
    pub addresses: Vec<NewAddress>,
    /// One per invalid row, in file order; a single line-0 entry on structural failure.
    pub errors: Vec<RowError>,
}

impl ReadOutput {
    fn structural(error: RowError) -> Self {
        Self {
            organizations: Vec::new(),
            addresses: Vec::new(),
            errors: vec![error],
        }
    }

    pub fn is_structural_failure(&self) -> bool {
        self.errors.iter().any(RowError::is_structural)
    }
}

/// Reads a source into a [`ReadOutput`].
pub struct Reader<'a> {
    source: &'a Source,
    options: &'a ImportOptions,
    now: DateTime<Utc>,
}

impl<'a> Reader<'a> {
    pub fn new(source: &'a Source, options: &'a ImportOptions, now: DateTime<Utc>) -> Self {
        Self {
            source,
            options,
            now,
        }
    }

    /// Collect the batch.
    ///
    /// Structural failures are folded into a single line-0 error with empty
    /// record sets. I/O failures are returned as errors.
    pub fn perform(&self) -> ImportResult<ReadOutput> {
        log_info(format!("📖 Reading {}", self.source.describe()));

        match self.validate_and_collect() {
            Ok(output) => Ok(output),
            Err(ImportError::Structural(err)) => {
                log_warning(format!("Malformed CSV file: {}", err));
                Ok(ReadOutput::structural(RowError::structural(err)))
            }
            Err(err) => Err(err),
        }
    }

    fn validate_and_collect(&self) -> ImportResult<ReadOutput> {
        let prepared = prepare_source(self.source, self.options)?;
        let (source, options) = (&*prepared.source, &prepared.options);

        HeaderValidator::new(source, options).validate()?;
        log_success("Required headers present");

        let input = open_csv(source, options)?;
        log_info_indent(
            format!(
                "Encoding: {}, delimiter: '{}'",
                prepared.encoding,
                input.delimiter.escape_default()
            ),
            1,
        );
        let mut reader = input.into_csv_reader();
        let headers = reader.headers().map_err(ImportError::from_csv)?.clone();
        let columns = ColumnIndex::from_headers(&headers)?;

        let mut collector = Collector::default();
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(ImportError::from_csv)?;
            let row = ImportRow::from_record(idx + 1, &record, &columns);
            collector.process(RowValidator::new(&row, self.now).validate());
        }
        reader.get_ref().ensure_closed()?;

        let output = collector.finish();
        log_read_summary(&output);
        Ok(output)
    }
}

/// Accumulates validated rows, deduplicating organizations by registration number.
#[derive(Default)]
struct Collector {
    seen: HashSet<String>,
    output: ReadOutput,
    rows: usize,
}

impl Collector {
    fn process(&mut self, outcome: RowOutcome) {
        self.rows += 1;

        match outcome {
            RowOutcome::Valid {
                organization,
                address,
            } => {
                if self.seen.insert(organization.registration_number.clone()) {
                    self.output.organizations.push(organization);
                }
                self.output.addresses.push(address);
            }
            RowOutcome::Invalid(error) => self.output.errors.push(error),
        }
    }

    fn finish(self) -> ReadOutput {
        log_success(format!("Read {} rows", self.rows));
        self.output
    }
}

fn log_read_summary(output: &ReadOutput) {
    let valid = output.addresses.len();
    let folded = valid - output.organizations.len();

    log_success(format!(
        "{} valid rows, {} organizations",
        valid,
        output.organizations.len()
    ));
    if folded > 0 {
        log_info_indent(
            format!("{} rows share a registration number with an earlier row", folded),
            1,
        );
    }

    if !output.errors.is_empty() {
        log_warning(format!("{} invalid rows", output.errors.len()));
        for err in output.errors.iter().take(LOGGED_ERROR_LIMIT) {
            log_line_error(err.line, err.errors.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    const HEADER: &str = "name,registration_number,street,city,postal_code,country\n";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 20, 14, 39, 36).unwrap()
    }

    fn read(csv: &str) -> ReadOutput {
        let source = Source::bytes(csv);
        let options = ImportOptions::default();
        Reader::new(&source, &options, now()).perform().unwrap()
    }

    #[test]
    fn test_valid_rows() {
        let output = read(&format!(
            "{HEADER}Example Co,123456789,123 Main St,New York,10001,USA\n\
             Another Co,987654321,789 Oak St,Chicago,60601,USA\n"
        ));

        assert!(output.errors.is_empty());
        let names: Vec<_> = output.organizations.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Example Co", "Another Co"]);

        let cities: Vec<_> = output.addresses.iter().map(|a| a.city.as_str()).collect();
        assert_eq!(cities, vec!["New York", "Chicago"]);
        assert_eq!(output.addresses[1].registration_number, "987654321");
        assert_eq!(output.addresses[0].created_at, now());
    }

    #[test]
    fn test_first_occurrence_wins() {
        let output = read(&format!(
            "{HEADER}Acme,111,1 Rd,Metropolis,000,USA\n\
             Acme Renamed,111,2 Rd,Metropolis,000,USA\n\
             Bolt,222,3 Rd,Gotham,001,USA\n"
        ));

        assert_eq!(output.organizations.len(), 2);
        assert_eq!(output.organizations[0].name, "Acme");
        assert_eq!(output.organizations[1].name, "Bolt");

        let keys: Vec<_> = output
            .addresses
            .iter()
            .map(|a| (a.registration_number.as_str(), a.street.as_str()))
            .collect();
        assert_eq!(keys, vec![("111", "1 Rd"), ("111", "2 Rd"), ("222", "3 Rd")]);
    }

    #[test]
    fn test_invalid_rows_collected_others_kept() {
        let output = read(&format!(
            "{HEADER},123456789,123 Main St,,10001,USA\n\
             Bolt,222,3 Rd,Gotham,001,USA\n\
             Short,333\n"
        ));

        assert_eq!(
            output.errors,
            vec![
                RowError::new(
                    1,
                    vec!["Name can't be blank".into(), "City can't be blank".into()]
                ),
                RowError::new(
                    3,
                    vec![
                        "Street can't be blank".into(),
                        "City can't be blank".into(),
                        "Country can't be blank".into(),
                    ]
                ),
            ]
        );
        assert_eq!(output.organizations.len(), 1);
        assert_eq!(output.addresses.len(), 1);
        assert!(!output.is_structural_failure());
    }

    #[test]
    fn test_missing_headers_structural() {
        let output = read("name,registration_number,street\nAcme,111,1 Rd\n");

        assert!(output.organizations.is_empty());
        assert!(output.addresses.is_empty());
        assert_eq!(
            output.errors,
            vec![RowError::new(
                0,
                vec!["Malformed CSV file: Missing required headers: city, postal_code, country"
                    .into()]
            )]
        );
        assert!(output.is_structural_failure());
    }

    #[test]
    fn test_invalid_utf8_discards_everything() {
        let mut bytes = format!("{HEADER}Acme,111,1 Rd,Metropolis,000,USA\n,,,,,\n").into_bytes();
        bytes.extend_from_slice(b"Bad\xff,222,3 Rd,Gotham,001,USA\n");

        let source = Source::bytes(bytes);
        let options = ImportOptions::default();
        let output = Reader::new(&source, &options, now()).perform().unwrap();

        assert!(output.organizations.is_empty());
        assert!(output.addresses.is_empty());
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].line, 0);
        assert!(output.errors[0].errors[0].starts_with("Malformed CSV file: "));
    }

    #[test]
    fn test_semicolon_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "name;registration_number;street;city;postal_code;country\n\
             Société Générale;552120222;29 Bd Haussmann;Paris;75009;France\n"
        )
        .unwrap();

        let source = Source::path(file.path());
        let options = ImportOptions::default();
        let output = Reader::new(&source, &options, now()).perform().unwrap();

        assert!(output.errors.is_empty());
        assert_eq!(output.organizations[0].name, "Société Générale");
        assert_eq!(output.addresses[0].postal_code.as_deref(), Some("75009"));
    }

    #[test]
    fn test_non_existent_file_is_error() {
        let source = Source::path("non_existent_file.csv");
        let options = ImportOptions::default();
        let result = Reader::new(&source, &options, now()).perform();

        assert!(matches!(result, Err(ImportError::Io(_))));
    }

    #[test]
    fn test_unclosed_quote_discards_everything() {
        let output = read(&format!(
            "{HEADER}\"Acme,111,1 Rd,Metropolis,000,USA\n\
             Bolt,222,3 Rd,Gotham,001,USA\n"
        ));

        assert!(output.organizations.is_empty());
        assert!(output.addresses.is_empty());
        assert_eq!(
            output.errors,
            vec![RowError::new(
                0,
                vec!["Malformed CSV file: Unclosed quoted field in line 2".into()]
            )]
        );
    }

    #[test]
    fn test_quoted_fields_with_delimiters_and_newlines() {
        let output = read(&format!(
            "{HEADER}\"Acme, Inc.\",111,\"1 Rd\nSuite 2\",Metropolis,000,USA\n\
             Bolt,222,3 Rd,Gotham,001,USA\n"
        ));

        assert!(output.errors.is_empty());
        assert_eq!(output.organizations[0].name, "Acme, Inc.");
        assert_eq!(output.addresses[0].street, "1 Rd\nSuite 2");
        assert_eq!(output.organizations[1].name, "Bolt");
    }
}
