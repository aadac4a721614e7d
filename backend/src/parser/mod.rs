//! CSV source handling with encoding and delimiter detection.
//!
//! Opens an input (file path or uploaded bytes) as a `csv::Reader`.
//! No organization-specific logic here.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use crate::config::{EncodingMode, ImportOptions};
use crate::error::{ImportError, ImportResult, StructuralError};

/// Delimiters considered by auto-detection, in tie-break order.
const CANDIDATE_DELIMITERS: [char; 4] = [',', ';', '\t', '|'];

/// Size of the read buffer; the header line is sniffed from its first fill.
const READ_BUFFER_CAPACITY: usize = 64 * 1024;

/// Where the CSV content comes from.
#[derive(Debug, Clone)]
pub enum Source {
    /// A file on disk, opened on each pass.
    Path(PathBuf),
    /// An in-memory upload.
    Bytes(Vec<u8>),
}

impl Source {
    pub fn path(path: impl AsRef<Path>) -> Self {
        Source::Path(path.as_ref().to_path_buf())
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Source::Bytes(bytes.into())
    }

    /// Open a fresh reader positioned at the start of the content.
    pub fn open(&self) -> std::io::Result<Box<dyn Read + '_>> {
        match self {
            Source::Path(path) => Ok(Box::new(File::open(path)?)),
            Source::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.as_slice()))),
        }
    }

    /// Short label for logs.
    pub fn describe(&self) -> String {
        match self {
            Source::Path(path) => path.display().to_string(),
            Source::Bytes(bytes) => format!("<upload, {} bytes>", bytes.len()),
        }
    }
}

/// A source ready for repeated passes.
///
/// With [`EncodingMode::Auto`] the content is read and decoded once; the header
/// check and the row pass then both read the UTF-8 copy.
pub struct PreparedSource<'a> {
    pub source: Cow<'a, Source>,
    pub options: ImportOptions,
    /// Charset the input was read as.
    pub encoding: String,
}

/// Decode a source up front when its encoding has to be detected.
pub fn prepare_source<'a>(
    source: &'a Source,
    options: &ImportOptions,
) -> ImportResult<PreparedSource<'a>> {
    match options.encoding {
        EncodingMode::Utf8 => Ok(PreparedSource {
            source: Cow::Borrowed(source),
            options: options.clone(),
            encoding: "utf-8".to_string(),
        }),
        EncodingMode::Auto => {
            let mut bytes = Vec::new();
            source.open()?.read_to_end(&mut bytes)?;

            let (content, encoding) = decode_detected(&bytes)?;
            Ok(PreparedSource {
                source: Cow::Owned(Source::Bytes(content.into_bytes())),
                options: options.clone().with_encoding(EncodingMode::Utf8),
                encoding,
            })
        }
    }
}

/// Opened CSV content with the delimiter used to read it.
pub struct CsvInput<'a> {
    pub reader: Box<dyn Read + 'a>,
    pub delimiter: char,
}

impl<'a> CsvInput<'a> {
    /// Build a header-aware, flexible CSV reader (short rows are allowed).
    ///
    /// The input is wrapped in a [`QuoteGuard`]; call
    /// [`QuoteGuard::ensure_closed`] through `get_ref()` once reading stops.
    pub fn into_csv_reader(self) -> csv::Reader<QuoteGuard<Box<dyn Read + 'a>>> {
        let guard = QuoteGuard::new(self.reader, self.delimiter as u8);
        csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(self.delimiter as u8)
            .from_reader(guard)
    }
}

/// Open a source according to the encoding and delimiter options.
pub fn open_csv<'a>(source: &'a Source, options: &ImportOptions) -> ImportResult<CsvInput<'a>> {
    let mut buffered = BufReader::with_capacity(READ_BUFFER_CAPACITY, source.open()?);

    match options.encoding {
        EncodingMode::Utf8 => {
            let delimiter = match options.delimiter {
                Some(d) => d,
                None => {
                    let head = buffered.fill_buf()?;
                    detect_delimiter(&String::from_utf8_lossy(head))
                }
            };
            Ok(CsvInput {
                reader: Box::new(buffered),
                delimiter,
            })
        }
        EncodingMode::Auto => {
            let mut bytes = Vec::new();
            buffered.read_to_end(&mut bytes)?;

            let (content, _) = decode_detected(&bytes)?;
            let delimiter = options
                .delimiter
                .unwrap_or_else(|| detect_delimiter(&content));

            Ok(CsvInput {
                reader: Box::new(Cursor::new(content.into_bytes())),
                delimiter,
            })
        }
    }
}

/// Detect the charset of `bytes` and decode them.
fn decode_detected(bytes: &[u8]) -> ImportResult<(String, String)> {
    // chardet can label short Latin-1 files as UTF-8
    let encoding = match detect_encoding(bytes) {
        e if e == "utf-8" && std::str::from_utf8(bytes).is_err() => "windows-1252".to_string(),
        e => e,
    };
    let content = decode_content(bytes, &encoding)?;
    Ok((content, encoding))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    /// A quote seen inside a quoted field: either an escape or the closing quote.
    QuoteInQuoted,
}

/// Read adapter that follows CSV quoting as bytes pass through.
///
/// The csv reader accepts a quoted field left open at end of input and returns
/// the remaining content as one field. The guard remembers where that field
/// opened so the caller can reject the file instead.
pub struct QuoteGuard<R> {
    inner: R,
    delimiter: u8,
    state: QuoteState,
    line: usize,
    opened_at: usize,
    eof: bool,
}

impl<R: Read> QuoteGuard<R> {
    pub fn new(inner: R, delimiter: u8) -> Self {
        Self {
            inner,
            delimiter,
            state: QuoteState::FieldStart,
            line: 1,
            opened_at: 0,
            eof: false,
        }
    }

    /// Fails when the input ended inside a quoted field.
    pub fn ensure_closed(&self) -> Result<(), StructuralError> {
        if self.eof && self.state == QuoteState::Quoted {
            return Err(StructuralError::Malformed(format!(
                "Unclosed quoted field in line {}",
                self.opened_at
            )));
        }
        Ok(())
    }

    fn scan(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if b == b'\n' {
                self.line += 1;
            }
            let ends_field = b == self.delimiter || b == b'\n' || b == b'\r';

            self.state = match self.state {
                QuoteState::FieldStart if b == b'"' => {
                    self.opened_at = self.line;
                    QuoteState::Quoted
                }
                QuoteState::FieldStart | QuoteState::Unquoted if ends_field => {
                    QuoteState::FieldStart
                }
                QuoteState::FieldStart | QuoteState::Unquoted => QuoteState::Unquoted,
                QuoteState::Quoted if b == b'"' => QuoteState::QuoteInQuoted,
                QuoteState::Quoted => QuoteState::Quoted,
                QuoteState::QuoteInQuoted if b == b'"' => QuoteState::Quoted,
                QuoteState::QuoteInQuoted if ends_field => QuoteState::FieldStart,
                QuoteState::QuoteInQuoted => QuoteState::Unquoted,
            };
        }
    }
}

impl<R: Read> Read for QuoteGuard<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.eof = true;
        }
        self.scan(&buf[..n]);
        Ok(n)
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to a string using the named encoding.
///
/// Unknown charsets fall back to lossy UTF-8; a "utf-8" label on bytes that
/// are not UTF-8 is an error.
pub fn decode_content(bytes: &[u8], encoding: &str) -> ImportResult<String> {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8(bytes.to_vec()).map_err(|e| {
            ImportError::from(StructuralError::Malformed(format!(
                "Invalid UTF-8 content: {}",
                e
            )))
        }),
        "iso-8859-1" | "latin-1" | "latin1" => {
            Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned())
        }
        "windows-1252" | "cp1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()),
        _ => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Detect the delimiter by counting occurrences in the first line.
///
/// Comma wins ties and is the answer when no candidate appears.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = CANDIDATE_DELIMITERS[0];
    let mut best_count = 0;

    for &sep in &CANDIDATE_DELIMITERS {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Canonical form of a header cell: no BOM, trimmed, ASCII-lowercased.
pub fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(source: &Source, options: &ImportOptions) -> (char, Vec<Vec<String>>) {
        let input = open_csv(source, options).unwrap();
        let delimiter = input.delimiter;
        let mut reader = input.into_csv_reader();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        (delimiter, rows)
    }

    #[test]
    fn test_detect_delimiter_comma() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
    }

    #[test]
    fn test_detect_delimiter_semicolon() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
    }

    #[test]
    fn test_detect_delimiter_tab() {
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
    }

    #[test]
    fn test_detect_delimiter_defaults_to_comma() {
        assert_eq!(detect_delimiter("name"), ',');
        assert_eq!(detect_delimiter(""), ',');
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_strict_utf8_label_rejects_invalid_bytes() {
        assert!(decode_content(&[0xff, 0xfe, 0x41], "utf-8").is_err());
    }

    #[test]
    fn test_open_bytes_detects_semicolon() {
        let source = Source::bytes("name;city\nAcme;Metropolis\n");
        let (delimiter, rows) = read_all(&source, &ImportOptions::default());

        assert_eq!(delimiter, ';');
        assert_eq!(rows, vec![vec!["Acme", "Metropolis"]]);
    }

    #[test]
    fn test_explicit_delimiter_wins() {
        let source = Source::bytes("a;b|c\n1;2|3\n");
        let options = ImportOptions::default().with_delimiter('|');
        let (delimiter, rows) = read_all(&source, &options);

        assert_eq!(delimiter, '|');
        assert_eq!(rows, vec![vec!["1;2", "3"]]);
    }

    #[test]
    fn test_short_rows_are_allowed() {
        let source = Source::bytes("a,b,c\n1,2\n");
        let (_, rows) = read_all(&source, &ImportOptions::default());
        assert_eq!(rows, vec![vec!["1", "2"]]);
    }

    #[test]
    fn test_open_missing_file_is_io_error() {
        let source = Source::path("/definitely/not/here.csv");
        let result = open_csv(&source, &ImportOptions::default());
        assert!(matches!(result, Err(ImportError::Io(_))));
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("\u{feff} Name "), "name");
        assert_eq!(normalize_header("Registration_Number"), "registration_number");
    }

    fn guard_after_reading(content: &str) -> Result<(), StructuralError> {
        let mut guard = QuoteGuard::new(content.as_bytes(), b',');
        std::io::copy(&mut guard, &mut std::io::sink()).unwrap();
        guard.ensure_closed()
    }

    #[test]
    fn test_quote_guard_accepts_balanced_quoting() {
        assert!(guard_after_reading("a,b\n\"x, y\",\"say \"\"hi\"\"\"\n").is_ok());
        assert!(guard_after_reading("a,b\n\"multi\nline\",2\n").is_ok());
        assert!(guard_after_reading("a,b\nab\"c,2\n").is_ok());
    }

    #[test]
    fn test_quote_guard_reports_open_field() {
        let err = guard_after_reading("a,b\n1,2\n\"open,3\n4,5\n").unwrap_err();
        assert_eq!(err.to_string(), "Unclosed quoted field in line 3");
    }

    #[test]
    fn test_quote_guard_waits_for_end_of_input() {
        let guard = QuoteGuard::new("\"open".as_bytes(), b',');
        assert!(guard.ensure_closed().is_ok());
    }

    #[test]
    fn test_prepare_source_decodes_auto_once() {
        let mut bytes = b"name,city\n".to_vec();
        bytes.extend_from_slice(b"Soci\xe9t\xe9 G\xe9n\xe9rale,Paris\n");
        let source = Source::bytes(bytes);
        let options = ImportOptions::default().with_encoding(EncodingMode::Auto);

        let prepared = prepare_source(&source, &options).unwrap();

        assert_eq!(prepared.options.encoding, EncodingMode::Utf8);
        assert_ne!(prepared.encoding, "utf-8");
        match &*prepared.source {
            Source::Bytes(content) => {
                let text = std::str::from_utf8(content).unwrap();
                assert!(text.starts_with("name,city\nSoci"));
            }
            Source::Path(_) => panic!("decoded content should be held in memory"),
        }
    }

    #[test]
    fn test_prepare_source_borrows_utf8() {
        let source = Source::bytes("name\n");
        let prepared = prepare_source(&source, &ImportOptions::default()).unwrap();
        assert!(matches!(prepared.source, Cow::Borrowed(_)));
        assert_eq!(prepared.encoding, "utf-8");
    }
}
