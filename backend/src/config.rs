//! Import configuration.
//!
//! Options can be built in code, deserialized, or read from the environment
//! (a `.env` file is loaded first if present):
//!
//! | Variable                  | Values                      | Default        |
//! |---------------------------|-----------------------------|----------------|
//! | `ORGLOAD_DELIMITER`       | single character            | auto-detect    |
//! | `ORGLOAD_ENCODING`        | `utf8`, `auto`              | `utf8`         |
//! | `ORGLOAD_CONFLICT_POLICY` | `skip`, `reject`            | `skip`         |
//! | `ORGLOAD_ROW_ERRORS`      | `import-valid`, `reject-all`| `import-valid` |

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};

/// How input bytes are turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Strict UTF-8; invalid bytes make the file malformed.
    #[default]
    Utf8,
    /// Detect the charset and decode (Latin-1, Windows-1252 exports).
    Auto,
}

/// What to do when an organization's registration number already exists in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Keep the stored row and attach new addresses to it.
    #[default]
    Skip,
    /// Treat the conflict as a failed record and roll back the batch.
    Reject,
}

/// What to do with the valid rows of a file that also has invalid rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowErrorPolicy {
    /// Write the valid rows and report the invalid ones.
    #[default]
    ImportValid,
    /// Write nothing if any row is invalid.
    RejectAll,
}

/// Options for one import.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportOptions {
    /// Column delimiter; detected from the header line when not set.
    pub delimiter: Option<char>,
    pub encoding: EncodingMode,
    pub conflict_policy: ConflictPolicy,
    pub row_errors: RowErrorPolicy,
}

impl ImportOptions {
    /// Read options from `ORGLOAD_*` environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();

        let mut options = Self::default();

        if let Some(value) = read_var("ORGLOAD_DELIMITER") {
            options.delimiter = Some(parse_delimiter("ORGLOAD_DELIMITER", &value)?);
        }
        if let Some(value) = read_var("ORGLOAD_ENCODING") {
            options.encoding = parse_var("ORGLOAD_ENCODING", &value)?;
        }
        if let Some(value) = read_var("ORGLOAD_CONFLICT_POLICY") {
            options.conflict_policy = parse_var("ORGLOAD_CONFLICT_POLICY", &value)?;
        }
        if let Some(value) = read_var("ORGLOAD_ROW_ERRORS") {
            options.row_errors = parse_var("ORGLOAD_ROW_ERRORS", &value)?;
        }

        Ok(options)
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_encoding(mut self, encoding: EncodingMode) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn with_row_errors(mut self, policy: RowErrorPolicy) -> Self {
        self.row_errors = policy;
        self
    }
}

impl FromStr for EncodingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Self::Utf8),
            "auto" => Ok(Self::Auto),
            _ => Err("expected 'utf8' or 'auto'".to_string()),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "reject" => Ok(Self::Reject),
            _ => Err("expected 'skip' or 'reject'".to_string()),
        }
    }
}

impl FromStr for RowErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "import-valid" => Ok(Self::ImportValid),
            "reject-all" => Ok(Self::RejectAll),
            _ => Err("expected 'import-valid' or 'reject-all'".to_string()),
        }
    }
}

/// Parse a delimiter value; `\t` and `tab` stand for a tab.
pub fn parse_delimiter(key: &str, value: &str) -> ConfigResult<char> {
    let delimiter = match value {
        "\\t" | "tab" | "TAB" => '\t',
        _ => {
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => return Err(invalid(key, value, "expected a single character")),
            }
        }
    };

    if !delimiter.is_ascii() {
        return Err(invalid(key, value, "delimiter must be an ASCII character"));
    }

    Ok(delimiter)
}

fn read_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr<Err = String>>(key: &str, value: &str) -> ConfigResult<T> {
    value.parse().map_err(|message| invalid(key, value, message))
}

fn invalid(key: &str, value: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        message: message.into(),
    }
}
