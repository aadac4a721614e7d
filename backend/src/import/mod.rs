//! Import pipeline: header check, row validation, dedup and the atomic write.
//!
//! - [`headers`] - required column check
//! - [`row`] - per-line validation
//! - [`reader`] - collection and first-wins dedup
//! - [`creator`] - transactional bulk write
//! - [`pipeline`] - the full import

pub mod creator;
pub mod headers;
pub mod pipeline;
pub mod reader;
pub mod row;

pub use creator::Creator;
pub use headers::{ColumnIndex, HeaderValidator, REQUIRED_HEADERS};
pub use pipeline::{check, import, ImportOutcome, ImportSummary};
pub use reader::{ReadOutput, Reader};
pub use row::{RowOutcome, RowValidator};
