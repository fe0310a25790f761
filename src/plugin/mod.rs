//! Host contract
//!
//! The types a query host uses to drive table functions: column types, the
//! per-query context (equality quals, limit, projection) and the row stream.

mod column;
mod query;
mod stream;

pub use column::ColumnType;
pub use query::{Qual, QueryContext};
pub use stream::{collect_rows, Row, RowSender};
