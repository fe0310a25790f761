//! Request-scoped query parameters handed to table functions

use anyhow::{bail, Result};
use serde_json::Value;

/// An equality constraint on one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qual {
    pub column: String,
    pub value: String,
}

impl Qual {
    pub fn new(column: &str, value: &str) -> Self {
        Self {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    /// Parse `column=value`. The value may itself contain `=`.
    pub fn parse(input: &str) -> Result<Self> {
        let Some((column, value)) = input.split_once('=') else {
            bail!("Expected column=value, got '{}'", input);
        };
        let column = column.trim();
        if column.is_empty() {
            bail!("Missing column name in '{}'", input);
        }
        Ok(Self::new(column, value.trim()))
    }

    /// Whether a row value satisfies this constraint
    pub fn matches(&self, value: &Value, case_insensitive: bool) -> bool {
        let text = match value {
            Value::Null => return false,
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if case_insensitive {
            text.eq_ignore_ascii_case(&self.value)
        } else {
            text == self.value
        }
    }
}

/// Quals, limit and projection for a single query
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub quals: Vec<Qual>,
    pub limit: Option<usize>,
    /// Projected columns; `None` means all
    pub columns: Option<Vec<String>>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_qual(mut self, column: &str, value: &str) -> Self {
        self.quals.push(Qual::new(column, value));
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Value of the equality constraint on `column`, if any
    pub fn qual(&self, column: &str) -> Option<&str> {
        self.quals
            .iter()
            .find(|q| q.column == column)
            .map(|q| q.value.as_str())
    }

    /// Whether the column has to be computed: projected or constrained
    pub fn wants(&self, column: &str) -> bool {
        match &self.columns {
            None => true,
            Some(cols) => {
                cols.iter().any(|c| c == column) || self.quals.iter().any(|q| q.column == column)
            }
        }
    }
}
