use serde::{Deserialize, Serialize};

/// Positional parameter bound into a query statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryParam {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

/// Sort order applied on top of a query's statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    /// Zero-based index into the statement's result columns
    pub column: usize,
    pub descending: bool,
}

impl SortKey {
    pub fn ascending(column: usize) -> Self {
        Self { column, descending: false }
    }

    pub fn descending(column: usize) -> Self {
        Self { column, descending: true }
    }
}

/// An immutable statement plus its parameters and optional sort key.
///
/// The statement text is opaque to the paging layer; only the cursor
/// implementation interprets it. Changing the sort key produces a new query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    statement: String,
    params: Vec<QueryParam>,
    sort: Option<SortKey>,
}

impl Query {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Vec::new(),
            sort: None,
        }
    }

    /// Bind positional parameters
    pub fn with_params(mut self, params: Vec<QueryParam>) -> Self {
        self.params = params;
        self
    }

    /// Same statement and parameters under a different sort key
    pub fn with_sort(&self, sort: Option<SortKey>) -> Self {
        Self {
            statement: self.statement.clone(),
            params: self.params.clone(),
            sort,
        }
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }

    pub fn sort(&self) -> Option<SortKey> {
        self.sort
    }
}
