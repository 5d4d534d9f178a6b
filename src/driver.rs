//! Driver-level types shared by every layer of the query chain.

use sea_orm::{QueryResult, Statement, Value};

use crate::error::QueryError;

/// A bound query argument.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue {
    /// Argument name, if the driver supports named parameters.
    pub name: Option<String>,
    /// 1-based position of the argument.
    pub ordinal: usize,
    pub value: Value,
}

impl NamedValue {
    /// Name used when reporting the argument: its name, or its ordinal.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.ordinal.to_string(),
        }
    }
}

/// Converts the positional values of a statement into named arguments.
pub fn named_values(stmt: &Statement) -> Vec<NamedValue> {
    stmt.values
        .as_ref()
        .map(|values| {
            values
                .0
                .iter()
                .enumerate()
                .map(|(idx, value)| NamedValue {
                    name: None,
                    ordinal: idx + 1,
                    value: value.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// A result set produced by a query.
pub trait Rows: Send {
    /// Advances to the next row. `Ok(None)` marks the end of the set.
    fn next_row(&mut self) -> Result<Option<QueryResult>, QueryError>;

    /// Releases the result set.
    fn close(&mut self) -> Result<(), QueryError>;
}

/// Result of one query operation: rows (possibly absent) or an error.
pub type QueryOutcome = Result<Option<Box<dyn Rows>>, QueryError>;

/// Rows already materialized by the driver.
pub struct VecRows {
    rows: std::vec::IntoIter<QueryResult>,
}

impl VecRows {
    pub fn new(rows: Vec<QueryResult>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

impl Rows for VecRows {
    fn next_row(&mut self) -> Result<Option<QueryResult>, QueryError> {
        Ok(self.rows.next())
    }

    fn close(&mut self) -> Result<(), QueryError> {
        self.rows = Vec::new().into_iter();
        Ok(())
    }
}

/// Reads every row, then closes the set. The set is closed even when reading
/// fails; the first error wins.
pub fn drain_rows(rows: &mut dyn Rows) -> Result<Vec<QueryResult>, QueryError> {
    let mut out = Vec::new();
    let read = loop {
        match rows.next_row() {
            Ok(Some(row)) => out.push(row),
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        }
    };
    let closed = rows.close();

    read.and(closed).map(|()| out)
}

/// Reads at most one row, then closes the set. The first error wins.
pub fn first_row(rows: &mut dyn Rows) -> Result<Option<QueryResult>, QueryError> {
    let read = rows.next_row();
    let closed = rows.close();

    read.and_then(|row| closed.map(|()| row))
}
