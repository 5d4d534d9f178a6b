//! Traced result sets.

use std::sync::Arc;

use sea_orm::QueryResult;

use crate::context::{CallContext, KeyValue};
use crate::driver::Rows;
use crate::error::QueryError;
use crate::telemetry::MethodTracer;

pub const TRACE_METHOD_ROWS_NEXT: &str = "rows_next";
pub const TRACE_METHOD_ROWS_CLOSE: &str = "rows_close";

/// Label carrying the number of rows read before close.
pub const RETURNED_ROWS_LABEL: &str = "db.response.returned_rows";

/// Wraps `rows` so that advancing and closing them can be traced.
pub fn wrap_rows(
    ctx: &CallContext,
    rows: Box<dyn Rows>,
    tracer: Arc<dyn MethodTracer>,
    trace_next: bool,
    trace_close: bool,
) -> Box<dyn Rows> {
    Box::new(TracedRows {
        inner: rows,
        ctx: ctx.clone(),
        tracer,
        trace_next,
        trace_close,
        returned: 0,
        closed: false,
    })
}

/// A result set emitting `rows_next` / `rows_close` traces.
pub struct TracedRows {
    inner: Box<dyn Rows>,
    ctx: CallContext,
    tracer: Arc<dyn MethodTracer>,
    trace_next: bool,
    trace_close: bool,
    returned: u64,
    closed: bool,
}

impl Rows for TracedRows {
    fn next_row(&mut self) -> Result<Option<QueryResult>, QueryError> {
        if !self.trace_next {
            let row = self.inner.next_row()?;
            self.returned += u64::from(row.is_some());
            return Ok(row);
        }

        let (_, end) = self.tracer.trace(self.ctx.clone(), TRACE_METHOD_ROWS_NEXT);
        let row = self.inner.next_row();
        match &row {
            Ok(found) => {
                self.returned += u64::from(found.is_some());
                end(None, &[]);
            }
            Err(err) => end(Some(err), &[]),
        }
        row
    }

    fn close(&mut self) -> Result<(), QueryError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if !self.trace_close {
            return self.inner.close();
        }

        let (_, end) = self.tracer.trace(self.ctx.clone(), TRACE_METHOD_ROWS_CLOSE);
        let result = self.inner.close();
        end(
            result.as_ref().err(),
            &[KeyValue::new(RETURNED_ROWS_LABEL, self.returned)],
        );
        result
    }
}
