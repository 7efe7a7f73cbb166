//! In-memory [`RowSource`] over owned rows.
//!
//! Handy for exercising [`WindowCursor`](crate::cursor::WindowCursor) without
//! an engine, and for serving precomputed results through the same cursor API.

use crate::cursor::RowSource;
use crate::error::{EngineError, Error, Result};
use crate::value::{Value, ValueRef};
use crate::window::{Fit, ResultWindow};

/// Rows held in memory, iterated forward-only like a prepared statement.
#[derive(Debug, Clone, Default)]
pub struct MemoryRows {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    next: usize,
    fail_at: Option<usize>,
    resets: usize,
    passes: usize,
    closed: bool,
}

impl MemoryRows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            ..Self::default()
        }
    }

    /// Make the step that would produce row `row` fail with an engine I/O error.
    pub fn fail_at_step(&mut self, row: usize) {
        self.fail_at = Some(row);
    }

    pub fn clear_failure(&mut self) {
        self.fail_at = None;
    }

    /// Number of resets so far.
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Number of times iteration started over from the first row.
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RowSource for MemoryRows {
    fn column_count(&self) -> Result<usize> {
        Ok(self.columns.len())
    }

    fn column_names(&self) -> Result<Vec<String>> {
        Ok(self.columns.clone())
    }

    fn reset(&mut self) -> Result<()> {
        self.next = 0;
        self.resets += 1;
        Ok(())
    }

    fn step(&mut self) -> Result<bool> {
        if self.closed {
            return Err(Error::illegal_state("row source is closed"));
        }
        if self.next == 0 {
            self.passes += 1;
        }
        if self.fail_at == Some(self.next) {
            // SQLITE_IOERR_READ
            return Err(Error::Engine(EngineError::new(266, "disk I/O error")));
        }
        if self.next >= self.rows.len() {
            return Ok(false);
        }
        self.next += 1;
        Ok(true)
    }

    fn copy_row(&mut self, window: &mut ResultWindow) -> Result<Fit> {
        let Some(row) = self.next.checked_sub(1).and_then(|i| self.rows.get(i)) else {
            return Err(Error::illegal_state("no current row"));
        };
        let values: Vec<ValueRef<'_>> = row.iter().map(Value::as_value_ref).collect();
        window.push_row(&values)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_forward_then_stops() {
        let mut rows = MemoryRows::new(
            vec!["a".to_string()],
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        );
        assert!(rows.step().unwrap());
        assert!(rows.step().unwrap());
        assert!(!rows.step().unwrap());
        assert!(!rows.step().unwrap());
        assert_eq!(rows.passes(), 1);

        rows.reset().unwrap();
        assert!(rows.step().unwrap());
        assert_eq!(rows.passes(), 2);
    }

    #[test]
    fn injected_failure_is_an_engine_error() {
        let mut rows = MemoryRows::new(vec!["a".to_string()], vec![vec![Value::Null]; 3]);
        rows.fail_at_step(1);
        assert!(rows.step().unwrap());
        let err = rows.step().unwrap_err();
        assert_eq!(err.engine().map(|e| e.code), Some(10));
    }
}
