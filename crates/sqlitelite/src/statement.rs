//! Prepared statements.
//!
//! A [`Statement`] owns one compiled query and its pending bindings. It runs
//! either as a one-shot execute (`execute_for_*`, always reset afterwards with
//! bindings kept) or as a forward-only cursor (`cursor_next_row` /
//! `cursor_get_*` / `cursor_reset`).
//!
//! # States
//!
//! ```text
//! Normal --next_row()=true--> CursorRow --next_row()=false--> CursorEnd
//!   ^                            |  any step failure              |
//!   |                            v                                |
//!   +------ cursor_reset() --- CursorError <----------------------+
//! ```
//!
//! Binding and execute calls are only valid in `Normal`, column reads only in
//! `CursorRow`. Once in `CursorEnd` or `CursorError` only a reset leads back.

use crate::connection::ConnectionInner;
use crate::native::RawStatement;
use sqlitelite_core::{
    Error, FieldType, Fit, Result, ResultWindow, RowSource, ShapeMismatchKind, Value,
    WindowCursor,
};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{trace, warn};

/// Execution phase of a [`Statement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Ready to bind or execute.
    Normal,
    /// Cursor positioned on a row.
    CursorRow,
    /// Cursor stepped past the last row.
    CursorEnd,
    /// A step failed; the cursor must be reset.
    CursorError,
}

/// Shared between a [`Statement`] and the connection's managed list.
#[derive(Debug)]
pub(crate) struct StatementCore {
    raw: Option<RawStatement>,
    state: StatementState,
    sql: String,
    param_count: usize,
    column_count: usize,
    bindings: Vec<Value>,
    managed_index: Option<usize>,
}

impl StatementCore {
    pub(crate) fn set_managed_index(&mut self, index: Option<usize>) {
        self.managed_index = index;
    }

    /// Finalize the handle. Does not touch the owner's managed list.
    pub(crate) fn finalize(&mut self) -> Result<()> {
        self.managed_index = None;
        let Some(mut raw) = self.raw.take() else {
            return Ok(());
        };
        if self.state != StatementState::Normal {
            raw.reset();
            self.state = StatementState::Normal;
        }
        trace!(sql = %self.sql, "finalizing statement");
        raw.finalize()
    }

    fn raw(&self) -> Result<&RawStatement> {
        self.raw
            .as_ref()
            .ok_or_else(|| Error::illegal_state("Statement is closed"))
    }

    fn raw_mut(&mut self) -> Result<&mut RawStatement> {
        self.raw
            .as_mut()
            .ok_or_else(|| Error::illegal_state("Statement is closed"))
    }

    fn require_state(&self, expected: StatementState, action: &str) -> Result<()> {
        self.raw()?;
        if self.state != expected {
            return Err(Error::illegal_state(format!(
                "Cannot {} in state {:?}, expected {:?}",
                action, self.state, expected
            )));
        }
        Ok(())
    }

    /// Run `f` against the handle in Normal state, then reset it.
    fn run<T>(&mut self, f: impl FnOnce(&mut RawStatement) -> Result<T>) -> Result<T> {
        self.require_state(StatementState::Normal, "execute")?;
        let raw = self.raw_mut()?;
        let result = f(raw);
        raw.reset();
        result
    }

    fn scalar<T>(&mut self, read: impl FnOnce(&RawStatement) -> T) -> Result<Option<T>> {
        let columns = self.column_count;
        self.run(|raw| {
            if columns != 1 {
                return Err(Error::shape(ShapeMismatchKind::Columns, 1, columns));
            }
            if !raw.step()? {
                return Ok(None);
            }
            let value = read(raw);
            if raw.step()? {
                return Err(Error::shape(ShapeMismatchKind::Rows, 1, 2));
            }
            Ok(Some(value))
        })
    }

    fn bind(&mut self, index: usize, value: Value) -> Result<()> {
        self.require_state(StatementState::Normal, "bind")?;
        if index == 0 || index > self.param_count {
            return Err(Error::range(
                "bind index",
                index as i64,
                self.param_count as i64,
            ));
        }
        self.raw_mut()?.bind(index, value.as_value_ref())?;
        self.bindings[index - 1] = value;
        Ok(())
    }

    fn clear_bindings(&mut self) -> Result<()> {
        self.raw_mut()?.clear_bindings();
        self.bindings.fill(Value::Null);
        Ok(())
    }

    fn next_row(&mut self) -> Result<bool> {
        match self.state {
            StatementState::CursorError => Err(Error::illegal_state(
                "Cursor needs to be reset after error",
            )),
            StatementState::CursorEnd => {
                self.raw()?;
                Ok(false)
            }
            StatementState::Normal | StatementState::CursorRow => {
                let stepped = self.raw_mut()?.step();
                self.state = match stepped {
                    Ok(true) => StatementState::CursorRow,
                    Ok(false) => StatementState::CursorEnd,
                    Err(_) => StatementState::CursorError,
                };
                stepped
            }
        }
    }

    fn rewind(&mut self) -> Result<()> {
        let raw = self.raw_mut()?;
        raw.reset();
        self.state = StatementState::Normal;
        Ok(())
    }

    fn column(&self, column: usize) -> Result<&RawStatement> {
        self.require_state(StatementState::CursorRow, "read a column")?;
        if column >= self.column_count {
            return Err(Error::range(
                "column index",
                column as i64,
                self.column_count as i64,
            ));
        }
        self.raw()
    }
}

/// A compiled SQL statement bound to a [`Connection`](crate::Connection).
///
/// Statements created with [`Connection::statement`](crate::Connection::statement)
/// are managed: closing the connection finalizes them, after which every
/// call fails with an `IllegalState` error.
#[derive(Debug)]
pub struct Statement {
    core: Rc<RefCell<StatementCore>>,
    owner: Weak<RefCell<ConnectionInner>>,
}

impl Statement {
    pub(crate) fn prepare(
        owner: &Rc<RefCell<ConnectionInner>>,
        sql: &str,
        managed: bool,
    ) -> Result<Self> {
        let raw = owner.borrow().raw()?.prepare(sql)?;
        let param_count = raw.parameter_count();
        let column_count = raw.column_count();
        trace!(sql, param_count, column_count, managed, "prepared statement");

        let core = Rc::new(RefCell::new(StatementCore {
            raw: Some(raw),
            state: StatementState::Normal,
            sql: sql.to_string(),
            param_count,
            column_count,
            bindings: vec![Value::Null; param_count],
            managed_index: None,
        }));
        if managed {
            owner.borrow_mut().register(&core);
        }
        Ok(Self {
            core,
            owner: Rc::downgrade(owner),
        })
    }

    pub fn sql(&self) -> String {
        self.core.borrow().sql.clone()
    }

    pub fn state(&self) -> StatementState {
        self.core.borrow().state
    }

    pub fn is_closed(&self) -> bool {
        self.core.borrow().raw.is_none()
    }

    /// Is the owning connection tracking this statement?
    pub fn is_managed(&self) -> bool {
        self.core.borrow().managed_index.is_some()
    }

    pub fn parameter_count(&self) -> usize {
        self.core.borrow().param_count
    }

    pub fn column_count(&self) -> usize {
        self.core.borrow().column_count
    }

    pub fn column_names(&self) -> Result<Vec<String>> {
        Ok(self.core.borrow().raw()?.column_names())
    }

    /// 1-based index of a named parameter, including its prefix (`:id`, `@id`, `$id`).
    pub fn parameter_index(&self, name: &str) -> Result<Option<usize>> {
        Ok(self.core.borrow().raw()?.parameter_index(name))
    }

    pub fn parameter_name(&self, index: usize) -> Result<Option<String>> {
        Ok(self.core.borrow().raw()?.parameter_name(index))
    }

    /// Values currently bound, one per parameter.
    pub fn bindings(&self) -> Vec<Value> {
        self.core.borrow().bindings.clone()
    }

    /// Bind a value to a 1-based parameter index.
    pub fn bind(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.core.borrow_mut().bind(index, value.into())
    }

    pub fn bind_null(&self, index: usize) -> Result<()> {
        self.bind(index, Value::Null)
    }

    /// Bind a named parameter such as `:id`.
    pub fn bind_named(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.parameter_index(name)?.ok_or_else(|| {
            Error::illegal_state(format!("No parameter named {} in statement", name))
        })?;
        self.bind(index, value)
    }

    /// Bind every parameter at once. The count must match exactly.
    pub fn bind_all(&self, values: &[Value]) -> Result<()> {
        let mut core = self.core.borrow_mut();
        core.require_state(StatementState::Normal, "bind")?;
        if values.len() != core.param_count {
            return Err(Error::shape(
                ShapeMismatchKind::Arguments,
                core.param_count,
                values.len(),
            ));
        }
        for (i, value) in values.iter().enumerate() {
            core.bind(i + 1, value.clone())?;
        }
        Ok(())
    }

    /// Reset every parameter to NULL.
    pub fn clear_bindings(&self) -> Result<()> {
        let mut core = self.core.borrow_mut();
        core.require_state(StatementState::Normal, "clear bindings")?;
        core.clear_bindings()
    }

    /// Run to completion, ignoring any rows produced.
    pub fn execute(&self) -> Result<()> {
        self.core.borrow_mut().run(|raw| {
            while raw.step()? {}
            Ok(())
        })
    }

    /// Run a statement that must not produce rows.
    pub fn execute_for_void(&self) -> Result<()> {
        self.core.borrow_mut().run(|raw| {
            if raw.step()? {
                return Err(Error::shape(ShapeMismatchKind::Rows, 0, 1));
            }
            Ok(())
        })
    }

    /// Single integer result; `None` when the query returns no row.
    pub fn execute_for_long(&self) -> Result<Option<i64>> {
        self.core.borrow_mut().scalar(|raw| raw.column_long(0))
    }

    /// Single float result; `None` when the query returns no row.
    pub fn execute_for_double(&self) -> Result<Option<f64>> {
        self.core.borrow_mut().scalar(|raw| raw.column_double(0))
    }

    /// Single text result; `None` for no row or a NULL value.
    pub fn execute_for_text(&self) -> Result<Option<String>> {
        Ok(self
            .core
            .borrow_mut()
            .scalar(|raw| raw.column_text(0))?
            .flatten())
    }

    /// Single blob result; `None` for no row or a NULL value.
    pub fn execute_for_blob(&self) -> Result<Option<Vec<u8>>> {
        Ok(self
            .core
            .borrow_mut()
            .scalar(|raw| raw.column_blob(0))?
            .flatten())
    }

    /// Run an INSERT and return the new row id, or -1 if nothing was inserted.
    pub fn execute_for_row_id(&self) -> Result<i64> {
        self.core.borrow_mut().run(|raw| {
            if raw.step()? {
                return Err(Error::shape(ShapeMismatchKind::Rows, 0, 1));
            }
            if raw.changes() > 0 {
                Ok(raw.last_insert_rowid())
            } else {
                Ok(-1)
            }
        })
    }

    /// Run an UPDATE/DELETE/INSERT and return how many rows it changed.
    pub fn execute_for_changed_row_count(&self) -> Result<i64> {
        self.core.borrow_mut().run(|raw| {
            if raw.step()? {
                return Err(Error::shape(ShapeMismatchKind::Rows, 0, 1));
            }
            Ok(raw.changes())
        })
    }

    /// Advance the forward-only cursor. Returns `false` at the end, repeatedly.
    pub fn cursor_next_row(&self) -> Result<bool> {
        self.core.borrow_mut().next_row()
    }

    /// Leave cursor mode, optionally clearing the bindings.
    pub fn cursor_reset(&self, clear_bindings: bool) -> Result<()> {
        let mut core = self.core.borrow_mut();
        core.raw()?;
        if core.state == StatementState::Normal {
            return Err(Error::illegal_state("Not in cursor mode, nothing to reset"));
        }
        core.rewind()?;
        if clear_bindings {
            core.clear_bindings()?;
        }
        Ok(())
    }

    pub fn cursor_get_type(&self, column: usize) -> Result<FieldType> {
        Ok(self.core.borrow().column(column)?.column_type(column))
    }

    pub fn cursor_is_null(&self, column: usize) -> Result<bool> {
        Ok(self.cursor_get_type(column)? == FieldType::Null)
    }

    /// Read a column as an integer using the engine's conversions. NULL reads as 0.
    pub fn cursor_get_long(&self, column: usize) -> Result<i64> {
        Ok(self.core.borrow().column(column)?.column_long(column))
    }

    /// Read a column as a float using the engine's conversions. NULL reads as 0.0.
    pub fn cursor_get_double(&self, column: usize) -> Result<f64> {
        Ok(self.core.borrow().column(column)?.column_double(column))
    }

    pub fn cursor_get_text(&self, column: usize) -> Result<Option<String>> {
        Ok(self.core.borrow().column(column)?.column_text(column))
    }

    pub fn cursor_get_blob(&self, column: usize) -> Result<Option<Vec<u8>>> {
        Ok(self.core.borrow().column(column)?.column_blob(column))
    }

    pub fn cursor_get_boolean(&self, column: usize) -> Result<bool> {
        Ok(self.cursor_get_long(column)? != 0)
    }

    /// Wrap this statement in a paging cursor using the connection's window size.
    pub fn into_window_cursor(self) -> WindowCursor<Statement> {
        let capacity = self
            .owner
            .upgrade()
            .map_or(sqlitelite_core::DEFAULT_WINDOW_CAPACITY, |owner| {
                owner.borrow().window_capacity
            });
        WindowCursor::with_window_capacity(self, capacity)
    }

    /// Finalize the statement. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let (result, index) = {
            let mut core = self.core.borrow_mut();
            let index = core.managed_index;
            (core.finalize(), index)
        };
        if let (Some(index), Some(owner)) = (index, self.owner.upgrade()) {
            owner.borrow_mut().deregister(index);
        }
        result
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to finalize statement on drop");
        }
    }
}

impl RowSource for Statement {
    fn column_count(&self) -> Result<usize> {
        let core = self.core.borrow();
        core.raw()?;
        Ok(core.column_count)
    }

    fn column_names(&self) -> Result<Vec<String>> {
        Statement::column_names(self)
    }

    fn reset(&mut self) -> Result<()> {
        self.core.borrow_mut().rewind()
    }

    fn step(&mut self) -> Result<bool> {
        self.cursor_next_row()
    }

    fn copy_row(&mut self, window: &mut ResultWindow) -> Result<Fit> {
        let core = self.core.borrow();
        core.require_state(StatementState::CursorRow, "copy a row")?;
        core.raw()?.copy_row(window)
    }

    fn close(&mut self) -> Result<()> {
        Statement::close(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::Connection;
    use sqlitelite_core::{Error, FieldType, Value};

    use super::StatementState;

    fn people() -> Connection {
        let conn = Connection::open_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, score REAL, photo BLOB);
             INSERT INTO people (name, score) VALUES ('ada', 9.5), ('brian', 7.25);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn scalar_executes() {
        let conn = people();
        let count = conn.statement("SELECT count(*) FROM people").unwrap();
        assert_eq!(count.execute_for_long().unwrap(), Some(2));
        // Reset after execute; runs again.
        assert_eq!(count.execute_for_long().unwrap(), Some(2));
        assert_eq!(count.state(), StatementState::Normal);

        let name = conn
            .statement("SELECT name FROM people WHERE id = ?")
            .unwrap();
        name.bind(1, 2).unwrap();
        assert_eq!(name.execute_for_text().unwrap().as_deref(), Some("brian"));
        name.bind(1, 99).unwrap();
        assert_eq!(name.execute_for_text().unwrap(), None);

        let score = conn
            .statement("SELECT score FROM people WHERE name = 'ada'")
            .unwrap();
        assert!((score.execute_for_double().unwrap().unwrap() - 9.5).abs() < f64::EPSILON);

        let none = conn.statement("SELECT id FROM people WHERE 0").unwrap();
        assert_eq!(none.execute_for_long().unwrap(), None);
    }

    #[test]
    fn scalar_shape_checks() {
        let conn = people();
        let two_cols = conn.statement("SELECT id, name FROM people").unwrap();
        assert!(matches!(
            two_cols.execute_for_long(),
            Err(Error::ShapeMismatch(_))
        ));

        let two_rows = conn.statement("SELECT id FROM people").unwrap();
        assert!(matches!(
            two_rows.execute_for_long(),
            Err(Error::ShapeMismatch(_))
        ));
        // Still usable afterwards.
        assert_eq!(two_rows.state(), StatementState::Normal);
        assert!(two_rows.cursor_next_row().unwrap());

        let rows = conn.statement("SELECT 1").unwrap();
        assert!(matches!(rows.execute_for_void(), Err(Error::ShapeMismatch(_))));
        rows.execute().unwrap();
    }

    #[test]
    fn row_ids_and_changes() {
        let conn = people();
        let insert = conn
            .statement("INSERT INTO people (name) VALUES (?)")
            .unwrap();
        insert.bind(1, "cleo").unwrap();
        assert_eq!(insert.execute_for_row_id().unwrap(), 3);
        // Bindings survive the reset.
        assert_eq!(insert.bindings(), vec![Value::Text("cleo".to_string())]);
        assert_eq!(insert.execute_for_row_id().unwrap(), 4);

        let ignore = conn
            .statement("INSERT OR IGNORE INTO people (id, name) VALUES (1, 'dup')")
            .unwrap();
        assert_eq!(ignore.execute_for_row_id().unwrap(), -1);
        // The engine's own counter still holds the last real insert.
        let last = conn.statement("SELECT last_insert_rowid()").unwrap();
        assert_eq!(last.execute_for_long().unwrap(), Some(4));

        let update = conn
            .statement("UPDATE people SET score = 0 WHERE name = 'cleo'")
            .unwrap();
        assert_eq!(update.execute_for_changed_row_count().unwrap(), 2);
    }

    #[test]
    fn bind_checks() {
        let conn = people();
        let stmt = conn
            .statement("SELECT ?1 + ?2")
            .unwrap();
        assert_eq!(stmt.parameter_count(), 2);
        assert!(matches!(stmt.bind(0, 1), Err(Error::Range(_))));
        assert!(matches!(stmt.bind(3, 1), Err(Error::Range(_))));
        assert!(matches!(
            stmt.bind_all(&[Value::Integer(1)]),
            Err(Error::ShapeMismatch(_))
        ));
        stmt.bind_all(&[Value::Integer(40), Value::Integer(2)]).unwrap();
        assert_eq!(stmt.execute_for_long().unwrap(), Some(42));

        stmt.clear_bindings().unwrap();
        assert_eq!(stmt.bindings(), vec![Value::Null, Value::Null]);
        // NULL + NULL is NULL, which reads as 0.
        assert_eq!(stmt.execute_for_long().unwrap(), Some(0));
    }

    #[test]
    fn named_binding() {
        let conn = people();
        let stmt = conn
            .statement("SELECT name FROM people WHERE id = :id")
            .unwrap();
        assert_eq!(stmt.parameter_index(":id").unwrap(), Some(1));
        stmt.bind_named(":id", 1).unwrap();
        assert_eq!(stmt.execute_for_text().unwrap().as_deref(), Some("ada"));
        assert!(stmt.bind_named(":nope", 1).is_err());
    }

    #[test]
    fn cursor_state_machine() {
        let conn = people();
        let stmt = conn
            .statement("SELECT id, name, score, photo FROM people ORDER BY id")
            .unwrap();

        // Reads outside CursorRow fail.
        assert!(matches!(stmt.cursor_get_long(0), Err(Error::IllegalState(_))));
        assert!(matches!(
            stmt.cursor_reset(false),
            Err(Error::IllegalState(_))
        ));

        assert!(stmt.cursor_next_row().unwrap());
        assert_eq!(stmt.state(), StatementState::CursorRow);
        assert_eq!(stmt.cursor_get_long(0).unwrap(), 1);
        assert_eq!(stmt.cursor_get_text(1).unwrap().as_deref(), Some("ada"));
        assert!(stmt.cursor_is_null(3).unwrap());
        assert_eq!(stmt.cursor_get_blob(3).unwrap(), None);
        assert_eq!(stmt.cursor_get_type(2).unwrap(), FieldType::Float);
        assert!(matches!(stmt.cursor_get_long(4), Err(Error::Range(_))));

        // Binding is not allowed mid-cursor.
        assert!(matches!(stmt.execute(), Err(Error::IllegalState(_))));

        assert!(stmt.cursor_next_row().unwrap());
        assert!(!stmt.cursor_next_row().unwrap());
        assert_eq!(stmt.state(), StatementState::CursorEnd);
        assert!(!stmt.cursor_next_row().unwrap());
        assert!(matches!(stmt.cursor_get_long(0), Err(Error::IllegalState(_))));

        stmt.cursor_reset(false).unwrap();
        assert_eq!(stmt.state(), StatementState::Normal);
        assert!(stmt.cursor_next_row().unwrap());
        assert_eq!(stmt.cursor_get_long(0).unwrap(), 1);
    }

    #[test]
    fn cursor_error_requires_reset() {
        let conn = Connection::open_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER NOT NULL)").unwrap();
        let stmt = conn.statement("INSERT INTO t VALUES (NULL)").unwrap();

        let err = stmt.cursor_next_row().unwrap_err();
        assert_eq!(
            err.engine().unwrap().kind,
            sqlitelite_core::EngineErrorKind::Constraint
        );
        assert_eq!(stmt.state(), StatementState::CursorError);
        assert!(matches!(stmt.cursor_next_row(), Err(Error::IllegalState(_))));

        stmt.cursor_reset(true).unwrap();
        assert_eq!(stmt.state(), StatementState::Normal);
    }

    #[test]
    fn engine_coercion_on_cursor_reads() {
        let conn = Connection::open_memory().unwrap();
        let stmt = conn
            .statement("SELECT '123', 7, 2.75, NULL, x'6869'")
            .unwrap();
        assert!(stmt.cursor_next_row().unwrap());
        assert_eq!(stmt.cursor_get_long(0).unwrap(), 123);
        assert_eq!(stmt.cursor_get_text(1).unwrap().as_deref(), Some("7"));
        assert_eq!(stmt.cursor_get_long(2).unwrap(), 2);
        assert_eq!(stmt.cursor_get_long(3).unwrap(), 0);
        assert!(stmt.cursor_get_double(3).unwrap().abs() < f64::EPSILON);
        assert_eq!(stmt.cursor_get_text(3).unwrap(), None);
        assert_eq!(stmt.cursor_get_text(4).unwrap().as_deref(), Some("hi"));
        assert!(stmt.cursor_get_boolean(1).unwrap());
    }

    #[test]
    fn roundtrip_every_storage_class() {
        let conn = Connection::open_memory().unwrap();
        conn.execute_batch("CREATE TABLE v (a, b, c, d, e)").unwrap();
        let insert = conn
            .statement("INSERT INTO v VALUES (?, ?, ?, ?, ?)")
            .unwrap();
        insert
            .bind_all(&[
                Value::Null,
                Value::Integer(i64::MIN),
                Value::Real(-0.125),
                Value::Text("snow ☃".to_string()),
                Value::Blob(vec![0, 255, 10, 0]),
            ])
            .unwrap();
        insert.execute_for_void().unwrap();

        let select = conn.statement("SELECT a, b, c, d, e FROM v").unwrap();
        assert!(select.cursor_next_row().unwrap());
        assert!(select.cursor_is_null(0).unwrap());
        assert_eq!(select.cursor_get_long(1).unwrap(), i64::MIN);
        assert!((select.cursor_get_double(2).unwrap() + 0.125).abs() < f64::EPSILON);
        assert_eq!(select.cursor_get_text(3).unwrap().as_deref(), Some("snow ☃"));
        assert_eq!(select.cursor_get_blob(4).unwrap(), Some(vec![0, 255, 10, 0]));

        let bools = conn.statement("SELECT ?").unwrap();
        bools.bind(1, true).unwrap();
        assert_eq!(bools.execute_for_long().unwrap(), Some(1));
    }

    #[test]
    fn close_is_idempotent_and_deregisters() {
        let conn = people();
        let a = conn.statement("SELECT 1").unwrap();
        let b = conn.statement("SELECT 2").unwrap();
        let c = conn.statement("SELECT 3").unwrap();
        assert_eq!(conn.managed_statement_count(), 3);

        a.close().unwrap();
        a.close().unwrap();
        assert!(a.is_closed());
        assert!(!a.is_managed());
        assert_eq!(conn.managed_statement_count(), 2);
        assert!(matches!(a.execute(), Err(Error::IllegalState(_))));

        // The swapped-in statement keeps working and can still deregister.
        assert_eq!(c.execute_for_long().unwrap(), Some(3));
        c.close().unwrap();
        assert_eq!(conn.managed_statement_count(), 1);
        assert_eq!(b.execute_for_long().unwrap(), Some(2));
    }

    #[test]
    fn unmanaged_statement_is_not_tracked() {
        let conn = Connection::open_memory().unwrap();
        let stmt = conn.unmanaged_statement("SELECT 1").unwrap();
        assert!(!stmt.is_managed());
        assert_eq!(conn.managed_statement_count(), 0);
        assert_eq!(stmt.execute_for_long().unwrap(), Some(1));
    }
}
