//! Thin owning wrappers over the engine's connection and statement handles.
//!
//! No policy lives here: every method is one engine call plus error
//! translation. State machines and bookkeeping are in `statement` and
//! `connection`.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::ffi;
use crate::types;
use sqlitelite_core::{EngineError, Error, FieldType, Fit, Result, ResultWindow, ValueRef};
use std::ffi::{CStr, CString, c_int};
use std::ptr::{self, NonNull};

/// Build an engine error from the connection's last error, falling back to
/// `rc` when the connection did not record it.
pub(crate) fn engine_error(db: *mut ffi::sqlite3, rc: c_int) -> EngineError {
    if db.is_null() {
        return EngineError::new(rc, ffi::error_string(rc));
    }
    // SAFETY: db is a valid connection handle
    let (extended, message) = unsafe {
        let extended = ffi::sqlite3_extended_errcode(db);
        let msg = ffi::sqlite3_errmsg(db);
        let message = if msg.is_null() {
            ffi::error_string(rc).to_string()
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        };
        (extended, message)
    };
    if extended & 0xff == rc & 0xff {
        EngineError::new(extended, message)
    } else {
        EngineError::new(rc, ffi::error_string(rc))
    }
}

fn cstring(text: &str, what: &str) -> Result<CString> {
    CString::new(text).map_err(|_| {
        Error::Engine(EngineError::new(
            ffi::SQLITE_MISUSE,
            format!("{} contains a null byte", what),
        ))
    })
}

/// An open engine connection. Closing is explicit; dropping without
/// closing leaks the handle, so owners must call [`RawConnection::close`].
#[derive(Debug)]
pub(crate) struct RawConnection {
    db: NonNull<ffi::sqlite3>,
}

impl RawConnection {
    /// Open `path` with engine open flags. Extended result codes are always enabled.
    pub(crate) fn open(path: &str, flags: c_int, busy_timeout_ms: u32) -> Result<Self> {
        let c_path = cstring(path, "Database path")?;
        let flags = flags | ffi::SQLITE_OPEN_EXRESCODE;
        let mut db: *mut ffi::sqlite3 = ptr::null_mut();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };
        if rc != ffi::SQLITE_OK {
            let err = engine_error(db, rc);
            if !db.is_null() {
                // SAFETY: the engine hands out a handle even on failure; it must be closed
                unsafe {
                    ffi::sqlite3_close(db);
                }
            }
            return Err(Error::Engine(err));
        }
        let Some(db) = NonNull::new(db) else {
            return Err(Error::Engine(EngineError::new(
                ffi::SQLITE_NOMEM,
                ffi::error_string(ffi::SQLITE_NOMEM),
            )));
        };
        let conn = Self { db };

        if flags & ffi::SQLITE_OPEN_READWRITE != 0 && conn.is_read_only() {
            let err = EngineError::new(
                ffi::SQLITE_READONLY,
                "Could not open the database in read/write mode",
            );
            if let Err((leaked, _)) = conn.close() {
                leaked.close_v2();
            }
            return Err(Error::Engine(err));
        }

        if busy_timeout_ms > 0 {
            let ms = c_int::try_from(busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(conn.as_ptr(), ms);
            }
        }
        Ok(conn)
    }

    pub(crate) fn as_ptr(&self) -> *mut ffi::sqlite3 {
        self.db.as_ptr()
    }

    /// Close the connection. Fails while statements are still unfinalized,
    /// handing the connection back so the caller keeps ownership.
    pub(crate) fn close(self) -> std::result::Result<(), (Self, Error)> {
        // SAFETY: db is valid and owned by self
        let rc = unsafe { ffi::sqlite3_close(self.as_ptr()) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            let err = engine_error(self.as_ptr(), rc);
            Err((self, Error::Engine(err)))
        }
    }

    /// Close lazily: the engine frees the handle once its last statement is finalized.
    pub(crate) fn close_v2(self) {
        // SAFETY: db is valid and owned by self; close_v2 always succeeds for a valid handle
        unsafe {
            ffi::sqlite3_close_v2(self.as_ptr());
        }
    }

    pub(crate) fn prepare(&self, sql: &str) -> Result<RawStatement> {
        let c_sql = cstring(sql, "SQL")?;
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                self.as_ptr(),
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut stmt,
                ptr::null_mut(),
            )
        };
        if rc != ffi::SQLITE_OK {
            return Err(Error::Engine(engine_error(self.as_ptr(), rc).with_sql(sql)));
        }
        // Whitespace or comments only compile to no statement at all.
        let stmt = NonNull::new(stmt).ok_or_else(|| {
            Error::Engine(
                EngineError::new(ffi::SQLITE_MISUSE, "SQL contains no statement").with_sql(sql),
            )
        })?;
        Ok(RawStatement {
            stmt,
            db: self.db,
        })
    }

    /// Run one or more SQL statements separated by semicolons.
    pub(crate) fn exec(&self, sql: &str) -> Result<()> {
        let c_sql = cstring(sql, "SQL")?;
        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_exec(self.as_ptr(), c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };
        if !errmsg.is_null() {
            // SAFETY: errmsg was allocated by the engine
            unsafe { ffi::sqlite3_free(errmsg.cast()) };
        }
        if rc != ffi::SQLITE_OK {
            return Err(Error::Engine(engine_error(self.as_ptr(), rc)));
        }
        Ok(())
    }

    pub(crate) fn is_read_only(&self) -> bool {
        // SAFETY: db is valid, the schema name is a static C string
        unsafe { ffi::sqlite3_db_readonly(self.as_ptr(), c"main".as_ptr()) == 1 }
    }

    pub(crate) fn is_autocommit(&self) -> bool {
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_get_autocommit(self.as_ptr()) != 0 }
    }
}

/// A compiled statement. Must be finalized before its connection closes.
#[derive(Debug)]
pub(crate) struct RawStatement {
    stmt: NonNull<ffi::sqlite3_stmt>,
    db: NonNull<ffi::sqlite3>,
}

impl RawStatement {
    fn as_ptr(&self) -> *mut ffi::sqlite3_stmt {
        self.stmt.as_ptr()
    }

    fn error(&self, rc: c_int) -> Error {
        Error::Engine(engine_error(self.db.as_ptr(), rc))
    }

    /// Rows changed by the most recent INSERT/UPDATE/DELETE on this connection.
    pub(crate) fn changes(&self) -> i64 {
        // SAFETY: db is valid while any of its statements is
        unsafe { ffi::sqlite3_changes64(self.db.as_ptr()) }
    }

    pub(crate) fn last_insert_rowid(&self) -> i64 {
        // SAFETY: db is valid while any of its statements is
        unsafe { ffi::sqlite3_last_insert_rowid(self.db.as_ptr()) }
    }

    /// Destroy the statement. The handle is gone even when an error is reported.
    pub(crate) fn finalize(self) -> Result<()> {
        // SAFETY: stmt is valid and owned by self
        let rc = unsafe { ffi::sqlite3_finalize(self.as_ptr()) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.error(rc))
        }
    }

    /// Advance one row. `Ok(true)` means a row is available.
    pub(crate) fn step(&mut self) -> Result<bool> {
        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(self.as_ptr()) };
        match rc {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => Ok(false),
            _ => Err(self.error(rc)),
        }
    }

    /// Rewind to the start. Bindings are kept.
    ///
    /// The engine repeats the last step error here; it was already reported, so it is ignored.
    pub(crate) fn reset(&mut self) {
        // SAFETY: stmt is valid
        unsafe {
            ffi::sqlite3_reset(self.as_ptr());
        }
    }

    pub(crate) fn clear_bindings(&mut self) {
        // SAFETY: stmt is valid
        unsafe {
            ffi::sqlite3_clear_bindings(self.as_ptr());
        }
    }

    /// Bind a value at a 1-based index.
    pub(crate) fn bind(&mut self, index: usize, value: ValueRef<'_>) -> Result<()> {
        let index = c_int::try_from(index).unwrap_or(c_int::MAX);
        // SAFETY: stmt is valid
        let rc = unsafe { types::bind_value(self.as_ptr(), index, value) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.error(rc))
        }
    }

    pub(crate) fn parameter_count(&self) -> usize {
        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_bind_parameter_count(self.as_ptr()) as usize }
    }

    /// 1-based index of a named parameter such as `:name`, `@name` or `$name`.
    pub(crate) fn parameter_index(&self, name: &str) -> Option<usize> {
        let c_name = CString::new(name).ok()?;
        // SAFETY: stmt is valid, name is NUL-terminated
        let index = unsafe { ffi::sqlite3_bind_parameter_index(self.as_ptr(), c_name.as_ptr()) };
        usize::try_from(index).ok().filter(|&i| i > 0)
    }

    pub(crate) fn parameter_name(&self, index: usize) -> Option<String> {
        let index = c_int::try_from(index).ok()?;
        // SAFETY: stmt is valid; out-of-range indexes return NULL
        unsafe {
            let ptr = ffi::sqlite3_bind_parameter_name(self.as_ptr(), index);
            if ptr.is_null() {
                None
            } else {
                Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
            }
        }
    }

    pub(crate) fn column_count(&self) -> usize {
        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_column_count(self.as_ptr()) as usize }
    }

    pub(crate) fn column_names(&self) -> Vec<String> {
        (0..self.column_count())
            .map(|i| {
                // SAFETY: stmt is valid and i is in range
                unsafe { types::column_name(self.as_ptr(), i as c_int) }.unwrap_or_default()
            })
            .collect()
    }

    // Column reads below require that the last step returned a row and
    // that `index` is below `column_count()`; callers check both.

    pub(crate) fn column_type(&self, index: usize) -> FieldType {
        // SAFETY: see above
        unsafe { types::column_type(self.as_ptr(), index as c_int) }
    }

    pub(crate) fn column_value(&self, index: usize) -> ValueRef<'_> {
        // SAFETY: see above; the borrow of self keeps the row alive
        unsafe { types::read_value_ref(self.as_ptr(), index as c_int) }
    }

    pub(crate) fn column_long(&self, index: usize) -> i64 {
        // SAFETY: see above
        unsafe { ffi::sqlite3_column_int64(self.as_ptr(), index as c_int) }
    }

    pub(crate) fn column_double(&self, index: usize) -> f64 {
        // SAFETY: see above
        unsafe { ffi::sqlite3_column_double(self.as_ptr(), index as c_int) }
    }

    pub(crate) fn column_text(&self, index: usize) -> Option<String> {
        // SAFETY: see above
        unsafe { types::column_text(self.as_ptr(), index as c_int) }
    }

    pub(crate) fn column_blob(&self, index: usize) -> Option<Vec<u8>> {
        // SAFETY: see above
        unsafe { types::column_blob(self.as_ptr(), index as c_int) }
    }

    /// Copy the current row into `window`, rolling the row back if it does not fit.
    pub(crate) fn copy_row(&self, window: &mut ResultWindow) -> Result<Fit> {
        if window.alloc_row()? == Fit::Full {
            return Ok(Fit::Full);
        }
        for column in 0..window.column_count() {
            match window.put(column, self.column_value(column)) {
                Ok(Fit::Stored) => {}
                Ok(Fit::Full) => {
                    window.free_last_row();
                    return Ok(Fit::Full);
                }
                Err(e) => {
                    window.free_last_row();
                    return Err(e);
                }
            }
        }
        Ok(Fit::Stored)
    }
}

/// Raw connection pointer that may be handed to another thread for interrupts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InterruptTarget(NonNull<ffi::sqlite3>);

// SAFETY: sqlite3_interrupt is documented as safe to call from any thread
// while the connection is open; the owner clears the target before closing.
unsafe impl Send for InterruptTarget {}

impl InterruptTarget {
    pub(crate) fn of(conn: &RawConnection) -> Self {
        Self(conn.db)
    }

    pub(crate) fn interrupt(self) {
        // SAFETY: the handle is open while a target for it is published
        unsafe { ffi::sqlite3_interrupt(self.0.as_ptr()) }
    }
}
