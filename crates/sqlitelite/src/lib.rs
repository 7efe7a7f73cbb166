//! Thin SQLite binding built around statement lifecycles and windowed cursors.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! The engine is compiled in through `libsqlite3-sys`. On top of it this crate
//! provides:
//!
//! - [`Connection`]: one native handle, managed statements, a cache of
//!   transaction-control statements, cross-thread interrupts
//! - [`Statement`]: one-shot `execute_for_*` calls and a forward-only cursor
//!   with an explicit state machine
//! - [`WindowCursor<Statement>`](WindowCursor): random access over a query by
//!   paging rows into a bounded [`ResultWindow`]
//! - [`Delegate`]: configure / create / upgrade / open callbacks run by
//!   [`Connection::open_with`]
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlitelite::{Connection, Value};
//!
//! let conn = Connection::open_memory()?;
//! conn.command("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")?;
//!
//! let insert = conn.statement("INSERT INTO notes (body) VALUES (?)")?;
//! insert.bind(1, "first")?;
//! let id = insert.execute_for_row_id()?;
//!
//! let mut rows = conn.query("SELECT body FROM notes WHERE id >= ?", &[Value::Integer(id)])?;
//! while rows.move_to_next()? {
//!     println!("{:?}", rows.get_text(0)?);
//! }
//! ```
//!
//! # Type Mapping
//!
//! | Rust Type | SQLite Type |
//! |-----------|-------------|
//! | `bool` | INTEGER (0/1) |
//! | `i32`, `u32`, `i64` | INTEGER |
//! | `f64` | REAL |
//! | `String`, `&str` | TEXT |
//! | `Vec<u8>`, `&[u8]` | BLOB |
//! | `Option<T>` | NULL or T |
//!
//! # Thread Safety
//!
//! `Connection` and `Statement` are `!Send`: one owner drives them. Use
//! [`Connection::interrupt_handle`] to cancel a running statement from
//! another thread.

pub mod config;
pub mod connection;
pub mod delegate;
pub mod ffi;
mod native;
pub mod statement;
mod types;

pub use config::{DEFAULT_BUSY_TIMEOUT_MS, DatabaseConfig, MEMORY_PATH, OpenFlags};
pub use connection::{Connection, InterruptHandle, TransactionMode};
pub use delegate::{Delegate, delete_database};
pub use statement::{Statement, StatementState};

pub use sqlitelite_core::{
    EngineError, EngineErrorKind, Error, FieldType, ResultWindow, Result, ShapeMismatchKind,
    Value, ValueRef, WindowCursor,
};

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}
