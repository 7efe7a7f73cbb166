//! Value transfer between Rust and SQLite.
//!
//! SQLite has a simple type system with 5 storage classes:
//! - INTEGER: Signed integer (1, 2, 3, 4, 6, or 8 bytes)
//! - REAL: 8-byte IEEE floating point
//! - TEXT: UTF-8 or UTF-16 string
//! - BLOB: Binary data
//! - NULL: The NULL value
//!
//! These map one-to-one onto `Value` / `ValueRef`.

#![allow(clippy::cast_possible_truncation)]

use crate::ffi;
use sqlitelite_core::{FieldType, ValueRef};
use std::ffi::{CStr, c_int};

/// Bind a value to a prepared statement parameter.
///
/// Text and blob data is copied by the engine. Returns the engine's result code.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: ValueRef<'_>) -> c_int {
    // SAFETY: caller guarantees `stmt` is valid; slices outlive the call and
    // SQLITE_TRANSIENT makes the engine take its own copy.
    unsafe {
        match value {
            ValueRef::Null => ffi::sqlite3_bind_null(stmt, index),

            ValueRef::Integer(v) => ffi::sqlite3_bind_int64(stmt, index, v),

            ValueRef::Real(v) => ffi::sqlite3_bind_double(stmt, index, v),

            ValueRef::Text(bytes) => {
                let Ok(len) = c_int::try_from(bytes.len()) else {
                    return ffi::SQLITE_TOOBIG;
                };
                ffi::sqlite3_bind_text(stmt, index, bytes.as_ptr().cast(), len, ffi::transient())
            }

            ValueRef::Blob(bytes) => {
                let Ok(len) = c_int::try_from(bytes.len()) else {
                    return ffi::SQLITE_TOOBIG;
                };
                ffi::sqlite3_bind_blob(stmt, index, bytes.as_ptr().cast(), len, ffi::transient())
            }
        }
    }
}

/// Storage class of a column in the current row.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
pub unsafe fn column_type(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> FieldType {
    // SAFETY: forwarded from the caller
    match unsafe { ffi::sqlite3_column_type(stmt, index) } {
        ffi::SQLITE_INTEGER => FieldType::Integer,
        ffi::SQLITE_FLOAT => FieldType::Float,
        ffi::SQLITE_TEXT => FieldType::Text,
        ffi::SQLITE_BLOB => FieldType::Blob,
        _ => FieldType::Null,
    }
}

/// Read a column of the current row without copying.
///
/// The returned slices point into engine memory and stay valid until the
/// statement is stepped, reset or finalized.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
/// - the result must not outlive the current row
pub unsafe fn read_value_ref<'a>(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> ValueRef<'a> {
    // SAFETY: forwarded from the caller
    unsafe {
        match column_type(stmt, index) {
            FieldType::Null => ValueRef::Null,

            FieldType::Integer => ValueRef::Integer(ffi::sqlite3_column_int64(stmt, index)),

            FieldType::Float => ValueRef::Real(ffi::sqlite3_column_double(stmt, index)),

            FieldType::Text => {
                // column_text must be called before column_bytes
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() {
                    ValueRef::Text(&[])
                } else {
                    ValueRef::Text(std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize))
                }
            }

            FieldType::Blob => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() || len == 0 {
                    ValueRef::Blob(&[])
                } else {
                    ValueRef::Blob(std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize))
                }
            }
        }
    }
}

/// Read a column as text with the engine's own conversion rules.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
pub unsafe fn column_text(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: forwarded from the caller
    unsafe {
        let ptr = ffi::sqlite3_column_text(stmt, index);
        if ptr.is_null() {
            return None;
        }
        let len = ffi::sqlite3_column_bytes(stmt, index);
        let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
        Some(String::from_utf8_lossy(slice).into_owned())
    }
}

/// Read a column as bytes with the engine's own conversion rules.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
pub unsafe fn column_blob(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<Vec<u8>> {
    // SAFETY: forwarded from the caller
    unsafe {
        if ffi::sqlite3_column_type(stmt, index) == ffi::SQLITE_NULL {
            return None;
        }
        let ptr = ffi::sqlite3_column_blob(stmt, index);
        let len = ffi::sqlite3_column_bytes(stmt, index);
        if ptr.is_null() || len == 0 {
            return Some(Vec::new());
        }
        Some(std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize).to_vec())
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: forwarded from the caller
    unsafe {
        let ptr = ffi::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
        }
    }
}
