//! Fixed-capacity buffer holding a contiguous run of result rows.
//!
//! All rows live in one byte store. Each row starts with a directory of
//! fixed-size field slots (one per column), followed by the text/blob
//! payloads written for that row:
//!
//! ```text
//! | slot 0 | slot 1 | ... | slot n-1 | payload ... | slot 0 | ... (next row)
//!
//! slot: [type tag: u8][pad: 3][len: u32 LE][value: u64 LE]
//! ```
//!
//! Integers and floats are stored inline in `value`. For text and blobs,
//! `value` is the payload offset inside the store and `len` its byte length.
//! A row index (one `u32` offset per row) also counts toward the capacity.
//!
//! Appending is all-or-nothing per row: a row that runs out of room is
//! rolled back completely and the window reports [`Fit::Full`].

use crate::error::{Error, Result, TypeError};
use crate::value::{FieldType, ValueRef};
use std::borrow::Cow;

/// Default window capacity in bytes.
pub const DEFAULT_WINDOW_CAPACITY: usize = 2 * 1024 * 1024;

const FIELD_SLOT_BYTES: usize = 16;
const ROW_INDEX_BYTES: usize = 4;
const INITIAL_RESERVE: usize = 16 * 1024;

/// Outcome of an append into a [`ResultWindow`].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    /// The data was stored.
    Stored,
    /// Not enough room left; nothing was stored.
    Full,
}

/// A decoded field slot.
#[derive(Debug, Clone, Copy)]
struct Field {
    ty: FieldType,
    len: u32,
    value: u64,
}

/// Compact, byte-capacity-bounded row buffer.
#[derive(Debug)]
pub struct ResultWindow {
    data: Vec<u8>,
    rows: Vec<u32>,
    capacity: usize,
    column_count: usize,
    start_position: usize,
}

impl ResultWindow {
    /// Create an empty window that can hold up to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(u32::MAX as usize);
        Self {
            data: Vec::with_capacity(capacity.min(INITIAL_RESERVE)),
            rows: Vec::new(),
            capacity,
            column_count: 0,
            start_position: 0,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently in use, row index included.
    pub fn used_bytes(&self) -> usize {
        self.data.len() + self.rows.len() * ROW_INDEX_BYTES
    }

    /// Bytes still available.
    pub fn free_bytes(&self) -> usize {
        self.capacity.saturating_sub(self.used_bytes())
    }

    /// Absolute position of the first row held by this window.
    pub fn start_position(&self) -> usize {
        self.start_position
    }

    pub fn set_start_position(&mut self, position: usize) {
        self.start_position = position;
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Does this window hold the absolute row `position`?
    pub fn covers(&self, position: usize) -> bool {
        position >= self.start_position && position < self.start_position + self.rows.len()
    }

    /// Set the number of columns per row.
    ///
    /// Only allowed while the window is empty or when the count is unchanged.
    pub fn set_column_count(&mut self, count: usize) -> Result<()> {
        if count != self.column_count && !self.rows.is_empty() {
            return Err(Error::illegal_state(format!(
                "Cannot change column count from {} to {} while the window holds rows",
                self.column_count, count
            )));
        }
        self.column_count = count;
        Ok(())
    }

    /// Drop all rows and reset the start position. Allocated memory is kept.
    pub fn clear(&mut self) {
        self.data.clear();
        self.rows.clear();
        self.start_position = 0;
    }

    /// Allocate a new row with every field set to NULL.
    pub fn alloc_row(&mut self) -> Result<Fit> {
        let needed = self.column_count * FIELD_SLOT_BYTES + ROW_INDEX_BYTES;
        if needed > self.free_bytes() {
            return Ok(Fit::Full);
        }
        let offset = u32::try_from(self.data.len())
            .map_err(|_| Error::illegal_state("window offset overflow"))?;
        self.data
            .resize(self.data.len() + self.column_count * FIELD_SLOT_BYTES, 0);
        self.rows.push(offset);
        Ok(Fit::Stored)
    }

    /// Remove the most recently allocated row together with its payloads.
    pub fn free_last_row(&mut self) {
        if let Some(offset) = self.rows.pop() {
            self.data.truncate(offset as usize);
        }
    }

    /// Write `value` into column `column` of the last allocated row.
    ///
    /// Returns [`Fit::Full`] when a text/blob payload does not fit. The row
    /// stays allocated in that case; callers roll it back with
    /// [`free_last_row`](Self::free_last_row).
    pub fn put(&mut self, column: usize, value: ValueRef<'_>) -> Result<Fit> {
        let Some(&row_offset) = self.rows.last() else {
            return Err(Error::illegal_state("No row allocated in window"));
        };
        if column >= self.column_count {
            return Err(Error::range(
                "window column",
                column as i64,
                self.column_count as i64,
            ));
        }

        let (ty, len, raw) = match value {
            ValueRef::Null => (FieldType::Null, 0, 0),
            ValueRef::Integer(v) => (FieldType::Integer, 0, v as u64),
            ValueRef::Real(v) => (FieldType::Float, 0, v.to_bits()),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                let Ok(len) = u32::try_from(bytes.len()) else {
                    return Ok(Fit::Full);
                };
                if bytes.len() > self.free_bytes() {
                    return Ok(Fit::Full);
                }
                let offset = self.data.len() as u64;
                self.data.extend_from_slice(bytes);
                (value.field_type(), len, offset)
            }
        };

        let base = row_offset as usize + column * FIELD_SLOT_BYTES;
        let slot = &mut self.data[base..base + FIELD_SLOT_BYTES];
        slot[0] = ty.tag();
        slot[4..8].copy_from_slice(&len.to_le_bytes());
        slot[8..16].copy_from_slice(&raw.to_le_bytes());
        Ok(Fit::Stored)
    }

    /// Append a complete row. On [`Fit::Full`] the window is left unchanged.
    pub fn push_row(&mut self, values: &[ValueRef<'_>]) -> Result<Fit> {
        if values.len() != self.column_count {
            return Err(Error::shape(
                crate::error::ShapeMismatchKind::Columns,
                self.column_count,
                values.len(),
            ));
        }
        if self.alloc_row()? == Fit::Full {
            return Ok(Fit::Full);
        }
        for (column, value) in values.iter().enumerate() {
            match self.put(column, *value) {
                Ok(Fit::Stored) => {}
                Ok(Fit::Full) => {
                    self.free_last_row();
                    return Ok(Fit::Full);
                }
                Err(e) => {
                    self.free_last_row();
                    return Err(e);
                }
            }
        }
        Ok(Fit::Stored)
    }

    fn field(&self, row: usize, column: usize) -> Result<Field> {
        let Some(&row_offset) = self.rows.get(row) else {
            return Err(Error::range("window row", row as i64, self.rows.len() as i64));
        };
        if column >= self.column_count {
            return Err(Error::range(
                "window column",
                column as i64,
                self.column_count as i64,
            ));
        }
        let base = row_offset as usize + column * FIELD_SLOT_BYTES;
        let slot = &self.data[base..base + FIELD_SLOT_BYTES];
        let ty = FieldType::from_tag(slot[0])
            .ok_or_else(|| Error::illegal_state("corrupt window slot"))?;
        let mut len = [0u8; 4];
        len.copy_from_slice(&slot[4..8]);
        let mut value = [0u8; 8];
        value.copy_from_slice(&slot[8..16]);
        Ok(Field {
            ty,
            len: u32::from_le_bytes(len),
            value: u64::from_le_bytes(value),
        })
    }

    fn payload(&self, field: Field) -> &[u8] {
        let start = field.value as usize;
        &self.data[start..start + field.len as usize]
    }

    /// Read a cell as it was stored. `row` is relative to the window start.
    pub fn read_value(&self, row: usize, column: usize) -> Result<ValueRef<'_>> {
        let field = self.field(row, column)?;
        Ok(match field.ty {
            FieldType::Null => ValueRef::Null,
            FieldType::Integer => ValueRef::Integer(field.value as i64),
            FieldType::Float => ValueRef::Real(f64::from_bits(field.value)),
            FieldType::Text => ValueRef::Text(self.payload(field)),
            FieldType::Blob => ValueRef::Blob(self.payload(field)),
        })
    }

    pub fn read_type(&self, row: usize, column: usize) -> Result<FieldType> {
        Ok(self.field(row, column)?.ty)
    }

    pub fn is_null(&self, row: usize, column: usize) -> Result<bool> {
        Ok(self.read_type(row, column)? == FieldType::Null)
    }

    /// Read a cell as an integer. NULL reads as 0, text is parsed, floats truncate.
    pub fn read_long(&self, row: usize, column: usize) -> Result<i64> {
        match self.read_value(row, column)? {
            ValueRef::Null => Ok(0),
            ValueRef::Integer(v) => Ok(v),
            ValueRef::Real(v) => Ok(v as i64),
            ValueRef::Text(bytes) => Ok(text_to_i64(bytes)),
            ValueRef::Blob(_) => Err(type_error("INTEGER", FieldType::Blob, column)),
        }
    }

    /// Read a cell as a float. NULL reads as 0.0, text is parsed.
    pub fn read_double(&self, row: usize, column: usize) -> Result<f64> {
        match self.read_value(row, column)? {
            ValueRef::Null => Ok(0.0),
            ValueRef::Integer(v) => Ok(v as f64),
            ValueRef::Real(v) => Ok(v),
            ValueRef::Text(bytes) => Ok(text_to_f64(bytes)),
            ValueRef::Blob(_) => Err(type_error("FLOAT", FieldType::Blob, column)),
        }
    }

    /// Read a cell as text. NULL reads as `None`, numbers are formatted.
    pub fn read_text(&self, row: usize, column: usize) -> Result<Option<Cow<'_, str>>> {
        match self.read_value(row, column)? {
            ValueRef::Null => Ok(None),
            ValueRef::Integer(v) => Ok(Some(Cow::Owned(v.to_string()))),
            ValueRef::Real(v) => Ok(Some(Cow::Owned(v.to_string()))),
            ValueRef::Text(bytes) => Ok(Some(String::from_utf8_lossy(bytes))),
            ValueRef::Blob(_) => Err(type_error("TEXT", FieldType::Blob, column)),
        }
    }

    /// Read a cell as bytes. NULL reads as `None`, text yields its UTF-8 bytes.
    pub fn read_blob(&self, row: usize, column: usize) -> Result<Option<&[u8]>> {
        match self.read_value(row, column)? {
            ValueRef::Null => Ok(None),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Ok(Some(bytes)),
            ValueRef::Integer(_) => Err(type_error("BLOB", FieldType::Integer, column)),
            ValueRef::Real(_) => Err(type_error("BLOB", FieldType::Float, column)),
        }
    }
}

impl Default for ResultWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

fn type_error(expected: &'static str, actual: FieldType, column: usize) -> Error {
    Error::Type(TypeError {
        expected,
        actual: actual.name(),
        column: Some(column),
    })
}

/// Longest leading numeric literal after optional whitespace.
/// Returns the literal and whether it has a fraction or exponent.
fn numeric_prefix(bytes: &[u8]) -> (&str, bool) {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let s = &bytes[start..];
    let mut end = 0;
    if matches!(s.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while s.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut saw_digits = end > digits_start;
    let mut is_real = false;

    if s.get(end) == Some(&b'.') {
        let mut frac_end = end + 1;
        while s.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        if saw_digits || frac_end > end + 1 {
            saw_digits = true;
            is_real = true;
            end = frac_end;
        }
    }

    if saw_digits && matches!(s.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(s.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while s.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            is_real = true;
            end = exp_end;
        }
    }

    if !saw_digits {
        return ("", false);
    }
    // The prefix is ASCII by construction.
    (std::str::from_utf8(&s[..end]).unwrap_or(""), is_real)
}

fn text_to_i64(bytes: &[u8]) -> i64 {
    let (literal, is_real) = numeric_prefix(bytes);
    if literal.is_empty() {
        return 0;
    }
    if !is_real {
        if let Ok(v) = literal.parse::<i64>() {
            return v;
        }
    }
    literal.parse::<f64>().map_or(0, |v| v as i64)
}

fn text_to_f64(bytes: &[u8]) -> f64 {
    let (literal, _) = numeric_prefix(bytes);
    literal.parse::<f64>().unwrap_or(0.0)
}
