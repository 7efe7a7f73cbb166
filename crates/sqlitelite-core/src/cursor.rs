//! Random access over a forward-only row source.
//!
//! [`WindowCursor`] keeps one [`ResultWindow`] of rows and refills it from its
//! [`RowSource`] whenever the requested position falls outside the window.
//! Every refill restarts the source from the first row and skips ahead, since
//! the engine can only step forward.
//!
//! The window is placed so that roughly a third of its rows lie before the
//! required row: `fill_start = max(R - capacity_hint / 3, 0)`. If the window
//! runs out of room before `R` was stored, the rows collected so far are
//! discarded and filling resumes with `R` in the first slot.

use crate::error::{CapacityError, Error, Result};
use crate::value::FieldType;
use crate::window::{DEFAULT_WINDOW_CAPACITY, Fit, ResultWindow};
use tracing::{debug, trace};

/// A forward-only producer of rows that can be restarted.
pub trait RowSource {
    /// Number of columns in every row.
    fn column_count(&self) -> Result<usize>;

    /// Column names, in order.
    fn column_names(&self) -> Result<Vec<String>>;

    /// Rewind to before the first row.
    fn reset(&mut self) -> Result<()>;

    /// Advance to the next row. Returns `false` once exhausted.
    fn step(&mut self) -> Result<bool>;

    /// Append the current row to `window`.
    ///
    /// Must leave the window unchanged when returning [`Fit::Full`].
    fn copy_row(&mut self, window: &mut ResultWindow) -> Result<Fit>;

    /// Release the source. Called by [`WindowCursor::close`].
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: RowSource + ?Sized> RowSource for &mut S {
    fn column_count(&self) -> Result<usize> {
        (**self).column_count()
    }

    fn column_names(&self) -> Result<Vec<String>> {
        (**self).column_names()
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn step(&mut self) -> Result<bool> {
        (**self).step()
    }

    fn copy_row(&mut self, window: &mut ResultWindow) -> Result<Fit> {
        (**self).copy_row(window)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// What a single [`fill_window`] pass observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillOutcome {
    /// Rows stepped over, stored or not.
    pub rows_scanned: usize,
    /// The source was exhausted, so `rows_scanned` is the total row count.
    pub reached_end: bool,
    /// Rows the window held when it first ran out of room.
    pub full_at: Option<usize>,
}

/// Fill `window` from `source`, starting at absolute row `fill_start`.
///
/// The source is reset before and after the pass. When the window fills up
/// before `required` was stored, it is cleared and filling continues with
/// `required` as the first row. With `count_all`, stepping continues past a
/// full window so the total row count is learned.
#[tracing::instrument(level = "debug", skip(source, window))]
pub fn fill_window<S: RowSource + ?Sized>(
    source: &mut S,
    window: &mut ResultWindow,
    fill_start: usize,
    required: usize,
    count_all: bool,
) -> Result<FillOutcome> {
    source.reset()?;
    window.clear();
    window.set_column_count(source.column_count()?)?;
    window.set_start_position(fill_start);

    let result = fill_rows(source, window, fill_start, required, count_all);
    let reset = source.reset();

    match (result, reset) {
        (Ok(outcome), Ok(())) => {
            debug!(
                start = window.start_position(),
                rows = window.row_count(),
                scanned = outcome.rows_scanned,
                reached_end = outcome.reached_end,
                "window filled"
            );
            Ok(outcome)
        }
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(secondary)) => Err(e.suppress(secondary)),
    }
}

fn fill_rows<S: RowSource + ?Sized>(
    source: &mut S,
    window: &mut ResultWindow,
    fill_start: usize,
    required: usize,
    count_all: bool,
) -> Result<FillOutcome> {
    let mut start = fill_start;
    let mut scanned = 0usize;
    let mut full = false;
    let mut full_at = None;

    loop {
        if full && !count_all {
            return Ok(FillOutcome {
                rows_scanned: scanned,
                reached_end: false,
                full_at,
            });
        }
        if !source.step()? {
            return Ok(FillOutcome {
                rows_scanned: scanned,
                reached_end: true,
                full_at,
            });
        }
        let position = scanned;
        scanned += 1;
        if full || position < start {
            continue;
        }

        if source.copy_row(window)? == Fit::Stored {
            continue;
        }
        if window.row_count() == 0 {
            if position >= required {
                return Err(capacity_error(window, position));
            }
        } else if full_at.is_none() {
            full_at = Some(window.row_count());
        }
        if position > required {
            full = true;
            continue;
        }

        trace!(
            discarded = window.row_count(),
            required, "window full before required row, restarting at it"
        );
        window.clear();
        start = required;
        window.set_start_position(start);
        if position == required && source.copy_row(window)? == Fit::Full {
            return Err(capacity_error(window, position));
        }
    }
}

fn capacity_error(window: &ResultWindow, row: usize) -> Error {
    Error::Capacity(CapacityError {
        row,
        capacity: window.capacity(),
    })
}

/// Random-access cursor over a [`RowSource`], backed by a paged window.
///
/// Positions are absolute row numbers; `-1` is before the first row and
/// `count` is after the last one.
#[derive(Debug)]
pub struct WindowCursor<S: RowSource> {
    source: S,
    window: Option<ResultWindow>,
    window_capacity: usize,
    position: i64,
    count: Option<usize>,
    capacity_hint: usize,
    column_names: Option<Vec<String>>,
    closed: bool,
}

impl<S: RowSource> WindowCursor<S> {
    /// Create a cursor with the default 2 MiB window.
    pub fn new(source: S) -> Self {
        Self::with_window_capacity(source, DEFAULT_WINDOW_CAPACITY)
    }

    /// Create a cursor whose window holds up to `capacity` bytes.
    pub fn with_window_capacity(source: S, capacity: usize) -> Self {
        Self {
            source,
            window: None,
            window_capacity: capacity,
            position: -1,
            count: None,
            capacity_hint: 0,
            column_names: None,
            closed: false,
        }
    }

    /// Current absolute position.
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Total row count, if a fill has already learned it.
    pub fn known_count(&self) -> Option<usize> {
        self.count
    }

    /// Rows the window held after its last fill that ran out of room.
    pub fn capacity_hint(&self) -> usize {
        self.capacity_hint
    }

    /// The current window, if one has been filled.
    pub fn window(&self) -> Option<&ResultWindow> {
        self.window.as_ref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Give the source back without closing it.
    pub fn into_source(self) -> S {
        self.source
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::illegal_state("Cursor is closed"));
        }
        Ok(())
    }

    fn window_covers(&self, row: usize) -> bool {
        self.window.as_ref().is_some_and(|w| w.covers(row))
    }

    fn fill_start_for(&self, required: usize) -> usize {
        if self.capacity_hint == 0 {
            0
        } else {
            required.saturating_sub(self.capacity_hint / 3)
        }
    }

    fn fill(&mut self, required: usize, count_all: bool) -> Result<FillOutcome> {
        let fill_start = self.fill_start_for(required);
        let mut window = self
            .window
            .take()
            .unwrap_or_else(|| ResultWindow::new(self.window_capacity));

        let outcome = fill_window(&mut self.source, &mut window, fill_start, required, count_all)?;
        if outcome.reached_end {
            self.count = Some(outcome.rows_scanned);
        }
        if let Some(rows) = outcome.full_at {
            self.capacity_hint = rows;
        } else if self.capacity_hint == 0 {
            self.capacity_hint = window.row_count();
        }
        self.window = Some(window);
        Ok(outcome)
    }

    /// Total number of rows, scanning the whole result once if still unknown.
    pub fn get_row_count(&mut self) -> Result<usize> {
        self.check_open()?;
        if let Some(count) = self.count {
            return Ok(count);
        }
        let outcome = self.fill(0, true)?;
        Ok(outcome.rows_scanned)
    }

    /// Move to an absolute position. Returns `true` if a row is there.
    ///
    /// Positions before the first row clamp to `-1`, positions past the end
    /// clamp to the row count.
    pub fn move_to_position(&mut self, position: i64) -> Result<bool> {
        self.check_open()?;
        if position < 0 {
            self.position = -1;
            return Ok(false);
        }
        let target = position as usize;
        if let Some(count) = self.count {
            if target >= count {
                self.position = count as i64;
                return Ok(false);
            }
        }

        if !self.window_covers(target) {
            self.fill(target, false)?;
        }
        if self.window_covers(target) {
            self.position = position;
            return Ok(true);
        }

        let count = self
            .count
            .ok_or_else(|| Error::illegal_state("Window fill stopped before the requested row"))?;
        self.position = count as i64;
        Ok(false)
    }

    pub fn move_by(&mut self, offset: i64) -> Result<bool> {
        self.move_to_position(self.position.saturating_add(offset))
    }

    pub fn move_to_next(&mut self) -> Result<bool> {
        self.move_by(1)
    }

    pub fn move_to_previous(&mut self) -> Result<bool> {
        self.move_by(-1)
    }

    pub fn move_to_first(&mut self) -> Result<bool> {
        self.move_to_position(0)
    }

    pub fn move_to_last(&mut self) -> Result<bool> {
        let count = self.get_row_count()?;
        self.move_to_position(count as i64 - 1)
    }

    pub fn is_before_first(&mut self) -> Result<bool> {
        Ok(self.get_row_count()? == 0 || self.position == -1)
    }

    pub fn is_after_last(&mut self) -> Result<bool> {
        let count = self.get_row_count()?;
        Ok(count == 0 || self.position == count as i64)
    }

    pub fn is_first(&mut self) -> Result<bool> {
        Ok(self.position == 0 && self.get_row_count()? != 0)
    }

    pub fn is_last(&mut self) -> Result<bool> {
        let count = self.get_row_count()?;
        Ok(count != 0 && self.position == count as i64 - 1)
    }

    pub fn column_count(&self) -> Result<usize> {
        self.check_open()?;
        self.source.column_count()
    }

    pub fn column_names(&mut self) -> Result<&[String]> {
        self.check_open()?;
        if self.column_names.is_none() {
            self.column_names = Some(self.source.column_names()?);
        }
        Ok(self.column_names.as_deref().unwrap_or_default())
    }

    /// Index of the column called `name`, if any.
    pub fn column_index(&mut self, name: &str) -> Result<Option<usize>> {
        Ok(self.column_names()?.iter().position(|n| n == name))
    }

    /// Make sure the current row is in the window and return its window-relative index.
    fn current_row(&mut self) -> Result<usize> {
        self.check_open()?;
        let limit = self.count.map_or(i64::MAX, |c| c as i64);
        if self.position < 0 || self.position >= limit {
            return Err(Error::range("cursor position", self.position, limit));
        }
        let row = self.position as usize;
        if !self.window_covers(row) {
            self.fill(row, false)?;
        }
        match &self.window {
            Some(w) if w.covers(row) => Ok(row - w.start_position()),
            _ => Err(Error::range(
                "cursor position",
                self.position,
                self.count.map_or(0, |c| c as i64),
            )),
        }
    }

    fn with_window<T>(&mut self, read: impl FnOnce(&ResultWindow, usize) -> Result<T>) -> Result<T> {
        let row = self.current_row()?;
        match &self.window {
            Some(w) => read(w, row),
            None => Err(Error::illegal_state("No window")),
        }
    }

    pub fn get_type(&mut self, column: usize) -> Result<FieldType> {
        self.with_window(|w, row| w.read_type(row, column))
    }

    pub fn is_null(&mut self, column: usize) -> Result<bool> {
        self.with_window(|w, row| w.is_null(row, column))
    }

    pub fn get_long(&mut self, column: usize) -> Result<i64> {
        self.with_window(|w, row| w.read_long(row, column))
    }

    pub fn get_double(&mut self, column: usize) -> Result<f64> {
        self.with_window(|w, row| w.read_double(row, column))
    }

    pub fn get_bool(&mut self, column: usize) -> Result<bool> {
        Ok(self.get_long(column)? != 0)
    }

    pub fn get_text(&mut self, column: usize) -> Result<Option<String>> {
        self.with_window(|w, row| Ok(w.read_text(row, column)?.map(|s| s.into_owned())))
    }

    pub fn get_blob(&mut self, column: usize) -> Result<Option<Vec<u8>>> {
        self.with_window(|w, row| Ok(w.read_blob(row, column)?.map(<[u8]>::to_vec)))
    }

    /// Forget the window, the row count and the position. The next access re-runs the query.
    pub fn requery(&mut self) -> Result<()> {
        self.check_open()?;
        self.window = None;
        self.count = None;
        self.position = -1;
        self.source.reset()
    }

    /// Drop the window and close the source. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.window = None;
        self.source.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRows;
    use crate::value::Value;

    fn numbers(n: i64) -> MemoryRows {
        MemoryRows::new(
            vec!["n".to_string()],
            (0..n).map(|i| vec![Value::Integer(i)]).collect(),
        )
    }

    // One integer column costs 16 bytes of slot plus 4 of row index.
    const ROW_BYTES: usize = 20;

    #[test]
    fn count_and_sequential_scan() {
        let mut cursor = WindowCursor::with_window_capacity(numbers(100), 10 * ROW_BYTES);
        assert_eq!(cursor.get_row_count().unwrap(), 100);

        let mut seen = 0;
        while cursor.move_to_next().unwrap() {
            assert_eq!(cursor.get_long(0).unwrap(), seen);
            seen += 1;
        }
        assert_eq!(seen, 100);
        assert!(cursor.is_after_last().unwrap());
        assert!(!cursor.move_to_next().unwrap());
        assert_eq!(cursor.position(), 100);
    }

    #[test]
    fn first_fill_starts_at_zero_and_learns_hint() {
        let mut cursor = WindowCursor::with_window_capacity(numbers(50), 10 * ROW_BYTES);
        assert!(cursor.move_to_position(3).unwrap());
        let w = cursor.window().unwrap();
        assert_eq!(w.start_position(), 0);
        assert_eq!(w.row_count(), 10);
        assert_eq!(cursor.capacity_hint(), 10);
        assert_eq!(cursor.known_count(), None);
    }

    #[test]
    fn refill_leaves_backward_slack() {
        let mut cursor = WindowCursor::with_window_capacity(numbers(50), 9 * ROW_BYTES);
        assert!(cursor.move_to_first().unwrap());
        assert_eq!(cursor.capacity_hint(), 9);

        assert!(cursor.move_to_position(30).unwrap());
        let w = cursor.window().unwrap();
        assert_eq!(w.start_position(), 27);
        assert_eq!(cursor.get_long(0).unwrap(), 30);

        // Backward steps inside the slack do not refill.
        let resets = cursor.source().resets();
        assert!(cursor.move_to_position(28).unwrap());
        assert_eq!(cursor.get_long(0).unwrap(), 28);
        assert_eq!(cursor.source().resets(), resets);
    }

    #[test]
    fn overflow_before_required_row_restarts_at_it() {
        // Far seek on the very first fill: fill starts at 0, overflows, and
        // resumes with the required row in the first slot in the same pass.
        let mut cursor = WindowCursor::with_window_capacity(numbers(1000), 10 * ROW_BYTES);
        assert!(cursor.move_to_position(998).unwrap());
        let w = cursor.window().unwrap();
        assert_eq!(w.start_position(), 998);
        assert_eq!(w.row_count(), 2);
        assert_eq!(cursor.get_long(0).unwrap(), 998);
        assert_eq!(cursor.known_count(), Some(1000));
        assert_eq!(cursor.source().passes(), 1);
    }

    #[test]
    fn seek_past_end_clamps_to_count() {
        let mut cursor = WindowCursor::with_window_capacity(numbers(5), 100 * ROW_BYTES);
        assert!(!cursor.move_to_position(7).unwrap());
        assert_eq!(cursor.position(), 5);
        assert_eq!(cursor.known_count(), Some(5));
        assert!(!cursor.move_to_position(-3).unwrap());
        assert_eq!(cursor.position(), -1);
        assert!(cursor.is_before_first().unwrap());
    }

    #[test]
    fn count_all_continues_past_full_window() {
        let mut cursor = WindowCursor::with_window_capacity(numbers(500), 10 * ROW_BYTES);
        assert_eq!(cursor.get_row_count().unwrap(), 500);
        let w = cursor.window().unwrap();
        assert_eq!(w.start_position(), 0);
        assert_eq!(w.row_count(), 10);
        assert!(cursor.move_to_last().unwrap());
        assert!(cursor.is_last().unwrap());
        assert_eq!(cursor.get_long(0).unwrap(), 499);
    }

    #[test]
    fn reads_outside_rows_fail() {
        let mut cursor = WindowCursor::new(numbers(3));
        assert!(matches!(cursor.get_long(0), Err(Error::Range(_))));
        assert!(!cursor.move_to_position(3).unwrap());
        assert!(matches!(cursor.get_long(0), Err(Error::Range(_))));
    }

    #[test]
    fn oversized_row_is_a_capacity_error() {
        let rows = MemoryRows::new(
            vec!["t".to_string()],
            vec![vec![Value::Text("x".repeat(100))]],
        );
        let mut cursor = WindowCursor::with_window_capacity(rows, 64);
        let err = cursor.move_to_first().unwrap_err();
        assert!(matches!(err, Error::Capacity(CapacityError { row: 0, .. })));
        assert!(cursor.window().is_none());
    }

    #[test]
    fn oversized_row_before_required_row_is_skipped() {
        let mut data = vec![vec![Value::Text("x".repeat(500))]];
        data.extend((1..6).map(|i| vec![Value::Text(format!("r{i}"))]));
        let rows = MemoryRows::new(vec!["t".to_string()], data);
        let mut cursor = WindowCursor::with_window_capacity(rows, 200);

        assert!(cursor.move_to_position(3).unwrap());
        assert_eq!(cursor.get_text(0).unwrap().as_deref(), Some("r3"));
        assert_eq!(cursor.window().unwrap().start_position(), 3);

        // The oversized row itself still cannot be read.
        let err = cursor.move_to_first().unwrap_err();
        assert!(matches!(err, Error::Capacity(CapacityError { row: 0, .. })));
    }

    #[test]
    fn fill_failure_drops_window_and_propagates() {
        let mut rows = numbers(100);
        rows.fail_at_step(40);
        let mut cursor = WindowCursor::with_window_capacity(rows, 10 * ROW_BYTES);
        assert!(cursor.move_to_position(5).unwrap());
        assert!(cursor.window().is_some());

        assert!(cursor.move_to_position(45).is_err());
        assert!(cursor.window().is_none());
        assert_eq!(cursor.position(), 5);

        cursor.source_mut_for_tests().clear_failure();
        assert_eq!(cursor.get_long(0).unwrap(), 5);
    }

    #[test]
    fn requery_forgets_state() {
        let mut cursor = WindowCursor::new(numbers(4));
        assert_eq!(cursor.get_row_count().unwrap(), 4);
        assert!(cursor.move_to_position(2).unwrap());
        cursor.requery().unwrap();
        assert_eq!(cursor.position(), -1);
        assert!(cursor.window().is_none());
        assert_eq!(cursor.known_count(), None);
        assert!(cursor.move_to_next().unwrap());
        assert_eq!(cursor.get_long(0).unwrap(), 0);
    }

    #[test]
    fn close_is_idempotent() {
        let mut cursor = WindowCursor::new(numbers(2));
        assert!(cursor.move_to_first().unwrap());
        cursor.close().unwrap();
        cursor.close().unwrap();
        assert!(cursor.is_closed());
        assert!(cursor.source().is_closed());
        assert!(matches!(cursor.move_to_first(), Err(Error::IllegalState(_))));
    }

    #[test]
    fn typed_getters_and_names() {
        let rows = MemoryRows::new(
            vec!["id".to_string(), "name".to_string(), "data".to_string()],
            vec![vec![
                Value::Integer(1),
                Value::Text("alice".to_string()),
                Value::Blob(vec![7, 8]),
            ]],
        );
        let mut cursor = WindowCursor::new(rows);
        assert_eq!(cursor.column_index("name").unwrap(), Some(1));
        assert_eq!(cursor.column_index("nope").unwrap(), None);
        assert!(cursor.move_to_first().unwrap());
        assert!(cursor.get_bool(0).unwrap());
        assert_eq!(cursor.get_text(1).unwrap().as_deref(), Some("alice"));
        assert_eq!(cursor.get_blob(2).unwrap(), Some(vec![7, 8]));
        assert_eq!(cursor.get_type(2).unwrap(), FieldType::Blob);
        assert!(!cursor.is_null(0).unwrap());
    }

    impl<S: RowSource> WindowCursor<S> {
        fn source_mut_for_tests(&mut self) -> &mut S {
            &mut self.source
        }
    }
}
