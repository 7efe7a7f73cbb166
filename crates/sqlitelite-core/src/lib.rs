//! Core types for sqlitelite.
//!
//! This crate holds everything that does not touch the engine directly:
//!
//! - `Error` and friends, the error taxonomy shared by all crates
//! - `Value` / `ValueRef` for parameters and row cells
//! - `ResultWindow`, a byte-bounded buffer of result rows
//! - `WindowCursor`, random access over any forward-only `RowSource`

pub mod cursor;
pub mod error;
pub mod memory;
pub mod value;
pub mod window;

pub use cursor::{FillOutcome, RowSource, WindowCursor, fill_window};
pub use error::{
    CapacityError, ConfigError, EngineError, EngineErrorKind, Error, IllegalStateError,
    RangeError, Result, ShapeMismatchError, ShapeMismatchKind, TypeError,
};
pub use memory::MemoryRows;
pub use value::{FieldType, Value, ValueRef};
pub use window::{DEFAULT_WINDOW_CAPACITY, Fit, ResultWindow};
