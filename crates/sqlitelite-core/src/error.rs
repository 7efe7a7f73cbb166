//! Error types for sqlitelite operations.

use std::fmt;

/// The primary error type for all sqlitelite operations.
#[derive(Debug)]
pub enum Error {
    /// A failure reported by the embedded engine
    Engine(EngineError),
    /// A scalar execute or a bind call saw the wrong number of columns, rows or arguments
    ShapeMismatch(ShapeMismatchError),
    /// Operation invoked in the wrong statement/connection/cursor state
    IllegalState(IllegalStateError),
    /// Index outside the valid range (bind index, window cell, cursor position)
    Range(RangeError),
    /// A single row does not fit into an empty result window
    Capacity(CapacityError),
    /// Stored value cannot be coerced to the requested type
    Type(TypeError),
    /// Configuration errors
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
    /// A primary error with secondary failures collected during cleanup
    Suppressed {
        error: Box<Error>,
        suppressed: Vec<Error>,
    },
    /// Custom error with message
    Custom(String),
}

#[derive(Debug, Clone)]
pub struct EngineError {
    pub kind: EngineErrorKind,
    /// Primary result code (low byte of the extended code).
    pub code: i32,
    /// Extended result code as reported by the engine.
    pub extended_code: i32,
    pub message: String,
    /// SQL text being compiled when the error happened.
    pub sql: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Constraint violation (unique, foreign key, not null, check)
    Constraint,
    /// Database file is locked by another connection
    Busy,
    /// Table is locked within the same connection
    Locked,
    /// Operation interrupted from another thread
    Interrupted,
    /// Database image is malformed or not a database at all
    Corrupt,
    /// Attempt to write a read-only database
    ReadOnly,
    /// Unable to open the database file
    CantOpen,
    /// Disk full
    Full,
    /// Disk I/O error
    IoErr,
    /// Library used incorrectly
    Misuse,
    /// Bind or column index out of range
    Range,
    /// String or blob too big
    TooBig,
    /// Out of memory
    NoMem,
    /// Data type mismatch
    Mismatch,
    /// Access permission denied
    Permission,
    /// Callback requested an abort
    Abort,
    /// Any other engine failure (syntax errors included)
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeMismatchKind {
    /// Result has a different column count
    Columns,
    /// Result has more rows than allowed
    Rows,
    /// Bind argument count differs from the parameter count
    Arguments,
}

#[derive(Debug, Clone)]
pub struct ShapeMismatchError {
    pub kind: ShapeMismatchKind,
    pub expected: usize,
    /// Observed count; for rows, the count at which stepping stopped.
    pub actual: usize,
}

#[derive(Debug, Clone)]
pub struct IllegalStateError {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RangeError {
    /// What was being indexed ("bind index", "window row", ...).
    pub what: &'static str,
    pub index: i64,
    /// Largest valid index, or the count the index was checked against.
    pub limit: i64,
}

#[derive(Debug, Clone)]
pub struct CapacityError {
    /// Absolute position of the row that did not fit.
    pub row: usize,
    /// Total capacity of the window in bytes.
    pub capacity: usize,
}

#[derive(Debug, Clone)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: &'static str,
    pub column: Option<usize>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EngineErrorKind {
    /// Classify an engine result code. Extended codes are reduced to their primary code.
    pub fn from_code(code: i32) -> Self {
        match code & 0xff {
            3 | 23 => EngineErrorKind::Permission,
            4 => EngineErrorKind::Abort,
            5 => EngineErrorKind::Busy,
            6 => EngineErrorKind::Locked,
            7 => EngineErrorKind::NoMem,
            8 => EngineErrorKind::ReadOnly,
            9 => EngineErrorKind::Interrupted,
            10 => EngineErrorKind::IoErr,
            11 | 26 => EngineErrorKind::Corrupt,
            13 => EngineErrorKind::Full,
            14 => EngineErrorKind::CantOpen,
            18 => EngineErrorKind::TooBig,
            19 => EngineErrorKind::Constraint,
            20 => EngineErrorKind::Mismatch,
            21 => EngineErrorKind::Misuse,
            25 => EngineErrorKind::Range,
            _ => EngineErrorKind::Other,
        }
    }
}

impl EngineError {
    /// Build an engine error from an extended result code and message.
    pub fn new(extended_code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: EngineErrorKind::from_code(extended_code),
            code: extended_code & 0xff,
            extended_code,
            message: message.into(),
            sql: None,
        }
    }

    /// Attach the SQL text that was being compiled.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl Error {
    /// Shorthand for an [`IllegalStateError`].
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Error::IllegalState(IllegalStateError {
            message: message.into(),
        })
    }

    /// Shorthand for a [`RangeError`].
    pub fn range(what: &'static str, index: i64, limit: i64) -> Self {
        Error::Range(RangeError { what, index, limit })
    }

    /// Shorthand for a [`ShapeMismatchError`].
    pub fn shape(kind: ShapeMismatchKind, expected: usize, actual: usize) -> Self {
        Error::ShapeMismatch(ShapeMismatchError {
            kind,
            expected,
            actual,
        })
    }

    /// Attach a secondary failure to this error, keeping `self` as the primary one.
    pub fn suppress(self, other: Error) -> Error {
        match self {
            Error::Suppressed {
                error,
                mut suppressed,
            } => {
                suppressed.push(other);
                Error::Suppressed { error, suppressed }
            }
            primary => Error::Suppressed {
                error: Box::new(primary),
                suppressed: vec![other],
            },
        }
    }

    /// The error with all suppressed failures stripped off.
    pub fn primary(&self) -> &Error {
        match self {
            Error::Suppressed { error, .. } => error.primary(),
            other => other,
        }
    }

    /// Secondary failures collected alongside this error.
    pub fn suppressed(&self) -> &[Error] {
        match self {
            Error::Suppressed { suppressed, .. } => suppressed,
            _ => &[],
        }
    }

    /// The engine error behind this error, if any.
    pub fn engine(&self) -> Option<&EngineError> {
        match self.primary() {
            Error::Engine(e) => Some(e),
            _ => None,
        }
    }

    /// Was the operation cancelled by an interrupt?
    pub fn is_interrupted(&self) -> bool {
        self.engine()
            .is_some_and(|e| e.kind == EngineErrorKind::Interrupted)
    }

    /// Does the engine consider the database file damaged?
    pub fn is_corruption(&self) -> bool {
        self.engine()
            .is_some_and(|e| e.kind == EngineErrorKind::Corrupt)
    }

    /// Is this a busy/locked condition that may clear up later?
    pub fn is_busy(&self) -> bool {
        self.engine().is_some_and(|e| {
            matches!(e.kind, EngineErrorKind::Busy | EngineErrorKind::Locked)
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Engine(e) => write!(f, "Engine error: {}", e),
            Error::ShapeMismatch(e) => write!(f, "Shape mismatch: {}", e),
            Error::IllegalState(e) => write!(f, "Illegal state: {}", e.message),
            Error::Range(e) => write!(f, "Out of range: {}", e),
            Error::Capacity(e) => write!(f, "Window capacity exceeded: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Suppressed { error, suppressed } => {
                write!(f, "{}", error)?;
                for (i, other) in suppressed.iter().enumerate() {
                    let sep = if i == 0 { " [suppressed: " } else { "; " };
                    write!(f, "{}{}", sep, other)?;
                }
                if !suppressed.is_empty() {
                    write!(f, "]")?;
                }
                Ok(())
            }
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            Error::Suppressed { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.extended_code)?;
        if let Some(sql) = &self.sql {
            write!(f, ", while compiling: {}", sql)?;
        }
        Ok(())
    }
}

impl fmt::Display for ShapeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ShapeMismatchKind::Columns => write!(
                f,
                "expected exactly {} column(s), got {}",
                self.expected, self.actual
            ),
            ShapeMismatchKind::Rows => {
                write!(f, "expected at most {} row(s), got more", self.expected)
            }
            ShapeMismatchKind::Arguments => write!(
                f,
                "expected {} bind argument(s), got {}",
                self.expected, self.actual
            ),
        }
    }
}

impl fmt::Display for IllegalStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} out of range (limit {})", self.what, self.index, self.limit)
    }
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} does not fit into an empty window of {} bytes",
            self.row, self.capacity
        )
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = self.column {
            write!(
                f,
                "expected {} for column {}, found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        Error::Engine(err)
    }
}

impl From<ShapeMismatchError> for Error {
    fn from(err: ShapeMismatchError) -> Self {
        Error::ShapeMismatch(err)
    }
}

impl From<IllegalStateError> for Error {
    fn from(err: IllegalStateError) -> Self {
        Error::IllegalState(err)
    }
}

impl From<RangeError> for Error {
    fn from(err: RangeError) -> Self {
        Error::Range(err)
    }
}

impl From<CapacityError> for Error {
    fn from(err: CapacityError) -> Self {
        Error::Capacity(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for sqlitelite operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_codes_reduce_to_primary_kind() {
        // SQLITE_CONSTRAINT_UNIQUE = 2067
        let err = EngineError::new(2067, "UNIQUE constraint failed: t.id");
        assert_eq!(err.kind, EngineErrorKind::Constraint);
        assert_eq!(err.code, 19);
        assert_eq!(err.extended_code, 2067);

        assert_eq!(EngineErrorKind::from_code(26), EngineErrorKind::Corrupt);
        assert_eq!(EngineErrorKind::from_code(11), EngineErrorKind::Corrupt);
        assert_eq!(EngineErrorKind::from_code(9), EngineErrorKind::Interrupted);
        assert_eq!(EngineErrorKind::from_code(1), EngineErrorKind::Other);
    }

    #[test]
    fn engine_display_includes_code_and_sql() {
        let err = Error::Engine(
            EngineError::new(1, "near \"SELEC\": syntax error").with_sql("SELEC 1"),
        );
        let text = err.to_string();
        assert!(text.contains("syntax error"));
        assert!(text.contains("(code 1)"));
        assert!(text.ends_with(", while compiling: SELEC 1"));
    }

    #[test]
    fn classification_helpers() {
        let interrupted = Error::Engine(EngineError::new(9, "interrupted"));
        assert!(interrupted.is_interrupted());
        assert!(!interrupted.is_busy());

        let busy = Error::Engine(EngineError::new(5, "database is locked"));
        assert!(busy.is_busy());

        let corrupt = Error::Engine(EngineError::new(26, "file is not a database"));
        assert!(corrupt.is_corruption());

        assert!(!Error::illegal_state("nope").is_corruption());
    }

    #[test]
    fn suppress_keeps_primary_and_collects_secondaries() {
        let err = Error::illegal_state("first")
            .suppress(Error::Custom("second".to_string()))
            .suppress(Error::Custom("third".to_string()));

        assert!(matches!(err.primary(), Error::IllegalState(_)));
        assert_eq!(err.suppressed().len(), 2);

        let text = err.to_string();
        assert!(text.starts_with("Illegal state: first"));
        assert!(text.contains("[suppressed: second; third]"));
    }

    #[test]
    fn suppressed_corruption_still_classified() {
        let err = Error::Engine(EngineError::new(11, "database disk image is malformed"))
            .suppress(Error::illegal_state("close failed"));
        assert!(err.is_corruption());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn shape_and_range_messages() {
        let err = Error::shape(ShapeMismatchKind::Columns, 1, 3);
        assert_eq!(
            err.to_string(),
            "Shape mismatch: expected exactly 1 column(s), got 3"
        );

        let err = Error::range("bind index", 4, 3);
        assert_eq!(err.to_string(), "Out of range: bind index 4 out of range (limit 3)");
    }
}
