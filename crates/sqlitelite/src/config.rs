//! Connection configuration.

use crate::ffi;
use serde::{Deserialize, Serialize};
use sqlitelite_core::{ConfigError, DEFAULT_WINDOW_CAPACITY, Error, Result};
use std::ffi::c_int;
use std::path::{Path, PathBuf};

/// Path marker for an in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Default busy timeout applied at open, in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 2500;

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open as a purely in-memory database.
    pub memory: bool,
    /// Open in multi-thread mode (connections not shared between threads).
    pub no_mutex: bool,
    /// Open in serialized mode (connections can be shared).
    pub full_mutex: bool,
    /// Refuse to open the database through a symbolic link.
    pub no_follow: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Read-write, create if missing, never follow symlinks.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            no_follow: true,
            ..Default::default()
        }
    }

    pub(crate) fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.memory {
            flags |= ffi::SQLITE_OPEN_MEMORY;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }
        if self.no_follow {
            flags |= ffi::SQLITE_OPEN_NOFOLLOW;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

/// Everything needed to open a database and bring its schema up to date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file, or `None` for an in-memory database.
    pub path: Option<PathBuf>,
    /// Target schema version. Zero or less skips migration.
    pub version: i32,
    pub flags: OpenFlags,
    /// Value for `PRAGMA foreign_keys`.
    pub foreign_keys: bool,
    /// Switch on-disk, writable databases to write-ahead logging.
    pub wal: bool,
    pub busy_timeout_ms: u32,
    /// Byte capacity of result windows created by this connection.
    pub window_capacity: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            version: 0,
            flags: OpenFlags::create_read_write(),
            foreign_keys: false,
            wal: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
        }
    }
}

impl DatabaseConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Load a config from JSON text. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("Invalid database config: {}", e),
                source: Some(Box::new(e)),
            })
        })
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn wal(mut self, enabled: bool) -> Self {
        self.wal = enabled;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn window_capacity(mut self, bytes: usize) -> Self {
        self.window_capacity = bytes;
        self
    }

    /// Path handed to the engine.
    pub fn path_str(&self) -> Result<String> {
        match &self.path {
            None => Ok(MEMORY_PATH.to_string()),
            Some(path) => path_to_string(path),
        }
    }

    /// Does this config describe an in-memory database?
    pub fn is_memory(&self) -> bool {
        self.flags.memory
            || self
                .path
                .as_deref()
                .is_none_or(|p| p.as_os_str() == MEMORY_PATH)
    }
}

fn path_to_string(path: &Path) -> Result<String> {
    path.to_str().map(str::to_string).ok_or_else(|| {
        Error::Config(ConfigError {
            message: format!("Database path is not valid UTF-8: {}", path.display()),
            source: None,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flags_create_read_write_no_follow() {
        let flags = OpenFlags::create_read_write().to_sqlite_flags();
        assert_eq!(
            flags,
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_NOFOLLOW
        );
        assert_eq!(DatabaseConfig::default().flags, OpenFlags::create_read_write());
    }

    #[test]
    fn empty_flags_fall_back_to_read_write_create() {
        let flags = OpenFlags::default().to_sqlite_flags();
        assert_eq!(flags, ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE);
        assert_eq!(OpenFlags::read_only().to_sqlite_flags(), ffi::SQLITE_OPEN_READONLY);
    }

    #[test]
    fn memory_detection() {
        assert!(DatabaseConfig::memory().is_memory());
        assert!(DatabaseConfig::file(MEMORY_PATH).is_memory());
        assert!(!DatabaseConfig::file("/tmp/app.db").is_memory());
        assert_eq!(DatabaseConfig::memory().path_str().unwrap(), MEMORY_PATH);
    }

    #[test]
    fn json_with_defaults() {
        let config = DatabaseConfig::from_json(
            r#"{"path": "data/app.db", "version": 3, "flags": {"read_only": true}}"#,
        )
        .unwrap();
        assert_eq!(config.path.as_deref(), Some(Path::new("data/app.db")));
        assert_eq!(config.version, 3);
        assert!(config.flags.read_only);
        assert!(!config.flags.read_write);
        assert!(config.wal);
        assert_eq!(config.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
        assert_eq!(config.window_capacity, DEFAULT_WINDOW_CAPACITY);
    }

    #[test]
    fn bad_json_is_a_config_error() {
        let err = DatabaseConfig::from_json("{\"version\": \"three\"}").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn builder_chain() {
        let config = DatabaseConfig::file("x.db")
            .version(2)
            .foreign_keys(true)
            .wal(false)
            .busy_timeout(100)
            .window_capacity(4096);
        assert_eq!(config.version, 2);
        assert!(config.foreign_keys);
        assert!(!config.wal);
        assert_eq!(config.busy_timeout_ms, 100);
        assert_eq!(config.window_capacity, 4096);
    }
}
