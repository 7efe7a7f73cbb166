//! Lifecycle callbacks for [`Connection::open_with`](crate::Connection::open_with).

use crate::connection::Connection;
use sqlitelite_core::{Error, Result};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Hooks run while a database is opened.
///
/// Only [`Delegate::on_create`] is required. Schema changes made in
/// `on_create`, `on_upgrade` and `on_downgrade` run inside one exclusive
/// transaction together with the version bump, so a failure leaves the
/// database at its previous version.
pub trait Delegate {
    /// Called first on writable databases, before any version check.
    fn on_configure(&mut self, _conn: &Connection) -> Result<()> {
        Ok(())
    }

    /// Create the schema of a brand new database (stored version 0).
    fn on_create(&mut self, conn: &Connection) -> Result<()>;

    fn on_upgrade(&mut self, _conn: &Connection, _old_version: i32, _new_version: i32) -> Result<()> {
        Ok(())
    }

    /// Refuses by default.
    fn on_downgrade(&mut self, _conn: &Connection, old_version: i32, new_version: i32) -> Result<()> {
        Err(Error::illegal_state(format!(
            "Can't downgrade database from version {} to {}",
            old_version, new_version
        )))
    }

    /// Called last, once the schema is at the target version.
    fn on_open(&mut self, _conn: &Connection) -> Result<()> {
        Ok(())
    }

    /// The engine reported the database as corrupt during open.
    ///
    /// The default closes the connection and deletes the database files.
    /// Nothing is deleted for in-memory databases.
    fn on_corruption(&mut self, conn: &Connection) {
        error!(path = %conn.path(), "corruption reported on database");
        if let Err(e) = conn.close() {
            warn!(path = %conn.path(), error = %e, "failed to close corrupted database");
        }
        if conn.is_memory() {
            return;
        }
        match delete_database(Path::new(conn.path())) {
            Ok(()) => error!(path = %conn.path(), "deleted files of a corrupted database"),
            Err(e) => warn!(path = %conn.path(), error = %e, "failed to delete corrupted database"),
        }
    }
}

/// Suffixes of the files the engine keeps next to a database.
const COMPANION_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Delete a database file and its journal, WAL and shared-memory companions.
///
/// Missing files are skipped. Every file is attempted; the first failure is
/// returned with later ones attached.
pub fn delete_database(path: &Path) -> Result<()> {
    let mut targets = vec![path.to_path_buf()];
    targets.extend(COMPANION_SUFFIXES.iter().map(|suffix| companion(path, suffix)));

    let mut failure: Option<Error> = None;
    for target in targets {
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                let e = Error::Io(e);
                failure = Some(match failure.take() {
                    Some(primary) => primary.suppress(e),
                    None => e,
                });
            }
        }
    }
    failure.map_or(Ok(()), Err)
}

fn companion(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn companion_paths() {
        let path = Path::new("/data/app.db");
        assert_eq!(companion(path, "-wal"), PathBuf::from("/data/app.db-wal"));
        assert_eq!(companion(path, "-journal"), PathBuf::from("/data/app.db-journal"));
    }

    #[test]
    fn delete_removes_companions_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("app.db");
        std::fs::write(&db, b"x").unwrap();
        std::fs::write(companion(&db, "-wal"), b"x").unwrap();

        delete_database(&db).unwrap();
        assert!(!db.exists());
        assert!(!companion(&db, "-wal").exists());

        // Nothing left: still fine.
        delete_database(&db).unwrap();
    }

    struct Refuse;

    impl Delegate for Refuse {
        fn on_create(&mut self, _conn: &Connection) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn default_downgrade_fails() {
        let conn = Connection::open_memory().unwrap();
        let err = Refuse.on_downgrade(&conn, 3, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Illegal state: Can't downgrade database from version 3 to 2"
        );
    }

    #[test]
    fn default_corruption_handler_keeps_memory_database_files_alone() {
        let conn = Connection::open_memory().unwrap();
        Refuse.on_corruption(&conn);
        assert!(conn.is_closed());
    }
}
