//! Database connections.
//!
//! A [`Connection`] owns one native handle, the statements it manages and a
//! small cache of prepared transaction-control statements. It is meant for a
//! single owner at a time (`!Send`); the only cross-thread operation is
//! [`InterruptHandle::interrupt`].
//!
//! Closing finalizes every managed statement before releasing the handle. If
//! the engine refuses to close (an unmanaged statement is still alive), the
//! handle is kept along with any open transaction, and `close` may be retried.

use crate::config::{DatabaseConfig, OpenFlags};
use crate::delegate::Delegate;
use crate::ffi;
use crate::native::{InterruptTarget, RawConnection, RawStatement};
use crate::statement::{Statement, StatementCore};
use sqlitelite_core::{EngineError, Error, Result, Value, WindowCursor};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, instrument, warn};

/// Bytes `release_memory` asks the engine to give back.
const RELEASE_MEMORY_BYTES: i32 = 8 * 1024 * 1024;

/// How a transaction acquires its locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Locks are taken on first read/write.
    Deferred,
    /// Take the write lock immediately; readers may continue.
    Immediate,
    /// Take the write lock immediately and block readers (outside WAL mode).
    Exclusive,
}

impl TransactionMode {
    fn control(self) -> Control {
        match self {
            TransactionMode::Deferred => Control::BeginDeferred,
            TransactionMode::Immediate => Control::BeginImmediate,
            TransactionMode::Exclusive => Control::BeginExclusive,
        }
    }
}

/// Cached transaction-control statements, indexed by discriminant.
#[derive(Debug, Clone, Copy)]
enum Control {
    BeginDeferred,
    BeginImmediate,
    BeginExclusive,
    Commit,
    Rollback,
}

const CONTROL_COUNT: usize = 5;

impl Control {
    fn sql(self) -> &'static str {
        match self {
            Control::BeginDeferred => "BEGIN DEFERRED TRANSACTION",
            Control::BeginImmediate => "BEGIN IMMEDIATE TRANSACTION",
            Control::BeginExclusive => "BEGIN EXCLUSIVE TRANSACTION",
            Control::Commit => "COMMIT TRANSACTION",
            Control::Rollback => "ROLLBACK TRANSACTION",
        }
    }
}

/// State shared between a connection and the statements it hands out.
#[derive(Debug)]
pub(crate) struct ConnectionInner {
    raw: Option<RawConnection>,
    control: [Option<RawStatement>; CONTROL_COUNT],
    managed: Vec<Rc<RefCell<StatementCore>>>,
    in_transaction: bool,
    transaction_successful: bool,
    pub(crate) window_capacity: usize,
}

impl ConnectionInner {
    pub(crate) fn raw(&self) -> Result<&RawConnection> {
        self.raw
            .as_ref()
            .ok_or_else(|| Error::illegal_state("Connection already closed"))
    }

    pub(crate) fn register(&mut self, core: &Rc<RefCell<StatementCore>>) {
        core.borrow_mut().set_managed_index(Some(self.managed.len()));
        self.managed.push(Rc::clone(core));
    }

    /// Swap-remove the statement at `index`, fixing up the one moved into its slot.
    pub(crate) fn deregister(&mut self, index: usize) {
        if index >= self.managed.len() {
            return;
        }
        self.managed.swap_remove(index);
        if let Some(moved) = self.managed.get(index) {
            moved.borrow_mut().set_managed_index(Some(index));
        }
    }

    fn run_control(&mut self, which: Control) -> Result<()> {
        let raw = self
            .raw
            .as_ref()
            .ok_or_else(|| Error::illegal_state("Connection already closed"))?;
        let slot = &mut self.control[which as usize];
        let stmt = match slot {
            Some(stmt) => stmt,
            None => slot.insert(raw.prepare(which.sql())?),
        };
        let result = stmt.step().map(|_| ());
        stmt.reset();
        result
    }
}

/// Cancels whatever the connection is running, from any thread.
///
/// Cloned handles share one target; after the connection closes they do nothing.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    target: Arc<Mutex<Option<InterruptTarget>>>,
}

impl InterruptHandle {
    /// Make the statement currently stepping fail with an interrupted error.
    pub fn interrupt(&self) {
        let guard = self.target.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(target) = *guard {
            target.interrupt();
        }
    }

    fn attach(&self, target: Option<InterruptTarget>) {
        *self.target.lock().unwrap_or_else(PoisonError::into_inner) = target;
    }

    fn detach(&self) -> Option<InterruptTarget> {
        self.target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// A connection to one database.
#[derive(Debug)]
pub struct Connection {
    inner: Rc<RefCell<ConnectionInner>>,
    interrupt: InterruptHandle,
    path: String,
    memory: bool,
}

impl Connection {
    /// Open a database without running any lifecycle callbacks.
    pub fn open(path: impl AsRef<Path>, flags: OpenFlags) -> Result<Self> {
        Self::connect(&DatabaseConfig::file(path.as_ref()).flags(flags))
    }

    /// Open a fresh in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::connect(&DatabaseConfig::memory())
    }

    /// Open a database and bring it to `config.version`.
    ///
    /// Order: pragmas, `on_configure`, then `on_create`/`on_upgrade`/`on_downgrade`
    /// inside one exclusive transaction when the stored version differs, then
    /// `on_open`. Read-only databases skip configuration and migration. On any
    /// failure the connection is closed before the error is returned; corruption
    /// is first handed to [`Delegate::on_corruption`].
    #[instrument(skip_all, fields(path = ?config.path, version = config.version))]
    pub fn open_with<D: Delegate + ?Sized>(config: &DatabaseConfig, delegate: &mut D) -> Result<Self> {
        let conn = Self::connect(config)?;
        match conn.initialize(config, delegate) {
            Ok(()) => Ok(conn),
            Err(e) => {
                if e.is_corruption() {
                    error!(path = %conn.path, error = %e, "corruption reported by the engine");
                    delegate.on_corruption(&conn);
                }
                Err(conn.close_after_failure(e))
            }
        }
    }

    fn connect(config: &DatabaseConfig) -> Result<Self> {
        let path = config.path_str()?;
        let raw = RawConnection::open(&path, config.flags.to_sqlite_flags(), config.busy_timeout_ms)?;
        let interrupt = InterruptHandle::default();
        interrupt.attach(Some(InterruptTarget::of(&raw)));
        debug!(path = %path, "connection opened");

        Ok(Self {
            inner: Rc::new(RefCell::new(ConnectionInner {
                raw: Some(raw),
                control: Default::default(),
                managed: Vec::new(),
                in_transaction: false,
                transaction_successful: false,
                window_capacity: config.window_capacity,
            })),
            interrupt,
            path,
            memory: config.is_memory(),
        })
    }

    fn initialize<D: Delegate + ?Sized>(&self, config: &DatabaseConfig, delegate: &mut D) -> Result<()> {
        let current = self.user_version()?;
        let target = config.version;

        if config.flags.read_only {
            if target > 0 && current != target {
                return Err(Error::Engine(EngineError::new(
                    ffi::SQLITE_READONLY,
                    format!(
                        "Can't upgrade read-only database from version {} to {}: {}",
                        current, target, self.path
                    ),
                )));
            }
        } else {
            self.apply_pragmas(config)?;
            delegate.on_configure(self)?;

            if target > 0 && current != target {
                self.with_transaction(TransactionMode::Exclusive, |conn| {
                    if current == 0 {
                        delegate.on_create(conn)?;
                    } else if target > current {
                        delegate.on_upgrade(conn, current, target)?;
                    } else {
                        delegate.on_downgrade(conn, current, target)?;
                    }
                    conn.set_user_version(target)
                })?;
                debug!(from = current, to = target, "schema version migrated");
            }
        }

        delegate.on_open(self)
    }

    fn apply_pragmas(&self, config: &DatabaseConfig) -> Result<()> {
        self.command(if config.foreign_keys {
            "PRAGMA foreign_keys = 1"
        } else {
            "PRAGMA foreign_keys = 0"
        })?;

        if config.wal && !self.memory {
            // Fails when another connection holds the file in rollback mode.
            match self.pragma("PRAGMA journal_mode = WAL") {
                Ok(Some(mode)) if mode.eq_ignore_ascii_case("wal") => {
                    debug!(path = %self.path, "write-ahead logging enabled");
                }
                Ok(mode) => {
                    warn!(path = %self.path, ?mode, "could not switch to write-ahead logging");
                }
                Err(e) => {
                    warn!(path = %self.path, error = %e, "could not switch to write-ahead logging");
                }
            }
        }
        Ok(())
    }

    fn close_after_failure(&self, e: Error) -> Error {
        match self.close() {
            Ok(()) => e,
            Err(close) => e.suppress(close),
        }
    }

    /// Path the database was opened with, `:memory:` for in-memory databases.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_memory(&self) -> bool {
        self.memory
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().raw.is_none()
    }

    /// Is the underlying database opened read-only?
    pub fn is_read_only(&self) -> Result<bool> {
        Ok(self.inner.borrow().raw()?.is_read_only())
    }

    /// Number of statements this connection will finalize on close.
    pub fn managed_statement_count(&self) -> usize {
        self.inner.borrow().managed.len()
    }

    /// Prepare a statement that is finalized automatically when the connection closes.
    pub fn statement(&self, sql: &str) -> Result<Statement> {
        Statement::prepare(&self.inner, sql, true)
    }

    /// Prepare a statement the connection does not track.
    ///
    /// It must be closed (or dropped) before the connection, otherwise
    /// [`Connection::close`] fails.
    pub fn unmanaged_statement(&self, sql: &str) -> Result<Statement> {
        Statement::prepare(&self.inner, sql, false)
    }

    /// Run a single statement to completion, ignoring any rows.
    pub fn command(&self, sql: &str) -> Result<()> {
        let stmt = self.unmanaged_statement(sql)?;
        let result = stmt.execute();
        match (result, stmt.close()) {
            (Ok(()), close) => close,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close)) => Err(e.suppress(close)),
        }
    }

    /// Run several semicolon-separated statements.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.inner.borrow().raw()?.exec(sql)
    }

    /// Run a pragma and return the first column of its first row, as text.
    pub fn pragma(&self, sql: &str) -> Result<Option<String>> {
        let stmt = self.unmanaged_statement(sql)?;
        let value = if stmt.cursor_next_row()? {
            stmt.cursor_get_text(0)?
        } else {
            None
        };
        stmt.close()?;
        Ok(value)
    }

    /// Schema version stored in the database header.
    pub fn user_version(&self) -> Result<i32> {
        let stmt = self.unmanaged_statement("PRAGMA user_version")?;
        let version = stmt.execute_for_long()?.unwrap_or(0);
        stmt.close()?;
        i32::try_from(version).map_err(|_| {
            Error::range("user_version", version, i64::from(i32::MAX))
        })
    }

    pub fn set_user_version(&self, version: i32) -> Result<()> {
        self.command(&format!("PRAGMA user_version = {}", version))
    }

    /// Prepare `sql`, bind `params` and page through the result.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<WindowCursor<Statement>> {
        let stmt = self.statement(sql)?;
        stmt.bind_all(params)?;
        Ok(stmt.into_window_cursor())
    }

    pub fn begin_transaction_deferred(&self) -> Result<()> {
        self.begin_transaction(TransactionMode::Deferred)
    }

    pub fn begin_transaction_immediate(&self) -> Result<()> {
        self.begin_transaction(TransactionMode::Immediate)
    }

    /// Begin a transaction that locks out other writers (and, outside WAL, readers).
    pub fn begin_transaction_exclusive(&self) -> Result<()> {
        self.begin_transaction(TransactionMode::Exclusive)
    }

    /// Begin a transaction. Nesting is not supported.
    pub fn begin_transaction(&self, mode: TransactionMode) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.in_transaction {
            return Err(Error::illegal_state("Can't begin nested transaction"));
        }
        inner.run_control(mode.control())?;
        inner.in_transaction = true;
        inner.transaction_successful = false;
        debug!(?mode, "transaction started");
        Ok(())
    }

    /// Mark the current transaction for commit. Allowed once per transaction.
    pub fn set_transaction_successful(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if !inner.in_transaction {
            return Err(Error::illegal_state("No transaction to mark successful"));
        }
        if inner.transaction_successful {
            return Err(Error::illegal_state("Transaction is already successful"));
        }
        inner.transaction_successful = true;
        Ok(())
    }

    /// Commit if marked successful, roll back otherwise.
    ///
    /// The transaction is over afterwards even if the commit fails.
    pub fn end_transaction(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if !inner.in_transaction {
            return Err(Error::illegal_state("No transaction in progress to end"));
        }
        inner.in_transaction = false;
        let successful = std::mem::take(&mut inner.transaction_successful);

        if !successful {
            inner.run_control(Control::Rollback)?;
            debug!("transaction rolled back");
            return Ok(());
        }
        match inner.run_control(Control::Commit) {
            Ok(()) => {
                debug!("transaction committed");
                Ok(())
            }
            Err(e) => {
                // A failed COMMIT can leave the engine inside the transaction.
                let still_open = inner.raw.as_ref().is_some_and(|raw| !raw.is_autocommit());
                if still_open {
                    if let Err(rollback) = inner.run_control(Control::Rollback) {
                        return Err(e.suppress(rollback));
                    }
                }
                Err(e)
            }
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.borrow().in_transaction
    }

    /// Run `f` inside a transaction, committing when it returns `Ok`.
    ///
    /// `f` must not end the transaction itself.
    pub fn with_transaction<T>(
        &self,
        mode: TransactionMode,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        self.begin_transaction(mode)?;
        let result = f(self);
        if result.is_ok() {
            let mut inner = self.inner.borrow_mut();
            if inner.in_transaction {
                inner.transaction_successful = true;
            }
        }
        match (result, self.end_transaction()) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(e), Err(end)) => Err(e.suppress(end)),
        }
    }

    /// Cancel the statement currently running on this connection.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    /// A `Send + Sync` handle for interrupting this connection from another thread.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Free memory the engine holds but does not need, such as page cache.
    pub fn release_memory() -> usize {
        ffi::release_memory(RELEASE_MEMORY_BYTES)
    }

    /// Finalize every managed statement and close the handle.
    ///
    /// Closing twice is a no-op. Statement failures are collected and
    /// returned together; if the engine refuses to close, the connection
    /// stays open and the call can be retried.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let Some(raw) = inner.raw.take() else {
            return Ok(());
        };
        let target = self.interrupt.detach();
        let mut failure: Option<Error> = None;
        let mut collect = |e: Error| {
            failure = Some(match failure.take() {
                Some(primary) => primary.suppress(e),
                None => e,
            });
        };

        for slot in &mut inner.control {
            if let Some(stmt) = slot.take() {
                if let Err(e) = stmt.finalize() {
                    collect(e);
                }
            }
        }
        for core in inner.managed.drain(..) {
            if let Err(e) = core.borrow_mut().finalize() {
                collect(e);
            }
        }

        match raw.close() {
            Ok(()) => {
                inner.in_transaction = false;
                inner.transaction_successful = false;
                debug!(path = %self.path, "connection closed");
                failure.map_or(Ok(()), Err)
            }
            Err((raw, e)) => {
                inner.raw = Some(raw);
                self.interrupt.attach(target);
                Err(match failure {
                    Some(earlier) => e.suppress(earlier),
                    None => e,
                })
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path, error = %e, "failed to close connection on drop");
            let raw = self.inner.borrow_mut().raw.take();
            if let Some(raw) = raw {
                self.interrupt.detach();
                raw.close_v2();
            }
        }
    }
}
