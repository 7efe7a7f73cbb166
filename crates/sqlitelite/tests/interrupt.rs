//! Cancelling a running statement from another thread.

use sqlitelite::{Connection, StatementState};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const ENDLESS: &str =
    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT count(*) FROM c";

/// Keep interrupting until `done` is set; an interrupt that lands before
/// the step starts is dropped by the engine.
fn spawn_interrupter(conn: &Connection, done: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    let handle = conn.interrupt_handle();
    thread::spawn(move || {
        while !done.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(20));
            handle.interrupt();
        }
    })
}

#[test]
fn interrupt_cancels_scalar_execute() {
    let conn = Connection::open_memory().unwrap();
    let stmt = conn.statement(ENDLESS).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let worker = spawn_interrupter(&conn, Arc::clone(&done));
    let err = stmt.execute_for_long().unwrap_err();
    done.store(true, Ordering::SeqCst);
    worker.join().unwrap();

    assert!(err.is_interrupted(), "unexpected error: {err}");
    assert_eq!(stmt.state(), StatementState::Normal);
    // The connection is still usable.
    let one = conn.statement("SELECT 1").unwrap();
    assert_eq!(one.execute_for_long().unwrap(), Some(1));
}

#[test]
fn interrupt_moves_cursor_to_error_state() {
    let conn = Connection::open_memory().unwrap();
    let stmt = conn.statement(ENDLESS).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let worker = spawn_interrupter(&conn, Arc::clone(&done));
    let err = stmt.cursor_next_row().unwrap_err();
    done.store(true, Ordering::SeqCst);
    worker.join().unwrap();

    assert!(err.is_interrupted());
    assert_eq!(stmt.state(), StatementState::CursorError);
    assert!(stmt.cursor_next_row().is_err());
    stmt.cursor_reset(false).unwrap();
    assert_eq!(stmt.state(), StatementState::Normal);
}

#[test]
fn handle_outlives_connection() {
    let conn = Connection::open_memory().unwrap();
    let handle = conn.interrupt_handle();
    drop(conn);
    thread::spawn(move || handle.interrupt()).join().unwrap();
}
