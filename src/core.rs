//! Process-wide run state for the live edit loop.
//!
//! Two pieces of global state:
//! - `SHUTDOWN`: has shutdown been requested? (Ctrl+C received)
//! - a `Notify` handle the edit loop parks on so the Ctrl+C handler can wake
//!   it from signal context

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::Notify;

/// Shutdown has been requested (Ctrl+C received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Wakes the edit loop's select when shutdown is requested
static SHUTDOWN_NOTIFY: OnceLock<Arc<Notify>> = OnceLock::new();

/// Setup the global Ctrl+C handler. Call once at program start.
///
/// The handler sets the shutdown flag and wakes any parked edit loop; a
/// one-shot command with no loop running simply exits on its own.
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        SHUTDOWN.store(true, Ordering::SeqCst);
        if let Some(notify) = SHUTDOWN_NOTIFY.get() {
            notify.notify_waiters();
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Check if shutdown has been requested
///
/// Uses Relaxed ordering for performance - worst case is processing
/// one more event before stopping, which is acceptable
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Handle the edit loop awaits shutdown on
pub fn shutdown_signal() -> Arc<Notify> {
    SHUTDOWN_NOTIFY
        .get_or_init(|| Arc::new(Notify::new()))
        .clone()
}
