//! Session core: debouncing, reconciliation, sharing, and the controller
//! that wires them to a compile backend.

mod controller;
mod debounce;
mod share;
mod state;

pub use controller::{Controller, EditorEvent, SessionHandles, SurfaceEvent};
pub use debounce::{DEFAULT_QUIET_MS, Debouncer};
pub use share::{ShareManager, channel_url_with_token, extract_token, page_from_channel};
pub use state::{Reconciler, SessionState};
