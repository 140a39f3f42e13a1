//! Auto-focus scheduling.
//!
//! A focus pass is what gates frame capture: the session only asks for a
//! frame once the device reports a successful focus. The scheduler issues
//! those passes on demand or on a fixed period.

mod scheduler;

pub use scheduler::{FocusControl, FocusError, FocusListener, FocusScheduler, FocusState};
