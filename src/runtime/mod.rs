//! Single-writer async runtime, driver loops, and event stream APIs.

/// Serial per-recipient driver loops.
pub(crate) mod driver;
/// Event stream types emitted by the runtime.
pub mod events;
/// Handle and command loop implementation.
pub mod handle;
