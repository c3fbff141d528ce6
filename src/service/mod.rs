//! Poller service modules
//!
//! `session` holds the per-intent state machine; `poller` drives it with
//! timers and backend calls.

pub mod poller;
pub mod session;

// Re-export for convenience
pub use poller::{IntentHandle, IntentSnapshot, PaymentPoller, PollerSettings};
pub use session::{Effect, PaymentSession, PollSkip, PollTicket};
