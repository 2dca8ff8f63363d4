//! Session gate boundary for the external trading terminal.
//!
//! The terminal process holds one stateful session per account and cannot
//! be accessed concurrently for that account. This crate defines the
//! trait the rest of the gateway calls through; the actual terminal
//! adapter (login/fetch/logout against the vendor API) lives outside the
//! core and implements `SessionGate`.

pub mod error;
pub mod gate;

pub use error::{GateError, GateResult};
pub use gate::{BoxFuture, DynSessionGate, SessionGate};
