//! Trade record persistence for the terminal gateway.
//!
//! JSON Lines format (.jsonl) is used for robustness: each line is a
//! complete JSON object, partial file corruption only affects individual
//! lines and files remain readable after interrupted writes.

pub mod error;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use writer::JsonlTradeWriter;
