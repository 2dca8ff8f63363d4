//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] termgate_dispatch::DispatchError),

    #[error("Gate error: {0}")]
    Gate(#[from] termgate_gate::GateError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] termgate_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] termgate_persistence::PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
