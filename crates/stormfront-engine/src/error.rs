//! Error types for the engine binary.
//!
//! [`AppError`] wraps every failure mode of startup and shutdown so that
//! `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: stormfront_core::ConfigError,
    },

    /// The engine failed to start or stop.
    #[error("engine error: {source}")]
    Engine {
        /// The underlying engine error.
        #[from]
        source: stormfront_core::EngineError,
    },

    /// The log subscriber could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },

    /// Waiting for the interrupt signal failed.
    #[error("signal error: {source}")]
    Signal {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
