//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`, while the
//! CLI uses `anyhow` for convenient error propagation.
//!
//! The real-time pipeline itself never returns errors: FFT failures, lock
//! contention and bad settings degrade to silent frames or corrected
//! values. These types cover the device edge and FFT planning. Config file
//! errors have their own `ConfigError`.
//!
//! # Example
//!
//! ```ignore
//! use wavviz::error::{Result, ResultExt};
//!
//! fn open(name: &str) -> Result<Stream> {
//!     find_stream(name).with_context(format!("input device '{name}'"))
//! }
//! ```

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the device and FFT edges of the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Audio device or stream error
    #[error("Device error: {0}")]
    Device(String),

    /// FFT planning or processing error
    #[error("FFT error: {0}")]
    Fft(String),

    /// Error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

impl From<realfft::FftError> for Error {
    fn from(e: realfft::FftError) -> Self {
        Self::Fft(e.to_string())
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}
