use thiserror::Error;

/// Library-level errors using thiserror for structured error handling.
///
/// None of these are raised by the per-frame path. Missing signal (no ball,
/// short trajectory) is an absent result, not an error; these cover the
/// collaborator boundary and session setup.

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("Frame dimensions must be non-zero (got {width}x{height})")]
    EmptyDimensions { width: u32, height: u32 },

    #[error("Row stride {bytes_per_row} is shorter than {width} pixels of 4 bytes")]
    StrideTooShort { width: u32, bytes_per_row: usize },

    #[error("Pixel buffer holds {actual} bytes, frame needs at least {required}")]
    BufferTooSmall { required: usize, actual: usize },

    #[error("Frame of {height} rows at stride {bytes_per_row} overflows the address space")]
    GeometryOverflow { height: u32, bytes_per_row: usize },

    #[error("Frame timestamp must be finite (got {0})")]
    InvalidTimestamp(f64),
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read frame directory: {path}")]
    ReadDirFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame rate must be positive (got {0})")]
    InvalidFrameRate(f64),

    #[error("No decodable frames found in {0}")]
    Empty(String),
}

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to initialize audio output stream")]
    StreamInitFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Audio thread exited before reporting readiness")]
    AudioThreadGone,

    #[error("Failed to start audio thread")]
    ThreadSpawnFailed(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Could not determine a configuration directory")]
    NoConfigDir,

    #[error("Failed to create config directory: {path}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Pipeline worker not running")]
    NotRunning,

    #[error("Pipeline worker already running")]
    AlreadyRunning,

    #[error("Failed to start pipeline worker thread")]
    ThreadSpawnFailed(#[source] std::io::Error),

    #[error("Pipeline worker panicked")]
    WorkerPanicked,
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;
