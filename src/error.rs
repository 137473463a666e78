//! Crate-level error types.

use crate::capture::PixelFormat;
use crate::sdk::SdkError;

/// Crate-level error type.
///
/// Every variant is fatal for a run. Fetch misses never show up here: the
/// buffer pool reports them as `Ok(None)`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("discovery error: {0}")]
    Discovery(#[source] SdkError),

    #[error("no cameras found")]
    NoCameras,

    /// Device selection input could not be used.
    #[error("{0}")]
    Selection(String),

    #[error("could not connect to the selected camera: {0}")]
    Connection(#[source] SdkError),

    #[error("feature {feature}: {source}")]
    Feature {
        feature: String,
        #[source]
        source: SdkError,
    },

    /// The camera lacks something the selected profile requires.
    #[error("{0}")]
    Capability(String),

    #[error("error setting stream: {0}")]
    Stream(#[source] SdkError),

    #[error("buffer pool exhausted: all {capacity} slots are checked out")]
    PoolExhausted { capacity: usize },

    #[error("{action} failed: {source}")]
    Acquisition {
        action: &'static str,
        #[source]
        source: SdkError,
    },

    #[error("error disconnecting: {0}")]
    Disconnect(#[source] SdkError),

    #[error("error demodulating image: {0}")]
    Demodulate(String),

    #[error("error debayering image: {0}")]
    Debayer(String),

    #[error("unsupported pixel format {0}")]
    UnsupportedFormat(PixelFormat),

    #[error("camera settings: {0}")]
    Settings(String),

    #[error("display error: {0}")]
    Display(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unknown pixel format {0:?}")]
    UnknownFormat(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("image error: {source}")]
    Image {
        #[from]
        source: image::ImageError,
    },
}

impl Error {
    /// Wrap an SDK failure on a named feature.
    pub fn feature(feature: impl Into<String>, source: SdkError) -> Self {
        Self::Feature {
            feature: feature.into(),
            source,
        }
    }
}

/// Crate-level result type.
pub type Result<T> = std::result::Result<T, Error>;

fn _test_error_is_send() {
    // Compile-time test to ensure Error implements Send trait.
    fn implements<T: Send>() {}
    implements::<Error>();
}
