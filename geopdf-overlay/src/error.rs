use thiserror::Error;

/// Main overlay error type
#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Malformed calibration")]
    MalformedCalibration(#[from] CalibrationError),

    #[error("Failed to rasterize page region")]
    Rasterization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Map registry rejected the update")]
    Registry(#[from] MapError),

    #[error("Projection failed: {message}")]
    Projection { message: String },

    #[error("Failed to load resource")]
    Fetch(#[from] FetchError),

    #[error("Failed to open document")]
    DocumentLoad {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// World-file and calibration errors
#[derive(Error, Debug, PartialEq)]
pub enum CalibrationError {
    #[error("World file must contain exactly 6 lines, found {found}")]
    LineCount { found: usize },

    #[error("World file line {line} is not a finite number: {value:?}")]
    InvalidNumber { line: usize, value: String },

    #[error("Source raster dimensions must be non-zero ({width}x{height})")]
    EmptyRaster { width: u32, height: u32 },

    #[error("Page size must be positive ({width}x{height} pt)")]
    EmptyPage { width: f64, height: f64 },

    #[error("Calibrated transform is not invertible (determinant {determinant})")]
    Degenerate { determinant: f64 },
}

/// Errors raised by a map component's image/source/layer registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("{kind} already exists: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id} is still used by {user}")]
    InUse {
        kind: &'static str,
        id: String,
        user: String,
    },

    #[error("{kind} {id} references missing {missing}")]
    DanglingReference {
        kind: &'static str,
        id: String,
        missing: String,
    },
}

/// Resource loading errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed for {url}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Resource is not valid UTF-8: {location}")]
    Encoding { location: String },
}

impl OverlayError {
    /// Short machine-readable code, used as a metrics label
    pub fn error_code(&self) -> &'static str {
        match self {
            OverlayError::MalformedCalibration(_) => "malformed_calibration",
            OverlayError::Rasterization { .. } => "rasterization_failure",
            OverlayError::Registry(_) => "registry_inconsistency",
            OverlayError::Projection { .. } => "projection_error",
            OverlayError::Fetch(_) => "fetch_error",
            OverlayError::DocumentLoad { .. } => "document_load_error",
            OverlayError::Config { .. } => "config_error",
        }
    }
}

/// Result type alias for overlay operations
pub type OverlayResult<T> = Result<T, OverlayError>;
