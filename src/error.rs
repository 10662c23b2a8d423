use thiserror::Error;

/// Result type used throughout this crate.
pub type BolideResult<T> = Result<T, BolideError>;

/// Everything that can go wrong while locating and extracting a bounding box.
///
/// Configuration and validation errors are raised before any network traffic. Transport errors
/// are passed through unchanged, there is no retry anywhere in this crate.
#[derive(Debug, Error)]
pub enum BolideError {
    /*---------------------------------------------------------------------------------------------
     *                                     Configuration
     *-------------------------------------------------------------------------------------------*/
    #[error("GOES {0} not supported")]
    UnsupportedSatellite(String),

    #[error("product type {0} not supported")]
    UnsupportedProduct(String),

    /*---------------------------------------------------------------------------------------------
     *                                      Validation
     *-------------------------------------------------------------------------------------------*/
    #[error("invalid reference grid resolution {km} km: {reason}")]
    InvalidResolution { km: u32, reason: &'static str },

    #[error("reference resolution {reference_km} km is not an integer multiple of the image resolution {native_km} km")]
    NonIntegerScale { reference_km: u32, native_km: f64 },

    #[error("could not parse timestamp: {0}")]
    InvalidTimestamp(String),

    /*---------------------------------------------------------------------------------------------
     *                                       Not found
     *-------------------------------------------------------------------------------------------*/
    #[error("could not find image for {bucket}/{prefix}")]
    ScanNotFound { bucket: String, prefix: String },

    #[error("event service returned no event data")]
    EventNotFound,

    #[error("event was not detected by any supported satellite")]
    NoDetectingSatellites,

    /*---------------------------------------------------------------------------------------------
     *                                         Data
     *-------------------------------------------------------------------------------------------*/
    #[error("{0}")]
    NetCdf(String),

    #[error("missing attribute {attribute} on {variable}")]
    MissingAttribute {
        variable: &'static str,
        attribute: &'static str,
    },

    #[error("malformed reference grid: {0}")]
    MalformedGrid(String),

    #[error("pixel window contains no valid pixels")]
    EmptyWindow,

    #[error("pixel window rows {rows:?} cols {cols:?} outside of image with shape {shape:?}")]
    WindowOutOfBounds {
        rows: (usize, usize),
        cols: (usize, usize),
        shape: (usize, usize),
    },

    /*---------------------------------------------------------------------------------------------
     *                                       Transport
     *-------------------------------------------------------------------------------------------*/
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Xml(#[from] quick_xml::DeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}
