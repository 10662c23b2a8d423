pub use bbox::{
    geographic_extent, index, nearest_index, reference_window, scale_factor, BoundingBoxRequest,
    PixelWindow,
};
pub use cloudiness::cloudiness;
pub use error::{BolideError, BolideResult};
pub use event::{BolideEvent, EventClient, DEFAULT_EVENT_ENDPOINT};
pub use extract::{extract_window, ExtractedRaster, Extractor, ImageReader, ScanExtent, ScanImage};
pub use geo::{to_lat_lon, Coord, GeoExtent, GeosProjection, SweepAxis};
#[cfg(feature = "netcdf")]
pub use goesimage::GoesImage;
pub use reference_grid::{
    write_matrix, ReferenceGrid, ReferenceGridCache, Resolution, ScanGrid, NATIVE_RESOLUTION_KM,
    OFF_GLOBE_SENTINEL,
};
pub use satellite::{Product, Satellite};
pub use scan_key::{parse_timestamp, resolve_key, scan_prefix, ScanMode};
pub use storage::{ObjectStore, S3Client, StorageConfig, DEFAULT_ENDPOINT_TEMPLATE};

/**************************************************************************************************
 * Private Implementation
 *************************************************************************************************/
mod bbox;
mod cloudiness;
mod error;
mod event;
mod extract;
mod geo;
#[cfg(feature = "netcdf")]
mod goesimage;
mod reference_grid;
mod satellite;
mod scan_key;
mod storage;
