/*!
 * Extract the pixels around a point from archived full disk imagery.
 *
 * This ties together finding the image for a time, the reference grid for the satellite, and the
 * bounding box search.
 */
use crate::{
    bbox::{self, BoundingBoxRequest, PixelWindow},
    cloudiness::cloudiness,
    event::BolideEvent,
    geo::{GeoExtent, GeosProjection},
    reference_grid::{ReferenceGrid, ReferenceGridCache, Resolution, ScanGrid},
    satellite::{Product, Satellite},
    scan_key::resolve_key,
    storage::ObjectStore,
    BolideError, BolideResult,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, info};
use ndarray::Array2;
use std::sync::Arc;

/// The parts of a full disk image needed to cut a window out of it.
pub trait ScanImage {
    /// The file or object name of the image.
    fn name(&self) -> &str;

    /// Number of (rows, columns) of the data variables.
    fn shape(&self) -> (usize, usize);

    /// Scan angle coordinates and projection of the fixed grid.
    fn scan_grid(&self) -> BolideResult<ScanGrid>;

    /// Resolution of the data variables at nadir in km.
    fn spatial_resolution_km(&self) -> BolideResult<f64>;

    /// Start time of the scan.
    fn scan_start(&self) -> BolideResult<DateTime<Utc>>;

    /// Read a block of a data variable, fill values are NaN.
    fn read_window(&self, variable: &str, window: &PixelWindow) -> BolideResult<Array2<f64>>;
}

/// The edges of a window in the projection plane in meters, for drawing it in its native
/// projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanExtent {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// A block of pixels cut out of an image with everything needed to place it on a map.
#[derive(Debug, Clone)]
pub struct ExtractedRaster {
    /// Name of the image the pixels came from.
    pub source: String,
    pub scan_start: DateTime<Utc>,
    /// Where the pixels are in the image.
    pub window: PixelWindow,
    pub data: Array2<f64>,
    /// Area covered according to the reference grid.
    pub extent: GeoExtent,
    /// `None` if the window is empty.
    pub scan_extent: Option<ScanExtent>,
    pub projection: GeosProjection,
}

/// Cut the window covering `request` out of a data variable of an image.
pub fn extract_window<I: ScanImage + ?Sized>(
    image: &I,
    grid: &ReferenceGrid,
    request: &BoundingBoxRequest,
    variable: &str,
) -> BolideResult<ExtractedRaster> {
    let native_km = image.spatial_resolution_km()?;
    let factor = bbox::scale_factor(grid.resolution(), native_km)?;

    let reference = bbox::reference_window(grid, request);
    let window = reference.scaled(factor);
    let extent = bbox::geographic_extent(grid, &reference);
    debug!(
        "{}: reference window {:?} scaled by {} to {:?}",
        image.name(),
        reference,
        factor,
        window
    );

    let data = image.read_window(variable, &window)?;

    let scan = image.scan_grid()?;
    let scan_extent = scan_extent(&scan, &window);

    Ok(ExtractedRaster {
        source: image.name().to_owned(),
        scan_start: image.scan_start()?,
        window,
        data,
        extent,
        scan_extent,
        projection: scan.projection,
    })
}

fn scan_extent(scan: &ScanGrid, window: &PixelWindow) -> Option<ScanExtent> {
    let h = scan.projection.perspective_height;
    let xs = scan.x.get(window.col_min..window.col_max)?;
    let ys = scan.y.get(window.row_min..window.row_max)?;

    let (x_min, x_max) = min_max(xs)?;
    let (y_min, y_max) = min_max(ys)?;

    Some(ScanExtent {
        x_min: x_min * h,
        x_max: x_max * h,
        y_min: y_min * h,
        y_max: y_max * h,
    })
}

fn min_max(vals: &[f64]) -> Option<(f64, f64)> {
    vals.iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Opens an image downloaded from the archive.
pub type ImageReader<I> = fn(&str, Vec<u8>) -> BolideResult<I>;

/// Finds, downloads, and cuts windows out of archived imagery.
///
/// Everything runs on the calling thread and blocks on the network.
pub struct Extractor<'a, I> {
    store: &'a dyn ObjectStore,
    grids: &'a ReferenceGridCache,
    read_image: ImageReader<I>,
}

#[cfg(feature = "netcdf")]
impl<'a> Extractor<'a, crate::goesimage::GoesImage> {
    /// An extractor reading netCDF imagery.
    pub fn new(store: &'a dyn ObjectStore, grids: &'a ReferenceGridCache) -> Self {
        Self::with_image_reader(store, grids, crate::goesimage::GoesImage::from_bytes)
    }
}

impl<'a, I: ScanImage> Extractor<'a, I> {
    pub fn with_image_reader(
        store: &'a dyn ObjectStore,
        grids: &'a ReferenceGridCache,
        read_image: ImageReader<I>,
    ) -> Self {
        Extractor {
            store,
            grids,
            read_image,
        }
    }

    fn download(&self, bucket: &str, key: &str) -> BolideResult<I> {
        let bytes = self.store.get(bucket, key)?;
        let name = key.rsplit('/').next().unwrap_or(key);
        (self.read_image)(name, bytes)
    }

    /// The fixed grid of the satellite's calibration image.
    pub fn calibration_grid(&self, sat: Satellite) -> BolideResult<ScanGrid> {
        info!("fetching calibration image {}", sat.calibration_key());
        let image = self.download(&sat.bucket(), sat.calibration_key())?;
        image.scan_grid()
    }

    /// The reference grid for a satellite, built from the calibration image the first time.
    pub fn reference_grid(
        &self,
        sat: Satellite,
        resolution: Resolution,
    ) -> BolideResult<Arc<ReferenceGrid>> {
        self.grids
            .get_or_build(sat, resolution, |sat| self.calibration_grid(sat))
    }

    /// Extract the window of a product covering a box at the given time.
    pub fn extract(
        &self,
        sat: Satellite,
        product: Product,
        time: NaiveDateTime,
        request: &BoundingBoxRequest,
        resolution: Resolution,
    ) -> BolideResult<ExtractedRaster> {
        let key = resolve_key(self.store, sat, product, time)?;
        let image = self.download(&sat.bucket(), &key)?;
        let grid = self.reference_grid(sat, resolution)?;

        extract_window(&image, &grid, request, product.data_variable())
    }

    /// Fraction of the box covered by cloud according to the clear sky mask.
    pub fn cloudiness(
        &self,
        sat: Satellite,
        time: NaiveDateTime,
        request: &BoundingBoxRequest,
        resolution: Resolution,
    ) -> BolideResult<f64> {
        let raster = self.extract(sat, Product::ClearSkyMask, time, request, resolution)?;
        let value = cloudiness(raster.data.view())?;

        info!("{} cloudiness {:.3} from {}", sat, value, raster.source);
        Ok(value)
    }

    /// Cloudiness around an event, averaged over every satellite that detected it.
    pub fn event_cloudiness(
        &self,
        event: &BolideEvent,
        half_width: f64,
        resolution: Resolution,
    ) -> BolideResult<f64> {
        let sats = event.satellites()?;
        if sats.is_empty() {
            return Err(BolideError::NoDetectingSatellites);
        }

        let time = event.time()?;
        let request = BoundingBoxRequest::new(event.latitude, event.longitude, half_width);

        let mut total = 0.0;
        for &sat in &sats {
            total += self.cloudiness(sat, time, &request, resolution)?;
        }

        Ok(total / sats.len() as f64)
    }
}
