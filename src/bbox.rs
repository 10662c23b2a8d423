//! Find the pixels of a full disk image that cover a box around a point.
use crate::{
    geo::{Coord, GeoExtent},
    reference_grid::{ReferenceGrid, Resolution},
    BolideError, BolideResult,
};
use ndarray::Zip;

/// A square box of `half_width` degrees around a target point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBoxRequest {
    pub lat: f64,
    pub lon: f64,
    /// Half the width of the box in degrees of latitude and longitude.
    pub half_width: f64,
}

impl BoundingBoxRequest {
    pub fn new(lat: f64, lon: f64, half_width: f64) -> Self {
        BoundingBoxRequest {
            lat,
            lon,
            half_width,
        }
    }

    /// The south west corner of the box.
    pub fn lower_left(&self) -> Coord {
        Coord {
            lat: self.lat - self.half_width,
            lon: self.lon - self.half_width,
        }
    }

    /// The north east corner of the box.
    pub fn upper_right(&self) -> Coord {
        Coord {
            lat: self.lat + self.half_width,
            lon: self.lon + self.half_width,
        }
    }
}

/// A block of an image, rows and columns are half open ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub row_min: usize,
    pub row_max: usize,
    pub col_min: usize,
    pub col_max: usize,
}

impl PixelWindow {
    pub fn rows(&self) -> usize {
        self.row_max.saturating_sub(self.row_min)
    }

    pub fn cols(&self) -> usize {
        self.col_max.saturating_sub(self.col_min)
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0 || self.cols() == 0
    }

    /// Multiply every index by `factor`.
    pub fn scaled(&self, factor: usize) -> Self {
        PixelWindow {
            row_min: self.row_min * factor,
            row_max: self.row_max * factor,
            col_min: self.col_min * factor,
            col_max: self.col_max * factor,
        }
    }
}

/// The integer factor between reference grid indexes and image indexes.
///
/// `native_km` is the resolution of the image being read, e.g. 0.5 for the red visible band.
pub fn scale_factor(reference: Resolution, native_km: f64) -> BolideResult<usize> {
    let ratio = reference.km() as f64 / native_km;
    let rounded = ratio.round();

    if !ratio.is_finite() || rounded < 1.0 || (ratio - rounded).abs() > 1.0e-9 {
        return Err(BolideError::NonIntegerScale {
            reference_km: reference.km(),
            native_km,
        });
    }

    Ok(rounded as usize)
}

/// Find the grid cell with the smallest `|lat - target.lat| + |lon - target.lon|`.
///
/// Off globe cells hold a sentinel far from any real coordinate, so they never win for a target on
/// the Earth.
pub fn nearest_index(grid: &ReferenceGrid, target: Coord) -> (usize, usize) {
    let mut best = (0, 0);
    let mut best_dist = f64::INFINITY;

    Zip::indexed(grid.lats())
        .and(grid.lons())
        .for_each(|idx, &lat, &lon| {
            let dist = (lat - target.lat).abs() + (lon - target.lon).abs();
            if dist < best_dist {
                best_dist = dist;
                best = idx;
            }
        });

    best
}

/// The window in the reference grid itself.
///
/// Boxes extending off the disk are not an error, the closest cells on the Earth are used.
pub fn reference_window(grid: &ReferenceGrid, request: &BoundingBoxRequest) -> PixelWindow {
    let (row_max, col_min) = nearest_index(grid, request.lower_left());
    let (row_min, col_max) = nearest_index(grid, request.upper_right());

    PixelWindow {
        row_min,
        row_max,
        col_min,
        col_max,
    }
}

/// The window in an image with resolution `native_km` covering the requested box.
pub fn index(
    grid: &ReferenceGrid,
    request: &BoundingBoxRequest,
    native_km: f64,
) -> BolideResult<PixelWindow> {
    let factor = scale_factor(grid.resolution(), native_km)?;
    Ok(reference_window(grid, request).scaled(factor))
}

/// The area covered by the reference cells of a window, corners included.
///
/// An empty window, including one with inverted corners, covers nothing.
pub fn geographic_extent(grid: &ReferenceGrid, window: &PixelWindow) -> GeoExtent {
    let mut extent = GeoExtent::empty();
    if window.is_empty() {
        return extent;
    }
    let (nrows, ncols) = grid.dim();

    let rows = window.row_min.min(window.row_max)..=window.row_max.max(window.row_min);
    for row in rows.filter(|&r| r < nrows) {
        let cols = window.col_min.min(window.col_max)..=window.col_max.max(window.col_min);
        for col in cols.filter(|&c| c < ncols) {
            if let Some(coord) = grid.coord(row, col) {
                extent.expand(coord);
            }
        }
    }

    extent
}
