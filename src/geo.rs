/*!
 * Geographic types and the geostationary projection.
 */
pub use projection::{to_lat_lon, GeosProjection, SweepAxis};

mod projection;

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    /// Check if two coordinates are within eps degrees of each other in both directions.
    pub fn is_close(&self, other: Coord, eps: f64) -> bool {
        (self.lat - other.lat).abs() < eps && (self.lon - other.lon).abs() < eps
    }
}

/// The area actually covered by an extracted window.
///
/// This comes from the sampled reference grid, so it differs from the requested box by up to a
/// grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoExtent {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoExtent {
    /// Start an empty extent to be grown with [GeoExtent::expand].
    pub(crate) fn empty() -> Self {
        GeoExtent {
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
        }
    }

    pub(crate) fn expand(&mut self, coord: Coord) {
        self.min_lat = self.min_lat.min(coord.lat);
        self.max_lat = self.max_lat.max(coord.lat);
        self.min_lon = self.min_lon.min(coord.lon);
        self.max_lon = self.max_lon.max(coord.lon);
    }

    /// No point has been added yet.
    pub fn is_empty(&self) -> bool {
        self.min_lat > self.max_lat || self.min_lon > self.max_lon
    }

    pub fn contains(&self, coord: Coord) -> bool {
        coord.lat >= self.min_lat
            && coord.lat <= self.max_lat
            && coord.lon >= self.min_lon
            && coord.lon <= self.max_lon
    }

    pub fn center(&self) -> Coord {
        Coord {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lon: (self.min_lon + self.max_lon) / 2.0,
        }
    }
}
