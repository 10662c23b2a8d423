//! The geostationary (geos) projection.
//!
//! The satellite measures the position of a pixel by two scan angles from the nadir point. Scaled
//! by the perspective height these become the x and y coordinates of the projection plane. This
//! module inverts that transform to get back to latitude and longitude on the ellipsoid.
use ndarray::Array2;

/// Semi-major axis of the GRS80 ellipsoid in meters.
pub const GRS80_SEMI_MAJOR: f64 = 6_378_137.0;
/// Semi-minor axis of the GRS80 ellipsoid in meters.
pub const GRS80_SEMI_MINOR: f64 = 6_356_752.314_14;

/// The axis the sensor sweeps along.
///
/// The GOES-R series sweeps along x, Meteosat and Himawari along y.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAxis {
    X,
    Y,
}

impl SweepAxis {
    /// Parse the value of the `sweep_angle_axis` attribute.
    pub fn from_attribute(val: &str) -> Option<SweepAxis> {
        match val.trim() {
            "x" | "X" => Some(SweepAxis::X),
            "y" | "Y" => Some(SweepAxis::Y),
            _ => None,
        }
    }
}

/// Projection parameters from the `goes_imager_projection` variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeosProjection {
    /// Height of the satellite above the ellipsoid at the sub-satellite point in meters.
    pub perspective_height: f64,
    /// Longitude of the sub-satellite point in degrees.
    pub lon_0: f64,
    pub sweep: SweepAxis,
    /// Equatorial radius in meters.
    pub semi_major: f64,
    /// Polar radius in meters.
    pub semi_minor: f64,
}

impl GeosProjection {
    /// A projection on the GRS80 ellipsoid.
    pub fn new(perspective_height: f64, lon_0: f64, sweep: SweepAxis) -> Self {
        GeosProjection {
            perspective_height,
            lon_0,
            sweep,
            semi_major: GRS80_SEMI_MAJOR,
            semi_minor: GRS80_SEMI_MINOR,
        }
    }

    pub fn with_ellipsoid(self, semi_major: f64, semi_minor: f64) -> Self {
        GeosProjection {
            semi_major,
            semi_minor,
            ..self
        }
    }

    /// Convert a point in the projection plane (meters) to latitude and longitude in degrees.
    ///
    /// Returns `None` if the line of sight misses the Earth.
    pub fn inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let a = self.semi_major;
        let radius_g_1 = self.perspective_height / a;
        let radius_g = 1.0 + radius_g_1;
        let c = radius_g * radius_g - 1.0;
        let radius_p = self.semi_minor / a;
        let radius_p_inv2 = 1.0 / (radius_p * radius_p);

        // Scan angles in radians.
        let sx = x / self.perspective_height;
        let sy = y / self.perspective_height;

        // View vector from the satellite.
        let mut vx = -1.0;
        let (mut vy, mut vz) = match self.sweep {
            SweepAxis::X => {
                let vz = sy.tan();
                (sx.tan() * 1.0f64.hypot(vz), vz)
            }
            SweepAxis::Y => {
                let vy = sx.tan();
                (vy, sy.tan() * 1.0f64.hypot(vy))
            }
        };

        let qa = vy * vy + (vz / radius_p) * (vz / radius_p) + vx * vx;
        let qb = 2.0 * radius_g * vx;
        let det = qb * qb - 4.0 * qa * c;
        if det < 0.0 {
            return None;
        }

        let k = (-qb - det.sqrt()) / (2.0 * qa);
        vx = radius_g + k * vx;
        vy *= k;
        vz *= k;

        let lambda = vy.atan2(vx);
        let phi = (vz * lambda.cos() / vx).atan();
        let phi = (radius_p_inv2 * phi.tan()).atan();

        Some((phi.to_degrees(), normalize_lon(lambda.to_degrees() + self.lon_0)))
    }
}

fn normalize_lon(lon: f64) -> f64 {
    let mut lon = lon;
    while lon > 180.0 {
        lon -= 360.0;
    }
    while lon < -180.0 {
        lon += 360.0;
    }
    lon
}

/// Project every pair of (x, y) projection-plane coordinates to latitude and longitude.
///
/// The result has one row per y value and one column per x value. Points off the Earth's disk
/// are set to `f64::INFINITY` in both grids.
pub fn to_lat_lon(xs: &[f64], ys: &[f64], proj: &GeosProjection) -> (Array2<f64>, Array2<f64>) {
    let mut lats = Array2::from_elem((ys.len(), xs.len()), f64::INFINITY);
    let mut lons = Array2::from_elem((ys.len(), xs.len()), f64::INFINITY);

    for (j, &y) in ys.iter().enumerate() {
        for (i, &x) in xs.iter().enumerate() {
            if let Some((lat, lon)) = proj.inverse(x, y) {
                lats[[j, i]] = lat;
                lons[[j, i]] = lon;
            }
        }
    }

    (lats, lons)
}
