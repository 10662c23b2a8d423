//! Latitude and longitude of a subsampled full disk grid.
//!
//! All full disk images from a satellite share one fixed grid, so the lat/lon of every pixel can
//! be computed once and reused for every bounding box search. These grids are stored as two
//! plain text matrices per (satellite, resolution).
use crate::{
    geo::{to_lat_lon, Coord, GeosProjection},
    satellite::Satellite,
    BolideError, BolideResult,
};
use ndarray::Array2;
use std::{
    fmt::{self, Display},
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

pub use cache::ReferenceGridCache;

mod cache;

/// Value stored in cells that don't see the Earth.
///
/// It is far away from any real coordinate so a nearest neighbor search never lands on it.
pub const OFF_GLOBE_SENTINEL: f64 = -9999.0;

/// Native resolution of the ABI full disk fixed grid at nadir in km.
pub const NATIVE_RESOLUTION_KM: u32 = 2;

/// The resolution of a reference grid in km at nadir.
///
/// Only multiples of the native 2 km resolution can be made by subsampling the fixed grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resolution(u32);

impl Resolution {
    pub fn new(km: u32) -> BolideResult<Self> {
        if km < NATIVE_RESOLUTION_KM {
            Err(BolideError::InvalidResolution {
                km,
                reason: "cannot get finer resolution than 2 km",
            })
        } else if km % NATIVE_RESOLUTION_KM != 0 {
            Err(BolideError::InvalidResolution {
                km,
                reason: "only resolutions that are a multiple of 2 km are supported",
            })
        } else {
            Ok(Resolution(km))
        }
    }

    pub fn km(&self) -> u32 {
        self.0
    }

    /// How many native samples to advance for each reference grid sample.
    pub fn step(&self) -> usize {
        (self.0 / NATIVE_RESOLUTION_KM) as usize
    }
}

impl Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}km", self.0)
    }
}

/// The native coordinates of a full disk image.
#[derive(Debug, Clone)]
pub struct ScanGrid {
    /// East-west scan angles in radians, west to east.
    pub x: Vec<f64>,
    /// North-south scan angles in radians, north to south.
    pub y: Vec<f64>,
    pub projection: GeosProjection,
}

/// Latitude and longitude of every sampled pixel.
///
/// Rows run north to south and columns west to east. Off globe cells hold
/// [OFF_GLOBE_SENTINEL] in both arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceGrid {
    lats: Array2<f64>,
    lons: Array2<f64>,
    resolution: Resolution,
}

impl ReferenceGrid {
    /// Create a grid from raw arrays, they must have the same shape.
    pub fn new(lats: Array2<f64>, lons: Array2<f64>, resolution: Resolution) -> BolideResult<Self> {
        if lats.dim() != lons.dim() {
            return Err(BolideError::MalformedGrid(format!(
                "latitude shape {:?} does not match longitude shape {:?}",
                lats.dim(),
                lons.dim()
            )));
        }

        if lats.is_empty() {
            return Err(BolideError::MalformedGrid("grid is empty".to_owned()));
        }

        Ok(ReferenceGrid {
            lats,
            lons,
            resolution,
        })
    }

    /// Subsample the fixed grid of an image and project it to lat/lon.
    pub fn from_scan_grid(scan: &ScanGrid, resolution: Resolution) -> BolideResult<Self> {
        let step = resolution.step();
        let h = scan.projection.perspective_height;

        let xs: Vec<f64> = scan.x.iter().step_by(step).map(|x| x * h).collect();
        let ys: Vec<f64> = scan.y.iter().step_by(step).map(|y| y * h).collect();

        let (mut lats, mut lons) = to_lat_lon(&xs, &ys, &scan.projection);

        // The corner of a full disk is always off the Earth, anything matching it is too.
        if let Some(&corner) = lons.get([0, 0]) {
            for (lat, lon) in lats.iter_mut().zip(lons.iter_mut()) {
                if *lon == corner {
                    *lat = OFF_GLOBE_SENTINEL;
                    *lon = OFF_GLOBE_SENTINEL;
                }
            }
        }

        ReferenceGrid::new(lats, lons, resolution)
    }

    pub fn lats(&self) -> &Array2<f64> {
        &self.lats
    }

    pub fn lons(&self) -> &Array2<f64> {
        &self.lons
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Number of (rows, columns).
    pub fn dim(&self) -> (usize, usize) {
        self.lats.dim()
    }

    /// The coordinate at a cell, `None` if it is out of range or off the globe.
    pub fn coord(&self, row: usize, col: usize) -> Option<Coord> {
        let lat = *self.lats.get([row, col])?;
        let lon = *self.lons.get([row, col])?;

        if is_off_globe(lat) || is_off_globe(lon) {
            None
        } else {
            Some(Coord { lat, lon })
        }
    }

    /// Names of the latitude and longitude files for this satellite and resolution.
    pub fn file_names(sat: Satellite, resolution: Resolution) -> (String, String) {
        (
            format!("g{}_lats_{}km.txt", sat.id(), resolution.km()),
            format!("g{}_lons_{}km.txt", sat.id(), resolution.km()),
        )
    }

    /// Full paths of the latitude and longitude files in a directory.
    pub fn file_paths(dir: &Path, sat: Satellite, resolution: Resolution) -> (PathBuf, PathBuf) {
        let (lats, lons) = Self::file_names(sat, resolution);
        (dir.join(lats), dir.join(lons))
    }

    /// Load a grid previously written with [ReferenceGrid::save].
    pub fn load(dir: &Path, sat: Satellite, resolution: Resolution) -> BolideResult<Self> {
        let (lats_path, lons_path) = Self::file_paths(dir, sat, resolution);

        let lats = read_matrix(&lats_path)?;
        let lons = read_matrix(&lons_path)?;

        ReferenceGrid::new(lats, lons, resolution)
    }

    /// Write both matrices into a directory.
    ///
    /// Each file is written to a temporary file next to its destination and then renamed, so
    /// readers never see a partially written grid.
    pub fn save(&self, dir: &Path, sat: Satellite) -> BolideResult<()> {
        let (lats_path, lons_path) = Self::file_paths(dir, sat, self.resolution);

        write_matrix(&self.lats, &lats_path)?;
        write_matrix(&self.lons, &lons_path)?;

        Ok(())
    }
}

pub(crate) fn is_off_globe(val: f64) -> bool {
    val == OFF_GLOBE_SENTINEL || !val.is_finite()
}

/// Write a matrix as whitespace separated text with two decimal places, one row per line.
///
/// The file is written next to `dest` and renamed into place.
pub fn write_matrix(matrix: &Array2<f64>, dest: &Path) -> BolideResult<()> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut builder = tempfile::Builder::new();
    // Temporary files are owner only, the grids are shared like any other file.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let tmp = builder.tempfile_in(dir)?;

    {
        let mut out = BufWriter::new(tmp.as_file());
        for row in matrix.rows() {
            let mut first = true;
            for val in row {
                if !first {
                    out.write_all(b" ")?;
                }
                write!(out, "{:.2}", val)?;
                first = false;
            }
            out.write_all(b"\n")?;
        }
        out.flush()?;
    }

    tmp.persist(dest).map_err(|err| err.error)?;

    Ok(())
}

fn read_matrix(path: &Path) -> BolideResult<Array2<f64>> {
    let f = std::fs::File::open(path)?;

    let mut ncols: Option<usize> = None;
    let mut nrows = 0;
    let mut vals: Vec<f64> = vec![];

    for line in BufReader::new(f).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let before = vals.len();
        for token in line.split_whitespace() {
            let val: f64 = token.parse().map_err(|_| {
                BolideError::MalformedGrid(format!(
                    "{}: bad value '{}' on row {}",
                    path.display(),
                    token,
                    nrows
                ))
            })?;
            vals.push(val);
        }

        let row_len = vals.len() - before;
        match ncols {
            None => ncols = Some(row_len),
            Some(n) if n != row_len => {
                return Err(BolideError::MalformedGrid(format!(
                    "{}: row {} has {} values, expected {}",
                    path.display(),
                    nrows,
                    row_len,
                    n
                )))
            }
            Some(_) => {}
        }

        nrows += 1;
    }

    let ncols = ncols.unwrap_or(0);
    Array2::from_shape_vec((nrows, ncols), vals)
        .map_err(|err| BolideError::MalformedGrid(format!("{}: {}", path.display(), err)))
}
