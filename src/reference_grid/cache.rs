use super::{ReferenceGrid, Resolution, ScanGrid};
use crate::{satellite::Satellite, BolideResult};
use log::{debug, info};
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap as HashMap;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

type GridCell = Arc<OnceCell<Arc<ReferenceGrid>>>;

/// Reference grids keyed by satellite and resolution, backed by files in a directory.
///
/// A grid is populated at most once per key. The first caller for a key loads it from disk, or
/// builds and saves it if the files are missing; concurrent callers for the same key wait for
/// that result instead of building their own.
#[derive(Debug)]
pub struct ReferenceGridCache {
    dir: PathBuf,
    grids: Mutex<HashMap<(Satellite, Resolution), GridCell>>,
}

impl ReferenceGridCache {
    /// Create a cache that keeps its files in `dir`.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        ReferenceGridCache {
            dir: dir.as_ref().to_path_buf(),
            grids: Mutex::new(HashMap::default()),
        }
    }

    /// The directory the grid files live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Check if both files for this key already exist.
    pub fn is_persisted(&self, sat: Satellite, resolution: Resolution) -> bool {
        let (lats, lons) = ReferenceGrid::file_paths(&self.dir, sat, resolution);
        lats.exists() && lons.exists()
    }

    /// Get a grid, loading it from disk or building it with the scan grid returned by `fetch`.
    ///
    /// `fetch` is only called when neither memory nor disk have the grid.
    pub fn get_or_build<F>(
        &self,
        sat: Satellite,
        resolution: Resolution,
        fetch: F,
    ) -> BolideResult<Arc<ReferenceGrid>>
    where
        F: FnOnce(Satellite) -> BolideResult<ScanGrid>,
    {
        let cell = self.cell(sat, resolution);

        let grid = cell.get_or_try_init(|| -> BolideResult<Arc<ReferenceGrid>> {
            if self.is_persisted(sat, resolution) {
                debug!("loading {} {} reference grid from {}", sat, resolution, self.dir.display());
                return Ok(Arc::new(ReferenceGrid::load(&self.dir, sat, resolution)?));
            }

            info!("building {} {} reference grid in {}", sat, resolution, self.dir.display());
            let scan = fetch(sat)?;
            let grid = ReferenceGrid::from_scan_grid(&scan, resolution)?;
            std::fs::create_dir_all(&self.dir)?;
            grid.save(&self.dir, sat)?;

            // Index against what was written, the same as every later run will.
            Ok(Arc::new(ReferenceGrid::load(&self.dir, sat, resolution)?))
        })?;

        Ok(Arc::clone(grid))
    }

    fn cell(&self, sat: Satellite, resolution: Resolution) -> GridCell {
        // The map only ever gains entries, so a poisoned lock still holds a usable map.
        let mut grids = self
            .grids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        Arc::clone(grids.entry((sat, resolution)).or_default())
    }
}
