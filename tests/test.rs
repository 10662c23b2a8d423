use bolidebox::{
    extract_window, BoundingBoxRequest, BolideError, BolideEvent, BolideResult, Coord, Extractor,
    GeosProjection, ObjectStore, PixelWindow, Product, ReferenceGrid, ReferenceGridCache,
    Resolution, Satellite, ScanGrid, ScanImage, SweepAxis, OFF_GLOBE_SENTINEL,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::{
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

/*-------------------------------------------------------------------------------------------------
 *                                   Synthetic archive
 *-----------------------------------------------------------------------------------------------*/
const PERSPECTIVE_HEIGHT: f64 = 35_786_023.0;

/// Scan angle between 2 km pixels of the ABI fixed grid.
const STEP_2KM: f64 = 56.0e-6;

/// What gets stored in the fake bucket in place of a netCDF file.
#[derive(Debug, Serialize, Deserialize)]
struct SyntheticSpec {
    lon_0: f64,
    native_km: f64,
    value: f64,
}

/// A full disk image with a constant value everywhere, built without holding the pixels.
#[derive(Debug)]
struct SyntheticImage {
    name: String,
    spec: SyntheticSpec,
}

impl SyntheticImage {
    fn len(&self) -> usize {
        (5424.0 * 2.0 / self.spec.native_km).round() as usize
    }
}

fn read_synthetic(name: &str, bytes: Vec<u8>) -> BolideResult<SyntheticImage> {
    Ok(SyntheticImage {
        name: name.to_owned(),
        spec: serde_json::from_slice(&bytes)?,
    })
}

fn full_disk_scan_grid(n: usize, native_km: f64, lon_0: f64) -> ScanGrid {
    let step = STEP_2KM * native_km / 2.0;
    let first = -(n as f64 - 1.0) / 2.0 * step;
    let x: Vec<f64> = (0..n).map(|i| first + i as f64 * step).collect();
    let y: Vec<f64> = x.iter().rev().cloned().collect();

    ScanGrid {
        x,
        y,
        projection: GeosProjection::new(PERSPECTIVE_HEIGHT, lon_0, SweepAxis::X),
    }
}

impl ScanImage for SyntheticImage {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> (usize, usize) {
        (self.len(), self.len())
    }

    fn scan_grid(&self) -> BolideResult<ScanGrid> {
        Ok(full_disk_scan_grid(
            self.len(),
            self.spec.native_km,
            self.spec.lon_0,
        ))
    }

    fn spatial_resolution_km(&self) -> BolideResult<f64> {
        Ok(self.spec.native_km)
    }

    fn scan_start(&self) -> BolideResult<DateTime<Utc>> {
        Ok(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 20).unwrap())
    }

    fn read_window(&self, _variable: &str, window: &PixelWindow) -> BolideResult<Array2<f64>> {
        let n = self.len();
        if window.row_max > n || window.col_max > n {
            return Err(BolideError::WindowOutOfBounds {
                rows: (window.row_min, window.row_max),
                cols: (window.col_min, window.col_max),
                shape: (n, n),
            });
        }

        Ok(Array2::from_elem(
            (window.rows(), window.cols()),
            self.spec.value,
        ))
    }
}

/// An in memory bucket that counts how it is used.
#[derive(Default)]
struct FakeStore {
    objects: Vec<(String, String, Vec<u8>)>,
    listed_prefixes: Mutex<Vec<String>>,
    gets: AtomicUsize,
}

impl FakeStore {
    fn insert(&mut self, sat: Satellite, key: &str, spec: SyntheticSpec) {
        let bytes = serde_json::to_vec(&spec).unwrap();
        self.objects.push((sat.bucket(), key.to_owned(), bytes));
    }

    fn downloads(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

impl ObjectStore for FakeStore {
    fn list_keys(&self, bucket: &str, prefix: &str, _delimiter: &str) -> BolideResult<Vec<String>> {
        self.listed_prefixes.lock().unwrap().push(prefix.to_owned());

        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|(b, k, _)| b == bucket && k.starts_with(prefix))
            .map(|(_, k, _)| k.clone())
            .collect();
        keys.sort();

        Ok(keys)
    }

    fn get(&self, bucket: &str, key: &str) -> BolideResult<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);

        self.objects
            .iter()
            .find(|(b, k, _)| b == bucket && k == key)
            .map(|(_, _, bytes)| bytes.clone())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound).into())
    }
}

fn lon_0(sat: Satellite) -> f64 {
    match sat {
        Satellite::G16 => -75.0,
        Satellite::G17 => -137.0,
    }
}

/// A store holding the full disk clear sky mask scan starting at 2022-01-01 00:00 for a satellite.
fn store_with_mask(sats: &[(Satellite, f64)]) -> FakeStore {
    let mut store = FakeStore::default();
    for &(sat, value) in sats {
        let spec = SyntheticSpec {
            lon_0: lon_0(sat),
            native_km: 2.0,
            value,
        };
        store.insert(sat, sat.calibration_key(), spec);
    }
    store
}

fn florida_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, 1, 1)
        .unwrap()
        .and_hms_opt(0, 5, 0)
        .unwrap()
}

fn florida_request() -> BoundingBoxRequest {
    BoundingBoxRequest::new(28.5, -81.4, 2.0)
}

fn reference_grid(sat: Satellite, km: u32) -> ReferenceGrid {
    let scan = full_disk_scan_grid(5424, 2.0, lon_0(sat));
    ReferenceGrid::from_scan_grid(&scan, Resolution::new(km).unwrap()).unwrap()
}

/*-------------------------------------------------------------------------------------------------
 *                                         Tests
 *-----------------------------------------------------------------------------------------------*/
#[test]
fn test_florida_all_clear_and_all_cloud() {
    let res = Resolution::new(32).unwrap();

    for (value, expected) in [(0.0, 0.0), (1.0, 1.0)] {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_mask(&[(Satellite::G16, value)]);
        let grids = ReferenceGridCache::new(dir.path());
        let extractor = Extractor::with_image_reader(&store, &grids, read_synthetic);

        let raster = extractor
            .extract(
                Satellite::G16,
                Product::ClearSkyMask,
                florida_time(),
                &florida_request(),
                res,
            )
            .unwrap();

        assert!(!raster.window.is_empty());
        assert_eq!(raster.data.dim(), (raster.window.rows(), raster.window.cols()));
        assert!(raster.extent.contains(Coord { lat: 28.5, lon: -81.4 }));
        assert!(raster.scan_extent.is_some());
        assert!(raster.source.starts_with("OR_ABI-L2-ACMF-M6_G16_s2022001000"));

        let prefixes = store.listed_prefixes.lock().unwrap().clone();
        assert_eq!(
            prefixes,
            vec!["ABI-L2-ACMF/2022/001/00/OR_ABI-L2-ACMF-M6_G16_s20220010000".to_owned()]
        );

        let cloudiness = extractor
            .cloudiness(Satellite::G16, florida_time(), &florida_request(), res)
            .unwrap();
        assert_eq!(cloudiness, expected);
    }
}

#[test]
fn test_florida_at_8km() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_mask(&[(Satellite::G16, 0.0)]);
    let grids = ReferenceGridCache::new(dir.path());
    let extractor = Extractor::with_image_reader(&store, &grids, read_synthetic);
    let res = Resolution::new(8).unwrap();

    let grid = extractor.reference_grid(Satellite::G16, res).unwrap();
    assert_eq!(grid.dim(), (1356, 1356));

    let reference = bolidebox::reference_window(&grid, &florida_request());
    assert!(reference.row_min < reference.row_max, "{:?}", reference);
    assert!(reference.col_min < reference.col_max, "{:?}", reference);

    let raster = extractor
        .extract(
            Satellite::G16,
            Product::ClearSkyMask,
            florida_time(),
            &florida_request(),
            res,
        )
        .unwrap();

    let w = raster.window;
    assert_eq!(w, reference.scaled(4));
    assert!(!w.is_empty());
    assert!(w.row_max <= 5424 && w.col_max <= 5424, "{:?}", w);
    assert_eq!(raster.data.dim(), (w.rows(), w.cols()));
    assert!(raster.extent.contains(Coord { lat: 28.5, lon: -81.4 }));

    let cloudiness = extractor
        .cloudiness(Satellite::G16, florida_time(), &florida_request(), res)
        .unwrap();
    assert_eq!(cloudiness, 0.0);
}

fn event_at(lat: f64, lon: f64) -> BolideEvent {
    let json = format!(
        r#"{{"data": [{{
            "detectedBy": "GLM-16,GLM-17",
            "latitude": {},
            "longitude": {},
            "datetime": "2022-01-01T00:05:00Z",
            "attachments": [{{}}, {{}}]
        }}]}}"#,
        lat, lon
    );
    BolideEvent::from_json(&json).unwrap()
}

#[test]
fn test_event_cloudiness_averages_satellites() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_mask(&[(Satellite::G16, 1.0), (Satellite::G17, 0.0)]);
    let grids = ReferenceGridCache::new(dir.path());
    let extractor = Extractor::with_image_reader(&store, &grids, read_synthetic);

    // Between the two sub satellite points, well inside both disks.
    let event = event_at(20.0, -106.0);

    let cloudiness = extractor
        .event_cloudiness(&event, 2.0, Resolution::new(32).unwrap())
        .unwrap();
    approx::assert_abs_diff_eq!(cloudiness, 0.5);
}

#[test]
fn test_far_from_nadir_box_collapses() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_mask(&[(Satellite::G16, 1.0), (Satellite::G17, 0.0)]);
    let grids = ReferenceGridCache::new(dir.path());
    let extractor = Extractor::with_image_reader(&store, &grids, read_synthetic);
    let res = Resolution::new(32).unwrap();

    // Seen from GOES-17, the diagonal corners of a box over Florida land in the same or inverted
    // columns, so the window holds no pixels.
    let raster = extractor
        .extract(
            Satellite::G17,
            Product::ClearSkyMask,
            florida_time(),
            &florida_request(),
            res,
        )
        .unwrap();
    assert!(raster.window.is_empty(), "{:?}", raster.window);
    assert_eq!(raster.data.len(), 0);
    assert!(raster.extent.is_empty());

    assert!(matches!(
        extractor.cloudiness(Satellite::G17, florida_time(), &florida_request(), res),
        Err(BolideError::EmptyWindow)
    ));

    assert!(matches!(
        extractor.event_cloudiness(&event_at(28.5, -81.4), 2.0, res),
        Err(BolideError::EmptyWindow)
    ));
}

#[test]
fn test_missing_scan() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_mask(&[(Satellite::G16, 0.0)]);
    let grids = ReferenceGridCache::new(dir.path());
    let extractor = Extractor::with_image_reader(&store, &grids, read_synthetic);

    let later = florida_time() + chrono::Duration::minutes(30);
    let result = extractor.cloudiness(
        Satellite::G16,
        later,
        &florida_request(),
        Resolution::new(32).unwrap(),
    );

    match result {
        Err(BolideError::ScanNotFound { bucket, prefix }) => {
            assert_eq!(bucket, "noaa-goes16");
            assert!(prefix.ends_with("_G16_s20220010030"));
        }
        other => panic!("expected ScanNotFound, got {:?}", other),
    }
}

#[test]
fn test_cache_is_idempotent() {
    let res = Resolution::new(32).unwrap();
    let first_dir = tempfile::tempdir().unwrap();
    let store = store_with_mask(&[(Satellite::G16, 0.0)]);

    let grids = ReferenceGridCache::new(first_dir.path());
    let extractor = Extractor::with_image_reader(&store, &grids, read_synthetic);
    let first = extractor.reference_grid(Satellite::G16, res).unwrap();
    let again = extractor.reference_grid(Satellite::G16, res).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &again));
    assert_eq!(store.downloads(), 1);

    let (lats_path, lons_path) = ReferenceGrid::file_paths(first_dir.path(), Satellite::G16, res);
    let lats_bytes = std::fs::read(&lats_path).unwrap();
    let lons_bytes = std::fs::read(&lons_path).unwrap();

    // A fresh cache over the same directory reads the files instead of downloading.
    let grids = ReferenceGridCache::new(first_dir.path());
    let extractor = Extractor::with_image_reader(&store, &grids, read_synthetic);
    let loaded = extractor.reference_grid(Satellite::G16, res).unwrap();
    assert_eq!(store.downloads(), 1);
    assert_eq!(*loaded, *first);

    // The run that built the grid picks the same windows as every run after it.
    for lat in (-50..=50).step_by(10) {
        for lon in (-130..=-20).step_by(10) {
            let request = BoundingBoxRequest::new(lat as f64 + 0.3, lon as f64 + 0.7, 2.0);
            assert_eq!(
                bolidebox::reference_window(&first, &request),
                bolidebox::reference_window(&loaded, &request)
            );
        }
    }

    // Building again from scratch gives the same files.
    let second_dir = tempfile::tempdir().unwrap();
    let grids = ReferenceGridCache::new(second_dir.path());
    let extractor = Extractor::with_image_reader(&store, &grids, read_synthetic);
    extractor.reference_grid(Satellite::G16, res).unwrap();
    assert_eq!(store.downloads(), 2);

    let (lats2, lons2) = ReferenceGrid::file_paths(second_dir.path(), Satellite::G16, res);
    assert_eq!(std::fs::read(lats2).unwrap(), lats_bytes);
    assert_eq!(std::fs::read(lons2).unwrap(), lons_bytes);
}

#[test]
fn test_invalid_resolution() {
    // Every extraction takes a Resolution, so a bad one never gets as far as the store.
    for km in [0, 1, 3, 7] {
        assert!(matches!(
            Resolution::new(km),
            Err(BolideError::InvalidResolution { .. })
        ));
    }
}

#[test]
fn test_non_integer_scale() {
    let grid = reference_grid(Satellite::G16, 32);
    let image = SyntheticImage {
        name: "three_km".to_owned(),
        spec: SyntheticSpec {
            lon_0: -75.0,
            native_km: 3.0,
            value: 0.0,
        },
    };

    assert!(matches!(
        extract_window(&image, &grid, &florida_request(), "BCM"),
        Err(BolideError::NonIntegerScale { .. })
    ));
}

#[test]
fn test_round_trip() {
    let grid = reference_grid(Satellite::G16, 32);

    for (row, col) in [(120, 140), (150, 200), (200, 150), (169, 169)] {
        let center = grid.coord(row, col).unwrap();
        let request = BoundingBoxRequest::new(center.lat, center.lon, 1.0);
        let window = bolidebox::reference_window(&grid, &request);

        assert!(window.row_min <= row && row <= window.row_max, "{:?}", window);
        assert!(window.col_min <= col && col <= window.col_max, "{:?}", window);

        let mid_row = (window.row_min + window.row_max) as f64 / 2.0;
        let mid_col = (window.col_min + window.col_max) as f64 / 2.0;
        assert!((mid_row - row as f64).abs() <= 1.0, "{:?}", window);
        assert!((mid_col - col as f64).abs() <= 1.0, "{:?}", window);
    }
}

#[test]
fn test_scaling_law() {
    let grid = reference_grid(Satellite::G16, 32);
    let request = florida_request();

    let image = |native_km: f64| SyntheticImage {
        name: format!("{}km", native_km),
        spec: SyntheticSpec {
            lon_0: -75.0,
            native_km,
            value: 1.0,
        },
    };

    let coarse = extract_window(&image(2.0), &grid, &request, "CMI").unwrap();
    let fine = extract_window(&image(1.0), &grid, &request, "CMI").unwrap();

    assert_eq!(fine.window.rows(), 2 * coarse.window.rows());
    assert_eq!(fine.window.cols(), 2 * coarse.window.cols());
    assert_eq!(fine.window.row_min, 2 * coarse.window.row_min);
    assert_eq!(fine.window.col_min, 2 * coarse.window.col_min);
    assert_eq!(fine.extent, coarse.extent);
}

#[test]
fn test_near_limb_avoids_sentinel() {
    let grid = reference_grid(Satellite::G16, 32);
    assert_eq!(grid.lats()[[0, 0]], OFF_GLOBE_SENTINEL);

    // Near the western limb of GOES-16 and completely off the disk.
    for (lat, lon) in [(0.0, -150.0), (0.0, 100.0), (85.0, -75.0)] {
        let request = BoundingBoxRequest::new(lat, lon, 2.0);
        let window = bolidebox::reference_window(&grid, &request);

        // These are the cells the corners of the box were matched to.
        for (row, col) in [
            (window.row_max, window.col_min),
            (window.row_min, window.col_max),
        ] {
            assert!(
                grid.coord(row, col).is_some(),
                "corner ({}, {}) of the box around ({}, {}) is off the globe",
                row,
                col,
                lat,
                lon
            );
        }

        let extent = bolidebox::geographic_extent(&grid, &window);
        assert_eq!(extent.is_empty(), window.is_empty());
        if !extent.is_empty() {
            assert!(extent.min_lat > OFF_GLOBE_SENTINEL && extent.min_lon > OFF_GLOBE_SENTINEL);
        }
    }
}
