use crate::{
    bbox::PixelWindow,
    extract::ScanImage,
    geo::{GeosProjection, SweepAxis},
    reference_grid::ScanGrid,
    BolideError, BolideResult,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use libc::{c_char, c_double, c_int, c_void, size_t};
use ndarray::Array2;
use once_cell::sync::OnceCell;
use std::{
    ffi::{CStr, CString},
    io::Read,
    path::Path,
    sync::{Mutex, MutexGuard},
};

static_assertions::assert_eq_size!(c_double, f64);

/**
 * Handle to a GOES-R ABI full disk product held in a netCDF4 file.
 *
 * Only the metadata needed to map pixels to the Earth is read when opening; data variables are
 * read a window at a time.
 */
#[derive(Debug)]
pub struct GoesImage {
    /// Image width in pixels
    xlen: usize,
    /// Image height in pixels
    ylen: usize,
    /// In memory buffer if this was downloaded or came from a zip file. It must outlive the handle.
    _buffer: Option<Vec<u8>>,
    /// Handle to the NetCDF file
    nc_file_id: c_int,
    /// Orignial file or object name the dataset was loaded from.
    fname: String,
}

macro_rules! check_error {
    ($code:expr) => {
        check_netcdf_error($code, file!(), line!())
    };
}

impl GoesImage {
    /// Open a netCDF file, or a zip archive holding a single netCDF file.
    pub fn open<P: AsRef<Path>>(path: P) -> BolideResult<Self> {
        let p: &Path = path.as_ref();
        let fname: String = p
            .file_name()
            .map(|p| p.to_string_lossy().to_string())
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;

        match p.extension() {
            Some(ext) if ext == "zip" => Self::open_zip(p, fname),
            Some(ext) if ext == "nc" => Self::open_nc(p, fname),
            Some(_) => Err(std::io::Error::from(std::io::ErrorKind::Unsupported).into()),
            None => Err(std::io::Error::from(std::io::ErrorKind::InvalidInput).into()),
        }
    }

    /// Open a netCDF file that has already been read into memory, e.g. downloaded from the archive.
    pub fn from_bytes(name: &str, mut buf: Vec<u8>) -> BolideResult<Self> {
        let name_str = to_c_string(name)?;

        let lock = netcdf_lock();
        let mut file_id: c_int = -1;
        unsafe {
            let status = nc_open_mem(
                name_str.as_ptr(),
                NC_NOWRITE,
                buf.len(),
                buf.as_mut_ptr() as *mut c_void,
                &mut file_id as *mut c_int,
            );
            check_error!(status)?;
        }
        drop(lock);

        Self::initialize_with_nc_file_handle(name.to_owned(), file_id, Some(buf))
    }

    fn open_zip(p: &Path, fname: String) -> BolideResult<Self> {
        let file = std::fs::File::open(p)?;
        let mut zip = zip::ZipArchive::new(file)?;
        if zip.len() != 1 {
            return Err(BolideError::NetCdf(format!(
                "{} holds {} files, expected exactly one",
                fname,
                zip.len()
            )));
        }

        let mut nc_file = zip.by_index(0)?;
        let mut buf: Vec<u8> = Vec::with_capacity(nc_file.size() as usize + 10);
        let _size_read = nc_file.read_to_end(&mut buf)?;

        Self::from_bytes(&fname, buf)
    }

    fn open_nc(p: &Path, fname: String) -> BolideResult<Self> {
        let path_str = to_c_string(&p.to_string_lossy())?;

        let lock = netcdf_lock();
        let mut file_id: c_int = -1;
        unsafe {
            let status = nc_open(path_str.as_ptr(), NC_NOWRITE, &mut file_id as *mut c_int);
            check_error!(status)?;
        }
        drop(lock);

        Self::initialize_with_nc_file_handle(fname, file_id, None)
    }

    fn initialize_with_nc_file_handle(
        fname: String,
        handle: c_int,
        in_memory_buffer: Option<Vec<u8>>,
    ) -> BolideResult<Self> {
        let mut xlen: usize = 0;
        let mut ylen: usize = 0;

        // Build the value first so the handle is closed by Drop if anything below fails. The
        // lock is declared after it so it is released before Drop needs it.
        let mut img = GoesImage {
            xlen,
            ylen,
            _buffer: in_memory_buffer,
            nc_file_id: handle,
            fname,
        };

        let lock = netcdf_lock();
        unsafe {
            let mut xdimid: c_int = -1;
            let mut status = nc_inq_dimid(
                handle,
                b"x\0".as_ptr() as *const c_char,
                &mut xdimid as *mut c_int,
            );
            check_error!(status)?;
            status = nc_inq_dimlen(handle, xdimid, &mut xlen as *mut size_t);
            check_error!(status)?;

            let mut ydimid: c_int = -1;
            status = nc_inq_dimid(
                handle,
                b"y\0".as_ptr() as *const c_char,
                &mut ydimid as *mut c_int,
            );
            check_error!(status)?;
            status = nc_inq_dimlen(handle, ydimid, &mut ylen as *mut size_t);
            check_error!(status)?;
        }
        drop(lock);

        img.xlen = xlen;
        img.ylen = ylen;

        Ok(img)
    }

    /// Id of a variable, the caller must hold the lock.
    fn varid(&self, name: &str) -> BolideResult<c_int> {
        let cname = to_c_string(name)?;
        let mut varid: c_int = -1;
        unsafe {
            let status = nc_inq_varid(self.nc_file_id, cname.as_ptr(), &mut varid as *mut c_int);
            check_netcdf_error(status, file!(), line!()).map_err(|err| {
                BolideError::NetCdf(format!("{}: variable {}: {}", self.fname, name, err))
            })?;
        }
        Ok(varid)
    }

    /// A numeric attribute, `None` if it isn't there. The caller must hold the lock.
    fn att_double(&self, varid: c_int, name: &'static str) -> BolideResult<Option<f64>> {
        let cname = to_c_string(name)?;
        let mut val: f64 = f64::NAN;
        unsafe {
            let status = nc_get_att_double(
                self.nc_file_id,
                varid,
                cname.as_ptr(),
                &mut val as *mut c_double,
            );
            if status == NC_ENOTATT {
                return Ok(None);
            }
            check_error!(status)?;
        }
        Ok(Some(val))
    }

    /// A text attribute, `None` if it isn't there. The caller must hold the lock.
    fn att_text(&self, varid: c_int, name: &'static str) -> BolideResult<Option<String>> {
        let cname = to_c_string(name)?;
        let mut len: size_t = 0;
        let mut buf: Vec<u8>;
        unsafe {
            let status = nc_inq_attlen(self.nc_file_id, varid, cname.as_ptr(), &mut len as *mut size_t);
            if status == NC_ENOTATT {
                return Ok(None);
            }
            check_error!(status)?;

            buf = vec![0u8; len];
            let status = nc_get_att_text(
                self.nc_file_id,
                varid,
                cname.as_ptr(),
                buf.as_mut_ptr() as *mut c_char,
            );
            check_error!(status)?;
        }

        // Text attributes are not required to be nul terminated, but some writers add one.
        while buf.last() == Some(&0) {
            buf.pop();
        }

        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    fn required_double(
        &self,
        varid: c_int,
        variable: &'static str,
        attribute: &'static str,
    ) -> BolideResult<f64> {
        self.att_double(varid, attribute)?
            .ok_or(BolideError::MissingAttribute {
                variable,
                attribute,
            })
    }

    /// Read a hyperslab as doubles and apply the CF packing conventions.
    ///
    /// Fill values become NaN, `_Unsigned` data is reinterpreted, then scale_factor and
    /// add_offset are applied. The caller must hold the lock.
    fn read_slab(&self, varid: c_int, start: &[size_t], counts: &[size_t]) -> BolideResult<Vec<f64>> {
        let num: usize = counts.iter().product();
        let mut vals: Vec<f64> = Vec::with_capacity(num);

        let mut xtype: c_int = 0;
        unsafe {
            let mut status = nc_inq_vartype(self.nc_file_id, varid, &mut xtype as *mut c_int);
            check_error!(status)?;

            if num > 0 {
                status = nc_get_vara_double(
                    self.nc_file_id,
                    varid,
                    start.as_ptr(),
                    counts.as_ptr(),
                    vals.as_mut_ptr(),
                );
                check_error!(status)?;
            }

            vals.set_len(num);
        }

        let fill_value = self.att_double(varid, "_FillValue")?;
        let scale_factor = self.att_double(varid, "scale_factor")?.unwrap_or(1.0);
        let add_offset = self.att_double(varid, "add_offset")?.unwrap_or(0.0);
        let unsigned = self
            .att_text(varid, "_Unsigned")?
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let wrap = match (unsigned, xtype) {
            (true, NC_BYTE) => 256.0,
            (true, NC_SHORT) => 65536.0,
            (true, NC_INT) => 4_294_967_296.0,
            _ => 0.0,
        };

        for val in vals.iter_mut() {
            if Some(*val) == fill_value {
                *val = f64::NAN;
                continue;
            }

            if *val < 0.0 {
                *val += wrap;
            }

            *val = *val * scale_factor + add_offset;
        }

        Ok(vals)
    }
}

impl ScanImage for GoesImage {
    fn name(&self) -> &str {
        &self.fname
    }

    fn shape(&self) -> (usize, usize) {
        (self.ylen, self.xlen)
    }

    fn scan_grid(&self) -> BolideResult<ScanGrid> {
        const PROJ: &str = "goes_imager_projection";

        let lock = netcdf_lock();

        let x = self.read_slab(self.varid("x")?, &[0], &[self.xlen])?;
        let y = self.read_slab(self.varid("y")?, &[0], &[self.ylen])?;

        let proj_id = self.varid(PROJ)?;
        let perspective_height = self.required_double(proj_id, PROJ, "perspective_point_height")?;
        let lon_0 = self.required_double(proj_id, PROJ, "longitude_of_projection_origin")?;
        let semi_major = self.required_double(proj_id, PROJ, "semi_major_axis")?;
        let semi_minor = self.required_double(proj_id, PROJ, "semi_minor_axis")?;
        let sweep = self
            .att_text(proj_id, "sweep_angle_axis")?
            .and_then(|v| SweepAxis::from_attribute(&v))
            .ok_or(BolideError::MissingAttribute {
                variable: PROJ,
                attribute: "sweep_angle_axis",
            })?;

        drop(lock);

        Ok(ScanGrid {
            x,
            y,
            projection: GeosProjection::new(perspective_height, lon_0, sweep)
                .with_ellipsoid(semi_major, semi_minor),
        })
    }

    fn spatial_resolution_km(&self) -> BolideResult<f64> {
        let lock = netcdf_lock();
        let text = self.att_text(NC_GLOBAL, "spatial_resolution")?;
        drop(lock);

        text.as_deref()
            .and_then(parse_spatial_resolution)
            .ok_or(BolideError::MissingAttribute {
                variable: "global",
                attribute: "spatial_resolution",
            })
    }

    fn scan_start(&self) -> BolideResult<DateTime<Utc>> {
        let lock = netcdf_lock();
        let bounds = self.read_slab(self.varid("time_bounds")?, &[0], &[1])?;
        drop(lock);

        let seconds = bounds
            .first()
            .copied()
            .filter(|s| s.is_finite())
            .ok_or_else(|| BolideError::NetCdf(format!("{}: no valid time_bounds", self.fname)))?;

        Ok(goes_epoch() + Duration::milliseconds((seconds * 1000.0).round() as i64))
    }

    fn read_window(&self, variable: &str, window: &PixelWindow) -> BolideResult<Array2<f64>> {
        if window.row_max > self.ylen || window.col_max > self.xlen {
            return Err(BolideError::WindowOutOfBounds {
                rows: (window.row_min, window.row_max),
                cols: (window.col_min, window.col_max),
                shape: self.shape(),
            });
        }

        let start = [window.row_min, window.col_min];
        let counts = [window.rows(), window.cols()];

        let lock = netcdf_lock();
        let vals = self.read_slab(self.varid(variable)?, &start, &counts)?;
        drop(lock);

        Array2::from_shape_vec((counts[0], counts[1]), vals)
            .map_err(|err| BolideError::NetCdf(format!("{}: {}", self.fname, err)))
    }
}

impl Drop for GoesImage {
    fn drop(&mut self) {
        let lock = netcdf_lock();

        unsafe {
            let _ = nc_close(self.nc_file_id);
        }

        drop(lock);
    }
}

/// Time zero of GOES-R time variables, 2000-01-01 12:00:00 UTC.
fn goes_epoch() -> DateTime<Utc> {
    let naive = NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap_or_default();
    DateTime::from_naive_utc_and_offset(naive, Utc)
}

/// Parse the km value from an attribute like "2km at nadir".
fn parse_spatial_resolution(text: &str) -> Option<f64> {
    let end = text.find("km")?;
    text[..end].trim().parse().ok()
}

fn to_c_string(val: &str) -> BolideResult<CString> {
    CString::new(val).map_err(|err| BolideError::NetCdf(format!("invalid name {}: {}", val, err)))
}

static NETCDF_GLOBAL_LOCK: OnceCell<Mutex<()>> = OnceCell::new();

/// The netCDF library is not thread safe, every call into it must hold this lock.
fn netcdf_lock() -> MutexGuard<'static, ()> {
    NETCDF_GLOBAL_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

const NC_NOWRITE: c_int = 0x0000;
const NC_NOERR: c_int = 0;
const NC_ENOTATT: c_int = -43;
const NC_GLOBAL: c_int = -1;
const NC_BYTE: c_int = 1;
const NC_SHORT: c_int = 3;
const NC_INT: c_int = 4;

fn check_netcdf_error(status_code: c_int, file: &'static str, line: u32) -> BolideResult<()> {
    unsafe {
        if status_code != NC_NOERR {
            Err(BolideError::NetCdf(format!(
                "{}[{}]netCDF error: {}",
                file,
                line,
                CStr::from_ptr(nc_strerror(status_code)).to_string_lossy()
            )))
        } else {
            Ok(())
        }
    }
}

#[link(name = "netcdf")]
extern "C" {
    fn nc_open(path: *const c_char, mode: c_int, ncidp: *mut c_int) -> c_int;
    fn nc_open_mem(
        name: *const c_char,
        mode: c_int,
        buf_size: size_t,
        buf: *mut c_void,
        ncidp: *mut c_int,
    ) -> c_int;
    fn nc_close(handle: c_int) -> c_int;

    fn nc_strerror(code: c_int) -> *const c_char;

    fn nc_inq_dimid(handle: c_int, name: *const c_char, rv: *mut c_int) -> c_int;
    fn nc_inq_dimlen(handle: c_int, dimid: c_int, rv: *mut size_t) -> c_int;
    fn nc_inq_varid(handle: c_int, name: *const c_char, varid: *mut c_int) -> c_int;
    fn nc_inq_vartype(handle: c_int, varid: c_int, xtypep: *mut c_int) -> c_int;
    fn nc_inq_attlen(handle: c_int, varid: c_int, name: *const c_char, lenp: *mut size_t) -> c_int;
    fn nc_get_att_double(
        handle: c_int,
        varid: c_int,
        name: *const c_char,
        val: *mut c_double,
    ) -> c_int;
    fn nc_get_att_text(handle: c_int, varid: c_int, name: *const c_char, val: *mut c_char)
        -> c_int;
    fn nc_get_vara_double(
        handle: c_int,
        varid: c_int,
        start: *const size_t,
        counts: *const size_t,
        vals: *mut c_double,
    ) -> c_int;
}
