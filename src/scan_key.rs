//! Find the archived image that covers a point in time.
//!
//! Object keys in the NOAA archive follow the pattern
//!
//! `{product}/{year}/{day of year}/{hour}/OR_{product}-M6{band}_G{sat}_s{year}{doy}{hour}{minute}{second}{tenth}_e..._c....nc`
//!
//! so the image for a time can be found by listing the prefix that ends at the start minute of
//! the scan containing that time.
use crate::{
    satellite::{Product, Satellite},
    storage::ObjectStore,
    BolideError, BolideResult,
};
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use log::debug;

/// ABI scan modes that produce full disk imagery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Mode 6, a full disk scan every 10 minutes. Operational since April 2019.
    Mode6,
}

impl ScanMode {
    /// The code used in file names.
    pub fn code(&self) -> &'static str {
        match self {
            ScanMode::Mode6 => "M6",
        }
    }

    /// Time between the starts of consecutive full disk scans.
    ///
    /// Keys are found by truncating the minute to a multiple of this value, so if the schedule
    /// ever changes this has to change with it or the prefixes will silently miss.
    pub fn cadence_minutes(&self) -> u32 {
        match self {
            ScanMode::Mode6 => 10,
        }
    }

    /// Truncate a minute to the start of the scan containing it.
    pub fn scan_start_minute(&self, minute: u32) -> u32 {
        minute - minute % self.cadence_minutes()
    }
}

/// The listing prefix for the full disk scan of a product containing `time`.
pub fn scan_prefix(sat: Satellite, product: Product, time: NaiveDateTime) -> String {
    let mode = ScanMode::Mode6;

    let prefix_base = product.prefix_base();
    let year = time.year();
    let doy = time.ordinal();
    let hour = time.hour();
    let minute = mode.scan_start_minute(time.minute());

    format!(
        "{base}/{year}/{doy:03}/{hour:02}/OR_{base}-{mode}{band}_G{sat}_s{year}{doy:03}{hour:02}{minute:02}",
        base = prefix_base,
        year = year,
        doy = doy,
        hour = hour,
        mode = mode.code(),
        band = product.band_suffix(),
        sat = sat.id(),
        minute = minute,
    )
}

/// Find the key of the image for a satellite, product, and time.
///
/// The first key in the listing is returned. An empty listing means the scan doesn't exist or
/// hasn't been archived yet.
pub fn resolve_key<S: ObjectStore + ?Sized>(
    store: &S,
    sat: Satellite,
    product: Product,
    time: NaiveDateTime,
) -> BolideResult<String> {
    let bucket = sat.bucket();
    let prefix = scan_prefix(sat, product, time);

    let keys = store.list_keys(&bucket, &prefix, "/")?;
    let key = keys
        .into_iter()
        .next()
        .ok_or(BolideError::ScanNotFound { bucket, prefix })?;

    debug!("resolved {} {} at {} to {}", sat, product, time, key);
    Ok(key)
}

/// Parse a timestamp as it comes from users or the event service.
///
/// Accepts a 'T' or a space between date and time, optional fractional seconds, and optional
/// UTC offset. Times with an offset are converted to UTC, times without one are assumed UTC.
pub fn parse_timestamp(text: &str) -> BolideResult<NaiveDateTime> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_utc());
    }

    let text = text.trim_end_matches('Z');
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(dt);
        }
    }

    Err(BolideError::InvalidTimestamp(text.to_owned()))
}
