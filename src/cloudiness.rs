//! Reduce a window of the binary cloud mask to a single cloud fraction.
use crate::{BolideError, BolideResult};
use ndarray::ArrayView2;

/// The mean of a clear sky mask window, 0 is all clear and 1 is all cloud.
///
/// Fill values (NaN) are skipped. Every pixel counts the same regardless of its footprint, even
/// though pixels get larger toward the edge of the disk.
pub fn cloudiness(window: ArrayView2<f64>) -> BolideResult<f64> {
    let (sum, count) = window
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), &v| (sum + v, count + 1));

    if count == 0 {
        return Err(BolideError::EmptyWindow);
    }

    Ok(sum / count as f64)
}
