//! Axis-wise reductions and linear detrending.
//!
//! Reductions keep the reduced axes with length 1 so the result broadcasts
//! back over the input array for in-place subtraction or division.

use ndarray::{ArrayD, Axis};

use crate::error::{Error, Result};

/// Resolve a possibly negative axis index against an array's ndim.
pub fn resolve_axis(axis: isize, ndim: usize) -> Result<usize> {
    let resolved = if axis < 0 { axis + ndim as isize } else { axis };
    if resolved < 0 || resolved >= ndim as isize {
        return Err(Error::InvalidParameter(format!(
            "axis {axis} is out of range for a {ndim}-dimensional array"
        )));
    }
    Ok(resolved as usize)
}

/// Collapse `axes` with `reduce`, then re-insert them with length 1.
fn reduce_keepdims<F>(a: &ArrayD<f64>, axes: &[usize], reduce: F) -> ArrayD<f64>
where
    F: Fn(&ArrayD<f64>, Axis) -> ArrayD<f64>,
{
    let mut sorted = axes.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut out = a.clone();
    for &ax in sorted.iter().rev() {
        out = reduce(&out, Axis(ax));
    }
    for &ax in &sorted {
        out = out.insert_axis(Axis(ax));
    }
    out
}

/// Arithmetic mean reduced jointly over `axes`.
pub fn mean_keepdims(a: &ArrayD<f64>, axes: &[usize]) -> ArrayD<f64> {
    let count: f64 = axes.iter().map(|&ax| a.len_of(Axis(ax)) as f64).product();
    let sum = reduce_keepdims(a, axes, |arr, ax| arr.sum_axis(ax));
    sum.mapv_into(|v| v / count)
}

/// Population standard deviation (ddof = 0) reduced jointly over `axes`.
pub fn std_keepdims(a: &ArrayD<f64>, axes: &[usize]) -> ArrayD<f64> {
    let mean = mean_keepdims(a, axes);
    let sq = (a - &mean).mapv_into(|d| d * d);
    mean_keepdims(&sq, axes).mapv_into(f64::sqrt)
}

/// Maximum absolute value reduced jointly over `axes`.
pub fn max_abs_keepdims(a: &ArrayD<f64>, axes: &[usize]) -> ArrayD<f64> {
    reduce_keepdims(a, axes, |arr, ax| {
        arr.fold_axis(ax, 0.0, |&acc, &v| if v.abs() > acc { v.abs() } else { acc })
    })
}

/// Subtract the least-squares linear trend from every lane along `axis`.
pub fn detrend_linear(a: &mut ArrayD<f64>, axis: usize) {
    for mut lane in a.lanes_mut(Axis(axis)) {
        let n = lane.len();
        if n < 2 {
            // A line fits a single point exactly; the residual is zero.
            lane.fill(0.0);
            continue;
        }
        let nf = n as f64;
        let x_mean = (nf - 1.0) / 2.0;
        let sxx = nf * (nf * nf - 1.0) / 12.0;
        let y_mean = lane.sum() / nf;

        let mut sxy = 0.0;
        for (i, v) in lane.iter().enumerate() {
            sxy += (i as f64 - x_mean) * (v - y_mean);
        }
        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;

        for (i, v) in lane.iter_mut().enumerate() {
            *v -= slope * i as f64 + intercept;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_resolve_axis() {
        assert_eq!(resolve_axis(-1, 2).unwrap(), 1);
        assert_eq!(resolve_axis(0, 2).unwrap(), 0);
        assert!(resolve_axis(2, 2).is_err());
        assert!(resolve_axis(-3, 2).is_err());
    }

    #[test]
    fn test_mean_keepdims_single_axis() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn();
        let m = mean_keepdims(&a, &[1]);
        assert_eq!(m.shape(), &[2, 1]);
        assert_abs_diff_eq!(m[[0, 0]], 2.0);
        assert_abs_diff_eq!(m[[1, 0]], 5.0);
    }

    #[test]
    fn test_mean_keepdims_joint_axes() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn();
        let m = mean_keepdims(&a, &[0, 1]);
        assert_eq!(m.shape(), &[1, 1]);
        assert_abs_diff_eq!(m[[0, 0]], 3.5);
    }

    #[test]
    fn test_std_keepdims() {
        let a = array![[1.0, -1.0, 1.0, -1.0]].into_dyn();
        let s = std_keepdims(&a, &[1]);
        assert_abs_diff_eq!(s[[0, 0]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_max_abs_keepdims() {
        let a = array![[1.0, -5.0, 3.0], [0.0, 0.0, 0.0]].into_dyn();
        let m = max_abs_keepdims(&a, &[1]);
        assert_eq!(m[[0, 0]], 5.0);
        assert_eq!(m[[1, 0]], 0.0);
    }

    #[test]
    fn test_detrend_removes_exact_line() {
        let mut a = ndarray::Array::from_shape_fn((2, 50), |(c, t)| {
            (c as f64 + 1.0) * t as f64 + 3.0
        })
        .into_dyn();
        detrend_linear(&mut a, 1);
        for v in a.iter() {
            assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_detrend_preserves_residual_shape() {
        let mut a = ndarray::Array::from_shape_fn((1, 100), |(_, t)| {
            0.5 * t as f64 + (t as f64 * 0.7).sin()
        })
        .into_dyn();
        let original = a.clone();
        detrend_linear(&mut a, 1);
        // The trend is gone but the oscillation remains.
        let residual_power: f64 = a.iter().map(|v| v * v).sum();
        assert!(residual_power > 1.0);
        assert!(residual_power < original.iter().map(|v| v * v).sum::<f64>());
    }
}
