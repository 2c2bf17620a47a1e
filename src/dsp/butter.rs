//! Butterworth filter design.
//!
//! Coefficients are produced as cascaded second-order sections: analog
//! prototype poles, band transform (lp2lp/lp2hp/lp2bp/lp2bs), bilinear
//! transform with frequency prewarping, then conjugate-pair grouping into
//! biquads with the overall gain folded into the first section.

use std::cmp::Ordering;
use std::f64::consts::PI;

use num_complex::Complex;

use crate::dsp::sos::{Biquad, Sos};
use crate::error::{Error, Result};
use crate::filter::{FilterType, FrequencySpec};

type C = Complex<f64>;

/// Design a Butterworth filter for signals sampled at `fs` Hz.
pub fn design(
    order: usize,
    frequency: &FrequencySpec,
    filter_type: FilterType,
    fs: f64,
) -> Result<Sos> {
    if order == 0 {
        return Err(Error::InvalidParameter(
            "filter order must be positive".to_owned(),
        ));
    }
    if !(fs > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "sampling rate must be positive, got {fs} Hz"
        )));
    }
    let nyquist = fs / 2.0;

    // Prewarp critical frequencies for the bilinear transform.
    let warp = |f: f64| 2.0 * fs * (PI * f / fs).tan();

    // Analog lowpass prototype: unit-circle poles in the left half plane.
    let prototype: Vec<C> = (0..order)
        .map(|k| C::from_polar(1.0, PI * (2 * k + order + 1) as f64 / (2 * order) as f64))
        .collect();

    let (zeros, poles, gain) = match (filter_type, frequency) {
        (FilterType::Lowpass, FrequencySpec::Single(f)) => {
            check_critical(*f, nyquist)?;
            let wo = warp(*f);
            let poles: Vec<C> = prototype.iter().map(|&p| p * wo).collect();
            (Vec::new(), poles, wo.powi(order as i32))
        }
        (FilterType::Highpass, FrequencySpec::Single(f)) => {
            check_critical(*f, nyquist)?;
            let wo = warp(*f);
            let denom: C = prototype.iter().map(|&p| -p).product();
            let gain = (C::from(1.0) / denom).re;
            let poles: Vec<C> = prototype.iter().map(|&p| C::from(wo) / p).collect();
            (vec![C::from(0.0); order], poles, gain)
        }
        (FilterType::Bandpass, FrequencySpec::Band(low, high)) => {
            check_band(*low, *high, nyquist)?;
            let (w1, w2) = (warp(*low), warp(*high));
            let bandwidth = w2 - w1;
            let wo_sq = w1 * w2;
            let poles = band_poles(&prototype, bandwidth, wo_sq, false);
            (
                vec![C::from(0.0); order],
                poles,
                bandwidth.powi(order as i32),
            )
        }
        (FilterType::Bandstop, FrequencySpec::Band(low, high)) => {
            check_band(*low, *high, nyquist)?;
            let (w1, w2) = (warp(*low), warp(*high));
            let bandwidth = w2 - w1;
            let wo_sq = w1 * w2;
            let wo = wo_sq.sqrt();
            let denom: C = prototype.iter().map(|&p| -p).product();
            let gain = (C::from(1.0) / denom).re;
            let poles = band_poles(&prototype, bandwidth, wo_sq, true);
            let mut zeros = Vec::with_capacity(2 * order);
            for _ in 0..order {
                zeros.push(C::new(0.0, wo));
                zeros.push(C::new(0.0, -wo));
            }
            (zeros, poles, gain)
        }
        (FilterType::Lowpass | FilterType::Highpass, FrequencySpec::Band(..)) => {
            return Err(Error::InvalidParameter(format!(
                "{filter_type:?} filters take a single critical frequency, not a band"
            )));
        }
        (FilterType::Bandpass | FilterType::Bandstop, FrequencySpec::Single(..)) => {
            return Err(Error::InvalidParameter(format!(
                "{filter_type:?} filters take a (low, high) frequency pair"
            )));
        }
    };

    let (zeros, poles, gain) = bilinear(&zeros, &poles, gain, fs);
    to_sos(&zeros, &poles, gain)
}

fn check_critical(f: f64, nyquist: f64) -> Result<()> {
    if !(f > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "critical frequency must be positive, got {f} Hz"
        )));
    }
    if f >= nyquist {
        return Err(Error::InvalidParameter(format!(
            "critical frequency ({f} Hz) must be below the Nyquist frequency ({nyquist} Hz)"
        )));
    }
    Ok(())
}

fn check_band(low: f64, high: f64, nyquist: f64) -> Result<()> {
    if !(low > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "critical frequency must be positive, got {low} Hz"
        )));
    }
    if low >= high {
        return Err(Error::InvalidParameter(format!(
            "low cutoff ({low} Hz) must be below the high cutoff ({high} Hz)"
        )));
    }
    if high >= nyquist {
        return Err(Error::InvalidParameter(format!(
            "high cutoff ({high} Hz) must be below the Nyquist frequency ({nyquist} Hz)"
        )));
    }
    Ok(())
}

/// Map prototype poles into a band geometry. Each prototype pole yields the
/// two roots p ± sqrt(p^2 - wo^2); for bandstop the pole is inverted first.
fn band_poles(prototype: &[C], bandwidth: f64, wo_sq: f64, invert: bool) -> Vec<C> {
    let half_bw = bandwidth / 2.0;
    let mut out = Vec::with_capacity(2 * prototype.len());
    for &p in prototype {
        let scaled = if invert {
            C::from(half_bw) / p
        } else {
            p * half_bw
        };
        let disc = (scaled * scaled - C::from(wo_sq)).sqrt();
        out.push(scaled + disc);
        out.push(scaled - disc);
    }
    out
}

/// Bilinear transform of an analog zero/pole/gain system sampled at `fs`.
/// Zeros at analog infinity land at z = -1.
fn bilinear(zeros: &[C], poles: &[C], gain: f64, fs: f64) -> (Vec<C>, Vec<C>, f64) {
    let fs2 = C::from(2.0 * fs);

    let num: C = zeros.iter().map(|&z| fs2 - z).product();
    let den: C = poles.iter().map(|&p| fs2 - p).product();
    let gain = gain * (num / den).re;

    let mut z_digital: Vec<C> = zeros.iter().map(|&z| (fs2 + z) / (fs2 - z)).collect();
    z_digital.resize(poles.len(), C::from(-1.0));
    let p_digital: Vec<C> = poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();

    (z_digital, p_digital, gain)
}

/// One root-pair unit of a second-order section.
enum PairKind {
    /// Upper-half-plane representative of a conjugate pair.
    Conjugate(C),
    /// Two real roots sharing one section.
    Reals(f64, f64),
    /// A lone real root (first-order section, odd overall order).
    Single(f64),
}

/// Split a conjugate-symmetric root set into pair units. Complex pairs come
/// first (largest magnitude first), then real pairs built from the extremes
/// of the real roots, then an optional lone real root.
fn pair_units(values: &[C]) -> Result<Vec<PairKind>> {
    let mut conjugates = Vec::new();
    let mut reals = Vec::new();
    for v in values {
        if v.im.abs() <= 1e-9 * (1.0 + v.norm()) {
            reals.push(v.re);
        } else if v.im > 0.0 {
            conjugates.push(*v);
        }
    }
    if 2 * conjugates.len() + reals.len() != values.len() {
        return Err(Error::NumericInstability(
            "designed roots do not form conjugate pairs".to_owned(),
        ));
    }

    conjugates.sort_by(|a, b| b.norm().partial_cmp(&a.norm()).unwrap_or(Ordering::Equal));
    reals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let mut units: Vec<PairKind> = conjugates.into_iter().map(PairKind::Conjugate).collect();
    while reals.len() >= 2 {
        let low = reals.remove(0);
        let high = match reals.pop() {
            Some(v) => v,
            None => break,
        };
        units.push(PairKind::Reals(low, high));
    }
    if let Some(r) = reals.pop() {
        units.push(PairKind::Single(r));
    }
    Ok(units)
}

impl PairKind {
    /// Coefficients (c1, c2) of the monic polynomial 1 + c1*z^-1 + c2*z^-2.
    fn coefficients(&self) -> (f64, f64) {
        match *self {
            PairKind::Conjugate(r) => (-2.0 * r.re, r.norm_sqr()),
            PairKind::Reals(r1, r2) => (-(r1 + r2), r1 * r2),
            PairKind::Single(r) => (-r, 0.0),
        }
    }
}

/// Group digital zeros and poles into biquad sections, gain in section 0.
fn to_sos(zeros: &[C], poles: &[C], gain: f64) -> Result<Sos> {
    let zero_units = pair_units(zeros)?;
    let pole_units = pair_units(poles)?;
    if zero_units.len() != pole_units.len() {
        return Err(Error::NumericInstability(
            "zero and pole pairings are inconsistent".to_owned(),
        ));
    }

    let mut sections = Vec::with_capacity(pole_units.len());
    for (index, (zu, pu)) in zero_units.iter().zip(pole_units.iter()).enumerate() {
        let (b1, b2) = zu.coefficients();
        let (a1, a2) = pu.coefficients();
        let scale = if index == 0 { gain } else { 1.0 };
        sections.push(Biquad {
            b0: scale,
            b1: scale * b1,
            b2: scale * b2,
            a1,
            a2,
        });
    }
    Ok(Sos::new(sections))
}
