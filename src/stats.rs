// src/stats.rs
//! Descriptive statistics over observed values and the normal-distribution helpers used by
//! the left-censored imputers.
//!
//! Everything here works on plain `f64` slices that already exclude missing cells.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Open01};

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median (average of the two middle values for even lengths). `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted_copy(values);
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

/// Sample standard deviation with the `n - 1` denominator. `None` for fewer than two values.
pub fn sample_sd(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

/// Unscaled median absolute deviation around the median.
pub fn median_absolute_deviation(values: &[f64]) -> Option<f64> {
    let center = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Sample quantile with linear interpolation between order statistics
/// (Hyndman & Fan type 7). `p` is clamped to `[0, 1]`. `None` for an empty slice.
pub fn quantile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted_copy(values);
    Some(quantile_sorted(&sorted, p))
}

/// Type-7 quantile of an already ascending-sorted, non-empty slice.
pub(crate) fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let h = (n - 1) as f64 * p.clamp(0.0, 1.0);
    let lower = h.floor() as usize;
    let upper = (lower + 1).min(n - 1);
    sorted[lower] + (h - lower as f64) * (sorted[upper] - sorted[lower])
}

pub(crate) fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// `count` evenly spaced points from `start` to `end`, both inclusive.
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Ordinary least-squares line `y ≈ intercept + slope · x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub intercept: f64,
    pub slope: f64,
}

/// Fits `y` on `x` by ordinary least squares.
///
/// Returns `None` when the fit is undefined: mismatched or too-short inputs, no spread in `x`,
/// or non-finite sums.
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<LineFit> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let x_mean = mean(x)?;
    let y_mean = mean(y)?;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        sxx += (xi - x_mean) * (xi - x_mean);
        sxy += (xi - x_mean) * (yi - y_mean);
    }
    if !sxx.is_finite() || !sxy.is_finite() || sxx <= f64::EPSILON * x.len() as f64 {
        return None;
    }
    let slope = sxy / sxx;
    Some(LineFit {
        intercept: y_mean - slope * x_mean,
        slope,
    })
}

/// Standard normal cumulative distribution function.
///
/// Hart's double-precision rational approximation as published by West (2005);
/// absolute error below 1e-14 across the real line.
pub fn standard_normal_cdf(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    let x_abs = x.abs();
    let tail = if x_abs > 37.0 {
        0.0
    } else {
        let e = (-x_abs * x_abs / 2.0).exp();
        if x_abs < 7.071_067_811_865_47 {
            let mut num = 3.526_249_659_989_11e-2 * x_abs + 0.700_383_064_443_688;
            num = num * x_abs + 6.373_962_203_531_65;
            num = num * x_abs + 33.912_866_078_383;
            num = num * x_abs + 112.079_291_497_871;
            num = num * x_abs + 221.213_596_169_931;
            num = num * x_abs + 220.206_867_912_376;
            let mut den = 8.838_834_764_831_84e-2 * x_abs + 1.755_667_163_182_64;
            den = den * x_abs + 16.064_177_579_207;
            den = den * x_abs + 86.780_732_202_946_1;
            den = den * x_abs + 296.564_248_779_674;
            den = den * x_abs + 637.333_633_378_831;
            den = den * x_abs + 793.826_512_519_948;
            den = den * x_abs + 440.413_735_824_752;
            e * num / den
        } else {
            let mut b = x_abs + 0.65;
            b = x_abs + 4.0 / b;
            b = x_abs + 3.0 / b;
            b = x_abs + 2.0 / b;
            b = x_abs + 1.0 / b;
            e / b / 2.506_628_274_631
        }
    };
    if x > 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Standard normal quantile function (Wichura's AS 241, PPND16; relative accuracy ~1e-16).
///
/// Returns `-inf` at 0, `+inf` at 1 and `NaN` outside `[0, 1]`.
pub fn standard_normal_quantile(p: f64) -> f64 {
    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    let q = p - 0.5;
    if q.abs() <= 0.425 {
        let r = 0.180625 - q * q;
        let num = ((((((2.509_080_928_730_122_7e3 * r + 3.343_057_558_358_813e4) * r
            + 6.726_577_092_700_87e4)
            * r
            + 4.592_195_393_154_987e4)
            * r
            + 1.373_169_376_550_946e4)
            * r
            + 1.971_590_950_306_551_3e3)
            * r
            + 1.331_416_678_917_843_8e2)
            * r
            + 3.387_132_872_796_366_5;
        let den = ((((((5.226_495_278_852_545e3 * r + 2.872_908_573_572_194_3e4) * r
            + 3.930_789_580_009_271e4)
            * r
            + 2.121_379_430_158_659_7e4)
            * r
            + 5.394_196_021_424_751e3)
            * r
            + 6.871_870_074_920_579e2)
            * r
            + 4.231_333_070_160_091e1)
            * r
            + 1.0;
        return q * num / den;
    }

    let mut r = if q < 0.0 { p } else { 1.0 - p };
    r = (-r.ln()).sqrt();
    let value = if r <= 5.0 {
        r -= 1.6;
        let num = ((((((7.745_450_142_783_414e-4 * r + 2.272_384_498_926_918_4e-2) * r
            + 2.417_807_251_774_506e-1)
            * r
            + 1.270_458_252_452_368_4)
            * r
            + 3.647_848_324_763_204_5)
            * r
            + 5.769_497_221_460_691)
            * r
            + 4.630_337_846_156_545)
            * r
            + 1.423_437_110_749_683_5;
        let den = ((((((1.050_750_071_644_416_9e-9 * r + 5.475_938_084_995_345e-4) * r
            + 1.519_866_656_361_645_7e-2)
            * r
            + 1.481_039_764_274_800_8e-1)
            * r
            + 6.897_673_349_851e-1)
            * r
            + 1.676_384_830_183_803_8)
            * r
            + 2.053_191_626_637_759)
            * r
            + 1.0;
        num / den
    } else {
        r -= 5.0;
        let num = ((((((2.010_334_399_292_288_1e-7 * r + 2.711_555_568_743_487_6e-5) * r
            + 1.242_660_947_388_078_4e-3)
            * r
            + 2.653_218_952_657_612_4e-2)
            * r
            + 2.965_605_718_285_048_7e-1)
            * r
            + 1.784_826_539_917_291_3)
            * r
            + 5.463_784_911_164_114)
            * r
            + 6.657_904_643_501_103;
        let den = ((((((2.044_263_103_389_939_7e-15 * r + 1.421_511_758_316_446e-7) * r
            + 1.846_318_317_510_054_8e-5)
            * r
            + 7.868_691_311_456_133e-4)
            * r
            + 1.487_536_129_085_061_5e-2)
            * r
            + 1.369_298_809_227_358e-1)
            * r
            + 5.998_322_065_558_88e-1)
            * r
            + 1.0;
        num / den
    };
    if q < 0.0 {
        -value
    } else {
        value
    }
}

/// Quantile of `N(mean, sd)` at level `p`.
pub fn normal_quantile(p: f64, mean: f64, sd: f64) -> f64 {
    mean + sd * standard_normal_quantile(p)
}

/// A normal distribution restricted to `(-inf, upper]`, sampled by inverse CDF.
///
/// A zero `sd` collapses to a point mass at `min(mean, upper)`. When `upper` lies so far in
/// the left tail that its CDF underflows, draws collapse to `upper`.
#[derive(Debug, Clone, Copy)]
pub struct UpperTruncatedNormal {
    mean: f64,
    sd: f64,
    upper: f64,
    upper_cdf: f64,
}

impl UpperTruncatedNormal {
    /// `None` if any parameter is non-finite or `sd` is negative.
    pub fn new(mean: f64, sd: f64, upper: f64) -> Option<Self> {
        if !mean.is_finite() || !sd.is_finite() || !upper.is_finite() || sd < 0.0 {
            return None;
        }
        let upper_cdf = if sd > 0.0 {
            standard_normal_cdf((upper - mean) / sd)
        } else {
            0.0
        };
        Some(Self {
            mean,
            sd,
            upper,
            upper_cdf,
        })
    }
}

impl Distribution<f64> for UpperTruncatedNormal {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.sd == 0.0 {
            return self.mean.min(self.upper);
        }
        if self.upper_cdf <= 0.0 {
            return self.upper;
        }
        let u: f64 = rng.sample(Open01);
        let draw = self.mean + self.sd * standard_normal_quantile(u * self.upper_cdf);
        if draw.is_finite() {
            draw.min(self.upper)
        } else {
            self.upper
        }
    }
}

/// Generator for a top-level imputer call: seeded when `seed` is given, otherwise from OS
/// entropy.
pub fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}
