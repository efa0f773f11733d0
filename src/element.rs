// src/element.rs

use std::fmt::Debug;

/// A numeric cell type that the slice-statistic imputers can operate on.
///
/// Statistics are evaluated in `f64` and stored back through [`Element::from_statistic`],
/// which refuses values the type cannot hold exactly (a fractional mean in an integer
/// matrix, a negative value in an unsigned one, anything outside the type's range).
pub trait Element: Copy + PartialOrd + Debug + Send + Sync + 'static {
    /// Name used in error messages.
    const TYPE_NAME: &'static str;

    fn zero() -> Self;

    fn to_f64(self) -> f64;

    /// Converts a statistic back into this type, or `None` if it is not representable.
    fn from_statistic(value: f64) -> Option<Self>;

    /// Half of the value: floor division for integers, true division for floats.
    fn halve(self) -> Self;
}

macro_rules! impl_element_float {
    ($t:ty, $name:expr) => {
        impl Element for $t {
            const TYPE_NAME: &'static str = $name;

            fn zero() -> Self {
                0.0
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_statistic(value: f64) -> Option<Self> {
                let stored = value as $t;
                if value.is_finite() && !stored.is_finite() {
                    return None;
                }
                Some(stored)
            }

            fn halve(self) -> Self {
                self / 2.0
            }
        }
    };
}

macro_rules! impl_element_int {
    ($t:ty, $name:expr) => {
        impl Element for $t {
            const TYPE_NAME: &'static str = $name;

            fn zero() -> Self {
                0
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_statistic(value: f64) -> Option<Self> {
                if !value.is_finite() || value.fract() != 0.0 {
                    return None;
                }
                // MAX rounds up to a power of two in f64, so the upper bound is exclusive.
                let upper = (<$t>::MAX / 2 + 1) as f64 * 2.0;
                if value < <$t>::MIN as f64 || value >= upper {
                    return None;
                }
                Some(value as $t)
            }

            fn halve(self) -> Self {
                self.div_euclid(2)
            }
        }
    };
}

impl_element_float!(f64, "f64");
impl_element_float!(f32, "f32");
impl_element_int!(i32, "i32");
impl_element_int!(i64, "i64");
impl_element_int!(u32, "u32");
impl_element_int!(u64, "u64");
