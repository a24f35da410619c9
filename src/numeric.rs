//! Numeric element contract for the aggregation terminals.

use num_traits::{ToPrimitive, Zero};

use crate::error::{Error, Result};

/// Element types the numeric aggregators (`sum`, `average`, `median`, `min`,
/// `max`, `percentage`) operate on.
///
/// Implemented for the integer widths up to `i128` (the widest lossless
/// integer the platform offers) and both float widths. Accumulation is
/// guard-aware: with guarding enabled the addition raises
/// [`Error::NumericOverflow`] / [`Error::NumericUnderflow`] *before* leaving
/// the representable range; without it, integers wrap and floats saturate
/// the way the platform arithmetic does.
pub trait Numeric: Copy + PartialOrd + Send + Sync + 'static {
    /// The additive identity; also the documented seed of `min`/`max`.
    fn zero() -> Self;

    /// Add `rhs` to the running total, honoring the guard flag.
    fn accumulate(self, rhs: Self, guard: bool) -> Result<Self>;

    /// Widen to `f64` for `average`, `median`, and `percentage`.
    fn as_f64(self) -> f64;
}

macro_rules! impl_numeric_for_int {
    ($($ty:ty),* $(,)?) => {$(
        impl Numeric for $ty {
            #[inline]
            fn zero() -> Self {
                <$ty as Zero>::zero()
            }

            #[inline]
            fn accumulate(self, rhs: Self, guard: bool) -> Result<Self> {
                if guard {
                    self.checked_add(rhs).ok_or_else(|| {
                        if rhs < <$ty as Zero>::zero() {
                            Error::NumericUnderflow("sum accumulator")
                        } else {
                            Error::NumericOverflow("sum accumulator")
                        }
                    })
                } else {
                    Ok(self.wrapping_add(rhs))
                }
            }

            #[inline]
            fn as_f64(self) -> f64 {
                ToPrimitive::to_f64(&self).unwrap_or(f64::NAN)
            }
        }
    )*};
}

macro_rules! impl_numeric_for_float {
    ($($ty:ty),* $(,)?) => {$(
        impl Numeric for $ty {
            #[inline]
            fn zero() -> Self {
                <$ty as Zero>::zero()
            }

            #[inline]
            fn accumulate(self, rhs: Self, guard: bool) -> Result<Self> {
                if guard {
                    // Sign-aware magnitude check before the addition, so a
                    // guarded total never reaches the infinities.
                    if rhs > 0.0 && self > <$ty>::MAX - rhs {
                        return Err(Error::NumericOverflow("sum accumulator"));
                    }
                    if rhs < 0.0 && self < <$ty>::MIN - rhs {
                        return Err(Error::NumericUnderflow("sum accumulator"));
                    }
                }
                Ok(self + rhs)
            }

            #[inline]
            fn as_f64(self) -> f64 {
                ToPrimitive::to_f64(&self).unwrap_or(f64::NAN)
            }
        }
    )*};
}

impl_numeric_for_int!(i32, i64, i128, u32, u64);
impl_numeric_for_float!(f32, f64);
