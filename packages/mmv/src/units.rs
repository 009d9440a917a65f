//! Units of measurement and their packed 32-bit PMAPI encoding.
//!
//! A [`Unit`] packs three 4-bit dimension exponents (space, time, count) and
//! three 4-bit scale selectors into one word:
//!
//! ```text
//! bits  0..=3   space dimension exponent
//! bits  4..=7   time dimension exponent
//! bits  8..=11  count dimension exponent
//! bits 12..=15  count scale
//! bits 16..=19  time scale
//! bits 20..=23  space scale
//! ```
//!
//! Base units set their dimension exponent to 1 and the matching scale to the
//! chosen step, so `KILOBYTE` is "space^1 at scale kilobyte". Units compose
//! multiplicatively: the product sums dimension exponents and adopts the
//! operand's scale for any dimension the left operand did not have.

use std::fmt;
use std::ops::Mul;
use std::time::Duration;

const DIM_SPACE_SHIFT: u32 = 0;
const DIM_TIME_SHIFT: u32 = 4;
const DIM_COUNT_SHIFT: u32 = 8;
const SCALE_COUNT_SHIFT: u32 = 12;
const SCALE_TIME_SHIFT: u32 = 16;
const SCALE_SPACE_SHIFT: u32 = 20;

fn nibble(encoded: u32, shift: u32) -> u32 {
    (encoded >> shift) & 0xF
}

/// A composed unit of measurement in its packed PMAPI form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Unit(u32);

impl Unit {
    /// The packed 32-bit PMAPI encoding written into metric descriptors.
    #[must_use]
    pub const fn pmapi(self) -> u32 {
        self.0
    }

    fn dimension(self, shift: u32) -> u32 {
        nibble(self.0, shift)
    }

    /// The product of two units: dimension exponents are summed, and for any
    /// dimension this unit did not carry, the other unit's scale is adopted.
    #[must_use]
    pub fn product(self, other: Unit) -> Unit {
        let mut encoded = 0_u32;

        for (dim_shift, scale_shift) in [
            (DIM_SPACE_SHIFT, SCALE_SPACE_SHIFT),
            (DIM_TIME_SHIFT, SCALE_TIME_SHIFT),
            (DIM_COUNT_SHIFT, SCALE_COUNT_SHIFT),
        ] {
            let dim = (self.dimension(dim_shift) + other.dimension(dim_shift)) & 0xF;
            let scale = if self.dimension(dim_shift) == 0 {
                nibble(other.0, scale_shift)
            } else {
                nibble(self.0, scale_shift)
            };

            encoded |= dim << dim_shift;
            encoded |= scale << scale_shift;
        }

        Unit(encoded)
    }
}

impl Mul for Unit {
    type Output = Unit;

    fn mul(self, rhs: Unit) -> Unit {
        self.product(rhs)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit({:#010x})", self.0)
    }
}

/// Units of storage space, byte through exabyte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpaceUnit {
    /// One byte.
    Byte,
    /// 2^10 bytes.
    Kilobyte,
    /// 2^20 bytes.
    Megabyte,
    /// 2^30 bytes.
    Gigabyte,
    /// 2^40 bytes.
    Terabyte,
    /// 2^50 bytes.
    Petabyte,
    /// 2^60 bytes.
    Exabyte,
}

impl SpaceUnit {
    fn scale(self) -> u32 {
        match self {
            Self::Byte => 0,
            Self::Kilobyte => 1,
            Self::Megabyte => 2,
            Self::Gigabyte => 3,
            Self::Terabyte => 4,
            Self::Petabyte => 5,
            Self::Exabyte => 6,
        }
    }

    /// This base unit as a composable [`Unit`].
    #[must_use]
    pub fn unit(self) -> Unit {
        Unit((1 << DIM_SPACE_SHIFT) | (self.scale() << SCALE_SPACE_SHIFT))
    }
}

impl From<SpaceUnit> for Unit {
    fn from(u: SpaceUnit) -> Unit {
        u.unit()
    }
}

/// Units of time, nanosecond through hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// 10^-9 seconds.
    Nanosecond,
    /// 10^-6 seconds.
    Microsecond,
    /// 10^-3 seconds.
    Millisecond,
    /// One second.
    Second,
    /// 60 seconds.
    Minute,
    /// 3600 seconds.
    Hour,
}

impl TimeUnit {
    fn scale(self) -> u32 {
        match self {
            Self::Nanosecond => 0,
            Self::Microsecond => 1,
            Self::Millisecond => 2,
            Self::Second => 3,
            Self::Minute => 4,
            Self::Hour => 5,
        }
    }

    /// This base unit as a composable [`Unit`].
    #[must_use]
    pub fn unit(self) -> Unit {
        Unit((1 << DIM_TIME_SHIFT) | (self.scale() << SCALE_TIME_SHIFT))
    }

    /// Expresses an elapsed duration as a (possibly fractional) count of this
    /// unit. Used by [`Timer`](crate::Timer) to accumulate elapsed time.
    #[must_use]
    pub fn count_of(self, elapsed: Duration) -> f64 {
        let nanos = elapsed.as_secs_f64() * 1e9;

        match self {
            Self::Nanosecond => nanos,
            Self::Microsecond => nanos / 1e3,
            Self::Millisecond => nanos / 1e6,
            Self::Second => nanos / 1e9,
            Self::Minute => nanos / 60e9,
            Self::Hour => nanos / 3600e9,
        }
    }
}

impl From<TimeUnit> for Unit {
    fn from(u: TimeUnit) -> Unit {
        u.unit()
    }
}

/// The dimensionless counting unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountUnit {
    /// A plain count of events or things.
    One,
}

impl CountUnit {
    /// This base unit as a composable [`Unit`].
    #[must_use]
    pub fn unit(self) -> Unit {
        Unit(1 << DIM_COUNT_SHIFT)
    }
}

impl From<CountUnit> for Unit {
    fn from(u: CountUnit) -> Unit {
        u.unit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_units_set_one_dimension() {
        assert_eq!(SpaceUnit::Byte.unit().pmapi(), 0x0000_0001);
        assert_eq!(SpaceUnit::Kilobyte.unit().pmapi(), 0x0010_0001);
        assert_eq!(SpaceUnit::Exabyte.unit().pmapi(), 0x0060_0001);

        assert_eq!(TimeUnit::Nanosecond.unit().pmapi(), 0x0000_0010);
        assert_eq!(TimeUnit::Second.unit().pmapi(), 0x0003_0010);
        assert_eq!(TimeUnit::Hour.unit().pmapi(), 0x0005_0010);

        assert_eq!(CountUnit::One.unit().pmapi(), 0x0000_0100);
    }

    #[test]
    fn product_sums_dimensions_and_keeps_scales() {
        let kb_per_something = SpaceUnit::Kilobyte.unit() * TimeUnit::Second.unit();

        assert_eq!(nibble(kb_per_something.pmapi(), DIM_SPACE_SHIFT), 1);
        assert_eq!(nibble(kb_per_something.pmapi(), DIM_TIME_SHIFT), 1);
        assert_eq!(nibble(kb_per_something.pmapi(), SCALE_SPACE_SHIFT), 1);
        assert_eq!(nibble(kb_per_something.pmapi(), SCALE_TIME_SHIFT), 3);

        // Squaring a dimension keeps the original scale.
        let bytes_squared = SpaceUnit::Megabyte.unit() * SpaceUnit::Byte.unit();
        assert_eq!(nibble(bytes_squared.pmapi(), DIM_SPACE_SHIFT), 2);
        assert_eq!(nibble(bytes_squared.pmapi(), SCALE_SPACE_SHIFT), 2);
    }

    #[test]
    fn time_unit_counts_durations() {
        let second = Duration::from_secs(1);

        assert_eq!(TimeUnit::Nanosecond.count_of(second), 1e9);
        assert_eq!(TimeUnit::Microsecond.count_of(second), 1e6);
        assert_eq!(TimeUnit::Millisecond.count_of(second), 1e3);
        assert_eq!(TimeUnit::Second.count_of(second), 1.0);

        let half_minute = Duration::from_secs(30);
        assert!((TimeUnit::Minute.count_of(half_minute) - 0.5).abs() < 1e-9);
    }
}
