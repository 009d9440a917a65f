//! The metric type system: declared types, semantics and runtime values.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// The storage type a metric is declared with.
///
/// The discriminants are the on-disk encoding used in metric descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MetricType {
    /// 32-bit signed integer.
    I32 = 0,
    /// 32-bit unsigned integer.
    U32 = 1,
    /// 64-bit signed integer.
    I64 = 2,
    /// 64-bit unsigned integer.
    U64 = 3,
    /// 32-bit IEEE-754 float.
    F32 = 4,
    /// 64-bit IEEE-754 float.
    F64 = 5,
    /// A string of at most 255 bytes, stored in the string pool.
    String = 6,
}

impl MetricType {
    pub(crate) fn on_disk(self) -> i32 {
        self as i32
    }

    /// Whether `value` can be stored in a metric of this type.
    ///
    /// Integers are compatible with any integer type whose range contains the
    /// value. An `f64` is compatible with `f32` when its magnitude fits, and
    /// an `f32` is always compatible with `f64`. Integers and floats never
    /// convert into each other, and strings are only compatible with
    /// [`MetricType::String`].
    #[must_use]
    pub fn is_compatible(self, value: &Value) -> bool {
        match value {
            Value::I32(v) => self.fits_integer(i128::from(*v)),
            Value::U32(v) => self.fits_integer(i128::from(*v)),
            Value::I64(v) => self.fits_integer(i128::from(*v)),
            Value::U64(v) => self.fits_integer(i128::from(*v)),
            Value::F32(_) => matches!(self, Self::F32 | Self::F64),
            Value::F64(v) => match self {
                Self::F64 => true,
                Self::F32 => v.abs() <= f64::from(f32::MAX),
                _ => false,
            },
            // String values must also fit one NUL-terminated pool cell.
            Value::String(s) => {
                self == Self::String && s.len() < crate::layout::STRING_LENGTH
            }
        }
    }

    fn fits_integer(self, v: i128) -> bool {
        match self {
            Self::I32 => i128::from(i32::MIN) <= v && v <= i128::from(i32::MAX),
            Self::U32 => 0 <= v && v <= i128::from(u32::MAX),
            Self::I64 => i128::from(i64::MIN) <= v && v <= i128::from(i64::MAX),
            Self::U64 => 0 <= v && v <= i128::from(u64::MAX),
            _ => false,
        }
    }

    /// Converts `value` into the exact storage representation for this type,
    /// or reports it as incompatible.
    pub(crate) fn coerce(self, value: Value) -> Result<Value> {
        if !self.is_compatible(&value) {
            return Err(Error::IncompatibleValue {
                metric_type: self,
                value,
            });
        }

        // The checks above guarantee that every narrowing below is lossless.
        let coerced = match (self, value) {
            (Self::I32, v) => Value::I32(v.as_integer() as i32),
            (Self::U32, v) => Value::U32(v.as_integer() as u32),
            (Self::I64, v) => Value::I64(v.as_integer() as i64),
            (Self::U64, v) => Value::U64(v.as_integer() as u64),
            (Self::F32, Value::F32(v)) => Value::F32(v),
            (Self::F32, Value::F64(v)) => Value::F32(v as f32),
            (Self::F64, Value::F32(v)) => Value::F64(f64::from(v)),
            (Self::F64, Value::F64(v)) => Value::F64(v),
            (Self::String, v @ Value::String(_)) => v,
            _ => unreachable!("compatibility check admits no other combination"),
        };

        Ok(coerced)
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::String => "string",
        };

        f.write_str(name)
    }
}

/// How the agent is expected to interpret a metric's values.
///
/// The discriminants are the on-disk encoding; the value 2 is unused by the
/// format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MetricSemantics {
    /// No particular interpretation.
    None = 0,
    /// A monotonically increasing value.
    Counter = 1,
    /// A point-in-time measurement.
    Instant = 3,
    /// A value that changes rarely, such as configuration.
    Discrete = 4,
}

impl MetricSemantics {
    pub(crate) fn on_disk(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for MetricSemantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Counter => "counter",
            Self::Instant => "instant",
            Self::Discrete => "discrete",
        };

        f.write_str(name)
    }
}

/// A runtime metric value.
///
/// Values convert from the native Rust types via `From`, so metric operations
/// can be called with plain literals:
///
/// ```
/// use mmv::Value;
///
/// let v: Value = 42_i64.into();
/// assert_eq!(v, Value::I64(42));
///
/// let s: Value = "kirk".into();
/// assert_eq!(s, Value::String("kirk".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 32-bit signed integer.
    I32(i32),
    /// 32-bit unsigned integer.
    U32(u32),
    /// 64-bit signed integer.
    I64(i64),
    /// 64-bit unsigned integer.
    U64(u64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// A string of at most 255 bytes.
    String(String),
}

impl Value {
    /// The integer payload, widened to `i128`.
    ///
    /// Only meaningful for the integer variants; callers must have
    /// established the variant beforehand.
    fn as_integer(&self) -> i128 {
        match self {
            Self::I32(v) => i128::from(*v),
            Self::U32(v) => i128::from(*v),
            Self::I64(v) => i128::from(*v),
            Self::U64(v) => i128::from(*v),
            _ => unreachable!("only integer variants reach integer coercion"),
        }
    }

    /// Encodes the fixed-width payload bytes of this value, little-endian.
    ///
    /// String values have no fixed-width payload; they live in the string
    /// pool and are encoded by the writer instead.
    pub(crate) fn encode_fixed(&self, buf: &mut [u8; 8]) -> usize {
        match self {
            Self::I32(v) => {
                buf[..4].copy_from_slice(&v.to_le_bytes());
                4
            }
            Self::U32(v) => {
                buf[..4].copy_from_slice(&v.to_le_bytes());
                4
            }
            Self::I64(v) => {
                buf.copy_from_slice(&v.to_le_bytes());
                8
            }
            Self::U64(v) => {
                buf.copy_from_slice(&v.to_le_bytes());
                8
            }
            Self::F32(v) => {
                buf[..4].copy_from_slice(&v.to_le_bytes());
                4
            }
            Self::F64(v) => {
                buf.copy_from_slice(&v.to_le_bytes());
                8
            }
            Self::String(_) => unreachable!("string values are not fixed-width"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "\"{v}\""),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Per-instance initial values for an instance metric, keyed by instance
/// name.
///
/// ```
/// use mmv::Instances;
///
/// let initial = Instances::new().with("a", 1.0).with("b", 2.0);
/// assert_eq!(initial.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Instances(HashMap<String, Value>);

impl Instances {
    /// Creates an empty value map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value for `instance`, replacing any previous one.
    #[must_use]
    pub fn with(mut self, instance: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(instance.into(), value.into());
        self
    }

    /// The value for `instance`, if present.
    #[must_use]
    pub fn get(&self, instance: &str) -> Option<&Value> {
        self.0.get(instance)
    }

    /// Number of instances covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no instances are covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The instance names covered, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Instances {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// The initial value accepted by
/// [`Registry::add_metric_by_string`](crate::Registry::add_metric_by_string):
/// a scalar for singleton specifications, a per-instance map for vector
/// specifications.
#[derive(Debug, Clone, PartialEq)]
pub enum InitialValue {
    /// One value for a singleton metric.
    Scalar(Value),
    /// One value per instance for an instance metric.
    PerInstance(Instances),
}

impl From<Value> for InitialValue {
    fn from(v: Value) -> Self {
        Self::Scalar(v)
    }
}

impl From<Instances> for InitialValue {
    fn from(v: Instances) -> Self {
        Self::PerInstance(v)
    }
}

macro_rules! scalar_initial_value {
    ($($t:ty),+) => {
        $(
            impl From<$t> for InitialValue {
                fn from(v: $t) -> Self {
                    Self::Scalar(v.into())
                }
            }
        )+
    };
}

scalar_initial_value!(i32, u32, i64, u64, f32, f64, &str, String);
