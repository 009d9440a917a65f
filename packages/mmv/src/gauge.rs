//! Gauges: point-in-time values that move freely in both directions.

use crate::error::Result;
use crate::instance::InstanceDomain;
use crate::instance_metric::InstanceMetric;
use crate::metric::{Metric, MetricKind};
use crate::singleton::SingletonMetric;
use crate::types::{MetricSemantics, MetricType, Value};
use crate::units::{CountUnit, Unit};

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::F64(v) => *v,
        _ => unreachable!("gauges store f64 values by construction"),
    }
}

/// A singleton gauge: type `f64`, semantics `instant`, unit `one`.
///
/// # Examples
///
/// ```
/// use mmv::Gauge;
///
/// let depth = Gauge::new(0.0, "queue.depth")?;
/// depth.inc(10.0)?;
/// depth.dec(9.0)?;
/// assert_eq!(depth.val(), 1.0);
/// # Ok::<(), mmv::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Gauge {
    m: SingletonMetric,
}

impl Gauge {
    /// Creates a gauge starting at `initial`.
    pub fn new(initial: f64, name: &str) -> Result<Self> {
        Self::with_description(initial, name, "", "")
    }

    /// Creates a gauge with description strings (empty means absent).
    pub fn with_description(
        initial: f64,
        name: &str,
        short_description: &str,
        long_description: &str,
    ) -> Result<Self> {
        Ok(Self {
            m: SingletonMetric::new(
                initial,
                name,
                MetricType::F64,
                MetricSemantics::Instant,
                CountUnit::One,
                short_description,
                long_description,
            )?,
        })
    }

    /// The current value.
    #[must_use]
    pub fn val(&self) -> f64 {
        as_f64(&self.m.val())
    }

    /// Sets the gauge to `value`.
    pub fn set(&self, value: f64) -> Result<()> {
        self.m.set(value)
    }

    /// Moves the gauge up by `delta`.
    pub fn inc(&self, delta: f64) -> Result<()> {
        self.m.modify(|current| Ok(as_f64(current) + delta))?;
        Ok(())
    }

    /// Moves the gauge down by `delta`.
    pub fn dec(&self, delta: f64) -> Result<()> {
        self.inc(-delta)
    }
}

impl Metric for Gauge {
    fn name(&self) -> &str {
        self.m.name()
    }

    fn metric_type(&self) -> MetricType {
        self.m.metric_type()
    }

    fn semantics(&self) -> MetricSemantics {
        self.m.semantics()
    }

    fn unit(&self) -> Unit {
        self.m.unit()
    }

    fn kind(&self) -> MetricKind {
        self.m.kind()
    }
}

/// One gauge per instance, backed by a generated private instance domain
/// named `<name>.indom`.
#[derive(Debug, Clone)]
pub struct GaugeVector {
    m: InstanceMetric,
}

impl GaugeVector {
    /// Creates a gauge per `(instance, initial)` pair.
    pub fn new(initial: &[(&str, f64)], name: &str) -> Result<Self> {
        Self::with_description(initial, name, "", "")
    }

    /// Creates a gauge vector with description strings (empty means absent).
    pub fn with_description(
        initial: &[(&str, f64)],
        name: &str,
        short_description: &str,
        long_description: &str,
    ) -> Result<Self> {
        let instances: Vec<&str> = initial.iter().map(|(name, _)| *name).collect();
        let indom = InstanceDomain::with_visibility(
            &format!("{name}.indom"),
            &instances,
            "",
            "",
            true,
        )?;

        Ok(Self {
            m: InstanceMetric::new(
                initial.iter().map(|(name, v)| (*name, *v)).collect(),
                name,
                &indom,
                MetricType::F64,
                MetricSemantics::Instant,
                CountUnit::One,
                short_description,
                long_description,
            )?,
        })
    }

    /// The current value of `instance`.
    pub fn val(&self, instance: &str) -> Result<f64> {
        Ok(as_f64(&self.m.val_instance(instance)?))
    }

    /// Sets the gauge of `instance` to `value`.
    pub fn set(&self, value: f64, instance: &str) -> Result<()> {
        self.m.set_instance(value, instance)
    }

    /// Moves the gauge of `instance` up by `delta`.
    pub fn inc(&self, delta: f64, instance: &str) -> Result<()> {
        self.m
            .modify_instance(instance, |current| Ok(as_f64(current) + delta))?;
        Ok(())
    }

    /// Moves the gauge of `instance` down by `delta`.
    pub fn dec(&self, delta: f64, instance: &str) -> Result<()> {
        self.inc(-delta, instance)
    }
}

impl Metric for GaugeVector {
    fn name(&self) -> &str {
        self.m.name()
    }

    fn metric_type(&self) -> MetricType {
        self.m.metric_type()
    }

    fn semantics(&self) -> MetricSemantics {
        self.m.semantics()
    }

    fn unit(&self) -> Unit {
        self.m.unit()
    }

    fn kind(&self) -> MetricKind {
        self.m.kind()
    }
}
