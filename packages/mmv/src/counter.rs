//! Monotonically increasing counters.

use crate::error::{Error, Result};
use crate::instance::InstanceDomain;
use crate::instance_metric::InstanceMetric;
use crate::metric::{Metric, MetricKind};
use crate::singleton::SingletonMetric;
use crate::types::{Instances, MetricSemantics, MetricType, Value};
use crate::units::{CountUnit, Unit};

fn as_i64(value: &Value) -> i64 {
    match value {
        Value::I64(v) => *v,
        _ => unreachable!("counters store i64 values by construction"),
    }
}

/// A singleton counter: type `i64`, semantics `counter`, unit `one`.
///
/// Counters never move backwards: incrementing by a negative delta or
/// setting a smaller value fails and leaves the counter unchanged.
///
/// # Examples
///
/// ```
/// use mmv::Counter;
///
/// let requests = Counter::new(0, "http.requests")?;
/// requests.up();
/// requests.inc(9)?;
/// assert_eq!(requests.val(), 10);
///
/// assert!(requests.set(5).is_err());
/// # Ok::<(), mmv::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Counter {
    m: SingletonMetric,
}

impl Counter {
    /// Creates a counter starting at `initial`.
    pub fn new(initial: i64, name: &str) -> Result<Self> {
        Self::with_description(initial, name, "", "")
    }

    /// Creates a counter with description strings (empty means absent).
    pub fn with_description(
        initial: i64,
        name: &str,
        short_description: &str,
        long_description: &str,
    ) -> Result<Self> {
        Ok(Self {
            m: SingletonMetric::new(
                initial,
                name,
                MetricType::I64,
                MetricSemantics::Counter,
                CountUnit::One,
                short_description,
                long_description,
            )?,
        })
    }

    /// The current count.
    #[must_use]
    pub fn val(&self) -> i64 {
        as_i64(&self.m.val())
    }

    /// Sets the counter to `value`, failing if that would decrease it.
    pub fn set(&self, value: i64) -> Result<()> {
        self.m.modify(|current| {
            let current = as_i64(current);
            if value < current {
                return Err(Error::DecreasingCounter {
                    current,
                    requested: value,
                });
            }

            Ok(value)
        })?;

        Ok(())
    }

    /// Increments the counter by `delta`, failing if `delta` is negative.
    pub fn inc(&self, delta: i64) -> Result<()> {
        self.m.modify(|current| {
            let current = as_i64(current);
            if delta < 0 {
                return Err(Error::DecreasingCounter {
                    current,
                    requested: delta,
                });
            }

            Ok(current
                .checked_add(delta)
                .expect("incrementing overflowed i64 - this indicates an unrealistic scenario"))
        })?;

        Ok(())
    }

    /// Increments the counter by one.
    pub fn up(&self) {
        self.inc(1)
            .expect("incrementing by one can never decrease a counter");
    }
}

impl Metric for Counter {
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

/// One counter per instance, backed by a generated private instance domain
/// named `<name>.indom`.
///
/// # Examples
///
/// ```
/// use mmv::CounterVector;
///
/// let hits = CounterVector::new(&[("home", 0), ("search", 0)], "pages.hits")?;
/// hits.up("home")?;
/// hits.inc(3, "search")?;
/// assert_eq!(hits.val("search")?, 3);
/// # Ok::<(), mmv::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct CounterVector {
    m: InstanceMetric,
}

impl CounterVector {
    /// Creates a counter per `(instance, initial)` pair.
    pub fn new(initial: &[(&str, i64)], name: &str) -> Result<Self> {
        Self::with_description(initial, name, "", "")
    }

    /// Creates a counter vector with description strings (empty means
    /// absent).
    pub fn with_description(
        initial: &[(&str, i64)],
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
                MetricType::I64,
                MetricSemantics::Counter,
                CountUnit::One,
                short_description,
                long_description,
            )?,
        })
    }

    /// The current count of `instance`.
    pub fn val(&self, instance: &str) -> Result<i64> {
        Ok(as_i64(&self.m.val_instance(instance)?))
    }

    /// Sets the counter of `instance`, failing if that would decrease it.
    pub fn set(&self, value: i64, instance: &str) -> Result<()> {
        self.m.modify_instance(instance, |current| {
            let current = as_i64(current);
            if value < current {
                return Err(Error::DecreasingCounter {
                    current,
                    requested: value,
                });
            }

            Ok(value)
        })?;

        Ok(())
    }

    /// Increments the counter of `instance` by `delta`, failing if `delta`
    /// is negative.
    pub fn inc(&self, delta: i64, instance: &str) -> Result<()> {
        self.m.modify_instance(instance, |current| {
            let current = as_i64(current);
            if delta < 0 {
                return Err(Error::DecreasingCounter {
                    current,
                    requested: delta,
                });
            }

            Ok(current
                .checked_add(delta)
                .expect("incrementing overflowed i64 - this indicates an unrealistic scenario"))
        })?;

        Ok(())
    }

    /// Increments the counter of `instance` by one.
    pub fn up(&self, instance: &str) -> Result<()> {
        self.inc(1, instance)
    }

    /// Increments every instance's counter by `delta`.
    pub fn inc_all(&self, delta: i64) -> Result<()> {
        for instance in self.instance_names() {
            self.inc(delta, &instance)?;
        }

        Ok(())
    }

    /// Sets every instance's counter to `value`, failing if any would
    /// decrease.
    pub fn set_all(&self, value: i64) -> Result<()> {
        for instance in self.instance_names() {
            self.set(value, &instance)?;
        }

        Ok(())
    }

    fn instance_names(&self) -> Vec<String> {
        self.m
            .indom()
            .instances()
            .iter()
            .map(|i| i.name().to_string())
            .collect()
    }
}

impl Metric for CounterVector {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_counts_upwards() {
        let c = Counter::new(0, "c.1").unwrap();

        c.up();
        assert_eq!(c.val(), 1);

        c.inc(9).unwrap();
        assert_eq!(c.val(), 10);
    }

    #[test]
    fn counter_rejects_decreases() {
        let c = Counter::new(10, "c.1").unwrap();

        assert!(matches!(
            c.inc(-9),
            Err(Error::DecreasingCounter {
                current: 10,
                requested: -9,
            })
        ));
        assert_eq!(c.val(), 10);

        assert!(c.set(9).is_err());
        assert_eq!(c.val(), 10);

        c.set(99).unwrap();
        assert_eq!(c.val(), 99);
    }

    #[test]
    fn vector_tracks_each_instance() {
        let cv = CounterVector::new(&[("m1", 1), ("m2", 2)], "m.1").unwrap();

        cv.set(10, "m1").unwrap();
        assert_eq!(cv.val("m1").unwrap(), 10);

        cv.inc(10, "m2").unwrap();
        assert_eq!(cv.val("m2").unwrap(), 12);

        cv.up("m1").unwrap();
        assert_eq!(cv.val("m1").unwrap(), 11);
    }

    #[test]
    fn vector_generates_a_private_indom() {
        let cv = CounterVector::new(&[("a", 0)], "m.1").unwrap();

        let MetricKind::Instance(m) = cv.kind() else {
            panic!("a vector is an instance metric");
        };
        assert_eq!(m.indom().name(), "m.1.indom");
        assert!(m.indom().is_private());
    }

    #[test]
    fn vector_bulk_operations_cover_every_instance() {
        let cv = CounterVector::new(&[("a", 0), ("b", 5)], "m.1").unwrap();

        cv.inc_all(2).unwrap();
        assert_eq!(cv.val("a").unwrap(), 2);
        assert_eq!(cv.val("b").unwrap(), 7);
    }

    static_assertions::assert_impl_all!(Counter: Send, Sync);
    static_assertions::assert_impl_all!(CounterVector: Send, Sync);
}
