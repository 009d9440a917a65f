//! Metrics holding one value per instance of an instance domain.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::constants::ERR_POISONED_LOCK;
use crate::error::{Error, Result};
use crate::instance::InstanceDomain;
use crate::metric::{Metric, MetricDesc, MetricKind};
use crate::types::{Instances, MetricSemantics, MetricType, Value};
use crate::units::Unit;
use crate::update::ValueUpdater;

/// One instance's cached value, slot assignment and live updater.
///
/// Kept in the same order as the domain's instances so the writer can pair
/// each slot with its instance record by index.
#[derive(Debug)]
pub(crate) struct InstanceValue {
    pub(crate) val: Value,
    /// Offset of the 32-byte value slot.
    pub(crate) value_offset: usize,
    /// String cell of a string-typed value, 0 otherwise.
    pub(crate) string_cell: usize,
    pub(crate) updater: Option<ValueUpdater>,
}

#[derive(Debug)]
struct InstanceMetricInner {
    desc: MetricDesc,
    indom: InstanceDomain,
    state: Mutex<Vec<InstanceValue>>,
}

/// A metric holding one value for each instance of an instance domain.
///
/// The handle is cheap to clone; clones refer to the same metric.
///
/// # Examples
///
/// ```
/// use mmv::{InstanceDomain, InstanceMetric, Instances, Value};
/// use mmv::{MetricSemantics, MetricType, CountUnit};
///
/// let indom = InstanceDomain::new("prod", &["a", "b"], "", "")?;
/// let m = InstanceMetric::new(
///     Instances::new().with("a", 1.0).with("b", 2.0),
///     "prod.value",
///     &indom,
///     MetricType::F64,
///     MetricSemantics::Instant,
///     CountUnit::One,
///     "",
///     "",
/// )?;
///
/// m.set_instance(2.5, "b")?;
/// assert_eq!(m.val_instance("b")?, Value::F64(2.5));
/// # Ok::<(), mmv::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct InstanceMetric {
    inner: Arc<InstanceMetricInner>,
}

impl InstanceMetric {
    /// Creates an instance metric over `indom` with one initial value per
    /// instance.
    ///
    /// Fails if the keys of `initial` are not exactly the domain's
    /// instances, or any value is incompatible with `metric_type`.
    pub fn new(
        initial: Instances,
        name: &str,
        indom: &InstanceDomain,
        metric_type: MetricType,
        semantics: MetricSemantics,
        unit: impl Into<Unit>,
        short_description: &str,
        long_description: &str,
    ) -> Result<Self> {
        let desc = MetricDesc::new(
            name,
            metric_type,
            semantics,
            unit.into(),
            short_description,
            long_description,
        )?;

        if initial.len() != indom.instance_count() {
            return Err(Error::InstanceMismatch {
                indom: indom.name().to_string(),
            });
        }

        let mut vals = Vec::with_capacity(indom.instance_count());
        for instance in indom.instances() {
            let val = initial
                .get(instance.name())
                .ok_or_else(|| Error::InstanceMismatch {
                    indom: indom.name().to_string(),
                })?;

            vals.push(InstanceValue {
                val: metric_type.coerce(val.clone())?,
                value_offset: 0,
                string_cell: 0,
                updater: None,
            });
        }

        Ok(Self {
            inner: Arc::new(InstanceMetricInner {
                desc,
                indom: indom.clone(),
                state: Mutex::new(vals),
            }),
        })
    }

    /// The instance domain this metric is indexed over.
    #[must_use]
    pub fn indom(&self) -> &InstanceDomain {
        &self.inner.indom
    }

    /// The current value of `instance`.
    pub fn val_instance(&self, instance: &str) -> Result<Value> {
        let index = self.instance_index(instance)?;
        Ok(self.state()[index].val.clone())
    }

    /// Sets the value of `instance`, writing it through to the mapped file
    /// when a mapping is active.
    ///
    /// The value is checked against the declared type; an incompatible value
    /// leaves the metric untouched. Setting the current value again is a
    /// no-op that does not rewrite any bytes.
    pub fn set_instance(&self, value: impl Into<Value>, instance: &str) -> Result<()> {
        self.modify_instance(instance, |_| Ok(value))?;
        Ok(())
    }

    /// Locked read-modify-write of one instance's value; see
    /// [`SingletonMetric::modify`](crate::singleton::SingletonMetric).
    pub(crate) fn modify_instance<V: Into<Value>>(
        &self,
        instance: &str,
        f: impl FnOnce(&Value) -> Result<V>,
    ) -> Result<Value> {
        let index = self.instance_index(instance)?;
        let mut state = self.state();
        let slot = &mut state[index];

        let new = self
            .inner
            .desc
            .metric_type()
            .coerce(f(&slot.val)?.into())?;

        if new != slot.val {
            if let Some(updater) = &slot.updater {
                updater.write(&new);
            }
            slot.val = new.clone();
        }

        Ok(new)
    }

    fn instance_index(&self, instance: &str) -> Result<usize> {
        self.inner
            .indom
            .instance_index(instance)
            .ok_or_else(|| Error::UnknownInstance {
                metric: self.inner.desc.name().to_string(),
                instance: instance.to_string(),
            })
    }

    pub(crate) fn desc(&self) -> &MetricDesc {
        &self.inner.desc
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, Vec<InstanceValue>> {
        self.inner.state.lock().expect(ERR_POISONED_LOCK)
    }

    pub(crate) fn detach_updaters(&self) {
        for slot in self.state().iter_mut() {
            slot.updater = None;
        }
    }
}

impl Metric for InstanceMetric {
    fn name(&self) -> &str {
        self.inner.desc.name()
    }

    fn metric_type(&self) -> MetricType {
        self.inner.desc.metric_type()
    }

    fn semantics(&self) -> MetricSemantics {
        self.inner.desc.semantics()
    }

    fn unit(&self) -> Unit {
        self.inner.desc.unit()
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Instance(self.clone())
    }
}
