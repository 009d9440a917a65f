//! Metrics holding exactly one value.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::constants::ERR_POISONED_LOCK;
use crate::error::Result;
use crate::metric::{Metric, MetricDesc, MetricKind};
use crate::types::{MetricSemantics, MetricType, Value};
use crate::units::Unit;
use crate::update::ValueUpdater;

/// The mutable side of a singleton metric: the cached value, the slot
/// assignment and the live updater once a mapping is active.
#[derive(Debug)]
pub(crate) struct SingletonState {
    pub(crate) val: Value,
    /// Offset of the 32-byte value slot.
    pub(crate) value_offset: usize,
    /// String cell of a string-typed value, 0 otherwise.
    pub(crate) string_cell: usize,
    pub(crate) updater: Option<ValueUpdater>,
}

#[derive(Debug)]
struct SingletonInner {
    desc: MetricDesc,
    state: Mutex<SingletonState>,
}

/// A metric holding exactly one value.
///
/// The handle is cheap to clone; clones refer to the same metric, so the
/// application can keep one while the registry keeps another.
///
/// # Examples
///
/// ```
/// use mmv::{MetricSemantics, MetricType, CountUnit, SingletonMetric, Value};
///
/// let m = SingletonMetric::new(
///     10_i32,
///     "sheep.total",
///     MetricType::I32,
///     MetricSemantics::Instant,
///     CountUnit::One,
///     "Total sheep in the paddock",
///     "",
/// )?;
///
/// m.set(11_i32)?;
/// assert_eq!(m.val(), Value::I32(11));
/// # Ok::<(), mmv::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct SingletonMetric {
    inner: Arc<SingletonInner>,
}

impl SingletonMetric {
    /// Creates a singleton metric with an initial value.
    ///
    /// Descriptions may be empty to indicate absence. Fails if the name is
    /// empty or oversized, or if the initial value is not compatible with
    /// `metric_type`.
    pub fn new(
        initial: impl Into<Value>,
        name: &str,
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
        let val = metric_type.coerce(initial.into())?;

        Ok(Self {
            inner: Arc::new(SingletonInner {
                desc,
                state: Mutex::new(SingletonState {
                    val,
                    value_offset: 0,
                    string_cell: 0,
                    updater: None,
                }),
            }),
        })
    }

    /// The current value.
    #[must_use]
    pub fn val(&self) -> Value {
        self.state().val.clone()
    }

    /// Sets the value, writing it through to the mapped file when a mapping
    /// is active.
    ///
    /// The value is checked against the declared type; an incompatible value
    /// leaves the metric untouched. Setting the current value again is a
    /// no-op that does not rewrite any bytes.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        self.modify(|_| Ok(value))?;
        Ok(())
    }

    /// Locked read-modify-write: `f` maps the current value to the new one
    /// (or refuses). Used by the wrappers whose contracts depend on the
    /// current value, such as counter monotonicity.
    pub(crate) fn modify<V: Into<Value>>(
        &self,
        f: impl FnOnce(&Value) -> Result<V>,
    ) -> Result<Value> {
        let mut state = self.state();

        let new = self
            .inner
            .desc
            .metric_type()
            .coerce(f(&state.val)?.into())?;

        if new != state.val {
            if let Some(updater) = &state.updater {
                updater.write(&new);
            }
            state.val = new.clone();
        }

        Ok(new)
    }

    pub(crate) fn desc(&self) -> &MetricDesc {
        &self.inner.desc
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, SingletonState> {
        self.inner.state.lock().expect(ERR_POISONED_LOCK)
    }

    pub(crate) fn detach_updater(&self) {
        self.state().updater = None;
    }
}

impl Metric for SingletonMetric {
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
        MetricKind::Singleton(self.clone())
    }
}
