//! Timers accumulating elapsed wall-clock time.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::constants::ERR_POISONED_LOCK;
use crate::error::{Error, Result};
use crate::metric::{Metric, MetricKind};
use crate::singleton::SingletonMetric;
use crate::types::{MetricSemantics, MetricType, Value};
use crate::units::{TimeUnit, Unit};

#[derive(Debug)]
struct TimerInner {
    m: SingletonMetric,
    unit: TimeUnit,
    started: Mutex<Option<Instant>>,
}

/// A stopwatch metric: a `f64` total of elapsed time in a chosen time unit.
///
/// `start` begins a measurement; `stop` adds the elapsed time to the running
/// total, writes it through and returns the new total. Starting a running
/// timer or stopping an idle one fails.
///
/// # Examples
///
/// ```
/// use mmv::{Timer, TimeUnit};
///
/// let t = Timer::new("db.query_time", TimeUnit::Microsecond)?;
/// t.start()?;
/// // ... the work being timed ...
/// let total = t.stop()?;
/// assert!(total >= 0.0);
/// # Ok::<(), mmv::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

impl Timer {
    /// Creates a timer reporting in `unit`, starting from a zero total.
    pub fn new(name: &str, unit: TimeUnit) -> Result<Self> {
        Self::with_description(name, unit, "", "")
    }

    /// Creates a timer with description strings (empty means absent).
    pub fn with_description(
        name: &str,
        unit: TimeUnit,
        short_description: &str,
        long_description: &str,
    ) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(TimerInner {
                m: SingletonMetric::new(
                    0.0_f64,
                    name,
                    MetricType::F64,
                    MetricSemantics::Instant,
                    unit,
                    short_description,
                    long_description,
                )?,
                unit,
                started: Mutex::new(None),
            }),
        })
    }

    /// Begins a measurement. Fails if the timer is already running.
    pub fn start(&self) -> Result<()> {
        let mut started = self.inner.started.lock().expect(ERR_POISONED_LOCK);

        if started.is_some() {
            return Err(Error::TimerAlreadyStarted);
        }

        *started = Some(Instant::now());
        Ok(())
    }

    /// Ends the measurement, adds the elapsed time to the total and returns
    /// the new total. Fails if the timer was not started.
    pub fn stop(&self) -> Result<f64> {
        let begun = {
            let mut started = self.inner.started.lock().expect(ERR_POISONED_LOCK);
            started.take().ok_or(Error::TimerNotStarted)?
        };

        let elapsed = self.inner.unit.count_of(begun.elapsed());

        let total = self.inner.m.modify(|current| match current {
            Value::F64(v) => Ok(v + elapsed),
            _ => unreachable!("timers store f64 values by construction"),
        })?;

        match total {
            Value::F64(v) => Ok(v),
            _ => unreachable!("timers store f64 values by construction"),
        }
    }

    /// The accumulated total so far, excluding any running measurement.
    #[must_use]
    pub fn elapsed(&self) -> f64 {
        match self.inner.m.val() {
            Value::F64(v) => v,
            _ => unreachable!("timers store f64 values by construction"),
        }
    }

    /// The unit totals are reported in.
    #[must_use]
    pub fn time_unit(&self) -> TimeUnit {
        self.inner.unit
    }
}

impl Metric for Timer {
    fn name(&self) -> &str {
        self.inner.m.name()
    }

    fn metric_type(&self) -> MetricType {
        self.inner.m.metric_type()
    }

    fn semantics(&self) -> MetricSemantics {
        self.inner.m.semantics()
    }

    fn unit(&self) -> Unit {
        self.inner.m.unit()
    }

    fn kind(&self) -> MetricKind {
        self.inner.m.kind()
    }
}
