//! HDR-histogram metrics exposing running summary statistics.

use std::sync::{Arc, Mutex};

use crate::constants::ERR_POISONED_LOCK;
use crate::error::{Error, Result};
use crate::instance::InstanceDomain;
use crate::instance_metric::InstanceMetric;
use crate::metric::{Metric, MetricKind};
use crate::types::{Instances, MetricSemantics, MetricType};
use crate::units::Unit;

/// The summary instances every histogram exposes, in file order.
const SUMMARY_INSTANCES: [&str; 5] = ["mean", "variance", "standard_deviation", "max", "min"];

/// Significant decimal digits tracked by the underlying histogram.
const SIGNIFICANT_FIGURES: u8 = 5;

struct HistogramInner {
    m: InstanceMetric,
    hist: Mutex<hdrhistogram::Histogram<u64>>,
    low: u64,
    high: u64,
}

/// An HDR histogram published as five summary values: `mean`, `variance`,
/// `standard_deviation`, `max` and `min`, each an instance of a generated
/// private domain named `<name>.indom`.
///
/// Values outside the configured `low..=high` range are rejected without
/// touching the recorded data.
///
/// # Examples
///
/// ```
/// use mmv::{Histogram, TimeUnit};
///
/// let latency = Histogram::new("req.latency", 1, 10_000, TimeUnit::Microsecond)?;
/// latency.record(350)?;
/// latency.record_n(1200, 3)?;
///
/// assert_eq!(latency.max(), 1200);
/// assert!(latency.mean() > 0.0);
/// # Ok::<(), mmv::Error>(())
/// ```
#[derive(Clone)]
pub struct Histogram {
    inner: Arc<HistogramInner>,
}

impl std::fmt::Debug for Histogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Histogram")
            .field("metric", &self.inner.m)
            .field("low", &self.inner.low)
            .field("high", &self.inner.high)
            .finish_non_exhaustive()
    }
}

impl Histogram {
    /// Creates a histogram recording values in `low..=high`.
    pub fn new(name: &str, low: u64, high: u64, unit: impl Into<Unit>) -> Result<Self> {
        Self::with_description(name, low, high, unit, "", "")
    }

    /// Creates a histogram with description strings (empty means absent).
    pub fn with_description(
        name: &str,
        low: u64,
        high: u64,
        unit: impl Into<Unit>,
        short_description: &str,
        long_description: &str,
    ) -> Result<Self> {
        if low > high {
            return Err(Error::HistogramBounds { low, high });
        }

        // The histogram's lowest discernible value must be at least 1; a low
        // bound of 0 still admits recording 0 through the range check below.
        let hist =
            hdrhistogram::Histogram::new_with_bounds(low.max(1), high.max(2), SIGNIFICANT_FIGURES)
                .map_err(|_| Error::HistogramBounds { low, high })?;

        let indom = InstanceDomain::with_visibility(
            &format!("{name}.indom"),
            &SUMMARY_INSTANCES,
            "",
            "",
            true,
        )?;

        let initial: Instances = SUMMARY_INSTANCES
            .iter()
            .map(|instance| (*instance, 0.0_f64))
            .collect();

        Ok(Self {
            inner: Arc::new(HistogramInner {
                m: InstanceMetric::new(
                    initial,
                    name,
                    &indom,
                    MetricType::F64,
                    MetricSemantics::Instant,
                    unit,
                    short_description,
                    long_description,
                )?,
                hist: Mutex::new(hist),
                low,
                high,
            }),
        })
    }

    /// Records one observation of `value`.
    pub fn record(&self, value: u64) -> Result<()> {
        self.record_n(value, 1)
    }

    /// Records `count` observations of `value`.
    pub fn record_n(&self, value: u64, count: u64) -> Result<()> {
        if value < self.inner.low || value > self.inner.high {
            return Err(Error::OutOfRange {
                value,
                low: self.inner.low,
                high: self.inner.high,
            });
        }

        {
            let mut hist = self.inner.hist.lock().expect(ERR_POISONED_LOCK);
            hist.record_n(value, count).map_err(|_| Error::OutOfRange {
                value,
                low: self.inner.low,
                high: self.inner.high,
            })?;
        }

        self.write_summaries()
    }

    /// Mean of the recorded values.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.inner.hist.lock().expect(ERR_POISONED_LOCK).mean()
    }

    /// Variance of the recorded values.
    #[must_use]
    pub fn variance(&self) -> f64 {
        let stdev = self.standard_deviation();
        stdev * stdev
    }

    /// Standard deviation of the recorded values.
    #[must_use]
    pub fn standard_deviation(&self) -> f64 {
        self.inner.hist.lock().expect(ERR_POISONED_LOCK).stdev()
    }

    /// Highest recorded value.
    #[must_use]
    pub fn max(&self) -> u64 {
        self.inner.hist.lock().expect(ERR_POISONED_LOCK).max()
    }

    /// Lowest recorded value.
    #[must_use]
    pub fn min(&self) -> u64 {
        self.inner.hist.lock().expect(ERR_POISONED_LOCK).min()
    }

    fn write_summaries(&self) -> Result<()> {
        let (mean, stdev, max, min) = {
            let hist = self.inner.hist.lock().expect(ERR_POISONED_LOCK);
            (hist.mean(), hist.stdev(), hist.max(), hist.min())
        };

        self.inner.m.set_instance(mean, "mean")?;
        self.inner.m.set_instance(stdev * stdev, "variance")?;
        self.inner.m.set_instance(stdev, "standard_deviation")?;
        self.inner.m.set_instance(max as f64, "max")?;
        self.inner.m.set_instance(min as f64, "min")?;

        Ok(())
    }
}

impl Metric for Histogram {
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
