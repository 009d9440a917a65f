//! The registry: every instance domain and metric a client will map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{LazyLock, RwLock};

use regex::Regex;
use tracing::debug;

use crate::constants::ERR_POISONED_LOCK;
use crate::error::{Error, Result};
use crate::instance::InstanceDomain;
use crate::instance_metric::InstanceMetric;
use crate::metric::{Metric, MetricKind};
use crate::singleton::SingletonMetric;
use crate::types::{InitialValue, MetricSemantics, MetricType};
use crate::units::Unit;

/// Aggregate counts are updated under the table locks but read lock-free
/// after the registry freezes, so plain relaxed atomics suffice.
const COUNT_ORDERING: Ordering = Ordering::Relaxed;

/// An insertion-ordered, name-keyed collection.
///
/// Insertion order is what makes the layout deterministic: the layout engine
/// and the block writers both walk registration order.
#[derive(Debug)]
struct NamedTable<T> {
    list: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for NamedTable<T> {
    fn default() -> Self {
        Self {
            list: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Clone> NamedTable<T> {
    fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<T> {
        self.index.get(name).map(|i| self.list[*i].clone())
    }

    fn insert(&mut self, name: String, item: T) {
        self.index.insert(name, self.list.len());
        self.list.push(item);
    }
}

/// A process-side collection of instance domains and metrics, frozen while a
/// mapping is active.
///
/// The registry also maintains the aggregate counts (metrics, values,
/// instances, string-pool cells) the layout engine sizes the file from, and
/// tracks whether any name forces the version 2 format.
#[derive(Debug, Default)]
pub struct Registry {
    indoms: RwLock<NamedTable<InstanceDomain>>,
    metrics: RwLock<NamedTable<MetricKind>>,
    indom_count: AtomicUsize,
    metric_count: AtomicUsize,
    instance_count: AtomicUsize,
    value_count: AtomicUsize,
    string_count: AtomicUsize,
    version2: AtomicBool,
    mapped: AtomicBool,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an instance domain.
    ///
    /// Fails if the registry is frozen or the name is taken.
    pub fn add_indom(&self, indom: &InstanceDomain) -> Result<()> {
        self.ensure_unfrozen()?;

        let mut indoms = self.indoms.write().expect(ERR_POISONED_LOCK);
        self.add_indom_locked(&mut indoms, indom)
    }

    fn add_indom_locked(
        &self,
        indoms: &mut NamedTable<InstanceDomain>,
        indom: &InstanceDomain,
    ) -> Result<()> {
        if indoms.contains(indom.name()) {
            return Err(Error::AlreadyRegistered {
                name: indom.name().to_string(),
            });
        }

        if indom.needs_v2() {
            self.promote_to_v2();
        }

        if self.version2() {
            // Every instance name lives in the string pool under version 2.
            self.string_count
                .fetch_add(indom.instance_count(), COUNT_ORDERING);
        }

        self.instance_count
            .fetch_add(indom.instance_count(), COUNT_ORDERING);
        self.string_count
            .fetch_add(indom.description_string_count(), COUNT_ORDERING);
        self.indom_count.fetch_add(1, COUNT_ORDERING);

        debug!(
            indom = indom.name(),
            instances = indom.instance_count(),
            "registered instance domain"
        );

        indoms.insert(indom.name().to_string(), indom.clone());
        Ok(())
    }

    /// Creates and registers an instance domain in one step.
    pub fn add_indom_by_name(&self, name: &str, instances: &[&str]) -> Result<InstanceDomain> {
        let indom = InstanceDomain::new(name, instances, "", "")?;
        self.add_indom(&indom)?;
        Ok(indom)
    }

    /// Registers a metric.
    ///
    /// Fails if the registry is frozen or the name is taken. An instance
    /// metric must reference a registered instance domain, except for the
    /// private domains generated by the vector and histogram constructors,
    /// which are registered implicitly here.
    pub fn add_metric(&self, metric: &impl Metric) -> Result<()> {
        self.ensure_unfrozen()?;
        let kind = metric.kind();

        // Lock order is indoms before metrics, everywhere.
        let mut indoms = self.indoms.write().expect(ERR_POISONED_LOCK);

        if let MetricKind::Instance(m) = &kind {
            let indom = m.indom();

            match indoms.get(indom.name()) {
                Some(existing) if existing.same_as(indom) => {}
                Some(_) => {
                    return Err(Error::AlreadyRegistered {
                        name: indom.name().to_string(),
                    });
                }
                None if indom.is_private() => self.add_indom_locked(&mut indoms, indom)?,
                None => {
                    return Err(Error::UnknownInstanceDomain {
                        indom: indom.name().to_string(),
                    });
                }
            }
        }

        let mut metrics = self.metrics.write().expect(ERR_POISONED_LOCK);

        if metrics.contains(kind.name()) {
            return Err(Error::AlreadyRegistered {
                name: kind.name().to_string(),
            });
        }

        if kind.desc().needs_v2() {
            self.promote_to_v2();
        }

        if self.version2() {
            // The metric name lives in the string pool under version 2.
            self.string_count.fetch_add(1, COUNT_ORDERING);
        }

        self.value_count.fetch_add(kind.value_count(), COUNT_ORDERING);
        self.string_count.fetch_add(
            kind.value_string_count() + kind.desc().description_string_count(),
            COUNT_ORDERING,
        );
        self.metric_count.fetch_add(1, COUNT_ORDERING);

        debug!(
            metric = kind.name(),
            values = kind.value_count(),
            "registered metric"
        );

        metrics.insert(kind.name().to_string(), kind);
        Ok(())
    }

    /// Parses `spec` and registers the metric it describes: a singleton for
    /// `a.b.c`, an instance metric for `a[i1, i2].b.c`. The instance domain
    /// named by the specification is created on first use and reused by name
    /// afterwards. Returns the registered metric.
    ///
    /// The shape of `initial` must match the specification: a scalar for the
    /// singleton form, per-instance values for the vector form.
    pub fn add_metric_by_string(
        &self,
        spec: &str,
        initial: impl Into<InitialValue>,
        semantics: MetricSemantics,
        metric_type: MetricType,
        unit: impl Into<Unit>,
    ) -> Result<MetricKind> {
        let parsed = parse_spec(spec)?;
        let unit = unit.into();

        if self.has_metric(&parsed.metric) {
            return Err(Error::AlreadyRegistered {
                name: parsed.metric,
            });
        }

        let kind = if parsed.instances.is_empty() {
            let InitialValue::Scalar(value) = initial.into() else {
                return Err(Error::InvalidSpec {
                    spec: spec.to_string(),
                    problem: "a singleton specification takes a scalar initial value".to_string(),
                });
            };

            let metric = SingletonMetric::new(
                value,
                &parsed.metric,
                metric_type,
                semantics,
                unit,
                "",
                "",
            )?;
            self.add_metric(&metric)?;
            MetricKind::Singleton(metric)
        } else {
            let InitialValue::PerInstance(values) = initial.into() else {
                return Err(Error::InvalidSpec {
                    spec: spec.to_string(),
                    problem: "a vector specification takes per-instance initial values"
                        .to_string(),
                });
            };

            let (indom, register_indom) = match self.indom_handle(&parsed.indom) {
                Some(existing) => (existing, false),
                None => {
                    let instances: Vec<&str> =
                        parsed.instances.iter().map(String::as_str).collect();
                    (InstanceDomain::new(&parsed.indom, &instances, "", "")?, true)
                }
            };

            let metric = InstanceMetric::new(
                values,
                &parsed.metric,
                &indom,
                metric_type,
                semantics,
                unit,
                "",
                "",
            )?;

            if register_indom {
                self.add_indom(&indom)?;
            }
            self.add_metric(&metric)?;
            MetricKind::Instance(metric)
        };

        Ok(kind)
    }

    /// Whether a metric with this name is registered.
    #[must_use]
    pub fn has_metric(&self, name: &str) -> bool {
        self.metrics
            .read()
            .expect(ERR_POISONED_LOCK)
            .contains(name)
    }

    /// Whether an instance domain with this name is registered.
    #[must_use]
    pub fn has_indom(&self, name: &str) -> bool {
        self.indoms
            .read()
            .expect(ERR_POISONED_LOCK)
            .contains(name)
    }

    /// Number of registered metrics.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metric_count.load(COUNT_ORDERING)
    }

    /// Number of registered instance domains.
    #[must_use]
    pub fn indom_count(&self) -> usize {
        self.indom_count.load(COUNT_ORDERING)
    }

    /// Number of instances across all registered domains.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instance_count.load(COUNT_ORDERING)
    }

    /// Number of value slots across all registered metrics.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.value_count.load(COUNT_ORDERING)
    }

    /// Number of string-pool cells the mapped file will carry.
    #[must_use]
    pub fn string_count(&self) -> usize {
        self.string_count.load(COUNT_ORDERING)
    }

    /// Whether a mapping is currently active, freezing the registry.
    #[must_use]
    pub fn mapped(&self) -> bool {
        self.mapped.load(Ordering::Acquire)
    }

    fn ensure_unfrozen(&self) -> Result<()> {
        if self.mapped() {
            return Err(Error::RegistryFrozen);
        }

        Ok(())
    }

    pub(crate) fn freeze(&self) {
        self.mapped.store(true, Ordering::Release);
    }

    pub(crate) fn unfreeze(&self) {
        self.mapped.store(false, Ordering::Release);
    }

    /// Whether any registered name forces the version 2 format.
    pub(crate) fn version2(&self) -> bool {
        self.version2.load(COUNT_ORDERING)
    }

    /// Switches the registry to version 2, retroactively accounting one
    /// string-pool cell for every already-registered metric and instance
    /// name.
    fn promote_to_v2(&self) {
        if !self.version2.swap(true, COUNT_ORDERING) {
            self.string_count.fetch_add(
                self.metric_count() + self.instance_count(),
                COUNT_ORDERING,
            );

            debug!("a long name promoted the registry to the version 2 format");
        }
    }

    pub(crate) fn indom_handle(&self, name: &str) -> Option<InstanceDomain> {
        self.indoms
            .read()
            .expect(ERR_POISONED_LOCK)
            .get(name)
    }

    /// Registered instance domains in registration order.
    pub(crate) fn indoms_snapshot(&self) -> Vec<InstanceDomain> {
        self.indoms
            .read()
            .expect(ERR_POISONED_LOCK)
            .list
            .clone()
    }

    /// Registered metrics in registration order.
    pub(crate) fn metrics_snapshot(&self) -> Vec<MetricKind> {
        self.metrics
            .read()
            .expect(ERR_POISONED_LOCK)
            .list
            .clone()
    }
}

/// The parts of a parsed metric specification string.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ParsedSpec {
    /// The full metric name, bracket group removed.
    pub(crate) metric: String,
    /// The instance domain name; empty when no bracket group was given.
    pub(crate) indom: String,
    /// The instance names; empty when no bracket group was given.
    pub(crate) instances: Vec<String>,
}

/// `prefix[i1, i2, ...].suffix` with identifiers made of Unicode letters,
/// digits and underscores. The prefix doubles as the instance domain name
/// and the first part of the metric name.
static SPEC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?<prefix>[\p{L}\p{N}_]+(?:\.[\p{L}\p{N}_]+)*)(?:\[(?<instances>[\p{L}\p{N}_]+(?:,\s*[\p{L}\p{N}_]+)*)\])?(?<suffix>(?:\.[\p{L}\p{N}_]+)*)$",
    )
    .expect("the specification grammar is a valid pattern")
});

pub(crate) fn parse_spec(spec: &str) -> Result<ParsedSpec> {
    let captures = SPEC_PATTERN
        .captures(spec)
        .ok_or_else(|| Error::InvalidSpec {
            spec: spec.to_string(),
            problem: "expected name[instance, ...].suffix".to_string(),
        })?;

    let prefix = &captures["prefix"];
    let suffix = &captures["suffix"];

    match captures.name("instances") {
        Some(instances) => Ok(ParsedSpec {
            metric: format!("{prefix}{suffix}"),
            indom: prefix.to_string(),
            instances: instances
                .as_str()
                .split(',')
                .map(|i| i.trim_start().to_string())
                .collect(),
        }),
        None => Ok(ParsedSpec {
            metric: format!("{prefix}{suffix}"),
            indom: String::new(),
            instances: Vec::new(),
        }),
    }
}
