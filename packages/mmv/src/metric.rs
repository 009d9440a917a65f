//! Common metric machinery: descriptors, the `Metric` trait and the tagged
//! kind the registry and writer dispatch on.

use std::sync::{Mutex, MutexGuard};

use crate::constants::ERR_POISONED_LOCK;
use crate::error::{Error, Result};
use crate::hash;
use crate::instance_metric::InstanceMetric;
use crate::layout::STRING_LENGTH;
use crate::singleton::SingletonMetric;
use crate::types::{MetricSemantics, MetricType};
use crate::units::Unit;

/// Bit length of a metric item identifier.
const METRIC_ID_BIT_LENGTH: u32 = 10;

pub(crate) fn validate_description(description: &str) -> Result<()> {
    if description.len() >= STRING_LENGTH {
        return Err(Error::DescriptionTooLong {
            length: description.len(),
        });
    }

    Ok(())
}

/// Byte positions assigned to a metric descriptor by the layout engine.
#[derive(Debug, Default)]
pub(crate) struct DescLayout {
    /// Offset of the descriptor record.
    pub(crate) desc_offset: usize,
    /// String cell of the metric name (version 2 files only).
    pub(crate) name_cell: usize,
    /// String cell of the short description, 0 when absent.
    pub(crate) short_text: usize,
    /// String cell of the long description, 0 when absent.
    pub(crate) long_text: usize,
}

/// The immutable identity of a metric: name, 10-bit item identifier, type,
/// semantics, unit and descriptions.
#[derive(Debug)]
pub(crate) struct MetricDesc {
    name: String,
    id: u32,
    metric_type: MetricType,
    semantics: MetricSemantics,
    unit: Unit,
    short_description: String,
    long_description: String,
    layout: Mutex<DescLayout>,
}

impl MetricDesc {
    pub(crate) fn new(
        name: &str,
        metric_type: MetricType,
        semantics: MetricSemantics,
        unit: Unit,
        short_description: &str,
        long_description: &str,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidName {
                name: name.to_string(),
                problem: "metric name cannot be empty".to_string(),
            });
        }

        if name.len() >= STRING_LENGTH {
            return Err(Error::InvalidName {
                name: name.to_string(),
                problem: "metric name does not fit a string-pool cell".to_string(),
            });
        }

        validate_description(short_description)?;
        validate_description(long_description)?;

        Ok(Self {
            name: name.to_string(),
            id: hash(name, METRIC_ID_BIT_LENGTH),
            metric_type,
            semantics,
            unit,
            short_description: short_description.to_string(),
            long_description: long_description.to_string(),
            layout: Mutex::new(DescLayout::default()),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    pub(crate) fn semantics(&self) -> MetricSemantics {
        self.semantics
    }

    pub(crate) fn unit(&self) -> Unit {
        self.unit
    }

    pub(crate) fn short_description(&self) -> &str {
        &self.short_description
    }

    pub(crate) fn long_description(&self) -> &str {
        &self.long_description
    }

    /// Number of non-empty description strings.
    pub(crate) fn description_string_count(&self) -> usize {
        usize::from(!self.short_description.is_empty())
            + usize::from(!self.long_description.is_empty())
    }

    /// Whether the name is too long for the version 1 inline name field.
    pub(crate) fn needs_v2(&self) -> bool {
        self.name.len() > crate::layout::MAX_V1_NAME_LENGTH
    }

    pub(crate) fn layout(&self) -> MutexGuard<'_, DescLayout> {
        self.layout.lock().expect(ERR_POISONED_LOCK)
    }
}

/// Anything the registry accepts as a metric: the two core kinds and every
/// wrapper built on them.
pub trait Metric {
    /// The metric's full name.
    fn name(&self) -> &str;

    /// The declared storage type.
    fn metric_type(&self) -> MetricType;

    /// The declared semantics.
    fn semantics(&self) -> MetricSemantics;

    /// The declared unit.
    fn unit(&self) -> Unit;

    /// The underlying singleton or instance metric, as stored by the
    /// registry and dispatched on by the writer.
    fn kind(&self) -> MetricKind;
}

/// A registered metric: either one value, or one value per instance of an
/// instance domain.
#[derive(Debug, Clone)]
pub enum MetricKind {
    /// A metric holding exactly one value.
    Singleton(SingletonMetric),
    /// A metric holding one value per instance.
    Instance(InstanceMetric),
}

impl MetricKind {
    /// The metric's full name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.desc().name()
    }

    pub(crate) fn desc(&self) -> &MetricDesc {
        match self {
            Self::Singleton(m) => m.desc(),
            Self::Instance(m) => m.desc(),
        }
    }

    /// Number of value slots this metric occupies.
    pub(crate) fn value_count(&self) -> usize {
        match self {
            Self::Singleton(_) => 1,
            Self::Instance(m) => m.indom().instance_count(),
        }
    }

    /// Number of string-pool cells needed for string-typed values.
    pub(crate) fn value_string_count(&self) -> usize {
        if self.desc().metric_type() == MetricType::String {
            self.value_count()
        } else {
            0
        }
    }

    /// Detaches the live updaters, reverting mutations to in-memory only.
    pub(crate) fn detach_updaters(&self) {
        match self {
            Self::Singleton(m) => m.detach_updater(),
            Self::Instance(m) => m.detach_updaters(),
        }
    }
}

impl Metric for MetricKind {
    fn name(&self) -> &str {
        self.desc().name()
    }

    fn metric_type(&self) -> MetricType {
        self.desc().metric_type()
    }

    fn semantics(&self) -> MetricSemantics {
        self.desc().semantics()
    }

    fn unit(&self) -> Unit {
        self.desc().unit()
    }

    fn kind(&self) -> MetricKind {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::CountUnit;

    #[test]
    fn descriptor_id_is_the_10_bit_name_hash() {
        let desc = MetricDesc::new(
            "test.metric",
            MetricType::I64,
            MetricSemantics::Counter,
            CountUnit::One.unit(),
            "",
            "",
        )
        .unwrap();

        assert_eq!(desc.id(), hash("test.metric", 10));
        assert!(desc.id() < (1 << 10));
    }

    #[test]
    fn empty_names_are_rejected() {
        let err = MetricDesc::new(
            "",
            MetricType::I64,
            MetricSemantics::Counter,
            CountUnit::One.unit(),
            "",
            "",
        )
        .unwrap_err();

        assert!(matches!(err, Error::InvalidName { .. }));
    }

    #[test]
    fn long_names_promote_but_do_not_fail() {
        let name = "n".repeat(100);
        let desc = MetricDesc::new(
            &name,
            MetricType::I64,
            MetricSemantics::Counter,
            CountUnit::One.unit(),
            "",
            "",
        )
        .unwrap();

        assert!(desc.needs_v2());

        let way_too_long = "n".repeat(STRING_LENGTH);
        assert!(MetricDesc::new(
            &way_too_long,
            MetricType::I64,
            MetricSemantics::Counter,
            CountUnit::One.unit(),
            "",
            "",
        )
        .is_err());
    }

    #[test]
    fn description_counting_ignores_empty_strings() {
        let desc = MetricDesc::new(
            "m",
            MetricType::I64,
            MetricSemantics::Counter,
            CountUnit::One.unit(),
            "short",
            "",
        )
        .unwrap();

        assert_eq!(desc.description_string_count(), 1);
    }
}
