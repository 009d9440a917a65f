//! The layout engine: every byte offset in the file image, assigned in one
//! fixed-order walk over a frozen registry.
//!
//! Block order is header, TOC, instance domains, instances, metric
//! descriptors, values, strings. The walk runs in registration order and
//! records each entity's offsets in the entity itself; the block writers
//! replay the same walk and only read what was assigned here.

use crate::metric::MetricKind;
use crate::registry::Registry;
use crate::types::MetricType;

/// Header record length.
pub(crate) const HEADER_LENGTH: usize = 40;
/// TOC entry length.
pub(crate) const TOC_LENGTH: usize = 16;
/// Instance domain record length.
pub(crate) const INDOM_LENGTH: usize = 32;
/// Instance record length with an inline name (version 1).
pub(crate) const INSTANCE_LENGTH_V1: usize = 80;
/// Instance record length with a string-pool name pointer (version 2).
pub(crate) const INSTANCE_LENGTH_V2: usize = 24;
/// Metric descriptor length with an inline name (version 1).
pub(crate) const METRIC_LENGTH_V1: usize = 104;
/// Metric descriptor length with a string-pool name pointer (version 2).
pub(crate) const METRIC_LENGTH_V2: usize = 48;
/// Value slot length.
pub(crate) const VALUE_LENGTH: usize = 32;
/// String-pool cell length.
pub(crate) const STRING_LENGTH: usize = 256;

/// Longest name that still fits a version 1 inline name field (one byte is
/// reserved for the NUL terminator). Longer metric or instance names promote
/// the whole file to version 2, which stores all names in the string pool.
pub const MAX_V1_NAME_LENGTH: usize = 63;

/// The sized plan of a file image: format version, block starts and total
/// length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LayoutPlan {
    pub(crate) version: u32,
    pub(crate) toc_count: usize,
    pub(crate) indom_count: usize,
    pub(crate) instance_count: usize,
    pub(crate) metric_count: usize,
    pub(crate) value_count: usize,
    pub(crate) string_count: usize,
    pub(crate) indom_offset: usize,
    pub(crate) instance_offset: usize,
    pub(crate) metrics_offset: usize,
    pub(crate) values_offset: usize,
    pub(crate) strings_offset: usize,
    pub(crate) length: usize,
}

impl LayoutPlan {
    fn instance_length(&self) -> usize {
        if self.version == 2 {
            INSTANCE_LENGTH_V2
        } else {
            INSTANCE_LENGTH_V1
        }
    }

    fn metric_length(&self) -> usize {
        if self.version == 2 {
            METRIC_LENGTH_V2
        } else {
            METRIC_LENGTH_V1
        }
    }
}

/// Sizes the file image from the registry's aggregate counts.
///
/// Two TOC entries (metrics, values) always exist; instance domains and
/// instances contribute two more when any instance exists, and the string
/// pool one more when any cell exists.
pub(crate) fn size(registry: &Registry) -> LayoutPlan {
    let version = if registry.version2() { 2 } else { 1 };

    let indom_count = registry.indom_count();
    let instance_count = registry.instance_count();
    let metric_count = registry.metric_count();
    let value_count = registry.value_count();
    let string_count = registry.string_count();

    let mut toc_count = 2;
    if instance_count > 0 {
        toc_count += 2;
    }
    if string_count > 0 {
        toc_count += 1;
    }

    let mut plan = LayoutPlan {
        version,
        toc_count,
        indom_count,
        instance_count,
        metric_count,
        value_count,
        string_count,
        indom_offset: 0,
        instance_offset: 0,
        metrics_offset: 0,
        values_offset: 0,
        strings_offset: 0,
        length: 0,
    };

    plan.indom_offset = HEADER_LENGTH + TOC_LENGTH * toc_count;
    plan.instance_offset = plan.indom_offset + INDOM_LENGTH * indom_count;
    plan.metrics_offset = plan.instance_offset + plan.instance_length() * instance_count;
    plan.values_offset = plan.metrics_offset + plan.metric_length() * metric_count;
    plan.strings_offset = plan.values_offset + VALUE_LENGTH * value_count;
    plan.length = plan.strings_offset + STRING_LENGTH * string_count;

    plan
}

/// Sizes the file image and assigns every entity its offsets.
pub(crate) fn plan(registry: &Registry) -> LayoutPlan {
    let plan = size(registry);
    let v2 = plan.version == 2;

    let mut indom_cursor = plan.indom_offset;
    let mut instance_cursor = plan.instance_offset;
    let mut string_cursor = plan.strings_offset;

    let take_string_cell = |cursor: &mut usize| {
        let cell = *cursor;
        *cursor += STRING_LENGTH;
        cell
    };

    for indom in registry.indoms_snapshot() {
        let mut layout = indom.layout();

        layout.offset = indom_cursor;
        indom_cursor += INDOM_LENGTH;

        layout.instance_offset = instance_cursor;
        layout.instance_offsets.clear();
        layout.instance_name_cells.clear();

        for _ in indom.instances() {
            layout.instance_offsets.push(instance_cursor);
            instance_cursor += plan.instance_length();

            layout
                .instance_name_cells
                .push(if v2 { take_string_cell(&mut string_cursor) } else { 0 });
        }

        layout.short_text = if indom.short_description().is_empty() {
            0
        } else {
            take_string_cell(&mut string_cursor)
        };
        layout.long_text = if indom.long_description().is_empty() {
            0
        } else {
            take_string_cell(&mut string_cursor)
        };
    }

    let mut metric_cursor = plan.metrics_offset;
    let mut value_cursor = plan.values_offset;

    for metric in registry.metrics_snapshot() {
        let desc = metric.desc();
        let string_typed = desc.metric_type() == MetricType::String;

        {
            let mut layout = desc.layout();

            layout.desc_offset = metric_cursor;
            metric_cursor += plan.metric_length();

            layout.name_cell = if v2 { take_string_cell(&mut string_cursor) } else { 0 };
        }

        match &metric {
            MetricKind::Singleton(m) => {
                let mut state = m.state();

                state.value_offset = value_cursor;
                value_cursor += VALUE_LENGTH;

                state.string_cell = if string_typed {
                    take_string_cell(&mut string_cursor)
                } else {
                    0
                };
            }
            MetricKind::Instance(m) => {
                for slot in m.state().iter_mut() {
                    slot.value_offset = value_cursor;
                    value_cursor += VALUE_LENGTH;

                    slot.string_cell = if string_typed {
                        take_string_cell(&mut string_cursor)
                    } else {
                        0
                    };
                }
            }
        }

        {
            let mut layout = desc.layout();

            layout.short_text = if desc.short_description().is_empty() {
                0
            } else {
                take_string_cell(&mut string_cursor)
            };
            layout.long_text = if desc.long_description().is_empty() {
                0
            } else {
                take_string_cell(&mut string_cursor)
            };
        }
    }

    debug_assert_eq!(
        instance_cursor, plan.metrics_offset,
        "the instance walk must consume exactly the instance block",
    );
    debug_assert_eq!(
        value_cursor, plan.strings_offset,
        "the value walk must consume exactly the value block",
    );
    debug_assert_eq!(
        string_cursor, plan.length,
        "string-cell assignment must agree with the registry's accounting",
    );

    plan
}
