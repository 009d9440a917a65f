//! Instrument applications with counters, gauges, timers and histograms
//! exported through a memory-mapped values (MMV) file.
//!
//! A monitoring agent in another process reads the file; this crate is the
//! producer side. The application registers metrics with a [`Client`], and
//! [`Client::start`] writes a fixed-layout binary image of every metric into
//! a shared file. From then on, each mutation of a metric writes its bytes
//! straight into the mapped file with no system call and no locking against
//! the reader.
//!
//! The core pieces:
//!
//! - [`Client`] - owns the registry and the mapped file lifecycle
//! - [`Registry`] - instance domains and metrics, frozen while mapped
//! - [`Counter`], [`Gauge`], [`Timer`], [`Histogram`] - ready-made metrics
//! - [`CounterVector`], [`GaugeVector`] - their per-instance variants
//! - [`SingletonMetric`], [`InstanceMetric`] - the underlying general kinds
//!
//! # A singleton counter
//!
//! ```no_run
//! use mmv::{Client, Counter};
//!
//! let client = Client::new("example")?;
//!
//! let requests = Counter::new(0, "requests.total")?;
//! client.register(&requests)?;
//!
//! client.start()?;
//!
//! // Updates now land in the mapped file as they happen.
//! requests.up();
//! requests.inc(41)?;
//!
//! client.stop()?;
//! # Ok::<(), mmv::Error>(())
//! ```
//!
//! # Per-instance values
//!
//! Metrics can carry one value per member of an instance domain. The
//! conventional `name[instance, ...]` notation registers both at once:
//!
//! ```no_run
//! use mmv::{Client, Instances, MetricSemantics, MetricType, CountUnit};
//!
//! let client = Client::new("example")?;
//!
//! client.register_string(
//!     "sheep[limpy, baabaablack].bagsfull",
//!     Instances::new().with("limpy", 0_i32).with("baabaablack", 0_i32),
//!     MetricSemantics::Counter,
//!     MetricType::I32,
//!     CountUnit::One,
//! )?;
//!
//! client.start()?;
//! # Ok::<(), mmv::Error>(())
//! ```

mod bytewriter;
mod client;
mod config;
mod constants;
mod counter;
mod error;
mod gauge;
mod histogram;
mod instance;
mod instance_metric;
mod layout;
mod mapping;
mod metric;
mod registry;
mod singleton;
mod timer;
mod types;
mod units;
mod update;

pub use client::{Client, FileFlags};
pub use config::Config;
pub use counter::{Counter, CounterVector};
pub use error::{Error, Result};
pub use gauge::{Gauge, GaugeVector};
pub use histogram::Histogram;
pub use instance::InstanceDomain;
pub use instance_metric::InstanceMetric;
pub use layout::MAX_V1_NAME_LENGTH;
pub use metric::{Metric, MetricKind};
pub use registry::Registry;
pub use singleton::SingletonMetric;
pub use timer::Timer;
pub use types::{InitialValue, Instances, MetricSemantics, MetricType, Value};
pub use units::{CountUnit, SpaceUnit, TimeUnit, Unit};

/// A 32-bit FNV-1a hash of `s`, truncated to the low `bits` bits when `bits`
/// is non-zero.
///
/// Identifier derivation is part of the wire contract: metric items use 10
/// bits, instance domains 22, cluster identifiers 12 and instances the full
/// hash. The hash is stable across runs and platforms; colliding names are
/// not detected, the registry keys on the full name.
pub(crate) fn hash(s: &str, bits: u32) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 16_777_619;

    let mut h = OFFSET_BASIS;
    for byte in s.as_bytes() {
        h ^= u32::from(*byte);
        h = h.wrapping_mul(PRIME);
    }

    if bits == 0 {
        h
    } else {
        h & ((1 << bits) - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_fnv1a_reference_values() {
        // Published FNV-1a test vectors.
        assert_eq!(hash("", 0), 0x811c_9dc5);
        assert_eq!(hash("a", 0), 0xe40c_292c);
        assert_eq!(hash("foobar", 0), 0xbf9c_f968);
    }

    #[test]
    fn hash_is_stable_across_calls() {
        assert_eq!(hash("sheep.legs.available", 0), hash("sheep.legs.available", 0));
    }

    #[test]
    fn truncation_masks_the_low_bits() {
        let full = hash("sheep", 0);

        assert_eq!(hash("sheep", 10), full & 0x3FF);
        assert_eq!(hash("sheep", 12), full & 0xFFF);
        assert_eq!(hash("sheep", 22), full & 0x003F_FFFF);
    }
}
