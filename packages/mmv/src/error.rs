use std::path::PathBuf;

use thiserror::Error;

use crate::types::{MetricType, Value};

/// Errors that can occur while registering, mapping or updating metrics.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller supplied a name that cannot be used for the entity in question.
    #[error("invalid name '{name}': {problem}")]
    InvalidName {
        /// The offending name.
        name: String,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// A metric specification string did not match the expected
    /// `name[instance, ...].suffix` grammar, or its shape did not match the
    /// supplied initial value.
    #[error("invalid metric specification '{spec}': {problem}")]
    InvalidSpec {
        /// The specification string as supplied by the caller.
        spec: String,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// A description string does not fit into a single string-pool cell.
    #[error("description is {length} bytes but the string pool stores at most 255")]
    DescriptionTooLong {
        /// Byte length of the rejected description.
        length: usize,
    },

    /// A value cannot be stored in a metric of the declared type.
    #[error("value {value} is not compatible with metric type {metric_type}")]
    IncompatibleValue {
        /// The type the metric was declared with.
        metric_type: MetricType,

        /// The rejected value.
        value: Value,
    },

    /// A counter was asked to move backwards.
    #[error("counter cannot decrease: current value {current}, requested {requested}")]
    DecreasingCounter {
        /// The counter's current value.
        current: i64,

        /// The value or delta that would have decreased it.
        requested: i64,
    },

    /// An entity with this name is already registered.
    #[error("'{name}' is already registered")]
    AlreadyRegistered {
        /// The colliding name.
        name: String,
    },

    /// The registry is frozen because a mapping is active; registration is
    /// only possible before [`Client::start`](crate::Client::start) or after
    /// [`Client::stop`](crate::Client::stop).
    #[error("the registry is frozen while a mapping is active")]
    RegistryFrozen,

    /// An instance metric references an instance domain that is not in the
    /// registry.
    #[error("instance domain '{indom}' is not registered")]
    UnknownInstanceDomain {
        /// Name of the missing instance domain.
        indom: String,
    },

    /// A per-instance operation named an instance the metric does not have.
    #[error("metric '{metric}' has no instance '{instance}'")]
    UnknownInstance {
        /// The metric that was addressed.
        metric: String,

        /// The instance name that was not found.
        instance: String,
    },

    /// The supplied initial values do not cover exactly the instances of the
    /// metric's instance domain.
    #[error("initial values do not match the instances of domain '{indom}'")]
    InstanceMismatch {
        /// Name of the instance domain the values were checked against.
        indom: String,
    },

    /// `start` was called while a mapping is already active.
    #[error("the mapping is already active")]
    AlreadyStarted,

    /// `stop` was called without an active mapping.
    #[error("no mapping is active")]
    NotStarted,

    /// `Timer::start` was called on a timer that is already running.
    #[error("the timer is already started")]
    TimerAlreadyStarted,

    /// `Timer::stop` was called on a timer that was never started.
    #[error("the timer was not started")]
    TimerNotStarted,

    /// The histogram bounds are unusable.
    #[error("histogram bounds {low}..={high} are not valid")]
    HistogramBounds {
        /// Lowest recordable value.
        low: u64,

        /// Highest recordable value.
        high: u64,
    },

    /// A recorded value lies outside the histogram's configured range.
    #[error("value {value} is outside the histogram range {low}..={high}")]
    OutOfRange {
        /// The rejected value.
        value: u64,

        /// Lowest recordable value.
        low: u64,

        /// Highest recordable value.
        high: u64,
    },

    /// The byte sink was positioned outside the mapped region.
    #[error("cursor position {position} is outside the {length}-byte region")]
    OutOfBounds {
        /// The requested cursor position.
        position: usize,

        /// Total length of the region.
        length: usize,
    },

    /// A write would run past the end of the mapped region.
    #[error("writing {requested} bytes at position {position} overflows the {length}-byte region")]
    WriteOverflow {
        /// Cursor position at the start of the write.
        position: usize,

        /// Number of bytes that were to be written.
        requested: usize,

        /// Total length of the region.
        length: usize,
    },

    /// An operation on the file backing the mapping failed.
    #[error("cannot {operation} '{path}'")]
    Backing {
        /// The file operation that failed (create, resize, map, ...).
        operation: &'static str,

        /// The file the operation was applied to.
        path: PathBuf,

        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A specialized `Result` type returning the crate's [`Error`] as the error
/// value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn messages_name_the_offender() {
        let error = Error::InvalidName {
            name: "foo/bar".to_string(),
            problem: "name cannot contain a path separator".to_string(),
        };

        assert!(error.to_string().contains("foo/bar"));

        let error = Error::UnknownInstance {
            metric: "sheep.legs".to_string(),
            instance: "limpy".to_string(),
        };

        assert!(error.to_string().contains("limpy"));
    }

    #[test]
    fn backing_error_preserves_source() {
        use std::error::Error as _;

        let error = Error::Backing {
            operation: "create",
            path: PathBuf::from("/nowhere/mmv/test"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };

        assert!(error.source().is_some());
    }
}
