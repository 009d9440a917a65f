//! Instances and instance domains.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::constants::ERR_POISONED_LOCK;
use crate::error::{Error, Result};
use crate::hash;
use crate::layout::MAX_V1_NAME_LENGTH;

/// Bit length of an instance domain identifier.
const INDOM_ID_BIT_LENGTH: u32 = 22;

/// One named member of an instance domain.
#[derive(Debug)]
pub(crate) struct Instance {
    name: String,
    id: u32,
}

impl Instance {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }
}

/// Byte positions assigned to an instance domain by the layout engine.
#[derive(Debug, Default)]
pub(crate) struct IndomLayout {
    /// Offset of the instance domain record.
    pub(crate) offset: usize,
    /// Offset of the first instance record.
    pub(crate) instance_offset: usize,
    /// Offset of each instance record, in instance order.
    pub(crate) instance_offsets: Vec<usize>,
    /// String cell of each instance name (version 2 files only).
    pub(crate) instance_name_cells: Vec<usize>,
    /// String cell of the short description, 0 when absent.
    pub(crate) short_text: usize,
    /// String cell of the long description, 0 when absent.
    pub(crate) long_text: usize,
}

#[derive(Debug)]
struct IndomInner {
    id: u32,
    name: String,
    instances: Vec<Instance>,
    index: HashMap<String, usize>,
    short_description: String,
    long_description: String,
    /// Generated internally for a vector metric rather than by the caller;
    /// such domains are registered implicitly together with their metric.
    private: bool,
    layout: Mutex<IndomLayout>,
}

/// A named set of instances over which instance metrics are indexed.
///
/// The identifier is derived from the name (22-bit truncated hash), so it is
/// stable across runs. Instances are fixed at construction; they live and die
/// with the domain.
///
/// The handle is cheap to clone; clones refer to the same domain.
///
/// # Examples
///
/// ```
/// use mmv::InstanceDomain;
///
/// let indom = InstanceDomain::new("acme.products", &["anvils", "rockets"], "", "")?;
/// assert_eq!(indom.instance_count(), 2);
/// assert!(indom.has_instance("anvils"));
/// # Ok::<(), mmv::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct InstanceDomain {
    inner: Arc<IndomInner>,
}

impl InstanceDomain {
    /// Creates an instance domain named `name` over `instances`.
    ///
    /// Descriptions may be empty to indicate absence. Fails if the name is
    /// empty, the instance list is empty or contains duplicates, or any
    /// string exceeds what one string-pool cell can hold.
    pub fn new(
        name: &str,
        instances: &[&str],
        short_description: &str,
        long_description: &str,
    ) -> Result<Self> {
        Self::with_visibility(name, instances, short_description, long_description, false)
    }

    /// `new` for the domains generated by vector metrics.
    pub(crate) fn with_visibility(
        name: &str,
        instances: &[&str],
        short_description: &str,
        long_description: &str,
        private: bool,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidName {
                name: name.to_string(),
                problem: "instance domain name cannot be empty".to_string(),
            });
        }

        if instances.is_empty() {
            return Err(Error::InvalidName {
                name: name.to_string(),
                problem: "an instance domain needs at least one instance".to_string(),
            });
        }

        crate::metric::validate_description(short_description)?;
        crate::metric::validate_description(long_description)?;

        let mut list = Vec::with_capacity(instances.len());
        let mut index = HashMap::with_capacity(instances.len());

        for instance in instances {
            if instance.is_empty() {
                return Err(Error::InvalidName {
                    name: (*instance).to_string(),
                    problem: "instance name cannot be empty".to_string(),
                });
            }

            if instance.len() >= crate::layout::STRING_LENGTH {
                return Err(Error::InvalidName {
                    name: (*instance).to_string(),
                    problem: "instance name does not fit a string-pool cell".to_string(),
                });
            }

            if index
                .insert((*instance).to_string(), list.len())
                .is_some()
            {
                return Err(Error::AlreadyRegistered {
                    name: (*instance).to_string(),
                });
            }

            list.push(Instance {
                name: (*instance).to_string(),
                id: hash(instance, 0),
            });
        }

        Ok(Self {
            inner: Arc::new(IndomInner {
                id: hash(name, INDOM_ID_BIT_LENGTH),
                name: name.to_string(),
                instances: list,
                index,
                short_description: short_description.to_string(),
                long_description: long_description.to_string(),
                private,
                layout: Mutex::new(IndomLayout::default()),
            }),
        })
    }

    /// The domain's 22-bit identifier, as written to the file.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// The domain's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of instances in the domain.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.inner.instances.len()
    }

    /// Whether the domain has an instance named `instance`.
    #[must_use]
    pub fn has_instance(&self, instance: &str) -> bool {
        self.inner.index.contains_key(instance)
    }

    pub(crate) fn instances(&self) -> &[Instance] {
        &self.inner.instances
    }

    pub(crate) fn instance_index(&self, instance: &str) -> Option<usize> {
        self.inner.index.get(instance).copied()
    }

    pub(crate) fn short_description(&self) -> &str {
        &self.inner.short_description
    }

    pub(crate) fn long_description(&self) -> &str {
        &self.inner.long_description
    }

    pub(crate) fn is_private(&self) -> bool {
        self.inner.private
    }

    /// Whether any instance name is too long for the version 1 inline name
    /// field, forcing the whole file to version 2.
    pub(crate) fn needs_v2(&self) -> bool {
        self.inner
            .instances
            .iter()
            .any(|i| i.name.len() > MAX_V1_NAME_LENGTH)
    }

    /// Number of non-empty description strings.
    pub(crate) fn description_string_count(&self) -> usize {
        usize::from(!self.inner.short_description.is_empty())
            + usize::from(!self.inner.long_description.is_empty())
    }

    pub(crate) fn layout(&self) -> MutexGuard<'_, IndomLayout> {
        self.inner.layout.lock().expect(ERR_POISONED_LOCK)
    }

    /// Whether two handles refer to the same domain.
    pub(crate) fn same_as(&self, other: &InstanceDomain) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_the_22_bit_name_hash() {
        let indom = InstanceDomain::new("prod", &["a"], "", "").unwrap();

        assert_eq!(indom.id(), hash("prod", 22));
        assert!(indom.id() < (1 << 22));
    }

    #[test]
    fn instances_keep_construction_order() {
        let indom = InstanceDomain::new("prod", &["c", "a", "b"], "", "").unwrap();

        let names: Vec<&str> = indom.instances().iter().map(Instance::name).collect();
        assert_eq!(names, ["c", "a", "b"]);
        assert_eq!(indom.instance_index("a"), Some(1));
    }

    #[test]
    fn duplicate_instances_are_rejected() {
        let err = InstanceDomain::new("prod", &["a", "a"], "", "").unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered { .. }));
    }

    #[test]
    fn empty_domains_are_rejected() {
        assert!(InstanceDomain::new("", &["a"], "", "").is_err());
        assert!(InstanceDomain::new("prod", &[], "", "").is_err());
    }

    #[test]
    fn long_instance_names_promote_to_v2() {
        let short = InstanceDomain::new("prod", &["a"], "", "").unwrap();
        assert!(!short.needs_v2());

        let long_name = "x".repeat(MAX_V1_NAME_LENGTH + 1);
        let long = InstanceDomain::new("prod", &[long_name.as_str()], "", "").unwrap();
        assert!(long.needs_v2());
    }

    #[test]
    fn clones_share_the_domain() {
        let indom = InstanceDomain::new("prod", &["a"], "", "").unwrap();
        let clone = indom.clone();

        assert!(indom.same_as(&clone));
        assert!(!indom.same_as(&InstanceDomain::new("prod", &["a"], "", "").unwrap()));
    }

    static_assertions::assert_impl_all!(InstanceDomain: Send, Sync);
}
