//! The client: maps a registry into an MMV file and keeps it live.

use std::path::Path;
use std::sync::atomic::{fence, AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use bitflags::bitflags;
use tracing::{debug, trace};

use crate::bytewriter::ByteWriter;
use crate::config::{self, Config};
use crate::constants::ERR_POISONED_LOCK;
use crate::error::{Error, Result};
use crate::hash;
use crate::instance::InstanceDomain;
use crate::layout::{self, LayoutPlan, MAX_V1_NAME_LENGTH, STRING_LENGTH, TOC_LENGTH};
use crate::mapping::{MappedRegion, RegionSink};
use crate::metric::{Metric, MetricKind};
use crate::registry::Registry;
use crate::types::{InitialValue, MetricSemantics, MetricType, Value};
use crate::units::Unit;
use crate::update::ValueUpdater;

/// Bit length of the cluster identifier derived from the mapping name.
const CLUSTER_ID_BIT_LENGTH: u32 = 12;

/// Offset of the second generation number within the header.
const GENERATION2_OFFSET: usize = 16;

bitflags! {
    /// The header flag mask advertised to the reading agent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileFlags: u32 {
        /// Metric names are not prefixed with the file name.
        const NO_PREFIX = 0x1;
        /// The file belongs to a single process; the agent couples it to the
        /// process id in the header.
        const PROCESS = 0x2;
        /// A sentinel file with no live writer behind it.
        const SENTINEL = 0x4;
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    region: Option<Arc<MappedRegion>>,
}

/// Maps a registry of metrics into a shared file the monitoring agent reads.
///
/// The client owns the registry and the file location (derived from the
/// mapping name and the process configuration). [`start`](Self::start) fixes
/// the layout, writes the whole image and freezes the registry; the metric
/// handles then write every mutation straight into the mapped bytes until
/// [`stop`](Self::stop).
///
/// # Examples
///
/// ```no_run
/// use mmv::{Client, Counter};
///
/// let client = Client::new("example")?;
///
/// let requests = Counter::new(0, "requests.total")?;
/// client.register(&requests)?;
///
/// client.start()?;
/// requests.up();
/// client.stop()?;
/// # Ok::<(), mmv::Error>(())
/// ```
#[derive(Debug)]
pub struct Client {
    loc: std::path::PathBuf,
    cluster_id: u32,
    flags: FileFlags,
    registry: Registry,
    erase_on_stop: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

impl Client {
    /// Creates a client for a mapping named `name` with the
    /// [`PROCESS`](FileFlags::PROCESS) flag.
    pub fn new(name: &str) -> Result<Self> {
        Self::with_flags(name, FileFlags::PROCESS)
    }

    /// Creates a client with an explicit flag mask.
    pub fn with_flags(name: &str, flags: FileFlags) -> Result<Self> {
        Self::with_config(name, flags, config::global())
    }

    /// Creates a client resolving the file location against an explicit
    /// configuration instead of the process-wide one.
    pub fn with_config(name: &str, flags: FileFlags, config: &Config) -> Result<Self> {
        let loc = config.file_location(name)?;

        debug!(name, location = %loc.display(), "resolved mapping location");

        Ok(Self {
            loc,
            cluster_id: hash(name, CLUSTER_ID_BIT_LENGTH),
            flags,
            registry: Registry::new(),
            erase_on_stop: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    /// The client's registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The file the mapping is (or will be) written to.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.loc
    }

    /// The 12-bit cluster identifier derived from the mapping name.
    #[must_use]
    pub fn cluster_id(&self) -> u32 {
        self.cluster_id
    }

    /// The exact byte length of the file image the current registry
    /// produces.
    #[must_use]
    pub fn length(&self) -> usize {
        layout::size(&self.registry).length
    }

    /// Whether [`stop`](Self::stop) also deletes the mapped file.
    pub fn set_erase_file_on_stop(&self, erase: bool) {
        self.erase_on_stop.store(erase, Ordering::Relaxed);
    }

    /// Registers a metric; shorthand for the registry's
    /// [`add_metric`](Registry::add_metric).
    pub fn register(&self, metric: &impl Metric) -> Result<()> {
        self.registry.add_metric(metric)
    }

    /// Registers an instance domain; shorthand for the registry's
    /// [`add_indom`](Registry::add_indom).
    pub fn register_indom(&self, indom: &InstanceDomain) -> Result<()> {
        self.registry.add_indom(indom)
    }

    /// Parses `spec` and registers the metric it describes; shorthand for
    /// the registry's [`add_metric_by_string`](Registry::add_metric_by_string).
    pub fn register_string(
        &self,
        spec: &str,
        initial: impl Into<InitialValue>,
        semantics: MetricSemantics,
        metric_type: MetricType,
        unit: impl Into<Unit>,
    ) -> Result<MetricKind> {
        self.registry
            .add_metric_by_string(spec, initial, semantics, metric_type, unit)
    }

    /// Lays out the registry, writes the file image and freezes the
    /// registry.
    ///
    /// Fails if a mapping is already active. A failure while setting up
    /// removes the partial file and leaves the registry unfrozen. An
    /// existing file with the same name is replaced.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().expect(ERR_POISONED_LOCK);

        if lifecycle.region.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let plan = layout::plan(&self.registry);

        debug!(
            length = plan.length,
            version = plan.version,
            tocs = plan.toc_count,
            location = %self.loc.display(),
            "mapping the file image"
        );

        let region = Arc::new(MappedRegion::create(&self.loc, plan.length)?);

        self.fill(&plan, &region);

        if let Err(error) = region.flush() {
            self.abandon(region);
            return Err(error);
        }

        self.registry.freeze();
        lifecycle.region = Some(region);

        debug!("mapping is live");
        Ok(())
    }

    /// Detaches the live updaters, unmaps the file and unfreezes the
    /// registry. Deletes the file as well when
    /// [`set_erase_file_on_stop`](Self::set_erase_file_on_stop) asked for it.
    ///
    /// Fails if no mapping is active.
    pub fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().expect(ERR_POISONED_LOCK);

        let region = lifecycle.region.take().ok_or(Error::NotStarted)?;

        debug!(location = %self.loc.display(), "stopping the mapping");

        self.registry.unfreeze();

        for metric in self.registry.metrics_snapshot() {
            metric.detach_updaters();
        }

        let flushed = region.flush();
        drop(region);

        if self.erase_on_stop.load(Ordering::Relaxed) {
            std::fs::remove_file(&self.loc).map_err(|source| Error::Backing {
                operation: "remove",
                path: self.loc.clone(),
                source,
            })?;
        }

        flushed
    }

    /// Tears down a partially-initialized mapping.
    fn abandon(&self, region: Arc<MappedRegion>) {
        for metric in self.registry.metrics_snapshot() {
            metric.detach_updaters();
        }

        drop(region);
        let _ = std::fs::remove_file(&self.loc);
    }

    /// Writes every block of the file image and finalizes the generation
    /// pair.
    fn fill(&self, plan: &LayoutPlan, region: &Arc<MappedRegion>) {
        let mut w = ByteWriter::new(RegionSink::new(Arc::clone(region)));

        let generation = self.write_header_block(&mut w, plan);
        self.write_toc_block(&mut w, plan);
        self.write_indom_block(&mut w);
        self.write_metrics_block(&mut w, plan, region);

        // The agent treats equal generation numbers as "fully published";
        // nothing written above may be reordered past this final store.
        fence(Ordering::SeqCst);
        w.must_set_pos(GENERATION2_OFFSET);
        w.must_write_u64(generation);
    }

    fn write_header_block(&self, w: &mut ByteWriter<RegionSink>, plan: &LayoutPlan) -> u64 {
        let generation = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        w.must_write_str("MMV");
        // The magic's NUL terminator is the pre-zeroed fourth byte.
        w.must_set_pos(4);
        w.must_write_u32(plan.version);
        w.must_write_u64(generation);

        debug_assert_eq!(w.pos(), GENERATION2_OFFSET);
        w.must_write_u64(0);

        w.must_write_i32(plan.toc_count as i32);
        w.must_write_i32(self.flags.bits() as i32);
        w.must_write_i32(std::process::id() as i32);
        w.must_write_u32(self.cluster_id);

        generation
    }

    fn write_toc_block(&self, w: &mut ByteWriter<RegionSink>, plan: &LayoutPlan) {
        let mut pos = layout::HEADER_LENGTH;
        let mut entry = |w: &mut ByteWriter<RegionSink>, kind: i32, count: usize, offset: usize| {
            w.must_set_pos(pos);
            w.must_write_i32(kind);
            w.must_write_i32(count as i32);
            w.must_write_u64(offset as u64);
            pos += TOC_LENGTH;
        };

        if plan.instance_count > 0 {
            entry(w, 1, plan.indom_count, plan.indom_offset);
            entry(w, 2, plan.instance_count, plan.instance_offset);
        }

        // The metrics and values entries are always present; with nothing
        // registered they carry offset zero.
        let (metrics_offset, values_offset) = if plan.metric_count == 0 {
            (0, 0)
        } else {
            (plan.metrics_offset, plan.values_offset)
        };

        entry(w, 3, plan.metric_count, metrics_offset);
        entry(w, 4, plan.value_count, values_offset);

        if plan.string_count > 0 {
            entry(w, 5, plan.string_count, plan.strings_offset);
        }
    }

    fn write_indom_block(&self, w: &mut ByteWriter<RegionSink>) {
        for indom in self.registry.indoms_snapshot() {
            let layout = indom.layout();

            trace!(indom = indom.name(), offset = layout.offset, "writing instance domain");

            w.must_set_pos(layout.offset);
            w.must_write_u32(indom.id());
            w.must_write_i32(indom.instance_count() as i32);
            w.must_write_u64(layout.instance_offset as u64);
            w.must_write_u64(layout.short_text as u64);
            w.must_write_u64(layout.long_text as u64);

            if layout.short_text != 0 {
                w.must_set_pos(layout.short_text);
                w.must_write_str(indom.short_description());
            }

            if layout.long_text != 0 {
                w.must_set_pos(layout.long_text);
                w.must_write_str(indom.long_description());
            }

            for (i, instance) in indom.instances().iter().enumerate() {
                w.must_set_pos(layout.instance_offsets[i]);
                w.must_write_u64(layout.offset as u64);
                w.must_write_u32(0);
                w.must_write_u32(instance.id());

                let name_cell = layout.instance_name_cells[i];
                if name_cell == 0 {
                    w.must_write_str(instance.name());
                } else {
                    w.must_write_u64(name_cell as u64);
                    w.must_set_pos(name_cell);
                    w.must_write_str(instance.name());
                }
            }
        }
    }

    fn write_metrics_block(
        &self,
        w: &mut ByteWriter<RegionSink>,
        plan: &LayoutPlan,
        region: &Arc<MappedRegion>,
    ) {
        for metric in self.registry.metrics_snapshot() {
            match &metric {
                MetricKind::Singleton(m) => {
                    self.write_metric_desc(w, &metric, None);

                    let mut state = m.state();
                    let desc_offset = m.desc().layout().desc_offset;
                    let updater = Self::write_value_slot(
                        w,
                        region,
                        state.value_offset,
                        state.string_cell,
                        &state.val,
                        desc_offset,
                        0,
                    );
                    state.updater = Some(updater);
                }
                MetricKind::Instance(m) => {
                    let indom = m.indom().clone();
                    self.write_metric_desc(w, &metric, Some(&indom));

                    let desc_offset = m.desc().layout().desc_offset;
                    let instance_offsets = indom.layout().instance_offsets.clone();

                    let mut state = m.state();
                    for (i, slot) in state.iter_mut().enumerate() {
                        let updater = Self::write_value_slot(
                            w,
                            region,
                            slot.value_offset,
                            slot.string_cell,
                            &slot.val,
                            desc_offset,
                            instance_offsets[i],
                        );
                        slot.updater = Some(updater);
                    }
                }
            }

            trace!(metric = metric.name(), version = plan.version, "wrote metric");
        }
    }

    fn write_metric_desc(
        &self,
        w: &mut ByteWriter<RegionSink>,
        metric: &MetricKind,
        indom: Option<&InstanceDomain>,
    ) {
        let desc = metric.desc();
        let layout = desc.layout();

        w.must_set_pos(layout.desc_offset);

        if layout.name_cell == 0 {
            w.must_write_str(desc.name());
            w.must_set_pos(layout.desc_offset + MAX_V1_NAME_LENGTH + 1);
        } else {
            w.must_write_u64(layout.name_cell as u64);
        }

        w.must_write_u32(desc.id());
        w.must_write_i32(desc.metric_type().on_disk());
        w.must_write_i32(desc.semantics().on_disk());
        w.must_write_u32(desc.unit().pmapi());

        match indom {
            Some(indom) => w.must_write_i32(indom.id() as i32),
            None => w.must_write_i32(-1),
        }

        w.must_write_i32(0);
        w.must_write_u64(layout.short_text as u64);
        w.must_write_u64(layout.long_text as u64);

        if layout.name_cell != 0 {
            w.must_set_pos(layout.name_cell);
            w.must_write_str(desc.name());
        }

        if layout.short_text != 0 {
            w.must_set_pos(layout.short_text);
            w.must_write_str(desc.short_description());
        }

        if layout.long_text != 0 {
            w.must_set_pos(layout.long_text);
            w.must_write_str(desc.long_description());
        }
    }

    /// Writes one 32-byte value slot (payload, descriptor back-pointer,
    /// instance back-pointer) and returns the updater bound to it.
    fn write_value_slot(
        w: &mut ByteWriter<RegionSink>,
        region: &Arc<MappedRegion>,
        value_offset: usize,
        string_cell: usize,
        val: &Value,
        desc_offset: usize,
        instance_offset: usize,
    ) -> ValueUpdater {
        w.must_set_pos(value_offset);

        let updater = match val {
            Value::String(s) => {
                w.must_write_u64((STRING_LENGTH - 1) as u64);
                w.must_write_u64(string_cell as u64);
                w.must_set_pos(string_cell);
                w.must_write_str(s);

                ValueUpdater::string_cell(Arc::clone(region), string_cell)
            }
            Value::I32(v) => {
                w.must_write_i32(*v);
                ValueUpdater::fixed(Arc::clone(region), value_offset)
            }
            Value::U32(v) => {
                w.must_write_u32(*v);
                ValueUpdater::fixed(Arc::clone(region), value_offset)
            }
            Value::I64(v) => {
                w.must_write_i64(*v);
                ValueUpdater::fixed(Arc::clone(region), value_offset)
            }
            Value::U64(v) => {
                w.must_write_u64(*v);
                ValueUpdater::fixed(Arc::clone(region), value_offset)
            }
            Value::F32(v) => {
                w.must_write_f32(*v);
                ValueUpdater::fixed(Arc::clone(region), value_offset)
            }
            Value::F64(v) => {
                w.must_write_f64(*v);
                ValueUpdater::fixed(Arc::clone(region), value_offset)
            }
        };

        w.must_set_pos(value_offset + crate::constants::MAX_DATA_VALUE_SIZE);
        w.must_write_u64(desc_offset as u64);
        w.must_write_u64(instance_offset as u64);

        updater
    }
}

impl Drop for Client {
    #[cfg_attr(test, mutants::skip)] // Teardown-on-drop has no observable result to assert on.
    fn drop(&mut self) {
        // A still-active mapping is torn down like an explicit stop, except
        // that teardown failures have nowhere to go.
        if self
            .lifecycle
            .lock()
            .map(|l| l.region.is_some())
            .unwrap_or(false)
        {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_id_is_the_12_bit_name_hash() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::empty().with_root(dir.path()).with_value(
            "PCP_TMP_DIR",
            dir.path().to_str().unwrap(),
        );

        let client = Client::with_config("test", FileFlags::PROCESS, &config).unwrap();
        assert_eq!(client.cluster_id(), hash("test", 12));
        assert!(client.cluster_id() < (1 << 12));
    }

    #[test]
    fn names_with_separators_are_rejected() {
        assert!(matches!(
            Client::with_config("foo/bar", FileFlags::PROCESS, &Config::empty()),
            Err(Error::InvalidName { .. })
        ));
    }

    #[test]
    fn length_matches_the_empty_layout() {
        let client = Client::with_config("test", FileFlags::PROCESS, &Config::empty()).unwrap();
        assert_eq!(client.length(), layout::HEADER_LENGTH + 2 * TOC_LENGTH);
    }

    #[test]
    fn stop_without_start_fails() {
        let client = Client::with_config("test", FileFlags::PROCESS, &Config::empty()).unwrap();
        assert!(matches!(client.stop(), Err(Error::NotStarted)));
    }

    static_assertions::assert_impl_all!(Client: Send, Sync);
}
