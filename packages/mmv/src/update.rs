//! Live value updaters.
//!
//! When the writer fills a value slot it hands the owning metric a
//! [`ValueUpdater`]: the slot's byte offset and write shape bound to the
//! mapped region. Subsequent mutations go through the updater without any
//! involvement of the registry or the writer.
//!
//! Fixed-width updates are a single write of at most 8 bytes, which on the
//! supported platforms fits a machine word; a racing reader sees either the
//! old or the new value. String updates rewrite the metric's 256-byte string
//! cell as one pre-zeroed block, so a racing reader sees a NUL-terminated
//! prefix of either the old or the new string, never a mix with stale tail
//! bytes.

use std::sync::Arc;

use crate::layout::STRING_LENGTH;
use crate::mapping::MappedRegion;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// Write the value's little-endian payload at the slot offset.
    Fixed,
    /// Rewrite the 256-byte string cell the slot points to.
    StringCell,
}

/// Writes one metric value into its assigned place in the mapped region.
#[derive(Debug, Clone)]
pub(crate) struct ValueUpdater {
    region: Arc<MappedRegion>,
    offset: usize,
    shape: Shape,
}

impl ValueUpdater {
    /// An updater for a fixed-width slot whose payload begins at `offset`.
    pub(crate) fn fixed(region: Arc<MappedRegion>, offset: usize) -> Self {
        Self {
            region,
            offset,
            shape: Shape::Fixed,
        }
    }

    /// An updater for a string value whose pool cell begins at `offset`.
    pub(crate) fn string_cell(region: Arc<MappedRegion>, offset: usize) -> Self {
        Self {
            region,
            offset,
            shape: Shape::StringCell,
        }
    }

    /// Writes `value` to the slot.
    ///
    /// The caller holds the owning metric's lock and has coerced `value` to
    /// the metric's declared type, so the shape always matches.
    pub(crate) fn write(&self, value: &Value) {
        match (self.shape, value) {
            (Shape::StringCell, Value::String(s)) => {
                let mut cell = [0_u8; STRING_LENGTH];
                cell[..s.len()].copy_from_slice(s.as_bytes());

                // SAFETY: the layout engine assigned this cell to this value
                // alone, and the metric's lock serializes its writers.
                unsafe {
                    self.region.write_at(self.offset, &cell);
                }
            }
            (Shape::Fixed, value) => {
                let mut buf = [0_u8; 8];
                let n = value.encode_fixed(&mut buf);

                // SAFETY: as above; the slot payload is 16 bytes, of which at
                // most 8 are written.
                unsafe {
                    self.region.write_at(self.offset, &buf[..n]);
                }
            }
            (Shape::StringCell, _) => {
                unreachable!("string updaters only receive coerced string values")
            }
        }
    }
}
