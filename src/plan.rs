//! Build a validated, offset-ordered write plan from a set of binaries
//!
//! The plan is the contract between image-set validation and the flashing
//! session: entries are sorted ascending by offset and proven free of range
//! overlaps before any device I/O happens. Ascending order also means the
//! bootloader-class region at the bottom of flash is written first, so an
//! interrupted flash still leaves the device a sane boot path.

use std::collections::BTreeMap;

use log::debug;

use crate::error::Error;
use crate::image::BinaryImage;
use crate::offset::{is_app_image, resolve_auto_offset, OffsetSource};

/// Immutable snapshot of user offset overrides for one plan build.
///
/// Passed by value into [build_write_plan] so validation and commit always
/// see the same overrides; there is no shared mutable override map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideSet(BTreeMap<String, u32>);

impl OverrideSet {
    pub fn new() -> Self {
        OverrideSet(BTreeMap::new())
    }

    /// Commit an already-validated override for `filename`.
    pub fn with(mut self, filename: impl Into<String>, offset: u32) -> Self {
        self.0.insert(filename.into(), offset);
        self
    }

    pub fn get(&self, filename: &str) -> Option<u32> {
        self.0.get(filename).copied()
    }

    /// The committed overrides, for duplicate checks during validation.
    pub fn committed(&self) -> &BTreeMap<String, u32> {
        &self.0
    }
}

impl FromIterator<(String, u32)> for OverrideSet {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        OverrideSet(iter.into_iter().collect())
    }
}

/// One binary scheduled for flashing at a fixed offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlanEntry {
    pub filename: String,
    pub offset: u32,
    pub data: Vec<u8>,
    pub source: OffsetSource,
}

impl WritePlanEntry {
    /// Exclusive end of the flash range this entry occupies.
    fn end(&self) -> u64 {
        self.offset as u64 + self.data.len() as u64
    }
}

/// The validated, ascending-offset-ordered sequence of flash writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WritePlan {
    entries: Vec<WritePlanEntry>,
}

impl WritePlan {
    pub fn entries(&self) -> &[WritePlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all entry sizes, the denominator for overall progress.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.data.len() as u64).sum()
    }
}

impl<'a> IntoIterator for &'a WritePlan {
    type Item = &'a WritePlanEntry;
    type IntoIter = std::slice::Iter<'a, WritePlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Assign offsets to every image and produce the ordered write plan.
///
/// Offsets come from the override set when present, otherwise from
/// [resolve_auto_offset]. Fails before any device I/O if the set is empty,
/// if no file is recognizable as the main application image, or if two
/// assigned flash ranges overlap.
pub fn build_write_plan(
    images: Vec<BinaryImage>,
    overrides: &OverrideSet,
) -> Result<WritePlan, Error> {
    if images.is_empty() {
        return Err(Error::EmptyImageSet);
    }

    if !images.iter().any(|image| is_app_image(&image.filename)) {
        return Err(Error::NoAppImage);
    }

    let mut entries: Vec<WritePlanEntry> = images
        .into_iter()
        .map(|BinaryImage { filename, data }| {
            let (offset, source) = match overrides.get(&filename) {
                Some(offset) => (offset, OffsetSource::Custom),
                None => (resolve_auto_offset(&filename), OffsetSource::Auto),
            };
            WritePlanEntry {
                filename,
                offset,
                data,
                source,
            }
        })
        .collect();

    entries.sort_by_key(|e| e.offset);

    for pair in entries.windows(2) {
        if pair[0].end() > pair[1].offset as u64 {
            return Err(Error::OverlappingRegions {
                first: pair[0].filename.clone(),
                second: pair[1].filename.clone(),
            });
        }
    }

    for entry in &entries {
        debug!(
            "write plan: {:#08x} {} ({} bytes, {} offset)",
            entry.offset,
            entry.filename,
            entry.data.len(),
            entry.source
        );
    }

    Ok(WritePlan { entries })
}
