//! Firmware binaries and their extraction from a release archive

use log::{debug, warn};

use crate::error::Error;

/// Extension shared by all flashable binaries in a release archive.
const BINARY_EXTENSION: &str = ".bin";

/// Directory macOS zip tools inject for resource forks; never firmware.
const MACOS_RESOURCE_DIR: &str = "__MACOSX";

/// A named firmware binary, immutable once extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryImage {
    pub filename: String,
    pub data: Vec<u8>,
}

/// A single entry listed by an [ArchiveReader].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Full path inside the archive, `/`-separated.
    pub path: String,
    pub is_dir: bool,
}

/// Access to the contents of a firmware archive.
///
/// Zip parsing itself is out of scope for this crate; the embedding
/// application supplies an implementation backed by whatever unzip
/// capability its platform offers.
pub trait ArchiveReader {
    /// List every entry in the archive.
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>, Error>;

    /// Read the raw bytes of one entry by its archive path.
    fn read_entry(&mut self, path: &str) -> Result<Vec<u8>, Error>;
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_firmware_entry(entry: &ArchiveEntry) -> bool {
    !entry.is_dir
        && entry.path.to_lowercase().ends_with(BINARY_EXTENSION)
        && !entry.path.split('/').any(|c| c == MACOS_RESOURCE_DIR)
}

/// Extract all flashable binaries from an archive.
///
/// Filters to `.bin` entries, skips macOS resource-fork metadata, and strips
/// directory components so the result can feed offset resolution directly.
/// When two entries collapse to the same bare filename the first one wins.
pub fn extract_images<R: ArchiveReader + ?Sized>(
    reader: &mut R,
) -> Result<Vec<BinaryImage>, Error> {
    let mut images: Vec<BinaryImage> = Vec::new();

    for entry in reader.list_entries()? {
        if !is_firmware_entry(&entry) {
            continue;
        }

        let filename = basename(&entry.path).to_string();
        if images.iter().any(|image| image.filename == filename) {
            warn!("duplicate binary name '{}', keeping the first occurrence", filename);
            continue;
        }

        let data = reader.read_entry(&entry.path)?;
        debug!("extracted '{}' ({} bytes) from '{}'", filename, data.len(), entry.path);
        images.push(BinaryImage { filename, data });
    }

    if images.is_empty() {
        return Err(Error::EmptyImageSet);
    }

    Ok(images)
}
