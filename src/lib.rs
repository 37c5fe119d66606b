//! Flash zip-packaged firmware images to ESP32-S3 devices
//!
//! `flashpack` takes an unordered set of named firmware binaries (typically
//! extracted from a release zip), assigns each one a flash offset via a
//! naming heuristic (with a validated user-override path), builds an
//! offset-ordered [WritePlan], and drives a serial flashing session against
//! an external flashing engine with plan-wide progress reporting.
//!
//! The pieces the crate does **not** implement itself — zip decompression,
//! the ROM bootloader protocol, serial port negotiation, HTTP — are consumed
//! through the [ArchiveReader], [FlashEngine], [Transport] and
//! [ReleaseFetcher] traits.

mod error;
mod image;
mod offset;
mod plan;
mod progress;
mod release;

pub mod flasher;

pub use error::Error;
pub use flasher::{
    ChipDescriptor, FlashEngine, FlashMode, FlashParams, Flasher, SessionState, Transport,
    TransportProvider,
};
pub use image::{extract_images, ArchiveEntry, ArchiveReader, BinaryImage};
pub use offset::{
    is_app_image, resolve_auto_offset, validate_override, OffsetSource, OverrideSeverity,
    OverrideValidation, FLASH_SECTOR_SIZE, MAX_OFFSET,
};
pub use plan::{build_write_plan, OverrideSet, WritePlan, WritePlanEntry};
pub use progress::{FlashProgress, ProgressCallbacks};
pub use release::{firmware_asset, Asset, Release, ReleaseFetcher};
