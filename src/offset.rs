//! Map firmware binary names to flash offsets
//!
//! Offsets follow the conventional Arduino/ESP-IDF 4 MB layout for the
//! ESP32-S3: bootloader at 0x0, partition table at 0x8000, `boot_app0` at
//! 0xE000, the application at 0x10000 and a filesystem image at 0x290000.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use log::warn;
use regex::Regex;
use serde::Serialize;
use strum::Display;

/// Offset of the second-stage bootloader.
pub const BOOTLOADER_OFFSET: u32 = 0x0;
/// Offset of the partition table.
pub const PARTITION_TABLE_OFFSET: u32 = 0x8000;
/// Offset of the OTA data selector written by the Arduino core.
pub const BOOT_APP0_OFFSET: u32 = 0xE000;
/// Offset of the main application image.
pub const APP_OFFSET: u32 = 0x1_0000;
/// Offset of the LittleFS/SPIFFS filesystem image.
pub const FILESYSTEM_OFFSET: u32 = 0x29_0000;

/// Highest offset accepted for a custom assignment (4 MB flash).
pub const MAX_OFFSET: u32 = 0x40_0000;
/// Erase sector size of the target's SPI flash.
pub const FLASH_SECTOR_SIZE: u32 = 0x1000;

/// Ordered name-pattern rules, first match wins. `boot_app` must precede
/// `app`, and the filesystem patterns are checked only after the app rule
/// so that e.g. `firmware.bin` never matches the bare `fs` substring first.
const OFFSET_RULES: &[(&[&str], u32)] = &[
    (&["bootloader"], BOOTLOADER_OFFSET),
    (&["partition"], PARTITION_TABLE_OFFSET),
    (&["boot_app"], BOOT_APP0_OFFSET),
    (&["firmware", "app"], APP_OFFSET),
    (&["littlefs", "spiffs", "fs"], FILESYSTEM_OFFSET),
];

/// Index of the firmware/app rule within [OFFSET_RULES].
const APP_RULE: usize = 3;

fn match_rule(filename: &str) -> Option<usize> {
    let lower = filename.to_lowercase();
    OFFSET_RULES
        .iter()
        .position(|(patterns, _)| patterns.iter().any(|p| lower.contains(p)))
}

/// Resolve the canonical flash offset for a binary from its filename.
///
/// Unrecognized names fall back to the application offset with a logged
/// warning, matching what a user most likely intended for a lone binary.
pub fn resolve_auto_offset(filename: &str) -> u32 {
    match match_rule(filename) {
        Some(rule) => OFFSET_RULES[rule].1,
        None => {
            warn!(
                "no offset rule matches '{}', assuming application image at {:#x}",
                filename, APP_OFFSET
            );
            APP_OFFSET
        }
    }
}

/// Whether a filename is recognized as the main application image.
///
/// True only when the *first* matching rule is the firmware/app rule, so
/// `boot_app0.bin` does not count even though it contains `app`.
pub fn is_app_image(filename: &str) -> bool {
    match_rule(filename) == Some(APP_RULE)
}

/// How a write-plan entry got its offset.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum OffsetSource {
    /// Resolved from the filename rules.
    Auto,
    /// Supplied by the user as a validated override.
    Custom,
}

/// Severity of an override validation outcome.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum OverrideSeverity {
    /// Blank input, the automatic offset will be used.
    None,
    /// Parsed and well-formed.
    Success,
    /// Usable, but likely not what the user wants.
    Warning,
    /// Unusable, must be corrected before flashing.
    Error,
}

/// Result of validating a raw user-supplied offset override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverrideValidation {
    pub severity: OverrideSeverity,
    /// User-facing explanation for warnings and errors.
    pub message: Option<String>,
    /// The parsed offset, present unless the input was blank or rejected.
    pub offset: Option<u32>,
}

impl OverrideValidation {
    /// Whether the input may be committed (errors are the only rejection).
    pub fn is_valid(&self) -> bool {
        self.severity != OverrideSeverity::Error
    }

    fn error(message: impl Into<String>) -> Self {
        OverrideValidation {
            severity: OverrideSeverity::Error,
            message: Some(message.into()),
            offset: None,
        }
    }
}

fn offset_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]+$").unwrap())
}

/// Validate a raw custom-offset string for `filename`.
///
/// `committed` holds the overrides already accepted for *other* files and is
/// consulted for duplicate detection. Rules apply in order and the first
/// failure short-circuits; a misaligned but otherwise well-formed offset is
/// accepted with [OverrideSeverity::Warning], never upgraded to an error.
pub fn validate_override(
    filename: &str,
    raw: &str,
    committed: &BTreeMap<String, u32>,
) -> OverrideValidation {
    let raw = raw.trim();
    if raw.is_empty() {
        return OverrideValidation {
            severity: OverrideSeverity::None,
            message: None,
            offset: None,
        };
    }

    if !offset_pattern().is_match(raw) {
        return OverrideValidation::error(format!(
            "'{raw}' is not a valid offset, expected hex with a 0x prefix (e.g. 0x10000)"
        ));
    }

    let offset = match u32::from_str_radix(&raw[2..], 16) {
        Ok(offset) if offset <= MAX_OFFSET => offset,
        _ => {
            return OverrideValidation::error(format!(
                "'{raw}' is out of range, offsets must be between 0x0 and {MAX_OFFSET:#x}"
            ));
        }
    };

    if let Some((other, _)) = committed
        .iter()
        .find(|(other, o)| other.as_str() != filename && **o == offset)
    {
        return OverrideValidation::error(format!(
            "offset {offset:#x} is already used by '{other}'"
        ));
    }

    if offset % FLASH_SECTOR_SIZE != 0 {
        return OverrideValidation {
            severity: OverrideSeverity::Warning,
            message: Some(format!(
                "{offset:#x} is not aligned to the {FLASH_SECTOR_SIZE:#x} byte erase sector size"
            )),
            offset: Some(offset),
        };
    }

    OverrideValidation {
        severity: OverrideSeverity::Success,
        message: None,
        offset: Some(offset),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn resolves_known_names() {
        assert_eq!(resolve_auto_offset("bootloader.bin"), 0x0);
        assert_eq!(resolve_auto_offset("BOOTLOADER.BIN"), 0x0);
        assert_eq!(resolve_auto_offset("partitions.bin"), 0x8000);
        assert_eq!(resolve_auto_offset("boot_app0.bin"), 0xE000);
        assert_eq!(resolve_auto_offset("firmware.bin"), 0x10000);
        assert_eq!(resolve_auto_offset("my-app-v2.bin"), 0x10000);
        assert_eq!(resolve_auto_offset("littlefs.bin"), 0x290000);
        assert_eq!(resolve_auto_offset("spiffs.bin"), 0x290000);
        assert_eq!(resolve_auto_offset("fs.bin"), 0x290000);
    }

    #[test]
    fn unknown_names_fall_back_to_app_offset() {
        assert_eq!(resolve_auto_offset("random.bin"), 0x10000);
    }

    #[test]
    fn first_matching_rule_wins() {
        // contains both "boot_app" and "app", the earlier rule applies
        assert_eq!(resolve_auto_offset("boot_app0.bin"), 0xE000);
        // contains both "firmware" and "fs" patterns would not apply anyway,
        // but "app" + "fs" does: the app rule is checked first
        assert_eq!(resolve_auto_offset("appfs.bin"), 0x10000);
    }

    #[test]
    fn app_image_detection() {
        assert!(is_app_image("firmware.bin"));
        assert!(is_app_image("app.bin"));
        assert!(!is_app_image("boot_app0.bin"));
        assert!(!is_app_image("bootloader.bin"));
        assert!(!is_app_image("random.bin"));
    }

    #[test]
    fn blank_override_means_auto() {
        let result = validate_override("firmware.bin", "  ", &BTreeMap::new());
        assert_eq!(result.severity, OverrideSeverity::None);
        assert_eq!(result.offset, None);
        assert!(result.is_valid());
    }

    #[test]
    fn override_requires_hex_prefix() {
        let result = validate_override("firmware.bin", "10000", &BTreeMap::new());
        assert_eq!(result.severity, OverrideSeverity::Error);
        assert!(!result.is_valid());
    }

    #[test]
    fn aligned_override_is_success() {
        let result = validate_override("firmware.bin", "0x10000", &BTreeMap::new());
        assert_eq!(result.severity, OverrideSeverity::Success);
        assert_eq!(result.offset, Some(0x10000));
    }

    #[test]
    fn misaligned_override_is_warning() {
        let result = validate_override("firmware.bin", "0x10001", &BTreeMap::new());
        assert_eq!(result.severity, OverrideSeverity::Warning);
        assert_eq!(result.offset, Some(0x10001));
        assert!(result.is_valid());
    }

    #[test]
    fn out_of_range_override_is_rejected() {
        let result = validate_override("firmware.bin", "0x500000", &BTreeMap::new());
        assert_eq!(result.severity, OverrideSeverity::Error);

        // numeric overflow of u32 is also out of range, not a panic
        let result = validate_override("firmware.bin", "0x1ffffffff", &BTreeMap::new());
        assert_eq!(result.severity, OverrideSeverity::Error);
    }

    #[test]
    fn duplicate_override_names_the_conflict() {
        let committed = BTreeMap::from([("partitions.bin".to_string(), 0x8000)]);
        let result = validate_override("firmware.bin", "0x8000", &committed);
        assert_eq!(result.severity, OverrideSeverity::Error);
        assert!(result.message.as_deref().unwrap().contains("partitions.bin"));

        // a file may re-commit its own offset
        let result = validate_override("partitions.bin", "0x8000", &committed);
        assert_eq!(result.severity, OverrideSeverity::Success);
    }

    #[test]
    fn max_offset_is_accepted() {
        let result = validate_override("firmware.bin", "0x400000", &BTreeMap::new());
        assert_eq!(result.severity, OverrideSeverity::Success);
        assert_eq!(result.offset, Some(0x400000));
    }
}
