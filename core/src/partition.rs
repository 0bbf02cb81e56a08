use crate::FilesystemType;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Count of sectors. Negative values only ever mean "unknown".
pub type Sector = i64;
/// Size in bytes.
pub type ByteValue = i64;

pub const UNKNOWN_SECTORS: Sector = -1;

pub const KIBIBYTE: ByteValue = 1024;
pub const MEBIBYTE: ByteValue = 1024 * KIBIBYTE;
pub const GIBIBYTE: ByteValue = 1024 * MEBIBYTE;
pub const TEBIBYTE: ByteValue = 1024 * GIBIBYTE;

/// The caller's view of one partition. Drivers fill fields in place and never
/// replace the object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    pub path: String,
    pub filesystem: FilesystemType,
    pub sector_start: Sector,
    pub sector_end: Sector,
    pub sector_size: ByteValue,
    pub label: String,
    pub uuid: String,
    pub busy: bool,
    pub mountpoints: Vec<PathBuf>,
    pub messages: Vec<String>,
    sectors_fs_size: Sector,
    sectors_fs_used: Sector,
    sectors_fs_unused: Sector,
}

impl Partition {
    pub fn new(path: impl Into<String>, filesystem: FilesystemType, sector_size: ByteValue) -> Self {
        Self {
            path: path.into(),
            filesystem,
            sector_start: UNKNOWN_SECTORS,
            sector_end: UNKNOWN_SECTORS,
            sector_size,
            label: String::new(),
            uuid: String::new(),
            busy: false,
            mountpoints: Vec::new(),
            messages: Vec::new(),
            sectors_fs_size: UNKNOWN_SECTORS,
            sectors_fs_used: UNKNOWN_SECTORS,
            sectors_fs_unused: UNKNOWN_SECTORS,
        }
    }

    /// Place the partition on disk, `sector_end` inclusive.
    pub fn with_extent(mut self, sector_start: Sector, sector_end: Sector) -> Self {
        self.sector_start = sector_start;
        self.sector_end = sector_end;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn mounted_at(mut self, mountpoint: impl Into<PathBuf>) -> Self {
        self.busy = true;
        self.mountpoints.push(mountpoint.into());
        self
    }

    /// Length in sectors, or [`UNKNOWN_SECTORS`] when the extent is unset.
    pub fn sector_length(&self) -> Sector {
        if self.sector_start < 0 || self.sector_end < self.sector_start {
            return UNKNOWN_SECTORS;
        }
        self.sector_end - self.sector_start + 1
    }

    pub fn mountpoint(&self) -> Option<&PathBuf> {
        self.mountpoints.first()
    }

    /// Record filesystem size and free space together.
    ///
    /// The pair is stored only if `0 <= unused <= fs_size` and the filesystem
    /// fits in the partition (when its length is known). Returns whether the
    /// pair was stored; a rejected pair leaves the previous values untouched.
    pub fn set_sector_usage(&mut self, sectors_fs_size: Sector, sectors_fs_unused: Sector) -> bool {
        let length = self.sector_length();
        let fits = length < 0 || sectors_fs_size <= length;
        if 0 <= sectors_fs_unused && sectors_fs_unused <= sectors_fs_size && fits {
            self.sectors_fs_size = sectors_fs_size;
            self.sectors_fs_unused = sectors_fs_unused;
            self.sectors_fs_used = sectors_fs_size - sectors_fs_unused;
            true
        } else {
            warn!(
                "{}: rejecting usage of {} sectors with {} free (partition length {})",
                self.path, sectors_fs_size, sectors_fs_unused, length
            );
            false
        }
    }

    pub fn sectors_fs_size(&self) -> Sector {
        self.sectors_fs_size
    }

    pub fn sectors_used(&self) -> Sector {
        self.sectors_fs_used
    }

    pub fn sectors_unused(&self) -> Sector {
        self.sectors_fs_unused
    }

    pub fn usage_known(&self) -> bool {
        self.sectors_fs_size >= 0
    }

    /// Append tool output to the message log, skipping empty streams.
    pub fn push_output(&mut self, stdout: &str, stderr: &str) {
        for text in [stdout, stderr] {
            if !text.is_empty() {
                self.messages.push(text.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition() -> Partition {
        Partition::new("/dev/sdb1", FilesystemType::Ext2, 512).with_extent(2048, 2048 + 999)
    }

    #[test]
    fn sector_length_is_inclusive() {
        assert_eq!(partition().sector_length(), 1000);
        assert_eq!(Partition::new("/dev/sdb1", FilesystemType::Ext2, 512).sector_length(), UNKNOWN_SECTORS);
    }

    #[test]
    fn usage_starts_unknown() {
        let p = partition();
        assert!(!p.usage_known());
        assert_eq!(p.sectors_used(), UNKNOWN_SECTORS);
        assert_eq!(p.sectors_unused(), UNKNOWN_SECTORS);
    }

    #[test]
    fn accepted_usage_keeps_sum() {
        let mut p = partition();
        assert!(p.set_sector_usage(900, 300));
        assert_eq!(p.sectors_fs_size(), 900);
        assert_eq!(p.sectors_used() + p.sectors_unused(), p.sectors_fs_size());
        assert_eq!(p.sectors_used(), 600);
    }

    #[test]
    fn inconsistent_usage_is_rejected() {
        let mut p = partition();
        assert!(p.set_sector_usage(900, 300));
        assert!(!p.set_sector_usage(900, 901));
        assert!(!p.set_sector_usage(-1, 0));
        assert!(!p.set_sector_usage(800, -1));
        assert!(!p.set_sector_usage(1001, 0));
        assert_eq!(p.sectors_fs_size(), 900);
        assert_eq!(p.sectors_unused(), 300);
    }

    #[test]
    fn unknown_length_skips_fit_check() {
        let mut p = Partition::new("/dev/sdb1", FilesystemType::Ext2, 512);
        assert!(p.set_sector_usage(1 << 40, 12));
    }

    #[test]
    fn push_output_skips_empty_streams() {
        let mut p = partition();
        p.push_output("", "e2label: No such file or directory");
        p.push_output("", "");
        assert_eq!(p.messages, vec!["e2label: No such file or directory".to_string()]);
    }
}
