use crate::PartsmithError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every filesystem type the application can encounter, including the
/// placeholder kinds used for space that holds no filesystem.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum FilesystemType {
    Unallocated,
    Unknown,
    Unformatted,
    Extended,
    Btrfs,
    Ext2,
    Ext3,
    Ext4,
    LinuxSwap,
    Fat16,
    Fat32,
    Exfat,
    Ntfs,
    Reiserfs,
    Reiser4,
    Xfs,
    Jfs,
    Hfs,
    #[serde(rename = "hfs+")]
    HfsPlus,
    Ufs,
    Udf,
    Lvm2,
    Luks,
}

impl FilesystemType {
    pub const ALL: [FilesystemType; 23] = [
        FilesystemType::Unallocated,
        FilesystemType::Unknown,
        FilesystemType::Unformatted,
        FilesystemType::Extended,
        FilesystemType::Btrfs,
        FilesystemType::Ext2,
        FilesystemType::Ext3,
        FilesystemType::Ext4,
        FilesystemType::LinuxSwap,
        FilesystemType::Fat16,
        FilesystemType::Fat32,
        FilesystemType::Exfat,
        FilesystemType::Ntfs,
        FilesystemType::Reiserfs,
        FilesystemType::Reiser4,
        FilesystemType::Xfs,
        FilesystemType::Jfs,
        FilesystemType::Hfs,
        FilesystemType::HfsPlus,
        FilesystemType::Ufs,
        FilesystemType::Udf,
        FilesystemType::Lvm2,
        FilesystemType::Luks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilesystemType::Unallocated => "unallocated",
            FilesystemType::Unknown => "unknown",
            FilesystemType::Unformatted => "unformatted",
            FilesystemType::Extended => "extended",
            FilesystemType::Btrfs => "btrfs",
            FilesystemType::Ext2 => "ext2",
            FilesystemType::Ext3 => "ext3",
            FilesystemType::Ext4 => "ext4",
            FilesystemType::LinuxSwap => "linux-swap",
            FilesystemType::Fat16 => "fat16",
            FilesystemType::Fat32 => "fat32",
            FilesystemType::Exfat => "exfat",
            FilesystemType::Ntfs => "ntfs",
            FilesystemType::Reiserfs => "reiserfs",
            FilesystemType::Reiser4 => "reiser4",
            FilesystemType::Xfs => "xfs",
            FilesystemType::Jfs => "jfs",
            FilesystemType::Hfs => "hfs",
            FilesystemType::HfsPlus => "hfs+",
            FilesystemType::Ufs => "ufs",
            FilesystemType::Udf => "udf",
            FilesystemType::Lvm2 => "lvm2",
            FilesystemType::Luks => "crypt-luks",
        }
    }

    /// Package that ships the external tools for this filesystem, if any.
    pub fn software_package(&self) -> Option<&'static str> {
        match self {
            FilesystemType::Btrfs => Some("btrfs-tools"),
            FilesystemType::Ext2 | FilesystemType::Ext3 => Some("e2fsprogs"),
            FilesystemType::Ext4 => Some("e2fsprogs v1.41+"),
            FilesystemType::Fat16 | FilesystemType::Fat32 => Some("dosfstools, mtools"),
            FilesystemType::Hfs => Some("hfsutils"),
            FilesystemType::HfsPlus => Some("hfsprogs"),
            FilesystemType::Jfs => Some("jfsutils"),
            FilesystemType::LinuxSwap => Some("util-linux"),
            FilesystemType::Ntfs => Some("ntfsprogs"),
            FilesystemType::Reiser4 => Some("reiser4progs"),
            FilesystemType::Reiserfs => Some("reiserfsprogs"),
            FilesystemType::Udf => Some("udftools"),
            FilesystemType::Xfs => Some("xfsprogs"),
            _ => None,
        }
    }

    /// True for the kinds that describe space rather than a real filesystem.
    pub fn is_placeholder(&self) -> bool {
        matches!(
            self,
            FilesystemType::Unallocated
                | FilesystemType::Unknown
                | FilesystemType::Unformatted
                | FilesystemType::Extended
        )
    }
}

impl fmt::Display for FilesystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilesystemType {
    type Err = PartsmithError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let found = match name.as_str() {
            "luks" => Some(FilesystemType::Luks),
            "hfsplus" => Some(FilesystemType::HfsPlus),
            "swap" => Some(FilesystemType::LinuxSwap),
            "vfat" => Some(FilesystemType::Fat32),
            other => FilesystemType::ALL.iter().copied().find(|fs| fs.as_str() == other),
        };
        found.ok_or_else(|| PartsmithError::UnknownFilesystem(s.to_string()))
    }
}
