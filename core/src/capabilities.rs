// Which operations each filesystem supports on this host, and how.

use crate::{ByteValue, FilesystemType, Sector};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How an operation is carried out. Ordered from least to most capable so
/// `Unsupported` is the default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Mechanism {
    #[default]
    Unsupported,
    /// Done by the driver itself from other primitives.
    Builtin,
    /// Done by the partition-table library.
    NativeLibrary,
    /// Done by an external program found on `PATH`.
    ExternalTool,
}

impl Mechanism {
    pub fn is_available(&self) -> bool {
        *self != Mechanism::Unsupported
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Read,
    ReadLabel,
    WriteLabel,
    ReadUuid,
    WriteUuid,
    Create,
    Grow,
    Shrink,
    Move,
    Copy,
    Check,
    OnlineRead,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Operation::Read,
        Operation::ReadLabel,
        Operation::WriteLabel,
        Operation::ReadUuid,
        Operation::WriteUuid,
        Operation::Create,
        Operation::Grow,
        Operation::Shrink,
        Operation::Move,
        Operation::Copy,
        Operation::Check,
        Operation::OnlineRead,
    ];

    /// The operation a resize to `new_sectors` amounts to. Without a known
    /// current size, and when filling the partition, it counts as growing.
    pub fn for_resize(current_sectors: Option<Sector>, new_sectors: Sector, fill_partition: bool) -> Operation {
        match current_sectors {
            Some(current) if !fill_partition && new_sectors < current => Operation::Shrink,
            _ => Operation::Grow,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilesystemCapabilities {
    pub filesystem: FilesystemType,
    pub read: Mechanism,
    pub read_label: Mechanism,
    pub write_label: Mechanism,
    pub read_uuid: Mechanism,
    pub write_uuid: Mechanism,
    pub create: Mechanism,
    pub grow: Mechanism,
    pub shrink: Mechanism,
    #[serde(rename = "move")]
    pub move_: Mechanism,
    pub copy: Mechanism,
    pub check: Mechanism,
    pub online_read: Mechanism,
    /// Smallest filesystem `create` can make, in bytes.
    pub min_size: Option<ByteValue>,
    /// Largest filesystem `create` can make, in bytes.
    pub max_size: Option<ByteValue>,
}

impl FilesystemCapabilities {
    /// Everything unsupported, no size bounds.
    pub fn none(filesystem: FilesystemType) -> Self {
        Self {
            filesystem,
            read: Mechanism::Unsupported,
            read_label: Mechanism::Unsupported,
            write_label: Mechanism::Unsupported,
            read_uuid: Mechanism::Unsupported,
            write_uuid: Mechanism::Unsupported,
            create: Mechanism::Unsupported,
            grow: Mechanism::Unsupported,
            shrink: Mechanism::Unsupported,
            move_: Mechanism::Unsupported,
            copy: Mechanism::Unsupported,
            check: Mechanism::Unsupported,
            online_read: Mechanism::Unsupported,
            min_size: None,
            max_size: None,
        }
    }

    pub fn get(&self, op: Operation) -> Mechanism {
        match op {
            Operation::Read => self.read,
            Operation::ReadLabel => self.read_label,
            Operation::WriteLabel => self.write_label,
            Operation::ReadUuid => self.read_uuid,
            Operation::WriteUuid => self.write_uuid,
            Operation::Create => self.create,
            Operation::Grow => self.grow,
            Operation::Shrink => self.shrink,
            Operation::Move => self.move_,
            Operation::Copy => self.copy,
            Operation::Check => self.check,
            Operation::OnlineRead => self.online_read,
        }
    }

    /// Mark every operation the host's partition library handles natively,
    /// for operations no tool already covers.
    pub fn with_native_support(mut self, host: &dyn HostProbe) -> Self {
        for op in Operation::ALL {
            if !self.get(op).is_available() && host.native_support(self.filesystem, op) {
                *self.slot(op) = Mechanism::NativeLibrary;
            }
        }
        self
    }

    fn slot(&mut self, op: Operation) -> &mut Mechanism {
        match op {
            Operation::Read => &mut self.read,
            Operation::ReadLabel => &mut self.read_label,
            Operation::WriteLabel => &mut self.write_label,
            Operation::ReadUuid => &mut self.read_uuid,
            Operation::WriteUuid => &mut self.write_uuid,
            Operation::Create => &mut self.create,
            Operation::Grow => &mut self.grow,
            Operation::Shrink => &mut self.shrink,
            Operation::Move => &mut self.move_,
            Operation::Copy => &mut self.copy,
            Operation::Check => &mut self.check,
            Operation::OnlineRead => &mut self.online_read,
        }
    }

    /// Drop operations whose prerequisites are missing. Growing, copying and
    /// moving need a checker; shrinking and online reads also need to know
    /// current usage.
    pub fn normalize(mut self) -> Self {
        if !self.check.is_available() {
            self.grow = Mechanism::Unsupported;
            self.shrink = Mechanism::Unsupported;
            self.copy = Mechanism::Unsupported;
            self.move_ = Mechanism::Unsupported;
        }
        if !self.read.is_available() {
            self.shrink = Mechanism::Unsupported;
            self.online_read = Mechanism::Unsupported;
        }
        self
    }

    pub fn respects_dependencies(&self) -> bool {
        let check = self.check.is_available();
        let read = self.read.is_available();
        let needs_check = [self.grow, self.copy, self.move_];
        let needs_read = [self.shrink, self.online_read];
        needs_check.iter().all(|m| check || !m.is_available())
            && needs_read.iter().all(|m| read || !m.is_available())
            && (check || !self.shrink.is_available())
    }

    pub fn any_available(&self) -> bool {
        Operation::ALL.iter().any(|op| self.get(*op).is_available())
    }

    /// Whether `create` accepts a filesystem of `bytes`.
    pub fn fits_create_bounds(&self, bytes: ByteValue) -> bool {
        self.min_size.map_or(true, |min| bytes >= min) && self.max_size.map_or(true, |max| bytes <= max)
    }
}

/// What the host offers to carry out operations. The probe asks this instead
/// of touching `PATH` directly so it can be replaced in tests.
pub trait HostProbe: Send + Sync {
    /// Whether `program` can be found on the execution path.
    fn has_program(&self, program: &str) -> bool;

    /// Whether the partition-table library handles `op` for `filesystem`
    /// without any external program.
    fn native_support(&self, _filesystem: FilesystemType, _op: Operation) -> bool {
        false
    }
}

/// Looks programs up on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct PathProbe {
    native_fat_resize: bool,
}

impl PathProbe {
    pub fn new(native_fat_resize: bool) -> Self {
        Self { native_fat_resize }
    }
}

impl HostProbe for PathProbe {
    fn has_program(&self, program: &str) -> bool {
        let found = which::which(program).is_ok();
        debug!("probe {}: {}", program, if found { "found" } else { "missing" });
        found
    }

    fn native_support(&self, filesystem: FilesystemType, op: Operation) -> bool {
        self.native_fat_resize
            && matches!(filesystem, FilesystemType::Fat16 | FilesystemType::Fat32)
            && matches!(op, Operation::Grow | Operation::Shrink)
    }
}

/// Capabilities of every filesystem type, computed once per probe.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilityMatrix {
    entries: BTreeMap<FilesystemType, FilesystemCapabilities>,
}

impl CapabilityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, capabilities: FilesystemCapabilities) {
        let capabilities = capabilities.normalize();
        self.entries.insert(capabilities.filesystem, capabilities);
    }

    /// Capabilities for `filesystem`; types that were never probed support
    /// nothing.
    pub fn get(&self, filesystem: FilesystemType) -> FilesystemCapabilities {
        self.entries
            .get(&filesystem)
            .cloned()
            .unwrap_or_else(|| FilesystemCapabilities::none(filesystem))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilesystemCapabilities> {
        self.entries.values()
    }
}
