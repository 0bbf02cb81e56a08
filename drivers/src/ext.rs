// ext2, ext3 and ext4 through e2fsprogs.

use crate::common::{log_error, record_failure, ToolContext};
use log::warn;
use partsmith_core::driver::EXIT_SUCCESS_ONLY;
use partsmith_core::mount::mounted_filesystem_usage;
use partsmith_core::text::{
    blocks_to_sectors, extract_integer_after, regexp_label, round, sector_to_unit, shell_quote, trim, SizeUnit,
};
use partsmith_core::{
    FilesystemCapabilities, FilesystemDriver, FilesystemType, HostProbe, Mechanism, OperationDetail, Partition,
    Sector,
};
use uuid::Uuid;

/// e2fsck exit statuses treated as success. 1 and 2 mean errors were
/// corrected; 256 is kept as observed.
pub const E2FSCK_ACCEPTED: &[i32] = &[0, 1, 2, 256];

const UUID_PATTERN: &str = r"^Filesystem UUID:[[:blank:]]*([[:xdigit:]]{8}-[[:xdigit:]]{4}-[[:xdigit:]]{4}-[[:xdigit:]]{4}-[[:xdigit:]]{12})";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtVariant {
    Ext2,
    Ext3,
    Ext4,
}

impl ExtVariant {
    fn filesystem(&self) -> FilesystemType {
        match self {
            ExtVariant::Ext2 => FilesystemType::Ext2,
            ExtVariant::Ext3 => FilesystemType::Ext3,
            ExtVariant::Ext4 => FilesystemType::Ext4,
        }
    }

    fn mkfs(&self) -> &'static str {
        match self {
            ExtVariant::Ext2 => "mkfs.ext2",
            ExtVariant::Ext3 => "mkfs.ext3",
            ExtVariant::Ext4 => "mkfs.ext4",
        }
    }

    /// Journalled variants take free space from the kernel while mounted.
    fn free_space_from_kernel(&self) -> bool {
        !matches!(self, ExtVariant::Ext2)
    }
}

pub struct ExtDriver {
    variant: ExtVariant,
    tools: ToolContext,
}

impl ExtDriver {
    pub fn new(variant: ExtVariant, tools: ToolContext) -> Self {
        Self { variant, tools }
    }

    pub fn variant(&self) -> ExtVariant {
        self.variant
    }

    fn free_sectors_when_mounted(&self, partition: &mut Partition) -> Option<Sector> {
        let Some(mountpoint) = partition.mountpoint().cloned() else {
            partition
                .messages
                .push(format!("{} is busy but has no known mount point", partition.path));
            return None;
        };
        match mounted_filesystem_usage(&mountpoint) {
            Ok((_, free)) => Some(round(free as f64 / partition.sector_size as f64)),
            Err(e) => {
                partition.messages.push(e.to_string());
                None
            }
        }
    }
}

impl FilesystemDriver for ExtDriver {
    fn filesystem(&self) -> FilesystemType {
        self.variant.filesystem()
    }

    fn get_filesystem_support(&self, host: &dyn HostProbe) -> FilesystemCapabilities {
        let mut fs = FilesystemCapabilities::none(self.filesystem());

        if host.has_program("dumpe2fs") {
            fs.read = Mechanism::ExternalTool;
        }
        if host.has_program("tune2fs") {
            fs.read_uuid = Mechanism::ExternalTool;
            fs.write_uuid = Mechanism::ExternalTool;
        }
        if host.has_program("e2label") {
            fs.read_label = Mechanism::ExternalTool;
            fs.write_label = Mechanism::ExternalTool;
        }
        if host.has_program(self.variant.mkfs()) {
            fs.create = Mechanism::ExternalTool;
        }
        if host.has_program("e2fsck") {
            fs.check = Mechanism::ExternalTool;
        }
        if host.has_program("resize2fs") && fs.check.is_available() {
            fs.grow = Mechanism::ExternalTool;
            // Shrinking needs the current usage to find the minimum size.
            if fs.read.is_available() {
                fs.shrink = Mechanism::ExternalTool;
            }
        }
        if fs.check.is_available() {
            fs.copy = Mechanism::Builtin;
            fs.move_ = Mechanism::Builtin;
        }
        if fs.read.is_available() {
            fs.online_read = if self.variant.free_space_from_kernel() {
                Mechanism::ExternalTool
            } else {
                Mechanism::Builtin
            };
        }

        fs.normalize()
    }

    fn inspect_usage(&self, partition: &mut Partition) {
        let result = self.tools.read(&format!("dumpe2fs -h {}", partition.path));
        if !result.success() {
            record_failure(partition, &result);
            return;
        }

        let output = &result.stdout;
        let block_size = extract_integer_after(output, "Block size:").filter(|size| *size > 0);
        let block_count = extract_integer_after(output, "Block count:").filter(|count| *count >= 0);
        let (Some(block_count), Some(block_size)) = (block_count, block_size) else {
            warn!("{}: no block count or block size in dumpe2fs output", partition.path);
            return;
        };
        let total = blocks_to_sectors(block_count, block_size, partition.sector_size);

        let free = if partition.busy && self.variant.free_space_from_kernel() {
            self.free_sectors_when_mounted(partition)
        } else {
            extract_integer_after(output, "Free blocks:")
                .filter(|free| *free >= 0)
                .map(|free| blocks_to_sectors(free, block_size, partition.sector_size))
        };

        match free {
            Some(free) => {
                if !partition.set_sector_usage(total, free) {
                    partition.messages.push(format!(
                        "Ignoring inconsistent usage for {}: {} sectors with {} free",
                        partition.path, total, free
                    ));
                }
            }
            None => partition
                .messages
                .push(format!("Unable to read the free space of {}", partition.path)),
        }
    }

    fn read_label(&self, partition: &mut Partition) {
        let result = self.tools.read(&format!("e2label {}", partition.path));
        if result.success() {
            partition.label = trim(&result.stdout).to_string();
        } else {
            record_failure(partition, &result);
        }
    }

    fn write_label(&self, partition: &Partition, detail: &mut OperationDetail) -> bool {
        let command = format!("e2label {} {}", partition.path, shell_quote(&partition.label));
        self.tools.execute(&command, detail, EXIT_SUCCESS_ONLY)
    }

    fn read_uuid(&self, partition: &mut Partition) {
        let result = self.tools.read(&format!("tune2fs -l {}", partition.path));
        if !result.success() {
            record_failure(partition, &result);
            return;
        }
        partition.uuid = regexp_label(&result.stdout, UUID_PATTERN)
            .and_then(|text| Uuid::parse_str(&text).ok())
            .filter(|uuid| !uuid.is_nil())
            .map(|uuid| uuid.hyphenated().to_string())
            .unwrap_or_default();
    }

    fn write_uuid(&self, partition: &Partition, detail: &mut OperationDetail) -> bool {
        let command = format!("tune2fs -U random {}", partition.path);
        self.tools.execute(&command, detail, EXIT_SUCCESS_ONLY)
    }

    fn create(&self, new_partition: &Partition, detail: &mut OperationDetail) -> bool {
        let command = format!(
            "{} -L {} {}",
            self.variant.mkfs(),
            shell_quote(&new_partition.label),
            new_partition.path
        );
        self.tools.execute(&command, detail, EXIT_SUCCESS_ONLY)
    }

    fn resize(&self, partition_new: &Partition, detail: &mut OperationDetail, fill_partition: bool) -> bool {
        let mut command = format!("resize2fs {}", partition_new.path);
        if !fill_partition {
            let length = partition_new.sector_length();
            if length <= 0 {
                return log_error(detail, format!("Unknown length of {}", partition_new.path));
            }
            // One KiB short so the filesystem stays inside the partition.
            let kib = round(sector_to_unit(length, partition_new.sector_size, SizeUnit::KiB)) - 1;
            command.push_str(&format!(" {}K", kib));
        }
        self.tools.execute(&command, detail, EXIT_SUCCESS_ONLY)
    }

    fn check_repair(&self, partition: &Partition, detail: &mut OperationDetail) -> bool {
        let command = format!("e2fsck -f -y -v {}", partition.path);
        self.tools.execute(&command, detail, E2FSCK_ACCEPTED)
    }
}
