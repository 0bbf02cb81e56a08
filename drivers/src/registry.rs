use crate::common::ToolContext;
use crate::exfat::ExFatDriver;
use crate::ext::{ExtDriver, ExtVariant};
use crate::fat::{FatDriver, FatVariant};
use crate::udf::UdfDriver;
use log::{info, warn};
use once_cell::sync::{Lazy, OnceCell};
use partsmith_core::text::format_size;
use partsmith_core::{
    CapabilityMatrix, CommandRunner, CustomText, FilesystemCapabilities, FilesystemDriver, FilesystemType,
    HostProbe, Mechanism, Operation, OperationDetail, Partition, PathProbe, Settings, ShellRunner,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Every driver this crate provides.
pub enum Driver {
    Ext(ExtDriver),
    Fat(FatDriver),
    ExFat(ExFatDriver),
    Udf(UdfDriver),
}

impl Driver {
    fn inner(&self) -> &dyn FilesystemDriver {
        match self {
            Driver::Ext(d) => d,
            Driver::Fat(d) => d,
            Driver::ExFat(d) => d,
            Driver::Udf(d) => d,
        }
    }
}

impl FilesystemDriver for Driver {
    fn filesystem(&self) -> FilesystemType {
        self.inner().filesystem()
    }

    fn get_filesystem_support(&self, host: &dyn HostProbe) -> FilesystemCapabilities {
        self.inner().get_filesystem_support(host)
    }

    fn inspect_usage(&self, partition: &mut Partition) {
        self.inner().inspect_usage(partition)
    }

    fn read_label(&self, partition: &mut Partition) {
        self.inner().read_label(partition)
    }

    fn write_label(&self, partition: &Partition, detail: &mut OperationDetail) -> bool {
        self.inner().write_label(partition, detail)
    }

    fn read_uuid(&self, partition: &mut Partition) {
        self.inner().read_uuid(partition)
    }

    fn write_uuid(&self, partition: &Partition, detail: &mut OperationDetail) -> bool {
        self.inner().write_uuid(partition, detail)
    }

    fn create(&self, new_partition: &Partition, detail: &mut OperationDetail) -> bool {
        self.inner().create(new_partition, detail)
    }

    fn resize(&self, partition_new: &Partition, detail: &mut OperationDetail, fill_partition: bool) -> bool {
        self.inner().resize(partition_new, detail, fill_partition)
    }

    fn move_filesystem(&self, partition_new: &Partition, partition_old: &Partition, detail: &mut OperationDetail) -> bool {
        self.inner().move_filesystem(partition_new, partition_old, detail)
    }

    fn copy(&self, src_path: &str, dest_path: &str, detail: &mut OperationDetail) -> bool {
        self.inner().copy(src_path, dest_path, detail)
    }

    fn check_repair(&self, partition: &Partition, detail: &mut OperationDetail) -> bool {
        self.inner().check_repair(partition, detail)
    }

    fn remove(&self, partition: &Partition, detail: &mut OperationDetail) -> bool {
        self.inner().remove(partition, detail)
    }

    fn get_custom_text(&self, kind: CustomText, index: usize) -> &'static str {
        self.inner().get_custom_text(kind, index)
    }
}

/// Maps filesystem types to drivers and remembers what the host supports.
pub struct DriverRegistry {
    drivers: BTreeMap<FilesystemType, Driver>,
    host: Box<dyn HostProbe>,
    capabilities: OnceCell<CapabilityMatrix>,
}

impl DriverRegistry {
    pub fn new(runner: Arc<dyn CommandRunner>, host: Box<dyn HostProbe>, settings: Settings) -> Self {
        let tools = ToolContext::new(runner, settings);
        let mut drivers = BTreeMap::new();
        register_builtin_drivers(&mut drivers, &tools);
        Self {
            drivers,
            host,
            capabilities: OnceCell::new(),
        }
    }

    /// Run real tools through `sh` and look them up on `PATH`.
    pub fn from_settings(settings: Settings) -> Self {
        let host = PathProbe::new(settings.native_fat_resize);
        Self::new(Arc::new(ShellRunner::new()), Box::new(host), settings)
    }

    pub fn lookup(&self, filesystem: FilesystemType) -> Option<&Driver> {
        self.drivers.get(&filesystem)
    }

    /// Types with a driver, whatever the host supports.
    pub fn supported_types(&self) -> Vec<FilesystemType> {
        self.drivers.keys().copied().collect()
    }

    /// Probe the host afresh. Tools found by a driver come first; whatever
    /// the partition library offers natively fills the remaining gaps, also
    /// for types without a driver.
    pub fn probe(&self) -> CapabilityMatrix {
        let host = self.host.as_ref();
        let mut matrix = CapabilityMatrix::new();
        for filesystem in FilesystemType::ALL {
            let caps = match self.drivers.get(&filesystem) {
                Some(driver) => driver.get_filesystem_support(host),
                None => FilesystemCapabilities::none(filesystem),
            };
            matrix.insert(caps.with_native_support(host));
        }
        let usable = matrix.iter().filter(|caps| caps.any_available()).count();
        info!("capability probe: {} of {} filesystem types usable", usable, FilesystemType::ALL.len());
        matrix
    }

    /// The matrix from the first probe, kept for the life of the registry.
    pub fn capabilities(&self) -> &CapabilityMatrix {
        self.capabilities.get_or_init(|| self.probe())
    }

    pub fn get_capabilities(&self, filesystem: FilesystemType) -> FilesystemCapabilities {
        self.capabilities().get(filesystem)
    }
}

fn register_builtin_drivers(drivers: &mut BTreeMap<FilesystemType, Driver>, tools: &ToolContext) {
    for variant in [ExtVariant::Ext2, ExtVariant::Ext3, ExtVariant::Ext4] {
        let driver = ExtDriver::new(variant, tools.clone());
        drivers.insert(driver.filesystem(), Driver::Ext(driver));
    }
    for variant in [FatVariant::Fat16, FatVariant::Fat32] {
        let driver = FatDriver::new(variant, tools.clone());
        drivers.insert(driver.filesystem(), Driver::Fat(driver));
    }
    drivers.insert(FilesystemType::Exfat, Driver::ExFat(ExFatDriver));
    drivers.insert(FilesystemType::Udf, Driver::Udf(UdfDriver::new(tools.clone())));
}

static GLOBAL: Lazy<DriverRegistry> = Lazy::new(|| {
    let settings = Settings::load_or_default().unwrap_or_else(|e| {
        warn!("Ignoring unreadable settings: {}", e);
        Settings::default()
    });
    DriverRegistry::from_settings(settings)
});

/// The process-wide registry, built on first use from the default settings
/// file.
pub fn global() -> &'static DriverRegistry {
    &GLOBAL
}

/// Types the host can do at least one thing with.
pub fn list_available_drivers(registry: &DriverRegistry) -> Vec<String> {
    registry
        .capabilities()
        .iter()
        .filter(|caps| caps.any_available())
        .map(|caps| caps.filesystem.to_string())
        .collect()
}

/// Human-readable summary of one type's capabilities.
pub fn get_driver_info(registry: &DriverRegistry, filesystem: FilesystemType) -> String {
    let caps = registry.get_capabilities(filesystem);
    let mut info = format!("Filesystem: {}\n", filesystem);
    if let Some(package) = filesystem.software_package() {
        info.push_str(&format!("Package: {}\n", package));
    }
    info.push_str(&format!(
        "Create size: {} .. {}\n",
        caps.min_size.map_or("any".to_string(), |bytes| format_size(bytes, 1)),
        caps.max_size.map_or("any".to_string(), |bytes| format_size(bytes, 1)),
    ));
    for op in Operation::ALL {
        let mechanism = caps.get(op);
        if mechanism != Mechanism::Unsupported {
            info.push_str(&format!("- {:?}: {:?}\n", op, mechanism));
        }
    }
    info
}
