use partsmith_core::{FilesystemCapabilities, FilesystemDriver, FilesystemType, HostProbe};

/// exFAT is recognised but no tooling is wired up for it. Every operation is
/// an immediate success, and with nothing to probe the type reports no
/// capabilities, so callers never reach those no-ops.
#[derive(Debug, Default)]
pub struct ExFatDriver;

impl FilesystemDriver for ExFatDriver {
    fn filesystem(&self) -> FilesystemType {
        FilesystemType::Exfat
    }

    fn get_filesystem_support(&self, _host: &dyn HostProbe) -> FilesystemCapabilities {
        FilesystemCapabilities::none(FilesystemType::Exfat).normalize()
    }
}
