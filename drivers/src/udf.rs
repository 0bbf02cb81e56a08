use crate::common::ToolContext;
use partsmith_core::driver::EXIT_SUCCESS_ONLY;
use partsmith_core::text::shell_quote;
use partsmith_core::{FilesystemCapabilities, FilesystemDriver, FilesystemType, HostProbe, Mechanism, OperationDetail, Partition};

/// Longest volume identifier mkudffs accepts.
const VID_MAX_CHARS: usize = 30;

/// UDF can only be created.
pub struct UdfDriver {
    tools: ToolContext,
}

impl UdfDriver {
    pub fn new(tools: ToolContext) -> Self {
        Self { tools }
    }
}

impl FilesystemDriver for UdfDriver {
    fn filesystem(&self) -> FilesystemType {
        FilesystemType::Udf
    }

    fn get_filesystem_support(&self, host: &dyn HostProbe) -> FilesystemCapabilities {
        let mut fs = FilesystemCapabilities::none(FilesystemType::Udf);
        if host.has_program("mkudffs") {
            fs.create = Mechanism::ExternalTool;
        }
        fs.normalize()
    }

    fn create(&self, new_partition: &Partition, detail: &mut OperationDetail) -> bool {
        let vid: String = new_partition.label.chars().take(VID_MAX_CHARS).collect();
        let command = format!(
            "mkudffs --utf8 --vid={} --lvid={} {}",
            shell_quote(&vid),
            shell_quote(&new_partition.label),
            new_partition.path
        );
        self.tools.execute(&command, detail, EXIT_SUCCESS_ONLY)
    }
}
