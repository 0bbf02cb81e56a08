use crate::{
    CommandResult, CommandRunner, FilesystemCapabilities, FilesystemType, HostProbe, OperationDetail,
    OperationStatus, Partition,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exit statuses that count as success for ordinary tools.
pub const EXIT_SUCCESS_ONLY: &[i32] = &[0];

/// Kinds of advisory text a driver can supply for the user interface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CustomText {
    ActivateFilesystem,
    DeactivateFilesystem,
    ChangeUuidWarning,
}

const ACTIVATE: &[&str] = &["Mount"];
const DEACTIVATE: &[&str] = &["Unmount"];
const CHANGE_UUID: &[&str] = &[
    "Changing the UUID might confuse software or configuration that refers to the file system by its UUID, such as /etc/fstab.",
];

/// Paragraph `index` of `paragraphs`, or `""` once past the end.
pub fn paragraph(paragraphs: &[&'static str], index: usize) -> &'static str {
    paragraphs.get(index).copied().unwrap_or("")
}

/// Text used when a driver has nothing specific to say.
pub fn generic_text(kind: CustomText, index: usize) -> &'static str {
    let paragraphs = match kind {
        CustomText::ActivateFilesystem => ACTIVATE,
        CustomText::DeactivateFilesystem => DEACTIVATE,
        CustomText::ChangeUuidWarning => CHANGE_UUID,
    };
    paragraph(paragraphs, index)
}

/// The uniform set of operations on one filesystem type.
///
/// Read operations fill fields of the partition they are given and record
/// tool output in its messages when something goes wrong. Write operations
/// log every command they run into `detail` and return whether it succeeded.
/// Nothing here panics on unexpected tool output: a value that cannot be
/// parsed is left unknown.
///
/// Callers are expected to consult [`get_filesystem_support`] first; the
/// defaults below treat an operation the format has no notion of as an
/// immediate success.
///
/// [`get_filesystem_support`]: FilesystemDriver::get_filesystem_support
pub trait FilesystemDriver: Send + Sync {
    fn filesystem(&self) -> FilesystemType;

    /// Probe the host for the tools this driver relies on.
    fn get_filesystem_support(&self, host: &dyn HostProbe) -> FilesystemCapabilities;

    /// Fill in filesystem size and free space.
    fn inspect_usage(&self, _partition: &mut Partition) {}

    fn read_label(&self, _partition: &mut Partition) {}

    fn write_label(&self, _partition: &Partition, _detail: &mut OperationDetail) -> bool {
        true
    }

    fn read_uuid(&self, _partition: &mut Partition) {}

    fn write_uuid(&self, _partition: &Partition, _detail: &mut OperationDetail) -> bool {
        true
    }

    fn create(&self, _new_partition: &Partition, _detail: &mut OperationDetail) -> bool {
        true
    }

    /// Resize to the new partition's length, or let the tool fill the
    /// partition when `fill_partition` is set.
    fn resize(&self, _partition_new: &Partition, _detail: &mut OperationDetail, _fill_partition: bool) -> bool {
        true
    }

    /// Data movement is done at block level elsewhere; formats that need
    /// to adjust themselves after a move override this.
    fn move_filesystem(
        &self,
        _partition_new: &Partition,
        _partition_old: &Partition,
        _detail: &mut OperationDetail,
    ) -> bool {
        true
    }

    fn copy(&self, _src_path: &str, _dest_path: &str, _detail: &mut OperationDetail) -> bool {
        true
    }

    fn check_repair(&self, _partition: &Partition, _detail: &mut OperationDetail) -> bool {
        true
    }

    /// Clean up after the partition holding this filesystem is deleted.
    fn remove(&self, _partition: &Partition, _detail: &mut OperationDetail) -> bool {
        true
    }

    fn get_custom_text(&self, kind: CustomText, index: usize) -> &'static str {
        generic_text(kind, index)
    }
}

/// Run a state-changing command and record it as one child of `detail`,
/// with its output nested below. `accepted` lists the exit statuses that
/// count as success.
pub fn execute_command(
    runner: &dyn CommandRunner,
    command: &str,
    detail: &mut OperationDetail,
    timeout: Option<Duration>,
    accepted: &[i32],
) -> CommandResult {
    let entry = detail.add_child(OperationDetail::new(command, OperationStatus::Executing));

    let result = match timeout {
        Some(timeout) => runner.run_timed(command, false, timeout),
        None => runner.run(command, false),
    };

    for text in [&result.stdout, &result.stderr] {
        if !text.is_empty() {
            entry.add_child(OperationDetail::new(text.as_str(), OperationStatus::None));
        }
    }

    if accepted.contains(&result.exit_status) {
        debug!("{} -> {}", command, result.exit_status);
        entry.set_status(OperationStatus::Success);
    } else {
        warn!("{} failed with exit status {}", command, result.exit_status);
        entry.set_status(OperationStatus::Error);
    }
    result
}
