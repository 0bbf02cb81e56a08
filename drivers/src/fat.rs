// FAT16 and FAT32 through dosfstools and mtools.

use crate::common::{log_error, record_failure, ToolContext};
use log::{debug, warn};
use partsmith_core::driver::{generic_text, paragraph, EXIT_SUCCESS_ONLY};
use partsmith_core::text::{
    fat_compliant_label, integer_at_line_of, leading_integer, regexp_label, round, shell_quote, trim,
};
use partsmith_core::{
    CommandResult, CustomText, FilesystemCapabilities, FilesystemDriver, FilesystemType, HostProbe, Mechanism,
    OperationDetail, Partition, PartsmithError, ScratchConfig, Sector, MEBIBYTE, TEBIBYTE,
};

/// dosfsck exit statuses treated as success. 1 means errors were found (and
/// fixed, when repairing); 256 is seen in practice and pinned as is.
pub const DOSFSCK_ACCEPTED: &[i32] = &[0, 1, 256];

/// A serial of all zeroes means none was ever set.
const NO_SERIAL: &str = "0000-0000";

const CHANGE_UUID_WARNING: &[&str] = &[
    "Changing the UUID might invalidate the Windows Product Activation (WPA) key",
    "On FAT and NTFS file systems, the Volume Serial Number is used as the UUID. \
     Changing the Volume Serial Number on the Windows system partition, normally C:, \
     might invalidate the WPA key. An invalid WPA key will prevent login until you reactivate Windows.",
    "Changing the UUID on external storage media and non-system partitions is usually safe, \
     but guarantees cannot be given.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatVariant {
    Fat16,
    Fat32,
}

impl FatVariant {
    fn filesystem(&self) -> FilesystemType {
        match self {
            FatVariant::Fat16 => FilesystemType::Fat16,
            FatVariant::Fat32 => FilesystemType::Fat32,
        }
    }

    fn fat_size(&self) -> &'static str {
        match self {
            FatVariant::Fat16 => "-F16",
            FatVariant::Fat32 => "-F32",
        }
    }

    /// Sizes mkdosfs can format with this FAT width.
    fn size_bounds(&self) -> (i64, i64) {
        match self {
            FatVariant::Fat16 => (16 * MEBIBYTE, 4095 * MEBIBYTE),
            FatVariant::Fat32 => (33 * MEBIBYTE, 2 * TEBIBYTE),
        }
    }
}

pub struct FatDriver {
    variant: FatVariant,
    tools: ToolContext,
}

impl FatDriver {
    pub fn new(variant: FatVariant, tools: ToolContext) -> Self {
        Self { variant, tools }
    }

    pub fn variant(&self) -> FatVariant {
        self.variant
    }

    /// Run `f` with a scratch mtools config mapping the configured drive
    /// letter to `device`.
    fn with_mtools<R>(&self, device: &str, f: impl FnOnce(&ScratchConfig) -> R) -> Result<R, PartsmithError> {
        let settings = self.tools.settings();
        ScratchConfig::with(&settings.scratch_prefix, settings.mtools_drive_letter, device, f)
    }

    fn read_mtools(&self, partition: &mut Partition, command: impl Fn(&str) -> String) -> Option<CommandResult> {
        let result = self.with_mtools(&partition.path, |config| {
            self.tools.read(&config.wrap(&command(&config.drive())))
        });
        match result {
            Ok(result) if result.success() => Some(result),
            Ok(result) => {
                record_failure(partition, &result);
                None
            }
            Err(e) => {
                partition.messages.push(e.to_string());
                None
            }
        }
    }

    fn execute_mtools(
        &self,
        partition: &Partition,
        detail: &mut OperationDetail,
        command: impl Fn(&str) -> String,
    ) -> bool {
        let outcome = self.with_mtools(&partition.path, |config| {
            self.tools
                .execute(&config.wrap(&command(&config.drive())), detail, EXIT_SUCCESS_ONLY)
        });
        match outcome {
            Ok(ok) => ok,
            Err(e) => log_error(detail, e.to_string()),
        }
    }
}

/// Free clusters from dosfsck's summary line `<path>: N files, used/total
/// clusters`.
fn free_clusters(output: &str, path: &str) -> Option<i64> {
    let after_path = output.find(path)? + path.len();
    let comma = after_path + output[after_path..].find(',')? + 1;
    let (used, rest) = output[comma..].trim_start().split_once('/')?;
    let used: i64 = used.parse().ok()?;
    let total = leading_integer(rest).filter(|_| !rest.starts_with(char::is_whitespace))?;
    Some(total - used)
}

/// `count` units of `unit_bytes` expressed in sectors.
fn to_sectors(count: i64, unit_bytes: i64, sector_size: i64) -> Sector {
    round(count as f64 * (unit_bytes as f64 / sector_size as f64))
}

impl FilesystemDriver for FatDriver {
    fn filesystem(&self) -> FilesystemType {
        self.variant.filesystem()
    }

    fn get_filesystem_support(&self, host: &dyn HostProbe) -> FilesystemCapabilities {
        let mut fs = FilesystemCapabilities::none(self.filesystem());

        if host.has_program("mkdosfs") {
            fs.create = Mechanism::ExternalTool;
        }
        if host.has_program("dosfsck") {
            fs.check = Mechanism::ExternalTool;
            fs.read = Mechanism::ExternalTool;
            fs.copy = Mechanism::Builtin;
            fs.move_ = Mechanism::Builtin;
        }
        if host.has_program("mdir") {
            fs.read_uuid = Mechanism::ExternalTool;
        }
        if host.has_program("mlabel") {
            fs.read_label = Mechanism::ExternalTool;
            fs.write_label = Mechanism::ExternalTool;
            fs.write_uuid = Mechanism::ExternalTool;
        }

        let (min, max) = self.variant.size_bounds();
        fs.min_size = Some(min);
        fs.max_size = Some(max);
        fs.normalize()
    }

    fn inspect_usage(&self, partition: &mut Partition) {
        let result = self.tools.read(&format!("dosfsck -n -v {}", partition.path));
        if !DOSFSCK_ACCEPTED.contains(&result.exit_status) {
            record_failure(partition, &result);
            return;
        }

        let output = &result.stdout;
        let sector_size = partition.sector_size;
        let total = integer_at_line_of(output, "sectors total")
            .zip(integer_at_line_of(output, "bytes per logical sector"))
            .map(|(sectors, bytes)| to_sectors(sectors, bytes, sector_size));
        let free = free_clusters(output, &partition.path)
            .zip(integer_at_line_of(output, "bytes per cluster"))
            .map(|(clusters, bytes)| to_sectors(clusters, bytes, sector_size));

        match (total, free) {
            (Some(total), Some(free)) => {
                if !partition.set_sector_usage(total, free) {
                    partition.messages.push(format!(
                        "Ignoring inconsistent usage for {}: {} sectors with {} free",
                        partition.path, total, free
                    ));
                }
            }
            (Some(_), None) => partition
                .messages
                .push(format!("Unable to read the free space of {}", partition.path)),
            (None, _) => warn!("{}: incomplete dosfsck summary, usage left unknown", partition.path),
        }
    }

    fn read_label(&self, partition: &mut Partition) {
        if let Some(result) = self.read_mtools(partition, |drive| format!("mlabel -s {}", drive)) {
            let label = regexp_label(&result.stdout, r"Volume label is ([^(\n]*)").unwrap_or_default();
            partition.label = trim(&label).to_string();
        }
    }

    fn write_label(&self, partition: &Partition, detail: &mut OperationDetail) -> bool {
        let label = fat_compliant_label(&partition.label);
        self.execute_mtools(partition, detail, |drive| {
            if label.is_empty() {
                format!("mlabel -c {}", drive)
            } else {
                format!("mlabel {}{}", drive, shell_quote(&label))
            }
        })
    }

    fn read_uuid(&self, partition: &mut Partition) {
        if let Some(result) = self.read_mtools(partition, |drive| format!("mdir -f {}", drive)) {
            let serial = regexp_label(&result.stdout, r"Volume Serial Number is[[:blank:]]([^[:space:]]+)")
                .unwrap_or_default();
            partition.uuid = if serial == NO_SERIAL { String::new() } else { serial };
        }
    }

    fn write_uuid(&self, partition: &Partition, detail: &mut OperationDetail) -> bool {
        let delay = self.tools.settings().uuid_write_delay();
        if !delay.is_zero() {
            debug!("waiting {:?} before generating a new serial", delay);
            std::thread::sleep(delay);
        }
        self.execute_mtools(partition, detail, |drive| format!("mlabel -s -n {}", drive))
    }

    fn create(&self, new_partition: &Partition, detail: &mut OperationDetail) -> bool {
        let command = format!(
            "mkdosfs {} -v -n {} {}",
            self.variant.fat_size(),
            shell_quote(&fat_compliant_label(&new_partition.label)),
            new_partition.path
        );
        self.tools.execute(&command, detail, EXIT_SUCCESS_ONLY)
    }

    fn check_repair(&self, partition: &Partition, detail: &mut OperationDetail) -> bool {
        let command = format!("dosfsck -a -w -v {}", partition.path);
        self.tools.execute(&command, detail, DOSFSCK_ACCEPTED)
    }

    fn get_custom_text(&self, kind: CustomText, index: usize) -> &'static str {
        match kind {
            CustomText::ChangeUuidWarning => paragraph(CHANGE_UUID_WARNING, index),
            _ => generic_text(kind, index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{context, FakeHost, ScriptedRunner};
    use partsmith_core::OperationStatus;
    use std::sync::{Arc, Mutex};

    const DOSFSCK: &str = "fsck.fat 4.2 (2021-01-31)\n\
        Checking we can access the last sector of the filesystem\n\
        Boot sector contents:\n\
        System ID \"mkfs.fat\"\n\
        Media byte 0xf8 (hard disk)\n\
        \x20      512 bytes per logical sector\n\
        \x20     2048 bytes per cluster\n\
        \x20        4 reserved sectors\n\
        \x20   204800 sectors total\n\
        /dev/sdc1: 3 files, 1200/51091 clusters\n";

    fn driver(variant: FatVariant, runner: &Arc<ScriptedRunner>) -> FatDriver {
        FatDriver::new(variant, context(runner))
    }

    fn partition() -> Partition {
        Partition::new("/dev/sdc1", FilesystemType::Fat32, 512).with_extent(2048, 2048 + 204_799)
    }

    /// Answers `mlabel` like a device whose volume label persists between calls.
    fn fake_mtools(runner: Arc<ScriptedRunner>) -> Arc<ScriptedRunner> {
        let label = Arc::new(Mutex::new(String::new()));
        let store = label.clone();
        runner
            .respond_with("mlabel -s H:", move |_| {
                CommandResult::new(format!(" Volume label is {}\n", label.lock().unwrap()), "", 0)
            })
            .respond_with("mlabel -c H:", {
                let store = store.clone();
                move |_| {
                    store.lock().unwrap().clear();
                    CommandResult::new("", "", 0)
                }
            })
            .respond_with("mlabel H:", move |command| {
                let value = command.rsplit("H:").next().unwrap_or("").trim_matches('"');
                *store.lock().unwrap() = value.to_string();
                CommandResult::new("", "", 0)
            })
    }

    #[test]
    fn inspect_usage_scales_clusters_and_sectors() {
        let runner = ScriptedRunner::new().respond("dosfsck -n -v /dev/sdc1", CommandResult::new(DOSFSCK, "", 1));
        let mut p = partition();

        driver(FatVariant::Fat32, &runner).inspect_usage(&mut p);

        assert_eq!(p.sectors_fs_size(), 204800);
        assert_eq!(p.sectors_unused(), (51091 - 1200) * 4);
        assert_eq!(p.sectors_used() + p.sectors_unused(), p.sectors_fs_size());
        assert_eq!(runner.locales(), vec![true]);
    }

    #[test]
    fn inspect_usage_failure_records_output() {
        let runner = ScriptedRunner::new().respond("dosfsck", CommandResult::new("partial\n", "bad boot sector\n", 2));
        let mut p = partition();

        driver(FatVariant::Fat32, &runner).inspect_usage(&mut p);

        assert!(!p.usage_known());
        assert_eq!(p.messages, vec!["partial\n".to_string(), "bad boot sector\n".to_string()]);
    }

    #[test]
    fn inspect_usage_without_free_clusters_reports_it() {
        let truncated = DOSFSCK.lines().take(9).collect::<Vec<_>>().join("\n");
        let runner = ScriptedRunner::new().respond("dosfsck", CommandResult::new(truncated, "", 0));
        let mut p = partition();

        driver(FatVariant::Fat32, &runner).inspect_usage(&mut p);

        assert!(!p.usage_known());
        assert_eq!(p.messages, vec!["Unable to read the free space of /dev/sdc1".to_string()]);
    }

    #[test]
    fn inspect_usage_without_total_stays_unknown() {
        let truncated = DOSFSCK.lines().take(8).collect::<Vec<_>>().join("\n");
        let runner = ScriptedRunner::new().respond("dosfsck", CommandResult::new(truncated, "", 0));
        let mut p = partition();

        driver(FatVariant::Fat32, &runner).inspect_usage(&mut p);

        assert!(!p.usage_known());
        assert!(p.messages.is_empty());
    }

    #[test]
    fn free_clusters_requires_used_over_total() {
        assert_eq!(free_clusters("/dev/x: 1 files, 10/100 clusters", "/dev/x"), Some(90));
        assert_eq!(free_clusters("/dev/x: 1 files, 10 / 100 clusters", "/dev/x"), None);
        assert_eq!(free_clusters("/dev/x: 1 files, lots/100 clusters", "/dev/x"), None);
        assert_eq!(free_clusters("/dev/y: 1 files, 10/100 clusters", "/dev/x"), None);
    }

    #[test]
    fn label_round_trip_truncates_to_eleven() {
        let runner = fake_mtools(ScriptedRunner::new());
        let d = driver(FatVariant::Fat16, &runner);
        let mut detail = OperationDetail::new("label", OperationStatus::None);

        assert!(d.write_label(&partition().with_label("DATA"), &mut detail));
        let mut p = partition();
        d.read_label(&mut p);
        assert_eq!(p.label, "DATA");

        assert!(d.write_label(&partition().with_label("VERYLONGLABEL"), &mut detail));
        d.read_label(&mut p);
        assert_eq!(p.label, "VERYLONGLAB");

        assert!(d.write_label(&partition(), &mut detail));
        d.read_label(&mut p);
        assert_eq!(p.label, "");

        let calls = runner.calls();
        assert!(calls.iter().all(|c| c.starts_with("export MTOOLSRC=")));
        assert!(calls.iter().any(|c| c.ends_with("mlabel -c H:")));
    }

    #[test]
    fn label_stops_at_parenthesis() {
        let runner = ScriptedRunner::new().respond(
            "mlabel -s",
            CommandResult::new(" Volume label is BOOT        (abbr=BOOT       )\n", "", 0),
        );
        let mut p = partition();
        driver(FatVariant::Fat32, &runner).read_label(&mut p);
        assert_eq!(p.label, "BOOT");
    }

    #[test]
    fn scratch_config_removed_after_failure() {
        let runner = ScriptedRunner::new().respond("mdir", CommandResult::new("", "init H: non DOS media\n", 1));
        let mut p = partition();

        driver(FatVariant::Fat32, &runner).read_uuid(&mut p);

        assert_eq!(p.messages, vec!["init H: non DOS media\n".to_string()]);
        let call = &runner.calls()[0];
        let path = call
            .strip_prefix("export MTOOLSRC=")
            .and_then(|rest| rest.split(" && ").next())
            .map(|quoted| quoted.trim_matches('"'))
            .unwrap();
        assert!(!std::path::Path::new(path).exists());
    }

    #[test]
    fn zero_serial_is_cleared() {
        let runner = ScriptedRunner::new().respond(
            "mdir -f H:",
            CommandResult::new(" Volume in drive H has no label\n Volume Serial Number is 0000-0000\n", "", 0),
        );
        let mut p = partition();
        p.uuid = "stale".to_string();
        driver(FatVariant::Fat32, &runner).read_uuid(&mut p);
        assert_eq!(p.uuid, "");

        let runner = ScriptedRunner::new().respond(
            "mdir -f H:",
            CommandResult::new(" Volume Serial Number is 1A2B-3C4D\nDirectory for H:/\n", "", 0),
        );
        driver(FatVariant::Fat32, &runner).read_uuid(&mut p);
        assert_eq!(p.uuid, "1A2B-3C4D");
    }

    #[test]
    fn write_uuid_runs_mlabel_serial() {
        let runner = ScriptedRunner::new().respond("mlabel -s -n H:", CommandResult::new("", "", 0));
        let mut detail = OperationDetail::new("uuid", OperationStatus::None);

        assert!(driver(FatVariant::Fat16, &runner).write_uuid(&partition(), &mut detail));
        assert_eq!(detail.children.len(), 1);
        assert!(detail.children[0].description.ends_with("mlabel -s -n H:"));
    }

    #[test]
    fn create_uses_fat_width_and_short_label() {
        let runner = ScriptedRunner::new().respond("mkdosfs", CommandResult::new("", "", 0));
        let p = partition().with_label("VERYLONGLABEL");
        let mut detail = OperationDetail::new("create", OperationStatus::None);

        assert!(driver(FatVariant::Fat16, &runner).create(&p, &mut detail));
        assert!(driver(FatVariant::Fat32, &runner).create(&p, &mut detail));
        assert_eq!(
            runner.calls(),
            vec![
                "mkdosfs -F16 -v -n \"VERYLONGLAB\" /dev/sdc1".to_string(),
                "mkdosfs -F32 -v -n \"VERYLONGLAB\" /dev/sdc1".to_string(),
            ]
        );
    }

    #[test]
    fn check_repair_accepts_pinned_statuses() {
        for status in [0, 1, 256, 2, -1, 127] {
            let runner = ScriptedRunner::new().respond("dosfsck -a -w -v", CommandResult::new("", "", status));
            let mut detail = OperationDetail::new("check", OperationStatus::None);
            let ok = driver(FatVariant::Fat32, &runner).check_repair(&partition(), &mut detail);
            assert_eq!(ok, [0, 1, 256].contains(&status), "status {status}");
        }
    }

    #[test]
    fn uuid_warning_has_three_paragraphs() {
        let runner = ScriptedRunner::new();
        let d = driver(FatVariant::Fat32, &runner);
        assert!(d.get_custom_text(CustomText::ChangeUuidWarning, 0).contains("WPA"));
        assert!(!d.get_custom_text(CustomText::ChangeUuidWarning, 2).is_empty());
        assert_eq!(d.get_custom_text(CustomText::ChangeUuidWarning, 3), "");
        assert_eq!(d.get_custom_text(CustomText::ActivateFilesystem, 0), "Mount");
    }

    #[test]
    fn support_and_bounds() {
        let runner = ScriptedRunner::new();
        let host = FakeHost::with(&["mkdosfs", "dosfsck", "mdir", "mlabel"]).native_fat_resize();

        let caps = driver(FatVariant::Fat16, &runner).get_filesystem_support(&host);
        assert_eq!(caps.grow, Mechanism::Unsupported);
        let caps = caps.with_native_support(&host).normalize();
        assert_eq!(caps.grow, Mechanism::NativeLibrary);
        assert_eq!(caps.shrink, Mechanism::NativeLibrary);
        assert_eq!(caps.copy, Mechanism::Builtin);
        assert_eq!(caps.min_size, Some(16 * MEBIBYTE));
        assert_eq!(caps.max_size, Some(4095 * MEBIBYTE));

        let caps = driver(FatVariant::Fat32, &runner).get_filesystem_support(&FakeHost::with(&["mkdosfs"]));
        assert_eq!(caps.create, Mechanism::ExternalTool);
        assert_eq!(caps.copy, Mechanism::Unsupported);
        assert_eq!(caps.min_size, Some(33 * MEBIBYTE));
        assert_eq!(caps.max_size, Some(2 * TEBIBYTE));
    }
}
