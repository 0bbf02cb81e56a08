use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, warn};
use partsmith_core::text::{round, unit_to_sectors, SizeUnit};
use partsmith_core::{
    CustomText, FilesystemDriver, FilesystemType, Operation, OperationDetail, OperationStatus, Partition, Sector,
    Settings,
};
use partsmith_drivers::{get_driver_info, list_available_drivers, DriverRegistry};
use std::io::{self, BufRead};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "partsmith")]
#[command(about = "Inspect and modify file systems through their native tools", long_about = None)]
struct Cli {
    /// Settings file (defaults to <config dir>/partsmith/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Target {
    /// Device path, e.g. /dev/sdb1
    device: String,
    /// File system type (ext2, ext3, ext4, fat16, fat32, exfat, udf)
    #[arg(short, long)]
    filesystem: FilesystemType,
    /// Logical sector size in bytes
    #[arg(long, default_value_t = 512)]
    sector_size: i64,
    /// First sector of the partition
    #[arg(long)]
    start: Option<i64>,
    /// Last sector of the partition, inclusive
    #[arg(long, conflicts_with = "size_mib")]
    end: Option<i64>,
    /// Partition length in MiB, counted from --start
    #[arg(long, requires = "start")]
    size_mib: Option<f64>,
    /// Where the file system is mounted, if it is
    #[arg(long)]
    mountpoint: Option<PathBuf>,
}

impl Target {
    /// Inclusive last sector, given directly or as a length from the start.
    fn end_sector(&self) -> Option<Sector> {
        match (self.start, self.end, self.size_mib) {
            (_, Some(end), _) => Some(end),
            (Some(start), None, Some(mib)) => {
                Some(start + round(unit_to_sectors(mib, self.sector_size, SizeUnit::MiB)) - 1)
            }
            _ => None,
        }
    }

    fn partition(&self) -> Partition {
        let mut partition = Partition::new(&self.device, self.filesystem, self.sector_size);
        if let (Some(start), Some(end)) = (self.start, self.end_sector()) {
            partition = partition.with_extent(start, end);
        }
        if let Some(mountpoint) = &self.mountpoint {
            partition = partition.mounted_at(mountpoint.clone());
        }
        partition
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TextKind {
    Activate,
    Deactivate,
    ChangeUuid,
}

impl From<TextKind> for CustomText {
    fn from(kind: TextKind) -> Self {
        match kind {
            TextKind::Activate => CustomText::ActivateFilesystem,
            TextKind::Deactivate => CustomText::DeactivateFilesystem,
            TextKind::ChangeUuid => CustomText::ChangeUuidWarning,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show which operations this host supports
    Capabilities {
        /// Show details for one file system type
        #[arg(short, long)]
        filesystem: Option<FilesystemType>,
    },
    /// Read usage, label and UUID and print them as JSON
    Inspect {
        #[command(flatten)]
        target: Target,
    },
    /// Check and repair a file system
    Check {
        #[command(flatten)]
        target: Target,
    },
    /// Set the volume label; an empty label clears it
    Label {
        #[command(flatten)]
        target: Target,
        label: String,
    },
    /// Give the file system a new random UUID
    NewUuid {
        #[command(flatten)]
        target: Target,
    },
    /// Create a new file system, erasing the device
    Create {
        #[command(flatten)]
        target: Target,
        #[arg(short, long, default_value = "")]
        label: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Resize the file system to the partition given by --start and --end or --size-mib, or to fill it
    Resize {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        fill: bool,
    },
    /// Print advisory text for a file system type
    Text {
        #[arg(short, long)]
        filesystem: FilesystemType,
        #[arg(value_enum)]
        kind: TextKind,
    },
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load(path).with_context(|| format!("reading {}", path.display()))?,
        None => Settings::load_or_default()?,
    };
    debug!("settings: {:?}", settings);
    Ok(settings)
}

fn warn_unless_root() {
    #[cfg(unix)]
    {
        if !nix::unistd::geteuid().is_root() {
            warn!("Not running as root; most tools will be unable to open block devices");
        }
    }
}

/// Refuse operations the host cannot carry out.
fn require(registry: &DriverRegistry, filesystem: FilesystemType, op: Operation) -> anyhow::Result<()> {
    if registry.get_capabilities(filesystem).get(op).is_available() {
        return Ok(());
    }
    let hint = filesystem
        .software_package()
        .map(|package| format!(" (install {})", package))
        .unwrap_or_default();
    bail!("{:?} is not available for {} on this host{}", op, filesystem, hint)
}

fn driver(registry: &DriverRegistry, filesystem: FilesystemType) -> anyhow::Result<&dyn FilesystemDriver> {
    registry
        .lookup(filesystem)
        .map(|d| d as &dyn FilesystemDriver)
        .ok_or_else(|| anyhow!("No driver for {}. Use 'partsmith capabilities' to see supported types.", filesystem))
}

fn confirm(device: &str) -> anyhow::Result<bool> {
    println!("WARNING: This will ERASE ALL DATA on {}!", device);
    println!("Type 'yes' to continue: ");
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim() == "yes")
}

/// Print the log tree and turn a failed step into an error.
fn finish(detail: OperationDetail, ok: bool) -> anyhow::Result<()> {
    let mut detail = detail;
    detail.set_status(if ok { OperationStatus::Success } else { OperationStatus::Error });
    print!("{}", detail);
    if !ok {
        bail!("{} failed", detail.description);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_ref())?;
    let registry = DriverRegistry::from_settings(settings);

    match cli.command {
        Commands::Capabilities { filesystem: Some(filesystem) } => {
            println!("{}", get_driver_info(&registry, filesystem));
        }
        Commands::Capabilities { filesystem: None } => {
            let available = list_available_drivers(&registry);
            if available.is_empty() {
                println!("No file system tools found on this host.");
            } else {
                println!("Usable file systems:\n");
                for name in available {
                    println!("  {}", name);
                }
            }
            println!("\nUse 'partsmith capabilities -f <type>' for details.");
        }
        Commands::Inspect { target } => {
            let fs = target.filesystem;
            let driver = driver(&registry, fs)?;
            let caps = registry.get_capabilities(fs);
            let mut partition = target.partition();
            if caps.read.is_available() {
                driver.inspect_usage(&mut partition);
            }
            if caps.read_label.is_available() {
                driver.read_label(&mut partition);
            }
            if caps.read_uuid.is_available() {
                driver.read_uuid(&mut partition);
            }
            println!("{}", serde_json::to_string_pretty(&partition)?);
        }
        Commands::Check { target } => {
            require(&registry, target.filesystem, Operation::Check)?;
            warn_unless_root();
            let mut detail = OperationDetail::new(format!("Check {}", target.device), OperationStatus::Executing);
            let ok = driver(&registry, target.filesystem)?.check_repair(&target.partition(), &mut detail);
            finish(detail, ok)?;
        }
        Commands::Label { target, label } => {
            require(&registry, target.filesystem, Operation::WriteLabel)?;
            warn_unless_root();
            let partition = target.partition().with_label(label);
            let mut detail = OperationDetail::new(
                format!("Set label of {} to \"{}\"", target.device, partition.label),
                OperationStatus::Executing,
            );
            let ok = driver(&registry, target.filesystem)?.write_label(&partition, &mut detail);
            finish(detail, ok)?;
        }
        Commands::NewUuid { target } => {
            require(&registry, target.filesystem, Operation::WriteUuid)?;
            let driver = driver(&registry, target.filesystem)?;
            for index in 0.. {
                let text = driver.get_custom_text(CustomText::ChangeUuidWarning, index);
                if text.is_empty() {
                    break;
                }
                println!("{}\n", text);
            }
            warn_unless_root();
            let mut detail = OperationDetail::new(format!("Set new UUID on {}", target.device), OperationStatus::Executing);
            let ok = driver.write_uuid(&target.partition(), &mut detail);
            finish(detail, ok)?;
        }
        Commands::Create { target, label, yes } => {
            require(&registry, target.filesystem, Operation::Create)?;
            let partition = target.partition().with_label(label);
            let length = partition.sector_length();
            if length > 0 {
                let bytes = length * partition.sector_size;
                if !registry.get_capabilities(target.filesystem).fits_create_bounds(bytes) {
                    bail!("{} bytes is outside the size range {} can be created with", bytes, target.filesystem);
                }
            }
            if !yes && !confirm(&target.device)? {
                println!("Create cancelled.");
                return Ok(());
            }
            warn_unless_root();
            let mut detail = OperationDetail::new(
                format!("Create {} file system on {}", target.filesystem, target.device),
                OperationStatus::Executing,
            );
            let ok = driver(&registry, target.filesystem)?.create(&partition, &mut detail);
            finish(detail, ok)?;
        }
        Commands::Resize { target, fill } => {
            let partition = target.partition();
            if !fill && partition.sector_length() <= 0 {
                bail!("--start and --end are required unless --fill or --size-mib is given");
            }
            let driver = driver(&registry, target.filesystem)?;
            let mut current = target.partition();
            if registry.get_capabilities(target.filesystem).read.is_available() {
                driver.inspect_usage(&mut current);
            }
            let current_sectors = current.usage_known().then(|| current.sectors_fs_size());
            let op = Operation::for_resize(current_sectors, partition.sector_length(), fill);
            debug!("resize of {} is a {:?}", target.device, op);
            require(&registry, target.filesystem, op)?;
            warn_unless_root();
            let mut detail = OperationDetail::new(format!("Resize {}", target.device), OperationStatus::Executing);
            let ok = driver.resize(&partition, &mut detail, fill);
            finish(detail, ok)?;
        }
        Commands::Text { filesystem, kind } => {
            let driver = driver(&registry, filesystem)?;
            for index in 0.. {
                let text = driver.get_custom_text(kind.into(), index);
                if text.is_empty() {
                    break;
                }
                println!("{}", text);
            }
        }
    }

    Ok(())
}
