pub mod capabilities;
pub mod command;
pub mod driver;
pub mod error;
pub mod filesystem;
pub mod mount;
pub mod operation_detail;
pub mod partition;
pub mod scratch;
pub mod settings;
pub mod text;

pub use capabilities::{CapabilityMatrix, FilesystemCapabilities, HostProbe, Mechanism, Operation, PathProbe};
pub use command::{CommandResult, CommandRunner, ShellRunner, SPAWN_FAILED, TIMED_OUT};
pub use driver::{CustomText, FilesystemDriver};
pub use error::PartsmithError;
pub use filesystem::FilesystemType;
pub use operation_detail::{OperationDetail, OperationStatus};
pub use partition::{
    ByteValue, Partition, Sector, GIBIBYTE, KIBIBYTE, MEBIBYTE, TEBIBYTE, UNKNOWN_SECTORS,
};
pub use scratch::ScratchConfig;
pub use settings::Settings;
