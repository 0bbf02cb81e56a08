pub mod common;
pub mod exfat;
pub mod ext;
pub mod fat;
pub mod registry;
pub mod udf;

#[cfg(test)]
mod test_helpers;

pub use common::ToolContext;
pub use exfat::ExFatDriver;
pub use ext::{ExtDriver, ExtVariant, E2FSCK_ACCEPTED};
pub use fat::{FatDriver, FatVariant, DOSFSCK_ACCEPTED};
pub use registry::{get_driver_info, global, list_available_drivers, Driver, DriverRegistry};
pub use udf::UdfDriver;
