// Throwaway configuration files for tools that cannot be told everything on
// the command line. mtools is the only current user: it addresses devices
// through drive letters defined in a config file named by MTOOLSRC.

use crate::text::shell_quote;
use crate::PartsmithError;
use log::debug;
use std::io::Write;
use std::path::Path;
use tempfile::{Builder, NamedTempFile};

/// A uniquely named file in the system temp directory holding one drive
/// mapping. The file is removed when the value is dropped, whatever path the
/// caller leaves by.
#[derive(Debug)]
pub struct ScratchConfig {
    file: NamedTempFile,
    drive_letter: char,
}

impl ScratchConfig {
    /// Write an mtools config mapping `drive_letter:` to `device_path`.
    pub fn mtools(prefix: &str, drive_letter: char, device_path: &str) -> Result<Self, PartsmithError> {
        Self::mtools_in(&std::env::temp_dir(), prefix, drive_letter, device_path)
    }

    /// Like [`mtools`](ScratchConfig::mtools) but in `dir`.
    pub fn mtools_in(dir: &Path, prefix: &str, drive_letter: char, device_path: &str) -> Result<Self, PartsmithError> {
        let mut file = Builder::new()
            .prefix(prefix)
            .rand_bytes(8)
            .tempfile_in(dir)
            .map_err(|e| PartsmithError::TempFile(e.to_string()))?;

        let contents = format!(
            "drive {}: file=\"{}\"\nmtools_skip_check=1\n",
            drive_letter, device_path
        );
        let written = file.write_all(contents.as_bytes()).and_then(|_| file.flush());
        if let Err(e) = written {
            return Err(PartsmithError::TempFile(format!(
                "unable to write to {}: {}",
                file.path().display(),
                e
            )));
        }

        debug!("created {} for {}", file.path().display(), device_path);
        Ok(Self { file, drive_letter })
    }

    /// Create the file, hand it to `f`, and remove it before returning.
    pub fn with<R>(
        prefix: &str,
        drive_letter: char,
        device_path: &str,
        f: impl FnOnce(&ScratchConfig) -> R,
    ) -> Result<R, PartsmithError> {
        let config = Self::mtools(prefix, drive_letter, device_path)?;
        Ok(f(&config))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// The drive as mtools commands spell it, e.g. `H:`.
    pub fn drive(&self) -> String {
        format!("{}:", self.drive_letter)
    }

    /// Prefix `command` so mtools reads this file.
    pub fn wrap(&self, command: &str) -> String {
        let path = self.path().display().to_string();
        format!("export MTOOLSRC={} && {}", shell_quote(&path), command)
    }
}
