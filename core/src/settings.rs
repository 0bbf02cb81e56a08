use crate::PartsmithError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunables for the drivers. Every field has a default, so a settings file
/// only needs the keys it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Kill state-changing tools that run longer than this. No limit when unset.
    pub command_timeout_secs: Option<u64>,
    /// Pause before asking mtools for a new volume serial. Serials generated
    /// in quick succession come out identical.
    pub uuid_write_delay_ms: u64,
    /// Drive letter mapped to the device in the mtools scratch config.
    pub mtools_drive_letter: char,
    /// File name prefix for scratch config files.
    pub scratch_prefix: String,
    /// The partition library can resize FAT filesystems itself.
    pub native_fat_resize: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            command_timeout_secs: None,
            uuid_write_delay_ms: 1000,
            mtools_drive_letter: 'H',
            scratch_prefix: "partsmith-".to_string(),
            native_fat_resize: false,
        }
    }
}

impl Settings {
    /// `<config dir>/partsmith/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("partsmith").join("settings.json"))
    }

    pub fn load(path: &Path) -> Result<Self, PartsmithError> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&contents)?;
        settings.validate()?;
        debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Settings from the default location, or the defaults if no file exists.
    pub fn load_or_default() -> Result<Self, PartsmithError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), PartsmithError> {
        if !self.mtools_drive_letter.is_ascii_alphabetic() {
            return Err(PartsmithError::Configuration(format!(
                "mtools_drive_letter must be a letter, got {:?}",
                self.mtools_drive_letter
            )));
        }
        if self.scratch_prefix.is_empty() || self.scratch_prefix.contains('/') {
            return Err(PartsmithError::Configuration(format!(
                "scratch_prefix must be a plain file name prefix, got {:?}",
                self.scratch_prefix
            )));
        }
        if self.command_timeout_secs == Some(0) {
            return Err(PartsmithError::Configuration(
                "command_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn uuid_write_delay(&self) -> Duration {
        Duration::from_millis(self.uuid_write_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "uuid_write_delay_ms": 0, "command_timeout_secs": 600 }}"#).unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.uuid_write_delay(), Duration::ZERO);
        assert_eq!(settings.command_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(settings.mtools_drive_letter, 'H');
        assert_eq!(settings.scratch_prefix, "partsmith-");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "mtools_drive_letter": "7" }}"#).unwrap();
        assert!(matches!(Settings::load(file.path()), Err(PartsmithError::Configuration(_))));

        let settings = Settings {
            scratch_prefix: "tmp/evil".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(Settings::load(file.path()), Err(PartsmithError::SerializationError(_))));
    }
}
