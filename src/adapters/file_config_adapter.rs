//! INI file configuration adapter.

use crate::domain::error::SignalDeskError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SignalDeskError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| SignalDeskError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, SignalDeskError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| SignalDeskError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    /// configparser strips `;` and `#` comments, including inline ones;
    /// blank values read as absent.
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        let raw = self.config.get(section, key)?;
        let value = raw.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}
