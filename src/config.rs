use crate::error::FolioError;
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
    time::Duration,
};

/// File name of the optional per-vault configuration, relative to the vault root.
pub const CONFIG_FILE_NAME: &str = ".folio.toml";

/// Engine settings for one vault. Every field has a default so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Conventional image folder, relative to the vault root.
    pub images_dir: String,
    /// Coalescing window for filesystem change events.
    pub debounce_ms: u64,
    /// Pages larger than this are indexed with a page error instead of being parsed.
    pub max_file_size: u64,
    /// Capacity of the bounded change event channel.
    pub event_capacity: usize,
    pub page_extension: String,
    pub image_extensions: Vec<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        VaultConfig {
            images_dir: "images".to_string(),
            debounce_ms: 500,
            max_file_size: 1024 * 1024,
            event_capacity: 1024,
            page_extension: "md".to_string(),
            image_extensions: ["png", "jpg", "jpeg", "gif", "svg", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl VaultConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn is_page<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.page_extension))
            .unwrap_or(false)
    }

    pub fn is_image<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.image_extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    pub fn validate(&self) -> Result<(), FolioError> {
        if self.event_capacity == 0 {
            return Err(FolioError::Config(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        if self.page_extension.is_empty() || self.page_extension.contains('.') {
            return Err(FolioError::Config(format!(
                "page_extension must be a bare extension, got '{}'",
                self.page_extension
            )));
        }
        if Path::new(&self.images_dir).is_absolute() {
            return Err(FolioError::Config(format!(
                "images_dir must be relative to the vault root, got '{}'",
                self.images_dir
            )));
        }
        Ok(())
    }
}

pub trait ConfigProvider: Send + Sync {
    fn get_config(&self) -> Result<VaultConfig, FolioError>;
    fn set_config(&self, config: &VaultConfig) -> Result<(), FolioError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    /// Provider for the conventional config file inside `vault_root`.
    pub fn for_vault<P: AsRef<Path>>(vault_root: P) -> Self {
        TomlConfigProvider::new(vault_root.as_ref().join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn get_config(&self) -> Result<VaultConfig, FolioError> {
        tracing::debug!("Attempting to read vault config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(VaultConfig::default());
        }
        let content = read_to_string(&self.path)?;
        let config: VaultConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn set_config(&self, config: &VaultConfig) -> Result<(), FolioError> {
        tracing::debug!("Attempting to write vault config to: {:?}", &self.path);
        config.validate()?;
        let toml_string = toml::to_string(config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}
