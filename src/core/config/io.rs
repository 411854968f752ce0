use crate::core::config::data::{path_display, Config};
use crate::utils::url::validate_base_url;
use directories::ProjectDirs;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Errors that can occur when loading or editing configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Read {
        /// Path to the configuration file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as valid TOML.
    Parse {
        /// Path to the configuration file with invalid TOML.
        path: PathBuf,
        /// The TOML deserialization error.
        source: toml::de::Error,
    },

    /// The key passed to `set`/`unset` is not a configuration key.
    UnknownKey(String),

    /// The value passed to `set` does not parse for its key.
    InvalidValue { key: String, value: String },
}

impl ConfigError {
    fn display_path(path: &Path) -> String {
        path_display(path)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(
                    f,
                    "Failed to read config at {}: {}",
                    Self::display_path(path),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse config at {}: {}",
                    Self::display_path(path),
                    source
                )
            }
            ConfigError::UnknownKey(key) => write!(f, "Unknown config key: {key}"),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {key}: {value}")
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn StdError>> {
        Self::load_from_path(&Self::get_config_path()?)
    }

    pub fn save(&self) -> Result<(), Box<dyn StdError>> {
        self.save_to_path(&Self::get_config_path()?)
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, Box<dyn StdError>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
                path: config_path.to_path_buf(),
                source,
            })?;
            let config: Config =
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: config_path.to_path_buf(),
                    source,
                })?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub(crate) fn save_to_path(&self, config_path: &Path) -> Result<(), Box<dyn StdError>> {
        let parent = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };

        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(config_path)
            .map_err(|err| -> Box<dyn StdError> { Box::new(err) })?;
        Ok(())
    }

    pub(crate) fn get_config_path() -> Result<PathBuf, Box<dyn StdError>> {
        let proj_dirs = ProjectDirs::from("org", "parley", "parley")
            .ok_or("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Applies `parley set <key> <value>`.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "base-url" => {
                self.base_url = Some(validate_base_url(value).map_err(|_| invalid())?)
            }
            "default-model" => self.default_model = Some(value.to_string()),
            "request-timeout-ms" => {
                self.request_timeout_ms = Some(value.parse().map_err(|_| invalid())?)
            }
            "watchdog-timeout-ms" => {
                self.watchdog_timeout_ms = Some(value.parse().map_err(|_| invalid())?)
            }
            "reveal-cadence-ms" => {
                self.reveal_cadence_ms = Some(value.parse().map_err(|_| invalid())?)
            }
            "history-window" => self.history_window = Some(value.parse().map_err(|_| invalid())?),
            "markdown" => self.markdown = Some(parse_bool(value).ok_or_else(invalid)?),
            "persist" => self.persist = Some(parse_bool(value).ok_or_else(invalid)?),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Applies `parley unset <key>`.
    pub fn unset_value(&mut self, key: &str) -> Result<(), ConfigError> {
        match key {
            "base-url" => self.base_url = None,
            "default-model" => self.default_model = None,
            "request-timeout-ms" => self.request_timeout_ms = None,
            "watchdog-timeout-ms" => self.watchdog_timeout_ms = None,
            "reveal-cadence-ms" => self.reveal_cadence_ms = None,
            "history-window" => self.history_window = None,
            "markdown" => self.markdown = None,
            "persist" => self.persist = None,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        println!("  base-url: {}", self.base_url());
        match &self.default_model {
            Some(model) => println!("  default-model: {model}"),
            None => println!("  default-model: (unset)"),
        }
        println!(
            "  request-timeout-ms: {}",
            self.request_timeout().as_millis()
        );
        println!(
            "  watchdog-timeout-ms: {}",
            self.watchdog_timeout().as_millis()
        );
        println!("  reveal-cadence-ms: {}", self.reveal_cadence().as_millis());
        println!("  history-window: {}", self.history_window());
        println!(
            "  markdown: {}",
            if self.markdown_enabled() { "on" } else { "off" }
        );
        println!(
            "  persist: {}",
            if self.persist_enabled() { "on" } else { "off" }
        );
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}
