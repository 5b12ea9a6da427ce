use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use std::fs;
use thiserror::Error;

/// Value shipped in the example configuration. Treated the same as no key at all.
pub const API_KEY_PLACEHOLDER: &str = "your_api_key_here";

#[derive(serde::Deserialize, Debug)]
pub struct Settings {
    // SkyLearn Billing Pro site, without the REST prefix
    pub skylearn_base_url: String,
    pub skylearn_api_key: SecretString,
    // Where to POST enrollments, if anywhere
    pub external_system_url: Option<String>,
    pub enrollment_log_file: String,
    pub hours_back: u32,
    // What environment - local, dev, stage, prod
    pub environment: String,
    pub log_level: String,
    pub sentry_dsn: String,
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Given settings file is not a file: {0}")]
    NotAFile(String),
    #[error("Unexpected error when loading metadata for {path}.")]
    Metadata {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Config couldn't be built. {0}")]
    Build(#[source] ConfigError),
    #[error("Config didn't match serialization. {0}")]
    Deserialize(#[source] ConfigError),
    #[error("Please set your API key in the SKYLEARN_API_KEY environment variable.")]
    MissingApiKey,
}

impl Settings {
    /// The forwarding target, with an empty value counting as unset.
    pub fn external_system_url(&self) -> Option<&str> {
        self.external_system_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let key = self.skylearn_api_key.expose_secret();
        if key.trim().is_empty() || key == API_KEY_PLACEHOLDER {
            return Err(SettingsError::MissingApiKey);
        }
        Ok(())
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait HasFile {
    fn file(&self) -> &str;
}
pub struct SettingsFile {}
impl HasFile for SettingsFile {
    fn file(&self) -> &str {
        "settings.yaml"
    }
}

fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_default("skylearn_base_url", "https://yoursite.com")?
        .set_default("skylearn_api_key", API_KEY_PLACEHOLDER)?
        .set_default("enrollment_log_file", "enrollment_sync.log")?
        .set_default("hours_back", 24_i64)?
        .set_default("environment", "local")?
        .set_default("log_level", "info")?
        .set_default("sentry_dsn", "")?
        .set_default("statsd_host", "127.0.0.1")?
        .set_default("statsd_port", 8125_i64)
}

fn _get_settings(settings: impl HasFile) -> Result<Settings, SettingsError> {
    let mut builder = with_defaults(Config::builder()).map_err(SettingsError::Build)?;
    // Either we use a settings.yaml file, or environment variables
    let settings_file = settings.file();
    builder = match fs::metadata(settings_file) {
        Ok(metadata) => match metadata.is_file() {
            true => builder.add_source(File::new(settings_file, FileFormat::Yaml)),
            false => return Err(SettingsError::NotAFile(settings_file.to_string())),
        },
        Err(error) => match error.kind() {
            std::io::ErrorKind::NotFound => builder.add_source(Environment::default()),
            _ => {
                return Err(SettingsError::Metadata {
                    path: settings_file.to_string(),
                    source: error,
                })
            }
        },
    };
    let config = builder.build().map_err(SettingsError::Build)?;
    config
        .try_deserialize::<Settings>()
        .map_err(SettingsError::Deserialize)
}

pub fn get_settings() -> Result<Settings, SettingsError> {
    _get_settings(SettingsFile {})
}
