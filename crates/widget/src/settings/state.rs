use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use sitechat_transport::ServiceConfig;
use snafu::{ResultExt, Snafu};

use crate::chat::{DEFAULT_HISTORY_LIMIT, DEFAULT_MOBILE_BREAKPOINT, SessionOptions};

pub const DEFAULT_CHAT_ENDPOINT: &str = "http://localhost:3000/api/chat";
pub const DEFAULT_CONFIG_ENDPOINT: &str = "http://localhost:3000/api/chat/config";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_GREETING: &str = "Hello! 👋 How can I help you today?";
pub const SETTINGS_DIRECTORY_NAME: &str = "sitechat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "SITECHAT_";
/// Overrides the settings file location.
pub const SETTINGS_PATH_ENV: &str = "SITECHAT_SETTINGS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetSettings {
    #[serde(default = "default_chat_endpoint")]
    pub chat_endpoint: String,
    #[serde(default = "default_config_endpoint")]
    pub config_endpoint: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_mobile_breakpoint")]
    pub mobile_breakpoint: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Assistant message shown when the session starts. Blank disables it.
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            chat_endpoint: default_chat_endpoint(),
            config_endpoint: default_config_endpoint(),
            history_limit: default_history_limit(),
            mobile_breakpoint: default_mobile_breakpoint(),
            request_timeout_secs: default_request_timeout_secs(),
            greeting: default_greeting(),
        }
    }
}

impl WidgetSettings {
    /// Layers defaults, the JSON file at `path` and `SITECHAT_*` variables, in that order.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(WidgetSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["settings"]))
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let settings = Self::figment(path)
            .extract::<WidgetSettings>()
            .context(ExtractSnafu {
                stage: "extract-settings",
                path: path.to_path_buf(),
            })?;
        Ok(settings.normalized())
    }

    pub fn normalized(mut self) -> Self {
        self.chat_endpoint = non_blank_or(self.chat_endpoint, default_chat_endpoint);
        self.config_endpoint = non_blank_or(self.config_endpoint, default_config_endpoint);
        if self.history_limit == 0 {
            self.history_limit = default_history_limit();
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        self.greeting = self.greeting.trim().to_string();

        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn to_service_config(&self) -> ServiceConfig {
        ServiceConfig::new(self.chat_endpoint.clone(), self.config_endpoint.clone())
            .with_request_timeout(self.request_timeout())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            history_limit: self.history_limit,
            mobile_breakpoint: self.mobile_breakpoint,
            greeting: (!self.greeting.is_empty()).then(|| self.greeting.clone()),
        }
    }
}

pub struct SettingsStore {
    settings: WidgetSettings,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".sitechat"))
    }

    pub fn default_config_path() -> PathBuf {
        match std::env::var_os(SETTINGS_PATH_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::default_config_dir().join(SETTINGS_FILE_NAME),
        }
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings,
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> &WidgetSettings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update(&mut self, settings: WidgetSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings = normalized_settings;
        Ok(())
    }

    /// Writes the current settings, creating the file on first use.
    pub fn save(&self) -> Result<(), SettingsError> {
        self.persist(&self.settings)
    }

    fn load_from_disk(path: &Path) -> WidgetSettings {
        if !path.exists() {
            tracing::info!(path = %path.display(), "settings file not found, using defaults");
        }

        match WidgetSettings::load_from(path) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(error = %error, "failed to load settings, using defaults");
                WidgetSettings::default()
            }
        }
    }

    fn persist(&self, settings: &WidgetSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self
            .config_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeSettingsSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!(path = %self.config_path.display(), "saved settings");
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to read settings from {path:?} on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        path: PathBuf,
        #[snafu(source(from(figment::Error, Box::new)))]
        source: Box<figment::Error>,
    },
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn non_blank_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_chat_endpoint() -> String {
    DEFAULT_CHAT_ENDPOINT.to_string()
}

fn default_config_endpoint() -> String {
    DEFAULT_CONFIG_ENDPOINT.to_string()
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_mobile_breakpoint() -> u32 {
    DEFAULT_MOBILE_BREAKPOINT
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let settings = WidgetSettings::load_from(Path::new("absent.json"))
                .map_err(|error| error.to_string())?;

            assert_eq!(settings, WidgetSettings::default());
            assert_eq!(settings.history_limit, 10);
            assert_eq!(settings.mobile_breakpoint, 768);
            Ok(())
        });
    }

    #[test]
    fn file_and_environment_layers_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "settings.json",
                r#"{ "chat_endpoint": "  https://example.com/api/chat  ", "history_limit": 6 }"#,
            )?;
            jail.set_env("SITECHAT_HISTORY_LIMIT", "4");
            jail.set_env("SITECHAT_SETTINGS", "ignored.json");

            let settings = WidgetSettings::load_from(Path::new("settings.json"))
                .map_err(|error| error.to_string())?;

            assert_eq!(settings.chat_endpoint, "https://example.com/api/chat");
            assert_eq!(settings.history_limit, 4);
            assert_eq!(settings.config_endpoint, DEFAULT_CONFIG_ENDPOINT);
            Ok(())
        });
    }

    #[test]
    fn normalization_restores_blank_and_zero_fields() {
        let settings = WidgetSettings {
            chat_endpoint: "   ".to_string(),
            history_limit: 0,
            request_timeout_secs: 0,
            greeting: "  ".to_string(),
            ..WidgetSettings::default()
        }
        .normalized();

        assert_eq!(settings.chat_endpoint, DEFAULT_CHAT_ENDPOINT);
        assert_eq!(settings.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(settings.request_timeout(), Duration::from_secs(60));
        assert_eq!(settings.session_options().greeting, None);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults_in_store() {
        Jail::expect_with(|jail| {
            jail.create_file("settings.json", "{ not json")?;

            let store = SettingsStore::new(PathBuf::from("settings.json"));
            assert_eq!(store.settings(), &WidgetSettings::default());
            Ok(())
        });
    }

    #[test]
    fn update_persists_atomically_and_reloads() {
        Jail::expect_with(|_jail| {
            let path = PathBuf::from("nested/settings.json");
            let mut store = SettingsStore::new(path.clone());
            store
                .update(WidgetSettings {
                    mobile_breakpoint: 1024,
                    ..WidgetSettings::default()
                })
                .map_err(|error| error.to_string())?;

            assert!(path.exists());
            assert!(!path.with_extension("json.tmp").exists());
            assert_eq!(SettingsStore::new(path).settings().mobile_breakpoint, 1024);
            Ok(())
        });
    }

    #[test]
    fn session_options_carry_greeting_and_limits() {
        let options = WidgetSettings::default().session_options();
        assert_eq!(options.greeting.as_deref(), Some(DEFAULT_GREETING));
        assert_eq!(options.history_limit, DEFAULT_HISTORY_LIMIT);
    }
}
