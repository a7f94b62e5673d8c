use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_AGENT_ENDPOINT: &str = "http://localhost:8000";
pub const DEFAULT_STORE_ENDPOINT: &str = "http://localhost:8080";
pub const SETTINGS_DIRECTORY_NAME: &str = "wisp";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WispSettings {
    #[serde(default = "default_agent_endpoint")]
    pub agent_endpoint: String,
    #[serde(default = "default_store_endpoint")]
    pub store_endpoint: String,
    #[serde(default = "default_conversation_poll_seconds")]
    pub conversation_poll_seconds: u64,
    #[serde(default = "default_chat_list_poll_seconds")]
    pub chat_list_poll_seconds: u64,
}

impl Default for WispSettings {
    fn default() -> Self {
        Self {
            agent_endpoint: default_agent_endpoint(),
            store_endpoint: default_store_endpoint(),
            conversation_poll_seconds: default_conversation_poll_seconds(),
            chat_list_poll_seconds: default_chat_list_poll_seconds(),
        }
    }
}

impl WispSettings {
    pub fn conversation_poll_period(&self) -> Duration {
        Duration::from_secs(self.conversation_poll_seconds)
    }

    pub fn chat_list_poll_period(&self) -> Duration {
        Duration::from_secs(self.chat_list_poll_seconds)
    }

    pub fn normalized(mut self) -> Self {
        self.agent_endpoint = normalize_endpoint(self.agent_endpoint, default_agent_endpoint);
        self.store_endpoint = normalize_endpoint(self.store_endpoint, default_store_endpoint);

        // A zero period would spin the poll loop; one second is the floor.
        self.conversation_poll_seconds = self.conversation_poll_seconds.max(1);
        self.chat_list_poll_seconds = self.chat_list_poll_seconds.max(1);
        self
    }
}

fn normalize_endpoint(endpoint: String, fallback: fn() -> String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

/// Disk-backed settings with a lock-free snapshot for readers.
pub struct SettingsStore {
    settings: Arc<ArcSwap<WispSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".wisp"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> Arc<WispSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: WispSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &PathBuf) -> WispSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
            return WispSettings::default();
        }

        let figment =
            Figment::from(Serialized::defaults(WispSettings::default())).merge(Json::file(path));

        match figment.extract::<WispSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                WispSettings::default()
            }
        }
    }

    fn persist(&self, settings: &WispSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
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

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
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

fn default_agent_endpoint() -> String {
    DEFAULT_AGENT_ENDPOINT.to_string()
}

fn default_store_endpoint() -> String {
    DEFAULT_STORE_ENDPOINT.to_string()
}

fn default_conversation_poll_seconds() -> u64 {
    crate::scheduler::CONVERSATION_POLL_PERIOD.as_secs()
}

fn default_chat_list_poll_seconds() -> u64 {
    crate::scheduler::CHAT_LIST_POLL_PERIOD.as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_standard_poll_periods() {
        let settings = WispSettings::default();
        assert_eq!(settings.conversation_poll_period(), Duration::from_secs(5));
        assert_eq!(settings.chat_list_poll_period(), Duration::from_secs(30));
    }

    #[test]
    fn normalization_repairs_blank_endpoints_and_zero_periods() {
        let settings = WispSettings {
            agent_endpoint: "   ".to_string(),
            store_endpoint: "http://store.example/".to_string(),
            conversation_poll_seconds: 0,
            chat_list_poll_seconds: 0,
        }
        .normalized();

        assert_eq!(settings.agent_endpoint, DEFAULT_AGENT_ENDPOINT);
        assert_eq!(settings.store_endpoint, "http://store.example");
        assert_eq!(settings.conversation_poll_seconds, 1);
        assert_eq!(settings.chat_list_poll_seconds, 1);
    }

    #[test]
    fn missing_settings_file_yields_defaults() {
        let store = SettingsStore::new(PathBuf::from(
            "/nonexistent/wisp-settings-test/settings.json",
        ));
        assert_eq!(*store.settings(), WispSettings::default());
    }
}
