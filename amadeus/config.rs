use crate::error::App;
use amadeus_protocol::Framing;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub peer: PeerConfig,
    pub player: PlayerConfig,
}

/// Where practice commands are sent.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PeerConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub framing: Framing,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Open dialog filter, `;` separated wildcards.
    pub file_patterns: String,
    pub open_timeout_ms: u64,
    /// GStreamer sink element that plays the decoded audio.
    pub audio_sink: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            peer: PeerConfig::default(),
            player: PlayerConfig::default(),
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            connect_timeout_ms: 10_000,
            framing: Framing::Raw,
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            file_patterns: "*.wav;*.mp3".to_string(),
            open_timeout_ms: 5_000,
            audio_sink: "autoaudiosink".to_string(),
        }
    }
}

impl PeerConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl PlayerConfig {
    #[must_use]
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

impl Config {
    /// Reads the config file, writing the defaults first when it does not exist.
    ///
    /// Runs before the logger is up, so it reports whether the file was
    /// created instead of logging it.
    pub async fn load_or_create(path: &Path) -> Result<(Self, bool), App> {
        let created = !path.exists();
        if created {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).await?;
            }
            fs::write(path, toml::to_string(&Config::default())?).await?;
        }
        let content = fs::read_to_string(path).await?;
        if content.trim().is_empty() {
            return Ok((Config::default(), created));
        }
        Ok((toml::from_str(&content)?, created))
    }
}
