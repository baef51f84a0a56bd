use std::{
    fs,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::{
    notification::{Capability, DEFAULT_SOUND_NAME},
    sound::{self, SoundPolicy},
};

pub const DEFAULT_PORT: u16 = 7823;
pub const DEFAULT_SECRET: &str = "pass";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "reminder-bridge", "reminder-bridge")
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SoundPolicyKind {
    #[default]
    Forced,
    PerNotification,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SoundConfig {
    pub directory: PathBuf,
    /// Player command, the sound file path is appended. Empty disables
    /// direct playback and lets the platform attach the sound instead.
    pub player: Option<String>,
    pub policy: SoundPolicyKind,
    /// Sound used by the `forced` policy.
    pub forced: String,
}

impl Default for SoundConfig {
    fn default() -> Self {
        let directory = project_dirs()
            .map(|dirs| dirs.data_dir().join("sounds"))
            .unwrap_or_else(|| PathBuf::from("sounds"));

        Self {
            directory,
            player: sound::default_player(),
            policy: SoundPolicyKind::default(),
            forced: DEFAULT_SOUND_NAME.to_string(),
        }
    }
}

impl SoundConfig {
    pub fn policy(&self) -> SoundPolicy {
        match self.policy {
            SoundPolicyKind::Forced => SoundPolicy::Forced(self.forced.clone()),
            SoundPolicyKind::PerNotification => SoundPolicy::PerNotification,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub listen: SocketAddr,
    pub secret: String,
    /// Log notifications instead of showing them.
    pub headless: bool,
    pub headless_capability: Capability,
    /// Define the default reminder channel at startup.
    pub default_channel: bool,
    pub sound: SoundConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            secret: DEFAULT_SECRET.to_string(),
            headless: false,
            headless_capability: Capability::default(),
            default_channel: true,
            sound: SoundConfig::default(),
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reads `path`, or the default location when it exists. No file at all
    /// means built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_all_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn partial_config_overrides_only_given_keys() {
        let config = Config::parse(
            r#"
            listen = "127.0.0.1:9000"
            headless = true
            headless_capability = "channel-agnostic"

            [sound]
            directory = "/opt/sounds"
            policy = "per-notification"
            "#,
        )
        .unwrap();

        assert_eq!(config.listen.port(), 9000);
        assert!(config.headless);
        assert_eq!(config.headless_capability, Capability::ChannelAgnostic);
        assert_eq!(config.secret, DEFAULT_SECRET);
        assert_eq!(config.sound.directory, PathBuf::from("/opt/sounds"));
        assert_eq!(config.sound.policy(), SoundPolicy::PerNotification);
        assert_eq!(config.sound.player, sound::default_player());
    }

    #[test]
    fn forced_policy_uses_configured_sound() {
        let config = Config::parse("[sound]\nforced = \"bell\"\n").unwrap();
        assert_eq!(config.sound.policy(), SoundPolicy::Forced("bell".into()));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());

        let path = dir.path().join("config.toml");
        fs::write(&path, "secret = \"hunter2\"\n").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().secret, "hunter2");
    }
}
