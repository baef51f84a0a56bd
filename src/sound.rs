use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{Context, Result, anyhow};
use log::debug;
use tokio::process::Command;

const EXTENSIONS: [&str; 4] = ["ogg", "oga", "wav", "mp3"];

/// Which sound a fired alarm plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundPolicy {
    /// Always play this sound, whatever the reminder asked for.
    Forced(String),
    PerNotification,
}

impl Default for SoundPolicy {
    fn default() -> Self {
        SoundPolicy::Forced(crate::notification::DEFAULT_SOUND_NAME.to_string())
    }
}

impl SoundPolicy {
    pub fn select<'a>(&'a self, requested: &'a str) -> &'a str {
        match self {
            SoundPolicy::Forced(name) => name.as_str(),
            SoundPolicy::PerNotification => requested,
        }
    }
}

/// Sound resources by bare name, e.g. `loud_alarm` -> `<dir>/loud_alarm.ogg`.
#[derive(Debug, Clone)]
pub struct SoundLibrary {
    dir: PathBuf,
}

impl SoundLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return None;
        }

        let exact = self.dir.join(name);
        if Path::new(name).extension().is_some() && exact.is_file() {
            return Some(exact);
        }

        EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{name}.{ext}")))
            .find(|path| path.is_file())
    }
}

/// Plays alert sounds by spawning an external player on the resolved file.
#[derive(Debug, Clone)]
pub struct SoundPlayer {
    library: SoundLibrary,
    command: Option<String>,
}

impl SoundPlayer {
    pub fn new(library: SoundLibrary, command: Option<String>) -> Self {
        let command = command.filter(|c| !c.trim().is_empty());
        Self { library, command }
    }

    pub fn library(&self) -> &SoundLibrary {
        &self.library
    }

    pub fn is_enabled(&self) -> bool {
        self.command.is_some()
    }

    /// Starts playback and returns without waiting for it to finish.
    pub fn play(&self, name: &str) -> Result<()> {
        let command = self
            .command
            .as_deref()
            .ok_or_else(|| anyhow!("no sound player configured"))?;
        let path = self.library.resolve(name).ok_or_else(|| {
            anyhow!(
                "sound {name:?} not found in {}",
                self.library.dir().display()
            )
        })?;

        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| anyhow!("empty player command"))?;
        let mut child = Command::new(program)
            .args(parts)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start sound player {program}"))?;

        debug!("playing {}", path.display());
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => debug!("sound player exited with {status}"),
                Err(e) => debug!("sound player wait failed: {e}"),
                _ => {}
            }
        });
        Ok(())
    }
}

pub fn default_player() -> Option<String> {
    if cfg!(target_os = "linux") {
        Some("paplay".to_string())
    } else if cfg!(target_os = "macos") {
        Some("afplay".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn resolves_bare_names_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("loud_alarm.wav"), b"RIFF").unwrap();
        fs::write(dir.path().join("chime.mp3"), b"ID3").unwrap();

        let library = SoundLibrary::new(dir.path());
        assert_eq!(
            library.resolve("loud_alarm"),
            Some(dir.path().join("loud_alarm.wav"))
        );
        assert_eq!(
            library.resolve("chime.mp3"),
            Some(dir.path().join("chime.mp3"))
        );
        assert_eq!(library.resolve("missing"), None);
        assert_eq!(library.resolve("../loud_alarm"), None);
    }

    #[test]
    fn forced_policy_overrides_requested_sound() {
        let forced = SoundPolicy::default();
        assert_eq!(forced.select("chime"), "loud_alarm");
        assert_eq!(SoundPolicy::PerNotification.select("chime"), "chime");
    }

    #[tokio::test]
    async fn missing_sound_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let player = SoundPlayer::new(SoundLibrary::new(dir.path()), Some("true".into()));
        assert!(player.play("loud_alarm").is_err());

        let silent = SoundPlayer::new(SoundLibrary::new(dir.path()), Some("  ".into()));
        assert!(!silent.is_enabled());
        assert!(silent.play("loud_alarm").is_err());
    }
}
