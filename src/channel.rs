use std::sync::Arc;

use log::{debug, warn};

use crate::{
    error::PluginError,
    notification::{Capability, NotificationAuthority, NotificationChannel},
    sound::SoundLibrary,
};

pub struct ChannelRegistry {
    authority: Arc<dyn NotificationAuthority>,
    sounds: SoundLibrary,
}

impl ChannelRegistry {
    pub fn new(authority: Arc<dyn NotificationAuthority>, sounds: SoundLibrary) -> Self {
        Self { authority, sounds }
    }

    /// Creates or overwrites a channel. Redefinition only affects
    /// notifications delivered afterwards.
    pub fn define(&self, mut channel: NotificationChannel) -> Result<(), PluginError> {
        if channel.id.trim().is_empty() {
            return Err(PluginError::InvalidArguments(
                "channelId must not be empty".to_string(),
            ));
        }

        if self.authority.capability() == Capability::ChannelAgnostic {
            debug!("platform has no channels, skipping {}", channel.id);
            return Ok(());
        }

        if !channel.play_sound {
            channel.sound_name = None;
        } else if let Some(name) = channel.sound_name.take() {
            if self.sounds.resolve(&name).is_some() {
                channel.sound_name = Some(name);
            } else {
                warn!(
                    "sound {name:?} for channel {} not found, using the default sound",
                    channel.id
                );
            }
        }

        if let Err(e) = self.authority.create_channel(&channel) {
            warn!("failed to create channel {}: {e:?}", channel.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tokio::sync::mpsc::unbounded_channel;

    use super::*;
    use crate::notification::{HeadlessAuthority, Importance};

    fn registry(capability: Capability, sounds: &std::path::Path) -> (ChannelRegistry, Arc<HeadlessAuthority>) {
        let (tx, _rx) = unbounded_channel();
        let authority = Arc::new(HeadlessAuthority::new(capability, tx));
        (
            ChannelRegistry::new(authority.clone(), SoundLibrary::new(sounds)),
            authority,
        )
    }

    #[test]
    fn empty_channel_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = registry(Capability::ChannelAware, dir.path());

        let channel = NotificationChannel {
            id: "  ".into(),
            ..Default::default()
        };
        assert!(matches!(
            registry.define(channel),
            Err(PluginError::InvalidArguments(_))
        ));
    }

    #[test]
    fn channel_agnostic_platform_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, authority) = registry(Capability::ChannelAgnostic, dir.path());

        registry.define(NotificationChannel::default()).unwrap();
        assert!(authority.channel(crate::notification::DEFAULT_CHANNEL_ID).is_none());
    }

    #[test]
    fn missing_sound_degrades_to_default_sound() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, authority) = registry(Capability::ChannelAware, dir.path());

        registry
            .define(NotificationChannel {
                id: "x".into(),
                importance: Importance::Max,
                sound_name: Some("nope".into()),
                ..Default::default()
            })
            .unwrap();

        let stored = authority.channel("x").unwrap();
        assert_eq!(stored.importance, Importance::Max);
        assert!(stored.play_sound);
        assert_eq!(stored.sound_name, None);
    }

    #[test]
    fn redefinition_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("loud_alarm.ogg"), b"OggS").unwrap();
        let (registry, authority) = registry(Capability::ChannelAware, dir.path());

        registry.define(NotificationChannel::default()).unwrap();
        registry
            .define(NotificationChannel {
                name: "Renamed".into(),
                ..Default::default()
            })
            .unwrap();

        let stored = authority
            .channel(crate::notification::DEFAULT_CHANNEL_ID)
            .unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.sound_name.as_deref(), Some("loud_alarm"));
    }
}
