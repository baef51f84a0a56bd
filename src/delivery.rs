use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::{
    select,
    sync::{broadcast, mpsc::UnboundedReceiver},
};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::{
    alarm::{AlarmClock, Fired},
    notification::{
        ALARM_CATEGORY, Alert, Capability, Importance, NotificationAuthority,
        ScheduledNotification, Slot, TapEvent, Trigger, VIBRATION_PATTERN,
    },
    sound::{SoundPlayer, SoundPolicy},
};

/// Turns fired alarms into visible notifications.
pub struct DeliveryHandler {
    authority: Arc<dyn NotificationAuthority>,
    alarms: AlarmClock,
    sounds: SoundPlayer,
    policy: SoundPolicy,
}

impl DeliveryHandler {
    pub fn new(
        authority: Arc<dyn NotificationAuthority>,
        alarms: AlarmClock,
        sounds: SoundPlayer,
        policy: SoundPolicy,
    ) -> Self {
        Self {
            authority,
            alarms,
            sounds,
            policy,
        }
    }

    pub fn alert_for(&self, notification: &ScheduledNotification) -> Alert {
        let channel = match self.authority.capability() {
            Capability::ChannelAware => self.authority.channel(&notification.channel_id),
            Capability::ChannelAgnostic => None,
        };

        let priority = channel
            .as_ref()
            .map_or(Importance::Max, |c| c.importance);
        let vibration = channel
            .as_ref()
            .is_none_or(|c| c.enable_vibration)
            .then_some(&VIBRATION_PATTERN[..]);

        // a directly played sound replaces the one the platform would attach
        let sound = if self.sounds.is_enabled() || channel.as_ref().is_some_and(|c| !c.play_sound) {
            None
        } else {
            Some(self.policy.select(&notification.sound_name).to_string())
        };

        let mut triggers = vec![Trigger::new(Slot::Tap, notification.notify_id)];
        if notification.full_screen_intent {
            triggers.push(Trigger::new(Slot::FullScreen, notification.notify_id));
        }

        Alert {
            notify_id: notification.notify_id,
            channel_id: notification.channel_id.clone(),
            title: notification.title.clone(),
            body: notification.body.clone(),
            priority,
            category: ALARM_CATEGORY,
            public: true,
            vibration,
            badge_count: notification.badge_count,
            auto_cancel: notification.auto_cancel,
            sound,
            triggers,
        }
    }

    /// Plays the sound and posts the notification. Neither step can stop the
    /// other, but a cancel landing before the post stops both.
    pub async fn deliver(&self, fired: Fired) {
        let notify_id = fired.payload.notify_id;
        if !self.alarms.is_live(&fired) {
            debug!("notification {notify_id} was cancelled after firing");
            return;
        }

        if self.sounds.is_enabled() {
            let name = self.policy.select(&fired.payload.sound_name);
            if let Err(e) = self.sounds.play(name) {
                warn!("notification {notify_id} delivered without sound: {e:?}");
            }
        }

        let alert = self.alert_for(&fired.payload);
        let authority = self.authority.clone();
        let alarms = self.alarms.clone();
        let posted = tokio::task::spawn_blocking(move || {
            alarms.complete(&fired, |_| authority.post(&alert))
        });
        match posted.await {
            Ok(Some(Ok(()))) => info!("delivered notification {notify_id}"),
            Ok(Some(Err(e))) => error!("failed to post notification {notify_id}: {e:?}"),
            Ok(None) => debug!("notification {notify_id} was cancelled before it was shown"),
            Err(e) => error!("posting notification {notify_id} panicked: {e}"),
        }
    }

    pub async fn run(
        self,
        mut fired: UnboundedReceiver<Fired>,
        shutdown: CancellationToken,
    ) {
        loop {
            select! {
                _ = shutdown.cancelled() => break,
                next = fired.recv() => match next {
                    Some(next) => self.deliver(next).await,
                    None => break,
                },
            }
        }
        debug!("delivery handler stopped");
    }
}

/// Forwards taps to the attached UI layer. Without one they are dropped.
#[derive(Clone)]
pub struct TapRouter {
    attached: broadcast::Sender<TapEvent>,
}

impl Default for TapRouter {
    fn default() -> Self {
        let (attached, _) = broadcast::channel(16);
        Self { attached }
    }
}

impl TapRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self) -> BroadcastStream<TapEvent> {
        BroadcastStream::new(self.attached.subscribe())
    }

    pub fn is_attached(&self) -> bool {
        self.attached.receiver_count() > 0
    }

    pub fn route(&self, event: TapEvent) -> bool {
        if !self.is_attached() {
            debug!("notification {} tapped with no UI attached", event.notify_id);
            return false;
        }

        // a subscriber may detach between the check and the send
        match self.attached.send(event) {
            Ok(receivers) => {
                info!("notification {} tapped, {receivers} listener(s)", event.notify_id);
                true
            }
            Err(_) => false,
        }
    }

    pub async fn run(self, mut taps: UnboundedReceiver<TapEvent>, shutdown: CancellationToken) {
        loop {
            select! {
                _ = shutdown.cancelled() => break,
                next = taps.recv() => match next {
                    Some(event) => {
                        self.route(event);
                    }
                    None => break,
                },
            }
        }
    }
}
