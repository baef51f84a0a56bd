use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use log::{debug, info};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::{
    Alert, Capability, NotificationAuthority, NotificationChannel, NotifyId, TapSender,
};

#[derive(Default)]
struct HeadlessState {
    channels: HashMap<String, NotificationChannel>,
    delivered: BTreeMap<NotifyId, Alert>,
    posts: usize,
    badge: u32,
}

/// Authority without a display. Everything it would show is logged and kept
/// in memory. Nobody can tap a notification that is never shown, so a
/// headless daemon emits no taps; tests drive them through `tap`.
pub struct HeadlessAuthority {
    capability: Capability,
    granted: bool,
    state: Mutex<HeadlessState>,
    #[cfg_attr(not(test), allow(dead_code))]
    taps: TapSender,
}

impl HeadlessAuthority {
    pub fn new(capability: Capability, taps: TapSender) -> Self {
        Self {
            capability,
            granted: true,
            state: Mutex::new(HeadlessState::default()),
            taps,
        }
    }
}

/// Simulated user interaction and inspection.
#[cfg(test)]
impl HeadlessAuthority {
    pub fn deny_authorization(mut self) -> Self {
        self.granted = false;
        self
    }

    pub fn delivered(&self, notify_id: NotifyId) -> Option<Alert> {
        self.state.lock().delivered.get(&notify_id).cloned()
    }

    pub fn delivered_ids(&self) -> Vec<NotifyId> {
        self.state.lock().delivered.keys().copied().collect()
    }

    /// Number of notifications posted so far, replacements included.
    pub fn posts(&self) -> usize {
        self.state.lock().posts
    }

    pub fn badge(&self) -> u32 {
        self.state.lock().badge
    }

    /// Simulates the user tapping a visible notification.
    pub fn tap(&self, notify_id: NotifyId) -> bool {
        {
            let mut state = self.state.lock();
            let Some(alert) = state.delivered.get(&notify_id) else {
                return false;
            };

            if alert.auto_cancel {
                state.delivered.remove(&notify_id);
            }
        }

        self.taps.send(super::TapEvent { notify_id }).is_ok()
    }

    /// Simulates the user swiping a notification away.
    pub fn dismiss(&self, notify_id: NotifyId) -> bool {
        self.state.lock().delivered.remove(&notify_id).is_some()
    }
}

impl NotificationAuthority for HeadlessAuthority {
    fn capability(&self) -> Capability {
        self.capability
    }

    fn create_channel(&self, channel: &NotificationChannel) -> Result<()> {
        debug!("headless channel {} ({})", channel.id, channel.importance);
        self.state
            .lock()
            .channels
            .insert(channel.id.clone(), channel.clone());
        Ok(())
    }

    fn channel(&self, id: &str) -> Option<NotificationChannel> {
        self.state.lock().channels.get(id).cloned()
    }

    fn post(&self, alert: &Alert) -> Result<()> {
        info!(
            "notification {} [{}] {}: {} (badge {}, full screen {})",
            alert.notify_id,
            alert.priority,
            alert.title,
            alert.body,
            alert.badge_count,
            alert.is_full_screen()
        );
        let mut state = self.state.lock();
        state.posts += 1;
        state.delivered.insert(alert.notify_id, alert.clone());
        Ok(())
    }

    fn withdraw(&self, notify_id: NotifyId) -> Result<()> {
        self.state.lock().delivered.remove(&notify_id);
        Ok(())
    }

    fn withdraw_all(&self) -> Result<()> {
        self.state.lock().delivered.clear();
        Ok(())
    }

    fn is_delivered(&self, notify_id: NotifyId) -> bool {
        self.state.lock().delivered.contains_key(&notify_id)
    }

    fn request_authorization(&self) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(self.granted);
        rx
    }

    fn set_badge(&self, count: u32) -> Result<()> {
        self.state.lock().badge = count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;
    use crate::notification::{Importance, Slot, TapEvent, Trigger};

    fn alert(notify_id: NotifyId, auto_cancel: bool) -> Alert {
        Alert {
            notify_id,
            channel_id: "x".into(),
            title: "Take pill".into(),
            body: "Dose A".into(),
            priority: Importance::Max,
            category: crate::notification::ALARM_CATEGORY,
            public: true,
            vibration: None,
            badge_count: 0,
            auto_cancel,
            sound: None,
            triggers: vec![Trigger::new(Slot::Tap, notify_id)],
        }
    }

    #[test]
    fn tap_emits_event_and_honours_auto_cancel() {
        let (tx, mut rx) = unbounded_channel();
        let authority = HeadlessAuthority::new(Capability::ChannelAware, tx);

        authority.post(&alert(1, false)).unwrap();
        authority.post(&alert(2, true)).unwrap();

        assert!(authority.tap(1));
        assert!(authority.tap(2));
        assert!(!authority.tap(3));

        assert_eq!(rx.try_recv().unwrap(), TapEvent { notify_id: 1 });
        assert_eq!(rx.try_recv().unwrap(), TapEvent { notify_id: 2 });
        assert!(authority.is_delivered(1));
        assert!(!authority.is_delivered(2));
    }

    #[tokio::test]
    async fn denied_authorization_resolves_false() {
        let (tx, _rx) = unbounded_channel();
        let authority = HeadlessAuthority::new(Capability::ChannelAgnostic, tx).deny_authorization();
        assert!(!authority.request_authorization().await.unwrap());
    }
}
