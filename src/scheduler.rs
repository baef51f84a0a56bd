use std::sync::Arc;

use log::{info, warn};

use crate::{
    alarm::AlarmClock,
    notification::{
        NotificationAuthority, NotificationState, NotifyId, ScheduledNotification, now_millis,
    },
};

/// Arms and disarms reminders. Holds no state of its own: the alarm clock
/// and the authority are asked every time.
pub struct Scheduler {
    authority: Arc<dyn NotificationAuthority>,
    alarms: AlarmClock,
}

impl Scheduler {
    pub fn new(authority: Arc<dyn NotificationAuthority>, alarms: AlarmClock) -> Self {
        Self { authority, alarms }
    }

    pub fn schedule(&self, notification: ScheduledNotification) {
        let delay = notification.scheduled_time.saturating_sub(now_millis());
        if delay > 0 {
            info!(
                "arming notification {} in {}s",
                notification.notify_id,
                delay / 1000
            );
        } else {
            info!("notification {} is due, firing now", notification.notify_id);
        }
        self.alarms.set_exact(notification);
    }

    pub fn show_now(&self, mut notification: ScheduledNotification) {
        notification.scheduled_time = now_millis();
        self.schedule(notification);
    }

    pub fn cancel(&self, notify_id: NotifyId) {
        if self.alarms.cancel(notify_id) {
            info!("disarmed notification {notify_id}");
        }

        if let Err(e) = self.authority.withdraw(notify_id) {
            warn!("failed to withdraw notification {notify_id}: {e:?}");
        }
    }

    pub fn cancel_all(&self) {
        let disarmed = self.alarms.cancel_all();
        info!("disarmed {disarmed} notifications");

        if let Err(e) = self.authority.withdraw_all() {
            warn!("failed to withdraw notifications: {e:?}");
        }
    }

    pub fn state(&self, notify_id: NotifyId) -> NotificationState {
        if self.alarms.is_armed(notify_id) {
            NotificationState::Armed
        } else if self.authority.is_delivered(notify_id) {
            NotificationState::Delivered
        } else {
            NotificationState::Unscheduled
        }
    }
}
