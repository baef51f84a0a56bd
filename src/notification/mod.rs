#[cfg(target_os = "linux")]
mod linux;

mod desktop;
mod headless;

pub use desktop::DesktopAuthority;
pub use headless::HeadlessAuthority;

use std::{
    fmt::Display,
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc::UnboundedSender, oneshot};

/// Application chosen key of a reminder.
pub type NotifyId = i32;

pub const DEFAULT_CHANNEL_ID: &str = "medicine_reminder_channel";
pub const DEFAULT_CHANNEL_NAME: &str = "Medicine Reminders";
pub const DEFAULT_CHANNEL_DESCRIPTION: &str = "Notifications for medicine reminders";
pub const DEFAULT_SOUND_NAME: &str = "loud_alarm";

/// Delay, buzz, pause, buzz (milliseconds).
pub const VIBRATION_PATTERN: [u64; 4] = [0, 500, 250, 500];

pub const ALARM_CATEGORY: &str = "alarm";

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Default,
    #[default]
    High,
    Max,
}

impl Importance {
    /// Accepts the Android importance levels the mobile side sends.
    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            3 => Some(Importance::Default),
            4 => Some(Importance::High),
            5 => Some(Importance::Max),
            _ => None,
        }
    }
}

impl FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Importance::Default),
            "high" => Ok(Importance::High),
            "max" => Ok(Importance::Max),
            other => Err(format!("unknown importance {other:?}, expected default, high or max")),
        }
    }
}

impl Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Importance::Default => write!(f, "default"),
            Importance::High => write!(f, "high"),
            Importance::Max => write!(f, "max"),
        }
    }
}

/// A presentation category. Only meaningful on channel aware platforms.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub importance: Importance,
    pub enable_vibration: bool,
    pub play_sound: bool,
    /// `None` means the platform default sound.
    pub sound_name: Option<String>,
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self {
            id: DEFAULT_CHANNEL_ID.to_string(),
            name: DEFAULT_CHANNEL_NAME.to_string(),
            description: DEFAULT_CHANNEL_DESCRIPTION.to_string(),
            importance: Importance::High,
            enable_vibration: true,
            play_sound: true,
            sound_name: Some(DEFAULT_SOUND_NAME.to_string()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScheduledNotification {
    pub notify_id: NotifyId,
    pub title: String,
    pub body: String,
    /// Epoch milliseconds. Anything not in the future fires immediately.
    pub scheduled_time: i64,
    pub channel_id: String,
    pub full_screen_intent: bool,
    pub auto_cancel: bool,
    pub badge_count: u32,
    pub sound_name: String,
}

impl ScheduledNotification {
    pub fn new(notify_id: NotifyId) -> Self {
        Self {
            notify_id,
            title: String::new(),
            body: String::new(),
            scheduled_time: now_millis(),
            channel_id: DEFAULT_CHANNEL_ID.to_string(),
            full_screen_intent: true,
            auto_cancel: false,
            badge_count: 0,
            sound_name: DEFAULT_SOUND_NAME.to_string(),
        }
    }

    pub fn due_at(&self) -> SystemTime {
        match u64::try_from(self.scheduled_time) {
            Ok(millis) => UNIX_EPOCH + Duration::from_millis(millis),
            Err(_) => UNIX_EPOCH,
        }
    }
}

/// The fixed set of platform trigger slots a single notify id owns.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Tap,
    FullScreen,
}

impl Slot {
    const FULL_SCREEN_OFFSET: i32 = 1000;

    /// Numeric handle the platform keys its deferred actions by.
    pub fn request_code(self, notify_id: NotifyId) -> i32 {
        match self {
            Slot::Tap => notify_id,
            Slot::FullScreen => notify_id.wrapping_add(Self::FULL_SCREEN_OFFSET),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub slot: Slot,
    pub request_code: i32,
}

impl Trigger {
    pub fn new(slot: Slot, notify_id: NotifyId) -> Self {
        Self {
            slot,
            request_code: slot.request_code(notify_id),
        }
    }
}

/// A fully resolved notification, ready to be posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub notify_id: NotifyId,
    pub channel_id: String,
    pub title: String,
    pub body: String,
    pub priority: Importance,
    pub category: &'static str,
    /// Lock screen visibility and vibration are carried for authorities
    /// that support them. The freedesktop server has neither hint.
    pub public: bool,
    pub vibration: Option<&'static [u64]>,
    pub badge_count: u32,
    pub auto_cancel: bool,
    /// Sound the platform should attach itself. `None` when the sound is
    /// played directly or not at all.
    pub sound: Option<String>,
    pub triggers: Vec<Trigger>,
}

impl Alert {
    pub fn trigger(&self, slot: Slot) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.slot == slot)
    }

    pub fn is_full_screen(&self) -> bool {
        self.trigger(Slot::FullScreen).is_some()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapEvent {
    pub notify_id: NotifyId,
}

pub type TapSender = UnboundedSender<TapEvent>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    #[default]
    ChannelAware,
    ChannelAgnostic,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationState {
    Unscheduled,
    Armed,
    Delivered,
}

impl NotificationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationState::Unscheduled => "unscheduled",
            NotificationState::Armed => "armed",
            NotificationState::Delivered => "delivered",
        }
    }
}

/// The process-wide platform notification authority.
///
/// Implementations own channel definitions and visible notifications, and
/// report user taps on the `TapSender` they were built with. Every method is
/// a synchronous command; `post` may block on platform I/O.
pub trait NotificationAuthority: Send + Sync + 'static {
    fn capability(&self) -> Capability;

    fn create_channel(&self, channel: &NotificationChannel) -> Result<()>;

    fn channel(&self, id: &str) -> Option<NotificationChannel>;

    /// Presents `alert`, replacing any visible notification with the same id.
    fn post(&self, alert: &Alert) -> Result<()>;

    fn withdraw(&self, notify_id: NotifyId) -> Result<()>;

    fn withdraw_all(&self) -> Result<()>;

    fn is_delivered(&self, notify_id: NotifyId) -> bool;

    fn request_authorization(&self) -> oneshot::Receiver<bool>;

    fn set_badge(&self, count: u32) -> Result<()>;
}
