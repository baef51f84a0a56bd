use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::oneshot};

#[cfg(target_os = "linux")]
use super::linux::{self, ServerSignal};
use super::{Alert, Capability, NotificationAuthority, NotificationChannel, NotifyId, TapSender};

#[cfg(target_os = "linux")]
const DEFAULT_ACTION: &str = "default";

#[derive(Debug, Clone, Copy)]
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
struct Visible {
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    server_id: u32,
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    auto_cancel: bool,
}

/// Desktop notifications through `notify-rust`.
///
/// On Linux the freedesktop server is driven directly: channels shape the
/// urgency and sound hints, the default action is reported as a tap and
/// withdrawn notifications are closed over D-Bus. Other desktops have no
/// channel concept and cannot report taps.
pub struct DesktopAuthority {
    app_name: String,
    runtime: Handle,
    channels: Mutex<HashMap<String, NotificationChannel>>,
    visible: Mutex<HashMap<NotifyId, Visible>>,
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    taps: TapSender,
    #[cfg(target_os = "linux")]
    bus: zbus::Connection,
}

impl DesktopAuthority {
    #[cfg(target_os = "linux")]
    pub async fn start(app_name: &str, taps: TapSender) -> Result<Arc<Self>> {
        use tokio::sync::mpsc::unbounded_channel;

        let bus = linux::connect()
            .await
            .context("failed to connect to the session bus")?;

        let authority = Arc::new(Self {
            app_name: app_name.to_string(),
            runtime: Handle::current(),
            channels: Mutex::new(HashMap::new()),
            visible: Mutex::new(HashMap::new()),
            taps,
            bus: bus.clone(),
        });

        let (signal_tx, mut signal_rx) = unbounded_channel();
        tokio::spawn(async move {
            if let Err(e) = linux::signal_listener(bus, signal_tx).await {
                log::error!("notification signal listener stopped: {e:?}");
            }
        });

        let weak = Arc::downgrade(&authority);
        tokio::spawn(async move {
            while let Some(signal) = signal_rx.recv().await {
                let Some(authority) = weak.upgrade() else {
                    break;
                };
                authority.on_server_signal(signal);
            }
        });

        Ok(authority)
    }

    #[cfg(not(target_os = "linux"))]
    pub async fn start(app_name: &str, taps: TapSender) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            app_name: app_name.to_string(),
            runtime: Handle::current(),
            channels: Mutex::new(HashMap::new()),
            visible: Mutex::new(HashMap::new()),
            taps,
        }))
    }

    #[cfg(target_os = "linux")]
    fn on_server_signal(&self, signal: ServerSignal) {
        match signal {
            ServerSignal::ActionInvoked { server_id, action } => {
                let notify_id = {
                    let mut visible = self.visible.lock();
                    let Some((&notify_id, entry)) =
                        visible.iter().find(|(_, v)| v.server_id == server_id)
                    else {
                        return;
                    };

                    if action != DEFAULT_ACTION {
                        debug!("ignoring action {action} on notification {notify_id}");
                        return;
                    }

                    if entry.auto_cancel {
                        visible.remove(&notify_id);
                    }
                    notify_id
                };

                if self.taps.send(super::TapEvent { notify_id }).is_err() {
                    debug!("tap on {notify_id} dropped, router is gone");
                }
            }
            ServerSignal::Closed { server_id, reason } => {
                self.visible.lock().retain(|notify_id, v| {
                    let keep = v.server_id != server_id;
                    if !keep {
                        debug!("notification {notify_id} closed by server, reason {reason}");
                    }
                    keep
                });
            }
        }
    }

    fn build(&self, alert: &Alert) -> notify_rust::Notification {
        let mut notification = notify_rust::Notification::new();
        notification
            .appname(&self.app_name)
            .summary(&alert.title)
            .body(&alert.body)
            .timeout(if alert.is_full_screen() {
                notify_rust::Timeout::Never
            } else {
                notify_rust::Timeout::Default
            });

        if let Some(sound) = &alert.sound {
            notification.sound_name(sound);
        }

        #[cfg(target_os = "linux")]
        {
            use notify_rust::Hint;

            notification
                .icon("appointment-soon")
                .urgency(urgency(alert))
                .hint(Hint::Category(alert.category.to_string()))
                .hint(Hint::Resident(!alert.auto_cancel))
                .action(DEFAULT_ACTION, "Open");

            if alert.sound.is_none() {
                notification.hint(Hint::SuppressSound(true));
            }

            if alert.badge_count > 0 {
                let count = i32::try_from(alert.badge_count).unwrap_or(i32::MAX);
                notification.hint(Hint::CustomInt("x-badge-count".to_string(), count));
            }

            if let Some(previous) = self.visible.lock().get(&alert.notify_id) {
                notification.id(previous.server_id);
            }
        }

        notification
    }

    #[cfg(target_os = "linux")]
    fn close(&self, notify_id: NotifyId, server_id: u32) {
        let bus = self.bus.clone();
        self.runtime.spawn(async move {
            if let Err(e) = linux::close_notification(&bus, server_id).await {
                warn!("failed to close notification {notify_id}: {e:?}");
            }
        });
    }

    #[cfg(not(target_os = "linux"))]
    fn close(&self, notify_id: NotifyId, _server_id: u32) {
        debug!("notification {notify_id} cannot be withdrawn on this platform");
    }
}

#[cfg(target_os = "linux")]
fn urgency(alert: &Alert) -> notify_rust::Urgency {
    use super::Importance;
    use notify_rust::Urgency;

    if alert.is_full_screen() {
        return Urgency::Critical;
    }

    match alert.priority {
        Importance::Default => Urgency::Low,
        Importance::High => Urgency::Normal,
        Importance::Max => Urgency::Critical,
    }
}

impl NotificationAuthority for DesktopAuthority {
    /// Only the freedesktop server reports closes and taps. Elsewhere posted
    /// notifications are fire and forget: they never read as delivered and
    /// cannot be withdrawn.
    fn capability(&self) -> Capability {
        if cfg!(target_os = "linux") {
            Capability::ChannelAware
        } else {
            Capability::ChannelAgnostic
        }
    }

    fn create_channel(&self, channel: &NotificationChannel) -> Result<()> {
        self.channels
            .lock()
            .insert(channel.id.clone(), channel.clone());
        Ok(())
    }

    fn channel(&self, id: &str) -> Option<NotificationChannel> {
        self.channels.lock().get(id).cloned()
    }

    fn post(&self, alert: &Alert) -> Result<()> {
        let notification = self.build(alert);

        #[cfg(target_os = "linux")]
        {
            let server_id = notification
                .show()
                .with_context(|| format!("failed to show notification {}", alert.notify_id))?
                .id();

            self.visible.lock().insert(
                alert.notify_id,
                Visible {
                    server_id,
                    auto_cancel: alert.auto_cancel,
                },
            );
        }

        // no close signal arrives here, so visibility is not tracked at all
        #[cfg(not(target_os = "linux"))]
        let _ = notification
            .show()
            .with_context(|| format!("failed to show notification {}", alert.notify_id))?;

        Ok(())
    }

    fn withdraw(&self, notify_id: NotifyId) -> Result<()> {
        let removed = self.visible.lock().remove(&notify_id);
        if let Some(visible) = removed {
            self.close(notify_id, visible.server_id);
        }
        Ok(())
    }

    fn withdraw_all(&self) -> Result<()> {
        let drained: Vec<_> = self.visible.lock().drain().collect();
        for (notify_id, visible) in drained {
            self.close(notify_id, visible.server_id);
        }
        Ok(())
    }

    fn is_delivered(&self, notify_id: NotifyId) -> bool {
        self.visible.lock().contains_key(&notify_id)
    }

    fn request_authorization(&self) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.runtime.spawn_blocking(move || {
            #[cfg(target_os = "linux")]
            let granted = match notify_rust::get_server_information() {
                Ok(info) => {
                    log::info!("notification server {} {}", info.name, info.version);
                    true
                }
                Err(e) => {
                    warn!("no notification server available: {e}");
                    false
                }
            };

            #[cfg(not(target_os = "linux"))]
            let granted = true;

            let _ = tx.send(granted);
        });
        rx
    }

    fn set_badge(&self, count: u32) -> Result<()> {
        debug!("desktop has no application badge, ignoring count {count}");
        Ok(())
    }
}
