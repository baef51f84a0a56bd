use std::sync::Arc;

use log::{debug, warn};
use tokio_stream::wrappers::BroadcastStream;

use super::protocol::{Arguments, Message, Method, Response, Value};
use crate::{
    channel::ChannelRegistry,
    delivery::TapRouter,
    error::PluginError,
    notification::{
        DEFAULT_CHANNEL_DESCRIPTION, DEFAULT_CHANNEL_ID, DEFAULT_CHANNEL_NAME,
        DEFAULT_SOUND_NAME, Importance, NotificationAuthority, NotificationChannel, NotifyId,
        ScheduledNotification, TapEvent, now_millis,
    },
    scheduler::Scheduler,
};

/// What the connection handler does after a call.
pub enum Outcome {
    Reply(Response),
    /// Reply with success, then keep pushing taps down the connection.
    Attach(BroadcastStream<TapEvent>),
}

/// The method channel handler: translates named calls into registry and
/// scheduler operations.
pub struct NotificationPlugin {
    authority: Arc<dyn NotificationAuthority>,
    registry: ChannelRegistry,
    scheduler: Scheduler,
    taps: TapRouter,
}

impl NotificationPlugin {
    pub fn new(
        authority: Arc<dyn NotificationAuthority>,
        registry: ChannelRegistry,
        scheduler: Scheduler,
        taps: TapRouter,
    ) -> Self {
        Self {
            authority,
            registry,
            scheduler,
            taps,
        }
    }

    pub async fn on_method_call(&self, message: Message) -> Outcome {
        debug!("method call {}", message.method);
        match self.dispatch(&message).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{} failed: {e}", message.method);
                Outcome::Reply(e.into())
            }
        }
    }

    async fn dispatch(&self, message: &Message) -> Result<Outcome, PluginError> {
        let Some(method) = Method::from_name(&message.method) else {
            return Err(PluginError::NotImplemented(message.method.clone()));
        };
        let args = &message.arguments;

        let value = match method {
            Method::CreateNotificationChannel => {
                self.registry.define(channel_from(args)?)?;
                Value::Bool(true)
            }
            Method::ScheduleNotification => {
                self.scheduler.schedule(notification_from(args)?);
                Value::Bool(true)
            }
            Method::ShowNotification => {
                self.scheduler.show_now(notification_from(args)?);
                Value::Bool(true)
            }
            Method::CancelNotification => {
                self.scheduler.cancel(notify_id_from(args)?);
                Value::Bool(true)
            }
            Method::CancelAllNotifications => {
                self.scheduler.cancel_all();
                Value::Bool(true)
            }
            Method::RequestPermissions => {
                let granted = self.authority.request_authorization().await.unwrap_or(false);
                Value::Bool(granted)
            }
            Method::InitializeNotifications => {
                let granted = self.authority.request_authorization().await.map_err(|_| {
                    PluginError::Notification("authorization request was abandoned".to_string())
                })?;
                Value::Bool(granted)
            }
            Method::SetBadgeCount => {
                let count = non_negative(args, "count")?.unwrap_or(0);
                self.authority
                    .set_badge(count)
                    .map_err(|e| PluginError::Notification(e.to_string()))?;
                Value::Bool(true)
            }
            Method::GetNotificationState => {
                let state = self.scheduler.state(notify_id_from(args)?);
                Value::Str(state.as_str().to_string())
            }
            Method::Subscribe => return Ok(Outcome::Attach(self.taps.attach())),
            Method::Ping => Value::Str("pong".to_string()),
        };

        Ok(Outcome::Reply(Response::Success(value)))
    }
}

fn notify_id_from(args: &Arguments) -> Result<NotifyId, PluginError> {
    let raw = args.int("notifyId")?.unwrap_or(0);
    NotifyId::try_from(raw)
        .map_err(|_| PluginError::InvalidArguments(format!("notifyId {raw} is out of range")))
}

fn non_negative(args: &Arguments, key: &str) -> Result<Option<u32>, PluginError> {
    args.int(key)?
        .map(|raw| {
            u32::try_from(raw).map_err(|_| {
                PluginError::InvalidArguments(format!("{key} must be a non-negative count, got {raw}"))
            })
        })
        .transpose()
}

fn importance_from(args: &Arguments) -> Result<Importance, PluginError> {
    match args.get("importance") {
        None => Ok(Importance::High),
        Some(Value::Int(level)) => Importance::from_level(*level).ok_or_else(|| {
            PluginError::InvalidArguments(format!("unsupported importance level {level}"))
        }),
        Some(Value::Str(name)) => name.parse().map_err(PluginError::InvalidArguments),
        Some(_) => Err(PluginError::InvalidArguments(
            "importance must be a level or a name".to_string(),
        )),
    }
}

pub fn channel_from(args: &Arguments) -> Result<NotificationChannel, PluginError> {
    Ok(NotificationChannel {
        id: args
            .string("channelId")?
            .unwrap_or_else(|| DEFAULT_CHANNEL_ID.to_string()),
        name: args
            .string("channelName")?
            .unwrap_or_else(|| DEFAULT_CHANNEL_NAME.to_string()),
        description: args
            .string("channelDescription")?
            .unwrap_or_else(|| DEFAULT_CHANNEL_DESCRIPTION.to_string()),
        importance: importance_from(args)?,
        enable_vibration: args.boolean("enableVibration")?.unwrap_or(true),
        play_sound: args.boolean("playSound")?.unwrap_or(true),
        sound_name: Some(
            args.string("soundName")?
                .unwrap_or_else(|| DEFAULT_SOUND_NAME.to_string()),
        ),
    })
}

pub fn notification_from(args: &Arguments) -> Result<ScheduledNotification, PluginError> {
    Ok(ScheduledNotification {
        notify_id: notify_id_from(args)?,
        title: args.string("title")?.unwrap_or_default(),
        body: args.string("body")?.unwrap_or_default(),
        scheduled_time: args.int("scheduledTime")?.unwrap_or_else(now_millis),
        channel_id: args
            .string("channelId")?
            .unwrap_or_else(|| DEFAULT_CHANNEL_ID.to_string()),
        full_screen_intent: args.boolean("fullScreenIntent")?.unwrap_or(true),
        auto_cancel: args.boolean("autoCancel")?.unwrap_or(false),
        badge_count: non_negative(args, "badgeCount")?.unwrap_or(0),
        sound_name: args
            .string("soundName")?
            .unwrap_or_else(|| DEFAULT_SOUND_NAME.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::unbounded_channel;
    use tokio_stream::StreamExt;

    use super::*;
    use crate::{
        alarm::AlarmClock,
        notification::{Capability, HeadlessAuthority},
        sound::SoundLibrary,
    };

    fn plugin(authority: HeadlessAuthority) -> (NotificationPlugin, Arc<HeadlessAuthority>, TapRouter) {
        let authority = Arc::new(authority);
        let (alarms, _fired) = AlarmClock::new();
        let taps = TapRouter::new();
        let plugin = NotificationPlugin::new(
            authority.clone(),
            ChannelRegistry::new(authority.clone(), SoundLibrary::new(std::env::temp_dir())),
            Scheduler::new(authority.clone(), alarms),
            taps.clone(),
        );
        (plugin, authority, taps)
    }

    fn headless() -> HeadlessAuthority {
        let (tx, _rx) = unbounded_channel();
        HeadlessAuthority::new(Capability::ChannelAware, tx)
    }

    async fn call(plugin: &NotificationPlugin, method: &str, args: Arguments) -> Response {
        let message = Message {
            method: method.to_string(),
            arguments: args,
        };
        match plugin.on_method_call(message).await {
            Outcome::Reply(response) => response,
            Outcome::Attach(_) => panic!("unexpected subscription"),
        }
    }

    #[test]
    fn schedule_arguments_fall_back_to_defaults() {
        let n = notification_from(&Arguments::new()).unwrap();
        assert_eq!(n.notify_id, 0);
        assert_eq!(n.title, "");
        assert_eq!(n.channel_id, DEFAULT_CHANNEL_ID);
        assert!(n.full_screen_intent);
        assert!(!n.auto_cancel);
        assert_eq!(n.badge_count, 0);
        assert_eq!(n.sound_name, DEFAULT_SOUND_NAME);
        assert!((n.scheduled_time - now_millis()).abs() < 5_000);
    }

    #[test]
    fn bad_arguments_are_rejected() {
        let negative = Arguments::new().with("badgeCount", -1);
        assert!(matches!(notification_from(&negative), Err(PluginError::InvalidArguments(_))));

        let too_big = Arguments::new().with("notifyId", i64::MAX);
        assert!(matches!(notification_from(&too_big), Err(PluginError::InvalidArguments(_))));

        let wrong_type = Arguments::new().with("fullScreenIntent", "yes");
        assert!(matches!(notification_from(&wrong_type), Err(PluginError::InvalidArguments(_))));
    }

    #[test]
    fn importance_accepts_levels_and_names() {
        let by_level = channel_from(&Arguments::new().with("importance", 5)).unwrap();
        assert_eq!(by_level.importance, Importance::Max);

        let by_name = channel_from(&Arguments::new().with("importance", "default")).unwrap();
        assert_eq!(by_name.importance, Importance::Default);

        assert!(channel_from(&Arguments::new().with("importance", 9)).is_err());
        assert_eq!(channel_from(&Arguments::new()).unwrap().importance, Importance::High);
    }

    #[tokio::test]
    async fn schedule_then_cancel_round_trip() {
        let (plugin, _, _) = plugin(headless());

        let args = Arguments::new()
            .with("notifyId", 42)
            .with("title", "Take pill")
            .with("scheduledTime", now_millis() + 3_600_000);
        assert_eq!(call(&plugin, "scheduleNotification", args).await, Response::success(true));

        let query = Arguments::new().with("notifyId", 42);
        assert_eq!(
            call(&plugin, "getNotificationState", query.clone()).await,
            Response::success("armed")
        );

        assert_eq!(call(&plugin, "cancelNotification", query.clone()).await, Response::success(true));
        assert_eq!(
            call(&plugin, "getNotificationState", query).await,
            Response::success("unscheduled")
        );
        assert_eq!(call(&plugin, "cancelAllNotifications", Arguments::new()).await, Response::success(true));
    }

    #[tokio::test]
    async fn invalid_arguments_abort_before_arming() {
        let (plugin, _, _) = plugin(headless());

        let args = Arguments::new().with("notifyId", 5).with("badgeCount", "three");
        let response = call(&plugin, "scheduleNotification", args).await;
        assert!(matches!(response, Response::Error { ref code, .. } if code == "INVALID_ARGS"));

        let query = Arguments::new().with("notifyId", 5);
        assert_eq!(
            call(&plugin, "getNotificationState", query).await,
            Response::success("unscheduled")
        );
    }

    #[tokio::test]
    async fn unknown_methods_are_not_implemented() {
        let (plugin, _, _) = plugin(headless());
        assert_eq!(
            call(&plugin, "setAlarmVolume", Arguments::new()).await,
            Response::NotImplemented
        );
    }

    #[tokio::test]
    async fn permission_denial_is_false_not_an_error() {
        let (plugin, _, _) = plugin(headless().deny_authorization());
        assert_eq!(
            call(&plugin, "requestPermissions", Arguments::new()).await,
            Response::success(false)
        );
        assert_eq!(
            call(&plugin, "initializeNotifications", Arguments::new()).await,
            Response::success(false)
        );
    }

    #[tokio::test]
    async fn channel_and_badge_calls_reach_the_authority() {
        let (plugin, authority, _) = plugin(headless());

        let args = Arguments::new().with("channelId", "x").with("importance", 5);
        assert_eq!(call(&plugin, "createNotificationChannel", args).await, Response::success(true));
        assert_eq!(authority.channel("x").unwrap().importance, Importance::Max);

        let empty = Arguments::new().with("channelId", "");
        assert!(!call(&plugin, "createNotificationChannel", empty).await.is_success());

        let badge = Arguments::new().with("count", 4);
        assert_eq!(call(&plugin, "setBadgeCount", badge).await, Response::success(true));
        assert_eq!(authority.badge(), 4);
    }

    #[tokio::test]
    async fn subscribe_attaches_to_taps() {
        let (plugin, _, taps) = plugin(headless());

        let message = Message::new(Method::Subscribe, Arguments::new());
        let Outcome::Attach(mut stream) = plugin.on_method_call(message).await else {
            panic!("expected a subscription");
        };

        assert!(taps.route(TapEvent { notify_id: 42 }));
        assert_eq!(stream.next().await.unwrap().unwrap(), TapEvent { notify_id: 42 });
    }
}
