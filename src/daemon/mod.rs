pub mod node;
pub mod plugin;
pub mod protocol;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use log::{debug, info, warn};
use tokio::{net::TcpStream, select, sync::mpsc::unbounded_channel};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::{
    alarm::AlarmClock,
    channel::ChannelRegistry,
    config::Config,
    delivery::{DeliveryHandler, TapRouter},
    notification::{DesktopAuthority, HeadlessAuthority, NotificationAuthority, NotificationChannel},
    scheduler::Scheduler,
    sound::{SoundLibrary, SoundPlayer},
};
use node::{FrameCodec, Node};
use plugin::{NotificationPlugin, Outcome};
use protocol::{Event, Message, Response};

pub const APP_NAME: &str = "Reminder Bridge";

/// The assembled service: one authority shared by the registry, scheduler and
/// delivery handler, served over a [`Node`].
pub struct Daemon {
    node: Node,
    plugin: Arc<NotificationPlugin>,
    shutdown: CancellationToken,
}

impl Daemon {
    pub async fn bind(config: &Config) -> Result<(Self, SocketAddr)> {
        let (tap_tx, tap_rx) = unbounded_channel();
        let authority: Arc<dyn NotificationAuthority> = if config.headless {
            info!("running headless ({:?})", config.headless_capability);
            Arc::new(HeadlessAuthority::new(config.headless_capability, tap_tx))
        } else {
            DesktopAuthority::start(APP_NAME, tap_tx).await?
        };

        let shutdown = CancellationToken::new();
        let (alarms, fired) = AlarmClock::new();
        let sounds = SoundPlayer::new(
            SoundLibrary::new(&config.sound.directory),
            config.sound.player.clone(),
        );
        if !sounds.is_enabled() {
            info!("no sound player configured, the platform attaches alert sounds");
        }

        let delivery = DeliveryHandler::new(
            authority.clone(),
            alarms.clone(),
            sounds.clone(),
            config.sound.policy(),
        );
        tokio::spawn(delivery.run(fired, shutdown.child_token()));

        let taps = TapRouter::new();
        tokio::spawn(taps.clone().run(tap_rx, shutdown.child_token()));

        let registry = ChannelRegistry::new(authority.clone(), sounds.library().clone());
        if config.default_channel {
            registry.define(NotificationChannel::default())?;
        }

        let plugin = NotificationPlugin::new(
            authority.clone(),
            registry,
            Scheduler::new(authority, alarms),
            taps,
        );

        let (node, addr) = Node::bind(config.listen, config.secret.as_bytes()).await?;
        let daemon = Self {
            node,
            plugin: Arc::new(plugin),
            shutdown,
        };

        Ok((daemon, addr))
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(mut self) -> Result<()> {
        let mut message_rx = self.node.listen()?;
        let codec = self.node.codec();

        loop {
            select! {
                _ = self.shutdown.cancelled() => break,
                next = message_rx.recv() => {
                    let Some((stream, message)) = next else {
                        break;
                    };

                    let plugin = self.plugin.clone();
                    let codec = codec.clone();
                    let shutdown = self.shutdown.child_token();
                    tokio::spawn(async move {
                        if let Err(e) = serve_call(plugin, codec, stream, message, shutdown).await {
                            warn!("failed to answer call: {e:?}");
                        }
                    });
                }
            }
        }

        self.shutdown.cancel();
        info!("daemon stopped");
        Ok(())
    }
}

async fn serve_call(
    plugin: Arc<NotificationPlugin>,
    codec: Arc<FrameCodec>,
    mut stream: TcpStream,
    message: Message,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut taps = match plugin.on_method_call(message).await {
        Outcome::Reply(response) => return codec.send(&mut stream, &response).await,
        Outcome::Attach(taps) => taps,
    };

    codec.send(&mut stream, &Response::success(true)).await?;
    info!("UI attached");

    loop {
        select! {
            _ = shutdown.cancelled() => break,
            next = taps.next() => match next {
                Some(Ok(tap)) => {
                    let event = Event::NotificationTapped { notify_id: tap.notify_id };
                    if codec.send(&mut stream, &event).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => debug!("subscriber lagging: {e}"),
                None => break,
            },
        }
    }

    info!("UI detached");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::Client,
        daemon::protocol::{Arguments, Method, Value},
        notification::now_millis,
    };

    async fn start() -> (Client, CancellationToken) {
        let mut config = Config {
            listen: "127.0.0.1:0".parse().unwrap(),
            headless: true,
            ..Default::default()
        };
        config.sound.player = None;

        let (daemon, addr) = Daemon::bind(&config).await.unwrap();
        let token = daemon.shutdown_token();
        tokio::spawn(daemon.run());

        (Client::new(addr, config.secret.as_bytes()), token)
    }

    #[tokio::test]
    async fn serves_calls_over_tcp() {
        let (client, shutdown) = start().await;

        assert!(client.ping().await);

        let schedule = Arguments::new()
            .with("notifyId", 9)
            .with("title", "Take pill")
            .with("scheduledTime", now_millis() + 3_600_000);
        let response = client
            .call(Message::new(Method::ScheduleNotification, schedule))
            .await
            .unwrap();
        assert_eq!(response, Response::Success(Value::Bool(true)));

        let query = Arguments::new().with("notifyId", 9);
        let response = client
            .call(Message::new(Method::GetNotificationState, query))
            .await
            .unwrap();
        assert_eq!(response, Response::success("armed"));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn overdue_call_is_delivered_right_away() {
        let (client, shutdown) = start().await;

        let show = Arguments::new().with("notifyId", 10).with("title", "now");
        client
            .call(Message::new(Method::ShowNotification, show))
            .await
            .unwrap();

        let query = Arguments::new().with("notifyId", 10);
        let mut state = Response::NotImplemented;
        for _ in 0..50 {
            state = client
                .call(Message::new(Method::GetNotificationState, query.clone()))
                .await
                .unwrap();
            if state == Response::success("delivered") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(state, Response::success("delivered"));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn wrong_secret_gets_no_answer() {
        let (client, shutdown) = start().await;
        let intruder = Client::new(client.addr(), b"not the secret");

        assert!(!intruder.ping().await);
        assert!(client.ping().await);

        shutdown.cancel();
    }
}
