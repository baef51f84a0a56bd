use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use client::Client;
use config::Config;
use daemon::{
    Daemon,
    protocol::{Arguments, Event, Message, Method, Response, Value},
};
use log::info;
use notification::{Capability, Importance, now_millis};
use tracing_subscriber::EnvFilter;

mod alarm;
mod channel;
mod client;
mod config;
mod daemon;
mod delivery;
mod error;
mod notification;
mod scheduler;
mod sound;

#[derive(Parser)]
#[command(name = "reminder-bridge", version)]
#[command(about = "Schedules alarm-style reminder notifications")]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true, env = "REMINDER_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Daemon address, overrides the config file
    #[arg(long, global = true, env = "REMINDER_BRIDGE_LISTEN")]
    listen: Option<SocketAddr>,

    /// Shared secret sealing the method channel
    #[arg(long, global = true, env = "REMINDER_BRIDGE_SECRET", hide_env_values = true)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the notification daemon
    Serve {
        /// Log notifications instead of showing them
        #[arg(long)]
        headless: bool,
        /// Treat the headless platform as having no channels
        #[arg(long, requires = "headless")]
        no_channels: bool,
    },
    /// Define a notification channel
    Channel(ChannelArgs),
    /// Schedule a reminder
    Schedule(ScheduleArgs),
    /// Show a reminder right away
    Show(ContentArgs),
    /// Cancel a reminder, pending or visible
    Cancel { notify_id: i32 },
    /// Cancel every reminder
    CancelAll,
    /// Ask for permission to post notifications
    Permissions,
    /// Set the application badge
    Badge { count: u32 },
    /// Show whether a reminder is armed, delivered or unscheduled
    Status { notify_id: i32 },
    /// Attach as the UI and print tapped reminders
    Watch,
    /// Check that the daemon answers
    Ping,
}

#[derive(Args)]
struct ChannelArgs {
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// default, high or max
    #[arg(long)]
    importance: Option<Importance>,
    #[arg(long)]
    no_vibration: bool,
    #[arg(long)]
    no_sound: bool,
    #[arg(long)]
    sound: Option<String>,
}

#[derive(Args)]
struct ContentArgs {
    notify_id: i32,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    body: Option<String>,
    #[arg(long)]
    channel: Option<String>,
    /// Do not request full screen presentation
    #[arg(long)]
    no_full_screen: bool,
    #[arg(long)]
    auto_cancel: bool,
    #[arg(long)]
    badge: Option<u32>,
    #[arg(long)]
    sound: Option<String>,
}

#[derive(Args)]
struct ScheduleArgs {
    #[command(flatten)]
    content: ContentArgs,
    /// Fire time in epoch milliseconds
    #[arg(long, conflicts_with = "after")]
    at: Option<i64>,
    /// Fire after this many seconds
    #[arg(long)]
    after: Option<i64>,
}

impl ContentArgs {
    fn arguments(self) -> Arguments {
        Arguments::new()
            .with("notifyId", self.notify_id)
            .with_opt("title", self.title)
            .with_opt("body", self.body)
            .with_opt("channelId", self.channel)
            .with_opt("fullScreenIntent", self.no_full_screen.then_some(false))
            .with_opt("autoCancel", self.auto_cancel.then_some(true))
            .with_opt("badgeCount", self.badge)
            .with_opt("soundName", self.sound)
    }
}

impl ChannelArgs {
    fn arguments(self) -> Arguments {
        Arguments::new()
            .with_opt("channelId", self.id)
            .with_opt("channelName", self.name)
            .with_opt("channelDescription", self.description)
            .with_opt("importance", self.importance.map(|i| i.to_string()))
            .with_opt("enableVibration", self.no_vibration.then_some(false))
            .with_opt("playSound", self.no_sound.then_some(false))
            .with_opt("soundName", self.sound)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(secret) = cli.secret {
        config.secret = secret;
    }

    let message = match cli.command {
        Command::Serve {
            headless,
            no_channels,
        } => {
            config.headless |= headless;
            if no_channels {
                config.headless_capability = Capability::ChannelAgnostic;
            }
            return serve(config).await;
        }
        Command::Watch => return watch(&config).await,
        Command::Channel(args) => {
            Message::new(Method::CreateNotificationChannel, args.arguments())
        }
        Command::Schedule(args) => {
            let at = match (args.at, args.after) {
                (Some(at), _) => at,
                (None, Some(after)) => now_millis().saturating_add(after.saturating_mul(1000)),
                (None, None) => now_millis(),
            };
            let arguments = args.content.arguments().with("scheduledTime", at);
            Message::new(Method::ScheduleNotification, arguments)
        }
        Command::Show(args) => Message::new(Method::ShowNotification, args.arguments()),
        Command::Cancel { notify_id } => Message::new(
            Method::CancelNotification,
            Arguments::new().with("notifyId", notify_id),
        ),
        Command::CancelAll => Message::new(Method::CancelAllNotifications, Arguments::new()),
        Command::Permissions => Message::new(Method::RequestPermissions, Arguments::new()),
        Command::Badge { count } => Message::new(
            Method::SetBadgeCount,
            Arguments::new().with("count", count),
        ),
        Command::Status { notify_id } => Message::new(
            Method::GetNotificationState,
            Arguments::new().with("notifyId", notify_id),
        ),
        Command::Ping => Message::new(Method::Ping, Arguments::new()),
    };

    let client = Client::new(config.listen, config.secret.as_bytes());
    match client.call(message).await? {
        Response::Success(Value::Bool(value)) => println!("{value}"),
        Response::Success(Value::Int(value)) => println!("{value}"),
        Response::Success(Value::Str(value)) => println!("{value}"),
        Response::Success(Value::Null) => println!("ok"),
        Response::Error { code, message } => bail!("{code}: {message}"),
        Response::NotImplemented => bail!("the daemon does not implement this method"),
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let (daemon, addr) = Daemon::bind(&config).await?;
    info!("listening for method calls on {addr}");

    let shutdown = daemon.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, shutting down");
            shutdown.cancel();
        }
    });

    daemon.run().await
}

async fn watch(config: &Config) -> Result<()> {
    let client = Client::new(config.listen, config.secret.as_bytes());
    let mut subscription = client.subscribe().await?;
    info!("attached to {}", client.addr());

    loop {
        let event = subscription.next_event().await?;
        match event {
            Event::NotificationTapped { notify_id } => println!("{} {notify_id}", event.name()),
        }
    }
}
