use anyhow::Result;
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use zbus::message::{Message, Type};
use zbus::{MatchRule, MessageStream, connection::Connection};

const DESTINATION: &str = "org.freedesktop.Notifications";
const PATH: &str = "/org/freedesktop/Notifications";
const INTERFACE: &str = "org.freedesktop.Notifications";

/// Signals the notification server emits about notifications we posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSignal {
    ActionInvoked { server_id: u32, action: String },
    Closed { server_id: u32, reason: u32 },
}

pub async fn connect() -> Result<Connection> {
    Ok(Connection::session().await?)
}

pub async fn close_notification(connection: &Connection, server_id: u32) -> Result<()> {
    connection
        .call_method(
            Some(DESTINATION),
            PATH,
            Some(INTERFACE),
            "CloseNotification",
            &(server_id,),
        )
        .await?;
    Ok(())
}

pub async fn signal_listener(connection: Connection, tx: UnboundedSender<ServerSignal>) -> Result<()> {
    let rule = MatchRule::builder()
        .msg_type(Type::Signal)
        .path(PATH)?
        .interface(INTERFACE)?
        .build();

    let mut stream = MessageStream::for_match_rule(rule, &connection, None).await?;
    log::info!("listening for notification server signals");

    while let Some(msg) = stream.next().await {
        let Ok(msg) = msg else {
            continue;
        };

        if let Some(signal) = parse_signal(&msg) {
            tx.send(signal)?;
        }
    }

    Ok(())
}

fn parse_signal(msg: &Message) -> Option<ServerSignal> {
    let header = msg.header();
    if header.message_type() != Type::Signal {
        return None;
    }

    let body = msg.body();
    match header.member()?.as_str() {
        "ActionInvoked" => {
            let (server_id, action): (u32, String) = body.deserialize().ok()?;
            Some(ServerSignal::ActionInvoked { server_id, action })
        }
        "NotificationClosed" => {
            let (server_id, reason): (u32, u32) = body.deserialize().ok()?;
            Some(ServerSignal::Closed { server_id, reason })
        }
        _ => None,
    }
}
