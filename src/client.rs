use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result, bail};
use tokio::net::TcpStream;

use crate::daemon::{
    node::FrameCodec,
    protocol::{Arguments, Event, Message, Method, Response, Value},
};

/// Issues method calls to a running daemon, one connection per call.
pub struct Client {
    codec: Arc<FrameCodec>,
    addr: SocketAddr,
}

impl Client {
    pub fn new(addr: SocketAddr, secret: &[u8]) -> Self {
        Self {
            codec: Arc::new(FrameCodec::new(secret)),
            addr,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn connect(&self) -> Result<StreamClient> {
        let stream = TcpStream::connect(self.addr)
            .await
            .with_context(|| format!("is the daemon running on {}?", self.addr))?;
        Ok(StreamClient {
            codec: self.codec.clone(),
            stream,
        })
    }

    pub async fn call(&self, message: Message) -> Result<Response> {
        self.connect().await?.call(message).await
    }

    pub async fn ping(&self) -> bool {
        let Ok(res) = self
            .call(Message::new(Method::Ping, Arguments::new()))
            .await
        else {
            return false;
        };

        res == Response::Success(Value::Str("pong".to_string()))
    }

    /// Attaches as the UI layer. Taps arrive through [`Subscription::next_event`].
    pub async fn subscribe(&self) -> Result<Subscription> {
        let mut client = self.connect().await?;
        let response = client
            .call(Message::new(Method::Subscribe, Arguments::new()))
            .await?;
        if !response.is_success() {
            bail!("subscription refused: {response:?}");
        }

        Ok(Subscription { client })
    }
}

pub struct StreamClient {
    codec: Arc<FrameCodec>,
    stream: TcpStream,
}

impl StreamClient {
    pub async fn call(&mut self, message: Message) -> Result<Response> {
        self.codec.send(&mut self.stream, &message).await?;
        self.codec.recv(&mut self.stream).await
    }
}

pub struct Subscription {
    client: StreamClient,
}

impl Subscription {
    pub async fn next_event(&mut self) -> Result<Event> {
        self.client.codec.recv(&mut self.client.stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::node::Node;

    #[tokio::test]
    async fn subscription_reads_pushed_events() {
        let (mut node, addr) = Node::bind("127.0.0.1:0".parse().unwrap(), b"pass")
            .await
            .unwrap();
        let mut calls = node.listen().unwrap();
        let codec = node.codec();

        let server = tokio::spawn(async move {
            let (mut stream, message) = calls.recv().await.unwrap();
            assert_eq!(message.method, "subscribe");
            codec.send(&mut stream, &Response::success(true)).await.unwrap();
            codec
                .send(&mut stream, &Event::NotificationTapped { notify_id: 42 })
                .await
                .unwrap();
        });

        let client = Client::new(addr, b"pass");
        let mut subscription = client.subscribe().await.unwrap();
        assert_eq!(
            subscription.next_event().await.unwrap(),
            Event::NotificationTapped { notify_id: 42 }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connecting_to_nothing_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::new(addr, b"pass");
        assert!(!client.ping().await);
        assert!(client.subscribe().await.is_err());
    }
}
