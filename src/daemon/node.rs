use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result, anyhow, bail};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use log::{debug, warn};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
};

use super::protocol::Message;

const NONCE_LEN: usize = 12;
const MAX_FRAME_LEN: usize = 1 << 20;

/// Accepts method calls. Each connection carries one [`Message`], answered
/// through [`FrameCodec::send`] on the same stream.
pub struct Node {
    socket: Option<TcpListener>,
    codec: Arc<FrameCodec>,
}

impl Node {
    pub async fn bind(addr: SocketAddr, secret: &[u8]) -> Result<(Self, SocketAddr)> {
        let socket = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let addr = socket.local_addr()?;

        let node = Self {
            codec: Arc::new(FrameCodec::new(secret)),
            socket: Some(socket),
        };

        Ok((node, addr))
    }

    pub fn codec(&self) -> Arc<FrameCodec> {
        self.codec.clone()
    }

    #[allow(clippy::let_underscore_future)]
    pub fn listen(&mut self) -> Result<UnboundedReceiver<(TcpStream, Message)>> {
        let listener = self
            .socket
            .take()
            .ok_or_else(|| anyhow!("node is already listening"))?;
        let codec = self.codec.clone();
        let (tx, rx) = unbounded_channel();

        let _: JoinHandle<Result<()>> = tokio::spawn(async move {
            loop {
                let (socket, addr) = listener.accept().await?;
                debug!("client connected: {addr}");

                let codec = codec.clone();
                let tx = tx.clone();

                tokio::spawn(async move {
                    if let Err(e) = Self::handle_client(socket, codec, tx).await {
                        warn!("error handling client {addr}: {e:?}");
                    }
                });
            }
        });

        Ok(rx)
    }

    async fn handle_client(
        mut stream: TcpStream,
        codec: Arc<FrameCodec>,
        tx: UnboundedSender<(TcpStream, Message)>,
    ) -> Result<()> {
        let message: Message = codec.recv(&mut stream).await?;
        tx.send((stream, message))?;
        Ok(())
    }
}

/// Length prefixed CBOR frames sealed with ChaCha20-Poly1305.
///
/// Layout: `u32` big endian length, then a fresh 12 byte nonce followed by
/// the ciphertext. The key is the SHA-256 of the shared secret.
pub struct FrameCodec {
    cipher: ChaCha20Poly1305,
}

impl FrameCodec {
    pub fn new(secret: &[u8]) -> Self {
        let digest = Sha256::digest(secret);
        let key = Key::from_slice(digest.as_slice());
        Self {
            cipher: ChaCha20Poly1305::new(key),
        }
    }

    pub fn encode<T>(&self, message: &T) -> Result<Vec<u8>>
    where
        T: Serialize,
    {
        let raw = serde_cbor::to_vec(message)?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, raw.as_slice())
            .map_err(|_| anyhow!("encrypt fail"))?;

        let mut frame = Vec::with_capacity(NONCE_LEN + sealed.len());
        frame.extend_from_slice(nonce.as_slice());
        frame.extend_from_slice(&sealed);
        Ok(frame)
    }

    pub fn decode<T>(&self, data: &[u8]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        if data.len() < NONCE_LEN {
            bail!("frame too short");
        }
        let (nonce, sealed) = data.split_at(NONCE_LEN);
        let raw = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| anyhow!("decrypt fail, is the secret the same on both ends?"))?;
        Ok(serde_cbor::from_slice(&raw)?)
    }

    pub async fn send<S, T>(&self, stream: &mut S, data: &T) -> Result<()>
    where
        S: AsyncWrite + Unpin,
        T: Serialize,
    {
        let serialized = self.encode(data)?;

        stream
            .write_all(&(serialized.len() as u32).to_be_bytes())
            .await?;
        stream.write_all(&serialized).await?;
        stream.flush().await?;
        Ok(())
    }

    pub async fn recv<S, T>(&self, stream: &mut S) -> Result<T>
    where
        S: AsyncRead + Unpin,
        T: DeserializeOwned,
    {
        let mut len_bytes = [0u8; 4];
        stream.read_exact(&mut len_bytes).await?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > MAX_FRAME_LEN {
            bail!("frame of {len} bytes exceeds limit");
        }

        let mut buffer = vec![0u8; len];
        stream.read_exact(&mut buffer).await?;
        self.decode(&buffer)
    }
}
