//! WebSocket relay: выдаёт id и пересылает сигналы между клиентами.

use crate::error::PadError;
use crate::rendezvous::protocol::{ClientMessage, RelayMessage};
use crate::rendezvous::registry::Registry;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// Сколько ждём `register` после рукопожатия
pub const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

pub struct RelayServer {
    listener: TcpListener,
    registry: Registry,
}

impl RelayServer {
    pub async fn bind(addr: &str) -> Result<Self, PadError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            registry: Registry::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, PadError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Цикл accept, живёт пока жива задача
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!("drawpad relay listening on {}", addr);
        }
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let registry = self.registry.clone();
                    tokio::spawn(async move {
                        match accept_async(stream).await {
                            Ok(ws) => handle_connection(ws, addr, registry).await,
                            Err(e) => {
                                tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
}

/// Один клиент: register, затем пересылка до закрытия
async fn handle_connection(ws: WebSocketStream<TcpStream>, addr: SocketAddr, registry: Registry) {
    let (mut sink, mut stream) = ws.split();

    if !read_register(&mut stream, addr).await {
        let _ = send_message(
            &mut sink,
            &RelayMessage::Error {
                message: "expected register".into(),
            },
        )
        .await;
        return;
    }

    let (tx, mut rx) = mpsc::channel::<String>(256);
    let id = registry.register(tx).await;
    tracing::info!(peer = %addr, id = %id, "client registered");

    if send_message(&mut sink, &RelayMessage::Registered { id: id.clone() })
        .await
        .is_err()
    {
        registry.unregister(&id).await;
        return;
    }

    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if sink.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = forward(&text, &id, &registry, &mut sink).await {
                            tracing::debug!(id = %id, error = %e, "forward failed");
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::info!(peer = %addr, id = %id, "client disconnected");
    registry.unregister(&id).await;
}

async fn read_register(stream: &mut WsStream, addr: SocketAddr) -> bool {
    match tokio::time::timeout(REGISTER_TIMEOUT, stream.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Register) => true,
            Ok(other) => {
                tracing::warn!(peer = %addr, message = ?other, "message before register");
                false
            }
            Err(e) => {
                tracing::warn!(peer = %addr, error = %e, "invalid register message");
                false
            }
        },
        Ok(Some(Ok(_))) => {
            tracing::warn!(peer = %addr, "expected text register frame");
            false
        }
        Ok(Some(Err(e))) => {
            tracing::warn!(peer = %addr, error = %e, "WS error before register");
            false
        }
        Ok(None) => {
            tracing::debug!(peer = %addr, "connection closed before register");
            false
        }
        Err(_) => {
            tracing::warn!(peer = %addr, "register timeout");
            false
        }
    }
}

async fn forward(
    text: &str,
    from: &str,
    registry: &Registry,
    sink: &mut WsSink,
) -> Result<(), PadError> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Signal { to, payload }) => {
            let delivered = match registry.lookup(&to).await {
                Some(peer) => {
                    let json = serde_json::to_string(&RelayMessage::Signal {
                        from: from.to_string(),
                        payload,
                    })?;
                    peer.send(json).await.is_ok()
                }
                None => false,
            };
            if !delivered {
                tracing::debug!(from = %from, to = %to, "signal for unknown peer");
                send_message(sink, &RelayMessage::UnknownPeer { id: to }).await?;
            }
        }
        Ok(ClientMessage::Register) => {
            send_message(
                sink,
                &RelayMessage::Error {
                    message: "already registered".into(),
                },
            )
            .await?;
        }
        Err(e) => {
            send_message(
                sink,
                &RelayMessage::Error {
                    message: format!("invalid message: {e}"),
                },
            )
            .await?;
        }
    }
    Ok(())
}

async fn send_message(sink: &mut WsSink, message: &RelayMessage) -> Result<(), PadError> {
    let json = serde_json::to_string(message)?;
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}
