// Клиент rendezvous relay: регистрация и обмен SDP

use crate::error::PadError;
use crate::peer::types::{RendezvousId, SdpPayload};
use crate::rendezvous::protocol::{ClientMessage, RelayMessage};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct SignalingClient {
    sender: SignalSender,
    receiver: SignalReceiver,
}

/// Отправляющая половина соединения с relay
pub struct SignalSender {
    sink: SplitSink<ClientStream, Message>,
}

/// Принимающая половина соединения с relay
pub struct SignalReceiver {
    stream: SplitStream<ClientStream>,
}

impl SignalingClient {
    pub async fn connect(url: &str) -> Result<Self, PadError> {
        let (ws, _) = connect_async(url).await?;
        tracing::debug!(url, "connected to relay");
        let (sink, stream) = ws.split();
        Ok(Self {
            sender: SignalSender { sink },
            receiver: SignalReceiver { stream },
        })
    }

    /// Регистрируемся и получаем свой идентификатор
    pub async fn register(&mut self) -> Result<RendezvousId, PadError> {
        self.sender.send(&ClientMessage::Register).await?;
        loop {
            match self.receiver.recv().await? {
                Some(RelayMessage::Registered { id }) => return RendezvousId::parse(&id),
                Some(RelayMessage::Error { message }) => return Err(PadError::Relay(message)),
                Some(other) => {
                    tracing::debug!(message = ?other, "ignoring relay message before registration");
                }
                None => return Err(PadError::Relay("relay closed before registration".into())),
            }
        }
    }

    pub fn into_split(self) -> (SignalSender, SignalReceiver) {
        (self.sender, self.receiver)
    }
}

impl SignalSender {
    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), PadError> {
        let json = serde_json::to_string(message)?;
        self.sink.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Переслать SDP другому endpoint'у через relay
    pub async fn signal(&mut self, to: &RendezvousId, payload: &SdpPayload) -> Result<(), PadError> {
        self.send(&ClientMessage::Signal {
            to: to.to_string(),
            payload: serde_json::to_value(payload)?,
        })
        .await
    }

    pub async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

impl SignalReceiver {
    /// Следующее сообщение relay; `None`, если соединение закрыто
    pub async fn recv(&mut self) -> Result<Option<RelayMessage>, PadError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let message = serde_json::from_str::<RelayMessage>(&text)
                        .map_err(|e| PadError::Relay(format!("bad relay message: {e}")))?;
                    return Ok(Some(message));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}
