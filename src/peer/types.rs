use crate::error::PadError;
use crate::session::FailureReason;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Максимальная длина кода подключения
pub const MAX_ID_LEN: usize = 64;

/// Код подключения (rendezvous identity), который выдаёт транспорт хосту.
/// Показывается текстом и QR-кодом, телефон вводит его вручную.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RendezvousId(String);

impl RendezvousId {
    /// Разбор пользовательского ввода: пробелы по краям отбрасываются,
    /// допускаются только ASCII буквы, цифры, `-` и `_`.
    pub fn parse(raw: &str) -> Result<Self, PadError> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= MAX_ID_LEN
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(PadError::InvalidId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RendezvousId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Идентификатор соединения внутри одного endpoint'а
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Поколение endpoint'а. Каждое выделение endpoint'а получает новый тег,
/// события со старым тегом отбрасываются.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointTag(pub u64);

/// Уведомления транспорта (аналог колбэков open/connection/data/close)
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Транспорт выдал endpoint'у его идентификатор
    Open(RendezvousId),
    /// Входящее соединение от другого устройства готово к обмену
    IncomingConnection(ConnectionId),
    /// Исходящее соединение открыто
    ConnectionOpen(ConnectionId),
    Data(ConnectionId, Bytes),
    ConnectionClosed(ConnectionId),
    /// Исходящее соединение не удалось установить
    ConnectFailed(ConnectionId, FailureReason),
    /// Ошибка самого endpoint'а (например, relay недоступен)
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub tag: EndpointTag,
    pub event: TransportEvent,
}

/// Канал, через который endpoint отдаёт события владельцу
#[derive(Debug, Clone)]
pub struct EventSink {
    tag: EndpointTag,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub fn new(tag: EndpointTag, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { tag, tx }
    }

    pub fn tag(&self) -> EndpointTag {
        self.tag
    }

    /// Возвращает false, если получатель уже закрыт
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                tag: self.tag,
                event,
            })
            .is_ok()
    }
}

/// Полезная нагрузка SDP с метаданными, пересылается через relay
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SdpPayload {
    pub sdp: RTCSessionDescription,
    /// Связывает offer и answer одного соединения
    pub id: String,
    pub ts: i64,
}

/// Конфигурация ICE сервера
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_accepts_ids() {
        let id = RendezvousId::parse("  abc123 \n").unwrap();
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(id.to_string(), "abc123");
        assert!(RendezvousId::parse("4f2a-91_bc").is_ok());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            RendezvousId::parse("   "),
            Err(PadError::InvalidId(_))
        ));
        assert!(RendezvousId::parse("has space").is_err());
        assert!(RendezvousId::parse("ws://relay/peer").is_err());
        assert!(RendezvousId::parse(&"a".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn id_serializes_as_plain_string() {
        let id = RendezvousId::parse("abc123").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
    }

    #[test]
    fn sink_tags_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(EndpointTag(7), tx);
        assert!(sink.emit(TransportEvent::ConnectionOpen(ConnectionId(1))));

        let got = rx.try_recv().unwrap();
        assert_eq!(got.tag, EndpointTag(7));
        assert_eq!(got.event, TransportEvent::ConnectionOpen(ConnectionId(1)));

        drop(rx);
        assert!(!sink.emit(TransportEvent::ConnectionClosed(ConnectionId(1))));
    }
}
