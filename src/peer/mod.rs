pub mod connection;
pub mod data_channel;
pub mod ice;
pub mod memory;
pub mod types;

use crate::error::PadError;
use bytes::Bytes;

pub use connection::WebRtcTransport;
pub use memory::MemoryNetwork;
pub use types::{
    ConnectionId, EndpointTag, EventSink, RendezvousId, SdpPayload, ServerConfig, TaggedEvent,
    TransportEvent,
};

/// Транспорт, который умеет выделять endpoint'ы.
/// Ядро зависит только от этого контракта.
pub trait Transport: Send + Sync {
    /// Выделяет новый endpoint. Идентификатор приходит позже событием
    /// `TransportEvent::Open` в `events`.
    fn create_endpoint(&self, events: EventSink) -> Result<Box<dyn Endpoint>, PadError>;
}

/// Одно подключение к транспорту со своим идентификатором.
/// Все методы возвращаются сразу, результат приходит событиями.
pub trait Endpoint: Send {
    fn connect(&mut self, peer: &RendezvousId) -> Result<ConnectionId, PadError>;

    fn send(&mut self, conn: ConnectionId, payload: Bytes) -> Result<(), PadError>;

    fn close_connection(&mut self, conn: ConnectionId);

    /// Освобождает endpoint; повторный вызов безопасен
    fn disconnect(&mut self);
}
