//! Транспорт в памяти процесса: endpoint'ы находят друг друга по
//! идентификатору через общий реестр. Подключение к неизвестному
//! идентификатору никогда не завершается, как зависший join.

use crate::error::PadError;
use crate::peer::types::{ConnectionId, EventSink, RendezvousId, TransportEvent};
use crate::peer::{Endpoint, Transport};
use crate::utils::random_id;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Registry {
    next_conn: u64,
    /// Заранее заданные идентификаторы (для сценариев вида "abc123")
    scripted_ids: VecDeque<String>,
    unavailable: bool,
    endpoints: HashMap<RendezvousId, EventSink>,
    links: HashMap<ConnectionId, Link>,
}

struct Link {
    initiator: RendezvousId,
    acceptor: RendezvousId,
}

impl Link {
    fn other_side(&self, me: &RendezvousId) -> &RendezvousId {
        if *me == self.initiator {
            &self.acceptor
        } else {
            &self.initiator
        }
    }
}

impl Registry {
    fn allocate_id(&mut self) -> RendezvousId {
        loop {
            let raw = self.scripted_ids.pop_front().unwrap_or_else(random_id);
            match RendezvousId::parse(&raw) {
                Ok(id) if !self.endpoints.contains_key(&id) => return id,
                _ => continue,
            }
        }
    }

    fn notify(&self, id: &RendezvousId, event: TransportEvent) {
        if let Some(sink) = self.endpoints.get(id) {
            sink.emit(event);
        }
    }
}

/// Симулированная сеть. Клоны делят один реестр.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<Registry>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Следующие endpoint'ы получат эти идентификаторы по порядку
    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let net = Self::default();
        net.registry()
            .scripted_ids
            .extend(ids.into_iter().map(Into::into));
        net
    }

    /// Пока сеть "недоступна", create_endpoint возвращает ошибку
    pub fn set_unavailable(&self, unavailable: bool) {
        self.registry().unavailable = unavailable;
    }

    pub fn endpoint_count(&self) -> usize {
        self.registry().endpoints.len()
    }

    pub fn link_count(&self) -> usize {
        self.registry().links.len()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Transport for MemoryNetwork {
    fn create_endpoint(&self, events: EventSink) -> Result<Box<dyn Endpoint>, PadError> {
        let mut reg = self.registry();
        if reg.unavailable {
            return Err(PadError::TransportUnavailable(
                "memory network is offline".into(),
            ));
        }
        let id = reg.allocate_id();
        tracing::debug!(id = %id, tag = ?events.tag(), "memory endpoint opened");
        events.emit(TransportEvent::Open(id.clone()));
        reg.endpoints.insert(id.clone(), events);
        Ok(Box::new(MemoryEndpoint {
            id: Some(id),
            net: self.clone(),
        }))
    }
}

struct MemoryEndpoint {
    /// None после disconnect
    id: Option<RendezvousId>,
    net: MemoryNetwork,
}

impl Endpoint for MemoryEndpoint {
    fn connect(&mut self, peer: &RendezvousId) -> Result<ConnectionId, PadError> {
        let me = self.id.clone().ok_or(PadError::EndpointClosed)?;
        let mut reg = self.net.registry();
        reg.next_conn += 1;
        let conn = ConnectionId(reg.next_conn);

        if peer == &me || !reg.endpoints.contains_key(peer) {
            tracing::debug!(%conn, peer = %peer, "memory connect to unknown peer, never completes");
            return Ok(conn);
        }

        reg.links.insert(
            conn,
            Link {
                initiator: me.clone(),
                acceptor: peer.clone(),
            },
        );
        reg.notify(peer, TransportEvent::IncomingConnection(conn));
        reg.notify(&me, TransportEvent::ConnectionOpen(conn));
        Ok(conn)
    }

    fn send(&mut self, conn: ConnectionId, payload: Bytes) -> Result<(), PadError> {
        let me = self.id.as_ref().ok_or(PadError::EndpointClosed)?;
        let reg = self.net.registry();
        let link = reg.links.get(&conn).ok_or(PadError::NotConnected)?;
        let other = link.other_side(me);
        reg.notify(other, TransportEvent::Data(conn, payload));
        Ok(())
    }

    fn close_connection(&mut self, conn: ConnectionId) {
        let Some(me) = self.id.as_ref() else {
            return;
        };
        let mut reg = self.net.registry();
        if let Some(link) = reg.links.remove(&conn) {
            let other = link.other_side(me).clone();
            reg.notify(&other, TransportEvent::ConnectionClosed(conn));
        }
    }

    fn disconnect(&mut self) {
        let Some(me) = self.id.take() else {
            return;
        };
        let mut reg = self.net.registry();
        reg.endpoints.remove(&me);

        let mine: Vec<ConnectionId> = reg
            .links
            .iter()
            .filter(|(_, link)| link.initiator == me || link.acceptor == me)
            .map(|(conn, _)| *conn)
            .collect();
        for conn in mine {
            if let Some(link) = reg.links.remove(&conn) {
                let other = link.other_side(&me).clone();
                reg.notify(&other, TransportEvent::ConnectionClosed(conn));
            }
        }
        tracing::debug!(id = %me, "memory endpoint disconnected");
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        self.disconnect();
    }
}
